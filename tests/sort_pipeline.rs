use extmem::{
    stream::{materialize, streamify, RunsCreator, RunsMerger, Sort, Stream, StreamIter},
    Config, ExtVec,
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::sync::Arc;
use test_log::test;

#[test]
fn sort_and_materialize_small_stream() -> extmem::Result<()> {
    let block_size = 256;
    let manager = Config::memory(1 << 22).block_size(block_size).open()?;

    let input = streamify([5u64, 3, 8, 1, 9, 2, 7, 4, 6, 0]);
    let sorted = Sort::new(
        Arc::clone(&manager),
        input,
        |a: &u64, b: &u64| a.cmp(b),
        block_size * 4,
    )?;

    let mut output = ExtVec::<u64>::new(Arc::clone(&manager));
    output.resize(10, false)?;
    let written = materialize(sorted, output.write_range(0, 10)?)?;
    assert_eq!(10, written);

    for i in 0..10 {
        assert_eq!(i as u64, *output.get(i)?);
    }

    drop(output);
    assert_eq!(0, manager.live_blocks());
    Ok(())
}

/// Three presorted runs merge into one ordered stream within a three-block
/// budget
#[test]
fn merges_three_runs_within_budget() -> extmem::Result<()> {
    let block_size = 256;
    let manager = Config::memory(1 << 22).block_size(block_size).open()?;

    // one block of staging per run
    let cmp = |a: &u64, b: &u64| a.cmp(b);
    let mut creator = RunsCreator::new(Arc::clone(&manager), cmp, 3 * block_size);

    let per_run = block_size / 8;
    for start in 1u64..=3 {
        for i in 0..per_run as u64 {
            creator.push(start + i * 3)?;
        }
    }

    let runs = creator.result()?;
    assert_eq!(3, runs.run_count());

    let mut merger = RunsMerger::new(runs, cmp, 3 * block_size)?;

    // every tape buffer comes out of the merge pool, whose size is the
    // budget: peak resident blocks can never exceed three
    let census = merger.census();
    assert!(census.capacity <= 3);
    assert_eq!(
        census.capacity,
        census.free + census.writing + census.prefetching + census.stolen(),
    );

    let mut drained = Vec::new();
    while !merger.is_empty() {
        drained.push(*merger.peek());
        merger.advance()?;

        let census = merger.census();
        assert!(census.capacity <= 3);
        assert!(census.stolen() + census.writing + census.prefetching <= census.capacity);
    }
    assert_eq!((1..=3 * per_run as u64).collect::<Vec<_>>(), drained);

    drop(merger);
    assert_eq!(0, manager.live_blocks());
    Ok(())
}

#[test]
fn random_streams_sort_to_permutations() -> extmem::Result<()> {
    let block_size = 256;
    let manager = Config::memory(1 << 24).block_size(block_size).open()?;
    let mut rng = StdRng::seed_from_u64(99);

    for len in [0usize, 1, 7, 100, 5_000] {
        let values: Vec<u64> = (0..len).map(|_| rng.gen_range(0..1_000)).collect();

        let sorted = Sort::new(
            Arc::clone(&manager),
            streamify(values.clone()),
            |a: &u64, b: &u64| a.cmp(b),
            block_size * 4,
        )?;
        let drained = StreamIter(sorted).collect::<extmem::Result<Vec<_>>>()?;

        let mut expected = values;
        expected.sort_unstable();
        assert_eq!(expected, drained);
    }

    assert_eq!(0, manager.live_blocks());
    Ok(())
}

/// The descending comparator must be honored as-is, not assumed to be `<`
#[test]
fn custom_comparator_orders_descending() -> extmem::Result<()> {
    let block_size = 256;
    let manager = Config::memory(1 << 22).block_size(block_size).open()?;

    let sorted = Sort::new(
        Arc::clone(&manager),
        streamify(0u64..500),
        |a: &u64, b: &u64| b.cmp(a),
        block_size * 3,
    )?;

    let drained = StreamIter(sorted).collect::<extmem::Result<Vec<_>>>()?;
    assert_eq!((0u64..500).rev().collect::<Vec<_>>(), drained);

    Ok(())
}

#[test]
fn pipeline_of_operators_composes() -> extmem::Result<()> {
    use extmem::stream::{Choose, Counter, Cut, Zip};

    let block_size = 256;
    let manager = Config::memory(1 << 22).block_size(block_size).open()?;

    // number a stream, sort by payload descending, then project the
    // original indices back out
    let payload = streamify([30u64, 10, 40, 20]);
    let numbered = Zip::new(Counter::new(), payload);

    let sorted = Sort::new(
        Arc::clone(&manager),
        numbered,
        |a: &(u64, u64), b: &(u64, u64)| b.1.cmp(&a.1),
        block_size * 4,
    )?;

    let indices = Cut::new(Choose::<_, 0>::new(sorted), 3);
    let drained = StreamIter(indices).collect::<extmem::Result<Vec<_>>>()?;

    assert_eq!(vec![2, 0, 3], drained);
    Ok(())
}
