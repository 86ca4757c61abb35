use extmem::{
    stream::{materialize, streamify, Cut, Map, Stream, StreamIter},
    suffix::{sa_check, suffix_array},
    Config, ExtVec,
};
use std::sync::Arc;
use test_log::test;

const RAM: usize = 1 << 18;

fn char_stream(vec: &mut ExtVec<u8>) -> extmem::Result<impl Stream<Item = u64> + '_> {
    Ok(Map::new(vec.stream()?, |c: &u8| u64::from(*c)))
}

#[test]
fn verbatim_text_builds_and_verifies() -> extmem::Result<()> {
    let manager = Config::memory(1 << 24).block_size(256).open()?;
    let text = b"yabbadabbado";

    // load the text into an external vector, as the tool does
    let mut input = ExtVec::<u8>::new(Arc::clone(&manager));
    for c in text {
        input.push(*c)?;
    }

    let sa = suffix_array(char_stream(&mut input)?, RAM, &manager)?;

    let mut output = ExtVec::<u64>::new(Arc::clone(&manager));
    output.resize(text.len(), false)?;
    materialize(sa, output.write_range(0, text.len())?)?;

    // the result is a permutation of 0..n
    let mut seen = vec![false; text.len()];
    for i in 0..text.len() {
        let pos = *output.get(i)? as usize;
        assert!(pos < text.len());
        assert!(!seen[pos]);
        seen[pos] = true;
    }

    assert!(sa_check(
        char_stream(&mut input)?,
        output.stream()?,
        RAM,
        &manager,
    )?);

    Ok(())
}

/// All-equal text: suffixes order strictly by descending position
#[test]
fn unary_text_of_one_hundred() -> extmem::Result<()> {
    let manager = Config::memory(1 << 24).block_size(256).open()?;

    let sa = suffix_array(streamify(vec![u64::from(b'a'); 100]), RAM, &manager)?;
    let drained = StreamIter(sa).collect::<extmem::Result<Vec<_>>>()?;

    assert_eq!((0..100u64).rev().collect::<Vec<_>>(), drained);
    Ok(())
}

#[test]
fn size_cut_limits_the_text() -> extmem::Result<()> {
    let manager = Config::memory(1 << 24).block_size(256).open()?;

    // build over only the first four characters of "banana"
    let text = streamify(b"banana".iter().map(|c| u64::from(*c)));
    let sa = suffix_array(Cut::new(text, 4), RAM, &manager)?;
    let drained = StreamIter(sa).collect::<extmem::Result<Vec<_>>>()?;

    // suffixes of "bana": "a" < "ana" < "bana" < "na"
    assert_eq!(vec![3, 1, 0, 2], drained);
    Ok(())
}

#[test]
fn checker_rejects_shuffled_array() -> extmem::Result<()> {
    let manager = Config::memory(1 << 24).block_size(256).open()?;
    let text: Vec<u64> = b"mississippi".iter().map(|c| u64::from(*c)).collect();

    let sa = suffix_array(streamify(text.clone()), RAM, &manager)?;
    let mut drained = StreamIter(sa).collect::<extmem::Result<Vec<_>>>()?;

    assert!(sa_check(
        streamify(text.clone()),
        streamify(drained.clone()),
        RAM,
        &manager,
    )?);

    drained.reverse();
    assert!(!sa_check(streamify(text), streamify(drained), RAM, &manager)?);

    Ok(())
}

#[test]
fn scratch_disks_are_reclaimed() -> extmem::Result<()> {
    let manager = Config::memory(1 << 24).block_size(256).open()?;

    {
        let text: Vec<u64> = (0..3_000u64).map(|i| i % 7 + 1).collect();
        let sa = suffix_array(streamify(text), RAM, &manager)?;
        let drained = StreamIter(sa).collect::<extmem::Result<Vec<_>>>()?;
        assert_eq!(3_000, drained.len());
    }

    // every pipeline stage frees its blocks once drained and dropped
    assert_eq!(0, manager.live_blocks());
    Ok(())
}
