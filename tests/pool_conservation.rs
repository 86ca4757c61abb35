use extmem::{block::strategy::Allocator, AllocStrategy, Config, ReadWritePool};
use rand::{rngs::StdRng, Rng, SeedableRng};
use test_log::test;

#[test]
fn census_balances_under_random_operations() -> extmem::Result<()> {
    let manager = Config::memory(1_024 * 512).block_size(512).open()?;
    let pool = ReadWritePool::new(manager.clone(), 2, 4);
    let mut alloc = Allocator::new(AllocStrategy::Striping);

    let mut rng = StdRng::seed_from_u64(11);
    let mut held = Vec::new();
    let mut written = Vec::new();

    for _ in 0..500 {
        match rng.gen_range(0..4) {
            // steal is bounded so the blocking pool always has a buffer in
            // flight or free to hand out
            0 => {
                if held.len() < 3 {
                    held.push(pool.steal()?);
                }
            }
            1 => {
                if let Some(buf) = held.pop() {
                    pool.add(buf);
                }
            }
            2 => {
                if let Some(buf) = held.pop() {
                    let bid = manager.new_block(&mut alloc)?;
                    pool.write(buf, bid);
                    written.push(bid);
                }
            }
            _ => {
                if let Some(bid) = written.last() {
                    pool.hint(*bid);
                }
            }
        }

        let census = pool.census();
        assert_eq!(6, census.capacity);
        assert_eq!(
            census.capacity,
            census.free + census.writing + census.prefetching + census.stolen(),
        );
        assert_eq!(held.len(), census.stolen());
    }

    for buf in held {
        pool.add(buf);
    }
    drop(pool);
    manager.delete_blocks(written);
    assert_eq!(0, manager.live_blocks());

    Ok(())
}

#[test]
fn read_observes_last_completed_write() -> extmem::Result<()> {
    let manager = Config::memory(16 * 512).block_size(512).open()?;
    let pool = ReadWritePool::new(manager.clone(), 1, 2);
    let mut alloc = Allocator::new(AllocStrategy::Striping);
    let bid = manager.new_block(&mut alloc)?;

    for round in 0u8..8 {
        let mut buf = pool.steal()?;
        buf.fill(round);
        pool.write(buf, bid);

        // a read queued behind the write must see its bytes
        let probe = pool.steal()?;
        let seen = pool.read(probe, bid).wait()?;
        assert!(seen.iter().all(|b| *b == round));
        pool.add(seen);
    }

    Ok(())
}
