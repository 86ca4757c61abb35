use extmem::{Config, ExtVec, PagerKind, VecOptions};
use rand::{rngs::StdRng, Rng, SeedableRng};
use test_log::test;

#[test]
fn tracks_in_memory_reference() -> extmem::Result<()> {
    let manager = Config::memory(1 << 22).block_size(256).open()?;
    let mut vec = ExtVec::<u64>::new(manager);
    let mut reference: Vec<u64> = Vec::new();

    let mut rng = StdRng::seed_from_u64(3);

    for _ in 0..3_000 {
        match rng.gen_range(0..4) {
            0 => {
                let value = rng.gen::<u64>();
                vec.push(value)?;
                reference.push(value);
            }
            1 if !reference.is_empty() => {
                let idx = rng.gen_range(0..reference.len());
                let value = rng.gen::<u64>();
                vec.set(idx, value)?;
                reference[idx] = value;
            }
            2 => {
                // grow or shrink by a small block-straddling amount
                let n = rng.gen_range(0..reference.len() + 40);
                let shrink = rng.gen_bool(0.5);
                vec.resize(n, shrink)?;
                if n <= reference.len() {
                    reference.truncate(n);
                } else {
                    reference.resize(n, 0);
                }
            }
            _ if !reference.is_empty() => {
                let idx = rng.gen_range(0..reference.len());
                assert_eq!(reference[idx], *vec.get(idx)?);
            }
            _ => {}
        }

        assert_eq!(reference.len(), vec.len());
    }

    // full comparison at the end, through the page cache and the scanner
    for (idx, expected) in reference.iter().enumerate() {
        assert_eq!(*expected, *vec.get(idx)?);
    }

    use extmem::stream::Stream;
    let mut scan = vec.stream()?;
    for expected in &reference {
        assert_eq!(*expected, *scan.peek());
        scan.advance()?;
    }
    assert!(scan.is_empty());

    Ok(())
}

/// Counterpart of the reference tool's move test: a million-record vector
/// changes hands without copying records
#[test]
fn contents_move_between_vectors() -> extmem::Result<()> {
    const N: usize = 1 << 20;
    let block_size = 512 * 8; // 512 records per block

    let manager = Config::scratch(1 << 26).block_size(block_size).open()?;

    let mut vec = ExtVec::<u64>::with_options(
        manager.clone(),
        VecOptions {
            page_blocks: 1,
            cache_pages: 2,
            pager: PagerKind::Lru,
            strategy: extmem::AllocStrategy::Striping,
        },
    );

    vec.resize(N, false)?;
    {
        let mut writer = vec.write_range(0, N)?;
        for i in 0..N {
            writer.write(i as u64)?;
        }
        writer.finish()?;
    }

    let mut moved = ExtVec::<u64>::new(manager);
    vec.swap(&mut moved);
    assert_eq!(0, vec.len());
    assert_eq!(N, moved.len());

    for i in [0usize, 511, 512, N - 1] {
        assert_eq!(i as u64, *moved.get(i)?);
    }

    Ok(())
}

#[test]
fn random_pager_still_correct() -> extmem::Result<()> {
    let manager = Config::memory(1 << 22).block_size(256).open()?;

    let mut vec = ExtVec::<u32>::with_options(
        manager,
        VecOptions {
            page_blocks: 2,
            cache_pages: 3,
            pager: PagerKind::Random,
            strategy: extmem::AllocStrategy::Striping,
        },
    );

    vec.resize(10_000, false)?;
    for i in 0..10_000 {
        vec.set(i, i as u32)?;
    }

    // strided access defeats the cache on purpose
    for i in (0..10_000).step_by(997) {
        assert_eq!(i as u32, *vec.get(i)?);
    }

    vec.flush()?;
    for i in (0..10_000).rev() {
        assert_eq!(i as u32, *vec.get(i)?);
    }

    Ok(())
}
