use extmem::{stream::Stream, Config, Sequence};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::collections::VecDeque;
use test_log::test;

/// Drives the external sequence and a `VecDeque` in lockstep through random
/// operations, periodically comparing full forward and reverse iterations
#[test]
fn tracks_reference_deque() -> extmem::Result<()> {
    let manager = Config::memory(1 << 24).block_size(256).open()?;
    let mut seq: Sequence<u32> = Sequence::new(manager);
    let mut reference: VecDeque<u32> = VecDeque::new();

    let mut rng = StdRng::seed_from_u64(42);

    for step in 0..8_000u32 {
        match rng.gen_range(0..6) {
            0 | 1 => {
                let value = rng.gen();
                seq.push_front(value)?;
                reference.push_front(value);
            }
            2 | 3 => {
                let value = rng.gen();
                seq.push_back(value)?;
                reference.push_back(value);
            }
            4 => {
                if !reference.is_empty() {
                    seq.pop_front()?;
                    reference.pop_front();
                }
            }
            _ => {
                if !reference.is_empty() {
                    seq.pop_back()?;
                    reference.pop_back();
                }
            }
        }

        assert_eq!(reference.is_empty(), seq.is_empty());
        assert_eq!(reference.len(), seq.len());

        if !reference.is_empty() {
            assert_eq!(reference.front(), Some(seq.front()));
            assert_eq!(reference.back(), Some(seq.back()));
        }

        if step % 500 == 0 {
            let mut stream = seq.stream();
            for expected in &reference {
                assert_eq!(*expected, *stream.peek());
                stream.advance()?;
            }
            assert!(stream.is_empty());

            let mut stream = seq.reverse_stream();
            for expected in reference.iter().rev() {
                assert_eq!(*expected, *stream.peek());
                stream.advance()?;
            }
            assert!(stream.is_empty());
        }
    }

    Ok(())
}

#[test]
fn interleaved_pushes_read_front_to_back() -> extmem::Result<()> {
    let manager = Config::memory(1 << 20).block_size(256).open()?;
    let mut seq: Sequence<u32> = Sequence::new(manager);

    for value in [10, 11, 12, 13, 14] {
        seq.push_front(value)?;
    }
    for value in [20, 21, 22, 23, 24] {
        seq.push_back(value)?;
    }

    let mut got = Vec::new();
    let mut stream = seq.stream();
    while !stream.is_empty() {
        got.push(*stream.peek());
        stream.advance()?;
    }

    assert_eq!(vec![14, 13, 12, 11, 10, 20, 21, 22, 23, 24], got);
    Ok(())
}

/// `stream_at(k)` must yield exactly the suffix `[k, len)` for any k
#[test]
fn offset_streams_yield_suffixes() -> extmem::Result<()> {
    let manager = Config::memory(1 << 24).block_size(256).open()?;

    // 32 records per block; spread data over front, interior and back blocks
    let mut seq: Sequence<u64> = Sequence::new(manager);
    for i in (0u64..70).rev() {
        seq.push_front(i)?;
    }
    for i in 70u64..300 {
        seq.push_back(i)?;
    }

    for offset in 0..=300usize {
        let mut stream = seq.stream_at(offset)?;
        let mut expected = offset as u64;
        while !stream.is_empty() {
            assert_eq!(expected, *stream.peek());
            stream.advance()?;
            expected += 1;
        }
        assert_eq!(300, expected, "offset {offset} ended early");
    }

    Ok(())
}

#[test]
fn blocks_are_freed_on_drop() -> extmem::Result<()> {
    let manager = Config::memory(1 << 22).block_size(256).open()?;

    {
        let mut seq: Sequence<u64> = Sequence::new(manager.clone());
        for i in 0u64..1_000 {
            seq.push_back(i)?;
        }
        assert!(manager.live_blocks() > 0);
    }

    assert_eq!(0, manager.live_blocks());
    Ok(())
}
