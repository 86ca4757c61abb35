use crate::{
    block::{
        manager::BlockManager,
        strategy::{AllocStrategy, Allocator},
        BlockId,
    },
    codec::{decode_block, encode_block, Record},
    pool::ReadWritePool,
    stream::Stream,
};
use std::{collections::VecDeque, sync::Arc};

/// External-memory deque without random access
///
/// Only the front and back blocks are resident; interior blocks live on
/// disk behind write-back buffering and prefetch hints. Iteration is
/// stream-only: front to back via [`stream`](Self::stream) (optionally
/// starting at an offset) or back to front via
/// [`reverse_stream`](Self::reverse_stream).
///
/// No block is spilled until the two resident blocks are both full, so
/// short-lived sequences never touch a disk.
pub struct Sequence<T: Record + Default> {
    manager: Arc<BlockManager>,
    pool: ReadWritePool,
    alloc: Allocator,

    bids: VecDeque<BlockId>,
    size: usize,
    block_records: usize,

    front: Box<[T]>,
    back: Box<[T]>,

    /// Front and back share the `front` storage (fewer than two blocks of
    /// data exist)
    merged: bool,

    /// Index of the front element; front data occupies `[front_idx, cap)`
    /// when split, `[front_idx, back_idx]` when merged
    front_idx: usize,

    /// Index of the back element; back data occupies `[0, back_idx]` when
    /// split
    back_idx: usize,

    prefetch_window: usize,
}

impl<T: Record + Default + Copy> Sequence<T> {
    /// Creates an empty sequence with a pool of D prefetch and D + 2
    /// write-back buffers for D disks
    #[must_use]
    pub fn new(manager: Arc<BlockManager>) -> Self {
        let disks = manager.disk_count();
        Self::with_pools(manager, disks, disks + 2, None)
    }

    /// Creates an empty sequence with explicit pool sizes
    ///
    /// `prefetch_window` bounds how many blocks are hinted ahead of the
    /// consuming end; it defaults to the prefetch-buffer count.
    ///
    /// # Panics
    ///
    /// Panics if `write_buffers < 2` or a block cannot hold a record.
    #[must_use]
    pub fn with_pools(
        manager: Arc<BlockManager>,
        prefetch_buffers: usize,
        write_buffers: usize,
        prefetch_window: Option<usize>,
    ) -> Self {
        let block_records = manager.block_size() / T::SIZE;
        assert!(block_records > 0);

        if write_buffers < 3 {
            log::warn!("sequence: no spare write buffer, pushes will stall on spills");
        }

        let pool = ReadWritePool::new(Arc::clone(&manager), prefetch_buffers, write_buffers);

        Self {
            manager,
            pool,
            alloc: Allocator::new(AllocStrategy::Striping),

            bids: VecDeque::new(),
            size: 0,
            block_records,

            front: empty_block(block_records),
            back: empty_block(block_records),

            merged: true,
            front_idx: 0,
            back_idx: 0,

            prefetch_window: prefetch_window.unwrap_or(prefetch_buffers),
        }
    }

    /// Number of records
    #[must_use]
    pub fn len(&self) -> usize {
        self.size
    }

    /// Returns `true` if the sequence holds no records
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// The front record
    ///
    /// # Panics
    ///
    /// Panics if the sequence is empty.
    #[must_use]
    pub fn front(&self) -> &T {
        assert!(!self.is_empty());
        &self.front[self.front_idx]
    }

    /// The back record
    ///
    /// # Panics
    ///
    /// Panics if the sequence is empty.
    #[must_use]
    pub fn back(&self) -> &T {
        assert!(!self.is_empty());
        if self.merged {
            &self.front[self.back_idx]
        } else {
            &self.back[self.back_idx]
        }
    }

    /// Exchanges the contents of two sequences
    pub fn swap(&mut self, other: &mut Self) {
        std::mem::swap(self, other);
    }

    /// Adds a record at the front
    ///
    /// # Errors
    ///
    /// Will return `Err` on allocation exhaustion or spill failure.
    pub fn push_front(&mut self, value: T) -> crate::Result<()> {
        let cap = self.block_records;

        if self.size == 0 {
            self.merged = true;
            self.front_idx = cap - 1;
            self.back_idx = cap - 1;
            self.front[cap - 1] = value;
            self.size = 1;
            return Ok(());
        }

        if self.front_idx == 0 {
            if self.merged {
                log::trace!("sequence::push_front: split resident block");
                // the shared block becomes the back block; back_idx already
                // indexes into it
                std::mem::swap(&mut self.front, &mut self.back);
                self.merged = false;
            } else if self.bids.is_empty()
                && self.size < 2 * cap
                && self.back_idx + 1 < cap
            {
                log::trace!("sequence::push_front: rebalance resident blocks");
                // two resident blocks with a gap at the back end: shift both
                // right so the front block gains room, spilling nothing
                let gap = cap - 1 - self.back_idx;

                self.back.copy_within(0..=self.back_idx, gap);
                self.back[..gap].clone_from_slice(&self.front[cap - gap..]);
                self.front.copy_within(..cap - gap, gap);

                self.front_idx = gap - 1;
                self.back_idx = cap - 1;
                self.front[self.front_idx] = value;
                self.size += 1;
                return Ok(());
            } else {
                // first spill or steady-state spill of the full front block
                let bid = self.manager.new_block(&mut self.alloc)?;
                log::trace!("sequence::push_front: spill front block to {bid:?}");

                let mut buf = self.pool.steal()?;
                encode_block(&self.front, &mut buf)?;
                self.bids.push_front(bid);
                self.pool.write(buf, bid);

                if self.bids.len() <= self.prefetch_window {
                    self.pool.hint(bid);
                }
            }

            self.front_idx = cap - 1;
            self.front[cap - 1] = value;
            self.size += 1;
        } else {
            self.front_idx -= 1;
            self.front[self.front_idx] = value;
            self.size += 1;
        }

        Ok(())
    }

    /// Adds a record at the back
    ///
    /// # Errors
    ///
    /// Will return `Err` on allocation exhaustion or spill failure.
    pub fn push_back(&mut self, value: T) -> crate::Result<()> {
        let cap = self.block_records;

        if self.size == 0 {
            self.merged = true;
            self.front_idx = 0;
            self.back_idx = 0;
            self.front[0] = value;
            self.size = 1;
            return Ok(());
        }

        if self.back_idx == cap - 1 {
            if self.merged {
                log::trace!("sequence::push_back: split resident block");
                // the shared block stays the front block; a fresh back block
                // starts filling from its beginning
                self.merged = false;
            } else if self.bids.is_empty() && self.size < 2 * cap && self.front_idx > 0 {
                log::trace!("sequence::push_back: rebalance resident blocks");
                // two resident blocks with a gap at the front end: shift both
                // left so the back block gains room, spilling nothing
                let gap = self.front_idx;

                self.front.copy_within(gap.., 0);
                let split = cap - gap;
                self.front[split..].clone_from_slice(&self.back[..gap]);
                self.back.copy_within(gap..=self.back_idx, 0);

                self.front_idx = 0;
                self.back_idx = self.back_idx - gap + 1;
                self.back[self.back_idx] = value;
                self.size += 1;
                return Ok(());
            } else {
                let bid = self.manager.new_block(&mut self.alloc)?;
                log::trace!("sequence::push_back: spill back block to {bid:?}");

                let mut buf = self.pool.steal()?;
                encode_block(&self.back, &mut buf)?;
                self.bids.push_back(bid);
                self.pool.write(buf, bid);

                if self.bids.len() <= self.prefetch_window {
                    self.pool.hint(bid);
                }
            }

            self.back_idx = 0;
            self.back[0] = value;
            self.size += 1;
        } else {
            self.back_idx += 1;
            if self.merged {
                self.front[self.back_idx] = value;
            } else {
                self.back[self.back_idx] = value;
            }
            self.size += 1;
        }

        Ok(())
    }

    /// Removes the front record
    ///
    /// # Errors
    ///
    /// Will return `Err` if refilling the front block from disk fails.
    ///
    /// # Panics
    ///
    /// Panics if the sequence is empty.
    pub fn pop_front(&mut self) -> crate::Result<()> {
        assert!(!self.is_empty());
        let cap = self.block_records;

        if self.size == 1 {
            self.size = 0;
            self.merged = true;
            self.front_idx = 0;
            self.back_idx = 0;
            return Ok(());
        }

        if self.merged || self.front_idx < cap - 1 {
            self.front_idx += 1;
            self.size -= 1;
            return Ok(());
        }

        // the front block is exhausted by this pop
        self.size -= 1;

        if self.size <= cap {
            log::trace!("sequence::pop_front: merge into the back block");
            debug_assert!(self.bids.is_empty());
            std::mem::swap(&mut self.front, &mut self.back);
            self.merged = true;
            self.front_idx = 0;
            return Ok(());
        }

        let bid = *self.bids.front().expect("interior blocks must exist");
        log::trace!("sequence::pop_front: fetch {bid:?}");

        let buf = self.pool.steal()?;
        let pending = self.pool.read(buf, bid);

        for i in 0..self.prefetch_window.min(self.bids.len() - 1) {
            self.pool.hint(self.bids[i + 1]);
        }

        let buf = pending.wait()?;
        let items = decode_block::<T>(&buf, cap)?;
        self.front.clone_from_slice(&items);
        self.pool.add(buf);

        self.manager.delete_block(bid);
        self.bids.pop_front();
        self.front_idx = 0;

        Ok(())
    }

    /// Removes the back record
    ///
    /// # Errors
    ///
    /// Will return `Err` if refilling the back block from disk fails.
    ///
    /// # Panics
    ///
    /// Panics if the sequence is empty.
    pub fn pop_back(&mut self) -> crate::Result<()> {
        assert!(!self.is_empty());
        let cap = self.block_records;

        if self.size == 1 {
            self.size = 0;
            self.merged = true;
            self.front_idx = 0;
            self.back_idx = 0;
            return Ok(());
        }

        if self.merged || self.back_idx > 0 {
            self.back_idx -= 1;
            self.size -= 1;
            return Ok(());
        }

        // the back block is exhausted by this pop
        self.size -= 1;

        if self.size <= cap {
            log::trace!("sequence::pop_back: merge into the front block");
            debug_assert!(self.bids.is_empty());
            self.merged = true;
            self.back_idx = cap - 1;
            return Ok(());
        }

        let bid = *self.bids.back().expect("interior blocks must exist");
        log::trace!("sequence::pop_back: fetch {bid:?}");

        let buf = self.pool.steal()?;
        let pending = self.pool.read(buf, bid);

        for i in 1..self.prefetch_window.min(self.bids.len() - 1) {
            self.pool.hint(self.bids[self.bids.len() - 1 - i]);
        }

        let buf = pending.wait()?;
        let items = decode_block::<T>(&buf, cap)?;
        self.back.clone_from_slice(&items);
        self.pool.add(buf);

        self.manager.delete_block(bid);
        self.bids.pop_back();
        self.back_idx = cap - 1;

        Ok(())
    }

    /// Opens a front-to-back stream over the whole sequence
    #[must_use]
    pub fn stream(&self) -> SeqStream<'_, T> {
        SeqStream {
            seq: self,
            remaining: self.size,
            cur: Cursor::Front,
            cur_idx: self.front_idx,
            next_bid: 0,
        }
    }

    /// Opens a front-to-back stream starting at logical `offset`
    ///
    /// An element inside a resident block is reached without I/O; interior
    /// positions fetch their block and start prefetching the blocks behind
    /// it.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an interior block cannot be read.
    ///
    /// # Panics
    ///
    /// Panics if `offset > len`.
    pub fn stream_at(&self, offset: usize) -> crate::Result<SeqStream<'_, T>> {
        assert!(offset <= self.size);
        let cap = self.block_records;

        if offset == self.size {
            return Ok(SeqStream {
                seq: self,
                remaining: 0,
                cur: Cursor::Front,
                cur_idx: self.front_idx,
                next_bid: 0,
            });
        }

        if offset + self.front_idx < cap {
            // lies in the front block
            return Ok(SeqStream {
                seq: self,
                remaining: self.size - offset,
                cur: Cursor::Front,
                cur_idx: self.front_idx + offset,
                next_bid: 0,
            });
        }

        let mid_offset = offset - (cap - self.front_idx);

        if self.size - offset <= self.back_idx + 1 {
            // lies in the back block
            return Ok(SeqStream {
                seq: self,
                remaining: self.size - offset,
                cur: Cursor::Back,
                cur_idx: mid_offset % cap,
                next_bid: self.bids.len(),
            });
        }

        // interior: fetch the containing block, prefetch behind it
        let block_shift = mid_offset / cap;
        let bid = self.bids[block_shift];

        let buf = self.pool.steal()?;
        let pending = self.pool.read(buf, bid);

        for i in 1..=self.prefetch_window {
            match self.bids.get(block_shift + i) {
                Some(next) => self.pool.hint(*next),
                None => break,
            }
        }

        let buf = pending.wait()?;
        let items = decode_block::<T>(&buf, cap)?;
        self.pool.add(buf);

        Ok(SeqStream {
            seq: self,
            remaining: self.size - offset,
            cur: Cursor::Own(items),
            cur_idx: mid_offset % cap,
            next_bid: block_shift + 1,
        })
    }

    /// Opens a back-to-front stream over the whole sequence
    #[must_use]
    pub fn reverse_stream(&self) -> SeqRevStream<'_, T> {
        SeqRevStream {
            seq: self,
            remaining: self.size,
            cur: if self.merged {
                Cursor::Front
            } else {
                Cursor::Back
            },
            cur_idx: self.back_idx,
            next_bid: self.bids.len(),
        }
    }
}

impl<T: Record + Default> Drop for Sequence<T> {
    fn drop(&mut self) {
        self.manager.delete_blocks(self.bids.drain(..));
    }
}

fn empty_block<T: Record + Default>(cap: usize) -> Box<[T]> {
    (0..cap)
        .map(|_| T::default())
        .collect::<Vec<_>>()
        .into_boxed_slice()
}

enum Cursor<T> {
    Front,
    Back,
    Own(Vec<T>),
}

/// Front-to-back stream over a [`Sequence`]
///
/// Shares the sequence's pool: interior blocks are fetched into a private
/// buffer with prefetch hints trailing the read position.
pub struct SeqStream<'a, T: Record + Default> {
    seq: &'a Sequence<T>,
    remaining: usize,
    cur: Cursor<T>,
    cur_idx: usize,
    next_bid: usize,
}

impl<T: Record + Default> SeqStream<'_, T> {
    /// Number of records left
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    fn fetch_next_block(&mut self) -> crate::Result<()> {
        let seq = self.seq;
        let bid = seq.bids[self.next_bid];

        let buf = seq.pool.steal()?;
        let pending = seq.pool.read(buf, bid);

        for i in 1..=seq.prefetch_window {
            match seq.bids.get(self.next_bid + i) {
                Some(next) => seq.pool.hint(*next),
                None => break,
            }
        }

        let buf = pending.wait()?;
        self.cur = Cursor::Own(decode_block(&buf, seq.block_records)?);
        seq.pool.add(buf);

        self.next_bid += 1;
        self.cur_idx = 0;

        Ok(())
    }
}

impl<T: Record + Default> Stream for SeqStream<'_, T> {
    type Item = T;

    fn is_empty(&self) -> bool {
        self.remaining == 0
    }

    fn peek(&self) -> &T {
        assert!(!self.is_empty());
        match &self.cur {
            Cursor::Front => &self.seq.front[self.cur_idx],
            Cursor::Back => &self.seq.back[self.cur_idx],
            Cursor::Own(items) => &items[self.cur_idx],
        }
    }

    fn advance(&mut self) -> crate::Result<()> {
        assert!(!self.is_empty());
        let cap = self.seq.block_records;

        if self.cur_idx == cap - 1 {
            self.remaining -= 1;

            if self.remaining == 0 {
                return Ok(());
            }

            if self.remaining <= cap {
                // the rest lives in the back block
                debug_assert_eq!(self.next_bid, self.seq.bids.len());
                self.cur = Cursor::Back;
                self.cur_idx = 0;
                return Ok(());
            }

            self.fetch_next_block()
        } else {
            self.remaining -= 1;
            self.cur_idx += 1;
            Ok(())
        }
    }
}

/// Back-to-front stream over a [`Sequence`]
pub struct SeqRevStream<'a, T: Record + Default> {
    seq: &'a Sequence<T>,
    remaining: usize,
    cur: Cursor<T>,
    cur_idx: usize,

    /// Interior blocks still unread; the next fetch takes `bids[next_bid - 1]`
    next_bid: usize,
}

impl<T: Record + Default> SeqRevStream<'_, T> {
    /// Number of records left
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    fn fetch_prev_block(&mut self) -> crate::Result<()> {
        let seq = self.seq;
        let bid = seq.bids[self.next_bid - 1];

        let buf = seq.pool.steal()?;
        let pending = seq.pool.read(buf, bid);

        for i in 2..=seq.prefetch_window + 1 {
            match self.next_bid.checked_sub(i) {
                Some(idx) => seq.pool.hint(seq.bids[idx]),
                None => break,
            }
        }

        let buf = pending.wait()?;
        self.cur = Cursor::Own(decode_block(&buf, seq.block_records)?);
        seq.pool.add(buf);

        self.next_bid -= 1;
        self.cur_idx = seq.block_records - 1;

        Ok(())
    }
}

impl<T: Record + Default> Stream for SeqRevStream<'_, T> {
    type Item = T;

    fn is_empty(&self) -> bool {
        self.remaining == 0
    }

    fn peek(&self) -> &T {
        assert!(!self.is_empty());
        match &self.cur {
            Cursor::Front => &self.seq.front[self.cur_idx],
            Cursor::Back => &self.seq.back[self.cur_idx],
            Cursor::Own(items) => &items[self.cur_idx],
        }
    }

    fn advance(&mut self) -> crate::Result<()> {
        assert!(!self.is_empty());
        let cap = self.seq.block_records;

        if self.cur_idx == 0 {
            self.remaining -= 1;

            if self.remaining == 0 {
                return Ok(());
            }

            if self.remaining <= cap {
                // the rest lives in the front block
                debug_assert_eq!(self.next_bid, 0);
                self.cur = Cursor::Front;
                self.cur_idx = cap - 1;
                return Ok(());
            }

            self.fetch_prev_block()
        } else {
            self.remaining -= 1;
            self.cur_idx -= 1;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Config;
    use test_log::test;

    fn sequence(block_size: usize) -> Sequence<u64> {
        let manager = Config::memory(1 << 22)
            .block_size(block_size)
            .open()
            .expect("should open");
        Sequence::new(manager)
    }

    #[test]
    fn push_both_ends_reads_in_order() -> crate::Result<()> {
        let mut seq = sequence(64);

        for v in [10u64, 11, 12, 13, 14] {
            seq.push_front(v)?;
        }
        for v in [20u64, 21, 22, 23, 24] {
            seq.push_back(v)?;
        }

        let mut stream = seq.stream();
        let mut got = Vec::new();
        while !stream.is_empty() {
            got.push(*stream.peek());
            stream.advance()?;
        }

        assert_eq!(vec![14, 13, 12, 11, 10, 20, 21, 22, 23, 24], got);
        Ok(())
    }

    #[test]
    fn spills_and_refills_across_blocks() -> crate::Result<()> {
        let mut seq = sequence(64); // 8 records per block

        for i in 0u64..100 {
            seq.push_back(i)?;
        }
        assert_eq!(100, seq.len());
        assert_eq!(0, *seq.front());
        assert_eq!(99, *seq.back());

        for i in 0u64..100 {
            assert_eq!(i, *seq.front());
            seq.pop_front()?;
        }
        assert!(seq.is_empty());

        Ok(())
    }

    #[test]
    fn rebalance_keeps_two_blocks_resident() -> crate::Result<()> {
        let manager = Config::memory(1 << 22).block_size(64).open()?;
        let mut seq: Sequence<u64> = Sequence::new(Arc::clone(&manager));

        // fill one block from the front, then one short of two full blocks
        // alternating; nothing may spill
        for i in 0u64..15 {
            if i % 2 == 0 {
                seq.push_front(i)?;
            } else {
                seq.push_back(i)?;
            }
        }

        assert_eq!(0, manager.live_blocks());
        assert_eq!(15, seq.len());

        // the 16th push fills both blocks, the 17th spills
        seq.push_front(100)?;
        assert_eq!(0, manager.live_blocks());
        seq.push_front(101)?;
        assert_eq!(1, manager.live_blocks());

        Ok(())
    }

    #[test]
    fn offset_stream_yields_suffix() -> crate::Result<()> {
        let mut seq = sequence(64);

        for i in 0u64..200 {
            seq.push_back(i)?;
        }

        for offset in [0usize, 3, 8, 63, 100, 193, 199, 200] {
            let mut stream = seq.stream_at(offset)?;
            let mut expect = offset as u64;
            while !stream.is_empty() {
                assert_eq!(expect, *stream.peek());
                stream.advance()?;
                expect += 1;
            }
            assert_eq!(200, expect);
        }

        Ok(())
    }

    #[test]
    fn reverse_stream_matches_reference() -> crate::Result<()> {
        let mut seq = sequence(64);
        let mut reference = VecDeque::new();

        for i in 0u64..77 {
            if i % 3 == 0 {
                seq.push_front(i)?;
                reference.push_front(i);
            } else {
                seq.push_back(i)?;
                reference.push_back(i);
            }
        }

        let mut stream = seq.reverse_stream();
        for expected in reference.iter().rev() {
            assert_eq!(*expected, *stream.peek());
            stream.advance()?;
        }
        assert!(stream.is_empty());

        Ok(())
    }
}
