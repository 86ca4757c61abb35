use crate::{
    block::{
        strategy::{AllocStrategy, Allocator},
        BlockId,
    },
    codec::{decode_block, encode_block, Record},
    io::{PendingIo, Request},
    pool::ReadWritePool,
};
use std::{collections::VecDeque, sync::Arc};

/// Sequential reader over a contiguous list of block ids
///
/// Buffers come from the shared [`ReadWritePool`]: up to `n_buffers` are
/// stolen and kept cycling through a window of in-flight reads. Crossing a
/// block boundary re-submits the drained buffer for the next block behind
/// the window; once the id list is exhausted, buffers flow back to the
/// pool.
pub struct BufIstream<T: Record> {
    pool: Arc<ReadWritePool>,
    bids: Vec<BlockId>,
    window: VecDeque<PendingIo>,
    next_submit: usize,

    current: Vec<T>,
    cur_idx: usize,
    remaining: usize,
    block_records: usize,
}

impl<T: Record> BufIstream<T> {
    /// Opens a reader over `bids` holding `len` records in total
    ///
    /// # Errors
    ///
    /// Will return `Err` if the first block cannot be read.
    ///
    /// # Panics
    ///
    /// Panics if `len` records do not fit in `bids`.
    pub fn new(
        pool: Arc<ReadWritePool>,
        bids: Vec<BlockId>,
        n_buffers: usize,
        len: usize,
    ) -> crate::Result<Self> {
        let block_records = pool.manager().block_size() / T::SIZE;
        assert!(len <= bids.len() * block_records);

        let n_buffers = n_buffers.max(1);

        let mut stream = Self {
            pool,
            bids,
            window: VecDeque::with_capacity(n_buffers),
            next_submit: 0,

            current: Vec::new(),
            cur_idx: 0,
            remaining: len,
            block_records,
        };

        while stream.next_submit < stream.bids.len() && stream.window.len() < n_buffers {
            let buf = stream.pool.steal()?;
            let pending = stream.pool.read(buf, stream.bids[stream.next_submit]);
            stream.window.push_back(pending);
            stream.next_submit += 1;
        }

        if stream.remaining > 0 {
            stream.load_next_block()?;
        }

        Ok(stream)
    }

    /// Number of records left, including the current one
    #[must_use]
    pub fn len(&self) -> usize {
        self.remaining
    }

    /// Returns `true` if the stream is exhausted
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.remaining == 0
    }

    /// The current record
    ///
    /// # Panics
    ///
    /// Panics if the stream is exhausted.
    #[must_use]
    pub fn peek(&self) -> &T {
        assert!(!self.is_empty());
        &self.current[self.cur_idx]
    }

    /// Moves to the next record
    ///
    /// # Errors
    ///
    /// Will return `Err` if crossing a block boundary fails to read the
    /// next block.
    ///
    /// # Panics
    ///
    /// Panics if the stream is exhausted.
    pub fn advance(&mut self) -> crate::Result<()> {
        assert!(!self.is_empty());

        self.remaining -= 1;
        self.cur_idx += 1;

        if self.cur_idx == self.current.len() && self.remaining > 0 {
            self.load_next_block()?;
        }

        Ok(())
    }

    fn load_next_block(&mut self) -> crate::Result<()> {
        let pending = self
            .window
            .pop_front()
            .expect("a block must be in flight while records remain");

        let buf = pending.wait()?;
        let count = self.remaining.min(self.block_records);
        self.current = decode_block(&buf, count)?;
        self.cur_idx = 0;

        if self.next_submit < self.bids.len() {
            let pending = self.pool.read(buf, self.bids[self.next_submit]);
            self.window.push_back(pending);
            self.next_submit += 1;
        } else {
            self.pool.add(buf);
        }

        Ok(())
    }
}

impl<T: Record> Drop for BufIstream<T> {
    fn drop(&mut self) {
        // an abandoned stream still owes the pool its window buffers
        for pending in self.window.drain(..) {
            match pending.wait() {
                Ok(buf) => self.pool.add(buf),
                Err(e) => log::error!("read failed during stream teardown: {e:?}"),
            }
        }
    }
}

/// Sequential writer producing a chain of full blocks
///
/// Each filled block is handed to the pool's `write`; the pool reclaims
/// the buffer once the transfer completes, so the producer only stalls
/// when every pool buffer is still in flight.
pub struct BufOstream<T: Record> {
    pool: Arc<ReadWritePool>,
    alloc: Allocator,
    bids: Vec<BlockId>,

    staging: Vec<T>,
    pending: Vec<Request>,
    block_records: usize,
    len: usize,
}

impl<T: Record> BufOstream<T> {
    /// Opens a writer that allocates its blocks on demand
    #[must_use]
    pub fn new(pool: Arc<ReadWritePool>, strategy: AllocStrategy) -> Self {
        let block_records = pool.manager().block_size() / T::SIZE;

        Self {
            pool,
            alloc: Allocator::new(strategy),
            bids: Vec::new(),
            staging: Vec::with_capacity(block_records),
            pending: Vec::new(),
            block_records,
            len: 0,
        }
    }

    /// Number of records written so far
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if nothing has been written yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Appends a record, spilling a block once one fills up
    ///
    /// # Errors
    ///
    /// Will return `Err` on allocation exhaustion or when reclaiming a
    /// buffer surfaces a write failure.
    pub fn push(&mut self, value: T) -> crate::Result<()> {
        self.staging.push(value);
        self.len += 1;

        if self.staging.len() == self.block_records {
            self.spill()?;
        }

        Ok(())
    }

    /// Flushes the trailing partial block and waits for all writes
    ///
    /// Returns the chain of written block ids in stream order.
    ///
    /// # Errors
    ///
    /// Will return `Err` if a write fails.
    pub fn finish(mut self) -> crate::Result<Vec<BlockId>> {
        if !self.staging.is_empty() {
            self.spill()?;
        }

        for request in self.pending.drain(..) {
            request.wait()?;
        }

        Ok(std::mem::take(&mut self.bids))
    }

    fn spill(&mut self) -> crate::Result<()> {
        let mut buf = self.pool.steal()?;
        encode_block(&self.staging, &mut buf)?;
        self.staging.clear();

        let bid = self.pool.manager().new_block(&mut self.alloc)?;
        let request = self.pool.write(buf, bid);

        self.pending.retain(|r| !r.is_done());
        self.pending.push(request);
        self.bids.push(bid);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Config;
    use test_log::test;

    #[test]
    fn ostream_istream_preserve_order() -> crate::Result<()> {
        let manager = Config::memory(1 << 20).block_size(64).open()?;
        let pool = Arc::new(ReadWritePool::new(Arc::clone(&manager), 0, 2));

        // 8 records per 64-byte block, 5 blocks with a partial tail
        let mut writer = BufOstream::new(Arc::clone(&pool), AllocStrategy::Striping);
        for i in 0u64..37 {
            writer.push(i)?;
        }
        let bids = writer.finish()?;
        assert_eq!(5, bids.len());

        let mut reader = BufIstream::<u64>::new(Arc::clone(&pool), bids, 2, 37)?;
        for i in 0u64..37 {
            assert_eq!(i, *reader.peek());
            reader.advance()?;
        }
        assert!(reader.is_empty());

        // the reader's window buffers flow back into the pool
        drop(reader);
        let census = pool.census();
        assert_eq!(census.capacity, census.free + census.writing);

        Ok(())
    }

    #[test]
    fn empty_stream_is_empty() -> crate::Result<()> {
        let manager = Config::memory(1 << 20).block_size(64).open()?;
        let pool = Arc::new(ReadWritePool::new(manager, 0, 2));

        let writer = BufOstream::<u64>::new(Arc::clone(&pool), AllocStrategy::Striping);
        let bids = writer.finish()?;
        assert!(bids.is_empty());

        let reader = BufIstream::<u64>::new(pool, bids, 2, 0)?;
        assert!(reader.is_empty());

        Ok(())
    }
}
