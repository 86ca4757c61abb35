use crate::{
    block::{manager::BlockManager, BlockBuf, BlockId},
    io::{PendingIo, Request},
};
use std::{
    collections::VecDeque,
    sync::{Arc, Condvar, Mutex},
};

/// Buffer accounting snapshot, used to assert pool conservation
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PoolCensus {
    /// Buffers sitting in the free list
    pub free: usize,

    /// Buffers owned by in-flight write requests
    pub writing: usize,

    /// Buffers owned by in-flight prefetch reads
    pub prefetching: usize,

    /// Total buffers the pool is responsible for
    pub capacity: usize,
}

impl PoolCensus {
    /// Buffers currently held by clients
    #[must_use]
    pub fn stolen(&self) -> usize {
        self.capacity - self.free - self.writing - self.prefetching
    }
}

struct Inner {
    free: Vec<BlockBuf>,
    busy_writes: VecDeque<PendingIo>,
    prefetched: Vec<(BlockId, PendingIo)>,
    capacity: usize,
    prefetch_capacity: usize,
}

/// A fixed set of block buffers shared between write-back and prefetch
///
/// The pool overlaps I/O with computation: writes are scheduled behind the
/// producer and their buffers reclaimed lazily, reads can be satisfied
/// instantly when an earlier [`hint`](Self::hint) already fetched the block.
/// The buffer count is invariant across any operation sequence; only
/// [`resize_write`](Self::resize_write) and
/// [`resize_prefetch`](Self::resize_prefetch) change it.
pub struct ReadWritePool {
    manager: Arc<BlockManager>,
    inner: Mutex<Inner>,
    returned: Condvar,
}

impl ReadWritePool {
    /// Creates a pool with `write_buffers` write-back buffers and
    /// `prefetch_buffers` prefetch slots
    ///
    /// # Panics
    ///
    /// Panics if `write_buffers < 2`; nothing can be double-buffered below
    /// that.
    #[must_use]
    pub fn new(manager: Arc<BlockManager>, prefetch_buffers: usize, write_buffers: usize) -> Self {
        assert!(write_buffers >= 2);

        let block_size = manager.block_size();
        let capacity = write_buffers + prefetch_buffers;
        let free = (0..capacity).map(|_| BlockBuf::zeroed(block_size)).collect();

        Self {
            manager,
            inner: Mutex::new(Inner {
                free,
                busy_writes: VecDeque::new(),
                prefetched: Vec::new(),
                capacity,
                prefetch_capacity: prefetch_buffers,
            }),
            returned: Condvar::new(),
        }
    }

    /// The block manager this pool's buffers and transfers belong to
    #[must_use]
    pub fn manager(&self) -> &Arc<BlockManager> {
        &self.manager
    }

    /// Takes an unused buffer out of the pool, blocking until one is
    /// available if every buffer is busy
    ///
    /// In-flight writes are reclaimed first (oldest write waited on when
    /// none has completed yet), then the oldest prefetch is sacrificed;
    /// with everything held by clients, the call blocks until a buffer
    /// comes back through [`add`](Self::add). The returned buffer owns no
    /// pending I/O and the pool's buffer count never changes.
    ///
    /// # Errors
    ///
    /// Will return `Err` if reclaiming a buffer surfaces an earlier write
    /// failure.
    pub fn steal(&self) -> crate::Result<BlockBuf> {
        let mut inner = self.inner.lock().expect("lock is poisoned");

        loop {
            if let Some(buf) = inner.free.pop() {
                return Ok(buf);
            }

            if Self::reap_completed(&mut inner)? {
                continue;
            }

            if let Some(pending) = inner.busy_writes.pop_front() {
                let buf = pending.wait()?;
                inner.free.push(buf);
                continue;
            }

            if !inner.prefetched.is_empty() {
                // a hint is best-effort; reclaim the oldest one rather than
                // starve the caller
                let (_, pending) = inner.prefetched.remove(0);
                let buf = pending.wait()?;
                inner.free.push(buf);
                continue;
            }

            log::trace!("pool saturated by clients, waiting for a returned buffer");
            inner = self.returned.wait(inner).expect("lock is poisoned");
        }
    }

    /// Returns a buffer to the free pool
    pub fn add(&self, buf: BlockBuf) {
        let mut inner = self.inner.lock().expect("lock is poisoned");
        inner.free.push(buf);
        self.returned.notify_one();
    }

    /// Schedules an asynchronous write of `buf` to `bid`
    ///
    /// The pool keeps the buffer alive until the write completes and then
    /// reclaims it. The returned request can be waited on, but usually the
    /// caller just keeps going and lets a later `steal` absorb completion.
    pub fn write(&self, buf: BlockBuf, bid: BlockId) -> Request {
        let pending = self.manager.write_block(bid, buf);
        let request = pending.request();

        let mut inner = self.inner.lock().expect("lock is poisoned");
        inner.busy_writes.push_back(pending);

        request
    }

    /// Schedules an asynchronous read of `bid` into `buf`
    ///
    /// If a prior [`hint`](Self::hint) already fetched (or is fetching) the
    /// block, the caller's buffer is swapped into the pool and the hinted
    /// transfer is returned instead, so no second read is issued.
    pub fn read(&self, buf: BlockBuf, bid: BlockId) -> PendingIo {
        let mut inner = self.inner.lock().expect("lock is poisoned");

        if let Some(pos) = inner.prefetched.iter().position(|(b, _)| *b == bid) {
            log::trace!("prefetch hit for {bid:?}");
            let (_, pending) = inner.prefetched.swap_remove(pos);
            inner.free.push(buf);
            self.returned.notify_one();
            return pending;
        }

        drop(inner);
        self.manager.read_block(bid, buf)
    }

    /// Best-effort prefetch of `bid`
    ///
    /// Starts a read if a prefetch slot and a buffer are available without
    /// blocking; drops the hint silently otherwise. Hinting the same block
    /// twice is idempotent.
    pub fn hint(&self, bid: BlockId) {
        let mut inner = self.inner.lock().expect("lock is poisoned");

        if inner.prefetched.iter().any(|(b, _)| *b == bid) {
            return;
        }

        if inner.prefetched.len() >= inner.prefetch_capacity {
            log::trace!("dropping hint for {bid:?}, prefetch slots full");
            return;
        }

        let Some(buf) = Self::grab_nonblocking(&mut inner) else {
            log::trace!("dropping hint for {bid:?}, no free buffer");
            return;
        };

        let pending = self.manager.read_block(bid, buf);
        inner.prefetched.push((bid, pending));
    }

    /// Grows or shrinks the write-buffer count
    ///
    /// Shrinking waits for enough in-flight writes to quiesce.
    ///
    /// # Errors
    ///
    /// Will return `Err` if quiescing surfaces a write failure.
    pub fn resize_write(&self, n: usize) -> crate::Result<()> {
        assert!(n >= 2);

        let mut inner = self.inner.lock().expect("lock is poisoned");
        let current = inner.capacity - inner.prefetch_capacity;

        if n > current {
            for _ in current..n {
                inner.free.push(BlockBuf::zeroed(self.manager.block_size()));
            }
            inner.capacity += n - current;
        } else {
            Self::retire(&mut inner, current - n)?;
        }

        Ok(())
    }

    /// Grows or shrinks the prefetch-slot count
    ///
    /// Shrinking waits for evicted prefetches to quiesce.
    ///
    /// # Errors
    ///
    /// Will return `Err` if quiescing surfaces a read failure.
    pub fn resize_prefetch(&self, n: usize) -> crate::Result<()> {
        let mut inner = self.inner.lock().expect("lock is poisoned");
        let current = inner.prefetch_capacity;

        if n > current {
            for _ in current..n {
                inner.free.push(BlockBuf::zeroed(self.manager.block_size()));
            }
            inner.capacity += n - current;
            inner.prefetch_capacity = n;
        } else {
            while inner.prefetched.len() > n {
                let (_, pending) = inner.prefetched.pop().expect("length was checked");
                let buf = pending.wait()?;
                inner.free.push(buf);
            }
            Self::retire(&mut inner, current - n)?;
            inner.prefetch_capacity = n;
        }

        Ok(())
    }

    /// Buffer accounting snapshot
    #[must_use]
    pub fn census(&self) -> PoolCensus {
        let inner = self.inner.lock().expect("lock is poisoned");
        PoolCensus {
            free: inner.free.len(),
            writing: inner.busy_writes.len(),
            prefetching: inner.prefetched.len(),
            capacity: inner.capacity,
        }
    }

    /// Drops `count` buffers from the pool, quiescing writes as needed
    ///
    /// Buffers currently held by clients cannot be retired; the shrink
    /// stops short rather than corrupt the census.
    fn retire(inner: &mut Inner, count: usize) -> crate::Result<()> {
        for _ in 0..count {
            if inner.free.pop().is_some() {
                inner.capacity -= 1;
            } else if let Some(pending) = inner.busy_writes.pop_front() {
                drop(pending.wait()?);
                inner.capacity -= 1;
            } else {
                log::warn!("cannot shrink pool below the buffers held by clients");
                break;
            }
        }

        Ok(())
    }

    /// Moves buffers of completed writes back to the free list without
    /// blocking; returns whether any buffer was reclaimed
    fn reap_completed(inner: &mut Inner) -> crate::Result<bool> {
        let mut reclaimed = false;
        let mut remaining = VecDeque::with_capacity(inner.busy_writes.len());

        for pending in inner.busy_writes.drain(..) {
            match pending.try_wait() {
                Ok(done) => {
                    inner.free.push(done?);
                    reclaimed = true;
                }
                Err(pending) => remaining.push_back(pending),
            }
        }

        inner.busy_writes = remaining;
        Ok(reclaimed)
    }

    /// Only the free list is consulted: reaping a finished write here could
    /// swallow its error, which must surface at the next `steal` instead
    fn grab_nonblocking(inner: &mut Inner) -> Option<BlockBuf> {
        inner.free.pop()
    }
}

impl Drop for ReadWritePool {
    fn drop(&mut self) {
        let mut inner = self.inner.lock().expect("lock is poisoned");

        for pending in inner.busy_writes.drain(..) {
            if let Err(e) = pending.wait() {
                log::error!("write-back failed during pool teardown: {e:?}");
            }
        }

        for (_, pending) in inner.prefetched.drain(..) {
            if let Err(e) = pending.wait() {
                log::error!("prefetch failed during pool teardown: {e:?}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        block::strategy::{AllocStrategy, Allocator},
        Config,
    };
    use test_log::test;

    fn pool(blocks: u64, block_size: usize) -> (Arc<BlockManager>, ReadWritePool) {
        let manager = Config::memory(blocks * block_size as u64)
            .block_size(block_size)
            .open()
            .expect("should open");
        let pool = ReadWritePool::new(Arc::clone(&manager), 2, 2);
        (manager, pool)
    }

    #[test]
    fn conservation_across_operations() -> crate::Result<()> {
        let (manager, pool) = pool(8, 256);
        let mut alloc = Allocator::new(AllocStrategy::Striping);
        let bid = manager.new_block(&mut alloc)?;

        let census = pool.census();
        assert_eq!(4, census.capacity);
        assert_eq!(4, census.free);

        let buf = pool.steal()?;
        assert_eq!(1, pool.census().stolen());

        pool.write(buf, bid).wait()?;
        let buf = pool.steal()?;
        pool.add(buf);

        let census = pool.census();
        assert_eq!(census.capacity, census.free + census.writing + census.prefetching);

        Ok(())
    }

    #[test]
    fn hinted_read_swaps_buffers() -> crate::Result<()> {
        let (manager, pool) = pool(8, 256);
        let mut alloc = Allocator::new(AllocStrategy::Striping);
        let bid = manager.new_block(&mut alloc)?;

        let mut buf = pool.steal()?;
        buf.fill(0x42);
        pool.write(buf, bid).wait()?;

        pool.hint(bid);
        pool.hint(bid); // idempotent
        assert_eq!(1, pool.census().prefetching);

        let probe = pool.steal()?;
        let filled = pool.read(probe, bid).wait()?;
        assert!(filled.iter().all(|b| *b == 0x42));

        // the swapped-in probe buffer went back to the free list, the test
        // still holds the filled one
        let census = pool.census();
        assert_eq!(0, census.prefetching);
        assert_eq!(1, census.stolen());
        assert_eq!(census.capacity, census.free + census.writing + 1);

        pool.add(filled);
        Ok(())
    }

    #[test]
    fn shrink_waits_for_writes() -> crate::Result<()> {
        let (manager, pool) = pool(8, 256);
        let mut alloc = Allocator::new(AllocStrategy::Striping);

        for _ in 0..2 {
            let bid = manager.new_block(&mut alloc)?;
            let buf = pool.steal()?;
            pool.write(buf, bid);
        }

        pool.resize_write(2)?;
        let census = pool.census();
        assert_eq!(4, census.capacity);

        pool.resize_prefetch(0)?;
        assert_eq!(2, pool.census().capacity);

        Ok(())
    }

    #[test]
    fn steal_blocks_until_a_buffer_returns() -> crate::Result<()> {
        let (_manager, pool) = pool(8, 256);
        let pool = Arc::new(pool);

        let mut held = Vec::new();
        for _ in 0..4 {
            held.push(pool.steal()?);
        }
        assert_eq!(4, pool.census().stolen());

        // the fifth steal parks until another thread returns a buffer
        let returner = {
            let pool = Arc::clone(&pool);
            let buf = held.pop().expect("a buffer is held");
            std::thread::spawn(move || {
                std::thread::sleep(std::time::Duration::from_millis(20));
                pool.add(buf);
            })
        };

        let buf = pool.steal()?;
        returner.join().expect("should join");

        pool.add(buf);
        for buf in held {
            pool.add(buf);
        }

        // the buffer count is conserved across the whole sequence
        assert_eq!(4, pool.census().capacity);
        assert_eq!(4, pool.census().free);

        Ok(())
    }
}
