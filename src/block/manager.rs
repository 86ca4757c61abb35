//! Block extent allocation and asynchronous block transfers.

use super::{strategy::Allocator, BlockBuf, BlockId};
use crate::{
    config::Config,
    io::{disk::open_disk, queue::DiskQueue, PendingIo},
};
use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

/// Allocates and reclaims block extents across the configured disks
///
/// One manager is opened per process (or per test) from a [`Config`] and
/// injected into every container as an `Arc` handle. Allocation and
/// deallocation are serialized per disk; I/O is submitted to the per-disk
/// background queues and completes asynchronously.
pub struct BlockManager {
    block_size: usize,
    disks: Vec<DiskShard>,
}

struct DiskShard {
    queue: DiskQueue,
    free: Mutex<FreeList>,
}

/// Free extents of one disk, keyed by byte offset
struct FreeList {
    extents: BTreeMap<u64, u64>,
    live: usize,
}

impl FreeList {
    fn new(capacity: u64, block_size: usize) -> Self {
        let usable = capacity - (capacity % block_size as u64);

        let mut extents = BTreeMap::new();
        if usable > 0 {
            extents.insert(0, usable);
        }

        Self { extents, live: 0 }
    }

    /// First-fit: carves `size` bytes out of the lowest free extent that
    /// can hold them
    fn take(&mut self, size: u64) -> Option<u64> {
        let (&offset, &len) = self.extents.iter().find(|(_, len)| **len >= size)?;

        self.extents.remove(&offset);
        if len > size {
            self.extents.insert(offset + size, len - size);
        }

        self.live += 1;
        Some(offset)
    }

    /// Returns an extent, coalescing it with free neighbors
    fn put(&mut self, offset: u64, size: u64) {
        let mut start = offset;
        let mut len = size;

        if let Some((&prev_start, &prev_len)) = self.extents.range(..offset).next_back() {
            assert!(
                prev_start + prev_len <= offset,
                "freed extent overlaps free space below it"
            );
            if prev_start + prev_len == offset {
                self.extents.remove(&prev_start);
                start = prev_start;
                len += prev_len;
            }
        }

        if let Some((&next_start, &next_len)) = self.extents.range(offset..).next() {
            assert!(
                offset + size <= next_start,
                "freed extent overlaps free space above it"
            );
            if offset + size == next_start {
                self.extents.remove(&next_start);
                len += next_len;
            }
        }

        self.extents.insert(start, len);
        self.live -= 1;
    }
}

impl BlockManager {
    /// Opens a manager over the config's disks
    ///
    /// # Errors
    ///
    /// Will return `Err` if the config is invalid or a backing file cannot
    /// be opened.
    pub fn open(config: Config) -> crate::Result<Arc<Self>> {
        config.validate()?;

        let block_size = config.block_size;
        let mut disks = Vec::with_capacity(config.disks.len());

        for (index, spec) in config.disks.iter().enumerate() {
            let disk: Arc<dyn crate::io::disk::Disk> = Arc::from(open_disk(spec)?);

            log::debug!(
                "disk {index}: {} blocks of {block_size} B at {}",
                spec.capacity_bytes / block_size as u64,
                spec.path.display()
            );

            disks.push(DiskShard {
                queue: DiskQueue::spawn(index, disk),
                free: Mutex::new(FreeList::new(spec.capacity_bytes, block_size)),
            });
        }

        Ok(Arc::new(Self { block_size, disks }))
    }

    /// Block size every extent handed out by this manager has
    #[must_use]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Number of configured disks
    #[must_use]
    pub fn disk_count(&self) -> usize {
        self.disks.len()
    }

    /// Allocates one block, choosing the disk per the allocator's strategy
    /// and falling back to the next disk when the chosen one is full
    ///
    /// # Errors
    ///
    /// Will return `Err(OutOfSpace)` if every disk is exhausted.
    pub fn new_block(&self, alloc: &mut Allocator) -> crate::Result<BlockId> {
        let preferred = alloc.next_disk(self.disks.len());
        self.carve(preferred)
    }

    /// Allocates `n` blocks, preserving the strategy's placement locality
    ///
    /// # Errors
    ///
    /// Will return `Err(OutOfSpace)` if the batch cannot be fully satisfied;
    /// partially carved blocks are returned to the free lists first.
    pub fn new_blocks(&self, alloc: &mut Allocator, n: usize) -> crate::Result<Vec<BlockId>> {
        let picks = alloc.next_disks(self.disks.len(), n);

        let mut bids = Vec::with_capacity(n);
        for preferred in picks {
            match self.carve(preferred) {
                Ok(bid) => bids.push(bid),
                Err(e) => {
                    self.delete_blocks(bids.iter().copied());
                    return Err(e);
                }
            }
        }

        Ok(bids)
    }

    fn carve(&self, preferred: usize) -> crate::Result<BlockId> {
        for probe in 0..self.disks.len() {
            let disk = (preferred + probe) % self.disks.len();
            let mut free = self.disks[disk].free.lock().expect("lock is poisoned");

            if let Some(offset) = free.take(self.block_size as u64) {
                // NOTE: Truncation is fine, disk counts and block sizes are small
                #[allow(clippy::cast_possible_truncation)]
                return Ok(BlockId {
                    disk: disk as u16,
                    offset,
                    size: self.block_size as u32,
                });
            }
        }

        log::warn!("all {} disks exhausted", self.disks.len());
        Err(crate::Error::OutOfSpace)
    }

    /// Returns a block's extent to its disk's free list
    ///
    /// # Panics
    ///
    /// Panics if the id was already freed (double free corrupts the
    /// allocation invariant).
    pub fn delete_block(&self, bid: BlockId) {
        let mut free = self.disks[bid.disk()]
            .free
            .lock()
            .expect("lock is poisoned");

        free.put(bid.offset, u64::from(bid.size));
    }

    /// Frees every block in the range
    pub fn delete_blocks(&self, bids: impl IntoIterator<Item = BlockId>) {
        for bid in bids {
            self.delete_block(bid);
        }
    }

    /// Submits an asynchronous read of `bid` into `buf`
    ///
    /// # Panics
    ///
    /// Panics if the buffer size does not match the extent size.
    pub fn read_block(&self, bid: BlockId, buf: BlockBuf) -> PendingIo {
        assert_eq!(buf.len(), bid.size());
        self.disks[bid.disk()].queue.submit_read(buf, bid.offset)
    }

    /// Submits an asynchronous write of `buf` to `bid`
    ///
    /// # Panics
    ///
    /// Panics if the buffer size does not match the extent size.
    pub fn write_block(&self, bid: BlockId, buf: BlockBuf) -> PendingIo {
        assert_eq!(buf.len(), bid.size());
        self.disks[bid.disk()].queue.submit_write(buf, bid.offset)
    }

    /// Number of live (allocated, not yet freed) blocks across all disks
    #[must_use]
    pub fn live_blocks(&self) -> usize {
        self.disks
            .iter()
            .map(|d| d.free.lock().expect("lock is poisoned").live)
            .sum()
    }

    /// Free capacity in bytes across all disks
    #[must_use]
    pub fn free_bytes(&self) -> u64 {
        self.disks
            .iter()
            .map(|d| {
                d.free
                    .lock()
                    .expect("lock is poisoned")
                    .extents
                    .values()
                    .sum::<u64>()
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::strategy::AllocStrategy;
    use test_log::test;

    fn manager(blocks: u64, block_size: usize) -> Arc<BlockManager> {
        Config::memory(blocks * block_size as u64)
            .block_size(block_size)
            .open()
            .expect("should open")
    }

    #[test]
    fn alloc_free_coalesces() -> crate::Result<()> {
        let manager = manager(4, 512);
        let mut alloc = Allocator::new(AllocStrategy::Striping);

        let a = manager.new_block(&mut alloc)?;
        let b = manager.new_block(&mut alloc)?;
        let c = manager.new_block(&mut alloc)?;
        assert_eq!(3, manager.live_blocks());

        manager.delete_block(b);
        manager.delete_block(a);
        manager.delete_block(c);
        assert_eq!(0, manager.live_blocks());

        // the whole disk must be one extent again
        assert_eq!(4 * 512, manager.free_bytes());

        Ok(())
    }

    #[test]
    fn exhaustion_reports_out_of_space() -> crate::Result<()> {
        let manager = manager(2, 512);
        let mut alloc = Allocator::new(AllocStrategy::Striping);

        let bids = manager.new_blocks(&mut alloc, 2)?;
        assert!(matches!(
            manager.new_block(&mut alloc),
            Err(crate::Error::OutOfSpace)
        ));

        manager.delete_blocks(bids);
        assert!(manager.new_block(&mut alloc).is_ok());

        Ok(())
    }

    #[test]
    fn failed_batch_rolls_back() {
        let manager = manager(3, 512);
        let mut alloc = Allocator::new(AllocStrategy::Striping);

        assert!(matches!(
            manager.new_blocks(&mut alloc, 4),
            Err(crate::Error::OutOfSpace)
        ));
        assert_eq!(0, manager.live_blocks());
    }

    #[test]
    fn block_io_roundtrip() -> crate::Result<()> {
        let manager = manager(2, 512);
        let mut alloc = Allocator::new(AllocStrategy::Striping);
        let bid = manager.new_block(&mut alloc)?;

        let buf = BlockBuf::zeroed(512).filled(0x5A);
        let buf = manager.write_block(bid, buf).wait()?;
        let buf = manager.read_block(bid, buf).wait()?;

        assert!(buf.iter().all(|b| *b == 0x5A));
        Ok(())
    }
}
