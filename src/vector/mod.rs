pub mod pager;
pub mod reader;
pub mod writer;

use crate::{
    block::{
        manager::BlockManager,
        strategy::{AllocStrategy, Allocator},
        BlockBuf, BlockId,
    },
    codec::{decode_block, encode_block, Record},
};
use pager::{Pager, PagerKind};
use reader::VecReader;
use std::sync::Arc;
use writer::VecWriter;

/// Paged-vector tuning knobs
#[derive(Clone, Copy, Debug)]
pub struct VecOptions {
    /// Blocks per cache page
    pub page_blocks: usize,

    /// Number of cached pages
    pub cache_pages: usize,

    /// Page replacement policy
    pub pager: PagerKind,

    /// Disk placement strategy for freshly allocated blocks
    pub strategy: AllocStrategy,
}

impl Default for VecOptions {
    fn default() -> Self {
        Self {
            page_blocks: 1,
            cache_pages: 2,
            pager: PagerKind::Lru,
            strategy: AllocStrategy::Striping,
        }
    }
}

struct PageSlot<T> {
    page_no: usize,
    items: Vec<T>,
    dirty: bool,
}

/// Random-access array of records backed by external-memory blocks
///
/// A small direct cache of pages (groups of consecutive blocks) absorbs
/// locality; a page touched by a write carries a dirty flag and is written
/// back on eviction or [`flush`](Self::flush). Whole-vector scans should
/// use [`stream`](Self::stream) and [`write_range`](Self::write_range),
/// which bypass the page cache.
pub struct ExtVec<T: Record + Default> {
    manager: Arc<BlockManager>,
    alloc: Allocator,
    options: VecOptions,

    bids: Vec<BlockId>,
    written: Vec<bool>,
    spare_bids: Vec<BlockId>,
    len: usize,

    block_records: usize,
    slots: Vec<Option<PageSlot<T>>>,
    pager: Pager,
}

impl<T: Record + Default> ExtVec<T> {
    /// Creates an empty vector with default paging (LRU over 2 one-block
    /// pages)
    #[must_use]
    pub fn new(manager: Arc<BlockManager>) -> Self {
        Self::with_options(manager, VecOptions::default())
    }

    /// Creates an empty vector with explicit paging options
    ///
    /// # Panics
    ///
    /// Panics if a block cannot hold a single record, or if the cache has
    /// no pages.
    #[must_use]
    pub fn with_options(manager: Arc<BlockManager>, options: VecOptions) -> Self {
        let block_records = manager.block_size() / T::SIZE;
        assert!(block_records > 0);
        assert!(options.cache_pages > 0);
        assert!(options.page_blocks > 0);

        Self {
            manager,
            alloc: Allocator::new(options.strategy),
            options,

            bids: Vec::new(),
            written: Vec::new(),
            spare_bids: Vec::new(),
            len: 0,

            block_records,
            slots: (0..options.cache_pages).map(|_| None).collect(),
            pager: Pager::new(options.pager, options.cache_pages),
        }
    }

    /// Number of records
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the vector holds no records
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Records per page
    pub(crate) fn page_records(&self) -> usize {
        self.block_records * self.options.page_blocks
    }

    /// Reads the record at `index`
    ///
    /// Brings the containing page into the cache, evicting per policy.
    ///
    /// # Errors
    ///
    /// Will return `Err` if paging I/O fails.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len`.
    pub fn get(&mut self, index: usize) -> crate::Result<&T> {
        assert!(index < self.len, "vector index out of range");

        let slot = self.load_page(index / self.page_records())?;
        let offset = index % self.page_records();
        Ok(&self.slots[slot].as_ref().expect("slot was loaded").items[offset])
    }

    /// Overwrites the record at `index`, marking its page dirty
    ///
    /// # Errors
    ///
    /// Will return `Err` if paging I/O fails.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len`.
    pub fn set(&mut self, index: usize, value: T) -> crate::Result<()> {
        assert!(index < self.len, "vector index out of range");

        let slot = self.load_page(index / self.page_records())?;
        let offset = index % self.page_records();

        let page = self.slots[slot].as_mut().expect("slot was loaded");
        page.items[offset] = value;
        page.dirty = true;

        Ok(())
    }

    /// Appends a record, allocating a tail block when needed
    ///
    /// # Errors
    ///
    /// Will return `Err` on allocation exhaustion or paging I/O failure.
    pub fn push(&mut self, value: T) -> crate::Result<()> {
        let new_len = self.len + 1;
        self.resize(new_len, false)?;
        self.set(new_len - 1, value)
    }

    /// Resizes to `n` records
    ///
    /// Growing allocates blocks at the tail; records revealed by growth
    /// read as `T::default()` until written. Shrinking with
    /// `shrink = true` releases the now-unused tail blocks immediately,
    /// otherwise they are kept for reuse by a later grow.
    ///
    /// # Errors
    ///
    /// Will return `Err` on allocation exhaustion.
    pub fn resize(&mut self, n: usize, shrink: bool) -> crate::Result<()> {
        let needed = n.div_ceil(self.block_records);

        if needed > self.bids.len() {
            while self.bids.len() < needed {
                if let Some(bid) = self.spare_bids.pop() {
                    self.bids.push(bid);
                } else {
                    break;
                }
                self.written.push(false);
            }

            if self.bids.len() < needed {
                let fresh = self
                    .manager
                    .new_blocks(&mut self.alloc, needed - self.bids.len())?;
                self.written.extend(fresh.iter().map(|_| false));
                self.bids.extend(fresh);
            }
        } else if needed < self.bids.len() {
            let tail: Vec<BlockId> = self.bids.drain(needed..).collect();
            self.written.truncate(needed);

            // cached pages past the new tail are dropped, not written back
            let first_dead_page = needed.div_ceil(self.options.page_blocks);
            for slot in &mut self.slots {
                if slot.as_ref().is_some_and(|s| s.page_no >= first_dead_page) {
                    *slot = None;
                }
            }

            if shrink {
                self.manager.delete_blocks(tail);
            } else {
                self.spare_bids.extend(tail);
            }
        }

        if n < self.len {
            // default-fill the cut-off tail of the boundary block so a later
            // grow reveals defaults, not stale records
            let keep = n % self.block_records;
            if keep != 0 {
                let boundary_block = n / self.block_records;
                let slot = self.load_page(boundary_block / self.options.page_blocks)?;

                let block_in_page = boundary_block % self.options.page_blocks;
                let start = block_in_page * self.block_records + keep;
                let end = (block_in_page + 1) * self.block_records;

                let page = self.slots[slot].as_mut().expect("slot was loaded");
                for item in &mut page.items[start..end] {
                    *item = T::default();
                }
                page.dirty = true;
            }
        }

        self.len = n;
        Ok(())
    }

    /// Writes back every dirty page and empties the cache
    ///
    /// # Errors
    ///
    /// Will return `Err` if a write-back fails.
    pub fn flush(&mut self) -> crate::Result<()> {
        for slot in 0..self.slots.len() {
            self.evict(slot)?;
        }
        Ok(())
    }

    /// Exchanges the contents of two vectors
    pub fn swap(&mut self, other: &mut Self) {
        std::mem::swap(self, other);
    }

    /// Marks the cached copy of `block` (if any) stale so the next access
    /// reloads it from disk
    pub fn invalidate_block(&mut self, block: usize) {
        let page_no = block / self.options.page_blocks;
        for slot in &mut self.slots {
            if slot.as_ref().is_some_and(|s| s.page_no == page_no) {
                *slot = None;
            }
        }
    }

    /// Opens a sequential read stream over the whole vector
    ///
    /// Flushes the cache first so the stream observes all writes; the
    /// stream itself bypasses the page cache.
    ///
    /// # Errors
    ///
    /// Will return `Err` if flushing or opening the first block fails.
    pub fn stream(&mut self) -> crate::Result<VecReader<'_, T>> {
        self.flush()?;
        self.ensure_written(self.len.div_ceil(self.block_records))?;
        VecReader::new(self)
    }

    /// Opens a sequential writer over `[start, end)`, bypassing the page
    /// cache for whole blocks
    ///
    /// # Errors
    ///
    /// Will return `Err` if flushing fails.
    ///
    /// # Panics
    ///
    /// Panics if the range is invalid or extends past the vector.
    pub fn write_range(&mut self, start: usize, end: usize) -> crate::Result<VecWriter<'_, T>> {
        assert!(start <= end && end <= self.len);
        self.flush()?;
        Ok(VecWriter::new(self, start, end))
    }

    pub(crate) fn manager(&self) -> &Arc<BlockManager> {
        &self.manager
    }

    pub(crate) fn block_records(&self) -> usize {
        self.block_records
    }

    pub(crate) fn bids(&self) -> &[BlockId] {
        &self.bids
    }

    pub(crate) fn mark_written(&mut self, block: usize) {
        self.written[block] = true;
    }

    /// Persists default-valued blocks for any block in `[0, upto)` that was
    /// never written, so sequential readers never see a short read
    fn ensure_written(&mut self, upto: usize) -> crate::Result<()> {
        let defaults: Vec<T> = (0..self.block_records).map(|_| T::default()).collect();

        let mut pending = Vec::new();
        for block in 0..upto {
            if !self.written[block] {
                let mut buf = BlockBuf::zeroed(self.manager.block_size());
                encode_block(&defaults, &mut buf)?;
                pending.push(self.manager.write_block(self.bids[block], buf));
                self.written[block] = true;
            }
        }

        for p in pending {
            drop(p.wait()?);
        }

        Ok(())
    }

    /// Returns the cache slot holding `page_no`, faulting it in on a miss
    fn load_page(&mut self, page_no: usize) -> crate::Result<usize> {
        if let Some(slot) = self
            .slots
            .iter()
            .position(|s| s.as_ref().is_some_and(|s| s.page_no == page_no))
        {
            self.pager.touch(slot);
            return Ok(slot);
        }

        let slot = match self.slots.iter().position(Option::is_none) {
            Some(empty) => empty,
            None => {
                let victim = self.pager.victim();
                self.evict(victim)?;
                victim
            }
        };

        log::trace!("vector page fault: page {page_no} -> slot {slot}");

        let first_block = page_no * self.options.page_blocks;
        let mut items = Vec::with_capacity(self.page_records());

        // submit every read of the page before waiting on any of them
        let mut reads = Vec::with_capacity(self.options.page_blocks);
        for block in first_block..first_block + self.options.page_blocks {
            if block < self.bids.len() && self.written[block] {
                let buf = BlockBuf::zeroed(self.manager.block_size());
                reads.push(Some(self.manager.read_block(self.bids[block], buf)));
            } else {
                reads.push(None);
            }
        }

        for read in reads {
            match read {
                Some(pending) => {
                    let buf = pending.wait()?;
                    items.extend(decode_block::<T>(&buf, self.block_records)?);
                }
                None => items.extend((0..self.block_records).map(|_| T::default())),
            }
        }

        self.slots[slot] = Some(PageSlot {
            page_no,
            items,
            dirty: false,
        });
        self.pager.touch(slot);

        Ok(slot)
    }

    /// Writes a slot back if dirty and clears it
    fn evict(&mut self, slot: usize) -> crate::Result<()> {
        let Some(page) = self.slots[slot].take() else {
            return Ok(());
        };

        if !page.dirty {
            return Ok(());
        }

        let first_block = page.page_no * self.options.page_blocks;

        let mut writes = Vec::new();
        for (i, chunk) in page.items.chunks(self.block_records).enumerate() {
            let block = first_block + i;
            if block >= self.bids.len() {
                break;
            }

            let mut buf = BlockBuf::zeroed(self.manager.block_size());
            encode_block(chunk, &mut buf)?;
            writes.push(self.manager.write_block(self.bids[block], buf));
            self.written[block] = true;
        }

        for write in writes {
            drop(write.wait()?);
        }

        Ok(())
    }
}

impl<T: Record + Default> Drop for ExtVec<T> {
    fn drop(&mut self) {
        // blocks are scratch; free the extents, nothing to persist
        self.manager.delete_blocks(self.bids.drain(..));
        self.manager.delete_blocks(self.spare_bids.drain(..));
    }
}

/// Fills `vec` with values produced by `gen`, through the sequential
/// writer
///
/// # Errors
///
/// Will return `Err` if writing fails.
pub fn generate<T: Record + Default>(
    vec: &mut ExtVec<T>,
    mut gen: impl FnMut() -> T,
) -> crate::Result<()> {
    let len = vec.len();
    let mut writer = vec.write_range(0, len)?;
    for _ in 0..len {
        writer.write(gen())?;
    }
    writer.finish()?;
    Ok(())
}
