use super::ExtVec;
use crate::{
    block::BlockBuf,
    codec::{encode_block, Record},
    io::PendingIo,
};
use std::collections::VecDeque;

const WRITE_WINDOW: usize = 2;

/// Sequential writer over a vector range, bypassing the page cache for
/// whole blocks
///
/// Records covering complete blocks are encoded and written directly with
/// up to two writes in flight; unaligned head and tail records go through
/// the page cache. Call [`finish`](Self::finish) to make all writes
/// durable before reading the range back.
pub struct VecWriter<'a, T: Record + Default> {
    vec: &'a mut ExtVec<T>,
    pos: usize,
    end: usize,
    staging: Vec<T>,
    window: VecDeque<PendingIo>,
}

impl<'a, T: Record + Default> VecWriter<'a, T> {
    pub(super) fn new(vec: &'a mut ExtVec<T>, start: usize, end: usize) -> Self {
        Self {
            vec,
            pos: start,
            end,
            staging: Vec::new(),
            window: VecDeque::with_capacity(WRITE_WINDOW),
        }
    }

    /// Next index that will be written
    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Returns `true` if the range is fully written
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.pos == self.end
    }

    /// Appends the next record of the range
    ///
    /// # Errors
    ///
    /// Will return `Err` if a block write fails.
    ///
    /// # Panics
    ///
    /// Panics if the range is already fully written.
    pub fn write(&mut self, value: T) -> crate::Result<()> {
        assert!(self.pos < self.end, "write past end of range");

        let block_records = self.vec.block_records();

        // direct writes only start on a page boundary, so no cached page can
        // still hold dirty head records when its blocks are invalidated
        let aligned = self.pos % self.vec.page_records() == 0;

        if !self.staging.is_empty() || (aligned && self.end - self.pos >= block_records) {
            self.staging.push(value);
        } else {
            self.vec.set(self.pos, value)?;
        }

        self.pos += 1;

        if self.staging.len() == block_records {
            self.spill()?;
        }

        Ok(())
    }

    /// Flushes buffered records and waits for outstanding writes
    ///
    /// Returns the index one past the last written record.
    ///
    /// # Errors
    ///
    /// Will return `Err` if a write fails.
    pub fn finish(mut self) -> crate::Result<usize> {
        // a partial tail block goes through the page cache
        let staged = std::mem::take(&mut self.staging);
        let base = self.pos - staged.len();
        for (i, value) in staged.into_iter().enumerate() {
            self.vec.set(base + i, value)?;
        }

        for pending in self.window.drain(..) {
            drop(pending.wait()?);
        }

        self.vec.flush()?;
        Ok(self.pos)
    }

    fn spill(&mut self) -> crate::Result<()> {
        let block = self.pos / self.vec.block_records() - 1;

        let mut buf = BlockBuf::zeroed(self.vec.manager().block_size());
        encode_block(&self.staging, &mut buf)?;
        self.staging.clear();

        if self.window.len() == WRITE_WINDOW {
            let pending = self.window.pop_front().expect("window is full");
            drop(pending.wait()?);
        }

        let bid = self.vec.bids()[block];
        self.window
            .push_back(self.vec.manager().write_block(bid, buf));

        self.vec.invalidate_block(block);
        self.vec.mark_written(block);

        Ok(())
    }
}

impl<T: Record + Default> Drop for VecWriter<'_, T> {
    fn drop(&mut self) {
        if !self.staging.is_empty() {
            log::warn!(
                "vector writer dropped with {} unflushed records",
                self.staging.len()
            );
        }

        for pending in self.window.drain(..) {
            if let Err(e) = pending.wait() {
                log::error!("vector write-back failed during teardown: {e:?}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::ExtVec;
    use crate::{stream::Stream, Config};
    use test_log::test;

    #[test]
    fn unaligned_range_roundtrip() -> crate::Result<()> {
        let manager = Config::memory(1 << 20).block_size(64).open()?;
        let mut vec = ExtVec::<u64>::new(manager);
        vec.resize(50, false)?;

        // start mid-block, cover full blocks, end mid-block
        {
            let mut writer = vec.write_range(3, 45)?;
            for i in 3u64..45 {
                writer.write(i * 7)?;
            }
            assert!(writer.is_full());
            assert_eq!(45, writer.finish()?);
        }

        for i in 3..45 {
            assert_eq!(i as u64 * 7, *vec.get(i)?);
        }

        let mut stream = vec.stream()?;
        for _ in 0..3 {
            stream.advance()?;
        }
        assert_eq!(21, *stream.peek());

        Ok(())
    }
}
