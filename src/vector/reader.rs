use super::ExtVec;
use crate::{bufstream::BufIstream, codec::Record, pool::ReadWritePool, stream::Stream};
use std::{marker::PhantomData, sync::Arc};

/// Sequential scan over a whole vector, bypassing the page cache
///
/// Carries its own small read pool; the buffered stream steals from it and
/// returns the buffers when the scan drops. Holds the vector borrowed for
/// its lifetime so the blocks it reads stay allocated.
pub struct VecReader<'a, T: Record + Default> {
    inner: BufIstream<T>,
    _vec: PhantomData<&'a ExtVec<T>>,
}

const SCAN_BUFFERS: usize = 2;

impl<'a, T: Record + Default> VecReader<'a, T> {
    pub(super) fn new(vec: &'a ExtVec<T>) -> crate::Result<Self> {
        let blocks = vec.len().div_ceil(vec.block_records());
        let bids = vec.bids()[..blocks].to_vec();

        let pool = Arc::new(ReadWritePool::new(
            Arc::clone(vec.manager()),
            0,
            SCAN_BUFFERS,
        ));

        Ok(Self {
            inner: BufIstream::new(pool, bids, SCAN_BUFFERS, vec.len())?,
            _vec: PhantomData,
        })
    }

    /// Number of records left
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.inner.len()
    }
}

impl<T: Record + Default> Stream for VecReader<'_, T> {
    type Item = T;

    fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    fn peek(&self) -> &T {
        self.inner.peek()
    }

    fn advance(&mut self) -> crate::Result<()> {
        self.inner.advance()
    }
}
