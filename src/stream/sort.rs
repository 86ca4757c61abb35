//! The compound sort operator.

use super::{
    runs::{RunsCreator, RunsMerger},
    Stream,
};
use crate::{block::manager::BlockManager, codec::Record};
use std::{cmp::Ordering, sync::Arc};

/// Compound sort operator: builds sorted runs from its input, then merges
/// them
///
/// The input stream is drained during construction (run creation is the
/// expensive, blocking half of the operator); afterwards the node behaves
/// like any other pull stream. Peak memory stays within `memory_budget`
/// for both phases, since they never overlap.
pub struct Sort<T, C>
where
    T: Record + Default,
    C: Fn(&T, &T) -> Ordering + Clone,
{
    merger: RunsMerger<T, C>,
}

impl<T, C> Sort<T, C>
where
    T: Record + Default,
    C: Fn(&T, &T) -> Ordering + Clone,
{
    /// Sorts `input` under `cmp` within `memory_budget` bytes
    ///
    /// # Errors
    ///
    /// Will return `Err` on allocation exhaustion or I/O failure while
    /// building or opening the runs.
    pub fn new<S>(
        manager: Arc<BlockManager>,
        mut input: S,
        cmp: C,
        memory_budget: usize,
    ) -> crate::Result<Self>
    where
        S: Stream<Item = T>,
    {
        let mut creator = RunsCreator::new(manager, cmp.clone(), memory_budget);

        while !input.is_empty() {
            creator.push(input.peek().clone())?;
            input.advance()?;
        }

        log::debug!("sort: created runs over {} records", creator.len());

        let runs = creator.result()?;
        let merger = RunsMerger::new(runs, cmp, memory_budget)?;

        Ok(Self { merger })
    }

    /// Records left to produce, including the current one
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.merger.remaining()
    }
}

impl<T, C> Stream for Sort<T, C>
where
    T: Record + Default,
    C: Fn(&T, &T) -> Ordering + Clone,
{
    type Item = T;

    fn is_empty(&self) -> bool {
        self.merger.is_empty()
    }

    fn peek(&self) -> &T {
        self.merger.peek()
    }

    fn advance(&mut self) -> crate::Result<()> {
        self.merger.advance()
    }
}
