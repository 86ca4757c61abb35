//! External run creation and k-way merging, the sort-merge backbone.

use super::Stream;
use crate::{
    block::{manager::BlockManager, strategy::AllocStrategy, BlockId},
    bufstream::{BufIstream, BufOstream},
    codec::Record,
    pool::{PoolCensus, ReadWritePool},
};
use std::{cmp::Ordering, sync::Arc};

/// Buffers kept in flight behind a run writer
const RUN_WRITE_BUFFERS: usize = 2;

/// One sorted run: its block chain and key range
pub struct RunInfo<T> {
    bids: Vec<BlockId>,
    len: usize,

    /// Smallest key of the run
    pub first: T,

    /// Largest key of the run
    pub last: T,
}

/// A persisted, immutable set of sorted runs
///
/// Produced by [`RunsCreator::result`], consumed by a [`RunsMerger`]. The
/// backing blocks are freed when this descriptor drops, which happens when
/// the merger completes.
pub struct SortedRuns<T> {
    manager: Arc<BlockManager>,
    runs: Vec<RunInfo<T>>,
    len: usize,
}

impl<T> SortedRuns<T> {
    /// Number of runs
    #[must_use]
    pub fn run_count(&self) -> usize {
        self.runs.len()
    }

    /// Total records across all runs
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the descriptor holds no records
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<T> Drop for SortedRuns<T> {
    fn drop(&mut self) {
        for run in &mut self.runs {
            self.manager.delete_blocks(run.bids.drain(..));
        }
    }
}

/// Push-mode run builder: accumulates records up to the memory budget,
/// sorts them in place and spills each batch as one sorted run
pub struct RunsCreator<T, C> {
    manager: Arc<BlockManager>,
    pool: Arc<ReadWritePool>,
    cmp: C,

    staging: Vec<T>,
    run_records: usize,
    runs: Vec<RunInfo<T>>,
    len: usize,
}

impl<T, C> RunsCreator<T, C>
where
    T: Record + Default,
    C: Fn(&T, &T) -> Ordering,
{
    /// Creates a run builder honoring `memory_budget` bytes, covering the
    /// staging array and the write-back buffers
    #[must_use]
    pub fn new(manager: Arc<BlockManager>, cmp: C, memory_budget: usize) -> Self {
        let block_size = manager.block_size();
        let block_records = block_size / T::SIZE;

        let budget_blocks = (memory_budget / block_size).max(2);
        let staging_blocks = budget_blocks.saturating_sub(RUN_WRITE_BUFFERS).max(1);

        let pool = Arc::new(ReadWritePool::new(Arc::clone(&manager), 0, RUN_WRITE_BUFFERS));

        Self {
            manager,
            pool,
            cmp,

            staging: Vec::with_capacity(staging_blocks * block_records),
            run_records: staging_blocks * block_records,
            runs: Vec::new(),
            len: 0,
        }
    }

    /// Total records pushed
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if nothing was pushed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Feeds one record
    ///
    /// # Errors
    ///
    /// Will return `Err` on allocation exhaustion or run write failure.
    pub fn push(&mut self, value: T) -> crate::Result<()> {
        self.staging.push(value);
        self.len += 1;

        if self.staging.len() == self.run_records {
            self.flush_run()?;
        }

        Ok(())
    }

    /// Spills the partial run and frees the staging array early
    ///
    /// # Errors
    ///
    /// Will return `Err` if the spill fails.
    pub fn deallocate(&mut self) -> crate::Result<()> {
        if !self.staging.is_empty() {
            self.flush_run()?;
        }
        self.staging = Vec::new();
        Ok(())
    }

    /// Finishes run creation, yielding the descriptor
    ///
    /// # Errors
    ///
    /// Will return `Err` if spilling the final run fails.
    pub fn result(mut self) -> crate::Result<SortedRuns<T>> {
        if !self.staging.is_empty() {
            self.flush_run()?;
        }

        Ok(SortedRuns {
            manager: Arc::clone(&self.manager),
            runs: std::mem::take(&mut self.runs),
            len: self.len,
        })
    }

    fn flush_run(&mut self) -> crate::Result<()> {
        self.staging.sort_unstable_by(&self.cmp);

        let count = self.staging.len();
        log::debug!("spilling sorted run {} with {count} records", self.runs.len());

        let first = self.staging.first().expect("run is not empty").clone();
        let last = self.staging.last().expect("run is not empty").clone();

        let mut writer = BufOstream::new(Arc::clone(&self.pool), AllocStrategy::Striping);
        for value in self.staging.drain(..) {
            writer.push(value)?;
        }

        self.runs.push(RunInfo {
            bids: writer.finish()?,
            len: count,
            first,
            last,
        });

        Ok(())
    }
}

/// Tournament tree over tape indices: O(log k) to find the next winner
///
/// Internal nodes remember the loser of their match; replaying the path
/// from a changed leaf to the root restores the winner at slot 0.
struct LoserTree {
    tree: Vec<usize>,
    k: usize,
}

impl LoserTree {
    fn new(k: usize, beats: impl Fn(usize, usize) -> bool) -> Self {
        let mut this = Self {
            tree: vec![0; k.max(1)],
            k,
        };

        if k > 1 {
            let winner = this.build(1, &beats);
            this.tree[0] = winner;
        }

        this
    }

    fn build(&mut self, node: usize, beats: &impl Fn(usize, usize) -> bool) -> usize {
        if node >= self.k {
            return node - self.k;
        }

        let left = self.build(2 * node, beats);
        let right = self.build(2 * node + 1, beats);

        if beats(left, right) {
            self.tree[node] = right;
            left
        } else {
            self.tree[node] = left;
            right
        }
    }

    fn winner(&self) -> usize {
        self.tree[0]
    }

    /// Re-runs the matches on the path of `tape` after its head changed
    fn replay(&mut self, tape: usize, beats: impl Fn(usize, usize) -> bool) {
        let mut winner = tape;
        let mut node = (self.k + tape) / 2;

        while node >= 1 {
            let loser = self.tree[node];
            if beats(loser, winner) {
                self.tree[node] = winner;
                winner = loser;
            }
            node /= 2;
        }

        self.tree[0] = winner;
    }
}

/// Buffers per tape and merge arity for a budget of `m` blocks
fn merge_shape(m: usize, runs: usize) -> (usize, usize) {
    let arity = (m / 2).max(2);
    let tapes = runs.min(arity).max(1);
    let buffers = ((m / 2) / tapes).max(1);
    (arity, buffers)
}

/// Pull-mode k-way merge over a [`SortedRuns`] descriptor
///
/// Opens one buffered tape per run and pops the minimum via a loser tree;
/// ties on equal keys resolve by run index ascending. When the run count
/// exceeds the arity the budget allows, intermediate merge passes reduce
/// it first.
pub struct RunsMerger<T: Record, C> {
    runs: SortedRuns<T>,
    pool: Arc<ReadWritePool>,
    tapes: Vec<BufIstream<T>>,
    tree: LoserTree,
    cmp: C,
    current: Option<T>,
}

impl<T, C> RunsMerger<T, C>
where
    T: Record + Default,
    C: Fn(&T, &T) -> Ordering,
{
    /// Opens a merger over `runs`, honoring `memory_budget` bytes for tape
    /// buffers and intermediate passes
    ///
    /// # Errors
    ///
    /// Will return `Err` if an intermediate pass or the first refills fail.
    pub fn new(mut runs: SortedRuns<T>, cmp: C, memory_budget: usize) -> crate::Result<Self> {
        let manager = Arc::clone(&runs.manager);
        let m = (memory_budget / manager.block_size()).max(2);
        let (arity, _) = merge_shape(m, runs.run_count());

        // one pool for every tape and intermediate pass: its buffer count is
        // the budget, so peak residency cannot exceed it
        let capacity = m.max(arity + 1);
        let pool = Arc::new(ReadWritePool::new(Arc::clone(&manager), 0, capacity));

        // multi-pass: fold the oldest `arity` runs into one until the fan-in
        // fits the budget
        while runs.runs.len() > arity {
            log::debug!(
                "intermediate merge: {} runs exceed arity {arity}",
                runs.runs.len()
            );
            let batch: Vec<RunInfo<T>> = runs.runs.drain(..arity).collect();
            let merged = merge_once(&pool, batch, &cmp)?;
            runs.runs.insert(0, merged);
        }

        let (_, buffers) = merge_shape(m, runs.run_count());

        let mut tapes = Vec::with_capacity(runs.run_count());
        for run in &runs.runs {
            tapes.push(BufIstream::new(
                Arc::clone(&pool),
                run.bids.clone(),
                buffers,
                run.len,
            )?);
        }

        let tree = LoserTree::new(tapes.len(), |i, j| beats(&tapes, &cmp, i, j));

        let mut merger = Self {
            runs,
            pool,
            tapes,
            tree,
            cmp,
            current: None,
        };
        merger.refresh();

        Ok(merger)
    }

    /// Records left to produce, including the current one
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.tapes.iter().map(BufIstream::len).sum()
    }

    /// Buffer accounting of the merge pool, for asserting peak residency
    #[must_use]
    pub fn census(&self) -> PoolCensus {
        self.pool.census()
    }

    fn refresh(&mut self) {
        let winner = self.tree.winner();
        self.current = self
            .tapes
            .get(winner)
            .filter(|tape| !tape.is_empty())
            .map(|tape| tape.peek().clone());
    }
}

fn beats<T, C: Fn(&T, &T) -> Ordering>(
    tapes: &[BufIstream<T>],
    cmp: &C,
    i: usize,
    j: usize,
) -> bool
where
    T: Record,
{
    match (tapes[i].is_empty(), tapes[j].is_empty()) {
        (false, true) => true,
        (true, false) => false,
        (true, true) => i < j,
        (false, false) => match cmp(tapes[i].peek(), tapes[j].peek()) {
            Ordering::Less => true,
            Ordering::Greater => false,
            Ordering::Equal => i < j,
        },
    }
}

impl<T, C> Stream for RunsMerger<T, C>
where
    T: Record + Default,
    C: Fn(&T, &T) -> Ordering,
{
    type Item = T;

    fn is_empty(&self) -> bool {
        self.current.is_none()
    }

    fn peek(&self) -> &T {
        self.current.as_ref().expect("peek on empty merger")
    }

    fn advance(&mut self) -> crate::Result<()> {
        assert!(!self.is_empty());

        let winner = self.tree.winner();
        self.tapes[winner].advance()?;

        let Self {
            tapes, tree, cmp, ..
        } = self;
        tree.replay(winner, |i, j| beats(tapes, cmp, i, j));

        self.refresh();
        Ok(())
    }
}

/// Single bounded merge pass: folds `batch` into one run using one buffer
/// per tape and one behind the writer
fn merge_once<T, C>(
    pool: &Arc<ReadWritePool>,
    mut batch: Vec<RunInfo<T>>,
    cmp: &C,
) -> crate::Result<RunInfo<T>>
where
    T: Record + Default,
    C: Fn(&T, &T) -> Ordering,
{
    let len: usize = batch.iter().map(|r| r.len).sum();

    let mut tapes = Vec::with_capacity(batch.len());
    for run in &batch {
        tapes.push(BufIstream::new(
            Arc::clone(pool),
            run.bids.clone(),
            1,
            run.len,
        )?);
    }

    let mut tree = LoserTree::new(tapes.len(), |i, j| beats(&tapes, cmp, i, j));
    let mut writer = BufOstream::new(Arc::clone(pool), AllocStrategy::Striping);

    let mut first = None;
    let mut last = None;

    for _ in 0..len {
        let winner = tree.winner();
        let value = tapes[winner].peek().clone();

        if first.is_none() {
            first = Some(value.clone());
        }
        last = Some(value.clone());

        writer.push(value)?;
        tapes[winner].advance()?;
        tree.replay(winner, |i, j| beats(&tapes, cmp, i, j));
    }

    // sources are consumed; return their buffers and free their blocks
    // before the next pass opens new tapes
    drop(tapes);
    for run in &mut batch {
        pool.manager().delete_blocks(run.bids.drain(..));
    }

    Ok(RunInfo {
        bids: writer.finish()?,
        len,
        first: first.expect("merged batch is never empty"),
        last: last.expect("merged batch is never empty"),
    })
}

/// Push-sort-pull facade over a creator/merger pair
///
/// Feed records with [`push`](Self::push), switch phases with
/// [`sort`](Self::sort), then drain it as a [`Stream`].
pub struct Sorter<T, C>
where
    T: Record + Default,
    C: Fn(&T, &T) -> Ordering + Clone,
{
    state: SorterState<T, C>,
    cmp: C,
    budget: usize,
}

enum SorterState<T, C>
where
    T: Record + Default,
    C: Fn(&T, &T) -> Ordering,
{
    Filling(RunsCreator<T, C>),
    Draining(RunsMerger<T, C>),
    Poisoned,
}

impl<T, C> Sorter<T, C>
where
    T: Record + Default,
    C: Fn(&T, &T) -> Ordering + Clone,
{
    /// Creates a sorter with the given comparator and memory budget
    #[must_use]
    pub fn new(manager: Arc<BlockManager>, cmp: C, memory_budget: usize) -> Self {
        Self {
            state: SorterState::Filling(RunsCreator::new(manager, cmp.clone(), memory_budget)),
            cmp,
            budget: memory_budget,
        }
    }

    /// Feeds one record
    ///
    /// # Errors
    ///
    /// Will return `Err` if spilling a run fails.
    ///
    /// # Panics
    ///
    /// Panics if the sorter was already switched to draining.
    pub fn push(&mut self, value: T) -> crate::Result<()> {
        match &mut self.state {
            SorterState::Filling(creator) => creator.push(value),
            _ => panic!("push after sort"),
        }
    }

    /// Number of records fed
    #[must_use]
    pub fn len(&self) -> usize {
        match &self.state {
            SorterState::Filling(creator) => creator.len(),
            SorterState::Draining(merger) => merger.remaining(),
            SorterState::Poisoned => 0,
        }
    }

    /// Returns `true` if the sorter holds no records
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Spills staged records early, freeing the staging memory
    ///
    /// # Errors
    ///
    /// Will return `Err` if the spill fails.
    pub fn finish(&mut self) -> crate::Result<()> {
        match &mut self.state {
            SorterState::Filling(creator) => creator.deallocate(),
            _ => Ok(()),
        }
    }

    /// Switches from filling to draining with the construction-time budget
    ///
    /// # Errors
    ///
    /// Will return `Err` if building the merger fails.
    pub fn sort(&mut self) -> crate::Result<()> {
        self.sort_with(self.budget)
    }

    /// Switches from filling to draining with an explicit merge budget
    ///
    /// # Errors
    ///
    /// Will return `Err` if building the merger fails.
    ///
    /// # Panics
    ///
    /// Panics if the sorter was already switched to draining.
    pub fn sort_with(&mut self, memory_budget: usize) -> crate::Result<()> {
        match std::mem::replace(&mut self.state, SorterState::Poisoned) {
            SorterState::Filling(creator) => {
                let runs = creator.result()?;
                let merger = RunsMerger::new(runs, self.cmp.clone(), memory_budget)?;
                self.state = SorterState::Draining(merger);
                Ok(())
            }
            _ => panic!("sort called twice"),
        }
    }
}

impl<T, C> Stream for Sorter<T, C>
where
    T: Record + Default,
    C: Fn(&T, &T) -> Ordering + Clone,
{
    type Item = T;

    fn is_empty(&self) -> bool {
        match &self.state {
            SorterState::Draining(merger) => merger.is_empty(),
            _ => panic!("stream access before sort"),
        }
    }

    fn peek(&self) -> &T {
        match &self.state {
            SorterState::Draining(merger) => merger.peek(),
            _ => panic!("stream access before sort"),
        }
    }

    fn advance(&mut self) -> crate::Result<()> {
        match &mut self.state {
            SorterState::Draining(merger) => merger.advance(),
            _ => panic!("stream access before sort"),
        }
    }
}
