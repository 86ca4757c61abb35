//! Parallel-disk block placement strategies.

use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};

/// Parallel-disk placement policy for freshly allocated blocks
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum AllocStrategy {
    /// Deterministic round-robin: disk = counter mod D
    #[default]
    Striping,

    /// Uniform random disk per allocation
    SimpleRandom,

    /// Uniform random, reshuffled independently for every batch
    FullyRandom,

    /// A fresh random permutation of the disks every D allocations
    RandomCyclic,
}

/// Stateful disk chooser owned by one container
///
/// Each container carries its own allocator so the striping phase and the
/// random-cyclic permutation are private to it.
pub struct Allocator {
    strategy: AllocStrategy,
    counter: u64,
    rng: StdRng,
    cycle: Vec<usize>,
}

impl Allocator {
    /// Creates an allocator with its own placement state
    #[must_use]
    pub fn new(strategy: AllocStrategy) -> Self {
        Self {
            strategy,
            counter: 0,
            rng: StdRng::from_entropy(),
            cycle: Vec::new(),
        }
    }

    /// Picks the disk for the next single allocation
    pub(crate) fn next_disk(&mut self, disks: usize) -> usize {
        debug_assert!(disks > 0);

        let pick = match self.strategy {
            AllocStrategy::Striping => (self.counter % disks as u64) as usize,
            AllocStrategy::SimpleRandom | AllocStrategy::FullyRandom => {
                self.rng.gen_range(0..disks)
            }
            AllocStrategy::RandomCyclic => {
                let pos = (self.counter % disks as u64) as usize;
                if pos == 0 || self.cycle.len() != disks {
                    self.cycle = (0..disks).collect();
                    self.cycle.shuffle(&mut self.rng);
                }
                self.cycle[pos]
            }
        };

        self.counter += 1;
        pick
    }

    /// Picks disks for a batch of `n` allocations, preserving the
    /// strategy's locality
    pub(crate) fn next_disks(&mut self, disks: usize, n: usize) -> Vec<usize> {
        match self.strategy {
            AllocStrategy::FullyRandom => {
                // reshuffle per batch: spread the batch evenly, then permute
                let mut picks: Vec<usize> = (0..n).map(|i| i % disks).collect();
                picks.shuffle(&mut self.rng);
                self.counter += n as u64;
                picks
            }
            _ => (0..n).map(|_| self.next_disk(disks)).collect(),
        }
    }
}
