use rand::{rngs::StdRng, Rng, SeedableRng};
use std::collections::VecDeque;

/// Page replacement policy of the vector cache
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum PagerKind {
    /// Evict the least recently touched page
    #[default]
    Lru,

    /// Evict a uniformly random page
    Random,
}

/// Tracks recency over a fixed set of cache slots and picks eviction
/// victims
pub struct Pager {
    kind: PagerKind,
    order: VecDeque<usize>,
    rng: StdRng,
}

impl Pager {
    #[must_use]
    pub fn new(kind: PagerKind, slots: usize) -> Self {
        Self {
            kind,
            order: (0..slots).collect(),
            rng: StdRng::from_entropy(),
        }
    }

    /// Marks a slot as most recently used
    pub fn touch(&mut self, slot: usize) {
        self.order.retain(|s| *s != slot);
        self.order.push_back(slot);
    }

    /// Picks the slot to evict next
    pub fn victim(&mut self) -> usize {
        match self.kind {
            PagerKind::Lru => {
                let slot = self.order.pop_front().expect("pager has slots");
                self.order.push_back(slot);
                slot
            }
            PagerKind::Random => {
                let idx = self.rng.gen_range(0..self.order.len());
                self.order[idx]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn lru_evicts_least_recent() {
        let mut pager = Pager::new(PagerKind::Lru, 2);

        pager.touch(0);
        pager.touch(1);
        pager.touch(0);

        assert_eq!(1, pager.victim());
    }
}
