// Ordering of discovered features for scan-based activation resolution
// Most specific (largest f_set) first, newest first among equal sizes

use std::cmp::Reverse;
use std::collections::BTreeMap;

type QueueKey = (Reverse<usize>, Reverse<u64>);

/// Feature indices ordered by `(specificity, novelty)`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NoveltyQueue {
    entries: BTreeMap<QueueKey, usize>,
    // Next insertion sequence number, strictly increasing
    counter: u64,
}

impl NoveltyQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert feature `index` whose conjunction spans `specificity` base
    /// features. Returns the insertion sequence number.
    pub fn push(&mut self, specificity: usize, index: usize) -> u64 {
        let seq = self.counter;
        self.counter += 1;
        self.entries.insert((Reverse(specificity), Reverse(seq)), index);
        seq
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of insertions so far
    pub fn counter(&self) -> u64 {
        self.counter
    }

    /// Feature indices in resolution order
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.entries.values().copied()
    }
}
