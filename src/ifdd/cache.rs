// Memo of resolved activations keyed by the active base-feature set

use std::collections::HashMap;

use super::lattice::FeatureSet;

/// Resolved active features per initial active set
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActivationCache {
    entries: HashMap<FeatureSet, Vec<usize>>,
}

impl ActivationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, initial: &FeatureSet) -> Option<&[usize]> {
        self.entries.get(initial).map(Vec::as_slice)
    }

    pub fn insert(&mut self, initial: FeatureSet, active: Vec<usize>) {
        self.entries.insert(initial, active);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bring the cache up to date after feature `index` with `f_set` was added.
    ///
    /// Entries whose key contains `f_set` are evicted when `sparsify` is set
    /// (consumption may deactivate coarser features); otherwise the new index
    /// is appended. Returns the number of entries touched.
    pub fn invalidate(&mut self, f_set: &FeatureSet, index: usize, sparsify: bool) -> usize {
        if sparsify {
            let before = self.entries.len();
            self.entries.retain(|key, _| !f_set.is_subset_of(key));
            before - self.entries.len()
        } else {
            let mut touched = 0;
            for (key, active) in self.entries.iter_mut() {
                if f_set.is_subset_of(key) {
                    active.push(index);
                    touched += 1;
                }
            }
            touched
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(v: &[usize]) -> FeatureSet {
        FeatureSet::from_indices(v.iter().copied())
    }

    fn filled() -> ActivationCache {
        let mut cache = ActivationCache::new();
        cache.insert(set(&[0, 1]), vec![0, 1]);
        cache.insert(set(&[0, 1, 2]), vec![0, 1, 2]);
        cache.insert(set(&[1, 2]), vec![1, 2]);
        cache
    }

    #[test]
    fn test_invalidate_evicts_with_sparsify() {
        let mut cache = filled();
        assert_eq!(cache.invalidate(&set(&[0, 1]), 3, true), 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&set(&[1, 2])), Some(&[1, 2][..]));
    }

    #[test]
    fn test_invalidate_appends_without_sparsify() {
        let mut cache = filled();
        assert_eq!(cache.invalidate(&set(&[0, 1]), 3, false), 2);
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.get(&set(&[0, 1])), Some(&[0, 1, 3][..]));
        assert_eq!(cache.get(&set(&[0, 1, 2])), Some(&[0, 1, 2, 3][..]));
        assert_eq!(cache.get(&set(&[1, 2])), Some(&[1, 2][..]));
    }
}
