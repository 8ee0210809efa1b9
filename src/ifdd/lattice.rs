// Arena of base and discovered features, indexed by position and by f_set

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::queue::NoveltyQueue;

/// Sorted, duplicate-free set of base-feature indices
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FeatureSet(Vec<usize>);

impl FeatureSet {
    pub fn singleton(index: usize) -> Self {
        Self(vec![index])
    }

    pub fn from_indices(indices: impl IntoIterator<Item = usize>) -> Self {
        let mut v: Vec<usize> = indices.into_iter().collect();
        v.sort_unstable();
        v.dedup();
        Self(v)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().copied()
    }

    pub fn contains(&self, index: usize) -> bool {
        self.0.binary_search(&index).is_ok()
    }

    pub fn union(&self, other: &FeatureSet) -> FeatureSet {
        let (a, b) = (&self.0, &other.0);
        let mut out = Vec::with_capacity(a.len() + b.len());
        let (mut i, mut j) = (0, 0);
        while i < a.len() && j < b.len() {
            match a[i].cmp(&b[j]) {
                std::cmp::Ordering::Less => {
                    out.push(a[i]);
                    i += 1;
                }
                std::cmp::Ordering::Greater => {
                    out.push(b[j]);
                    j += 1;
                }
                std::cmp::Ordering::Equal => {
                    out.push(a[i]);
                    i += 1;
                    j += 1;
                }
            }
        }
        out.extend_from_slice(&a[i..]);
        out.extend_from_slice(&b[j..]);
        FeatureSet(out)
    }

    /// Whether every element of `self` is in `other`
    pub fn is_subset_of(&self, other: &FeatureSet) -> bool {
        let mut rest = other.0.iter();
        self.0.iter().all(|x| rest.by_ref().any(|y| y == x))
    }

    /// Remove every element of `other` from `self`
    pub fn remove_all(&mut self, other: &FeatureSet) {
        self.0.retain(|x| !other.contains(*x));
    }
}

impl FromIterator<usize> for FeatureSet {
    fn from_iter<T: IntoIterator<Item = usize>>(iter: T) -> Self {
        Self::from_indices(iter)
    }
}

impl fmt::Display for FeatureSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, x) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", x)?;
        }
        write!(f, "]")
    }
}

/// A base or discovered feature
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Feature {
    /// Position in the feature vector; never reused
    pub index: usize,
    /// Base features whose joint activation this feature represents
    pub f_set: FeatureSet,
    /// Features whose union produced this one; `None` for base features
    pub parents: Option<(usize, usize)>,
}

impl Feature {
    pub fn is_base(&self) -> bool {
        self.parents.is_none()
    }
}

/// All features of a discovering representation.
///
/// `features[i].index == i` always holds, and no two features share an `f_set`.
#[derive(Debug, Clone, Default)]
pub struct FeatureLattice {
    features: Vec<Feature>,
    by_set: HashMap<FeatureSet, usize>,
    sorted: NoveltyQueue,
}

impl FeatureLattice {
    /// Lattice holding `base_features_num` singleton features
    pub fn with_base_features(base_features_num: usize) -> Self {
        let mut lattice = Self::default();
        for i in 0..base_features_num {
            lattice.register(FeatureSet::singleton(i), None);
        }
        lattice
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Feature> {
        self.features.get(index)
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn index_of(&self, f_set: &FeatureSet) -> Option<usize> {
        self.by_set.get(f_set).copied()
    }

    pub fn contains(&self, f_set: &FeatureSet) -> bool {
        self.by_set.contains_key(f_set)
    }

    /// Features in scan-resolution order
    pub fn iter_by_novelty(&self) -> impl Iterator<Item = &Feature> + '_ {
        self.sorted.iter().map(move |i| &self.features[i])
    }

    /// `f_set` of the conjunction of features `g` and `h`
    pub fn union_of(&self, g: usize, h: usize) -> Option<FeatureSet> {
        let g = self.features.get(g)?;
        let h = self.features.get(h)?;
        Some(g.f_set.union(&h.f_set))
    }

    /// Add a discovered feature and return its index.
    ///
    /// Inserting an `f_set` already present is a programming error.
    pub fn insert(&mut self, f_set: FeatureSet, parents: (usize, usize)) -> usize {
        self.register(f_set, Some(parents))
    }

    fn register(&mut self, f_set: FeatureSet, parents: Option<(usize, usize)>) -> usize {
        debug_assert!(!self.by_set.contains_key(&f_set), "duplicate f_set {}", f_set);
        let index = self.features.len();
        self.sorted.push(f_set.len(), index);
        self.by_set.insert(f_set.clone(), index);
        self.features.push(Feature {
            index,
            f_set,
            parents,
        });
        index
    }

    /// Final active features for the active base features `initial`.
    ///
    /// With `sparsify`, base indices covered by an activated feature are
    /// consumed and cannot activate any coarser feature.
    pub fn resolve(&self, initial: &FeatureSet, sparsify: bool) -> Vec<usize> {
        let k = initial.len();
        let enumerate = k < usize::BITS as usize && (1usize << k) <= self.len();
        if enumerate {
            self.resolve_by_enumeration(initial, sparsify)
        } else {
            self.resolve_by_scan(initial, sparsify)
        }
    }

    /// Walk subsets of the active set from largest to smallest, most recent
    /// feature first within a size
    pub(crate) fn resolve_by_enumeration(&self, initial: &FeatureSet, sparsify: bool) -> Vec<usize> {
        let mut remaining = initial.clone();
        let mut active = Vec::new();
        for size in (1..=initial.len()).rev() {
            if remaining.is_empty() {
                break;
            }
            let mut candidates: Vec<usize> = combinations(remaining.as_slice(), size)
                .into_iter()
                .filter_map(|c| self.index_of(&FeatureSet(c)))
                .collect();
            candidates.sort_unstable_by(|a, b| b.cmp(a));
            for index in candidates {
                if remaining.is_empty() {
                    break;
                }
                let f_set = &self.features[index].f_set;
                if f_set.is_subset_of(&remaining) {
                    active.push(index);
                    if sparsify {
                        remaining.remove_all(f_set);
                    }
                }
            }
        }
        active
    }

    /// Single pass over the novelty-sorted feature list
    pub(crate) fn resolve_by_scan(&self, initial: &FeatureSet, sparsify: bool) -> Vec<usize> {
        let mut remaining = initial.clone();
        let mut active = Vec::new();
        for feature in self.iter_by_novelty() {
            if remaining.is_empty() {
                break;
            }
            if feature.f_set.is_subset_of(&remaining) {
                active.push(feature.index);
                if sparsify {
                    remaining.remove_all(&feature.f_set);
                }
            }
        }
        active
    }
}

/// All `k`-element combinations of `items`, in lexicographic position order
pub fn combinations(items: &[usize], k: usize) -> Vec<Vec<usize>> {
    let n = items.len();
    if k == 0 || k > n {
        return Vec::new();
    }
    let mut out = Vec::new();
    let mut idx: Vec<usize> = (0..k).collect();
    loop {
        out.push(idx.iter().map(|&i| items[i]).collect());
        // rightmost position that can still advance
        let mut i = k;
        while i > 0 && idx[i - 1] == i - 1 + n - k {
            i -= 1;
        }
        if i == 0 {
            return out;
        }
        idx[i - 1] += 1;
        for j in i..k {
            idx[j] = idx[j - 1] + 1;
        }
    }
}

/// Every unordered pair `(items[i], items[j])` with `i < j`
pub fn pairs(items: &[usize]) -> impl Iterator<Item = (usize, usize)> + '_ {
    items
        .iter()
        .enumerate()
        .flat_map(move |(i, &g)| items[i + 1..].iter().map(move |&h| (g, h)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(v: &[usize]) -> FeatureSet {
        FeatureSet::from_indices(v.iter().copied())
    }

    #[test]
    fn test_feature_set_ops() {
        let a = set(&[3, 1, 3]);
        assert_eq!(a.as_slice(), &[1, 3]);
        assert_eq!(a.union(&set(&[2, 3])).as_slice(), &[1, 2, 3]);
        assert!(a.is_subset_of(&set(&[0, 1, 2, 3])));
        assert!(!a.is_subset_of(&set(&[1, 2])));
        assert!(FeatureSet::default().is_subset_of(&a));
        assert_eq!(a.to_string(), "[1, 3]");

        let mut b = set(&[0, 1, 2, 3]);
        b.remove_all(&a);
        assert_eq!(b.as_slice(), &[0, 2]);
    }

    #[test]
    fn test_combinations() {
        assert_eq!(
            combinations(&[5, 6, 7], 2),
            vec![vec![5, 6], vec![5, 7], vec![6, 7]]
        );
        assert_eq!(combinations(&[5, 6, 7], 3), vec![vec![5, 6, 7]]);
        assert!(combinations(&[5], 2).is_empty());
        assert_eq!(
            pairs(&[1, 4, 9]).collect::<Vec<_>>(),
            vec![(1, 4), (1, 9), (4, 9)]
        );
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut lattice = FeatureLattice::with_base_features(3);
        assert_eq!(lattice.len(), 3);
        assert!(lattice.get(0).unwrap().is_base());

        let f = lattice.union_of(0, 2).unwrap();
        let index = lattice.insert(f.clone(), (0, 2));
        assert_eq!(index, 3);
        assert_eq!(lattice.index_of(&f), Some(3));
        assert_eq!(lattice.get(3).unwrap().parents, Some((0, 2)));
        assert!(lattice.union_of(0, 7).is_none());
    }

    #[test]
    fn test_resolution_paths_agree() {
        let mut lattice = FeatureLattice::with_base_features(6);
        lattice.insert(set(&[0, 2]), (0, 2));
        lattice.insert(set(&[0, 4]), (0, 4));
        lattice.insert(set(&[0, 2, 4]), (6, 4));
        lattice.insert(set(&[1, 4]), (1, 4));

        for sparsify in [true, false] {
            for initial in [set(&[0, 2, 4]), set(&[0, 1, 4]), set(&[1, 3, 5]), set(&[0, 2])] {
                let mut by_enum = lattice.resolve_by_enumeration(&initial, sparsify);
                let mut by_scan = lattice.resolve_by_scan(&initial, sparsify);
                by_enum.sort_unstable();
                by_scan.sort_unstable();
                assert_eq!(by_enum, by_scan, "initial {} sparsify {}", initial, sparsify);
            }
        }

        let mut active = lattice.resolve(&set(&[0, 2, 4]), true);
        active.sort_unstable();
        assert_eq!(active, vec![8]);

        let mut active = lattice.resolve(&set(&[0, 1, 4]), true);
        active.sort_unstable();
        assert_eq!(active, vec![0, 9]);
    }

    #[test]
    fn test_resolution_without_sparsify_keeps_coarse_features() {
        let mut lattice = FeatureLattice::with_base_features(2);
        lattice.insert(set(&[0, 1]), (0, 1));
        let mut active = lattice.resolve(&set(&[0, 1]), false);
        active.sort_unstable();
        assert_eq!(active, vec![0, 1, 2]);
    }
}
