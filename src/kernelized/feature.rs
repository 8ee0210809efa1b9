// Kernel features and candidate combinations

use std::fmt;

use serde::Serialize;

use super::kernel::KernelKind;
use crate::ifdd::FeatureSet;

/// A kernel centered on an observed state, restricted to `dims`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KernelizedFeature {
    pub index: usize,
    /// State at which the kernel peaks; only `dims` entries matter
    pub center: Vec<f64>,
    /// Sorted state dimensions the kernel looks at
    pub dims: Vec<usize>,
    /// Base features combined into this one; `{index}` for a base feature
    pub base_ids: FeatureSet,
}

impl KernelizedFeature {
    pub fn base(index: usize, center: &[f64], dim: usize) -> Self {
        Self {
            index,
            center: center.to_vec(),
            dims: vec![dim],
            base_ids: FeatureSet::singleton(index),
        }
    }

    /// Combination of two features with disjoint dimensions. Dimensions
    /// covered by both parents get the mean of their centers.
    pub fn refined(index: usize, f1: &KernelizedFeature, f2: &KernelizedFeature) -> Self {
        let n = f1.center.len();
        let mut center = vec![0.0; n];
        let mut cnt = vec![0.0; n];
        for f in [f1, f2] {
            for &d in &f.dims {
                center[d] += f.center[d];
                cnt[d] += 1.0;
            }
        }
        for (c, k) in center.iter_mut().zip(&cnt) {
            if *k > 0.0 {
                *c /= k;
            }
        }
        let mut dims: Vec<usize> = f1.dims.iter().chain(&f2.dims).copied().collect();
        dims.sort_unstable();
        dims.dedup();
        Self {
            index,
            center,
            dims,
            base_ids: f1.base_ids.union(&f2.base_ids),
        }
    }

    pub fn is_base(&self) -> bool {
        self.base_ids.len() == 1
    }

    pub fn shares_dims(&self, other: &KernelizedFeature) -> bool {
        self.dims.iter().any(|d| other.dims.contains(d))
    }

    pub fn output(&self, s: &[f64], kernel: &KernelKind, widths: &[f64]) -> f64 {
        kernel.evaluate(s, &self.center, &self.dims, widths)
    }
}

impl fmt::Display for KernelizedFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, id) in self.base_ids.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", id)?;
        }
        write!(f, "}} ")?;
        for (i, &d) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, " s{}={:.3}", d + 1, self.center[d])?;
        }
        Ok(())
    }
}

/// Pair of existing features under evaluation for combination
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Candidate {
    pub idx1: usize,
    pub idx2: usize,
    pub td_error_sum: f64,
    pub activation_count: f64,
}

impl Candidate {
    pub fn new(idx1: usize, idx2: usize) -> Self {
        Self {
            idx1,
            idx2,
            ..Self::default()
        }
    }

    /// Add one observation with parent outputs `phi1`, `phi2`; returns the
    /// updated relevance.
    pub fn update(&mut self, phi1: f64, phi2: f64, td_error: f64) -> f64 {
        self.td_error_sum += phi1 * phi2 * td_error;
        self.activation_count += phi1 * phi1 * phi2 * phi2;
        self.relevance()
    }

    /// `|td_error_sum| / sqrt(activation_count)`, zero before any activation
    pub fn relevance(&self) -> f64 {
        if self.activation_count == 0.0 {
            return 0.0;
        }
        self.td_error_sum.abs() / self.activation_count.sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refined_feature_merges_dims() {
        let f1 = KernelizedFeature::base(0, &[0.2, 0.9, 0.0], 0);
        let f2 = KernelizedFeature::base(3, &[0.7, 0.4, 0.0], 1);
        let r = KernelizedFeature::refined(5, &f1, &f2);
        assert_eq!(r.dims, vec![0, 1]);
        assert_eq!(r.center, vec![0.2, 0.4, 0.0]);
        assert_eq!(r.base_ids, FeatureSet::from_indices([0, 3]));
        assert!(!r.is_base());
        assert!(r.shares_dims(&f1));
        assert!(!f1.shares_dims(&f2));
        assert_eq!(r.to_string(), "{0, 3}  s1=0.200, s2=0.400");
    }

    #[test]
    fn test_candidate_relevance() {
        let mut c = Candidate::new(0, 1);
        assert_eq!(c.relevance(), 0.0);
        assert_eq!(c.update(0.0, 1.0, 3.0), 0.0);
        let rel = c.update(0.5, 0.5, 2.0);
        assert!((rel - 2.0).abs() < 1e-12);
    }
}
