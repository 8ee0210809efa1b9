// Feature vectors evaluated at a state
// Stored densely; callers iterate the non-zero entries in ascending index order

use serde::{Deserialize, Serialize};

/// Feature vector phi(s), one value per feature
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureVector {
    values: Vec<f64>,
}

impl FeatureVector {
    /// All-zero vector of length `len`
    pub fn zeros(len: usize) -> Self {
        Self {
            values: vec![0.0; len],
        }
    }

    /// Binary vector of length `len` with ones at `active`
    pub fn from_active(len: usize, active: &[usize]) -> Self {
        let mut values = vec![0.0; len];
        for &i in active {
            values[i] = 1.0;
        }
        Self { values }
    }

    pub fn from_values(values: Vec<f64>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value of feature `i`, zero when out of range
    pub fn get(&self, i: usize) -> f64 {
        self.values.get(i).copied().unwrap_or(0.0)
    }

    pub fn set(&mut self, i: usize, value: f64) {
        self.values[i] = value;
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    /// Indices of the non-zero features, ascending
    pub fn active_indices(&self) -> Vec<usize> {
        self.iter_active().map(|(i, _)| i).collect()
    }

    /// Non-zero `(index, value)` pairs, ascending by index
    pub fn iter_active(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.values
            .iter()
            .enumerate()
            .filter(|(_, v)| **v != 0.0)
            .map(|(i, v)| (i, *v))
    }

    /// Number of non-zero features
    pub fn nnz(&self) -> usize {
        self.values.iter().filter(|v| **v != 0.0).count()
    }

    pub fn is_zero(&self) -> bool {
        self.nnz() == 0
    }

    /// Dot product against a weight block of the same length
    pub fn dot(&self, weights: &[f64]) -> f64 {
        debug_assert_eq!(self.values.len(), weights.len());
        self.iter_active().map(|(i, v)| v * weights[i]).sum()
    }

    pub fn sum(&self) -> f64 {
        self.values.iter().sum()
    }

    /// Divide every entry by the plain sum, leaving an all-zero-sum vector untouched
    pub fn normalize_sum(&mut self) {
        let total = self.sum();
        if total != 0.0 {
            for v in &mut self.values {
                *v /= total;
            }
        }
    }
}
