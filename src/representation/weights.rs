// Per-action block vectors: the linear weights and the agent's eligibility trace
// Layout is `actions_num` contiguous blocks of `features_num` entries

use serde::{Deserialize, Serialize};

use super::features::FeatureVector;

/// Insert one new column into every per-action block of `x`.
///
/// `new_elem` supplies one value per action; `None` inserts zeros.
/// `[1, 2, 3, 4]` with two actions becomes `[1, 2, 0, 3, 4, 0]`.
pub fn add_new_element_for_all_actions(
    x: &[f64],
    actions_num: usize,
    new_elem: Option<&[f64]>,
) -> Vec<f64> {
    add_new_elements_for_all_actions(x, actions_num, 1, |a, _| {
        new_elem.map(|e| e[a]).unwrap_or(0.0)
    })
}

/// Insert `count` new columns into every per-action block of `x`,
/// with `fill(action, column)` giving the value of each new slot.
pub fn add_new_elements_for_all_actions(
    x: &[f64],
    actions_num: usize,
    count: usize,
    fill: impl Fn(usize, usize) -> f64,
) -> Vec<f64> {
    debug_assert!(actions_num > 0);
    debug_assert_eq!(x.len() % actions_num, 0);
    let block = x.len() / actions_num;
    let mut out = Vec::with_capacity(x.len() + count * actions_num);
    for a in 0..actions_num {
        out.extend_from_slice(&x[a * block..(a + 1) * block]);
        out.extend((0..count).map(|j| fill(a, j)));
    }
    out
}

/// How the weight of a newly discovered feature is initialized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightInit {
    /// New slot starts at zero
    Zero,
    /// New slot starts at the sum of the two parents' weights in the same block
    ParentSum,
}

/// Linear weights, one per `(feature, action)` pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightVector {
    values: Vec<f64>,
    actions_num: usize,
}

impl WeightVector {
    pub fn zeros(features_num: usize, actions_num: usize) -> Self {
        Self {
            values: vec![0.0; features_num * actions_num],
            actions_num,
        }
    }

    /// Wrap existing values; the length must be a multiple of `actions_num`
    pub fn from_values(values: Vec<f64>, actions_num: usize) -> Option<Self> {
        if actions_num == 0 || values.len() % actions_num != 0 {
            return None;
        }
        Some(Self {
            values,
            actions_num,
        })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn actions_num(&self) -> usize {
        self.actions_num
    }

    pub fn features_num(&self) -> usize {
        self.values.len() / self.actions_num
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.values
    }

    /// Start and end offsets of the block belonging to action `a`
    pub fn block_range(&self, a: usize) -> (usize, usize) {
        let f = self.features_num();
        (a * f, (a + 1) * f)
    }

    pub fn block(&self, a: usize) -> &[f64] {
        let (start, end) = self.block_range(a);
        &self.values[start..end]
    }

    pub fn block_mut(&mut self, a: usize) -> &mut [f64] {
        let (start, end) = self.block_range(a);
        &mut self.values[start..end]
    }

    /// Weight of feature `f` for action `a`
    pub fn get(&self, f: usize, a: usize) -> f64 {
        self.values[a * self.features_num() + f]
    }

    /// Masked dot product of `phi` against the block of action `a`
    pub fn dot_block(&self, a: usize, phi: &FeatureVector) -> f64 {
        phi.dot(self.block(a))
    }

    /// Grow by one feature, inserting one slot per action block
    pub fn add_feature(&mut self, new_elem: Option<&[f64]>) {
        self.values = add_new_element_for_all_actions(&self.values, self.actions_num, new_elem);
    }

    /// Grow by one feature whose slot per action is the sum of `p1` and `p2`
    pub fn add_parent_sum_feature(&mut self, p1: usize, p2: usize) {
        let elem: Vec<f64> = (0..self.actions_num)
            .map(|a| self.get(p1, a) + self.get(p2, a))
            .collect();
        self.add_feature(Some(&elem));
    }

    /// Whether every weight is finite
    pub fn is_finite(&self) -> bool {
        self.values.iter().all(|w| w.is_finite())
    }
}

/// Eligibility trace over state-action features, kept in the weight layout
#[derive(Debug, Clone, PartialEq)]
pub struct EligibilityTrace {
    values: Vec<f64>,
    actions_num: usize,
}

impl EligibilityTrace {
    pub fn zeros(features_num: usize, actions_num: usize) -> Self {
        Self {
            values: vec![0.0; features_num * actions_num],
            actions_num,
        }
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn features_num(&self) -> usize {
        self.values.len() / self.actions_num
    }

    /// Pad every action block with zeros until it covers `features_num` features.
    /// Returns the number of features added.
    pub fn grow_to(&mut self, features_num: usize) -> usize {
        let current = self.features_num();
        if features_num <= current {
            return 0;
        }
        let added = features_num - current;
        self.values =
            add_new_elements_for_all_actions(&self.values, self.actions_num, added, |_, _| 0.0);
        added
    }

    pub fn decay(&mut self, factor: f64) {
        for e in &mut self.values {
            *e *= factor;
        }
    }

    /// Add `phi` into the block of action `a`
    pub fn accumulate(&mut self, a: usize, phi: &FeatureVector) {
        let f = self.features_num();
        for (i, v) in phi.iter_active() {
            self.values[a * f + i] += v;
        }
    }

    /// Replace the trace with `phi` placed in the block of action `a`
    pub fn replace(&mut self, a: usize, phi: &FeatureVector) {
        self.values = vec![0.0; phi.len() * self.actions_num];
        self.accumulate(a, phi);
    }

    pub fn cap(&mut self, max: f64) {
        for e in &mut self.values {
            if *e > max {
                *e = max;
            }
        }
    }

    pub fn reset(&mut self) {
        self.values.iter_mut().for_each(|e| *e = 0.0);
    }
}
