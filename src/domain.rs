// Read-only description of the MDP domain a representation is built for
// Representations consume these descriptors; they never step or mutate the domain

use serde::{Deserialize, Serialize};

use crate::error::{FddError, FddResult};

/// Closed interval `[min, max]` covered by one state dimension
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DimLimits {
    pub min: f64,
    pub max: f64,
}

impl DimLimits {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Width of the interval
    pub fn width(&self) -> f64 {
        self.max - self.min
    }

    /// Whether `value` lies inside the closed interval
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Domain descriptors consumed by representations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainSpec {
    /// Per-dimension `[min, max]` limits of the state space
    pub statespace_limits: Vec<DimLimits>,
    /// Dimensions that require discretization; all others are already discrete
    #[serde(default)]
    pub continuous_dims: Vec<usize>,
    /// Number of actions available in the domain
    pub actions_num: usize,
    /// Discount factor of the domain (gamma)
    #[serde(default = "default_discount_factor")]
    pub discount_factor: f64,
}

fn default_discount_factor() -> f64 {
    0.9
}

impl DomainSpec {
    /// Create and validate a domain description
    pub fn new(
        statespace_limits: Vec<DimLimits>,
        continuous_dims: Vec<usize>,
        actions_num: usize,
        discount_factor: f64,
    ) -> FddResult<Self> {
        let domain = Self {
            statespace_limits,
            continuous_dims,
            actions_num,
            discount_factor,
        };
        domain.validate()?;
        Ok(domain)
    }

    /// Convenience constructor for a domain where every dimension is discrete
    pub fn discrete(limits: &[(f64, f64)], actions_num: usize) -> FddResult<Self> {
        Self::new(
            limits.iter().map(|&(lo, hi)| DimLimits::new(lo, hi)).collect(),
            Vec::new(),
            actions_num,
            default_discount_factor(),
        )
    }

    /// Convenience constructor for a domain where every dimension is continuous
    pub fn continuous(limits: &[(f64, f64)], actions_num: usize) -> FddResult<Self> {
        Self::new(
            limits.iter().map(|&(lo, hi)| DimLimits::new(lo, hi)).collect(),
            (0..limits.len()).collect(),
            actions_num,
            default_discount_factor(),
        )
    }

    /// Number of state dimensions
    pub fn state_space_dims(&self) -> usize {
        self.statespace_limits.len()
    }

    /// Whether dimension `dim` is continuous
    pub fn is_continuous(&self, dim: usize) -> bool {
        self.continuous_dims.contains(&dim)
    }

    /// Check the descriptors for values no representation can be built on
    pub fn validate(&self) -> FddResult<()> {
        if self.actions_num == 0 {
            return Err(FddError::config("domain must expose at least one action"));
        }
        if self.statespace_limits.is_empty() {
            return Err(FddError::config("domain must have at least one state dimension"));
        }
        for (d, limits) in self.statespace_limits.iter().enumerate() {
            if !limits.min.is_finite() || !limits.max.is_finite() || limits.max < limits.min {
                return Err(FddError::config(format!(
                    "invalid limits [{}, {}] for dimension {}",
                    limits.min, limits.max, d
                )));
            }
        }
        if let Some(&d) = self
            .continuous_dims
            .iter()
            .find(|&&d| d >= self.state_space_dims())
        {
            return Err(FddError::config(format!(
                "continuous dimension {} does not exist (state has {} dimensions)",
                d,
                self.state_space_dims()
            )));
        }
        if !(0.0..=1.0).contains(&self.discount_factor) {
            return Err(FddError::config(format!(
                "discount factor {} is outside [0, 1]",
                self.discount_factor
            )));
        }
        Ok(())
    }

    /// Validate only the dimensionality of a state
    pub fn check_state_dims(&self, s: &[f64]) -> FddResult<()> {
        if s.len() != self.state_space_dims() {
            return Err(FddError::invalid_argument(format!(
                "state has {} components, domain has {} dimensions",
                s.len(),
                self.state_space_dims()
            )));
        }
        Ok(())
    }

    /// Validate the dimensionality and bounds of a state
    pub fn check_state(&self, s: &[f64]) -> FddResult<()> {
        self.check_state_dims(s)?;
        for (d, (&value, limits)) in s.iter().zip(&self.statespace_limits).enumerate() {
            if !limits.contains(value) {
                return Err(FddError::state_out_of_bounds(d, value, limits.min, limits.max));
            }
        }
        Ok(())
    }

    /// Validate an action index
    pub fn check_action(&self, a: usize) -> FddResult<()> {
        if a >= self.actions_num {
            return Err(FddError::invalid_argument(format!(
                "action {} out of range (domain has {} actions)",
                a, self.actions_num
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_bad_domains() {
        assert!(DomainSpec::discrete(&[(0.0, 3.0)], 0).unwrap_err().is_config());
        assert!(DomainSpec::discrete(&[(2.0, 1.0)], 2).unwrap_err().is_config());
        assert!(DomainSpec::new(vec![DimLimits::new(0.0, 1.0)], vec![3], 2, 0.9)
            .unwrap_err()
            .is_config());
        assert!(DomainSpec::new(vec![DimLimits::new(0.0, 1.0)], vec![], 2, 1.5)
            .unwrap_err()
            .is_config());
    }

    #[test]
    fn test_check_state() {
        let domain = DomainSpec::continuous(&[(0.0, 1.0), (-1.0, 1.0)], 2).unwrap();
        assert!(domain.check_state(&[0.5, 0.0]).is_ok());
        assert!(domain.check_state(&[1.0, -1.0]).is_ok());
        assert!(matches!(
            domain.check_state(&[0.5]),
            Err(FddError::InvalidArgument { .. })
        ));
        assert!(matches!(
            domain.check_state(&[0.5, 1.5]),
            Err(FddError::StateOutOfBounds { dim: 1, .. })
        ));
    }

    #[test]
    fn test_check_state_dims_ignores_bounds() {
        let domain = DomainSpec::continuous(&[(0.0, 1.0), (-1.0, 1.0)], 2).unwrap();
        assert!(domain.check_state_dims(&[7.0, -3.0]).is_ok());
        assert!(domain.check_state_dims(&[0.5]).is_err());
    }
}
