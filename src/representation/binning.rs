// Discretization of the state space into per-dimension bins

use serde::{Deserialize, Serialize};

use crate::domain::DomainSpec;
use crate::error::{FddError, FddResult};

/// Bin layout derived from a domain and a discretization level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Binning {
    domain: DomainSpec,
    discretization: usize,
    bins_per_dim: Vec<usize>,
    bin_width_per_dim: Vec<f64>,
}

impl Binning {
    /// Continuous dimensions get `discretization` bins; discrete dimensions get
    /// one bin per integer step of their range.
    pub fn new(domain: &DomainSpec, discretization: usize) -> FddResult<Self> {
        domain.validate()?;
        let mut bins_per_dim = Vec::with_capacity(domain.state_space_dims());
        let mut bin_width_per_dim = Vec::with_capacity(domain.state_space_dims());
        for (d, limits) in domain.statespace_limits.iter().enumerate() {
            let bins = if domain.is_continuous(d) {
                discretization
            } else {
                limits.width() as usize
            };
            if bins == 0 {
                return Err(FddError::config(format!(
                    "dimension {} would have zero bins (range [{}, {}], discretization {})",
                    d, limits.min, limits.max, discretization
                )));
            }
            bins_per_dim.push(bins);
            bin_width_per_dim.push(limits.width() / bins as f64);
        }
        Ok(Self {
            domain: domain.clone(),
            discretization,
            bins_per_dim,
            bin_width_per_dim,
        })
    }

    pub fn domain(&self) -> &DomainSpec {
        &self.domain
    }

    pub fn discretization(&self) -> usize {
        self.discretization
    }

    pub fn bins_per_dim(&self) -> &[usize] {
        &self.bins_per_dim
    }

    pub fn bin_width_per_dim(&self) -> &[f64] {
        &self.bin_width_per_dim
    }

    /// Total number of bins over all dimensions
    pub fn total_bins(&self) -> usize {
        self.bins_per_dim.iter().sum()
    }

    /// Number of aggregated states (product of the bins)
    pub fn agg_states_num(&self) -> u64 {
        self.bins_per_dim.iter().map(|&b| b as u64).product()
    }

    /// Zero-based bin of each state component. The upper limit of a
    /// dimension falls into its last bin.
    pub fn bin_state(&self, s: &[f64]) -> FddResult<Vec<usize>> {
        self.domain.check_state(s)?;
        Ok(s.iter()
            .zip(&self.domain.statespace_limits)
            .zip(&self.bins_per_dim)
            .map(|((&value, limits), &bins)| {
                let width = limits.width();
                if width == 0.0 {
                    return 0;
                }
                let b = ((value - limits.min) * bins as f64 / width) as usize;
                b.min(bins - 1)
            })
            .collect())
    }

    /// Index of the active base feature in every dimension, with each
    /// dimension's bins laid out after those of the previous dimensions.
    pub fn active_initial_features(&self, s: &[f64]) -> FddResult<Vec<usize>> {
        let bs = self.bin_state(s)?;
        let mut shift = 0;
        Ok(bs
            .into_iter()
            .zip(&self.bins_per_dim)
            .map(|(b, &bins)| {
                let index = b + shift;
                shift += bins;
                index
            })
            .collect())
    }

    /// Unique id of the bin that contains `s`
    pub fn hash_state(&self, s: &[f64]) -> FddResult<u64> {
        let bs = self.bin_state(s)?;
        Ok(bs
            .iter()
            .zip(&self.bins_per_dim)
            .fold(0u64, |id, (&b, &bins)| id * bins as u64 + b as u64))
    }

    /// Snap `s` to the center of the bin containing it
    pub fn state_in_the_middle_of_grid(&self, s: &[f64]) -> FddResult<Vec<f64>> {
        let bs = self.bin_state(s)?;
        Ok(bs
            .iter()
            .enumerate()
            .map(|(d, &b)| {
                let min = self.domain.statespace_limits[d].min;
                min + self.bin_width_per_dim[d] * (b as f64 + 0.5)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DimLimits;

    fn mixed_domain() -> DomainSpec {
        DomainSpec::new(
            vec![DimLimits::new(0.0, 1.0), DimLimits::new(0.0, 3.0)],
            vec![0],
            2,
            0.9,
        )
        .unwrap()
    }

    #[test]
    fn test_bins_per_dim() {
        let binning = Binning::new(&mixed_domain(), 4).unwrap();
        assert_eq!(binning.bins_per_dim(), &[4, 3]);
        assert_eq!(binning.total_bins(), 7);
        assert_eq!(binning.agg_states_num(), 12);
        assert_eq!(binning.bin_width_per_dim(), &[0.25, 1.0]);
    }

    #[test]
    fn test_bin_state_clamps_upper_edge() {
        let binning = Binning::new(&mixed_domain(), 4).unwrap();
        assert_eq!(binning.bin_state(&[0.0, 0.0]).unwrap(), vec![0, 0]);
        assert_eq!(binning.bin_state(&[0.3, 2.0]).unwrap(), vec![1, 2]);
        assert_eq!(binning.bin_state(&[1.0, 3.0]).unwrap(), vec![3, 2]);
        assert!(binning.bin_state(&[1.1, 0.0]).is_err());
    }

    #[test]
    fn test_active_initial_features_and_hash() {
        let binning = Binning::new(&mixed_domain(), 4).unwrap();
        assert_eq!(binning.active_initial_features(&[0.3, 2.0]).unwrap(), vec![1, 6]);
        assert_eq!(binning.hash_state(&[0.3, 2.0]).unwrap(), 1 * 3 + 2);
        assert_eq!(binning.hash_state(&[1.0, 3.0]).unwrap(), 11);
    }

    #[test]
    fn test_middle_of_grid() {
        let binning = Binning::new(&mixed_domain(), 4).unwrap();
        assert_eq!(
            binning.state_in_the_middle_of_grid(&[0.3, 2.0]).unwrap(),
            vec![0.375, 2.5]
        );
    }

    #[test]
    fn test_zero_bins_is_config_error() {
        let domain = DomainSpec::discrete(&[(1.0, 1.0)], 2).unwrap();
        assert!(Binning::new(&domain, 20).unwrap_err().is_config());
    }
}
