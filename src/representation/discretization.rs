// Independent discretization: one binary base feature per bin per dimension

use tracing::info;

use super::binning::Binning;
use super::features::FeatureVector;
use super::weights::WeightVector;
use super::Representation;
use crate::domain::DomainSpec;
use crate::error::FddResult;

/// Fixed representation supplying the base features of a discovering one.
///
/// Implementors are plain values: cloning yields an independent copy.
pub trait InitialRepresentation: Clone + std::fmt::Debug {
    /// Domain the representation was built for
    fn domain(&self) -> &DomainSpec;

    /// Number of base features
    fn features_num(&self) -> usize;

    /// Indices of the base features active at `s`, in ascending order
    fn active_base_features(&self, s: &[f64]) -> FddResult<Vec<usize>>;
}

/// One indicator per bin of every dimension; exactly one per dimension is active
#[derive(Debug, Clone, PartialEq)]
pub struct IndependentDiscretization {
    binning: Binning,
    weights: WeightVector,
}

impl IndependentDiscretization {
    pub fn new(domain: &DomainSpec, discretization: usize) -> FddResult<Self> {
        let binning = Binning::new(domain, discretization)?;
        let features_num = binning.total_bins();
        info!(
            "Independent discretization: {} base features over {} dimensions",
            features_num,
            domain.state_space_dims()
        );
        Ok(Self {
            weights: WeightVector::zeros(features_num, domain.actions_num),
            binning,
        })
    }

    pub fn binning(&self) -> &Binning {
        &self.binning
    }
}

impl InitialRepresentation for IndependentDiscretization {
    fn domain(&self) -> &DomainSpec {
        self.binning.domain()
    }

    fn features_num(&self) -> usize {
        self.binning.total_bins()
    }

    fn active_base_features(&self, s: &[f64]) -> FddResult<Vec<usize>> {
        self.binning.active_initial_features(s)
    }
}

impl Representation for IndependentDiscretization {
    fn domain(&self) -> &DomainSpec {
        self.binning.domain()
    }

    fn features_num(&self) -> usize {
        self.binning.total_bins()
    }

    fn weights(&self) -> &WeightVector {
        &self.weights
    }

    fn weights_mut(&mut self) -> &mut WeightVector {
        &mut self.weights
    }

    fn phi_non_terminal(&mut self, s: &[f64]) -> FddResult<FeatureVector> {
        let active = self.binning.active_initial_features(s)?;
        Ok(FeatureVector::from_active(self.binning.total_bins(), &active))
    }
}
