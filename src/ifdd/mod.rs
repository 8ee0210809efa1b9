// Incremental Feature Dependency Discovery over binary base features
// Conjunctions of jointly active features are promoted once their
// accumulated TD-error relevance crosses the discovery threshold

pub mod cache;
pub mod discovery;
pub mod lattice;
pub mod potential;
pub mod queue;
pub mod traced;

pub use cache::ActivationCache;
pub use lattice::{Feature, FeatureLattice, FeatureSet};
pub use potential::{Potential, RelevanceMode};
pub use queue::NoveltyQueue;
pub use traced::{IfddK, TracedPotential};

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;

use crate::config::IfddConfig;
use crate::domain::DomainSpec;
use crate::error::{FddError, FddResult};
use crate::representation::{
    Discoverable, FeatureVector, IndependentDiscretization, InitialRepresentation, Representation,
    WeightInit, WeightVector,
};

/// Binary iFDD representation.
///
/// Owns its lattice, potentials, cache, weights and random state, so a
/// clone is a fully independent representation.
#[derive(Debug, Clone)]
pub struct Ifdd<I: InitialRepresentation = IndependentDiscretization> {
    domain: DomainSpec,
    config: IfddConfig,
    initial: I,
    lattice: FeatureLattice,
    potentials: BTreeMap<FeatureSet, Potential>,
    cache: ActivationCache,
    weights: WeightVector,
    weight_init: WeightInit,
    rng: StdRng,
    // Largest relevance seen since the last discovery
    max_relevance: f64,
}

impl Ifdd<IndependentDiscretization> {
    /// iFDD over an independent discretization of `domain`
    pub fn new(domain: &DomainSpec, config: IfddConfig) -> FddResult<Self> {
        let initial = IndependentDiscretization::new(domain, config.discretization)?;
        Self::with_initial(initial, config)
    }
}

impl<I: InitialRepresentation> Ifdd<I> {
    /// iFDD whose base features come from `initial`
    pub fn with_initial(initial: I, config: IfddConfig) -> FddResult<Self> {
        config.validate()?;
        let domain = initial.domain().clone();
        domain.validate()?;

        let lattice = FeatureLattice::with_base_features(initial.features_num());
        let weights = WeightVector::zeros(lattice.len(), domain.actions_num);
        info!(
            "iFDD: {} base features, {} actions, threshold {}, relevance {}, sparsify {}, cache {}",
            lattice.len(),
            domain.actions_num,
            config.discovery_threshold,
            config.relevance,
            config.sparsify,
            config.use_cache
        );

        Ok(Self {
            weight_init: config.weight_init(),
            rng: StdRng::seed_from_u64(config.seed),
            domain,
            initial,
            lattice,
            potentials: BTreeMap::new(),
            cache: ActivationCache::new(),
            weights,
            config,
            max_relevance: f64::NEG_INFINITY,
        })
    }

    pub fn config(&self) -> &IfddConfig {
        &self.config
    }

    pub fn initial_representation(&self) -> &I {
        &self.initial
    }

    pub fn lattice(&self) -> &FeatureLattice {
        &self.lattice
    }

    pub fn cache(&self) -> &ActivationCache {
        &self.cache
    }

    pub fn feature(&self, index: usize) -> Option<&Feature> {
        self.lattice.get(index)
    }

    /// Sorted base indices of feature `index`, e.g. `"[0, 3]"`
    pub fn feature_set_string(&self, index: usize) -> Option<String> {
        self.lattice.get(index).map(|f| f.f_set.to_string())
    }

    /// Potentials still under evaluation, ordered by `f_set`
    pub fn potentials(&self) -> impl Iterator<Item = &Potential> + '_ {
        self.potentials.values()
    }

    pub fn potential(&self, f_set: &FeatureSet) -> Option<&Potential> {
        self.potentials.get(f_set)
    }

    /// Final active features for the active base features `initial`,
    /// consulting and filling the cache when it is enabled.
    pub fn find_final_active_features(&mut self, initial: &[usize]) -> Vec<usize> {
        let key = FeatureSet::from_indices(initial.iter().copied());
        if self.config.use_cache {
            if let Some(hit) = self.cache.get(&key) {
                return hit.to_vec();
            }
        }
        let mut active = self.lattice.resolve(&key, self.config.sparsify);
        active.sort_unstable();
        if self.config.use_cache {
            self.cache.insert(key, active.clone());
        }
        active
    }

    pub(crate) fn check_phi_len(&self, phi_s: &FeatureVector) -> FddResult<()> {
        if phi_s.len() != self.lattice.len() {
            return Err(FddError::invalid_argument(format!(
                "feature vector has {} entries, representation has {} features",
                phi_s.len(),
                self.lattice.len()
            )));
        }
        Ok(())
    }
}

impl<I: InitialRepresentation> Representation for Ifdd<I> {
    fn domain(&self) -> &DomainSpec {
        &self.domain
    }

    fn features_num(&self) -> usize {
        self.lattice.len()
    }

    fn weights(&self) -> &WeightVector {
        &self.weights
    }

    fn weights_mut(&mut self) -> &mut WeightVector {
        &mut self.weights
    }

    fn phi_non_terminal(&mut self, s: &[f64]) -> FddResult<FeatureVector> {
        let initial = self.initial.active_base_features(s)?;
        let active = self.find_final_active_features(&initial);
        Ok(FeatureVector::from_active(self.lattice.len(), &active))
    }

    fn as_discoverable_mut(&mut self) -> Option<&mut dyn Discoverable> {
        Some(self)
    }
}

impl<I: InitialRepresentation> Discoverable for Ifdd<I> {
    fn post_discover(
        &mut self,
        _s: &[f64],
        _terminal: bool,
        _a: usize,
        td_error: f64,
        phi_s: &FeatureVector,
    ) -> FddResult<usize> {
        self.discover_from_active(td_error, phi_s)
    }

    fn batch_discover(
        &mut self,
        td_errors: &[f64],
        phi: &[FeatureVector],
        states: &[Vec<f64>],
    ) -> FddResult<usize> {
        self.discover_batch(td_errors, phi, states)
    }

    fn max_relevance(&self) -> f64 {
        self.max_relevance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two dimensions of one bin each: base features 0 and 1 are always active
    fn always_joint_domain() -> DomainSpec {
        DomainSpec::discrete(&[(0.0, 1.0), (0.0, 1.0)], 2).unwrap()
    }

    fn classic_config(sparsify: bool, use_cache: bool) -> IfddConfig {
        IfddConfig {
            discovery_threshold: 1.0,
            relevance: RelevanceMode::Classic,
            sparsify,
            use_cache,
            ..IfddConfig::default()
        }
    }

    #[test]
    fn test_classic_promotion_scenario() {
        let mut rep = Ifdd::new(&always_joint_domain(), classic_config(true, false)).unwrap();
        let s = [0.5, 0.5];
        assert_eq!(rep.features_num(), 2);

        for td in [0.4, 0.5] {
            let phi = rep.phi(&s, false).unwrap();
            assert_eq!(rep.post_discover(&s, false, 0, td, &phi).unwrap(), 0);
        }
        let potential = rep.potential(&FeatureSet::from_indices([0, 1])).unwrap();
        assert!((potential.cumabstderr - 0.9).abs() < 1e-12);
        assert_eq!(potential.count, 2);
        assert_eq!(rep.features_num(), 2);

        let phi = rep.phi(&s, false).unwrap();
        assert_eq!(rep.post_discover(&s, false, 0, 0.3, &phi).unwrap(), 1);
        assert_eq!(rep.features_num(), 3);
        assert_eq!(rep.weights().len(), 3 * 2);
        assert_eq!(rep.feature_set_string(2).as_deref(), Some("[0, 1]"));
        assert_eq!(rep.feature(2).unwrap().parents, Some((0, 1)));
        assert!(rep.potential(&FeatureSet::from_indices([0, 1])).is_none());

        let phi = rep.phi(&s, false).unwrap();
        assert_eq!(phi.active_indices(), vec![2]);
    }

    #[test]
    fn test_without_sparsify_coarse_features_stay_active() {
        let mut rep = Ifdd::new(&always_joint_domain(), classic_config(false, false)).unwrap();
        let s = [0.0, 0.0];
        for td in [0.4, 0.5, 0.3] {
            let phi = rep.phi(&s, false).unwrap();
            rep.post_discover(&s, false, 0, td, &phi).unwrap();
        }
        assert_eq!(rep.phi(&s, false).unwrap().active_indices(), vec![0, 1, 2]);
        // zero init without sparsify
        assert_eq!(rep.weights().as_slice(), &[0.0; 6]);
    }

    #[test]
    fn test_cache_before_and_after_promotion() {
        for sparsify in [true, false] {
            let mut rep = Ifdd::new(&always_joint_domain(), classic_config(sparsify, true)).unwrap();
            let s = [1.0, 1.0];
            let before = rep.phi(&s, false).unwrap();
            assert_eq!(before.active_indices(), vec![0, 1]);
            assert_eq!(rep.cache().len(), 1);

            rep.post_discover(&s, false, 0, 2.0, &before).unwrap();
            assert_eq!(rep.features_num(), 3);

            let after = rep.phi(&s, false).unwrap();
            let expected = if sparsify { vec![2] } else { vec![0, 1, 2] };
            assert_eq!(after.active_indices(), expected);
            assert_eq!(rep.cache().len(), 1);
        }
    }

    #[test]
    fn test_parent_sum_weight_init() {
        let mut rep = Ifdd::new(&always_joint_domain(), classic_config(true, false)).unwrap();
        rep.weights_mut().as_mut_slice().copy_from_slice(&[1.0, 2.0, 10.0, 20.0]);
        let phi = rep.phi(&[0.0, 0.0], false).unwrap();
        rep.post_discover(&[0.0, 0.0], false, 0, 5.0, &phi).unwrap();
        assert_eq!(rep.weights().as_slice(), &[1.0, 2.0, 3.0, 10.0, 20.0, 30.0]);

        // Q is preserved across the sparsifying promotion
        let q = rep.qs(&[0.0, 0.0], false, None).unwrap();
        assert_eq!(q, vec![3.0, 30.0]);
    }

    #[test]
    fn test_phi_length_mismatch_is_rejected() {
        let mut rep = Ifdd::new(&always_joint_domain(), classic_config(true, false)).unwrap();
        let wrong = FeatureVector::zeros(5);
        assert!(rep.post_discover(&[0.0, 0.0], false, 0, 1.0, &wrong).is_err());
    }

    #[test]
    fn test_clone_is_independent() {
        let mut rep = Ifdd::new(&always_joint_domain(), classic_config(true, true)).unwrap();
        let s = [0.0, 0.0];
        let phi = rep.phi(&s, false).unwrap();
        let copy = rep.clone();

        rep.post_discover(&s, false, 0, 5.0, &phi).unwrap();
        rep.weights_mut().as_mut_slice()[0] = 9.0;

        assert_eq!(rep.features_num(), 3);
        assert_eq!(copy.features_num(), 2);
        assert_eq!(copy.weights().as_slice(), &[0.0; 4]);
        assert_eq!(copy.cache().get(&FeatureSet::from_indices([0, 1])), Some(&[0, 1][..]));
    }

    #[test]
    fn test_cached_activation_is_ascending() {
        // three always-active base features resolve through the novelty scan
        let domain = DomainSpec::discrete(&[(0.0, 1.0), (0.0, 1.0), (0.0, 1.0)], 1).unwrap();
        let mut rep = Ifdd::new(&domain, classic_config(false, true)).unwrap();
        let s = [0.0, 0.0, 0.0];
        let key = FeatureSet::from_indices([0, 1, 2]);

        let phi = rep.phi(&s, false).unwrap();
        assert_eq!(rep.cache().get(&key), Some(&[0, 1, 2][..]));

        assert!(rep.post_discover(&s, false, 0, 5.0, &phi).unwrap() > 0);
        let cached = rep.cache().get(&key).unwrap().to_vec();
        assert_eq!(cached.len(), rep.features_num());
        assert!(cached.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(rep.find_final_active_features(&[2, 0, 1]), cached);
    }

    #[test]
    fn test_capability_check() {
        let mut rep = Ifdd::new(&always_joint_domain(), IfddConfig::default()).unwrap();
        let s = [0.0, 0.0];
        let phi = rep.phi(&s, false).unwrap();
        let discoverable = rep.as_discoverable_mut().unwrap();
        assert_eq!(discoverable.post_discover(&s, false, 0, 3.0, &phi).unwrap(), 1);
    }
}
