// Kernelized iFDD: continuous kernel features grown around visited states
// and refined into products over disjoint dimension sets

pub mod feature;
pub mod kernel;

pub use feature::{Candidate, KernelizedFeature};
pub use kernel::KernelKind;

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use tracing::{debug, info};

use crate::config::KernelizedConfig;
use crate::domain::DomainSpec;
use crate::error::{FddError, FddResult};
use crate::ifdd::lattice::pairs;
use crate::ifdd::{FeatureSet, NoveltyQueue};
use crate::representation::{Discoverable, FeatureVector, Representation, WeightVector};

/// Kernelized iFDD representation. Starts without features; base features
/// are added on demand in `post_discover`.
#[derive(Debug, Clone)]
pub struct KernelizedIfdd {
    domain: DomainSpec,
    config: KernelizedConfig,
    features: Vec<KernelizedFeature>,
    sorted: NoveltyQueue,
    candidates: BTreeMap<(usize, usize), Candidate>,
    // base_ids of every feature and of every candidate ever formed
    base_id_sets: HashSet<FeatureSet>,
    weights: WeightVector,
    max_relevance: f64,
}

impl KernelizedIfdd {
    pub fn new(domain: &DomainSpec, config: KernelizedConfig) -> FddResult<Self> {
        domain.validate()?;
        config.validate()?;
        if config.kernel_widths.len() != domain.state_space_dims() {
            return Err(FddError::config(format!(
                "{} kernel widths for {} state dimensions",
                config.kernel_widths.len(),
                domain.state_space_dims()
            )));
        }
        info!(
            "Kernelized iFDD: kernel {:?}, active threshold {}, discover threshold {}, sparsify {}, normalization {}",
            config.kernel,
            config.active_threshold,
            config.discover_threshold,
            config.sparsify,
            config.normalization
        );
        Ok(Self {
            domain: domain.clone(),
            weights: WeightVector::zeros(0, domain.actions_num),
            config,
            features: Vec::new(),
            sorted: NoveltyQueue::new(),
            candidates: BTreeMap::new(),
            base_id_sets: HashSet::new(),
            max_relevance: 0.0,
        })
    }

    pub fn config(&self) -> &KernelizedConfig {
        &self.config
    }

    pub fn features(&self) -> &[KernelizedFeature] {
        &self.features
    }

    pub fn feature(&self, index: usize) -> Option<&KernelizedFeature> {
        self.features.get(index)
    }

    pub fn candidates(&self) -> impl Iterator<Item = &Candidate> + '_ {
        self.candidates.values()
    }

    pub fn candidate(&self, idx1: usize, idx2: usize) -> Option<&Candidate> {
        self.candidates.get(&(idx1, idx2))
    }

    fn output(&self, i: usize, s: &[f64]) -> f64 {
        self.features[i].output(s, &self.config.kernel, &self.config.kernel_widths)
    }

    /// Unsparsified, unnormalized kernel outputs of every feature
    pub fn phi_raw(&self, s: &[f64]) -> FddResult<FeatureVector> {
        self.domain.check_state(s)?;
        Ok(FeatureVector::from_values(
            (0..self.features.len()).map(|i| self.output(i, s)).collect(),
        ))
    }

    /// Add a one-dimensional feature centered on `s` in dimension `dim`
    pub fn add_base_feature(&mut self, s: &[f64], dim: usize, q: &[f64]) -> usize {
        let index = self.features.len();
        let feature = KernelizedFeature::base(index, s, dim);
        debug!("Added feature {} {}", index, feature);

        self.base_id_sets.insert(feature.base_ids.clone());
        self.sorted.push(1, index);
        for f in &self.features {
            if !f.dims.contains(&dim) {
                self.candidates.insert((f.index, index), Candidate::new(f.index, index));
                self.base_id_sets.insert(f.base_ids.union(&feature.base_ids));
            }
        }
        self.features.push(feature);
        self.grow_weights(q);
        index
    }

    /// Add the product of features `index1 < index2`
    pub fn add_refined_feature(&mut self, index1: usize, index2: usize, q: &[f64]) -> usize {
        let index = self.features.len();
        let feature =
            KernelizedFeature::refined(index, &self.features[index1], &self.features[index2]);

        self.sorted.push(feature.base_ids.len(), index);
        self.base_id_sets.insert(feature.base_ids.clone());
        self.candidates.remove(&(index1, index2));

        let new_candidates: Vec<(usize, FeatureSet)> = self
            .features
            .iter()
            .filter(|f| !f.shares_dims(&feature))
            .map(|f| (f.index, f.base_ids.union(&feature.base_ids)))
            .filter(|(_, ids)| !self.base_id_sets.contains(ids))
            .collect();
        for (f, ids) in new_candidates {
            self.candidates.insert((f, index), Candidate::new(f, index));
            self.base_id_sets.insert(ids);
        }
        debug!("Added refined feature {} {}", index, feature);
        debug!("{} candidates", self.candidates.len());

        self.features.push(feature);
        self.grow_weights(q);
        index
    }

    fn grow_weights(&mut self, q: &[f64]) {
        if self.config.normalization {
            self.weights.add_feature(Some(q));
        } else {
            self.weights.add_feature(None);
        }
        debug_assert_eq!(self.weights.len(), self.features.len() * self.domain.actions_num);
    }

    fn inspect_candidate(&mut self, g: usize, h: usize, td_error: f64, phi_s: &FeatureVector, q: &[f64]) -> bool {
        let Some(candidate) = self.candidates.get_mut(&(g, h)) else {
            return false;
        };
        let relevance = candidate.update(phi_s.get(g), phi_s.get(h), td_error);
        self.max_relevance = self.max_relevance.max(relevance);
        if relevance > self.config.discover_threshold {
            self.add_refined_feature(g, h, q);
            true
        } else {
            false
        }
    }
}

impl Representation for KernelizedIfdd {
    fn domain(&self) -> &DomainSpec {
        &self.domain
    }

    fn features_num(&self) -> usize {
        self.features.len()
    }

    fn weights(&self) -> &WeightVector {
        &self.weights
    }

    fn weights_mut(&mut self) -> &mut WeightVector {
        &mut self.weights
    }

    fn phi_non_terminal(&mut self, s: &[f64]) -> FddResult<FeatureVector> {
        self.domain.check_state(s)?;
        let n = self.features.len();
        let mut out = FeatureVector::zeros(n);

        if self.config.sparsify == 0 {
            for i in 0..n {
                out.set(i, self.output(i, s));
            }
        } else {
            let mut active_bases: BTreeSet<usize> = self
                .features
                .iter()
                .filter(|f| f.is_base())
                .map(|f| f.index)
                .filter(|&i| self.output(i, s) >= self.config.active_threshold)
                .collect();
            let mut base_vals: HashMap<usize, f64> =
                active_bases.iter().map(|&k| (k, 1.0)).collect();

            for i in self.sorted.iter() {
                let base_ids = &self.features[i].base_ids;
                if !base_ids.iter().all(|k| active_bases.contains(&k)) {
                    continue;
                }
                if self.config.sparsify > 1 {
                    let v = self.output(i, s);
                    out.set(i, v);
                    if self.config.sparsify > 2 || v >= self.config.active_threshold {
                        for k in base_ids.iter() {
                            active_bases.remove(&k);
                        }
                    }
                } else {
                    let u = base_ids
                        .iter()
                        .map(|k| base_vals.get(&k).copied().unwrap_or(0.0))
                        .fold(0.0, f64::max);
                    let v = self.output(i, s) * u;
                    out.set(i, v);
                    for k in base_ids.iter() {
                        let remaining = base_vals.entry(k).or_insert(0.0);
                        *remaining -= v;
                        if *remaining < 0.0 {
                            active_bases.remove(&k);
                        }
                    }
                }
            }
        }

        if self.config.normalization {
            out.normalize_sum();
        }
        Ok(out)
    }

    fn as_discoverable_mut(&mut self) -> Option<&mut dyn Discoverable> {
        Some(self)
    }
}

impl Discoverable for KernelizedIfdd {
    fn post_discover(
        &mut self,
        s: &[f64],
        terminal: bool,
        _a: usize,
        td_error: f64,
        phi_s: &FeatureVector,
    ) -> FddResult<usize> {
        if terminal {
            return Ok(0);
        }
        let phi_unnorm = self.phi_raw(s)?;
        let q = self.qs(s, false, Some(phi_s))?;
        let mut discovered = 0;

        let mut active: Vec<usize> = phi_unnorm
            .iter_active()
            .filter(|&(_, v)| v > self.config.active_threshold)
            .map(|(i, _)| i)
            .collect();

        let dims = self.domain.state_space_dims();
        let mut active_dims = vec![0usize; dims];
        let mut closest_neighbor = vec![0.0f64; dims];
        for &i in &active {
            for &j in &self.features[i].dims {
                active_dims[j] += 1;
                closest_neighbor[j] = closest_neighbor[j].max(phi_unnorm.get(i));
            }
        }

        for j in 0..dims {
            if active_dims[j] < self.config.max_active_base_feat
                && (closest_neighbor[j] < self.config.max_base_feat_sim || active_dims[j] < 1)
            {
                active.push(self.add_base_feature(s, j, &q));
                discovered += 1;
            }
        }

        let phi_s = if discovered > 0 {
            self.phi(s, false)?
        } else {
            phi_s.clone()
        };

        let la = active.len();
        if la * la.saturating_sub(1) < self.candidates.len() {
            let keys: Vec<(usize, usize)> = self.candidates.keys().copied().collect();
            for (g, h) in keys {
                if self.inspect_candidate(g, h, td_error, &phi_s, &q) {
                    discovered += 1;
                }
            }
        } else {
            for (g, h) in pairs(&active) {
                if self.inspect_candidate(g, h, td_error, &phi_s, &q) {
                    discovered += 1;
                }
            }
        }

        if discovered > 0 {
            self.max_relevance = 0.0;
        }
        Ok(discovered)
    }

    fn batch_discover(
        &mut self,
        _td_errors: &[f64],
        _phi: &[FeatureVector],
        _states: &[Vec<f64>],
    ) -> FddResult<usize> {
        Err(FddError::other("kernelized iFDD has no batch discovery"))
    }

    fn max_relevance(&self) -> f64 {
        self.max_relevance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kifdd(sparsify: u8) -> KernelizedIfdd {
        let domain = DomainSpec::continuous(&[(0.0, 1.0), (0.0, 1.0)], 2).unwrap();
        KernelizedIfdd::new(
            &domain,
            KernelizedConfig {
                sparsify,
                ..KernelizedConfig::with_widths(vec![0.1, 0.1])
            },
        )
        .unwrap()
    }

    fn step(rep: &mut KernelizedIfdd, s: &[f64], td_error: f64) -> usize {
        let phi = rep.phi(s, false).unwrap();
        rep.post_discover(s, false, 0, td_error, &phi).unwrap()
    }

    #[test]
    fn test_empty_representation_values_are_zero() {
        let mut rep = kifdd(1);
        assert_eq!(rep.features_num(), 0);
        assert_eq!(rep.qs(&[0.3, 0.3], false, None).unwrap(), vec![0.0, 0.0]);
        assert!(rep.phi(&[0.3, 0.3], false).unwrap().is_empty());
    }

    #[test]
    fn test_first_visit_adds_base_features_and_refines() {
        let mut rep = kifdd(1);
        assert_eq!(step(&mut rep, &[0.5, 0.5], 0.005), 2);
        assert_eq!(rep.features_num(), 2);
        assert_eq!(rep.feature(0).unwrap().dims, vec![0]);
        assert_eq!(rep.feature(1).unwrap().dims, vec![1]);
        assert!(rep.candidate(0, 1).is_some());
        assert!((rep.max_relevance() - 0.0).abs() < 1e-12);

        // the same pair with a large error is combined
        assert_eq!(step(&mut rep, &[0.5, 0.5], 1.0), 1);
        assert_eq!(rep.features_num(), 3);
        assert_eq!(rep.feature(2).unwrap().base_ids, FeatureSet::from_indices([0, 1]));
        assert!(rep.candidate(0, 1).is_none());
        assert_eq!(rep.candidates().count(), 0);
        assert_eq!(rep.weights().len(), 6);
        assert_eq!(rep.max_relevance(), 0.0);

        let phi = rep.phi(&[0.5, 0.5], false).unwrap();
        assert_eq!(phi.active_indices(), vec![2]);
        assert!((phi.get(2) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_similar_states_do_not_duplicate_features() {
        let mut rep = kifdd(1);
        step(&mut rep, &[0.5, 0.5], 0.0);
        assert_eq!(step(&mut rep, &[0.52, 0.5], 0.0), 0);
        assert_eq!(rep.features_num(), 2);

        // far enough in dimension 0 only
        assert_eq!(step(&mut rep, &[0.65, 0.5], 0.0), 1);
        assert_eq!(rep.feature(2).unwrap().dims, vec![0]);
        assert!(rep.candidate(1, 2).is_some());
        assert!(rep.candidate(0, 2).is_none());
    }

    #[test]
    fn test_candidate_scan_when_few_features_active() {
        let mut rep = kifdd(1);
        step(&mut rep, &[0.5, 0.5], 1.0);
        step(&mut rep, &[0.5, 0.5], 1.0);
        assert_eq!(rep.features_num(), 3);

        // two fresh base features far away; three candidates, two active
        let added = step(&mut rep, &[0.0, 1.0], 1.0);
        assert_eq!(added, 3);
        assert_eq!(rep.features_num(), 6);
        assert_eq!(rep.feature(5).unwrap().base_ids, FeatureSet::from_indices([3, 4]));
        assert!(rep.candidate(1, 3).is_some());
        assert!(rep.candidate(0, 4).is_some());
    }

    #[test]
    fn test_hard_sparsify_consumes_bases() {
        let mut rep = kifdd(2);
        step(&mut rep, &[0.5, 0.5], 1.0);
        step(&mut rep, &[0.5, 0.5], 1.0);
        let phi = rep.phi(&[0.5, 0.5], false).unwrap();
        assert_eq!(phi.active_indices(), vec![2]);

        let mut rep = kifdd(0);
        step(&mut rep, &[0.5, 0.5], 1.0);
        step(&mut rep, &[0.5, 0.5], 1.0);
        let phi = rep.phi(&[0.5, 0.5], false).unwrap();
        assert_eq!(phi.active_indices(), vec![0, 1, 2]);
        assert!((phi.sum() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_new_weights_start_at_current_q() {
        let mut rep = kifdd(1);
        step(&mut rep, &[0.5, 0.5], 0.0);
        rep.weights_mut().as_mut_slice().copy_from_slice(&[1.0, 1.0, 2.0, 2.0]);
        let s = [0.65, 0.5];
        let q = rep.qs(&s, false, None).unwrap();
        assert_eq!(step(&mut rep, &s, 0.0), 1);
        assert!((rep.weights().get(2, 0) - q[0]).abs() < 1e-12);
        assert!((rep.weights().get(2, 1) - q[1]).abs() < 1e-12);
    }

    #[test]
    fn test_terminal_and_batch() {
        let mut rep = kifdd(1);
        let phi = FeatureVector::zeros(0);
        assert_eq!(rep.post_discover(&[0.5, 0.5], true, 0, 1.0, &phi).unwrap(), 0);
        assert!(rep.batch_discover(&[], &[], &[]).is_err());
    }
}
