// Online and batch discovery for the binary iFDD representation

use std::collections::BTreeMap;

use rand::Rng;
use tracing::{debug, info, trace};

use super::lattice::{pairs, FeatureSet};
use super::potential::{Potential, RelevanceMode};
use super::Ifdd;
use crate::error::{FddError, FddResult};
use crate::representation::{FeatureVector, InitialRepresentation, WeightInit};

impl<I: InitialRepresentation> Ifdd<I> {
    /// Inspect every pair of active features of `phi_s`, visited in
    /// ascending index order. Returns the number of features added.
    pub(crate) fn discover_from_active(&mut self, td_error: f64, phi_s: &FeatureVector) -> FddResult<usize> {
        self.check_phi_len(phi_s)?;
        let active = phi_s.active_indices();
        let mut discovered = 0;
        for (g, h) in pairs(&active) {
            if self.inspect_pair(g, h, td_error)? {
                discovered += 1;
            }
        }
        Ok(discovered)
    }

    /// Accumulate `td_error` into the potential `g ∪ h` and promote it when
    /// relevant. Returns whether a feature was added.
    pub fn inspect_pair(&mut self, g: usize, h: usize, td_error: f64) -> FddResult<bool> {
        let f_set = self.pair_set(g, h)?;
        if self.lattice.contains(&f_set) {
            return Ok(false);
        }

        let plus = match self.config.relevance {
            RelevanceMode::Plus => true,
            RelevanceMode::Classic => false,
            RelevanceMode::Mixed { plus_probability } => self.rng.random::<f64>() < plus_probability,
        };
        let potential = self
            .potentials
            .entry(f_set.clone())
            .or_insert_with(|| Potential::new(f_set.clone(), g, h));
        potential.observe(td_error);
        let relevance = potential.relevance(plus);

        if relevance >= self.config.discovery_threshold {
            self.max_relevance = f64::NEG_INFINITY;
            self.add_feature(f_set, (g, h), relevance);
            Ok(true)
        } else {
            self.update_max_relevance(relevance);
            Ok(false)
        }
    }

    /// Promote `g ∪ h` directly, skipping the relevance test. Returns false
    /// when the conjunction already exists.
    pub fn promote_pair(&mut self, g: usize, h: usize, relevance: f64) -> FddResult<bool> {
        let f_set = self.pair_set(g, h)?;
        if self.lattice.contains(&f_set) {
            return Ok(false);
        }
        self.add_feature(f_set, (g, h), relevance);
        Ok(true)
    }

    /// Offline discovery: accumulate pairwise relevance over every sample of
    /// the batch and promote the most relevant pairs, highest first.
    pub(crate) fn discover_batch(
        &mut self,
        td_errors: &[f64],
        phi: &[FeatureVector],
        states: &[Vec<f64>],
    ) -> FddResult<usize> {
        if td_errors.len() != phi.len() || (!states.is_empty() && states.len() != phi.len()) {
            return Err(FddError::invalid_argument(format!(
                "batch shape mismatch: {} td errors, {} feature vectors, {} states",
                td_errors.len(),
                phi.len(),
                states.len()
            )));
        }
        for row in phi {
            self.check_phi_len(row)?;
        }

        let plus = self.config.relevance.deterministic_plus();
        // (g, h) with g < h -> (weighted td error sum, activation sum)
        let mut stats: BTreeMap<(usize, usize), (f64, f64)> = BTreeMap::new();
        for (row, &td_error) in phi.iter().zip(td_errors) {
            let td = if plus { td_error } else { td_error.abs() };
            let active: Vec<(usize, f64)> = row.iter_active().collect();
            for (i, &(g, vg)) in active.iter().enumerate() {
                for &(h, vh) in &active[i + 1..] {
                    let entry = stats.entry((g, h)).or_insert((0.0, 0.0));
                    entry.0 += vg * vh * td;
                    entry.1 += vg * vh;
                }
            }
        }

        let mut relevances: Vec<((usize, usize), f64)> = stats
            .into_iter()
            .filter(|(_, (sum, _))| *sum != 0.0)
            .map(|(pair, (sum, count))| {
                let relevance = if plus { sum.abs() / count.sqrt() } else { sum };
                (pair, relevance)
            })
            .collect();
        if relevances.is_empty() {
            info!("iFDD batch: max relevance = 0");
            return Ok(0);
        }
        relevances.sort_by(|a, b| b.1.total_cmp(&a.1));
        info!("iFDD batch: max relevance = {}", relevances[0].1);

        let mut added = 0;
        for ((g, h), relevance) in relevances {
            if added >= self.config.max_batch_discovery {
                break;
            }
            if relevance <= self.config.batch_threshold {
                break;
            }
            if self.promote_pair(g, h, relevance)? {
                added += 1;
            }
        }
        Ok(added)
    }

    /// Register the conjunction `f_set`, grow the weights and bring the
    /// cache up to date. Returns the new feature index.
    pub(crate) fn add_feature(&mut self, f_set: FeatureSet, parents: (usize, usize), relevance: f64) -> usize {
        self.potentials.remove(&f_set);
        let index = self.lattice.insert(f_set.clone(), parents);
        match self.weight_init {
            WeightInit::Zero => self.weights.add_feature(None),
            WeightInit::ParentSum => self.weights.add_parent_sum_feature(parents.0, parents.1),
        }
        if self.config.use_cache {
            self.cache.invalidate(&f_set, index, self.config.sparsify);
        }
        debug_assert_eq!(self.weights.len(), self.lattice.len() * self.domain.actions_num);
        debug!("New feature {}: {}, relevance = {:.3}", index, f_set, relevance);
        index
    }

    pub(crate) fn update_max_relevance(&mut self, relevance: f64) {
        if relevance > self.max_relevance {
            self.max_relevance = relevance;
            if self.config.print_max_relevance {
                trace!("iFDD: max relevance = {}", relevance);
            }
        }
    }

    fn pair_set(&self, g: usize, h: usize) -> FddResult<FeatureSet> {
        self.lattice.union_of(g, h).ok_or_else(|| {
            FddError::invalid_argument(format!(
                "feature pair ({}, {}) out of range for {} features",
                g,
                h,
                self.lattice.len()
            ))
        })
    }
}
