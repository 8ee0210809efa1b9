// State -> feature mapping contract shared by every representation
// Linear value reads (Q, Qs, V, best actions) are provided on top of phi and the weights

pub mod binning;
pub mod discretization;
pub mod features;
pub mod weights;

pub use binning::Binning;
pub use discretization::{IndependentDiscretization, InitialRepresentation};
pub use features::FeatureVector;
pub use weights::{EligibilityTrace, WeightInit, WeightVector};

use rand::seq::IndexedRandom;
use rand::RngCore;

use crate::domain::DomainSpec;
use crate::error::{FddError, FddResult};

/// Block form of `phi_sa`: the state features and where they sit in the
/// full state-action vector. Dot products against the weights only need this.
#[derive(Debug, Clone, PartialEq)]
pub struct PhiSa {
    pub phi_s: FeatureVector,
    pub start: usize,
    pub end: usize,
}

impl PhiSa {
    /// Materialize the full state-action vector
    pub fn to_dense(&self, actions_num: usize) -> FeatureVector {
        let features_num = self.end - self.start;
        let mut values = vec![0.0; features_num * actions_num];
        values[self.start..self.end].copy_from_slice(self.phi_s.as_slice());
        FeatureVector::from_values(values)
    }
}

/// Linear function approximation over a (possibly growing) feature space.
///
/// The weight vector always holds `features_num() * actions_num()` entries,
/// laid out as one block of `features_num()` weights per action.
pub trait Representation {
    fn domain(&self) -> &DomainSpec;

    /// Current number of features
    fn features_num(&self) -> usize;

    fn actions_num(&self) -> usize {
        self.domain().actions_num
    }

    fn weights(&self) -> &WeightVector;

    fn weights_mut(&mut self) -> &mut WeightVector;

    /// Features of a non-terminal state
    fn phi_non_terminal(&mut self, s: &[f64]) -> FddResult<FeatureVector>;

    /// Features of `s`; all zero when `terminal` is set. Terminal states may
    /// lie outside the limits, only their dimensionality is checked.
    fn phi(&mut self, s: &[f64], terminal: bool) -> FddResult<FeatureVector> {
        if terminal {
            self.domain().check_state_dims(s)?;
            return Ok(FeatureVector::zeros(self.features_num()));
        }
        self.phi_non_terminal(s)
    }

    /// State features placed in the `a`-th block without materializing the
    /// full state-action vector
    fn phi_sa_snippet(
        &mut self,
        s: &[f64],
        terminal: bool,
        a: usize,
        phi_s: Option<&FeatureVector>,
    ) -> FddResult<PhiSa> {
        self.domain().check_action(a)?;
        let phi_s = match phi_s {
            Some(phi) => phi.clone(),
            None => self.phi(s, terminal)?,
        };
        let features_num = phi_s.len();
        Ok(PhiSa {
            phi_s,
            start: a * features_num,
            end: (a + 1) * features_num,
        })
    }

    /// Copy-paste state-action features: `phi(s)` in block `a`, zero elsewhere
    fn phi_sa(
        &mut self,
        s: &[f64],
        terminal: bool,
        a: usize,
        phi_s: Option<&FeatureVector>,
    ) -> FddResult<FeatureVector> {
        let snippet = self.phi_sa_snippet(s, terminal, a, phi_s)?;
        Ok(snippet.to_dense(self.actions_num()))
    }

    /// Q-values of every action at `s`
    fn qs(&mut self, s: &[f64], terminal: bool, phi_s: Option<&FeatureVector>) -> FddResult<Vec<f64>> {
        let phi_s = match phi_s {
            Some(phi) => phi.clone(),
            None => self.phi(s, terminal)?,
        };
        if phi_s.len() != self.features_num() {
            return Err(FddError::invalid_argument(format!(
                "feature vector has {} entries, representation has {} features",
                phi_s.len(),
                self.features_num()
            )));
        }
        let weights = self.weights();
        Ok((0..self.actions_num())
            .map(|a| weights.dot_block(a, &phi_s))
            .collect())
    }

    fn q(
        &mut self,
        s: &[f64],
        terminal: bool,
        a: usize,
        phi_s: Option<&FeatureVector>,
    ) -> FddResult<f64> {
        self.domain().check_action(a)?;
        let qs = self.qs(s, terminal, phi_s)?;
        Ok(qs[a])
    }

    /// Max Q over `possible_actions`; zero when no action is possible
    fn v(
        &mut self,
        s: &[f64],
        terminal: bool,
        possible_actions: &[usize],
        phi_s: Option<&FeatureVector>,
    ) -> FddResult<f64> {
        if possible_actions.is_empty() {
            return Ok(0.0);
        }
        let qs = self.qs(s, terminal, phi_s)?;
        restricted_max(&qs, possible_actions, self.domain())
    }

    /// Every action of `possible_actions` tied for the maximal Q-value
    fn best_actions(
        &mut self,
        s: &[f64],
        terminal: bool,
        possible_actions: &[usize],
        phi_s: Option<&FeatureVector>,
    ) -> FddResult<Vec<usize>> {
        if possible_actions.is_empty() {
            return Ok(Vec::new());
        }
        let qs = self.qs(s, terminal, phi_s)?;
        let max = restricted_max(&qs, possible_actions, self.domain())?;
        Ok(possible_actions
            .iter()
            .copied()
            .filter(|&a| qs[a] == max)
            .collect())
    }

    /// One of the best actions, ties broken uniformly with `rng`
    fn best_action(
        &mut self,
        s: &[f64],
        terminal: bool,
        possible_actions: &[usize],
        rng: &mut dyn RngCore,
        phi_s: Option<&FeatureVector>,
    ) -> FddResult<usize> {
        let best = self.best_actions(s, terminal, possible_actions, phi_s)?;
        best.choose(rng)
            .copied()
            .ok_or_else(|| FddError::invalid_argument("no possible actions to choose from"))
    }

    /// `phi_sa` for a batch of samples
    fn batch_phi_sa(
        &mut self,
        states: &[Vec<f64>],
        terminals: &[bool],
        actions: &[usize],
    ) -> FddResult<Vec<FeatureVector>> {
        if states.len() != terminals.len() || states.len() != actions.len() {
            return Err(FddError::invalid_argument(format!(
                "batch shape mismatch: {} states, {} terminal flags, {} actions",
                states.len(),
                terminals.len(),
                actions.len()
            )));
        }
        states
            .iter()
            .zip(terminals)
            .zip(actions)
            .map(|((s, &terminal), &a)| self.phi_sa(s, terminal, a, None))
            .collect()
    }

    /// Greedy action per sample. `action_mask[i][a]` marks action `a` as
    /// available at sample `i`; without a mask every action is available.
    /// Ties resolve to the lowest action index.
    fn batch_best_action(
        &mut self,
        states: &[Vec<f64>],
        terminals: &[bool],
        action_mask: Option<&[Vec<bool>]>,
    ) -> FddResult<Vec<usize>> {
        if states.len() != terminals.len() || action_mask.is_some_and(|m| m.len() != states.len()) {
            return Err(FddError::invalid_argument(
                "batch shape mismatch between states, terminal flags and action mask",
            ));
        }
        let all_actions: Vec<usize> = (0..self.actions_num()).collect();
        let mut out = Vec::with_capacity(states.len());
        for (i, (s, &terminal)) in states.iter().zip(terminals).enumerate() {
            let possible: Vec<usize> = match action_mask {
                Some(mask) => all_actions
                    .iter()
                    .copied()
                    .filter(|&a| mask[i].get(a).copied().unwrap_or(false))
                    .collect(),
                None => all_actions.clone(),
            };
            let best = self.best_actions(s, terminal, &possible, None)?;
            let a = best.first().copied().ok_or_else(|| {
                FddError::invalid_argument(format!("sample {} has no available action", i))
            })?;
            out.push(a);
        }
        Ok(out)
    }

    /// Insert one zero slot into every action block of the weights
    fn add_new_weight(&mut self) {
        self.weights_mut().add_feature(None);
    }

    /// Growth hook that does not depend on the TD error. Returns the number
    /// of features added.
    fn pre_discover(
        &mut self,
        _s: &[f64],
        _terminal: bool,
        _a: usize,
        _ns: &[f64],
        _next_terminal: bool,
    ) -> FddResult<usize> {
        Ok(0)
    }

    /// Discovery capability, if this representation grows from TD errors
    fn as_discoverable_mut(&mut self) -> Option<&mut dyn Discoverable> {
        None
    }
}

/// Representations that add features from observed TD errors
pub trait Discoverable: Representation {
    /// Update discovery statistics after a TD update at `(s, a)`.
    /// Returns the number of features added; callers holding state-sized
    /// buffers (eligibility traces) must grow them accordingly.
    fn post_discover(
        &mut self,
        s: &[f64],
        terminal: bool,
        a: usize,
        td_error: f64,
        phi_s: &FeatureVector,
    ) -> FddResult<usize>;

    /// Offline discovery over a batch of samples. `phi` holds the state
    /// features of each sample. Returns the number of features added.
    fn batch_discover(
        &mut self,
        td_errors: &[f64],
        phi: &[FeatureVector],
        states: &[Vec<f64>],
    ) -> FddResult<usize>;

    /// Largest relevance seen since the last discovery
    fn max_relevance(&self) -> f64;

    /// Episode boundary notification
    fn episode_terminated(&mut self) {}
}

impl<T: Representation + ?Sized> Representation for Box<T> {
    fn domain(&self) -> &DomainSpec {
        (**self).domain()
    }

    fn features_num(&self) -> usize {
        (**self).features_num()
    }

    fn weights(&self) -> &WeightVector {
        (**self).weights()
    }

    fn weights_mut(&mut self) -> &mut WeightVector {
        (**self).weights_mut()
    }

    fn phi_non_terminal(&mut self, s: &[f64]) -> FddResult<FeatureVector> {
        (**self).phi_non_terminal(s)
    }

    fn phi(&mut self, s: &[f64], terminal: bool) -> FddResult<FeatureVector> {
        (**self).phi(s, terminal)
    }

    fn pre_discover(
        &mut self,
        s: &[f64],
        terminal: bool,
        a: usize,
        ns: &[f64],
        next_terminal: bool,
    ) -> FddResult<usize> {
        (**self).pre_discover(s, terminal, a, ns, next_terminal)
    }

    fn as_discoverable_mut(&mut self) -> Option<&mut dyn Discoverable> {
        (**self).as_discoverable_mut()
    }
}

fn restricted_max(qs: &[f64], possible_actions: &[usize], domain: &DomainSpec) -> FddResult<f64> {
    let mut max = f64::NEG_INFINITY;
    for &a in possible_actions {
        domain.check_action(a)?;
        max = max.max(qs[a]);
    }
    Ok(max)
}
