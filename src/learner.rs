// Linear SARSA(lambda) driving a representation through an episode loop
// Keeps its eligibility trace in step with the representation's feature count

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, warn};

use crate::error::{FddError, FddResult};
use crate::representation::{EligibilityTrace, Representation};

/// Action selection over a linear representation
pub trait Policy {
    /// Probability of picking `a` at `s`
    fn action_probability<R: Representation + ?Sized>(
        &mut self,
        representation: &mut R,
        s: &[f64],
        terminal: bool,
        possible_actions: &[usize],
        a: usize,
    ) -> FddResult<f64>;

    /// Pick an action at `s`
    fn select_action<R: Representation + ?Sized>(
        &mut self,
        representation: &mut R,
        s: &[f64],
        terminal: bool,
        possible_actions: &[usize],
    ) -> FddResult<usize>;
}

/// Epsilon-greedy over the tied best actions
#[derive(Debug, Clone)]
pub struct EGreedy {
    /// Probability of a uniformly random action
    pub epsilon: f64,
    rng: StdRng,
}

impl EGreedy {
    pub fn new(epsilon: f64, seed: u64) -> Self {
        Self {
            epsilon,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Policy for EGreedy {
    fn action_probability<R: Representation + ?Sized>(
        &mut self,
        representation: &mut R,
        s: &[f64],
        terminal: bool,
        possible_actions: &[usize],
        a: usize,
    ) -> FddResult<f64> {
        if !possible_actions.contains(&a) {
            return Ok(0.0);
        }
        let best = representation.best_actions(s, terminal, possible_actions, None)?;
        let n = possible_actions.len() as f64;
        let greedy = if best.contains(&a) {
            (1.0 - self.epsilon) / best.len() as f64
        } else {
            0.0
        };
        Ok(self.epsilon / n + greedy)
    }

    fn select_action<R: Representation + ?Sized>(
        &mut self,
        representation: &mut R,
        s: &[f64],
        terminal: bool,
        possible_actions: &[usize],
    ) -> FddResult<usize> {
        if possible_actions.is_empty() {
            return Err(FddError::invalid_argument("no possible actions to choose from"));
        }
        if self.rng.random::<f64>() < self.epsilon {
            let i = self.rng.random_range(0..possible_actions.len());
            return Ok(possible_actions[i]);
        }
        representation.best_action(s, terminal, possible_actions, &mut self.rng, None)
    }
}

/// On-policy TD(lambda) control with linear function approximation
#[derive(Debug, Clone)]
pub struct SarsaLambda<R: Representation> {
    representation: R,
    policy: EGreedy,
    /// Step size (alpha)
    learning_rate: f64,
    /// Trace decay (lambda); zero uses a replacing one-step trace
    lambda: f64,
    /// Discount factor (gamma)
    discount_factor: f64,
    trace: EligibilityTrace,
    steps: usize,
    episodes: usize,
}

impl<R: Representation> SarsaLambda<R> {
    pub fn new(representation: R, policy: EGreedy, learning_rate: f64, lambda: f64) -> Self {
        let trace = EligibilityTrace::zeros(representation.features_num(), representation.actions_num());
        Self {
            discount_factor: representation.domain().discount_factor,
            representation,
            policy,
            learning_rate,
            lambda,
            trace,
            steps: 0,
            episodes: 0,
        }
    }

    pub fn representation(&self) -> &R {
        &self.representation
    }

    pub fn representation_mut(&mut self) -> &mut R {
        &mut self.representation
    }

    pub fn into_representation(self) -> R {
        self.representation
    }

    pub fn trace(&self) -> &EligibilityTrace {
        &self.trace
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn episodes(&self) -> usize {
        self.episodes
    }

    /// Action of the behavior policy at `s`
    pub fn act(&mut self, s: &[f64], terminal: bool, possible_actions: &[usize]) -> FddResult<usize> {
        self.policy
            .select_action(&mut self.representation, s, terminal, possible_actions)
    }

    /// One SARSA(lambda) update for the transition `(s, a, r, ns, na)`.
    /// Returns the number of features the representation added.
    pub fn learn(
        &mut self,
        s: &[f64],
        a: usize,
        r: f64,
        ns: &[f64],
        na: usize,
        terminal: bool,
    ) -> FddResult<usize> {
        // the previous state is never terminal
        let mut expanded = self.representation.pre_discover(s, false, a, ns, terminal)?;
        let phi_s = self.representation.phi(s, false)?;
        let phi_ns = self.representation.phi(ns, terminal)?;
        let features_num = self.representation.features_num();
        self.trace.grow_to(features_num);

        if self.lambda > 0.0 {
            self.trace.decay(self.discount_factor * self.lambda);
            self.trace.accumulate(a, &phi_s);
            self.trace.cap(1.0);
        } else {
            self.trace.replace(a, &phi_s);
        }

        let q = self.representation.q(s, false, a, Some(&phi_s))?;
        let q_next = self.representation.q(ns, terminal, na, Some(&phi_ns))?;
        let td_error = r + self.discount_factor * q_next - q;

        if phi_s.nnz() > 0 {
            let weights = self.representation.weights_mut();
            let old = weights.clone();
            for (w, e) in weights.as_mut_slice().iter_mut().zip(self.trace.as_slice()) {
                *w += self.learning_rate * td_error * e;
            }
            if !weights.is_finite() {
                *weights = old;
                warn!("TD-Learning diverged, weights reached infinity; update reverted");
            }
        }

        if let Some(discoverable) = self.representation.as_discoverable_mut() {
            let added = discoverable.post_discover(s, false, a, td_error, &phi_s)?;
            if added > 0 {
                debug!("{} features added at step {}", added, self.steps);
            }
            expanded += added;
        }
        self.trace.grow_to(self.representation.features_num());
        self.steps += 1;

        if terminal {
            self.episode_terminated();
        }
        Ok(expanded)
    }

    fn episode_terminated(&mut self) {
        self.trace.reset();
        self.episodes += 1;
        if let Some(discoverable) = self.representation.as_discoverable_mut() {
            discoverable.episode_terminated();
        }
    }
}
