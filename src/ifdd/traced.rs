// iFDD(kappa): relevance statistics accumulated through eligibility traces
// Eager mode updates every potential each step; lazy mode only touches the
// active ones and replays their inactive steps from per-episode sums

use std::collections::BTreeMap;

use rand::Rng;
use tracing::{info, warn};

use super::lattice::{pairs, FeatureSet};
use super::Ifdd;
use crate::config::IfddKConfig;
use crate::domain::DomainSpec;
use crate::error::FddResult;
use crate::representation::{
    Discoverable, FeatureVector, IndependentDiscretization, InitialRepresentation, Representation,
    WeightVector,
};

/// Potential conjunction with traced statistics
#[derive(Debug, Clone, PartialEq)]
pub struct TracedPotential {
    pub f_set: FeatureSet,
    pub parents: (usize, usize),
    /// Trace-weighted sum of absolute TD errors
    pub a: f64,
    /// Trace-weighted sum of TD errors
    pub b: f64,
    /// Sum of squared joint activations
    pub c: f64,
    /// Eligibility trace
    pub e: f64,
    /// Episode index of the last update
    pub n_crho: u64,
    /// Step of the last update
    pub last: u64,
    /// Log importance-ratio sum of the episode at the last update
    pub nu: f64,
    /// Episode accumulators right after the last update
    pub x_a: f64,
    pub x_b: f64,
}

/// Discounted TD-error sums of one trace episode
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TraceEpisode {
    /// Step count when the episode began
    pub start: u64,
    /// Sum of `exp(w) * decay^(t - start) * |td|` over the episode's steps
    pub y_a: f64,
    /// Same sum over signed TD errors
    pub y_b: f64,
}

/// Trace state shared by every lazy update of step `t`
#[derive(Debug, Clone, Copy)]
pub struct TraceClock<'a> {
    /// Trace decay times discount factor
    pub decay: f64,
    pub t: u64,
    pub n_rho: u64,
    /// Log importance-ratio sum of the episode before step `t`
    pub w_prev: f64,
    /// The same sum including step `t`
    pub w: f64,
    /// Accumulators of the current episode before step `t`
    pub y_prev: (f64, f64),
    /// Every episode so far, the current one last and already including step `t`
    pub episodes: &'a [TraceEpisode],
}

impl TracedPotential {
    pub fn new(f_set: FeatureSet, p1: usize, p2: usize) -> Self {
        Self {
            f_set,
            parents: (p1, p2),
            a: 0.0,
            b: 0.0,
            c: 0.0,
            e: 0.0,
            n_crho: 0,
            last: 0,
            nu: 0.0,
            x_a: 0.0,
            x_b: 0.0,
        }
    }

    /// Relevance `|b| / sqrt(c)` (`plus`) or `a / sqrt(c)`; zero while `c` is zero
    pub fn relevance(&self, plus: bool) -> f64 {
        if self.c == 0.0 {
            return 0.0;
        }
        if plus {
            self.b.abs() / self.c.sqrt()
        } else {
            self.a / self.c.sqrt()
        }
    }

    /// Fold one transition into the statistics. `phi` is the joint
    /// activation of the parents, `n_rho` the current episode index.
    /// An update that would leave a non-finite statistic is dropped and
    /// false is returned.
    pub fn update(
        &mut self,
        rho: f64,
        td_error: f64,
        lambda: f64,
        discount_factor: f64,
        phi: f64,
        n_rho: u64,
    ) -> bool {
        let e = if n_rho > self.n_crho { 0.0 } else { self.e };
        let e = rho * (lambda * discount_factor * e + phi);
        let a = self.a + td_error.abs() * e;
        let b = self.b + td_error * e;
        let c = self.c + phi * phi;
        if !(e.is_finite() && a.is_finite() && b.is_finite() && c.is_finite()) {
            warn!("Overflow in relevance estimate of potential {}, update skipped", self.f_set);
            return false;
        }
        self.e = e;
        self.a = a;
        self.b = b;
        self.c = c;
        self.n_crho = n_rho;
        true
    }

    /// Lazy form of [`update`](Self::update) for a potential that may have
    /// been inactive since its last update. The skipped steps are added in
    /// closed form from the episode sums of `clock` before the current step
    /// is folded in.
    pub fn update_lazy(&mut self, rho: f64, td_error: f64, phi: f64, clock: &TraceClock<'_>) -> bool {
        let decay = clock.decay;
        let (mut a, mut b) = (self.a, self.b);
        let mut e = 0.0;
        if decay > 0.0 && self.e != 0.0 {
            let episode = &clock.episodes[self.n_crho as usize];
            let (y_a, y_b) = if self.n_crho == clock.n_rho {
                clock.y_prev
            } else {
                (episode.y_a, episode.y_b)
            };
            let scale = self.e * (-self.nu).exp() * decay.powf(episode.start as f64 - self.last as f64);
            a += scale * (y_a - self.x_a);
            b += scale * (y_b - self.x_b);
            // otherwise an episode boundary has cut the trace
            if self.n_crho == clock.n_rho {
                let idle = clock.t.saturating_sub(self.last + 1);
                e = self.e * (clock.w_prev - self.nu).exp() * decay.powf(idle as f64);
            }
        }
        let e = rho * (decay * e + phi);
        let a = a + td_error.abs() * e;
        let b = b + td_error * e;
        let c = self.c + phi * phi;
        if !(e.is_finite() && a.is_finite() && b.is_finite() && c.is_finite()) {
            warn!("Overflow in relevance estimate of potential {}, update skipped", self.f_set);
            return false;
        }
        let current = &clock.episodes[clock.n_rho as usize];
        self.e = e;
        self.a = a;
        self.b = b;
        self.c = c;
        self.n_crho = clock.n_rho;
        self.last = clock.t;
        self.nu = clock.w;
        self.x_a = current.y_a;
        self.x_b = current.y_b;
        true
    }
}

/// iFDD with eligibility-traced potentials, mixing iFDD+ and classic
/// relevance with probability `kappa` of the classic one per step.
#[derive(Debug, Clone)]
pub struct IfddK<I: InitialRepresentation = IndependentDiscretization> {
    base: Ifdd<I>,
    lambda: f64,
    kappa: f64,
    discount_factor: f64,
    lazy: bool,
    potentials: BTreeMap<FeatureSet, TracedPotential>,
    // Steps seen
    t: u64,
    // Episode index; bumping it cuts every trace
    n_rho: u64,
    // Log importance-ratio sum of the current episode
    w: f64,
    episodes: Vec<TraceEpisode>,
}

impl IfddK<IndependentDiscretization> {
    pub fn new(domain: &DomainSpec, config: IfddKConfig) -> FddResult<Self> {
        let initial = IndependentDiscretization::new(domain, config.ifdd.discretization)?;
        Self::with_initial(initial, config)
    }
}

impl<I: InitialRepresentation> IfddK<I> {
    pub fn with_initial(initial: I, config: IfddKConfig) -> FddResult<Self> {
        config.validate()?;
        let base = Ifdd::with_initial(initial, config.ifdd)?;
        info!(
            "iFDD(kappa): lambda {}, kappa {}, lazy {}",
            config.lambda, config.kappa, config.lazy
        );
        Ok(Self {
            discount_factor: base.domain.discount_factor,
            base,
            lambda: config.lambda,
            kappa: config.kappa,
            lazy: config.lazy,
            potentials: BTreeMap::new(),
            t: 0,
            n_rho: 0,
            w: 0.0,
            episodes: vec![TraceEpisode::default()],
        })
    }

    /// The underlying binary lattice representation
    pub fn inner(&self) -> &Ifdd<I> {
        &self.base
    }

    pub fn potentials(&self) -> impl Iterator<Item = &TracedPotential> + '_ {
        self.potentials.values()
    }

    pub fn potential(&self, f_set: &FeatureSet) -> Option<&TracedPotential> {
        self.potentials.get(f_set)
    }

    /// Current episode index
    pub fn episode(&self) -> u64 {
        self.n_rho
    }

    /// Discovery step with importance ratio `rho` of the taken action.
    /// A zero ratio cuts the traces of the current episode.
    pub fn post_discover_weighted(&mut self, td_error: f64, phi_s: &FeatureVector, rho: f64) -> FddResult<usize> {
        self.base.check_phi_len(phi_s)?;
        self.t += 1;
        let plus = self.base.rng.random::<f64>() >= self.kappa;
        let added = if self.lazy {
            self.discover_lazy(td_error, phi_s, rho, plus)
        } else {
            self.discover_eager(td_error, phi_s, rho, plus)
        };
        if rho == 0.0 {
            self.start_episode();
        }
        Ok(added)
    }

    /// Joint activation and parents of every unseen conjunction of active pairs
    fn joint_activations(&self, phi_s: &FeatureVector) -> BTreeMap<FeatureSet, (usize, usize, f64)> {
        let mut joint = BTreeMap::new();
        let active = phi_s.active_indices();
        for (g, h) in pairs(&active) {
            let Some(f_set) = self.base.lattice.union_of(g, h) else {
                continue;
            };
            if self.base.lattice.contains(&f_set) {
                continue;
            }
            joint.entry(f_set).or_insert((g, h, phi_s.get(g) * phi_s.get(h)));
        }
        joint
    }

    fn discover_eager(&mut self, td_error: f64, phi_s: &FeatureVector, rho: f64, plus: bool) -> usize {
        let joint = self.joint_activations(phi_s);
        for (f_set, &(g, h, _)) in &joint {
            self.potentials
                .entry(f_set.clone())
                .or_insert_with(|| TracedPotential::new(f_set.clone(), g, h));
        }

        let threshold = self.base.config.discovery_threshold;
        let mut promoted = Vec::new();
        for (f_set, potential) in self.potentials.iter_mut() {
            let phi = joint.get(f_set).map_or(0.0, |&(_, _, phi)| phi);
            potential.update(rho, td_error, self.lambda, self.discount_factor, phi, self.n_rho);
            let relevance = potential.relevance(plus);
            if relevance >= threshold {
                promoted.push((f_set.clone(), potential.parents, relevance));
            } else {
                self.base.update_max_relevance(relevance);
            }
        }

        for (f_set, parents, relevance) in &promoted {
            self.potentials.remove(f_set);
            self.base.add_feature(f_set.clone(), *parents, *relevance);
        }
        if !promoted.is_empty() {
            self.base.max_relevance = f64::NEG_INFINITY;
        }
        promoted.len()
    }

    fn discover_lazy(&mut self, td_error: f64, phi_s: &FeatureVector, rho: f64, plus: bool) -> usize {
        let decay = self.lambda * self.discount_factor;
        let w_prev = self.w;
        let current = self.n_rho as usize;
        let y_prev = (self.episodes[current].y_a, self.episodes[current].y_b);
        if rho > 0.0 {
            self.w += rho.ln();
            if decay > 0.0 {
                let episode = &mut self.episodes[current];
                let scale = self.w.exp() * decay.powf((self.t - episode.start) as f64);
                let y_a = episode.y_a + scale * td_error.abs();
                let y_b = episode.y_b + scale * td_error;
                if y_a.is_finite() && y_b.is_finite() {
                    episode.y_a = y_a;
                    episode.y_b = y_b;
                } else {
                    warn!("Overflow in episode TD-error sums at step {}, step dropped", self.t);
                }
            }
        }

        let joint = self.joint_activations(phi_s);
        let clock = TraceClock {
            decay,
            t: self.t,
            n_rho: self.n_rho,
            w_prev,
            w: self.w,
            y_prev,
            episodes: &self.episodes,
        };
        let threshold = self.base.config.discovery_threshold;
        let mut added = 0;
        for (f_set, (g, h, phi)) in joint {
            let potential = self
                .potentials
                .entry(f_set.clone())
                .or_insert_with(|| TracedPotential::new(f_set.clone(), g, h));
            potential.update_lazy(rho, td_error, phi, &clock);
            let relevance = potential.relevance(plus);
            if relevance >= threshold {
                let parents = potential.parents;
                self.potentials.remove(&f_set);
                self.base.add_feature(f_set, parents, relevance);
                self.base.max_relevance = f64::NEG_INFINITY;
                added += 1;
            } else {
                self.base.update_max_relevance(relevance);
            }
        }
        added
    }

    fn start_episode(&mut self) {
        self.n_rho += 1;
        self.w = 0.0;
        self.episodes.push(TraceEpisode {
            start: self.t,
            ..TraceEpisode::default()
        });
    }
}

impl<I: InitialRepresentation> Representation for IfddK<I> {
    fn domain(&self) -> &DomainSpec {
        self.base.domain()
    }

    fn features_num(&self) -> usize {
        self.base.features_num()
    }

    fn weights(&self) -> &WeightVector {
        self.base.weights()
    }

    fn weights_mut(&mut self) -> &mut WeightVector {
        self.base.weights_mut()
    }

    fn phi_non_terminal(&mut self, s: &[f64]) -> FddResult<FeatureVector> {
        self.base.phi_non_terminal(s)
    }

    fn as_discoverable_mut(&mut self) -> Option<&mut dyn Discoverable> {
        Some(self)
    }
}

impl<I: InitialRepresentation> Discoverable for IfddK<I> {
    fn post_discover(
        &mut self,
        _s: &[f64],
        _terminal: bool,
        _a: usize,
        td_error: f64,
        phi_s: &FeatureVector,
    ) -> FddResult<usize> {
        self.post_discover_weighted(td_error, phi_s, 1.0)
    }

    fn batch_discover(
        &mut self,
        td_errors: &[f64],
        phi: &[FeatureVector],
        states: &[Vec<f64>],
    ) -> FddResult<usize> {
        let added = self.base.discover_batch(td_errors, phi, states)?;
        let lattice = &self.base.lattice;
        self.potentials.retain(|f_set, _| !lattice.contains(f_set));
        Ok(added)
    }

    fn max_relevance(&self) -> f64 {
        self.base.max_relevance
    }

    fn episode_terminated(&mut self) {
        self.start_episode();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IfddConfig;

    fn always_joint(lambda: f64, kappa: f64, threshold: f64) -> IfddK {
        always_joint_with(lambda, kappa, threshold, false)
    }

    fn always_joint_with(lambda: f64, kappa: f64, threshold: f64, lazy: bool) -> IfddK {
        let domain = DomainSpec::discrete(&[(0.0, 1.0), (0.0, 1.0), (0.0, 1.0)], 2).unwrap();
        IfddK::new(
            &domain,
            IfddKConfig {
                ifdd: IfddConfig {
                    discovery_threshold: threshold,
                    ..IfddConfig::default()
                },
                lambda,
                kappa,
                lazy,
            },
        )
        .unwrap()
    }

    /// Three dimensions of two bins: base features 0-1, 2-3 and 4-5
    fn two_bins(lazy: bool) -> IfddK {
        let domain = DomainSpec::discrete(&[(0.0, 2.0), (0.0, 2.0), (0.0, 2.0)], 2).unwrap();
        IfddK::new(
            &domain,
            IfddKConfig {
                ifdd: IfddConfig {
                    discovery_threshold: 1e6,
                    ..IfddConfig::default()
                },
                lambda: 0.5,
                kappa: 0.0,
                lazy,
            },
        )
        .unwrap()
    }

    /// Replay a fixed trace, optionally ending the episode after the third step
    fn replay(rep: &mut IfddK, terminate: bool) {
        let steps = [
            ([0.0, 0.0, 0.0], 1.0, 1.0),
            ([1.0, 0.0, 1.0], -0.5, 0.5),
            ([1.0, 1.0, 1.0], 2.0, 1.0),
            ([0.0, 0.0, 1.0], 0.3, 1.0),
            ([0.0, 0.0, 0.0], -1.2, 1.0),
        ];
        for (i, (s, td, rho)) in steps.iter().enumerate() {
            let phi = rep.phi(s, false).unwrap();
            rep.post_discover_weighted(*td, &phi, *rho).unwrap();
            if terminate && i == 2 {
                rep.episode_terminated();
            }
        }
    }

    #[test]
    fn test_zero_activation_has_zero_relevance() {
        let p = TracedPotential::new(FeatureSet::from_indices([0, 1]), 0, 1);
        assert_eq!(p.relevance(true), 0.0);
        assert_eq!(p.relevance(false), 0.0);
    }

    #[test]
    fn test_update_statistics() {
        let mut p = TracedPotential::new(FeatureSet::from_indices([0, 1]), 0, 1);
        assert!(p.update(1.0, -2.0, 0.5, 0.9, 1.0, 0));
        assert_eq!((p.e, p.a, p.b, p.c), (1.0, 2.0, -2.0, 1.0));

        // inactive step: only the trace decays into the statistics
        assert!(p.update(1.0, 1.0, 0.5, 0.9, 0.0, 0));
        assert!((p.e - 0.45).abs() < 1e-12);
        assert!((p.a - 2.45).abs() < 1e-12);
        assert!((p.b + 1.55).abs() < 1e-12);
        assert_eq!(p.c, 1.0);

        // new episode resets the trace before the update
        assert!(p.update(1.0, 0.0, 0.5, 0.9, 1.0, 1));
        assert_eq!(p.e, 1.0);
        assert_eq!(p.n_crho, 1);
    }

    #[test]
    fn test_non_finite_update_is_skipped() {
        let mut p = TracedPotential::new(FeatureSet::from_indices([0, 1]), 0, 1);
        p.update(1.0, 1.0, 0.0, 0.9, 1.0, 0);
        let before = p.clone();
        assert!(!p.update(1.0, f64::MAX, 0.0, 0.9, f64::MAX, 0));
        assert_eq!(p, before);
    }

    #[test]
    fn test_plus_relevance_promotes_all_pairs() {
        for lazy in [false, true] {
            let mut rep = always_joint_with(0.0, 0.0, 1.0, lazy);
            let s = [0.0, 0.0, 0.0];
            let phi = rep.phi(&s, false).unwrap();
            assert_eq!(phi.active_indices(), vec![0, 1, 2]);

            assert_eq!(rep.post_discover(&s, false, 0, 0.5, &phi).unwrap(), 0);
            assert_eq!(rep.potentials().count(), 3);
            assert!((rep.max_relevance() - 0.5).abs() < 1e-12);

            let phi = rep.phi(&s, false).unwrap();
            // b = 1.5, c = 2: relevance 1.06 for every pair
            assert_eq!(rep.post_discover(&s, false, 0, 1.0, &phi).unwrap(), 3);
            assert_eq!(rep.features_num(), 6);
            assert_eq!(rep.potentials().count(), 0);
            assert_eq!(rep.weights().len(), 12);
            assert_eq!(rep.max_relevance(), f64::NEG_INFINITY);
        }
    }

    #[test]
    fn test_lazy_statistics_match_eager() {
        for terminate in [false, true] {
            let mut eager = two_bins(false);
            let mut lazy = two_bins(true);
            replay(&mut eager, terminate);
            replay(&mut lazy, terminate);
            assert_eq!(eager.potentials().count(), lazy.potentials().count());

            // pairs of the last state are current in both modes; [0, 4] was
            // idle for three steps
            for pair in [[0, 2], [0, 4], [2, 4]] {
                let f = FeatureSet::from_indices(pair);
                let e = eager.potential(&f).unwrap();
                let l = lazy.potential(&f).unwrap();
                assert!((e.a - l.a).abs() < 1e-9, "{:?}: a {} vs {}", pair, e.a, l.a);
                assert!((e.b - l.b).abs() < 1e-9, "{:?}: b {} vs {}", pair, e.b, l.b);
                assert!((e.e - l.e).abs() < 1e-9, "{:?}: e {} vs {}", pair, e.e, l.e);
                assert_eq!(e.c, l.c);
                assert!((e.relevance(true) - l.relevance(true)).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_lazy_catch_up_spans_idle_steps() {
        let mut rep = two_bins(true);
        replay(&mut rep, false);
        // [0, 4] only saw steps 1 and 5; decay 0.45 carries step 1's trace
        // through the idle steps 2-4 with rho 0.5 on step 2
        let p = rep.potential(&FeatureSet::from_indices([0, 4])).unwrap();
        let decay: f64 = 0.45;
        let e2 = 0.5 * decay;
        let e3 = e2 * decay;
        let e4 = e3 * decay;
        let e5 = decay * e4 + 1.0;
        let a = 1.0 + 0.5 * e2 + 2.0 * e3 + 0.3 * e4 + 1.2 * e5;
        let b = 1.0 - 0.5 * e2 + 2.0 * e3 + 0.3 * e4 - 1.2 * e5;
        assert!((p.a - a).abs() < 1e-12);
        assert!((p.b - b).abs() < 1e-12);
        assert!((p.e - e5).abs() < 1e-12);
        assert_eq!(p.c, 2.0);
        assert_eq!(p.last, 5);
    }

    #[test]
    fn test_lazy_overflow_is_skipped() {
        let mut p = TracedPotential::new(FeatureSet::from_indices([0, 1]), 0, 1);
        p.e = 1.0;
        p.last = 2000;
        let episodes = [TraceEpisode {
            start: 0,
            y_a: 1.0,
            y_b: 1.0,
        }];
        let clock = TraceClock {
            decay: 0.5,
            t: 2001,
            n_rho: 0,
            w_prev: 0.0,
            w: 0.0,
            y_prev: (2.0, 2.0),
            episodes: &episodes,
        };
        let before = p.clone();
        assert!(!p.update_lazy(1.0, 1.0, 1.0, &clock));
        assert_eq!(p, before);
    }

    #[test]
    fn test_zero_rho_cuts_traces() {
        let mut rep = always_joint(0.9, 0.0, 100.0);
        let s = [0.0, 0.0, 0.0];
        let phi = rep.phi(&s, false).unwrap();
        rep.post_discover_weighted(1.0, &phi, 0.0).unwrap();
        assert_eq!(rep.episode(), 1);
        let f = FeatureSet::from_indices([0, 1]);
        assert_eq!(rep.potential(&f).unwrap().e, 0.0);

        rep.episode_terminated();
        assert_eq!(rep.episode(), 2);
    }

    #[test]
    fn test_clone_is_independent() {
        let mut rep = always_joint(0.0, 0.0, 1.0);
        let s = [0.0, 0.0, 0.0];
        let copy = rep.clone();
        let phi = rep.phi(&s, false).unwrap();
        rep.post_discover(&s, false, 0, 5.0, &phi).unwrap();
        assert_eq!(rep.features_num(), 6);
        assert_eq!(copy.features_num(), 3);
        assert_eq!(copy.potentials().count(), 0);
    }
}
