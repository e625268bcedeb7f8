//! Metropolis walker: the reference [`Replica`] implementation.

use super::types::{Model, Replica};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::fmt;
use std::sync::Arc;

/// A single-configuration Markov chain with Metropolis acceptance.
///
/// Each sweep performs [`Model::sweep_size`] random proposals. A proposal
/// with cost difference `d` is accepted when `d <= 0`, otherwise with
/// probability `exp(-beta * d)`. At `beta == 0` every proposal is accepted.
///
/// The model is held behind an [`Arc`], so cloning a walker (which is how
/// a population duplicates survivors) only copies the configuration and
/// its bookkeeping.
///
/// # References
///
/// Metropolis, Rosenbluth, Rosenbluth, Teller & Teller (1953)
pub struct Metropolis<M: Model> {
    model: Arc<M>,
    state: M::State,
    cost: f64,
    lowest_state: M::State,
    lowest_cost: f64,
    beta: f64,
    rng: SmallRng,
    evaluations: u64,
}

impl<M: Model> Metropolis<M> {
    /// Creates a walker bound to `model`, starting from a random state
    /// drawn with a generator seeded by `seed`.
    pub fn new(model: Arc<M>, seed: u64) -> Self {
        let mut rng = SmallRng::seed_from_u64(seed);
        let state = model.random_state(&mut rng);
        let cost = model.calculate_cost(&state);
        Self {
            lowest_state: state.clone(),
            lowest_cost: cost,
            model,
            state,
            cost,
            beta: 1.0,
            rng,
            evaluations: 1,
        }
    }

    /// Sets the initial inverse temperature.
    pub fn with_beta(mut self, beta: f64) -> Self {
        self.set_beta(beta);
        self
    }

    /// The model this walker samples.
    pub fn model(&self) -> &M {
        &self.model
    }

    /// Proposes one random transition and applies it if accepted.
    pub fn make_step(&mut self) {
        let transition = self.model.random_transition(&self.state, &mut self.rng);
        let diff = self
            .model
            .calculate_cost_difference(&self.state, &transition);
        self.evaluations += 1;

        if self.accept(diff) {
            self.model.apply_transition(&transition, &mut self.state);
            self.cost += diff;
            if self.cost < self.lowest_cost {
                self.lowest_cost = self.cost;
                self.lowest_state.clone_from(&self.state);
            }
        }
    }

    fn accept(&mut self, diff: f64) -> bool {
        if diff <= 0.0 {
            return true;
        }
        self.rng.random_range(0.0..1.0) < (-self.beta * diff).exp()
    }
}

impl<M: Model> Clone for Metropolis<M> {
    fn clone(&self) -> Self {
        Self {
            model: Arc::clone(&self.model),
            state: self.state.clone(),
            cost: self.cost,
            lowest_state: self.lowest_state.clone(),
            lowest_cost: self.lowest_cost,
            beta: self.beta,
            rng: self.rng.clone(),
            evaluations: 0,
        }
    }

    fn clone_from(&mut self, source: &Self) {
        self.model = Arc::clone(&source.model);
        self.state.clone_from(&source.state);
        self.cost = source.cost;
        self.lowest_state.clone_from(&source.lowest_state);
        self.lowest_cost = source.lowest_cost;
        self.beta = source.beta;
        self.rng = source.rng.clone();
        self.evaluations = 0;
    }
}

impl<M: Model> fmt::Debug for Metropolis<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Metropolis")
            .field("cost", &self.cost)
            .field("lowest_cost", &self.lowest_cost)
            .field("beta", &self.beta)
            .finish()
    }
}

impl<M: Model> Replica for Metropolis<M> {
    type State = M::State;

    fn init(&mut self) {
        self.state = self.model.random_state(&mut self.rng);
        self.cost = self.model.calculate_cost(&self.state);
        self.evaluations += 1;
        self.lowest_cost = self.cost;
        self.lowest_state.clone_from(&self.state);
    }

    fn make_sweeps(&mut self, n: usize) {
        let sweep_size = self.model.sweep_size();
        for _ in 0..n {
            for _ in 0..sweep_size {
                self.make_step();
            }
        }
    }

    fn cost(&self) -> f64 {
        self.cost
    }

    fn state(&self) -> &M::State {
        &self.state
    }

    fn set_beta(&mut self, beta: f64) {
        self.beta = beta.max(0.0);
    }

    fn beta(&self) -> f64 {
        self.beta
    }

    fn lowest_cost(&self) -> f64 {
        self.lowest_cost
    }

    fn lowest_state(&self) -> &M::State {
        &self.lowest_state
    }

    fn reseed(&mut self, seed: u64) {
        self.rng = SmallRng::seed_from_u64(seed);
    }

    fn take_evaluations(&mut self) -> u64 {
        std::mem::take(&mut self.evaluations)
    }

    fn scale_factor(&self) -> f64 {
        self.model.scale_factor()
    }

    fn memory_estimate(&self) -> usize {
        std::mem::size_of::<Self>() + 2 * self.model.state_memory_estimate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markov::test_models::Lattice;

    fn walker(seed: u64) -> Metropolis<Lattice> {
        Metropolis::new(Arc::new(Lattice::new(7)), seed)
    }

    #[test]
    fn test_cached_cost_matches_model() {
        let mut w = walker(3).with_beta(0.5);
        w.make_sweeps(50);
        let recomputed = w.model().calculate_cost(w.state());
        assert!((w.cost() - recomputed).abs() < 1e-12);
    }

    #[test]
    fn test_lowest_cost_tracks_minimum() {
        let mut w = walker(11).with_beta(2.0);
        let start = w.cost();
        w.make_sweeps(200);
        assert!(w.lowest_cost() <= start);
        assert!(w.lowest_cost() <= w.cost());
        let recomputed = w.model().calculate_cost(w.lowest_state());
        assert!((w.lowest_cost() - recomputed).abs() < 1e-12);
    }

    #[test]
    fn test_cold_walker_never_goes_uphill() {
        let mut w = walker(5).with_beta(1e9);
        let mut previous = w.cost();
        for _ in 0..100 {
            w.make_sweeps(1);
            assert!(w.cost() <= previous);
            previous = w.cost();
        }
    }

    #[test]
    fn test_negative_beta_is_clamped() {
        let w = walker(1).with_beta(-3.0);
        assert_eq!(w.beta(), 0.0);
    }

    #[test]
    fn test_reseed_is_deterministic() {
        let mut a = walker(9).with_beta(0.3);
        let mut b = a.clone();
        a.reseed(77);
        b.reseed(77);
        a.make_sweeps(20);
        b.make_sweeps(20);
        assert_eq!(a.state(), b.state());
    }

    #[test]
    fn test_take_evaluations_resets() {
        let mut w = walker(2);
        w.take_evaluations();
        w.make_sweeps(3);
        let sweep = w.model().sweep_size() as u64;
        assert_eq!(w.take_evaluations(), 3 * sweep);
        assert_eq!(w.take_evaluations(), 0);
    }

    #[test]
    fn test_init_resets_lowest() {
        let mut w = walker(4);
        w.make_sweeps(10);
        w.init();
        assert_eq!(w.lowest_cost(), w.cost());
    }
}
