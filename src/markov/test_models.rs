//! Toy models shared by unit tests.

use super::types::Model;
use rand::Rng;

/// One integer variable on `[-50, 50]` with cost `|x - target|`.
///
/// Moves are `±1`, so the unique minimum (cost 0) is reachable from
/// everywhere.
#[derive(Debug, Clone)]
pub(crate) struct Lattice {
    pub target: i64,
    pub scale: f64,
    pub state_bytes: usize,
}

impl Lattice {
    pub(crate) fn new(target: i64) -> Self {
        Self {
            target,
            scale: 1.0,
            state_bytes: std::mem::size_of::<i64>(),
        }
    }
}

impl Model for Lattice {
    type State = i64;
    type Transition = i64;

    fn calculate_cost(&self, x: &i64) -> f64 {
        (x - self.target).abs() as f64
    }

    fn calculate_cost_difference(&self, x: &i64, step: &i64) -> f64 {
        self.calculate_cost(&(x + step)) - self.calculate_cost(x)
    }

    fn apply_transition(&self, step: &i64, x: &mut i64) {
        *x = (*x + step).clamp(-50, 50);
    }

    fn random_state<R: Rng>(&self, rng: &mut R) -> i64 {
        rng.random_range(-50..=50)
    }

    fn random_transition<R: Rng>(&self, x: &i64, rng: &mut R) -> i64 {
        let step = if rng.random_bool(0.5) { 1 } else { -1 };
        // Reflect at the boundary so every move changes the state.
        if (*x + step).abs() > 50 {
            -step
        } else {
            step
        }
    }

    fn sweep_size(&self) -> usize {
        4
    }

    fn scale_factor(&self) -> f64 {
        self.scale
    }

    fn state_memory_estimate(&self) -> usize {
        self.state_bytes
    }
}

/// Every configuration costs the same; the population collapses at once.
#[derive(Debug, Clone)]
pub(crate) struct Flat;

impl Model for Flat {
    type State = u32;
    type Transition = u32;

    fn calculate_cost(&self, _x: &u32) -> f64 {
        1.0
    }

    fn calculate_cost_difference(&self, _x: &u32, _t: &u32) -> f64 {
        0.0
    }

    fn apply_transition(&self, t: &u32, x: &mut u32) {
        *x = *t;
    }

    fn random_state<R: Rng>(&self, rng: &mut R) -> u32 {
        rng.random_range(0..1000)
    }

    fn random_transition<R: Rng>(&self, _x: &u32, rng: &mut R) -> u32 {
        rng.random_range(0..1000)
    }

    fn sweep_size(&self) -> usize {
        1
    }
}
