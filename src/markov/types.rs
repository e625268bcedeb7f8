//! Core traits for cost models and Monte Carlo replicas.

use rand::Rng;

/// A cost function over discrete configurations.
///
/// The model is immutable once built and shared read-only by every
/// replica of a population, hence `Send + Sync`.
///
/// # Minimization
///
/// Lower cost is better. For maximization, negate the cost.
///
/// # Examples
///
/// ```
/// use rand::Rng;
/// use u_popanneal::markov::Model;
///
/// struct Chain { target: i64 }
///
/// impl Model for Chain {
///     type State = i64;
///     type Transition = i64;
///
///     fn calculate_cost(&self, x: &i64) -> f64 { (x - self.target).abs() as f64 }
///     fn calculate_cost_difference(&self, x: &i64, step: &i64) -> f64 {
///         self.calculate_cost(&(x + step)) - self.calculate_cost(x)
///     }
///     fn apply_transition(&self, step: &i64, x: &mut i64) { *x += step; }
///     fn random_state<R: Rng>(&self, rng: &mut R) -> i64 { rng.random_range(-50..=50) }
///     fn random_transition<R: Rng>(&self, _x: &i64, rng: &mut R) -> i64 {
///         if rng.random_bool(0.5) { 1 } else { -1 }
///     }
///     fn sweep_size(&self) -> usize { 1 }
/// }
///
/// let chain = Chain { target: 3 };
/// assert_eq!(chain.calculate_cost(&5), 2.0);
/// assert_eq!(chain.calculate_cost_difference(&5, &-1), -1.0);
/// ```
pub trait Model: Send + Sync {
    /// A full configuration.
    type State: Clone + Send + Sync;

    /// A local move proposed during a sweep.
    type Transition;

    /// Computes the cost of a configuration from scratch.
    fn calculate_cost(&self, state: &Self::State) -> f64;

    /// Cost change caused by applying `transition` to `state`.
    fn calculate_cost_difference(&self, state: &Self::State, transition: &Self::Transition) -> f64;

    /// Applies `transition` to `state` in place.
    fn apply_transition(&self, transition: &Self::Transition, state: &mut Self::State);

    /// Draws a random starting configuration.
    fn random_state<R: Rng>(&self, rng: &mut R) -> Self::State;

    /// Draws a random local move from `state`.
    fn random_transition<R: Rng>(&self, state: &Self::State, rng: &mut R) -> Self::Transition;

    /// Number of proposals that make up one sweep.
    fn sweep_size(&self) -> usize;

    /// Factor applied to costs inside Boltzmann weights. Must be positive.
    fn scale_factor(&self) -> f64 {
        1.0
    }

    /// Approximate heap + inline bytes of one [`Model::State`].
    fn state_memory_estimate(&self) -> usize {
        std::mem::size_of::<Self::State>()
    }
}

/// One independent Monte Carlo chain, as consumed by the population.
///
/// Cloning a replica is how resampling produces offspring, so `Clone`
/// should copy state, cost and lowest-seen bookkeeping. Implementations
/// are encouraged to override [`Clone::clone_from`] so recycled slots
/// keep their allocations.
pub trait Replica: Clone + Send + Sync {
    /// The configuration type reported back in results.
    type State: Clone + Send + Sync;

    /// (Re)starts the chain from a fresh random configuration.
    fn init(&mut self);

    /// Advances the chain by `n` sweeps.
    fn make_sweeps(&mut self, n: usize);

    /// Cost of the current configuration.
    fn cost(&self) -> f64;

    /// Current configuration.
    fn state(&self) -> &Self::State;

    /// Sets the inverse temperature.
    fn set_beta(&mut self, beta: f64);

    /// Current inverse temperature.
    fn beta(&self) -> f64;

    /// Lowest cost seen since the last [`Replica::init`].
    fn lowest_cost(&self) -> f64;

    /// Configuration that achieved [`Replica::lowest_cost`].
    fn lowest_state(&self) -> &Self::State;

    /// Replaces the replica's random source with one seeded by `seed`.
    fn reseed(&mut self, seed: u64);

    /// Returns the number of cost evaluations since the previous call
    /// and resets the counter.
    fn take_evaluations(&mut self) -> u64 {
        0
    }

    /// Cost scale used to condition Boltzmann weights.
    fn scale_factor(&self) -> f64 {
        1.0
    }

    /// Approximate memory footprint of one replica, in bytes.
    fn memory_estimate(&self) -> usize {
        std::mem::size_of::<Self>()
    }
}
