//! Markov-chain building blocks consumed by the population.
//!
//! - [`Model`]: an immutable cost function with random states and local
//!   transitions, shared by all replicas.
//! - [`Replica`]: the interface the population annealing controller
//!   drives (sweep, measure, set temperature, report best-seen).
//! - [`Metropolis`]: the standard Metropolis walker implementing
//!   [`Replica`] for any [`Model`].

mod metropolis;
#[cfg(test)]
pub(crate) mod test_models;
mod types;

pub use metropolis::Metropolis;
pub use types::{Model, Replica};
