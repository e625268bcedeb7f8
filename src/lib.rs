//! Population annealing for discrete optimization.
//!
//! A population of independent Monte Carlo replicas is driven through an
//! increasing inverse temperature while being repeatedly resampled (a
//! birth/death process), so that it concentrates on low-cost
//! configurations. The population restarts itself when its genetic
//! diversity collapses.
//!
//! - **markov**: the [`Model`](markov::Model) cost-function interface, the
//!   [`Replica`](markov::Replica) interface the engine drives, and the
//!   [`Metropolis`](markov::Metropolis) walker.
//! - **population**: [`ResamplingPopulation`](population::ResamplingPopulation),
//!   a slot-recycling container supporting weighted duplication, and
//!   [`WeightedSelector`](population::WeightedSelector).
//! - **pa**: the annealing controller, its temperature-stepping
//!   strategies and the [`PaRunner`](pa::PaRunner) harness.
//!
//! # Architecture
//!
//! Cost models are supplied by consumers: the crate contains no
//! problem-specific concepts (spin glasses, QUBO, routing, ...).

pub mod error;
pub mod markov;
pub mod pa;
pub mod population;

pub use error::{AnnealError, AnnealResult};
