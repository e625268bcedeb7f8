//! Error type shared by the population annealing engine.

use thiserror::Error;

/// Errors surfaced by configuration, admission control and the step loop.
///
/// Numerical degeneracies inside a step (zero variance, vanishing weights)
/// are not errors; they fall back to "no temperature advance".
#[derive(Error, Debug)]
pub enum AnnealError {
    #[error("Configuration Error: {0}")]
    InvalidConfig(String),

    #[error("Unknown resampling strategy `{0}`; expected one of linear_schedule, geometric_schedule, friction_tensor, energy_variance, constant_culling")]
    UnknownStrategy(String),

    #[error(
        "Input problem is too large (too many replicas, terms and/or variables): \
         needs ~{required} bytes, {available} bytes available"
    )]
    InsufficientMemory { required: u64, available: u64 },

    #[error("Population is empty: {0}")]
    EmptyPopulation(&'static str),

    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

pub type AnnealResult<T> = Result<T, AnnealError>;
