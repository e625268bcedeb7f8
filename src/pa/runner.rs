//! Stepping harness: limits, cancellation and result assembly.

use super::config::PaConfig;
use super::controller::{PopulationAnnealing, Solution};
use crate::error::{AnnealError, AnnealResult};
use crate::markov::Replica;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// Result of a population annealing run.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PaResult<S> {
    /// The best configuration seen by any replica, across all restarts.
    pub best: S,

    /// Cost of `best`.
    pub best_cost: f64,

    /// The lowest-cost replicas alive at the end, best first.
    pub solutions: Vec<Solution<S>>,

    /// Number of steps executed.
    pub steps: usize,

    /// Number of population restarts.
    pub restarts: usize,

    /// Inverse temperature when the run stopped.
    pub final_beta: f64,

    /// Population size when the run stopped.
    pub final_population: usize,

    /// Total cost evaluations.
    pub evaluations: u64,

    /// Whether cancelled externally.
    pub cancelled: bool,

    /// Best cost after initialization and after every step.
    pub cost_history: Vec<f64>,
}

/// Executes population annealing until a limit is reached.
///
/// # Usage
///
/// ```
/// use std::sync::Arc;
/// use rand::Rng;
/// use u_popanneal::markov::{Metropolis, Model};
/// use u_popanneal::pa::{PaConfig, PaRunner, ResamplingStrategy};
///
/// struct Chain;
///
/// impl Model for Chain {
///     type State = i64;
///     type Transition = i64;
///
///     fn calculate_cost(&self, x: &i64) -> f64 { (x - 3).abs() as f64 }
///     fn calculate_cost_difference(&self, x: &i64, step: &i64) -> f64 {
///         self.calculate_cost(&(x + step)) - self.calculate_cost(x)
///     }
///     fn apply_transition(&self, step: &i64, x: &mut i64) { *x += step; }
///     fn random_state<R: Rng>(&self, rng: &mut R) -> i64 { rng.random_range(-20..=20) }
///     fn random_transition<R: Rng>(&self, _x: &i64, rng: &mut R) -> i64 {
///         if rng.random_bool(0.5) { 1 } else { -1 }
///     }
///     fn sweep_size(&self) -> usize { 4 }
/// }
///
/// let config = PaConfig::default()
///     .with_population(32)
///     .with_strategy(ResamplingStrategy::FrictionTensor { constant: 1.0 })
///     .with_step_limit(200)
///     .with_seed(1);
/// let result = PaRunner::run(Metropolis::new(Arc::new(Chain), 0), &config).unwrap();
/// assert_eq!(result.best, 3);
/// ```
pub struct PaRunner;

impl PaRunner {
    /// Runs population annealing on clones of `blueprint`.
    pub fn run<R: Replica>(blueprint: R, config: &PaConfig) -> AnnealResult<PaResult<R::State>> {
        Self::run_with_cancel(blueprint, config, None)
    }

    /// Runs with an optional cancellation token.
    ///
    /// The flag is checked between steps; a cancelled run still returns
    /// the best solution found so far.
    ///
    /// # Errors
    /// Configuration and admission errors are returned before any step
    /// runs. A run needs a step limit, a time limit or a cancellation
    /// token to terminate.
    pub fn run_with_cancel<R: Replica>(
        blueprint: R,
        config: &PaConfig,
        cancel: Option<Arc<AtomicBool>>,
    ) -> AnnealResult<PaResult<R::State>> {
        if config.step_limit.is_none() && config.time_limit_ms.is_none() && cancel.is_none() {
            return Err(AnnealError::InvalidConfig(
                "either step_limit or time_limit_ms must be set".into(),
            ));
        }

        let start = Instant::now();
        let deadline = config
            .time_limit_ms
            .map(|ms| start + Duration::from_millis(ms));

        let mut pa = PopulationAnnealing::new(blueprint, config.clone())?;
        pa.set_deadline(deadline);
        pa.init()?;

        let mut cost_history = Vec::new();
        cost_history.extend(pa.best_cost());

        let mut step = 0usize;
        let mut cancelled = false;
        loop {
            if let Some(ref flag) = cancel {
                if flag.load(Ordering::Relaxed) {
                    cancelled = true;
                    break;
                }
            }
            if config.step_limit.is_some_and(|limit| step >= limit) {
                break;
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                break;
            }
            if let (Some(limit), Some(best)) = (config.cost_limit, pa.best_cost()) {
                if best <= limit {
                    break;
                }
            }
            if config
                .evaluation_limit
                .is_some_and(|limit| pa.evaluations() >= limit)
            {
                break;
            }

            pa.make_step(step)?;
            step += 1;
            cost_history.extend(pa.best_cost());
        }

        let solutions = pa.finalize();
        let (best_cost, best) = match (pa.best_cost(), pa.best_state()) {
            (Some(cost), Some(state)) => (cost, state.clone()),
            _ => return Err(AnnealError::EmptyPopulation("no solution was recorded")),
        };

        info!(
            steps = step,
            restarts = pa.epoch(),
            best_cost,
            evaluations = pa.evaluations(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            cancelled,
            "population annealing finished"
        );

        Ok(PaResult {
            best,
            best_cost,
            solutions,
            steps: step,
            restarts: pa.epoch(),
            final_beta: pa.beta(),
            final_population: pa.population().len(),
            evaluations: pa.evaluations(),
            cancelled,
            cost_history,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markov::test_models::{Flat, Lattice};
    use crate::markov::Metropolis;
    use crate::pa::memory::required_memory;
    use crate::pa::config::ResamplingStrategy;

    fn walker(target: i64) -> Metropolis<Lattice> {
        Metropolis::new(Arc::new(Lattice::new(target)), 11)
    }

    fn config() -> PaConfig {
        PaConfig::default()
            .with_population(64)
            .with_strategy(ResamplingStrategy::FrictionTensor { constant: 1.0 })
            .with_seed(42)
            .with_memory_limit_bytes(1 << 30)
    }

    #[test]
    fn test_run_reaches_minimum() {
        let result = PaRunner::run(walker(17), &config().with_step_limit(100)).unwrap();
        assert_eq!(result.best, 17);
        assert_eq!(result.best_cost, 0.0);
        assert_eq!(result.steps, 100);
        assert_eq!(result.cost_history.len(), 101);
        assert!(!result.cancelled);
        assert_eq!(result.solutions.len(), 1);
        assert!(result.evaluations > 0);
    }

    #[test]
    fn test_cost_history_non_increasing() {
        let result = PaRunner::run(walker(-30), &config().with_step_limit(60)).unwrap();
        for window in result.cost_history.windows(2) {
            assert!(
                window[1] <= window[0],
                "best cost history should be non-increasing: {} > {}",
                window[1],
                window[0]
            );
        }
    }

    #[test]
    fn test_cancellation() {
        // Set before running so cancellation does not depend on timing.
        let cancel = Arc::new(AtomicBool::new(true));
        let result = PaRunner::run_with_cancel(walker(0), &config(), Some(cancel)).unwrap();
        assert!(result.cancelled);
        assert_eq!(result.steps, 0);
        assert_eq!(result.cost_history.len(), 1);
    }

    #[test]
    fn test_missing_limits_is_an_error() {
        let result = PaRunner::run(walker(0), &config());
        assert!(matches!(result, Err(AnnealError::InvalidConfig(_))));
    }

    #[test]
    fn test_cost_limit_stops_early() {
        let result = PaRunner::run(
            walker(4),
            &config().with_step_limit(1000).with_cost_limit(0.0),
        )
        .unwrap();
        assert_eq!(result.best_cost, 0.0);
        assert!(result.steps < 1000);
    }

    #[test]
    fn test_evaluation_limit_stops_early() {
        let limit = 64 * 4 * 10;
        let result = PaRunner::run(
            walker(4),
            &config().with_step_limit(1000).with_evaluation_limit(limit),
        )
        .unwrap();
        assert!(result.steps < 1000);
        assert!(result.evaluations >= limit);
    }

    #[test]
    fn test_time_limit_stops() {
        let start = Instant::now();
        let result = PaRunner::run(walker(4), &config().with_time_limit_ms(50)).unwrap();
        assert!(start.elapsed() < Duration::from_secs(10));
        assert!(!result.cancelled);
    }

    #[test]
    fn test_solutions_are_alive_and_sorted() {
        let result = PaRunner::run(
            walker(8),
            &config().with_step_limit(30).with_solutions_to_return(10),
        )
        .unwrap();
        assert_eq!(result.solutions.len(), 10);
        for pair in result.solutions.windows(2) {
            assert!(pair[0].cost <= pair[1].cost);
        }
        assert!(result.best_cost <= result.solutions[0].cost);
        assert!(result.final_population <= 64);
    }

    #[test]
    fn test_grow_blocked_by_memory_still_returns_result() {
        let walker = Metropolis::new(Arc::new(Flat), 3);
        let limit = required_memory(walker.memory_estimate(), 8);
        let config = config()
            .with_population(8)
            .with_alpha(1.0001)
            .with_grow_on_restart(true)
            .with_memory_limit_bytes(limit)
            .with_step_limit(4);
        let result = PaRunner::run(walker, &config).unwrap();
        assert_eq!(result.steps, 4);
        assert_eq!(result.restarts, 4);
        assert_eq!(result.final_population, 8);
        assert_eq!(result.best_cost, 1.0);
    }

    #[test]
    fn test_invalid_config_surfaces_before_run() {
        let result = PaRunner::run(walker(0), &config().with_step_limit(5).with_alpha(0.5));
        assert!(matches!(result, Err(AnnealError::InvalidConfig(_))));
    }
}
