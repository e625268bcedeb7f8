//! Population annealing configuration and temperature-stepping strategies.

use crate::error::{AnnealError, AnnealResult};
use std::fmt;
use std::str::FromStr;

/// Shape of an explicit inverse-temperature schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ScheduleKind {
    /// `beta_k = start + (stop - start) * k / steps`.
    Linear,
    /// `beta_k = start * (stop / start)^(k / steps)`.
    Geometric,
}

/// Inverse temperature as a function of the step index since the last
/// restart.
///
/// Past `steps` the schedule stays at `stop`, so it no longer produces
/// a temperature increment.
///
/// # Examples
///
/// ```
/// use u_popanneal::pa::BetaSchedule;
///
/// let schedule = BetaSchedule::linear(0.0, 5.0).with_steps(10);
/// assert!((schedule.value(2) - 1.0).abs() < 1e-12);
/// assert!((schedule.value(50) - 5.0).abs() < 1e-12);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BetaSchedule {
    pub kind: ScheduleKind,
    pub start: f64,
    pub stop: f64,
    /// Number of steps from `start` to `stop`. `None` means "stretch
    /// over the run's step limit".
    pub steps: Option<usize>,
}

impl BetaSchedule {
    pub fn linear(start: f64, stop: f64) -> Self {
        Self {
            kind: ScheduleKind::Linear,
            start,
            stop,
            steps: None,
        }
    }

    pub fn geometric(start: f64, stop: f64) -> Self {
        Self {
            kind: ScheduleKind::Geometric,
            start,
            stop,
            steps: None,
        }
    }

    pub fn with_steps(mut self, steps: usize) -> Self {
        self.steps = Some(steps);
        self
    }

    /// Schedule value at step `k`.
    ///
    /// An unresolved schedule (no step count) is flat at `start`.
    pub fn value(&self, k: usize) -> f64 {
        let steps = match self.steps {
            Some(steps) if steps > 0 => steps,
            _ => return self.start,
        };
        let t = k.min(steps) as f64 / steps as f64;
        match self.kind {
            ScheduleKind::Linear => self.start + (self.stop - self.start) * t,
            ScheduleKind::Geometric => self.start * (self.stop / self.start).powf(t),
        }
    }

    /// Fills in a missing step count by stretching the schedule over
    /// `step_limit - 1` steps (at least one).
    pub fn resolved(self, step_limit: Option<usize>) -> AnnealResult<Self> {
        self.validate()?;
        match (self.steps, step_limit) {
            (Some(_), _) => Ok(self),
            (None, Some(limit)) => Ok(self.with_steps(limit.saturating_sub(1).max(1))),
            (None, None) => Err(AnnealError::InvalidConfig(
                "beta schedule needs either a step count or a step limit".into(),
            )),
        }
    }

    pub fn validate(&self) -> AnnealResult<()> {
        if self.start.is_nan() || self.stop.is_nan() || self.start >= self.stop {
            return Err(AnnealError::InvalidConfig(format!(
                "beta schedule must be increasing, found start {} >= stop {}",
                self.start, self.stop
            )));
        }
        match self.kind {
            ScheduleKind::Linear if self.start < 0.0 => Err(AnnealError::InvalidConfig(
                format!("linear beta schedule must start at >= 0, got {}", self.start),
            )),
            ScheduleKind::Geometric if self.start <= 0.0 => Err(AnnealError::InvalidConfig(
                format!("geometric beta schedule must start at > 0, got {}", self.start),
            )),
            _ => Ok(()),
        }
    }
}

/// How the temperature increment `delta_beta` is chosen each step.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ResamplingStrategy {
    /// Follow an explicit [`BetaSchedule`].
    Schedule(BetaSchedule),

    /// `delta_beta = constant / sqrt(zeta)`, with `zeta` the friction
    /// tensor estimate from the cost autocorrelation.
    FrictionTensor { constant: f64 },

    /// `delta_beta = culling_fraction / sqrt(var_after)`.
    EnergyVariance { culling_fraction: f64 },

    /// Choose `delta_beta` so that the expected fraction of culled
    /// replicas equals `culling_fraction`.
    ConstantCulling { culling_fraction: f64 },
}

impl Default for ResamplingStrategy {
    fn default() -> Self {
        ResamplingStrategy::Schedule(BetaSchedule::linear(0.0, 5.0))
    }
}

impl ResamplingStrategy {
    /// Inverse temperature at the start of every epoch.
    pub fn beta_start(&self) -> f64 {
        match self {
            ResamplingStrategy::Schedule(schedule) => schedule.value(0),
            _ => 0.0,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ResamplingStrategy::Schedule(s) => match s.kind {
                ScheduleKind::Linear => "linear_schedule",
                ScheduleKind::Geometric => "geometric_schedule",
            },
            ResamplingStrategy::FrictionTensor { .. } => "friction_tensor",
            ResamplingStrategy::EnergyVariance { .. } => "energy_variance",
            ResamplingStrategy::ConstantCulling { .. } => "constant_culling",
        }
    }

    pub fn validate(&self) -> AnnealResult<()> {
        match *self {
            ResamplingStrategy::Schedule(ref schedule) => schedule.validate(),
            ResamplingStrategy::FrictionTensor { constant }
                if constant.is_nan() || constant <= 0.0 =>
            {
                Err(AnnealError::InvalidConfig(format!(
                    "friction_tensor_constant must be positive, got {constant}"
                )))
            }
            ResamplingStrategy::EnergyVariance { culling_fraction }
            | ResamplingStrategy::ConstantCulling { culling_fraction }
                if culling_fraction.is_nan() || culling_fraction <= 0.0 =>
            {
                Err(AnnealError::InvalidConfig(format!(
                    "culling fraction must be positive, got {culling_fraction}"
                )))
            }
            _ => Ok(()),
        }
    }
}

impl FromStr for ResamplingStrategy {
    type Err = AnnealError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "linear_schedule" => Ok(ResamplingStrategy::Schedule(BetaSchedule::linear(0.0, 5.0))),
            "geometric_schedule" => Ok(ResamplingStrategy::Schedule(BetaSchedule::geometric(
                0.01, 5.0,
            ))),
            "friction_tensor" => Ok(ResamplingStrategy::FrictionTensor { constant: 1.0 }),
            "energy_variance" => Ok(ResamplingStrategy::EnergyVariance {
                culling_fraction: 0.5,
            }),
            "constant_culling" => Ok(ResamplingStrategy::ConstantCulling {
                culling_fraction: 0.1,
            }),
            other => Err(AnnealError::UnknownStrategy(other.to_string())),
        }
    }
}

impl fmt::Display for ResamplingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Configuration for a population annealing run.
///
/// # Examples
///
/// ```
/// use u_popanneal::pa::{PaConfig, ResamplingStrategy};
///
/// let config = PaConfig::default()
///     .with_population(256)
///     .with_alpha(2.0)
///     .with_strategy("friction_tensor".parse::<ResamplingStrategy>().unwrap())
///     .with_step_limit(100)
///     .with_seed(7);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PaConfig {
    /// Target number of replicas.
    pub population: usize,

    /// Restart threshold: restart once `R / rho_t < alpha`.
    pub alpha: f64,

    pub strategy: ResamplingStrategy,

    /// Markov-chain sweeps per replica per step.
    pub sweeps_per_replica: usize,

    /// Keep the population at exactly `population` (residual
    /// resampling) instead of the Poisson birth/death process.
    pub constant_population: bool,

    /// Number of best replicas carried over into the next epoch at a
    /// restart. 0 reseeds everything.
    pub reserved_population: usize,

    /// Double the target population at each restart.
    pub grow_on_restart: bool,

    /// Number of alive replicas reported in the result.
    pub solutions_to_return: usize,

    /// Maximum number of steps. `None` = unbounded.
    pub step_limit: Option<usize>,

    /// Wall-clock budget in milliseconds. `None` = unbounded.
    pub time_limit_ms: Option<u64>,

    /// Stop once the best cost is at or below this value.
    pub cost_limit: Option<f64>,

    /// Stop once this many cost evaluations have been spent.
    pub evaluation_limit: Option<u64>,

    /// Random seed for reproducibility.
    pub seed: Option<u64>,

    /// Sweep replicas on the rayon pool.
    pub parallel: bool,

    /// Size of a dedicated worker pool. `None` uses the global pool.
    pub threads: Option<usize>,

    /// Overrides the probed available memory for admission control.
    pub memory_limit_bytes: Option<u64>,
}

impl Default for PaConfig {
    fn default() -> Self {
        Self {
            population: 128,
            alpha: 2.0,
            strategy: ResamplingStrategy::default(),
            sweeps_per_replica: 1,
            constant_population: false,
            reserved_population: 0,
            grow_on_restart: false,
            solutions_to_return: 1,
            step_limit: None,
            time_limit_ms: None,
            cost_limit: None,
            evaluation_limit: None,
            seed: None,
            parallel: true,
            threads: None,
            memory_limit_bytes: None,
        }
    }
}

impl PaConfig {
    pub fn with_population(mut self, n: usize) -> Self {
        self.population = n;
        self
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_strategy(mut self, strategy: ResamplingStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_sweeps_per_replica(mut self, n: usize) -> Self {
        self.sweeps_per_replica = n;
        self
    }

    pub fn with_constant_population(mut self, enabled: bool) -> Self {
        self.constant_population = enabled;
        self
    }

    pub fn with_reserved_population(mut self, n: usize) -> Self {
        self.reserved_population = n;
        self
    }

    pub fn with_grow_on_restart(mut self, enabled: bool) -> Self {
        self.grow_on_restart = enabled;
        self
    }

    pub fn with_solutions_to_return(mut self, n: usize) -> Self {
        self.solutions_to_return = n;
        self
    }

    pub fn with_step_limit(mut self, n: usize) -> Self {
        self.step_limit = Some(n);
        self
    }

    pub fn with_time_limit_ms(mut self, ms: u64) -> Self {
        self.time_limit_ms = Some(ms);
        self
    }

    pub fn with_cost_limit(mut self, cost: f64) -> Self {
        self.cost_limit = Some(cost);
        self
    }

    pub fn with_evaluation_limit(mut self, n: u64) -> Self {
        self.evaluation_limit = Some(n);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_threads(mut self, n: usize) -> Self {
        self.threads = Some(n);
        self
    }

    pub fn with_memory_limit_bytes(mut self, bytes: u64) -> Self {
        self.memory_limit_bytes = Some(bytes);
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> AnnealResult<()> {
        if self.population == 0 {
            return Err(AnnealError::InvalidConfig(
                "population must be greater than 0".into(),
            ));
        }
        if self.alpha.is_nan() || self.alpha <= 1.0 {
            return Err(AnnealError::InvalidConfig(format!(
                "alpha must be greater than 1, got {}",
                self.alpha
            )));
        }
        if self.sweeps_per_replica == 0 {
            return Err(AnnealError::InvalidConfig(
                "sweeps_per_replica must be greater than 0".into(),
            ));
        }
        if self.threads == Some(0) {
            return Err(AnnealError::InvalidConfig(
                "threads must be greater than 0".into(),
            ));
        }
        self.strategy.validate()?;
        if let ResamplingStrategy::Schedule(schedule) = self.strategy {
            schedule.resolved(self.step_limit)?;
        }
        Ok(())
    }
}
