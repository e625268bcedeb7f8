//! Temperature increment selection.

use super::config::ResamplingStrategy;
use super::culling::{find_delta_beta, CullingEstimator};
use super::stats::StepStatistics;

impl ResamplingStrategy {
    /// Chooses `delta_beta` for the current step.
    ///
    /// `schedule_step` counts steps since the last restart. Degenerate
    /// statistics (zero variance, undefined `zeta`) yield 0, meaning no
    /// resampling and no temperature advance.
    pub fn choose_delta_beta(
        &self,
        stats: &StepStatistics,
        schedule_step: usize,
        target_population: usize,
        scale_factor: f64,
    ) -> f64 {
        match *self {
            ResamplingStrategy::Schedule(ref schedule) => {
                schedule.value(schedule_step + 1) - schedule.value(schedule_step)
            }
            ResamplingStrategy::FrictionTensor { constant } => {
                if stats.zeta > 0.0 {
                    constant / stats.zeta.sqrt()
                } else {
                    0.0
                }
            }
            ResamplingStrategy::EnergyVariance { culling_fraction } => {
                if stats.var_after > 0.0 {
                    culling_fraction / stats.var_after.sqrt()
                } else {
                    0.0
                }
            }
            ResamplingStrategy::ConstantCulling { culling_fraction } => {
                let estimator = CullingEstimator::new(
                    &stats.shifted_after,
                    culling_fraction,
                    target_population,
                    scale_factor,
                );
                find_delta_beta(|delta_beta| estimator.evaluate(delta_beta))
            }
        }
    }
}
