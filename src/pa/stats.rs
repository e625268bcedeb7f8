//! Population statistics gathered around the sweep phase.

/// Moments of the replica costs before and after one step's sweeps.
///
/// All sums are accumulated serially in population order, so the result
/// does not depend on how sweeps were scheduled across threads.
#[derive(Debug, Clone, Default)]
pub struct StepStatistics {
    pub mean_before: f64,
    pub mean_after: f64,
    pub var_before: f64,
    pub var_after: f64,
    /// Covariance between the before and after costs.
    pub gamma: f64,
    /// `sqrt(var_before * var_after)`.
    pub sigma: f64,
    /// Relaxation time estimate, when defined.
    pub tau: Option<f64>,
    /// Friction tensor estimate `sigma * tau`; 0 when `tau` is undefined.
    pub zeta: f64,
    /// Minimum cost after the sweep.
    pub min_after: f64,
    /// Costs after the sweep shifted by `min_after`, hence `>= 0`.
    pub shifted_after: Vec<f64>,
}

impl StepStatistics {
    /// Computes the statistics. `before` and `after` are indexed by
    /// population position and must have the same length.
    pub fn compute(before: &[f64], mut after: Vec<f64>, sweeps: usize) -> Self {
        debug_assert_eq!(before.len(), after.len());
        let n = after.len();
        if n == 0 {
            return Self::default();
        }
        let rd = n as f64;

        let mean_before = before.iter().sum::<f64>() / rd;
        let mean_after = after.iter().sum::<f64>() / rd;
        let min_after = after.iter().copied().fold(f64::INFINITY, f64::min);

        let mut var_before = 0.0;
        let mut var_after = 0.0;
        let mut gamma = 0.0;
        for (b, a) in before.iter().zip(&after) {
            let db = b - mean_before;
            let da = a - mean_after;
            var_before += db * db;
            var_after += da * da;
            gamma += db * da;
        }
        var_before /= rd;
        var_after /= rd;
        gamma /= rd;

        let sigma = (var_before * var_after).sqrt();
        let mut tau = None;
        let mut zeta = 0.0;
        if sigma > 0.0 && gamma != 0.0 {
            let delta = sigma.ln() - gamma.abs().ln();
            if delta.abs() > 1e-11 {
                let t = sweeps as f64 / delta;
                tau = Some(t);
                zeta = sigma * t;
            }
        }

        for cost in after.iter_mut() {
            *cost -= min_after;
        }

        Self {
            mean_before,
            mean_after,
            var_before,
            var_after,
            gamma,
            sigma,
            tau,
            zeta,
            min_after,
            shifted_after: after,
        }
    }
}
