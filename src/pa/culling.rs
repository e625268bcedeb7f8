//! Expected culling fraction and the bracketing search over `delta_beta`.

/// Estimates how far the fraction of replicas that would die under a
/// trial increment `delta_beta` is from a target culling fraction.
///
/// Costs must already be shifted to be non-negative.
#[derive(Debug, Clone, Copy)]
pub struct CullingEstimator<'a> {
    costs: &'a [f64],
    epsilon0: f64,
    target_population: usize,
    scale_factor: f64,
}

impl<'a> CullingEstimator<'a> {
    pub fn new(costs: &'a [f64], epsilon0: f64, target_population: usize, scale_factor: f64) -> Self {
        Self {
            costs,
            epsilon0,
            target_population,
            scale_factor,
        }
    }

    /// `(1/R) * sum(max(0, 1 - w_i * target / Q)) - epsilon0`, with
    /// `w_i = exp(-delta_beta * cost_i * scale)` and `Q = sum(w_i)`.
    pub fn evaluate(&self, delta_beta: f64) -> f64 {
        if self.costs.is_empty() {
            return -self.epsilon0;
        }
        let weight = |c: f64| (-delta_beta * c * self.scale_factor).exp();
        let q: f64 = self.costs.iter().map(|&c| weight(c)).sum();
        let rrq = self.target_population as f64 / q;
        let culled: f64 = self
            .costs
            .iter()
            .map(|&c| (1.0 - weight(c) * rrq).max(0.0))
            .sum();
        culled / self.costs.len() as f64 - self.epsilon0
    }
}

/// Finds the largest `delta_beta` on the estimator's starting side of
/// its zero crossing.
///
/// First the upper bound grows by powers of two (`2^-20` to `2^19`) until
/// the sign flips relative to `estimator(0)`. The bracket is then
/// refined by adding decreasing powers of two down to `2^-20`, keeping
/// each candidate whose sign still matches the lower bound.
///
/// This assumes a single sign change in the explored range. With
/// several roots the result is whichever one the search lands on.
pub fn find_delta_beta<F>(estimator: F) -> f64
where
    F: Fn(f64) -> f64,
{
    let mut lower = 0.0;
    let mut lower_negative = estimator(0.0) < 0.0;

    let mut e = -20;
    while e < 20 {
        let upper = 2f64.powi(e);
        let negative = estimator(upper) < 0.0;
        if negative != lower_negative {
            break;
        }
        lower = upper;
        lower_negative = negative;
        e += 1;
    }

    e -= 2;
    while e >= -20 {
        let upper = lower + 2f64.powi(e);
        let negative = estimator(upper) < 0.0;
        if negative == lower_negative {
            lower = upper;
            lower_negative = negative;
        }
        e -= 1;
    }
    lower
}

#[cfg(test)]
mod tests {
    use super::*;

    fn costs() -> Vec<f64> {
        (0..64).map(|i| (i % 8) as f64).collect()
    }

    #[test]
    fn test_zero_increment_culls_nothing() {
        let costs = costs();
        let estimator = CullingEstimator::new(&costs, 0.1, costs.len(), 1.0);
        assert!((estimator.evaluate(0.0) + 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_monotone_over_bracket() {
        let costs = costs();
        let estimator = CullingEstimator::new(&costs, 0.1, costs.len(), 1.0);
        let at_zero = estimator.evaluate(0.0);
        let mut previous = at_zero;
        for e in -20..20 {
            let value = estimator.evaluate(2f64.powi(e));
            assert!(at_zero <= value + 1e-12, "e = {e}");
            assert!(previous <= value + 1e-12, "e = {e}");
            previous = value;
        }
    }

    #[test]
    fn test_find_delta_beta_hits_target_fraction() {
        let costs = costs();
        let estimator = CullingEstimator::new(&costs, 0.1, costs.len(), 1.0);
        let delta_beta = find_delta_beta(|db| estimator.evaluate(db));
        assert!(delta_beta > 0.0);
        assert!(estimator.evaluate(delta_beta) < 0.0);
        assert!(estimator.evaluate(delta_beta + 2f64.powi(-19)) >= 0.0);
    }

    #[test]
    fn test_find_delta_beta_for_linear_function() {
        let root = 3.3;
        let found = find_delta_beta(|x| x - root);
        assert!((found - root).abs() < 2e-6, "found {found}");
    }

    #[test]
    fn test_scale_factor_rescales_root() {
        let costs = costs();
        let plain = CullingEstimator::new(&costs, 0.1, costs.len(), 1.0);
        let doubled = CullingEstimator::new(&costs, 0.1, costs.len(), 2.0);
        let a = find_delta_beta(|db| plain.evaluate(db));
        let b = find_delta_beta(|db| doubled.evaluate(db));
        assert!((a - 2.0 * b).abs() < 1e-5, "{a} vs {b}");
    }

    #[test]
    fn test_equal_costs_never_cull() {
        let costs = vec![0.0; 16];
        let estimator = CullingEstimator::new(&costs, 0.1, 16, 1.0);
        // Sign never changes, so the search runs to the top of the range.
        let found = find_delta_beta(|db| estimator.evaluate(db));
        assert!(found > 1.0);
    }
}
