use ndarray::{Array1, Array2, ArrayView2, Axis};
use tracing::{debug, warn};

use crate::{
    data::SurvivalData,
    error::{Result, SurvivalError},
    linalg::Cholesky,
    metrics::log_partial_likelihood,
};

/// Step below this (relative to |beta|) means we're at machine precision
const MACHINE_STEP: f64 = 1e-12;

/// Newton step size that still counts as "settled" once the gradient is tiny
const STEP_TOLERANCE: f64 = 1e-6;

/// Fisher information per standardized covariate can't legitimately get this small
const INFORMATION_FLOOR: f64 = 1e-8;

/// Configuration for Cox model optimization
#[derive(Debug, Clone)]
pub struct OptimizationConfig {
    pub l2_penalty: f64,          // ridge penalty on standardized coefficients
    pub max_iterations: usize,
    pub tolerance: f64,           // gradient norm
    pub max_step_halvings: usize,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            l2_penalty: 0.0,
            max_iterations: 50,
            tolerance: 1e-9,
            max_step_halvings: 30,
        }
    }
}

/// Log partial likelihood with first and second derivatives
#[derive(Debug, Clone)]
pub struct Derivatives {
    pub log_likelihood: f64,
    pub gradient: Array1<f64>,
    pub hessian: Array2<f64>,
}

/// What the optimizer hands back, on the caller's covariate scale
#[derive(Debug, Clone)]
pub struct OptimizationOutcome {
    pub coefficients: Array1<f64>,
    pub covariance: Array2<f64>,
    pub log_likelihood: f64,      // unpenalized, at the optimum
    pub null_log_likelihood: f64, // at beta = 0
    pub iterations: usize,
    pub gradient_norm: f64,
}

/// Newton-Raphson on the Efron partial likelihood
pub struct CoxOptimizer {
    config: OptimizationConfig,
}

impl CoxOptimizer {
    pub fn new(config: OptimizationConfig) -> Self {
        Self { config }
    }

    /// Fit coefficients; covariates are standardized internally and mapped back
    pub fn optimize(&self, data: &SurvivalData) -> Result<OptimizationOutcome> {
        let n_features = data.n_features();

        if data.n_samples() == 0 {
            return Err(SurvivalError::insufficient_data("no observations to fit"));
        }
        if n_features == 0 {
            return Err(SurvivalError::insufficient_data("no covariates to fit"));
        }
        if data.n_events() == 0 {
            return Err(SurvivalError::insufficient_data(
                "no observed events - every row is censored",
            ));
        }

        let (z, scales) = standardize(data)?;
        let mut beta = Array1::zeros(n_features);
        let mut current = self.penalized(efron_derivatives(z.view(), data, &beta)?, &beta);
        let null_log_likelihood = current.log_likelihood;

        for iteration in 0..self.config.max_iterations {
            let information = current.hessian.mapv(|h| -h);
            if let Some(j) = (0..n_features).find(|&j| !(information[[j, j]] > INFORMATION_FLOOR)) {
                warn!(iteration, covariate = %data.covariate_names()[j], "information vanished");
                return Err(SurvivalError::convergence(format!(
                    "information for '{}' vanished - it may perfectly separate the events",
                    data.covariate_names()[j]
                )));
            }
            let cholesky = Cholesky::factor(&information).map_err(|err| {
                warn!(iteration, %err, "information matrix broke down");
                err
            })?;
            let step = cholesky.solve(&current.gradient)?;

            let gradient_norm = current.gradient.dot(&current.gradient).sqrt();
            let step_max = max_abs(&step);

            debug!(
                iteration,
                log_likelihood = current.log_likelihood,
                gradient_norm,
                step_max,
                "newton iteration"
            );

            let settled = gradient_norm < self.config.tolerance && step_max < STEP_TOLERANCE;
            if settled || step_max <= MACHINE_STEP * (1.0 + max_abs(&beta)) {
                // current carries the ridge term; report the plain partial likelihood
                let log_likelihood = log_partial_likelihood(data, z.dot(&beta).view())?;
                let covariance_z = cholesky.inverse()?;
                return Ok(OptimizationOutcome {
                    coefficients: &beta / &scales,
                    covariance: unscale_covariance(&covariance_z, &scales),
                    log_likelihood,
                    null_log_likelihood,
                    iterations: iteration,
                    gradient_norm,
                });
            }

            let (next_beta, next) = self.line_search(z.view(), data, &beta, &step, &current)?;
            beta = next_beta;
            current = next;
        }

        warn!(
            max_iterations = self.config.max_iterations,
            "newton-raphson hit the iteration cap"
        );
        Err(SurvivalError::convergence(format!(
            "no convergence after {} iterations - a covariate may perfectly separate the events",
            self.config.max_iterations
        )))
    }

    /// Halve the newton step until the likelihood stops going down
    fn line_search(
        &self,
        z: ArrayView2<f64>,
        data: &SurvivalData,
        beta: &Array1<f64>,
        step: &Array1<f64>,
        current: &Derivatives,
    ) -> Result<(Array1<f64>, Derivatives)> {
        let slack = 1e-12 * (1.0 + current.log_likelihood.abs());
        let mut scale = 1.0;

        for halving in 0..=self.config.max_step_halvings {
            let candidate = beta + &(scale * step);

            match efron_derivatives(z, data, &candidate) {
                Ok(derivs) => {
                    let next = self.penalized(derivs, &candidate);
                    if next.log_likelihood.is_finite()
                        && next.log_likelihood >= current.log_likelihood - slack
                    {
                        if halving > 0 {
                            debug!(halving, scale, "step halved");
                        }
                        return Ok((candidate, next));
                    }
                }
                Err(SurvivalError::NumericOverflow { .. }) => {}
                Err(err) => return Err(err),
            }

            scale *= 0.5;
        }

        Err(SurvivalError::convergence(format!(
            "step halving failed after {} tries",
            self.config.max_step_halvings
        )))
    }

    /// Ridge: l - 0.5 * lambda * |beta|^2
    fn penalized(&self, mut derivs: Derivatives, beta: &Array1<f64>) -> Derivatives {
        let lambda = self.config.l2_penalty;
        if lambda > 0.0 {
            derivs.log_likelihood -= 0.5 * lambda * beta.dot(beta);
            derivs.gradient.scaled_add(-lambda, beta);
            for i in 0..beta.len() {
                derivs.hessian[[i, i]] -= lambda;
            }
        }
        derivs
    }
}

/// Center and scale each covariate; a constant column can't be fit
fn standardize(data: &SurvivalData) -> Result<(Array2<f64>, Array1<f64>)> {
    let x = data.covariates();
    let means = data.covariate_means();
    let scales = x.std_axis(Axis(0), 0.0);

    for (j, &s) in scales.iter().enumerate() {
        if !(s > 0.0) {
            return Err(SurvivalError::convergence(format!(
                "covariate '{}' has zero variance - its coefficient is not identifiable",
                data.covariate_names()[j]
            )));
        }
    }

    let z = (&x - &means) / &scales;
    Ok((z, scales))
}

/// Cov_x = D^-1 Cov_z D^-1, D = diag(scales)
fn unscale_covariance(covariance_z: &Array2<f64>, scales: &Array1<f64>) -> Array2<f64> {
    let mut covariance = covariance_z.clone();
    for ((i, j), v) in covariance.indexed_iter_mut() {
        *v /= scales[i] * scales[j];
    }
    covariance
}

fn max_abs(v: &Array1<f64>) -> f64 {
    v.iter().fold(0.0, |acc, x| acc.max(x.abs()))
}

/// Efron log partial likelihood, gradient and hessian at `beta` for covariates `x`.
///
/// At each distinct event time with d failures the denominator is averaged
/// over the tied failures: `sum_l ln(S0 - (l/d) * T0)` for l in 0..d, where S0
/// sums exp(eta) over the risk set and T0 over the failures. With no ties this
/// is the plain Cox product form.
pub fn efron_derivatives(
    x: ArrayView2<f64>,
    data: &SurvivalData,
    beta: &Array1<f64>,
) -> Result<Derivatives> {
    let n_features = x.ncols();
    if beta.len() != n_features {
        return Err(SurvivalError::invalid_dimensions(format!(
            "beta has {} entries, covariates have {}",
            beta.len(),
            n_features
        )));
    }

    let eta = x.dot(beta);
    let w = eta.mapv(f64::exp);
    if w.iter().any(|v| !v.is_finite()) {
        return Err(SurvivalError::numeric_overflow(
            "exp(linear predictor) overflowed during fitting",
        ));
    }

    let mut log_likelihood = 0.0;
    let mut gradient = Array1::zeros(n_features);
    let mut hessian = Array2::zeros((n_features, n_features));

    for group in data.event_groups() {
        let (s0, s1, s2) = weighted_moments(x, &w, &group.risk_set);
        let (t0, t1, t2) = weighted_moments(x, &w, &group.failures);
        let d = group.failures.len() as f64;

        for &i in &group.failures {
            log_likelihood += eta[i];
            gradient += &x.row(i);
        }

        for l in 0..group.failures.len() {
            let f = l as f64 / d;
            let phi = s0 - f * t0;
            if !(phi > 0.0) {
                return Err(SurvivalError::numeric_overflow(format!(
                    "risk set denominator at t = {} is {}",
                    group.time, phi
                )));
            }

            let psi1 = &s1 - &(f * &t1);
            let psi2 = &s2 - &(f * &t2);

            log_likelihood -= phi.ln();
            gradient.scaled_add(-1.0 / phi, &psi1);
            for a in 0..n_features {
                for b in 0..n_features {
                    hessian[[a, b]] -= psi2[[a, b]] / phi - psi1[a] * psi1[b] / (phi * phi);
                }
            }
        }
    }

    if !log_likelihood.is_finite() {
        return Err(SurvivalError::numeric_overflow("log partial likelihood is not finite"));
    }

    Ok(Derivatives {
        log_likelihood,
        gradient,
        hessian,
    })
}

/// sum w, sum w x, sum w x x^T over `rows`
fn weighted_moments(
    x: ArrayView2<f64>,
    w: &Array1<f64>,
    rows: &[usize],
) -> (f64, Array1<f64>, Array2<f64>) {
    let n_features = x.ncols();
    let mut s0 = 0.0;
    let mut s1 = Array1::zeros(n_features);
    let mut s2 = Array2::zeros((n_features, n_features));

    for &i in rows {
        let xi = x.row(i);
        let wi = w[i];
        s0 += wi;
        s1.scaled_add(wi, &xi);
        for a in 0..n_features {
            for b in 0..n_features {
                s2[[a, b]] += wi * xi[a] * xi[b];
            }
        }
    }

    (s0, s1, s2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn no_ties_data() -> SurvivalData {
        let times = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let events = vec![true; 5];
        let covariates = Array2::from_shape_vec((5, 1), vec![0.5, 1.5, 0.0, 2.0, 1.0]).unwrap();
        SurvivalData::new(times, events, covariates).unwrap()
    }

    fn tied_data() -> SurvivalData {
        let times = vec![1.0, 1.0, 2.0, 3.0, 4.0, 4.0, 5.0, 6.0];
        let events = vec![true, true, true, false, true, true, false, true];
        let covariates =
            Array2::from_shape_vec((8, 1), vec![0.0, 1.0, 1.0, 0.0, 1.0, 0.0, 0.0, 1.0]).unwrap();
        SurvivalData::new(times, events, covariates).unwrap()
    }

    #[test]
    fn test_no_ties_matches_product_form() {
        let data = no_ties_data();
        let optimizer = CoxOptimizer::new(OptimizationConfig::default());
        let outcome = optimizer.optimize(&data).unwrap();

        // root of the plain Cox score equation, found by bisection
        assert_relative_eq!(outcome.coefficients[0], -0.31783542018153466, epsilon = 1e-6);
        assert_relative_eq!(outcome.covariance[[0, 0]].sqrt(), 0.7171729825521891, epsilon = 1e-6);
        assert_relative_eq!(outcome.log_likelihood, -4.688331253701818, epsilon = 1e-8);
    }

    #[test]
    fn test_efron_ties() {
        let data = tied_data();
        let outcome = CoxOptimizer::new(OptimizationConfig::default())
            .optimize(&data)
            .unwrap();

        assert_relative_eq!(outcome.coefficients[0], 1.5f64.ln(), epsilon = 1e-6);
        assert_relative_eq!(outcome.covariance[[0, 0]].sqrt(), 0.9128709291752769, epsilon = 1e-6);
        assert_relative_eq!(outcome.log_likelihood, -8.20134024199776, epsilon = 1e-8);
        assert_relative_eq!(outcome.null_log_likelihood, -8.302017809751204, epsilon = 1e-8);
    }

    #[test]
    fn test_efron_log_likelihood_at_zero() {
        // beta = 0: each tie of size d contributes -sum_l ln(n - l)
        let data = tied_data();
        let x = data.covariates();
        let derivs = efron_derivatives(x, &data, &Array1::zeros(1)).unwrap();

        let expected = -((8.0f64).ln() + 7.0f64.ln())
            - 6.0f64.ln()
            - (4.0f64.ln() + 3.0f64.ln())
            - 1.0f64.ln();
        assert_relative_eq!(derivs.log_likelihood, expected, epsilon = 1e-12);
    }

    #[test]
    fn test_gradient_matches_finite_difference() {
        let data = tied_data();
        let x = data.covariates();
        let beta = Array1::from(vec![0.3]);
        let h = 1e-6;

        let derivs = efron_derivatives(x, &data, &beta).unwrap();
        let up = efron_derivatives(x, &data, &Array1::from(vec![0.3 + h])).unwrap();
        let down = efron_derivatives(x, &data, &Array1::from(vec![0.3 - h])).unwrap();

        let numeric_grad = (up.log_likelihood - down.log_likelihood) / (2.0 * h);
        let numeric_hess = (up.gradient[0] - down.gradient[0]) / (2.0 * h);
        assert_relative_eq!(derivs.gradient[0], numeric_grad, epsilon = 1e-6);
        assert_relative_eq!(derivs.hessian[[0, 0]], numeric_hess, epsilon = 1e-6);
    }

    #[test]
    fn test_ridge_shrinks_coefficients() {
        let data = tied_data();
        let plain = CoxOptimizer::new(OptimizationConfig::default())
            .optimize(&data)
            .unwrap();
        let ridge = CoxOptimizer::new(OptimizationConfig {
            l2_penalty: 1.0,
            ..Default::default()
        })
        .optimize(&data)
        .unwrap();

        assert!(ridge.coefficients[0].abs() < plain.coefficients[0].abs());
        assert!(ridge.coefficients[0] > 0.0);

        // reported likelihood is unpenalized, on the caller's scale
        let risk_scores = data.covariates().dot(&ridge.coefficients);
        let unpenalized = log_partial_likelihood(&data, risk_scores.view()).unwrap();
        assert_relative_eq!(ridge.log_likelihood, unpenalized, epsilon = 1e-10);
        assert!(ridge.log_likelihood < plain.log_likelihood);
    }

    #[test]
    fn test_constant_covariate_fails() {
        let covariates = Array2::from_shape_vec((3, 1), vec![1.0, 1.0, 1.0]).unwrap();
        let data = SurvivalData::new(vec![1.0, 2.0, 3.0], vec![true; 3], covariates).unwrap();
        let err = CoxOptimizer::new(OptimizationConfig::default())
            .optimize(&data)
            .unwrap_err();
        assert_eq!(err.kind(), "ConvergenceError");
    }

    #[test]
    fn test_collinear_covariates_fail() {
        let covariates = Array2::from_shape_vec(
            (4, 2),
            vec![1.0, 2.0, 2.0, 4.0, 3.0, 6.0, 0.5, 1.0],
        )
        .unwrap();
        let data =
            SurvivalData::new(vec![1.0, 2.0, 3.0, 4.0], vec![true; 4], covariates).unwrap();
        let err = CoxOptimizer::new(OptimizationConfig::default())
            .optimize(&data)
            .unwrap_err();
        assert_eq!(err.kind(), "ConvergenceError");
    }

    #[test]
    fn test_perfect_separation_fails() {
        // every x=1 fails before every x=0
        let covariates =
            Array2::from_shape_vec((6, 1), vec![1.0, 1.0, 1.0, 0.0, 0.0, 0.0]).unwrap();
        let data = SurvivalData::new(
            vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
            vec![true; 6],
            covariates,
        )
        .unwrap();
        let err = CoxOptimizer::new(OptimizationConfig::default())
            .optimize(&data)
            .unwrap_err();
        assert_eq!(err.kind(), "ConvergenceError");
    }

    #[test]
    fn test_no_events() {
        let covariates = Array2::from_shape_vec((2, 1), vec![1.0, 2.0]).unwrap();
        let data = SurvivalData::new(vec![1.0, 2.0], vec![false, false], covariates).unwrap();
        let err = CoxOptimizer::new(OptimizationConfig::default())
            .optimize(&data)
            .unwrap_err();
        assert_eq!(err.kind(), "InsufficientData");
    }
}
