use std::collections::BTreeMap;

use ndarray::{Array1, Array2, ArrayView1};
use tracing::{info, warn};

use crate::{
    curve::CumulativeHazard,
    data::{Dataset, SurvivalData},
    error::{Result, SurvivalError},
    metrics::harrell_c_index,
    optimization::{CoxOptimizer, OptimizationConfig},
    predict::{CovariateEncoding, CovariateSchema, DEFAULT_MAX_CATEGORICAL_LEVELS},
};

/// how tied event times are handled in the partial likelihood
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TieMethod {
    Efron,
}

/// cox proportional hazards fitter - configure, then `fit` once per session
#[derive(Debug, Clone)]
pub struct CoxModel {
    penalizer: f64,                // ridge penalty (0 = plain cox)
    max_iterations: usize,         // newton-raphson cap
    tolerance: f64,                // gradient norm for convergence
    max_categorical_levels: usize, // schema inference
    encodings: BTreeMap<String, CovariateEncoding>,
}

impl Default for CoxModel {
    fn default() -> Self {
        let defaults = OptimizationConfig::default();
        Self {
            penalizer: defaults.l2_penalty,
            max_iterations: defaults.max_iterations,
            tolerance: defaults.tolerance,
            max_categorical_levels: DEFAULT_MAX_CATEGORICAL_LEVELS,
            encodings: BTreeMap::new(),
        }
    }
}

impl CoxModel {
    /// new cox model w/ defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// ridge penalty on standardized coefficients - shrinks, and tames separation
    pub fn with_penalizer(mut self, penalty: f64) -> Self {
        self.penalizer = penalty.max(0.0);
        self
    }

    /// max newton iterations before giving up
    pub fn with_max_iterations(mut self, max_iter: usize) -> Self {
        self.max_iterations = max_iter;
        self
    }

    /// gradient norm that counts as converged
    pub fn with_tolerance(mut self, tol: f64) -> Self {
        self.tolerance = tol;
        self
    }

    /// integer columns with up to this many distinct codes become categorical
    pub fn with_max_categorical_levels(mut self, levels: usize) -> Self {
        self.max_categorical_levels = levels;
        self
    }

    /// declared covariate encodings; anything not listed is inferred
    pub fn with_encodings(mut self, encodings: BTreeMap<String, CovariateEncoding>) -> Self {
        self.encodings = encodings;
        self
    }

    pub fn penalizer(&self) -> f64 {
        self.penalizer
    }

    /// fit on a loaded table; every column besides duration/event is a covariate
    pub fn fit(&self, dataset: &Dataset, duration_col: &str, event_col: &str) -> Result<FittedModel> {
        let data = SurvivalData::from_dataset(dataset, duration_col, event_col)?;
        self.fit_data(&data)
    }

    /// fit on prepared survival data - this does the actual work
    pub fn fit_data(&self, data: &SurvivalData) -> Result<FittedModel> {
        if !(self.tolerance > 0.0) || self.max_iterations == 0 {
            return Err(SurvivalError::config(format!(
                "tolerance must be > 0 and max_iterations >= 1 (got {}, {})",
                self.tolerance, self.max_iterations
            )));
        }

        info!(
            n_samples = data.n_samples(),
            n_events = data.n_events(),
            n_covariates = data.n_features(),
            penalizer = self.penalizer,
            "fitting cox model"
        );

        let schema = CovariateSchema::infer(data, self.max_categorical_levels, &self.encodings)?;

        let optimizer = CoxOptimizer::new(OptimizationConfig {
            l2_penalty: self.penalizer,
            max_iterations: self.max_iterations,
            tolerance: self.tolerance,
            ..OptimizationConfig::default()
        });

        let outcome = optimizer.optimize(data).map_err(|err| {
            warn!(kind = err.kind(), %err, "cox fit failed");
            err
        })?;

        let baseline = breslow_baseline(data, &outcome.coefficients)?;
        let standard_errors = outcome.covariance.diag().mapv(f64::sqrt);
        let risk_scores = data.covariates().dot(&outcome.coefficients);
        let concordance = harrell_c_index(risk_scores.view(), data.times(), data.events()).ok();

        info!(
            iterations = outcome.iterations,
            log_likelihood = outcome.log_likelihood,
            "cox model converged"
        );

        Ok(FittedModel {
            coefficients: outcome.coefficients,
            standard_errors,
            covariance: outcome.covariance,
            baseline,
            schema,
            covariate_names: data.covariate_names().to_vec(),
            means: data.covariate_means(),
            log_likelihood: outcome.log_likelihood,
            null_log_likelihood: outcome.null_log_likelihood,
            concordance,
            iterations: outcome.iterations,
            n_samples: data.n_samples(),
            n_events: data.n_events(),
            penalizer: self.penalizer,
            tie_method: TieMethod::Efron,
        })
    }
}

/// breslow baseline at x = 0: dH0(t) = d(t) / sum_{risk set} exp(beta . x)
///
/// exp(beta . x) is split as exp(beta . (x - m)) * exp(beta . m) so large
/// uncentred covariates don't overflow the risk-set sum.
fn breslow_baseline(data: &SurvivalData, beta: &Array1<f64>) -> Result<CumulativeHazard> {
    let means = data.covariate_means();
    let centred = &data.covariates() - &means;
    let w = centred.dot(beta).mapv(f64::exp);
    let offset = (-means.dot(beta)).exp();

    CumulativeHazard::from_increments(data.event_groups().iter().map(|group| {
        let risk_sum: f64 = group.risk_set.iter().map(|&i| w[i]).sum();
        (group.time, group.failures.len() as f64 * offset / risk_sum)
    }))
}

/// a fitted cox model - read-only, share it by reference
#[derive(Debug, Clone)]
pub struct FittedModel {
    coefficients: Array1<f64>,
    standard_errors: Array1<f64>,
    covariance: Array2<f64>,
    baseline: CumulativeHazard,
    schema: CovariateSchema,
    covariate_names: Vec<String>,
    means: Array1<f64>,
    log_likelihood: f64,
    null_log_likelihood: f64,
    concordance: Option<f64>,
    iterations: usize,
    n_samples: usize,
    n_events: usize,
    penalizer: f64,
    tie_method: TieMethod,
}

impl FittedModel {
    /// the betas, in covariate order
    pub fn coefficients(&self) -> ArrayView1<'_, f64> {
        self.coefficients.view()
    }

    pub fn standard_errors(&self) -> ArrayView1<'_, f64> {
        self.standard_errors.view()
    }

    /// inverse observed information
    pub fn covariance(&self) -> &Array2<f64> {
        &self.covariance
    }

    /// exp(beta) per covariate
    pub fn hazard_ratios(&self) -> Array1<f64> {
        self.coefficients.mapv(f64::exp)
    }

    /// H0(t) for the all-zero covariate vector
    pub fn baseline_cumulative_hazard(&self) -> &CumulativeHazard {
        &self.baseline
    }

    pub fn schema(&self) -> &CovariateSchema {
        &self.schema
    }

    pub fn covariate_names(&self) -> &[String] {
        &self.covariate_names
    }

    /// training covariate means
    pub fn means(&self) -> ArrayView1<'_, f64> {
        self.means.view()
    }

    /// unpenalized log partial likelihood at the fitted betas
    pub fn log_likelihood(&self) -> f64 {
        self.log_likelihood
    }

    /// log partial likelihood at beta = 0
    pub fn null_log_likelihood(&self) -> f64 {
        self.null_log_likelihood
    }

    /// harrell's c on the training data (none if no pair was comparable)
    pub fn concordance(&self) -> Option<f64> {
        self.concordance
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    pub fn n_events(&self) -> usize {
        self.n_events
    }

    pub fn penalizer(&self) -> f64 {
        self.penalizer
    }

    pub fn tie_method(&self) -> TieMethod {
        self.tie_method
    }

    /// beta . x for a vector already in covariate order
    pub fn log_partial_hazard_of(&self, x: ArrayView1<f64>) -> Result<f64> {
        if x.len() != self.coefficients.len() {
            return Err(SurvivalError::schema_mismatch(format!(
                "expected {} covariates, got {}",
                self.coefficients.len(),
                x.len()
            )));
        }

        let eta = x.dot(&self.coefficients);
        if !eta.is_finite() {
            return Err(SurvivalError::numeric_overflow(format!(
                "linear predictor is {}",
                eta
            )));
        }
        Ok(eta)
    }

    /// exp(beta . x) - errors instead of returning inf
    pub fn relative_hazard_of(&self, x: ArrayView1<f64>) -> Result<f64> {
        let eta = self.log_partial_hazard_of(x)?;
        let hazard = eta.exp();
        if !hazard.is_finite() {
            return Err(SurvivalError::numeric_overflow(format!(
                "exp({}) overflows - covariates are too extreme",
                eta
            )));
        }
        Ok(hazard)
    }
}
