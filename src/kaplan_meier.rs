//! kaplan-meier product-limit estimator
//!
//! at each distinct event time `S *= 1 - d/n` where `n` counts everyone whose
//! duration is >= t. censored rows shrink later risk sets but never cause a
//! drop themselves.

use std::collections::BTreeMap;

use statrs::distribution::{ContinuousCDF, Normal};
use tracing::debug;

use crate::{
    curve::SurvivalCurve,
    data::SurvivalData,
    error::{Result, SurvivalError},
};

/// one row of the life table at a distinct event time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EventTableRow {
    pub time: f64,
    pub at_risk: usize,
    pub observed: usize,
    pub censored: usize,
}

/// pointwise confidence band, one (lower, upper) per curve step
#[derive(Debug, Clone, PartialEq)]
pub struct ConfidenceBand {
    pub level: f64,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

/// curve + the table and band it came from
#[derive(Debug, Clone, PartialEq)]
pub struct KaplanMeierFit {
    pub curve: SurvivalCurve,
    pub event_table: Vec<EventTableRow>,
    pub confidence: ConfidenceBand,
    pub n_samples: usize,
}

impl KaplanMeierFit {
    pub fn median(&self) -> Option<f64> {
        self.curve.median()
    }

    /// (lower, upper) band in force at time t
    pub fn confidence_at(&self, t: f64) -> (f64, f64) {
        let idx = self.curve.times().partition_point(|&x| x <= t);
        if idx == 0 {
            (1.0, 1.0)
        } else {
            (self.confidence.lower[idx - 1], self.confidence.upper[idx - 1])
        }
    }
}

#[derive(Debug, Clone)]
pub struct KaplanMeier {
    alpha: f64, // 1 - confidence level
}

impl Default for KaplanMeier {
    fn default() -> Self {
        Self { alpha: 0.05 }
    }
}

impl KaplanMeier {
    pub fn new() -> Self {
        Self::default()
    }

    /// confidence band at level 1 - alpha
    pub fn with_alpha(mut self, alpha: f64) -> Result<Self> {
        if !(alpha > 0.0 && alpha < 1.0) {
            return Err(SurvivalError::config(format!("alpha must be in (0, 1), got {}", alpha)));
        }
        self.alpha = alpha;
        Ok(self)
    }

    /// just the curve
    pub fn estimate(&self, data: &SurvivalData) -> Result<SurvivalCurve> {
        Ok(self.fit(data)?.curve)
    }

    pub fn fit(&self, data: &SurvivalData) -> Result<KaplanMeierFit> {
        if data.n_samples() == 0 {
            return Err(SurvivalError::insufficient_data(
                "kaplan-meier needs at least one observation",
            ));
        }

        let z = z_score(self.alpha)?;

        let mut survival = 1.0;
        let mut greenwood = 0.0; // sum d / (n (n - d))
        let mut steps = Vec::with_capacity(data.event_groups().len());
        let mut lower = vec![1.0];
        let mut upper = vec![1.0];
        let mut event_table = Vec::with_capacity(data.event_groups().len());

        for group in data.event_groups() {
            let n = group.risk_set.len();
            let d = group.failures.len();

            survival *= 1.0 - d as f64 / n as f64;
            if d < n {
                greenwood += d as f64 / (n as f64 * (n - d) as f64);
            }

            let (lo, hi) = log_log_interval(survival, greenwood, z);
            steps.push((group.time, survival));
            lower.push(lo);
            upper.push(hi);

            event_table.push(EventTableRow {
                time: group.time,
                at_risk: n,
                observed: d,
                censored: group.censored,
            });
        }

        debug!(
            n_samples = data.n_samples(),
            n_event_times = event_table.len(),
            final_survival = survival,
            "kaplan-meier fit"
        );

        Ok(KaplanMeierFit {
            curve: SurvivalCurve::from_steps(steps)?,
            event_table,
            confidence: ConfidenceBand {
                level: 1.0 - self.alpha,
                lower,
                upper,
            },
            n_samples: data.n_samples(),
        })
    }

    /// one fit per integer code of `group_column`
    pub fn fit_groups(
        &self,
        data: &SurvivalData,
        group_column: &str,
    ) -> Result<BTreeMap<i64, KaplanMeierFit>> {
        let groups = data.group_indices(group_column)?;
        if groups.is_empty() {
            return Err(SurvivalError::insufficient_data(format!(
                "no rows to group by '{}'",
                group_column
            )));
        }

        let mut fits = BTreeMap::new();
        for (code, rows) in groups {
            fits.insert(code, self.fit(&data.subset(&rows)?)?);
        }
        Ok(fits)
    }
}

/// survival curve per group value, e.g. chemo = 0 vs chemo = 1
pub fn kaplan_meier(
    data: &SurvivalData,
    group_column: &str,
) -> Result<BTreeMap<i64, SurvivalCurve>> {
    Ok(KaplanMeier::new()
        .fit_groups(data, group_column)?
        .into_iter()
        .map(|(code, fit)| (code, fit.curve))
        .collect())
}

fn z_score(alpha: f64) -> Result<f64> {
    let normal = Normal::new(0.0, 1.0)
        .map_err(|e| SurvivalError::invalid_data(format!("standard normal: {}", e)))?;
    Ok(normal.inverse_cdf(1.0 - alpha / 2.0))
}

/// exponential greenwood band: S^exp(+-z * sqrt(v)), v = greenwood / ln(S)^2
fn log_log_interval(survival: f64, greenwood: f64, z: f64) -> (f64, f64) {
    if survival <= 0.0 {
        return (0.0, 0.0);
    }
    if survival >= 1.0 {
        return (1.0, 1.0);
    }

    let log_s = survival.ln();
    let se = (greenwood / (log_s * log_s)).sqrt();
    let lower = survival.powf((z * se).exp());
    let upper = survival.powf((-z * se).exp());
    (lower, upper)
}
