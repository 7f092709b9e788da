//! hazard-ratio table for a fitted model, formatted the way the dashboard
//! showed it (three decimals)

use std::fmt;

use statrs::distribution::{ContinuousCDF, Normal};

use crate::{
    error::{Result, SurvivalError},
    metrics::{likelihood_ratio_test, partial_aic, LikelihoodRatioTest},
    model::FittedModel,
};

/// one covariate's line in the summary
#[derive(Debug, Clone, PartialEq)]
pub struct CoefficientRow {
    pub name: String,
    pub coef: f64,
    pub exp_coef: f64,
    pub se: f64,
    pub coef_lower: f64,
    pub coef_upper: f64,
    pub exp_coef_lower: f64,
    pub exp_coef_upper: f64,
    pub z: f64,
    pub p: f64,
}

/// what the model learned + how well it fits
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSummary {
    pub rows: Vec<CoefficientRow>,
    pub alpha: f64,
    pub n_samples: usize,
    pub n_events: usize,
    pub log_likelihood: f64,
    pub partial_aic: f64,
    pub concordance: Option<f64>,
    pub likelihood_ratio: LikelihoodRatioTest,
    pub penalizer: f64,
}

impl ModelSummary {
    /// wald statistics with (1 - alpha) intervals
    pub fn from_model(model: &FittedModel, alpha: f64) -> Result<Self> {
        if !(alpha > 0.0 && alpha < 1.0) {
            return Err(SurvivalError::config(format!("alpha must be in (0, 1), got {}", alpha)));
        }

        let normal = Normal::new(0.0, 1.0)
            .map_err(|e| SurvivalError::invalid_data(format!("standard normal: {}", e)))?;
        let z_crit = normal.inverse_cdf(1.0 - alpha / 2.0);

        let rows = model
            .covariate_names()
            .iter()
            .zip(model.coefficients().iter().zip(model.standard_errors().iter()))
            .map(|(name, (&coef, &se))| {
                let z = coef / se;
                let coef_lower = coef - z_crit * se;
                let coef_upper = coef + z_crit * se;
                CoefficientRow {
                    name: name.clone(),
                    coef,
                    exp_coef: coef.exp(),
                    se,
                    coef_lower,
                    coef_upper,
                    exp_coef_lower: coef_lower.exp(),
                    exp_coef_upper: coef_upper.exp(),
                    z,
                    p: 2.0 * normal.sf(z.abs()),
                }
            })
            .collect();

        let n_parameters = model.coefficients().len();

        Ok(Self {
            rows,
            alpha,
            n_samples: model.n_samples(),
            n_events: model.n_events(),
            log_likelihood: model.log_likelihood(),
            partial_aic: partial_aic(model.log_likelihood(), n_parameters),
            concordance: model.concordance(),
            likelihood_ratio: likelihood_ratio_test(
                model.log_likelihood(),
                model.null_log_likelihood(),
                n_parameters,
            )?,
            penalizer: model.penalizer(),
        })
    }

    pub fn row(&self, name: &str) -> Option<&CoefficientRow> {
        self.rows.iter().find(|r| r.name == name)
    }
}

impl fmt::Display for ModelSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = ((1.0 - self.alpha) * 100.0).round();

        writeln!(f, "cox proportional hazards model (efron ties)")?;
        writeln!(
            f,
            "observations: {}   events: {}   penalizer: {}",
            self.n_samples, self.n_events, self.penalizer
        )?;
        writeln!(f)?;
        writeln!(
            f,
            "{:<14} {:>8} {:>10} {:>9} {:>10} {:>10} {:>10} {:>10} {:>8} {:>7}",
            "covariate",
            "coef",
            "exp(coef)",
            "se(coef)",
            format!("lower {}%", level),
            format!("upper {}%", level),
            "exp lower",
            "exp upper",
            "z",
            "p"
        )?;
        writeln!(f, "{:-<104}", "")?;

        for r in &self.rows {
            writeln!(
                f,
                "{:<14} {:>8.3} {:>10.3} {:>9.3} {:>10.3} {:>10.3} {:>10.3} {:>10.3} {:>8.3} {:>7.3}",
                r.name,
                r.coef,
                r.exp_coef,
                r.se,
                r.coef_lower,
                r.coef_upper,
                r.exp_coef_lower,
                r.exp_coef_upper,
                r.z,
                r.p
            )?;
        }

        writeln!(f)?;
        match self.concordance {
            Some(c) => writeln!(f, "concordance: {:.3}", c)?,
            None => writeln!(f, "concordance: n/a")?,
        }
        writeln!(f, "partial log-likelihood: {:.3}", self.log_likelihood)?;
        writeln!(f, "partial AIC: {:.3}", self.partial_aic)?;
        write!(
            f,
            "log-likelihood ratio test: {:.3} on {} df, p = {:.3}",
            self.likelihood_ratio.statistic,
            self.likelihood_ratio.degrees_of_freedom,
            self.likelihood_ratio.p_value
        )
    }
}
