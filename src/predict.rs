//! prediction for a single hypothetical patient
//!
//! requests are validated against the covariate schema the model was fit
//! with before anything is computed - a missing, unknown or out-of-level
//! covariate is a [`SurvivalError::SchemaMismatch`], never imputed.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    curve::SurvivalCurve,
    data::{integer_code, SurvivalData},
    error::{PredictionError, Result, SurvivalError},
    model::FittedModel,
};

/// integer-coded columns with at most this many levels are treated as categories
pub const DEFAULT_MAX_CATEGORICAL_LEVELS: usize = 8;

/// category codes are small non-negative integers (grade 1-3, histtype 1-7, ...)
const MAX_CATEGORY_CODE: i64 = 9;

/// declared encoding of a covariate column
///
/// in toml: `grade = { kind = "categorical", levels = [1, 2, 3] }`. an empty
/// `levels` list means "whatever codes the training data has".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CovariateEncoding {
    Binary,
    Categorical {
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        levels: Vec<i64>,
    },
    Numeric,
}

/// what values a covariate accepts
#[derive(Debug, Clone, PartialEq)]
pub enum CovariateKind {
    /// 0 / 1 indicator
    Binary,
    /// integer codes; nothing else is accepted
    Categorical { levels: Vec<i64> },
    /// any finite value; range is what training covered
    Continuous { min: f64, max: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CovariateSpec {
    pub name: String,
    pub kind: CovariateKind,
}

/// ordered covariates a fitted model expects
#[derive(Debug, Clone, PartialEq)]
pub struct CovariateSchema {
    covariates: Vec<CovariateSpec>,
}

impl CovariateSchema {
    /// declared encodings win; undeclared columns are inferred from training
    pub fn infer(
        data: &SurvivalData,
        max_categorical_levels: usize,
        encodings: &BTreeMap<String, CovariateEncoding>,
    ) -> Result<Self> {
        let covariates = data
            .covariate_names()
            .iter()
            .enumerate()
            .map(|(j, name)| -> Result<CovariateSpec> {
                let column = data.covariates().column(j).to_vec();
                let kind = match encodings.get(name) {
                    Some(encoding) => declared_kind(name, &column, encoding)?,
                    None => infer_kind(&column, max_categorical_levels),
                };
                debug!(covariate = %name, ?kind, "covariate kind");
                Ok(CovariateSpec {
                    name: name.clone(),
                    kind,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { covariates })
    }

    pub fn len(&self) -> usize {
        self.covariates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.covariates.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.covariates.iter().map(|c| c.name.as_str())
    }

    pub fn covariates(&self) -> &[CovariateSpec] {
        &self.covariates
    }

    pub fn get(&self, name: &str) -> Option<&CovariateSpec> {
        self.covariates.iter().find(|c| c.name == name)
    }

    /// check a request and return its values in schema order
    ///
    /// the all-zero vector is the reference patient the baseline hazard is
    /// reported at, so it is always accepted even when 0 is not a level.
    pub fn validate(&self, request: &PredictionRequest) -> Result<Array1<f64>> {
        let expected: BTreeSet<&str> = self.names().collect();
        if let Some(unknown) = request.names().find(|n| !expected.contains(n)) {
            return Err(SurvivalError::schema_mismatch(format!(
                "unknown covariate '{}'",
                unknown
            )));
        }

        let reference = self.names().all(|n| request.get(n) == Some(0.0));

        let mut values = Array1::zeros(self.len());
        for (j, spec) in self.covariates.iter().enumerate() {
            let value = request.get(&spec.name).ok_or_else(|| {
                SurvivalError::schema_mismatch(format!("missing covariate '{}'", spec.name))
            })?;

            if !value.is_finite() {
                return Err(SurvivalError::schema_mismatch(format!(
                    "'{}' must be finite, got {}",
                    spec.name, value
                )));
            }

            match &spec.kind {
                CovariateKind::Binary => {
                    if value != 0.0 && value != 1.0 {
                        return Err(SurvivalError::schema_mismatch(format!(
                            "'{}' is binary (0/1), got {}",
                            spec.name, value
                        )));
                    }
                }
                CovariateKind::Categorical { levels } if !reference => {
                    if !integer_code(value).is_some_and(|code| levels.contains(&code)) {
                        return Err(SurvivalError::schema_mismatch(format!(
                            "'{}' must be one of {:?}, got {}",
                            spec.name, levels, value
                        )));
                    }
                }
                CovariateKind::Continuous { min, max } if !reference => {
                    if value < *min || value > *max {
                        warn!(
                            covariate = %spec.name,
                            value,
                            min,
                            max,
                            "extrapolating outside the training range"
                        );
                    }
                }
                _ => {}
            }

            values[j] = value;
        }

        Ok(values)
    }
}

/// kind for a declared encoding; the training column has to agree with it
fn declared_kind(
    name: &str,
    column: &[f64],
    encoding: &CovariateEncoding,
) -> Result<CovariateKind> {
    match encoding {
        CovariateEncoding::Binary => {
            if let Some(v) = column.iter().find(|&&v| v != 0.0 && v != 1.0) {
                return Err(SurvivalError::schema_mismatch(format!(
                    "'{}' is declared binary but has value {}",
                    name, v
                )));
            }
            Ok(CovariateKind::Binary)
        }
        CovariateEncoding::Categorical { levels } => {
            let mut seen = BTreeSet::new();
            for &v in column {
                let code = integer_code(v).ok_or_else(|| {
                    SurvivalError::schema_mismatch(format!(
                        "'{}' is declared categorical but has value {}",
                        name, v
                    ))
                })?;
                if !levels.is_empty() && !levels.contains(&code) {
                    return Err(SurvivalError::schema_mismatch(format!(
                        "'{}' must be one of {:?}, training data has {}",
                        name, levels, v
                    )));
                }
                seen.insert(code);
            }

            let levels = if levels.is_empty() {
                seen.into_iter().collect()
            } else {
                let declared: BTreeSet<i64> = levels.iter().copied().collect();
                declared.into_iter().collect()
            };
            Ok(CovariateKind::Categorical { levels })
        }
        CovariateEncoding::Numeric => Ok(continuous(column)),
    }
}

fn infer_kind(column: &[f64], max_categorical_levels: usize) -> CovariateKind {
    if column.iter().all(|&v| v == 0.0 || v == 1.0) {
        return CovariateKind::Binary;
    }

    let codes: Option<BTreeSet<i64>> = column
        .iter()
        .map(|&v| integer_code(v).filter(|c| (0..=MAX_CATEGORY_CODE).contains(c)))
        .collect();
    if let Some(levels) = codes {
        if levels.len() <= max_categorical_levels {
            return CovariateKind::Categorical {
                levels: levels.into_iter().collect(),
            };
        }
    }

    continuous(column)
}

fn continuous(column: &[f64]) -> CovariateKind {
    let min = column.iter().copied().fold(f64::INFINITY, f64::min);
    let max = column.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    CovariateKind::Continuous { min, max }
}

/// covariate values for one patient, keyed by name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PredictionRequest {
    values: BTreeMap<String, f64>,
}

impl PredictionRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: f64) -> Self {
        self.values.insert(name.into(), value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: f64) -> Option<f64> {
        self.values.insert(name.into(), value)
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// one training row as a request
    pub fn from_row(data: &SurvivalData, row: usize) -> Result<Self> {
        if row >= data.n_samples() {
            return Err(SurvivalError::invalid_dimensions(format!(
                "row {} out of range ({} rows)",
                row,
                data.n_samples()
            )));
        }

        let values = data
            .covariate_names()
            .iter()
            .cloned()
            .zip(data.covariates().row(row).iter().copied())
            .collect();
        Ok(Self { values })
    }
}

impl<S: Into<String>> FromIterator<(S, f64)> for PredictionRequest {
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// a single `name=value` assignment, as typed on the command line
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub name: String,
    pub value: f64,
}

impl FromStr for Assignment {
    type Err = SurvivalError;

    fn from_str(s: &str) -> Result<Self> {
        let (name, value) = s.split_once('=').ok_or_else(|| {
            SurvivalError::schema_mismatch(format!("expected name=value, got '{}'", s))
        })?;
        let name = name.trim();
        if name.is_empty() {
            return Err(SurvivalError::schema_mismatch(format!("empty covariate name in '{}'", s)));
        }
        let value = value.trim().parse::<f64>().map_err(|_| {
            SurvivalError::schema_mismatch(format!("'{}' is not a number for '{}'", value, name))
        })?;
        Ok(Self {
            name: name.to_string(),
            value,
        })
    }
}

/// relative hazard and survival curve for one patient
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub log_partial_hazard: f64, // beta . x
    pub relative_hazard: f64,    // exp(beta . x), vs the all-zero patient
    pub survival_curve: SurvivalCurve,
}

impl Prediction {
    pub fn median_survival(&self) -> Option<f64> {
        self.survival_curve.median()
    }
}

impl fmt::Display for Prediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "relative hazard {:.3} (log {:.3}), median survival ",
            self.relative_hazard, self.log_partial_hazard
        )?;
        match self.median_survival() {
            Some(t) => write!(f, "{:.3}", t),
            None => write!(f, "not reached"),
        }
    }
}

/// exp(beta . x) for a validated request
pub fn predict_relative_hazard(model: &FittedModel, request: &PredictionRequest) -> Result<f64> {
    let x = model.schema().validate(request)?;
    model.relative_hazard_of(x.view())
}

/// S(t | x) = exp(-H0(t) * exp(beta . x))
pub fn predict_survival_curve(
    model: &FittedModel,
    request: &PredictionRequest,
) -> Result<SurvivalCurve> {
    let x = model.schema().validate(request)?;
    let relative_hazard = model.relative_hazard_of(x.view())?;
    model.baseline_cumulative_hazard().to_survival(relative_hazard)
}

pub fn predict(
    model: &FittedModel,
    request: &PredictionRequest,
) -> std::result::Result<Prediction, PredictionError> {
    let x = model.schema().validate(request)?;
    predict_vector(model, x.view())
}

/// predictions for rows of a table fit with the same covariates
pub fn predict_rows(
    model: &FittedModel,
    data: &SurvivalData,
    rows: &[usize],
) -> Result<Vec<Prediction>> {
    if data.covariate_names() != model.covariate_names() {
        return Err(SurvivalError::schema_mismatch(format!(
            "data covariates {:?} don't match model covariates {:?}",
            data.covariate_names(),
            model.covariate_names()
        )));
    }

    rows.iter()
        .map(|&row| {
            if row >= data.n_samples() {
                return Err(SurvivalError::invalid_dimensions(format!(
                    "row {} out of range ({} rows)",
                    row,
                    data.n_samples()
                )));
            }
            predict_vector(model, data.covariates().row(row))
        })
        .collect()
}

fn predict_vector(model: &FittedModel, x: ArrayView1<f64>) -> Result<Prediction> {
    let log_partial_hazard = model.log_partial_hazard_of(x)?;
    let relative_hazard = model.relative_hazard_of(x)?;
    let survival_curve = model
        .baseline_cumulative_hazard()
        .to_survival(relative_hazard)?;

    Ok(Prediction {
        log_partial_hazard,
        relative_hazard,
        survival_curve,
    })
}
