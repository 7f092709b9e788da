//! configuration: defaults < `cox-survival.toml` (or `--config`) < env vars

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    error::{Result, SurvivalError},
    loader::MissingPolicy,
    model::CoxModel,
    predict::{CovariateEncoding, PredictionRequest},
};

/// file picked up from the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "cox-survival.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub report: ReportConfig,
}

/// where the table lives and which columns matter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_path")]
    pub path: PathBuf,

    #[serde(default = "default_duration_column")]
    pub duration_column: String,

    #[serde(default = "default_event_column")]
    pub event_column: String,

    #[serde(default = "default_covariates")]
    pub covariates: Vec<String>,

    #[serde(default)]
    pub missing: MissingPolicy,

    /// declared kind per covariate; columns not listed are inferred at fit time
    #[serde(default = "default_encodings")]
    pub encodings: BTreeMap<String, CovariateEncoding>,
}

/// fitter knobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub penalizer: f64,

    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    #[serde(default = "default_tolerance")]
    pub tolerance: f64,

    #[serde(default = "default_max_categorical_levels")]
    pub max_categorical_levels: usize,
}

/// output knobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportConfig {
    /// 1 - confidence level for summary and kaplan-meier intervals
    #[serde(default = "default_alpha")]
    pub alpha: f64,

    /// rows shown by `curves`
    #[serde(default = "default_sample_rows")]
    pub sample_rows: usize,

    /// times at which curves are printed
    #[serde(default = "default_time_points")]
    pub time_points: Vec<f64>,

    /// patient used by `dashboard` and as the base for `predict`
    #[serde(default = "default_patient")]
    pub patient: BTreeMap<String, f64>,
}

fn default_data_path() -> PathBuf {
    PathBuf::from("NKI_cleaned.csv")
}

fn default_duration_column() -> String {
    "timerecurrence".to_string()
}

fn default_event_column() -> String {
    "eventdeath".to_string()
}

fn default_covariates() -> Vec<String> {
    [
        "age",
        "chemo",
        "hormonal",
        "amputation",
        "histtype",
        "diam",
        "posnodes",
        "grade",
        "angioinv",
        "lymphinfil",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// chemo/hormonal/amputation/angioinv are 0/1, grade and lymphinfil 1-3,
/// histtype takes the codes in the table, the rest are plain numbers
fn default_encodings() -> BTreeMap<String, CovariateEncoding> {
    let ordinal = || CovariateEncoding::Categorical { levels: vec![1, 2, 3] };
    [
        ("age", CovariateEncoding::Numeric),
        ("chemo", CovariateEncoding::Binary),
        ("hormonal", CovariateEncoding::Binary),
        ("amputation", CovariateEncoding::Binary),
        ("histtype", CovariateEncoding::Categorical { levels: Vec::new() }),
        ("diam", CovariateEncoding::Numeric),
        ("posnodes", CovariateEncoding::Numeric),
        ("grade", ordinal()),
        ("angioinv", CovariateEncoding::Binary),
        ("lymphinfil", ordinal()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

fn default_max_iterations() -> usize {
    50
}

fn default_tolerance() -> f64 {
    1e-9
}

fn default_max_categorical_levels() -> usize {
    crate::predict::DEFAULT_MAX_CATEGORICAL_LEVELS
}

fn default_alpha() -> f64 {
    0.05
}

fn default_sample_rows() -> usize {
    5
}

fn default_time_points() -> Vec<f64> {
    vec![1.0, 2.0, 5.0, 10.0, 15.0]
}

/// the prediction form's initial values; lymphinfil uses the 1-3 ordinal coding
fn default_patient() -> BTreeMap<String, f64> {
    [
        ("age", 50.0),
        ("chemo", 0.0),
        ("hormonal", 0.0),
        ("amputation", 0.0),
        ("histtype", 1.0),
        ("diam", 25.0),
        ("posnodes", 3.0),
        ("grade", 1.0),
        ("angioinv", 0.0),
        ("lymphinfil", 1.0),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            path: default_data_path(),
            duration_column: default_duration_column(),
            event_column: default_event_column(),
            covariates: default_covariates(),
            missing: MissingPolicy::default(),
            encodings: default_encodings(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            penalizer: 0.0,
            max_iterations: default_max_iterations(),
            tolerance: default_tolerance(),
            max_categorical_levels: default_max_categorical_levels(),
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            alpha: default_alpha(),
            sample_rows: default_sample_rows(),
            time_points: default_time_points(),
            patient: default_patient(),
        }
    }
}

impl DataConfig {
    /// duration, event, then covariates - the order the loader keeps
    pub fn selected_columns(&self) -> Vec<String> {
        let mut columns = vec![self.duration_column.clone(), self.event_column.clone()];
        columns.extend(self.covariates.iter().cloned());
        columns
    }
}

impl Config {
    /// fitter knobs plus the declared covariate encodings
    pub fn cox_model(&self) -> CoxModel {
        self.model.to_model().with_encodings(self.data.encodings.clone())
    }

    /// the configured patient, restricted to the configured covariates
    pub fn patient(&self) -> PredictionRequest {
        self.report
            .patient
            .iter()
            .filter(|(name, _)| self.data.covariates.contains(name))
            .map(|(name, &value)| (name.clone(), value))
            .collect()
    }
}

impl ModelConfig {
    pub fn to_model(&self) -> CoxModel {
        CoxModel::new()
            .with_penalizer(self.penalizer)
            .with_max_iterations(self.max_iterations)
            .with_tolerance(self.tolerance)
            .with_max_categorical_levels(self.max_categorical_levels)
    }
}

impl Config {
    /// Load configuration from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SurvivalError::config(format!("can't read {}: {}", path.display(), e))
        })?;
        toml::from_str(&content)
            .map_err(|e| SurvivalError::config(format!("can't parse {}: {}", path.display(), e)))
    }

    /// explicit path (must exist) > ./cox-survival.toml > defaults, then env overrides
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut config = match config_path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => Self::from_file(DEFAULT_CONFIG_FILE)?,
            None => Self::default(),
        };

        config.apply_env_vars(|key| std::env::var(key).ok())?;
        config.validate()?;
        debug!(?config, "configuration loaded");
        Ok(config)
    }

    /// `COX_SURVIVAL_DATA`, `COX_SURVIVAL_MAX_ITER`, `COX_SURVIVAL_PENALIZER`
    pub fn apply_env_vars(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(path) = lookup("COX_SURVIVAL_DATA") {
            self.data.path = PathBuf::from(path);
        }

        if let Some(iters) = lookup("COX_SURVIVAL_MAX_ITER") {
            self.model.max_iterations = iters
                .parse()
                .map_err(|_| SurvivalError::config(format!("invalid COX_SURVIVAL_MAX_ITER '{}'", iters)))?;
        }

        if let Some(penalizer) = lookup("COX_SURVIVAL_PENALIZER") {
            self.model.penalizer = penalizer.parse().map_err(|_| {
                SurvivalError::config(format!("invalid COX_SURVIVAL_PENALIZER '{}'", penalizer))
            })?;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let columns = self.data.selected_columns();
        for (i, col) in columns.iter().enumerate() {
            if columns[..i].contains(col) {
                return Err(SurvivalError::config(format!("column '{}' selected twice", col)));
            }
        }

        if self.data.covariates.is_empty() {
            return Err(SurvivalError::config("no covariates configured"));
        }
        if self.model.penalizer < 0.0 || !self.model.penalizer.is_finite() {
            return Err(SurvivalError::config("penalizer must be a finite value >= 0"));
        }
        if self.model.max_iterations == 0 {
            return Err(SurvivalError::config("max_iterations must be >= 1"));
        }
        if !(self.model.tolerance > 0.0) {
            return Err(SurvivalError::config("tolerance must be > 0"));
        }
        if !(self.report.alpha > 0.0 && self.report.alpha < 1.0) {
            return Err(SurvivalError::config("alpha must be in (0, 1)"));
        }
        for (name, encoding) in &self.data.encodings {
            if let CovariateEncoding::Categorical { levels } = encoding {
                if levels.iter().any(|&l| l < 0) {
                    return Err(SurvivalError::config(format!(
                        "levels for '{}' must be >= 0, got {:?}",
                        name, levels
                    )));
                }
            }
        }
        if self.report.time_points.iter().any(|t| !(*t >= 0.0)) {
            return Err(SurvivalError::config("time points must be >= 0"));
        }

        Ok(())
    }
}
