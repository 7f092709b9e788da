//! # cox survival
//!
//! cox proportional hazards + kaplan-meier for a clinical table - fit once,
//! then ask about a hypothetical patient.
//!
//! ## what you get
//!
//! - csv loading that keeps only the survival columns you configure
//! - cox regression by newton-raphson on the efron partial likelihood
//! - breslow baseline hazard, so predictions come with a full survival curve
//! - kaplan-meier curves per subgroup, with greenwood confidence bands
//! - a lifelines-style summary table (hazard ratios, CIs, p-values)
//! - typed errors instead of silently clamped numbers
//!
//! ## quick start
//!
//! ```rust
//! use cox_survival::{kaplan_meier, predict, CoxModel, PredictionRequest, SurvivalData};
//! use ndarray::Array2;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let times = vec![5.0, 8.0, 8.0, 12.0, 3.0, 9.0];
//! let events = vec![true, false, true, true, true, false]; // false = censored
//! let covariates = Array2::from_shape_vec((6, 2), vec![
//!     40.0, 0.0, // age, chemo
//!     50.0, 1.0,
//!     60.0, 0.0,
//!     70.0, 1.0,
//!     65.0, 1.0,
//!     45.0, 0.0,
//! ])?;
//! let data = SurvivalData::with_names(
//!     times,
//!     events,
//!     covariates,
//!     vec!["age".into(), "chemo".into()],
//! )?;
//!
//! let model = CoxModel::new().fit_data(&data)?;
//!
//! let patient = PredictionRequest::new().with("age", 55.0).with("chemo", 1.0);
//! let prediction = predict(&model, &patient)?;
//! assert!(prediction.relative_hazard > 0.0);
//! assert_eq!(prediction.survival_curve.at(0.0), 1.0);
//!
//! let by_chemo = kaplan_meier(&data, "chemo")?;
//! assert_eq!(by_chemo.len(), 2);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod curve;
pub mod data;
pub mod error;
pub mod kaplan_meier;
pub mod linalg;
pub mod loader;
pub mod metrics;
pub mod model;
pub mod optimization;
pub mod predict;
pub mod summary;

pub use config::Config;
pub use curve::{CumulativeHazard, SurvivalCurve};
pub use data::{Dataset, SurvivalData};
pub use error::{PredictionError, Result, SurvivalError};
pub use kaplan_meier::{kaplan_meier, KaplanMeier, KaplanMeierFit};
pub use loader::{load_dataset, DatasetCache, MissingPolicy};
pub use model::{CoxModel, FittedModel, TieMethod};
pub use predict::{
    predict, predict_relative_hazard, predict_rows, predict_survival_curve, CovariateEncoding,
    Prediction, PredictionRequest,
};
pub use summary::ModelSummary;

/// fit with the configured column roles - every loaded column besides
/// duration and event is a covariate
pub fn fit(dataset: &Dataset, config: &Config) -> Result<FittedModel> {
    config
        .cox_model()
        .fit(dataset, &config.data.duration_column, &config.data.event_column)
}
