//! CLI command implementations.
//!
//! Loading failures abort the process. Anything that goes wrong after the
//! table is in memory (fitting, prediction, grouping) is logged as a warning
//! and the panel is skipped.

pub mod curves;
pub mod dashboard;
pub mod km;
pub mod predict;
pub mod summary;

use anyhow::{Context, Result};
use cox_survival::{
    Config, Dataset, DatasetCache, FittedModel, SurvivalCurve, SurvivalData, SurvivalError,
};
use tracing::{info, warn};

/// config + the loaded table, shared by every command
pub struct Session {
    pub config: Config,
    cache: DatasetCache,
    data: SurvivalData,
}

impl Session {
    pub fn open(config: Config) -> Result<Self> {
        let cache = DatasetCache::new(config.data.clone());
        let dataset = cache
            .get()
            .with_context(|| format!("loading {}", config.data.path.display()))?;

        let data = SurvivalData::from_dataset(
            dataset,
            &config.data.duration_column,
            &config.data.event_column,
        )
        .context("preparing survival data")?;

        info!(
            rows = data.n_samples(),
            events = data.n_events(),
            covariates = data.n_features(),
            "survival table ready"
        );

        Ok(Self {
            config,
            cache,
            data,
        })
    }

    pub fn dataset(&self) -> cox_survival::Result<&Dataset> {
        self.cache.get()
    }

    pub fn data(&self) -> &SurvivalData {
        &self.data
    }

    pub fn fit(&self) -> cox_survival::Result<FittedModel> {
        self.config.cox_model().fit_data(&self.data)
    }

    /// fit, or warn and return None
    pub fn fit_or_warn(&self, panel: &str) -> Option<FittedModel> {
        match self.fit() {
            Ok(model) => Some(model),
            Err(err) => {
                warn_failure(panel, &err);
                None
            }
        }
    }
}

pub(crate) fn warn_failure(panel: &str, err: &SurvivalError) {
    warn!(panel, kind = err.kind(), "{}", err);
}

pub(crate) fn heading(title: &str) {
    println!();
    println!("{}", title);
    println!("{}", "=".repeat(title.len()));
}

/// one row per time point, one column per curve
pub(crate) fn print_curve_table(labels: &[String], curves: &[&SurvivalCurve], time_points: &[f64]) {
    print!("{:>8}", "time");
    for label in labels {
        print!(" {:>12}", label);
    }
    println!();

    for &t in time_points {
        print!("{:>8.2}", t);
        for curve in curves {
            print!(" {:>12.3}", curve.at(t));
        }
        println!();
    }
}

pub(crate) fn format_median(median: Option<f64>) -> String {
    median.map_or_else(|| "not reached".to_string(), |t| format!("{:.2}", t))
}
