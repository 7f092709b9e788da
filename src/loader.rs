//! csv -> [`Dataset`], keeping only the configured survival columns

use std::fs::File;
use std::io::Read;
use std::sync::OnceLock;

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    config::DataConfig,
    data::Dataset,
    error::{Result, SurvivalError},
};

/// what to do with an empty / NA cell in a selected column
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingPolicy {
    /// fail the whole load
    #[default]
    Reject,
    /// drop the row and log how many went
    DropRows,
}

/// load the configured columns from the configured file
pub fn load_dataset(config: &DataConfig) -> Result<Dataset> {
    let path = &config.path;
    info!(path = %path.display(), "loading dataset");

    let file = File::open(path).map_err(|e| {
        SurvivalError::data_unavailable(format!("can't open {}: {}", path.display(), e))
    })?;

    load_from_reader(file, &config.selected_columns(), config.missing)
}

/// read csv with a header row, keep `columns` in the given order
pub fn load_from_reader<R: Read>(
    reader: R,
    columns: &[String],
    policy: MissingPolicy,
) -> Result<Dataset> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader
        .headers()
        .map_err(|e| SurvivalError::data_unavailable(format!("can't read csv header: {}", e)))?
        .clone();

    let indices = columns
        .iter()
        .map(|col| {
            headers.iter().position(|h| h == col).ok_or_else(|| {
                SurvivalError::data_unavailable(format!(
                    "column '{}' missing (available: {:?})",
                    col,
                    headers.iter().collect::<Vec<_>>()
                ))
            })
        })
        .collect::<Result<Vec<usize>>>()?;

    let mut values = Vec::new();
    let mut n_rows = 0;
    let mut dropped = 0;

    for (i, record) in reader.records().enumerate() {
        let line = i + 2; // header is line 1
        let record = record
            .map_err(|e| SurvivalError::data_unavailable(format!("bad csv row at line {}: {}", line, e)))?;

        let mut row = Vec::with_capacity(indices.len());
        let mut missing = None;

        for (&idx, col) in indices.iter().zip(columns) {
            let cell = record.get(idx).unwrap_or("");
            match parse_cell(cell) {
                Some(v) => row.push(v),
                None if is_missing(cell) => {
                    missing = Some(col);
                    break;
                }
                None => {
                    return Err(SurvivalError::data_unavailable(format!(
                        "'{}' at line {}, column '{}' is not numeric",
                        cell, line, col
                    )))
                }
            }
        }

        match (missing, policy) {
            (None, _) => {
                values.extend(row);
                n_rows += 1;
            }
            (Some(col), MissingPolicy::Reject) => {
                return Err(SurvivalError::data_unavailable(format!(
                    "missing value in column '{}' at line {}",
                    col, line
                )));
            }
            (Some(col), MissingPolicy::DropRows) => {
                debug!(line, column = %col, "dropping row with missing value");
                dropped += 1;
            }
        }
    }

    if dropped > 0 {
        warn!(dropped, kept = n_rows, "dropped rows with missing values");
    }

    let values = Array2::from_shape_vec((n_rows, columns.len()), values)
        .map_err(|e| SurvivalError::invalid_dimensions(e.to_string()))?;

    info!(rows = n_rows, columns = columns.len(), "dataset loaded");
    Dataset::new(columns.to_vec(), values)
}

fn is_missing(cell: &str) -> bool {
    cell.is_empty()
        || ["na", "nan", "null", "none"]
            .iter()
            .any(|m| cell.eq_ignore_ascii_case(m))
}

fn parse_cell(cell: &str) -> Option<f64> {
    if is_missing(cell) {
        return None;
    }
    cell.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// first successful load is kept for the life of this value
#[derive(Debug)]
pub struct DatasetCache {
    config: DataConfig,
    dataset: OnceLock<Dataset>,
}

impl DatasetCache {
    pub fn new(config: DataConfig) -> Self {
        Self {
            config,
            dataset: OnceLock::new(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.dataset.get().is_some()
    }

    /// load on first call, hand back the cached table afterwards
    pub fn get(&self) -> Result<&Dataset> {
        if let Some(dataset) = self.dataset.get() {
            return Ok(dataset);
        }
        let dataset = load_dataset(&self.config)?;
        Ok(self.dataset.get_or_init(|| dataset))
    }
}
