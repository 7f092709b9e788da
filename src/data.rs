use std::collections::BTreeMap;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

use crate::error::{Result, SurvivalError};

/// named numeric table - exactly the columns the loader selected
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    columns: Vec<String>,
    values: Array2<f64>, // n_rows x n_columns
}

impl Dataset {
    pub fn new(columns: Vec<String>, values: Array2<f64>) -> Result<Self> {
        if columns.len() != values.ncols() {
            return Err(SurvivalError::invalid_dimensions(format!(
                "{} column names for {} columns",
                columns.len(),
                values.ncols()
            )));
        }

        check_unique(&columns)?;

        Ok(Self { columns, values })
    }

    pub fn n_rows(&self) -> usize {
        self.values.nrows()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> ArrayView2<'_, f64> {
        self.values.view()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// one column by name
    pub fn column(&self, name: &str) -> Result<ArrayView1<'_, f64>> {
        let idx = self.column_index(name).ok_or_else(|| {
            SurvivalError::data_unavailable(format!("column '{}' not in dataset", name))
        })?;
        Ok(self.values.column(idx))
    }
}

fn check_unique(names: &[String]) -> Result<()> {
    for (i, name) in names.iter().enumerate() {
        if names[..i].contains(name) {
            return Err(SurvivalError::invalid_data(format!(
                "duplicate column name '{}'",
                name
            )));
        }
    }
    Ok(())
}

/// all rows that failed at one distinct event time, plus who was still at risk
#[derive(Debug, Clone, PartialEq)]
pub struct EventGroup {
    pub time: f64,
    pub failures: Vec<usize>,
    pub risk_set: Vec<usize>,
    pub censored: usize, // censored rows sharing this exact time
}

/// survival data - durations, events, and named patient covariates
#[derive(Debug, Clone)]
pub struct SurvivalData {
    times: Array1<f64>,         // time to event/censoring
    events: Vec<bool>,          // true = event, false = censored
    covariates: Array2<f64>,    // n_samples x n_features
    covariate_names: Vec<String>,
    event_groups: Vec<EventGroup>, // precomputed, ascending by time
}

impl SurvivalData {
    /// unnamed covariates get `x0`, `x1`, ...
    pub fn new(times: Vec<f64>, events: Vec<bool>, covariates: Array2<f64>) -> Result<Self> {
        let names = (0..covariates.ncols()).map(|j| format!("x{}", j)).collect();
        Self::with_names(times, events, covariates, names)
    }

    pub fn with_names(
        times: Vec<f64>,
        events: Vec<bool>,
        covariates: Array2<f64>,
        covariate_names: Vec<String>,
    ) -> Result<Self> {
        let n_samples = times.len();

        if events.len() != n_samples {
            return Err(SurvivalError::invalid_dimensions(format!(
                "times len ({}) != events len ({})",
                n_samples,
                events.len()
            )));
        }

        if covariates.nrows() != n_samples {
            return Err(SurvivalError::invalid_dimensions(format!(
                "covariates rows ({}) != n_samples ({})",
                covariates.nrows(),
                n_samples
            )));
        }

        if covariate_names.len() != covariates.ncols() {
            return Err(SurvivalError::invalid_dimensions(format!(
                "{} covariate names for {} covariates",
                covariate_names.len(),
                covariates.ncols()
            )));
        }

        check_unique(&covariate_names)?;

        if times.iter().any(|&t| t < 0.0 || !t.is_finite()) {
            return Err(SurvivalError::invalid_data(
                "durations must be non-negative & finite",
            ));
        }

        // an event at t=0 would make every curve start below 1
        if times.iter().zip(&events).any(|(&t, &e)| e && t == 0.0) {
            return Err(SurvivalError::invalid_data(
                "observed event at duration 0",
            ));
        }

        if covariates.iter().any(|v| !v.is_finite()) {
            return Err(SurvivalError::invalid_data(
                "covariates must be fully observed & finite",
            ));
        }

        let times = Array1::from(times);
        let event_groups = build_event_groups(&times, &events);

        Ok(Self {
            times,
            events,
            covariates,
            covariate_names,
            event_groups,
        })
    }

    /// split a table into duration / event / covariates; every other column is a covariate
    pub fn from_dataset(dataset: &Dataset, duration_col: &str, event_col: &str) -> Result<Self> {
        if duration_col == event_col {
            return Err(SurvivalError::invalid_data(
                "duration and event columns must differ",
            ));
        }

        let times = dataset.column(duration_col)?.to_vec();

        let events = dataset
            .column(event_col)?
            .iter()
            .enumerate()
            .map(|(row, &v)| match v {
                v if v == 1.0 => Ok(true),
                v if v == 0.0 => Ok(false),
                other => Err(SurvivalError::invalid_data(format!(
                    "event column '{}' must be 0/1, row {} has {}",
                    event_col, row, other
                ))),
            })
            .collect::<Result<Vec<bool>>>()?;

        let covariate_cols: Vec<usize> = (0..dataset.columns().len())
            .filter(|&j| {
                let name = &dataset.columns()[j];
                name != duration_col && name != event_col
            })
            .collect();

        let names = covariate_cols
            .iter()
            .map(|&j| dataset.columns()[j].clone())
            .collect();
        let covariates = dataset.values().select(Axis(1), &covariate_cols);

        Self::with_names(times, events, covariates, names)
    }

    /// how many patients
    pub fn n_samples(&self) -> usize {
        self.times.len()
    }

    /// how many covariates per patient
    pub fn n_features(&self) -> usize {
        self.covariates.ncols()
    }

    /// observed (uncensored) events
    pub fn n_events(&self) -> usize {
        self.events.iter().filter(|&&e| e).count()
    }

    pub fn times(&self) -> ArrayView1<'_, f64> {
        self.times.view()
    }

    pub fn events(&self) -> &[bool] {
        &self.events
    }

    pub fn covariates(&self) -> ArrayView2<'_, f64> {
        self.covariates.view()
    }

    pub fn covariate_names(&self) -> &[String] {
        &self.covariate_names
    }

    pub fn covariate_index(&self, name: &str) -> Option<usize> {
        self.covariate_names.iter().position(|c| c == name)
    }

    /// failures + risk sets at each distinct event time
    pub fn event_groups(&self) -> &[EventGroup] {
        &self.event_groups
    }

    /// unique event times in order
    pub fn event_times(&self) -> Vec<f64> {
        self.event_groups.iter().map(|g| g.time).collect()
    }

    /// column means of the covariate matrix (zeros if there are no rows)
    pub fn covariate_means(&self) -> Array1<f64> {
        self.covariates
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(self.n_features()))
    }

    /// grab a subset of patients by indices
    pub fn subset(&self, indices: &[usize]) -> Result<Self> {
        if indices.iter().any(|&i| i >= self.n_samples()) {
            return Err(SurvivalError::invalid_dimensions("subset index out of bounds"));
        }

        let times: Vec<f64> = indices.iter().map(|&i| self.times[i]).collect();
        let events: Vec<bool> = indices.iter().map(|&i| self.events[i]).collect();
        let covariates = self.covariates.select(Axis(0), indices);

        Self::with_names(times, events, covariates, self.covariate_names.clone())
    }

    /// row indices per integer code of a categorical covariate
    pub fn group_indices(&self, column: &str) -> Result<BTreeMap<i64, Vec<usize>>> {
        let j = self.covariate_index(column).ok_or_else(|| {
            SurvivalError::schema_mismatch(format!("no covariate named '{}'", column))
        })?;

        let mut groups: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
        for (i, &v) in self.covariates.column(j).iter().enumerate() {
            let code = integer_code(v).ok_or_else(|| {
                SurvivalError::schema_mismatch(format!(
                    "'{}' is not an integer code (row {} = {})",
                    column, i, v
                ))
            })?;
            groups.entry(code).or_default().push(i);
        }

        Ok(groups)
    }
}

/// 2^53: past this, distinct integers share an f64
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

/// `v` as an integer code, if it is one exactly
pub(crate) fn integer_code(v: f64) -> Option<i64> {
    (v.fract() == 0.0 && v.abs() <= MAX_EXACT_INTEGER).then_some(v as i64)
}

/// risk set at t = everyone whose duration is >= t
fn build_event_groups(times: &Array1<f64>, events: &[bool]) -> Vec<EventGroup> {
    let mut event_times: Vec<f64> = times
        .iter()
        .zip(events)
        .filter_map(|(&t, &e)| e.then_some(t))
        .collect();

    event_times.sort_by(f64::total_cmp);
    event_times.dedup();

    event_times
        .into_iter()
        .map(|time| {
            let failures = (0..times.len())
                .filter(|&i| times[i] == time && events[i])
                .collect();
            let risk_set = (0..times.len()).filter(|&i| times[i] >= time).collect();
            let censored = (0..times.len())
                .filter(|&i| times[i] == time && !events[i])
                .count();
            EventGroup {
                time,
                failures,
                risk_set,
                censored,
            }
        })
        .collect()
}
