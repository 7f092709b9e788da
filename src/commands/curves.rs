//! Curves command - predicted survival for the first rows of the table.

use cox_survival::{predict_rows, FittedModel};
use tracing::debug;

use super::{heading, print_curve_table, warn_failure, Session};

pub fn run(session: &Session, rows: Option<usize>) {
    if let Some(model) = session.fit_or_warn("curves") {
        render(session, &model, rows.unwrap_or(session.config.report.sample_rows));
    }
}

pub(crate) fn render(session: &Session, model: &FittedModel, rows: usize) {
    let rows: Vec<usize> = (0..rows.min(session.data().n_samples())).collect();
    debug!(rows = rows.len(), "predicting sample curves");

    heading("Predicted survival, first rows");
    let predictions = match predict_rows(model, session.data(), &rows) {
        Ok(predictions) => predictions,
        Err(err) => {
            warn_failure("curves", &err);
            return;
        }
    };

    let labels: Vec<String> = rows.iter().map(|r| format!("row {}", r)).collect();
    let curves: Vec<_> = predictions.iter().map(|p| &p.survival_curve).collect();
    print_curve_table(&labels, &curves, &session.config.report.time_points);
}
