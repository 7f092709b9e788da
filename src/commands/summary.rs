//! Summary command - coefficient table of the fitted model.

use cox_survival::{FittedModel, ModelSummary};

use super::{heading, warn_failure, Session};

pub fn run(session: &Session) {
    if let Some(model) = session.fit_or_warn("summary") {
        render(&model, session.config.report.alpha);
    }
}

pub(crate) fn render(model: &FittedModel, alpha: f64) {
    heading("Cox model summary");
    match ModelSummary::from_model(model, alpha) {
        Ok(summary) => println!("{}", summary),
        Err(err) => warn_failure("summary", &err),
    }
}
