//! Predict command - relative hazard and survival curve for one patient.

use cox_survival::predict::{predict, Assignment, PredictionRequest};
use cox_survival::FittedModel;
use tracing::info;

use super::{format_median, heading, print_curve_table, warn_failure, Session};

pub fn run(session: &Session, assignments: &[Assignment], only: bool) {
    let mut request = if only {
        PredictionRequest::new()
    } else {
        session.config.patient()
    };
    for assignment in assignments {
        request.insert(assignment.name.clone(), assignment.value);
    }

    if let Some(model) = session.fit_or_warn("predict") {
        render(session, &model, &request);
    }
}

pub(crate) fn render(session: &Session, model: &FittedModel, request: &PredictionRequest) {
    heading("Prediction");
    info!(covariates = request.len(), "predicting patient");

    let prediction = match predict(model, request) {
        Ok(prediction) => prediction,
        Err(err) => {
            warn_failure("predict", &err);
            return;
        }
    };

    for name in request.names() {
        if let Some(value) = request.get(name) {
            println!("{:>12} = {}", name, value);
        }
    }
    println!();
    println!("relative hazard {:.3}", prediction.relative_hazard);
    println!("median survival {}", format_median(prediction.median_survival()));
    println!();

    print_curve_table(
        &["S(t)".to_string()],
        &[&prediction.survival_curve],
        &session.config.report.time_points,
    );
}
