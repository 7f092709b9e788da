//! Dashboard command - every panel, each one failing on its own.

use super::{curves, heading, km, predict, summary, warn_failure, Session};

pub fn run(session: &Session, group: &str) {
    heading("Dataset");
    match session.dataset() {
        Ok(dataset) => println!("{} rows, columns {:?}", dataset.n_rows(), dataset.columns()),
        Err(err) => warn_failure("dataset", &err),
    }
    let data = session.data();
    println!(
        "{} events, {} censored",
        data.n_events(),
        data.n_samples() - data.n_events()
    );

    match session.fit_or_warn("model") {
        Some(model) => {
            summary::render(&model, session.config.report.alpha);
            curves::render(session, &model, session.config.report.sample_rows);

            predict::render(session, &model, &session.config.patient());
        }
        None => println!("model unavailable, skipping summary, curves and prediction"),
    }

    km::run(session, group);
}
