//! Kaplan-Meier command - product-limit curves per group.

use cox_survival::KaplanMeier;

use super::{format_median, heading, print_curve_table, warn_failure, Session};

pub fn run(session: &Session, group: &str) {
    heading(&format!("Kaplan-Meier by {}", group));

    let fits = match KaplanMeier::new()
        .with_alpha(session.config.report.alpha)
        .and_then(|km| km.fit_groups(session.data(), group))
    {
        Ok(fits) => fits,
        Err(err) => {
            warn_failure("kaplan-meier", &err);
            return;
        }
    };

    println!(
        "{:>8} {:>6} {:>7} {:>12}",
        group, "n", "events", "median"
    );
    for (code, fit) in &fits {
        let events: usize = fit.event_table.iter().map(|row| row.observed).sum();
        println!(
            "{:>8} {:>6} {:>7} {:>12}",
            code,
            fit.n_samples,
            events,
            format_median(fit.median())
        );
    }
    println!();

    let labels: Vec<String> = fits.keys().map(|code| format!("{}={}", group, code)).collect();
    let curves: Vec<_> = fits.values().map(|fit| &fit.curve).collect();
    print_curve_table(&labels, &curves, &session.config.report.time_points);

    let level = 100.0 * (1.0 - session.config.report.alpha);
    for (code, fit) in &fits {
        println!();
        println!("{}={}, {:.0}% band", group, code, level);
        for &t in &session.config.report.time_points {
            let (lower, upper) = fit.confidence_at(t);
            println!("{:>8.2} {:>8.3} [{:.3}, {:.3}]", t, fit.curve.at(t), lower, upper);
        }
    }
}
