use cox_survival::{
    kaplan_meier::KaplanMeier, predict, CoxModel, ModelSummary, PredictionRequest, SurvivalData,
};
use ndarray::Array2;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Cox Proportional Hazards Model - Basic Usage Example");
    println!("====================================================\n");

    // Create sample survival data
    let times = vec![
        1.2, 2.1, 3.5, 4.2, 5.8, 6.1, 7.3, 8.9, 9.2, 10.5, 2.3, 3.1, 4.8, 5.2, 6.9, 7.1, 8.3,
        9.8, 10.1, 11.2,
    ];

    let events = vec![
        true, false, true, true, false, true, true, false, true, false, true, true, false, true,
        true, false, true, true, false, true,
    ];

    // Covariates: age, chemo (0/1), grade (1-3)
    let covariates = Array2::from_shape_vec(
        (20, 3),
        vec![
            65.0, 0.0, 2.0, // Patient 1
            70.0, 1.0, 1.0, // Patient 2
            55.0, 0.0, 3.0, // Patient 3
            62.0, 1.0, 2.0, // Patient 4
            68.0, 0.0, 3.0, // Patient 5
            72.0, 1.0, 1.0, // Patient 6
            58.0, 0.0, 3.0, // Patient 7
            66.0, 1.0, 2.0, // Patient 8
            71.0, 0.0, 2.0, // Patient 9
            59.0, 1.0, 2.0, // Patient 10
            63.0, 0.0, 3.0, // Patient 11
            69.0, 1.0, 1.0, // Patient 12
            57.0, 0.0, 3.0, // Patient 13
            64.0, 1.0, 2.0, // Patient 14
            67.0, 0.0, 2.0, // Patient 15
            73.0, 1.0, 1.0, // Patient 16
            61.0, 0.0, 3.0, // Patient 17
            65.0, 1.0, 1.0, // Patient 18
            70.0, 0.0, 2.0, // Patient 19
            56.0, 1.0, 2.0, // Patient 20
        ],
    )?;

    let data = SurvivalData::with_names(
        times,
        events,
        covariates,
        vec!["age".to_string(), "chemo".to_string(), "grade".to_string()],
    )?;

    println!("Dataset Information:");
    println!("  - Number of samples: {}", data.n_samples());
    println!("  - Number of features: {}", data.n_features());
    println!("  - Number of events: {}", data.n_events());
    println!("  - Number of censored: {}", data.n_samples() - data.n_events());
    println!();

    // Example 1: Cox regression
    println!("Example 1: Cox Regression");
    println!("-------------------------");

    let model = CoxModel::new().fit_data(&data)?;
    println!("{}", ModelSummary::from_model(&model, 0.05)?);
    println!("converged in {} iterations\n", model.iterations());

    // Example 2: ridge penalty
    println!("Example 2: Ridge Penalty");
    println!("------------------------");

    for penalizer in [0.1, 1.0, 10.0] {
        let ridge = CoxModel::new().with_penalizer(penalizer).fit_data(&data)?;
        println!("  penalizer {:>5}: coefficients {:.4}", penalizer, ridge.coefficients());
    }
    println!();

    // Example 3: what-if prediction
    println!("Example 3: Prediction");
    println!("---------------------");

    let patient = PredictionRequest::new()
        .with("age", 60.0)
        .with("chemo", 1.0)
        .with("grade", 2.0);
    let prediction = predict(&model, &patient)?;
    println!("  {}", prediction);
    for t in [2.0, 4.0, 6.0, 8.0, 10.0] {
        println!("  S({:>4.1}) = {:.3}", t, prediction.survival_curve.at(t));
    }

    match predict(&model, &patient.clone().with("chemo", 2.0)) {
        Ok(_) => println!("  unexpected: chemo=2 accepted"),
        Err(e) => println!("  chemo=2 rejected: {}", e),
    }
    println!();

    // Example 4: Kaplan-Meier by chemo
    println!("Example 4: Kaplan-Meier by chemo");
    println!("--------------------------------");

    for (code, fit) in KaplanMeier::new().fit_groups(&data, "chemo")? {
        let median = fit
            .median()
            .map_or_else(|| "not reached".to_string(), |t| format!("{:.1}", t));
        println!(
            "  chemo={}: n={}, median survival {}",
            code, fit.n_samples, median
        );
        for row in &fit.event_table {
            println!(
                "    t={:>5.1} at risk {:>2}, died {}, censored {}",
                row.time, row.at_risk, row.observed, row.censored
            );
        }
    }

    Ok(())
}
