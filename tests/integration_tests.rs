use approx::assert_relative_eq;
use cox_survival::{
    config::DataConfig, fit, kaplan_meier, load_dataset, predict, predict_relative_hazard,
    predict_rows, Config, CoxModel, KaplanMeier, MissingPolicy, ModelSummary, PredictionRequest,
    SurvivalData,
};
use ndarray::{Array1, Array2};
use std::io::Write;

const TRUE_COEFFICIENTS: [f64; 3] = [0.5, -0.3, 0.2];

fn create_synthetic_data(n_samples: usize, n_features: usize, seed: u64) -> SurvivalData {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    let mut rng = StdRng::seed_from_u64(seed);

    // Generate random covariates
    let mut covariates_vec = Vec::with_capacity(n_samples * n_features);
    for _ in 0..(n_samples * n_features) {
        covariates_vec.push(rng.gen_range(-2.0..2.0));
    }
    let covariates = Array2::from_shape_vec((n_samples, n_features), covariates_vec).unwrap();

    // Exponential survival times, hazard 0.3 * exp(beta . x), uniform censoring
    let n_coef = n_features.min(3);
    let true_coefficients = Array1::from(TRUE_COEFFICIENTS[..n_coef].to_vec());

    let mut times = Vec::with_capacity(n_samples);
    let mut events = Vec::with_capacity(n_samples);

    for i in 0..n_samples {
        let linear_pred: f64 = covariates
            .row(i)
            .slice(ndarray::s![0..n_coef])
            .dot(&true_coefficients);

        let hazard = 0.3 * linear_pred.exp();
        let u = 1.0 - rng.r#gen::<f64>();
        let time = (-u.ln() / hazard).max(1e-3);
        let censoring_time = rng.gen_range(1.0..10.0);

        if time < censoring_time {
            times.push(time);
            events.push(true);
        } else {
            times.push(censoring_time);
            events.push(false);
        }
    }

    SurvivalData::new(times, events, covariates).unwrap()
}

#[test]
fn test_recovers_true_coefficients() {
    let data = create_synthetic_data(400, 3, 42);
    let model = CoxModel::new().fit_data(&data).unwrap();

    let beta = model.coefficients();
    assert_eq!(beta.len(), 3);
    assert!(beta.iter().all(|b| b.is_finite()));
    assert!((beta[0] - 0.5).abs() < 0.3, "beta[0] = {}", beta[0]);
    assert!(beta[1] < 0.0, "beta[1] = {}", beta[1]);

    assert!(model.standard_errors().iter().all(|&se| se > 0.0 && se.is_finite()));
    assert!(model.log_likelihood() > model.null_log_likelihood());

    let c = model.concordance().unwrap();
    assert!(c > 0.55 && c <= 1.0, "concordance {}", c);
}

#[test]
fn test_hazard_ratio_equals_exp_coefficient() {
    let data = create_synthetic_data(150, 2, 7);
    let model = CoxModel::new().fit_data(&data).unwrap();

    let base = PredictionRequest::new().with("x0", 0.3).with("x1", -0.2);
    let bumped = base.clone().with("x0", 1.3);

    let ratio = predict_relative_hazard(&model, &bumped).unwrap()
        / predict_relative_hazard(&model, &base).unwrap();
    assert_relative_eq!(ratio, model.coefficients()[0].exp(), max_relative = 1e-10);
    assert_relative_eq!(model.hazard_ratios()[0], model.coefficients()[0].exp());
}

#[test]
fn test_rescaling_a_covariate_rescales_its_coefficient() {
    let data = create_synthetic_data(120, 2, 99);
    let model = CoxModel::new().fit_data(&data).unwrap();

    let mut scaled = data.covariates().to_owned();
    scaled.column_mut(0).mapv_inplace(|v| v * 10.0);
    let scaled_data =
        SurvivalData::new(data.times().to_vec(), data.events().to_vec(), scaled).unwrap();
    let scaled_model = CoxModel::new().fit_data(&scaled_data).unwrap();

    assert_relative_eq!(
        scaled_model.coefficients()[0] * 10.0,
        model.coefficients()[0],
        max_relative = 1e-6
    );
    assert_relative_eq!(
        scaled_model.coefficients()[1],
        model.coefficients()[1],
        max_relative = 1e-6
    );
    assert_relative_eq!(
        scaled_model.log_likelihood(),
        model.log_likelihood(),
        max_relative = 1e-9
    );
}

#[test]
fn test_row_order_does_not_matter() {
    let data = create_synthetic_data(80, 3, 5);
    let reversed: Vec<usize> = (0..80).rev().collect();
    let shuffled = data.subset(&reversed).unwrap();

    let a = CoxModel::new().fit_data(&data).unwrap();
    let b = CoxModel::new().fit_data(&shuffled).unwrap();

    for (x, y) in a.coefficients().iter().zip(b.coefficients().iter()) {
        assert_relative_eq!(x, y, max_relative = 1e-6);
    }
}

#[test]
fn test_predicted_curves_are_proper_and_ordered() {
    let data = create_synthetic_data(200, 3, 321);
    let model = CoxModel::new().fit_data(&data).unwrap();

    let predictions = predict_rows(&model, &data, &[0, 1, 2, 3, 4]).unwrap();
    for prediction in &predictions {
        let curve = &prediction.survival_curve;
        assert_eq!(curve.at(0.0), 1.0);
        assert!(curve
            .survival()
            .windows(2)
            .all(|w| w[1] <= w[0] && w[1] >= 0.0));
    }

    // higher risk covariate -> lower survival everywhere
    let low = PredictionRequest::new().with("x0", -1.0).with("x1", 0.0).with("x2", 0.0);
    let high = low.clone().with("x0", 1.0);
    let low = predict(&model, &low).unwrap();
    let high = predict(&model, &high).unwrap();

    assert!(model.coefficients()[0] > 0.0);
    for &t in &[0.5, 1.0, 2.0, 5.0] {
        assert!(high.survival_curve.at(t) <= low.survival_curve.at(t));
    }
}

#[test]
fn test_ridge_shrinks_coefficients() {
    let data = create_synthetic_data(100, 3, 888);

    let plain = CoxModel::new().fit_data(&data).unwrap();
    let ridge = CoxModel::new().with_penalizer(100.0).fit_data(&data).unwrap();

    let norm = |m: &cox_survival::FittedModel| m.coefficients().iter().map(|b| b * b).sum::<f64>();
    assert!(norm(&ridge) < norm(&plain));
    assert_eq!(ridge.penalizer(), 100.0);
}

#[test]
fn test_kaplan_meier_without_censoring() {
    let n = 10;
    let times: Vec<f64> = (1..=n).map(|t| t as f64).collect();
    let data = SurvivalData::new(times, vec![true; n], Array2::zeros((n, 1))).unwrap();

    let curve = KaplanMeier::new().estimate(&data).unwrap();
    for i in 1..=n {
        assert_relative_eq!(
            curve.at(i as f64),
            (n - i) as f64 / n as f64,
            epsilon = 1e-12
        );
    }
    assert_relative_eq!(curve.median().unwrap(), 5.0);
}

#[test]
fn test_no_events_is_insufficient_data() {
    let data = SurvivalData::new(
        vec![1.0, 2.0, 3.0],
        vec![false, false, false],
        Array2::from_shape_vec((3, 1), vec![1.0, 2.0, 3.0]).unwrap(),
    )
    .unwrap();

    let err = CoxModel::new().fit_data(&data).unwrap_err();
    assert_eq!(err.kind(), "InsufficientData");

    // kaplan-meier still works: a flat line
    let curve = KaplanMeier::new().estimate(&data).unwrap();
    assert_eq!(curve.at(10.0), 1.0);
}

const NKI_LIKE: &str = "\
Patient,ID,timerecurrence,eventdeath,age,chemo,grade,comment
1,101,2.1,1,43,0,3,a
2,102,4.8,0,51,1,1,b
3,103,1.5,1,38,1,2,c
4,104,7.2,0,47,0,3,d
5,105,3.3,1,52,0,1,e
6,106,9.0,0,44,1,2,f
7,107,2.7,1,49,1,3,g
8,108,5.6,1,40,0,2,h
9,109,6.1,0,50,0,1,i
10,110,3.9,1,45,1,3,j
11,111,8.4,0,39,1,2,k
12,112,1.2,1,48,0,1,l
";

fn write_table(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

fn table_config(path: std::path::PathBuf) -> Config {
    Config {
        data: DataConfig {
            path,
            duration_column: "timerecurrence".into(),
            event_column: "eventdeath".into(),
            covariates: vec!["age".into(), "chemo".into(), "grade".into()],
            missing: MissingPolicy::Reject,
            ..DataConfig::default()
        },
        ..Config::default()
    }
}

#[test]
fn test_csv_to_prediction() {
    let file = write_table(NKI_LIKE);
    let config = table_config(file.path().to_path_buf());

    let dataset = load_dataset(&config.data).unwrap();
    assert_eq!(dataset.n_rows(), 12);
    assert_eq!(
        dataset.columns(),
        &["timerecurrence", "eventdeath", "age", "chemo", "grade"]
    );

    let model = fit(&dataset, &config).unwrap();
    assert_eq!(model.covariate_names(), &["age", "chemo", "grade"]);
    assert_eq!(model.n_events(), 7);
    assert_relative_eq!(model.coefficients()[0], -0.02208857793346256, epsilon = 1e-6);
    assert_relative_eq!(model.coefficients()[1], -0.4074532623844506, epsilon = 1e-6);
    assert_relative_eq!(model.coefficients()[2], 0.20967459415135153, epsilon = 1e-6);
    assert_relative_eq!(model.log_likelihood(), -14.767683229013684, epsilon = 1e-8);

    let summary = ModelSummary::from_model(&model, config.report.alpha).unwrap();
    assert_eq!(summary.rows.len(), 3);
    let grade = summary.row("grade").unwrap();
    assert_relative_eq!(grade.exp_coef, grade.coef.exp());
    assert!(grade.exp_coef_lower <= grade.exp_coef && grade.exp_coef <= grade.exp_coef_upper);
    assert!(summary.to_string().contains("grade"));

    let patient = PredictionRequest::new()
        .with("age", 46.0)
        .with("chemo", 1.0)
        .with("grade", 2.0);
    let prediction = predict(&model, &patient).unwrap();
    assert!(prediction.relative_hazard > 0.0);
    assert_eq!(prediction.survival_curve.at(0.0), 1.0);

    let data = SurvivalData::from_dataset(&dataset, "timerecurrence", "eventdeath").unwrap();
    let curves = kaplan_meier(&data, "chemo").unwrap();
    assert_eq!(curves.keys().copied().collect::<Vec<_>>(), vec![0, 1]);
}

#[test]
fn test_requests_are_checked_against_training_schema() {
    let file = write_table(NKI_LIKE);
    let config = table_config(file.path().to_path_buf());
    let dataset = load_dataset(&config.data).unwrap();
    let model = fit(&dataset, &config).unwrap();

    let good = PredictionRequest::new()
        .with("age", 46.0)
        .with("chemo", 0.0)
        .with("grade", 1.0);
    assert!(predict(&model, &good).is_ok());

    // outside the training age range is allowed
    assert!(predict(&model, &good.clone().with("age", 90.0)).is_ok());

    for bad in [
        good.clone().with("chemo", 2.0),
        good.clone().with("grade", 4.0),
        good.clone().with("posnodes", 1.0),
        good.clone().with("age", f64::NAN),
        PredictionRequest::new().with("age", 46.0).with("chemo", 0.0),
    ] {
        let err = predict(&model, &bad).unwrap_err();
        assert_eq!(err.kind(), "SchemaMismatch", "{}", err);
    }
}

#[test]
fn test_all_zero_patient_is_the_baseline() {
    let file = write_table(NKI_LIKE);
    let config = table_config(file.path().to_path_buf());
    let dataset = load_dataset(&config.data).unwrap();
    let model = fit(&dataset, &config).unwrap();

    // grade is declared 1-3, yet the zero vector is still the reference
    let zeros = PredictionRequest::new()
        .with("age", 0.0)
        .with("chemo", 0.0)
        .with("grade", 0.0);
    assert_eq!(predict_relative_hazard(&model, &zeros).unwrap(), 1.0);

    let prediction = predict(&model, &zeros).unwrap();
    let baseline = model.baseline_cumulative_hazard();
    for t in [1.5, 3.3, 6.0] {
        assert_relative_eq!(
            prediction.survival_curve.at(t),
            (-baseline.at(t)).exp(),
            epsilon = 1e-12
        );
    }
}

#[test]
fn test_patient_from_narrowed_config() {
    let file = write_table(NKI_LIKE);
    let config = table_config(file.path().to_path_buf());
    let dataset = load_dataset(&config.data).unwrap();
    let model = fit(&dataset, &config).unwrap();

    // the default patient lists all ten NKI covariates
    let prediction = predict(&model, &config.patient()).unwrap();
    assert!(prediction.relative_hazard > 0.0);
}

#[test]
fn test_missing_column_fails_load() {
    let file = write_table(NKI_LIKE);
    let mut config = table_config(file.path().to_path_buf());
    config.data.covariates.push("posnodes".into());

    let err = load_dataset(&config.data).unwrap_err();
    assert_eq!(err.kind(), "DataUnavailable");
}
