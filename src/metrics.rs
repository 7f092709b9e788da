use ndarray::ArrayView1;
use statrs::distribution::{ChiSquared, ContinuousCDF};

use crate::{
    data::SurvivalData,
    error::{Result, SurvivalError},
};

/// Harrell's C-index - how often does higher risk = shorter survival?
///
/// A pair is comparable when the shorter time is an observed event; ties in
/// risk score count 0.5.
pub fn harrell_c_index(
    risk_scores: ArrayView1<f64>,
    times: ArrayView1<f64>,
    events: &[bool],
) -> Result<f64> {
    let n = risk_scores.len();
    if n != times.len() || n != events.len() {
        return Err(SurvivalError::invalid_dimensions(
            "risk scores, times, and events must have same length",
        ));
    }

    let mut concordant = 0.0;
    let mut comparable = 0u64;

    for i in 0..n {
        if !events[i] {
            continue; // censored obs can't anchor a pair
        }

        for j in 0..n {
            if times[j] > times[i] {
                comparable += 1;
                if risk_scores[i] > risk_scores[j] {
                    concordant += 1.0;
                } else if risk_scores[i] == risk_scores[j] {
                    concordant += 0.5;
                }
            }
        }
    }

    if comparable == 0 {
        return Err(SurvivalError::insufficient_data(
            "no comparable pairs for concordance calc",
        ));
    }

    Ok(concordant / comparable as f64)
}

/// Efron log partial likelihood for arbitrary risk scores (linear predictors)
pub fn log_partial_likelihood(data: &SurvivalData, risk_scores: ArrayView1<f64>) -> Result<f64> {
    if risk_scores.len() != data.n_samples() {
        return Err(SurvivalError::invalid_dimensions(
            "risk scores length must match number of samples",
        ));
    }

    let mut loglik = 0.0;

    for group in data.event_groups() {
        // shift by the max score in the risk set to keep exp() in range
        let shift = group
            .risk_set
            .iter()
            .map(|&i| risk_scores[i])
            .fold(f64::NEG_INFINITY, f64::max);

        let s0: f64 = group
            .risk_set
            .iter()
            .map(|&i| (risk_scores[i] - shift).exp())
            .sum();
        let t0: f64 = group
            .failures
            .iter()
            .map(|&i| (risk_scores[i] - shift).exp())
            .sum();

        let d = group.failures.len() as f64;
        for &i in &group.failures {
            loglik += risk_scores[i] - shift;
        }
        for l in 0..group.failures.len() {
            loglik -= (s0 - (l as f64 / d) * t0).ln();
        }
    }

    if !loglik.is_finite() {
        return Err(SurvivalError::numeric_overflow("log partial likelihood is not finite"));
    }

    Ok(loglik)
}

/// partial AIC: -2 ll + 2 k
pub fn partial_aic(log_likelihood: f64, n_parameters: usize) -> f64 {
    2.0 * n_parameters as f64 - 2.0 * log_likelihood
}

/// likelihood ratio test of the fitted model against beta = 0
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LikelihoodRatioTest {
    pub statistic: f64,
    pub degrees_of_freedom: usize,
    pub p_value: f64,
}

pub fn likelihood_ratio_test(
    log_likelihood: f64,
    null_log_likelihood: f64,
    degrees_of_freedom: usize,
) -> Result<LikelihoodRatioTest> {
    let chi2 = ChiSquared::new(degrees_of_freedom as f64).map_err(|e| {
        SurvivalError::invalid_data(format!("bad degrees of freedom {}: {}", degrees_of_freedom, e))
    })?;

    // rounding can push a tiny improvement below zero
    let statistic = (2.0 * (log_likelihood - null_log_likelihood)).max(0.0);

    Ok(LikelihoodRatioTest {
        statistic,
        degrees_of_freedom,
        p_value: chi2.sf(statistic),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{Array1, Array2};

    fn create_test_data() -> (SurvivalData, Array1<f64>) {
        let times = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let events = vec![true, false, true, true, false];
        let covariates = Array2::from_shape_vec(
            (5, 2),
            vec![1.0, 2.0, 0.0, 1.0, 1.0, 0.0, -1.0, 1.0, 0.0, -1.0],
        )
        .unwrap();

        let data = SurvivalData::new(times, events, covariates).unwrap();
        let risk_scores = Array1::from(vec![0.5, -0.2, 0.8, -0.1, -0.5]);

        (data, risk_scores)
    }

    #[test]
    fn test_harrell_c_index_range() {
        let (data, risk_scores) = create_test_data();
        let c = harrell_c_index(risk_scores.view(), data.times(), data.events()).unwrap();
        assert!((0.0..=1.0).contains(&c));
    }

    #[test]
    fn test_perfect_concordance() {
        let times = Array1::from(vec![1.0, 2.0, 3.0, 4.0]);
        let events = vec![true, true, true, true];
        let risk_scores = Array1::from(vec![4.0, 3.0, 2.0, 1.0]); // anti-correlated with time

        let c = harrell_c_index(risk_scores.view(), times.view(), &events).unwrap();
        assert_relative_eq!(c, 1.0, epsilon = 1e-10);

        let flat = Array1::from(vec![1.0; 4]);
        let c = harrell_c_index(flat.view(), times.view(), &events).unwrap();
        assert_relative_eq!(c, 0.5, epsilon = 1e-10);
    }

    #[test]
    fn test_dimension_mismatch_error() {
        let risk_scores = Array1::from(vec![1.0, 2.0]);
        let times = Array1::from(vec![1.0, 2.0, 3.0]);
        let events = vec![true, false];

        assert!(harrell_c_index(risk_scores.view(), times.view(), &events).is_err());
    }

    #[test]
    fn test_log_partial_likelihood_at_zero() {
        let (data, _) = create_test_data();
        let zeros = Array1::zeros(5);
        let loglik = log_partial_likelihood(&data, zeros.view()).unwrap();

        // risk sets of size 5, 3, 2 at the three event times
        let expected = -(5.0f64.ln() + 3.0f64.ln() + 2.0f64.ln());
        assert_relative_eq!(loglik, expected, epsilon = 1e-12);
    }

    #[test]
    fn test_log_partial_likelihood_is_shift_invariant() {
        let (data, risk_scores) = create_test_data();
        let shifted = risk_scores.mapv(|r| r + 500.0);

        let a = log_partial_likelihood(&data, risk_scores.view()).unwrap();
        let b = log_partial_likelihood(&data, shifted.view()).unwrap();
        assert_relative_eq!(a, b, epsilon = 1e-9);
    }

    #[test]
    fn test_partial_aic() {
        assert_relative_eq!(partial_aic(-10.0, 3), 26.0);
    }

    #[test]
    fn test_likelihood_ratio_test() {
        let lrt = likelihood_ratio_test(-8.0, -10.0, 1).unwrap();
        assert_relative_eq!(lrt.statistic, 4.0);
        // P(chi2_1 > 4) = 2 * (1 - Phi(2))
        assert_relative_eq!(lrt.p_value, 0.04550026389635842, epsilon = 1e-9);

        let none = likelihood_ratio_test(-10.0, -10.0, 2).unwrap();
        assert_relative_eq!(none.p_value, 1.0, epsilon = 1e-12);
    }
}
