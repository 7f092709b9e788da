use crate::error::{Result, SurvivalError};

/// right-continuous, non-increasing step function S(t), with S(0) = 1
#[derive(Debug, Clone, PartialEq)]
pub struct SurvivalCurve {
    times: Vec<f64>,    // step locations, times[0] == 0
    survival: Vec<f64>, // value from times[i] up to times[i + 1]
}

impl SurvivalCurve {
    pub fn new(times: Vec<f64>, survival: Vec<f64>) -> Result<Self> {
        if times.len() != survival.len() {
            return Err(SurvivalError::invalid_dimensions(format!(
                "{} step times for {} survival values",
                times.len(),
                survival.len()
            )));
        }

        if times.first() != Some(&0.0) || survival.first() != Some(&1.0) {
            return Err(SurvivalError::invalid_data(
                "survival curve must start at S(0) = 1",
            ));
        }

        for i in 1..times.len() {
            if !(times[i] > times[i - 1]) {
                return Err(SurvivalError::invalid_data(
                    "curve step times must be strictly increasing",
                ));
            }
            if !(survival[i] <= survival[i - 1]) || survival[i] < 0.0 {
                return Err(SurvivalError::invalid_data(format!(
                    "survival must be non-increasing in [0, 1] (step {} = {})",
                    i, survival[i]
                )));
            }
        }

        Ok(Self { times, survival })
    }

    /// curve from (time, value) steps after t = 0; a step at t = 0 itself is dropped
    pub(crate) fn from_steps(steps: impl IntoIterator<Item = (f64, f64)>) -> Result<Self> {
        let mut times = vec![0.0];
        let mut survival = vec![1.0];
        for (t, s) in steps {
            if t > 0.0 {
                times.push(t);
                survival.push(s);
            }
        }
        Self::new(times, survival)
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn survival(&self) -> &[f64] {
        &self.survival
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// S(t); 1.0 for any t before the first drop
    pub fn at(&self, t: f64) -> f64 {
        let idx = self.times.partition_point(|&x| x <= t);
        if idx == 0 {
            1.0
        } else {
            self.survival[idx - 1]
        }
    }

    pub fn sample(&self, times: &[f64]) -> Vec<f64> {
        times.iter().map(|&t| self.at(t)).collect()
    }

    /// first time the curve drops to 0.5 or below
    pub fn median(&self) -> Option<f64> {
        self.quantile(0.5)
    }

    /// first time the curve drops to `p` or below
    pub fn quantile(&self, p: f64) -> Option<f64> {
        self.times
            .iter()
            .zip(&self.survival)
            .find(|(_, &s)| s <= p)
            .map(|(&t, _)| t)
    }
}

/// non-decreasing step function H(t), with H(0) = 0
#[derive(Debug, Clone, PartialEq)]
pub struct CumulativeHazard {
    times: Vec<f64>,
    hazard: Vec<f64>,
}

impl CumulativeHazard {
    /// from increments at ascending event times
    pub(crate) fn from_increments(steps: impl IntoIterator<Item = (f64, f64)>) -> Result<Self> {
        let mut times = vec![0.0];
        let mut hazard = vec![0.0];
        let mut total = 0.0;

        for (t, dh) in steps {
            if !(dh >= 0.0) || !dh.is_finite() {
                return Err(SurvivalError::numeric_overflow(format!(
                    "baseline hazard increment at t = {} is {}",
                    t, dh
                )));
            }
            total += dh;
            if !total.is_finite() {
                return Err(SurvivalError::numeric_overflow(format!(
                    "baseline cumulative hazard overflowed at t = {}",
                    t
                )));
            }
            times.push(t);
            hazard.push(total);
        }

        Ok(Self { times, hazard })
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn values(&self) -> &[f64] {
        &self.hazard
    }

    pub fn at(&self, t: f64) -> f64 {
        let idx = self.times.partition_point(|&x| x <= t);
        if idx == 0 {
            0.0
        } else {
            self.hazard[idx - 1]
        }
    }

    /// S(t) = exp(-H(t) * scale); scale = relative hazard
    pub fn to_survival(&self, scale: f64) -> Result<SurvivalCurve> {
        let mut survival = Vec::with_capacity(self.hazard.len());
        for (&t, &h) in self.times.iter().zip(&self.hazard) {
            let s = (-h * scale).exp();
            if s.is_nan() {
                return Err(SurvivalError::numeric_overflow(format!(
                    "survival at t = {} is undefined (H = {}, scale = {})",
                    t, h, scale
                )));
            }
            survival.push(s);
        }
        SurvivalCurve::new(self.times.clone(), survival)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn km_like() -> SurvivalCurve {
        SurvivalCurve::from_steps(vec![(5.0, 0.75), (8.0, 0.5), (12.0, 0.0)]).unwrap()
    }

    #[test]
    fn test_step_evaluation() {
        let curve = km_like();
        assert_eq!(curve.at(-1.0), 1.0);
        assert_eq!(curve.at(0.0), 1.0);
        assert_eq!(curve.at(4.999), 1.0);
        assert_eq!(curve.at(5.0), 0.75); // right-continuous
        assert_eq!(curve.at(10.0), 0.5);
        assert_eq!(curve.at(100.0), 0.0);
        assert_eq!(curve.sample(&[1.0, 8.0]), vec![1.0, 0.5]);
    }

    #[test]
    fn test_median() {
        assert_eq!(km_like().median(), Some(8.0));

        let never = SurvivalCurve::from_steps(vec![(3.0, 0.9)]).unwrap();
        assert_eq!(never.median(), None);
    }

    #[test]
    fn test_rejects_increasing_curve() {
        assert!(SurvivalCurve::new(vec![0.0, 1.0, 2.0], vec![1.0, 0.5, 0.6]).is_err());
        assert!(SurvivalCurve::new(vec![0.0, 1.0], vec![0.9, 0.5]).is_err());
        assert!(SurvivalCurve::new(vec![0.0, 1.0, 1.0], vec![1.0, 0.5, 0.4]).is_err());
    }

    #[test]
    fn test_cumulative_hazard_to_survival() {
        let h = CumulativeHazard::from_increments(vec![(1.0, 0.2), (2.0, 0.3)]).unwrap();
        assert_relative_eq!(h.at(1.5), 0.2);
        assert_relative_eq!(h.at(2.0), 0.5);

        let s = h.to_survival(2.0).unwrap();
        assert_eq!(s.at(0.0), 1.0);
        assert_relative_eq!(s.at(1.0), (-0.4f64).exp(), epsilon = 1e-12);
        assert_relative_eq!(s.at(2.0), (-1.0f64).exp(), epsilon = 1e-12);
    }

    #[test]
    fn test_infinite_scale_is_not_nan() {
        let h = CumulativeHazard::from_increments(vec![(1.0, 0.2)]).unwrap();
        let s = h.to_survival(f64::INFINITY);
        // 0 * inf at t = 0 is NaN - that must surface, never get clamped
        assert_eq!(s.unwrap_err().kind(), "NumericOverflow");
    }
}
