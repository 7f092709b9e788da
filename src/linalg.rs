//! small dense linear algebra for the newton step - cholesky on symmetric
//! positive definite matrices, which is what -hessian is at a proper optimum

use ndarray::{Array1, Array2};

use crate::error::{Result, SurvivalError};

/// pivots below this fraction of the largest diagonal are treated as zero
const RELATIVE_PIVOT_TOLERANCE: f64 = 1e-12;

/// lower-triangular cholesky factor of a symmetric positive definite matrix
#[derive(Debug, Clone)]
pub struct Cholesky {
    lower: Array2<f64>,
}

impl Cholesky {
    /// factor `a = L L^T`; fails with a convergence error when `a` isn't positive definite
    pub fn factor(a: &Array2<f64>) -> Result<Self> {
        let n = a.nrows();
        if n != a.ncols() {
            return Err(SurvivalError::invalid_dimensions(format!(
                "cholesky needs a square matrix, got {}x{}",
                n,
                a.ncols()
            )));
        }

        let scale = (0..n).map(|i| a[[i, i]].abs()).fold(0.0, f64::max);
        let min_pivot = RELATIVE_PIVOT_TOLERANCE * scale.max(f64::MIN_POSITIVE);

        let mut lower = Array2::zeros((n, n));
        for j in 0..n {
            let mut diag = a[[j, j]];
            for k in 0..j {
                diag -= lower[[j, k]] * lower[[j, k]];
            }

            if !diag.is_finite() || diag <= min_pivot {
                return Err(SurvivalError::convergence(format!(
                    "information matrix is singular or not positive definite (pivot {} = {:e})",
                    j, diag
                )));
            }

            let ljj = diag.sqrt();
            lower[[j, j]] = ljj;

            for i in (j + 1)..n {
                let mut sum = a[[i, j]];
                for k in 0..j {
                    sum -= lower[[i, k]] * lower[[j, k]];
                }
                lower[[i, j]] = sum / ljj;
            }
        }

        Ok(Self { lower })
    }

    pub fn dim(&self) -> usize {
        self.lower.nrows()
    }

    /// solve `a x = b`
    pub fn solve(&self, b: &Array1<f64>) -> Result<Array1<f64>> {
        let n = self.dim();
        if b.len() != n {
            return Err(SurvivalError::invalid_dimensions(format!(
                "rhs has {} entries, matrix is {}x{}",
                b.len(),
                n,
                n
            )));
        }

        // forward: L y = b
        let mut y = Array1::zeros(n);
        for i in 0..n {
            let mut sum = b[i];
            for k in 0..i {
                sum -= self.lower[[i, k]] * y[k];
            }
            y[i] = sum / self.lower[[i, i]];
        }

        // back: L^T x = y
        let mut x = Array1::zeros(n);
        for i in (0..n).rev() {
            let mut sum = y[i];
            for k in (i + 1)..n {
                sum -= self.lower[[k, i]] * x[k];
            }
            x[i] = sum / self.lower[[i, i]];
        }

        Ok(x)
    }

    /// full inverse, one column at a time
    pub fn inverse(&self) -> Result<Array2<f64>> {
        let n = self.dim();
        let mut inv = Array2::zeros((n, n));
        for j in 0..n {
            let mut e = Array1::zeros(n);
            e[j] = 1.0;
            let col = self.solve(&e)?;
            inv.column_mut(j).assign(&col);
        }
        Ok(inv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_solve_spd() {
        let a = Array2::from_shape_vec((2, 2), vec![4.0, 2.0, 2.0, 3.0]).unwrap();
        let b = Array1::from(vec![2.0, 1.0]);
        let x = Cholesky::factor(&a).unwrap().solve(&b).unwrap();

        // 4x + 2y = 2, 2x + 3y = 1 -> x = 0.5, y = 0
        assert_relative_eq!(x[0], 0.5, epsilon = 1e-12);
        assert_relative_eq!(x[1], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_inverse() {
        let a = Array2::from_shape_vec(
            (3, 3),
            vec![6.0, 2.0, 1.0, 2.0, 5.0, 2.0, 1.0, 2.0, 4.0],
        )
        .unwrap();
        let inv = Cholesky::factor(&a).unwrap().inverse().unwrap();
        let identity = a.dot(&inv);

        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_relative_eq!(identity[[i, j]], expected, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_singular_matrix() {
        // rank one - collinear columns
        let a = Array2::from_shape_vec((2, 2), vec![1.0, 2.0, 2.0, 4.0]).unwrap();
        let err = Cholesky::factor(&a).unwrap_err();
        assert_eq!(err.kind(), "ConvergenceError");
    }

    #[test]
    fn test_indefinite_matrix() {
        let a = Array2::from_shape_vec((2, 2), vec![1.0, 0.0, 0.0, -1.0]).unwrap();
        assert!(Cholesky::factor(&a).is_err());
    }
}
