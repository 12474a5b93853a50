// prog_core/src/estimation/sigma_points.rs

use nalgebra::{DMatrix, DVector};
use serde::Deserialize;

use crate::error::{ProgError, Result};
use crate::utils::linalg::{psd_sqrt, symmetrize};

/// Configuration parameters for sigma point generation.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SigmaPointParams {
    pub alpha: f64, // Spreading of sigma points around the mean
    pub beta: f64,  // Prior knowledge of the distribution (2.0 is optimal for Gaussian)
    pub kappa: f64, // Secondary scaling parameter
}

impl Default for SigmaPointParams {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            beta: 0.0,
            kappa: 0.0,
        }
    }
}

/// Van der Merwe's scaled sigma points for an `n`-dimensional distribution,
/// together with their mean and covariance weights.
#[derive(Debug, Clone)]
pub struct MerweScaledSigmaPoints {
    n: usize,
    lambda: f64,
    /// Weights for calculating the mean from sigma points.
    weights_m: DVector<f64>,
    /// Weights for calculating the covariance from sigma points.
    weights_c: DVector<f64>,
}

impl MerweScaledSigmaPoints {
    pub fn new(n: usize, params: SigmaPointParams) -> Result<Self> {
        let n_f = n as f64;
        let lambda = params.alpha.powi(2) * (n_f + params.kappa) - n_f;
        if !(n_f + lambda > 0.0) {
            return Err(ProgError::InvalidConfig(format!(
                "sigma point scaling requires n + lambda > 0 (n = {n}, alpha = {}, kappa = {})",
                params.alpha, params.kappa
            )));
        }

        // Calculate the weights for the 2n+1 sigma points.
        let mut weights_m = DVector::from_element(2 * n + 1, 0.5 / (n_f + lambda));
        let mut weights_c = DVector::from_element(2 * n + 1, 0.5 / (n_f + lambda));
        weights_m[0] = lambda / (n_f + lambda);
        weights_c[0] = weights_m[0] + (1.0 - params.alpha.powi(2) + params.beta);

        Ok(Self {
            n,
            lambda,
            weights_m,
            weights_c,
        })
    }

    pub fn dim(&self) -> usize {
        self.n
    }

    /// Number of sigma points, `2n + 1`.
    pub fn num_points(&self) -> usize {
        2 * self.n + 1
    }

    pub fn weights_m(&self) -> &DVector<f64> {
        &self.weights_m
    }

    pub fn weights_c(&self) -> &DVector<f64> {
        &self.weights_c
    }

    /// Generates the `2n+1` sigma points (one per column) of `(mean, cov)`.
    ///
    /// The square root of `cov` falls back to an eigendecomposition when the
    /// Cholesky factorization fails, so a singular covariance collapses the
    /// points along its null space instead of failing.
    pub fn generate(&self, mean: &DVector<f64>, cov: &DMatrix<f64>) -> DMatrix<f64> {
        let n = self.n;
        let mut sigma_points = DMatrix::zeros(n, 2 * n + 1);

        // "Square root" of the covariance matrix: P = S * S^T
        let scaled = psd_sqrt(cov) * (n as f64 + self.lambda).sqrt();

        // First point is the mean.
        sigma_points.column_mut(0).copy_from(mean);

        // The other 2n points are spread around the mean.
        for i in 0..n {
            sigma_points
                .column_mut(i + 1)
                .copy_from(&(mean + scaled.column(i)));
            sigma_points
                .column_mut(i + n + 1)
                .copy_from(&(mean - scaled.column(i)));
        }

        sigma_points
    }

    /// Recovers a mean and (symmetrized) covariance from transformed sigma
    /// points, adding `noise` to the covariance when given.
    pub fn unscented_transform(
        &self,
        points: &DMatrix<f64>,
        noise: Option<&DMatrix<f64>>,
    ) -> (DVector<f64>, DMatrix<f64>) {
        let dim = points.nrows();
        let mean = points * &self.weights_m;
        let mut cov = DMatrix::zeros(dim, dim);
        for (i, col) in points.column_iter().enumerate() {
            let diff = col - &mean;
            cov += self.weights_c[i] * &diff * diff.transpose();
        }
        if let Some(noise) = noise {
            cov += noise;
        }
        (mean, symmetrize(&cov))
    }

    /// Cross-covariance between two sets of transformed sigma points.
    pub fn cross_covariance(
        &self,
        x_points: &DMatrix<f64>,
        x_mean: &DVector<f64>,
        z_points: &DMatrix<f64>,
        z_mean: &DVector<f64>,
    ) -> DMatrix<f64> {
        let mut t_cov = DMatrix::zeros(x_points.nrows(), z_points.nrows());
        for i in 0..x_points.ncols() {
            let diff_x = x_points.column(i) - x_mean;
            let diff_z = z_points.column(i) - z_mean;
            t_cov += self.weights_c[i] * &diff_x * diff_z.transpose();
        }
        t_cov
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_weights_sum_to_one() {
        let sp = MerweScaledSigmaPoints::new(
            3,
            SigmaPointParams {
                alpha: 0.5,
                beta: 2.0,
                kappa: 1.0,
            },
        )
        .unwrap();
        assert_abs_diff_eq!(sp.weights_m().sum(), 1.0, epsilon = 1e-12);
        assert_eq!(sp.num_points(), 7);
    }

    #[test]
    fn test_transform_recovers_moments() {
        let sp = MerweScaledSigmaPoints::new(2, SigmaPointParams::default()).unwrap();
        let mean = DVector::from_vec(vec![1.0, -2.0]);
        let cov = DMatrix::from_row_slice(2, 2, &[2.0, 0.3, 0.3, 0.5]);
        let points = sp.generate(&mean, &cov);
        let (m, p) = sp.unscented_transform(&points, None);
        assert_abs_diff_eq!(m, mean, epsilon = 1e-12);
        assert_abs_diff_eq!(p, cov, epsilon = 1e-12);
    }

    #[test]
    fn test_zero_covariance_collapses_points() {
        let sp = MerweScaledSigmaPoints::new(2, SigmaPointParams::default()).unwrap();
        let mean = DVector::from_vec(vec![4.0, 5.0]);
        let points = sp.generate(&mean, &DMatrix::zeros(2, 2));
        for col in points.column_iter() {
            assert_abs_diff_eq!(col.into_owned(), mean.clone(), epsilon = 1e-12);
        }
    }

    #[test]
    fn test_invalid_scaling_is_rejected() {
        let params = SigmaPointParams {
            alpha: 1.0,
            beta: 0.0,
            kappa: -1.0,
        };
        assert!(MerweScaledSigmaPoints::new(1, params).is_err());
        assert!(MerweScaledSigmaPoints::new(2, params).is_ok());
    }
}
