// prog_core/src/uncertain_data/multivariate_normal.rs

use nalgebra::{DMatrix, DVector};
use rand::Rng;
use rand_distr::StandardNormal;

use super::UnweightedSamples;
use crate::error::{ProgError, Result};
use crate::types::NamedVector;
use crate::utils::linalg::psd_sqrt;

/// Data represented by a multivariate normal distribution (mean + covariance).
#[derive(Debug, Clone, PartialEq)]
pub struct MultivariateNormalDist {
    keys: Vec<String>,
    mean: DVector<f64>,
    covar: DMatrix<f64>,
}

impl MultivariateNormalDist {
    /// # Arguments
    /// * `keys`: Labels for the variables, in the order of `mean`.
    /// * `mean`: Mean values in the same order as `keys`.
    /// * `covar`: Covariance matrix, ordered by `keys` along both axes.
    pub fn new(keys: Vec<String>, mean: DVector<f64>, covar: DMatrix<f64>) -> Result<Self> {
        if mean.nrows() != keys.len() {
            return Err(ProgError::DimensionMismatch {
                context: "MultivariateNormalDist mean",
                expected: keys.len(),
                actual: mean.nrows(),
            });
        }
        if covar.nrows() != keys.len() || covar.ncols() != keys.len() {
            return Err(ProgError::DimensionMismatch {
                context: "MultivariateNormalDist covariance",
                expected: keys.len(),
                actual: covar.nrows().max(covar.ncols()),
            });
        }
        Ok(Self { keys, mean, covar })
    }

    pub(crate) fn new_unchecked(keys: Vec<String>, mean: DVector<f64>, covar: DMatrix<f64>) -> Self {
        debug_assert_eq!(keys.len(), mean.nrows());
        Self { keys, mean, covar }
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn mean(&self) -> NamedVector {
        NamedVector::new_unchecked(self.keys.clone(), self.mean.clone())
    }

    /// The median of a Gaussian is its mean.
    pub fn median(&self) -> NamedVector {
        self.mean()
    }

    pub fn mean_vector(&self) -> &DVector<f64> {
        &self.mean
    }

    pub fn cov(&self) -> &DMatrix<f64> {
        &self.covar
    }

    /// Draws `num_samples` points from the Gaussian: `x = mean + S * w`, `w ~ N(0, I)`,
    /// where `S * S^T = covar`. Singular covariances are sampled along their support.
    ///
    /// Variables with an undefined mean or variance (an unresolved time of
    /// event) are left undefined in every sample; the rest are drawn from the
    /// covariance block of the defined variables alone.
    pub fn sample<R: Rng + ?Sized>(&self, num_samples: usize, rng: &mut R) -> UnweightedSamples {
        let defined: Vec<usize> = (0..self.keys.len())
            .filter(|&i| self.mean[i].is_finite() && self.covar[(i, i)].is_finite())
            .collect();
        let m = defined.len();
        let block = DMatrix::from_fn(m, m, |r, c| {
            let v = self.covar[(defined[r], defined[c])];
            if v.is_finite() {
                v
            } else {
                0.0
            }
        });
        let sqrt = psd_sqrt(&block);

        let samples = (0..num_samples)
            .map(|_| {
                let w = DVector::from_fn(m, |_, _| rng.sample::<f64, _>(StandardNormal));
                let offset = &sqrt * w;
                let mut x = DVector::from_element(self.keys.len(), f64::NAN);
                for (r, &i) in defined.iter().enumerate() {
                    x[i] = self.mean[i] + offset[r];
                }
                x
            })
            .collect();
        UnweightedSamples::from_parts_unchecked(self.keys.clone(), samples)
    }
}
