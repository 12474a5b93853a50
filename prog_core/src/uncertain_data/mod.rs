// prog_core/src/uncertain_data/mod.rs

//! Probability distributions over a fixed, ordered set of named variables.
//!
//! Every state, time-of-event and trajectory snapshot that crosses a component
//! boundary is one of these, never a bare vector, so uncertainty is never
//! silently dropped between the estimator and the predictor.

use nalgebra::DMatrix;
use rand::Rng;
use std::collections::BTreeMap;

use crate::error::{ProgError, Result};
use crate::metrics::{calc_metrics, Metrics};
use crate::types::NamedVector;

mod multivariate_normal;
mod scalar;
mod unweighted_samples;

pub use multivariate_normal::MultivariateNormalDist;
pub use scalar::ScalarData;
pub use unweighted_samples::UnweightedSamples;

/// The closed set of distribution representations.
///
/// Consumers rely only on the shared operations (`keys`, `sample`, `mean`,
/// `median`, `cov`); matching on the variant is reserved for cheap shortcuts
/// such as reusing an existing sample set instead of resampling it.
#[derive(Debug, Clone, PartialEq)]
pub enum UncertainData {
    /// A point mass.
    Scalar(ScalarData),
    /// An explicit set of samples.
    Samples(UnweightedSamples),
    /// A multivariate normal distribution.
    Normal(MultivariateNormalDist),
}

impl UncertainData {
    /// The ordered variable names. Stable for the lifetime of the object.
    pub fn keys(&self) -> &[String] {
        match self {
            Self::Scalar(d) => d.keys(),
            Self::Samples(d) => d.keys(),
            Self::Normal(d) => d.keys(),
        }
    }

    /// Number of variables.
    pub fn len(&self) -> usize {
        self.keys().len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys().is_empty()
    }

    /// Draws `num_samples` concrete observations.
    pub fn sample<R: Rng + ?Sized>(&self, num_samples: usize, rng: &mut R) -> Result<UnweightedSamples> {
        match self {
            Self::Scalar(d) => Ok(d.sample(num_samples)),
            Self::Samples(d) => d.sample(num_samples, rng),
            Self::Normal(d) => Ok(d.sample(num_samples, rng)),
        }
    }

    /// Expected value of every variable.
    pub fn mean(&self) -> NamedVector {
        match self {
            Self::Scalar(d) => d.mean(),
            Self::Samples(d) => d.mean(),
            Self::Normal(d) => d.mean(),
        }
    }

    pub fn median(&self) -> Result<NamedVector> {
        match self {
            Self::Scalar(d) => Ok(d.median()),
            Self::Samples(d) => d.median(),
            Self::Normal(d) => Ok(d.median()),
        }
    }

    /// Covariance matrix ordered by `keys()`.
    pub fn cov(&self) -> DMatrix<f64> {
        match self {
            Self::Scalar(d) => d.cov(),
            Self::Samples(d) => d.cov(),
            Self::Normal(d) => d.cov().clone(),
        }
    }

    /// Fraction of the distribution inside `[lower, upper]` (inclusive), per key.
    ///
    /// `bounds` is either one pair applied to every key or one pair per key.
    /// Continuous distributions are estimated from `n_samples` draws.
    pub fn percentage_in_bounds<R: Rng + ?Sized>(
        &self,
        bounds: &[(f64, f64)],
        n_samples: usize,
        rng: &mut R,
    ) -> Result<Vec<f64>> {
        match self {
            Self::Scalar(d) => d.percentage_in_bounds(bounds),
            Self::Samples(d) => d.percentage_in_bounds(bounds),
            Self::Normal(d) => d.sample(n_samples, rng).percentage_in_bounds(bounds),
        }
    }

    /// The distribution as a concrete sample set: sample sets are returned as-is,
    /// anything else is sampled `n_samples` times.
    pub fn to_samples<R: Rng + ?Sized>(&self, n_samples: usize, rng: &mut R) -> Result<UnweightedSamples> {
        match self {
            Self::Samples(d) => Ok(d.clone()),
            other => other.sample(n_samples, rng),
        }
    }

    /// Summary statistics of every variable. See [`calc_metrics`].
    pub fn metrics<R: Rng + ?Sized>(
        &self,
        ground_truth: Option<&NamedVector>,
        n_samples: usize,
        rng: &mut R,
    ) -> Result<BTreeMap<String, Metrics>> {
        calc_metrics(self, ground_truth, n_samples, rng)
    }

    /// Position of `key` in `keys()`.
    pub fn index_of(&self, key: &str) -> Option<usize> {
        self.keys().iter().position(|k| k == key)
    }
}

impl From<ScalarData> for UncertainData {
    fn from(d: ScalarData) -> Self {
        Self::Scalar(d)
    }
}

impl From<UnweightedSamples> for UncertainData {
    fn from(d: UnweightedSamples) -> Self {
        Self::Samples(d)
    }
}

impl From<MultivariateNormalDist> for UncertainData {
    fn from(d: MultivariateNormalDist) -> Self {
        Self::Normal(d)
    }
}

/// A bare keyed value is wrapped as a point mass.
impl From<NamedVector> for UncertainData {
    fn from(v: NamedVector) -> Self {
        Self::Scalar(ScalarData::new(v))
    }
}

/// Broadcasts a single bounds pair to every key, or checks one pair per key.
pub(crate) fn expand_bounds(bounds: &[(f64, f64)], n_keys: usize) -> Result<Vec<(f64, f64)>> {
    match bounds.len() {
        1 => Ok(vec![bounds[0]; n_keys]),
        n if n == n_keys => Ok(bounds.to_vec()),
        n => Err(ProgError::DimensionMismatch {
            context: "bounds",
            expected: n_keys,
            actual: n,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::names;
    use nalgebra::DVector;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn variants() -> Vec<UncertainData> {
        let keys = names(&["a", "b"]);
        vec![
            NamedVector::from_pairs([("a", 1.0), ("b", 2.0)]).into(),
            UnweightedSamples::new(
                keys.clone(),
                vec![
                    DVector::from_vec(vec![1.0, 2.0]),
                    DVector::from_vec(vec![3.0, 4.0]),
                ],
            )
            .unwrap()
            .into(),
            MultivariateNormalDist::new(
                keys,
                DVector::from_vec(vec![1.0, 2.0]),
                DMatrix::identity(2, 2) * 0.5,
            )
            .unwrap()
            .into(),
        ]
    }

    #[test]
    fn test_sample_count_and_read_only_keys() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        for data in variants() {
            let keys_before = data.keys().to_vec();
            for n in [1, 7, 100] {
                let samples = data.sample(n, &mut rng).unwrap();
                assert_eq!(samples.len(), n);
                assert_eq!(samples.keys(), keys_before.as_slice());
            }
            let _ = data.mean();
            let _ = data.cov();
            let _ = data.median().unwrap();
            assert_eq!(data.keys(), keys_before.as_slice());
        }
    }

    #[test]
    fn test_cov_is_square_in_key_order() {
        for data in variants() {
            let cov = data.cov();
            assert_eq!(cov.shape(), (2, 2));
        }
    }

    #[test]
    fn test_scalar_samples_all_equal_mean() {
        let data: UncertainData = NamedVector::from_pairs([("x", 3.5)]).into();
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let samples = data.sample(50, &mut rng).unwrap();
        assert!(samples.iter().all(|s| s == data.mean().values()));
        assert_eq!(data.cov(), DMatrix::zeros(1, 1));
    }

    #[test]
    fn test_to_samples_reuses_existing_set() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let data = &variants()[1];
        let samples = data.to_samples(1000, &mut rng).unwrap();
        assert_eq!(samples.len(), 2);
    }
}
