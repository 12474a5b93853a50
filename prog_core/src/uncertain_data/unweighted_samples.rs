// prog_core/src/uncertain_data/unweighted_samples.rs

use nalgebra::{DMatrix, DVector};
use rand::Rng;
use std::ops::Index;
use tracing::warn;

use crate::error::{ProgError, Result};
use crate::types::NamedVector;

/// Uncertain data represented by an ordered collection of concrete samples
/// ("particles"), all sharing one key layout.
///
/// Undefined entries (e.g., an event that never occurred for a sample) are
/// stored as NaN. The statistics skip them and warn that the result is then
/// biased toward the defined samples.
#[derive(Debug, Clone, PartialEq)]
pub struct UnweightedSamples {
    keys: Vec<String>,
    samples: Vec<DVector<f64>>,
}

impl UnweightedSamples {
    /// Creates a sample set, checking that every sample matches the key layout.
    pub fn new(keys: Vec<String>, samples: Vec<DVector<f64>>) -> Result<Self> {
        if let Some(bad) = samples.iter().find(|s| s.nrows() != keys.len()) {
            return Err(ProgError::DimensionMismatch {
                context: "UnweightedSamples::new",
                expected: keys.len(),
                actual: bad.nrows(),
            });
        }
        Ok(Self { keys, samples })
    }

    /// An empty sample set with a fixed key layout.
    pub fn empty(keys: Vec<String>) -> Self {
        Self {
            keys,
            samples: Vec::new(),
        }
    }

    /// Builds a sample set from the columns of a matrix (one column per sample).
    pub fn from_columns(keys: Vec<String>, columns: &DMatrix<f64>) -> Result<Self> {
        let samples = columns.column_iter().map(|c| c.into_owned()).collect();
        Self::new(keys, samples)
    }

    pub(crate) fn from_parts_unchecked(keys: Vec<String>, samples: Vec<DVector<f64>>) -> Self {
        Self { keys, samples }
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&DVector<f64>> {
        self.samples.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DVector<f64>> {
        self.samples.iter()
    }

    pub fn as_slice(&self) -> &[DVector<f64>] {
        &self.samples
    }

    /// Appends one sample. Existing samples are never modified.
    pub fn push(&mut self, sample: DVector<f64>) -> Result<()> {
        if sample.nrows() != self.keys.len() {
            return Err(ProgError::DimensionMismatch {
                context: "UnweightedSamples::push",
                expected: self.keys.len(),
                actual: sample.nrows(),
            });
        }
        self.samples.push(sample);
        Ok(())
    }

    /// All values of one key, in sample order. Undefined values read as `None`.
    pub fn key(&self, key: &str) -> Option<Vec<Option<f64>>> {
        let idx = self.keys.iter().position(|k| k == key)?;
        Some(
            self.samples
                .iter()
                .map(|s| Some(s[idx]).filter(|v| !v.is_nan()))
                .collect(),
        )
    }

    /// The samples as a matrix, one column per sample.
    pub fn to_matrix(&self) -> DMatrix<f64> {
        if self.samples.is_empty() {
            return DMatrix::zeros(self.keys.len(), 0);
        }
        DMatrix::from_columns(&self.samples)
    }

    /// Draws `num_samples` samples uniformly with replacement.
    pub fn sample<R: Rng + ?Sized>(&self, num_samples: usize, rng: &mut R) -> Result<Self> {
        if self.samples.is_empty() {
            return Err(ProgError::EmptyData("cannot resample an empty sample set"));
        }
        let drawn = (0..num_samples)
            .map(|_| self.samples[rng.gen_range(0..self.samples.len())].clone())
            .collect();
        Ok(Self::from_parts_unchecked(self.keys.clone(), drawn))
    }

    /// Empirical mean per key over the defined values of that key.
    pub fn mean(&self) -> NamedVector {
        let mut mean = DVector::from_element(self.keys.len(), f64::NAN);
        let mut skipped = false;
        for (i, m) in mean.iter_mut().enumerate() {
            let (sum, count) = self
                .samples
                .iter()
                .map(|s| s[i])
                .filter(|v| !v.is_nan())
                .fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
            skipped |= count < self.samples.len();
            if count > 0 {
                *m = sum / count as f64;
            }
        }
        if skipped {
            warn!("Some samples were undefined; the mean covers only the defined samples and may be biased");
        }
        NamedVector::new_unchecked(self.keys.clone(), mean)
    }

    /// Empirical covariance (unbiased, `n - 1` denominator) ordered by `keys()`.
    /// Only samples with every value defined take part.
    pub fn cov(&self) -> DMatrix<f64> {
        let n_keys = self.keys.len();
        let complete: Vec<&DVector<f64>> = self
            .samples
            .iter()
            .filter(|s| s.iter().all(|v| !v.is_nan()))
            .collect();
        if complete.len() < self.samples.len() {
            warn!("Some samples were undefined; the covariance covers only the complete samples and may be biased");
        }
        if complete.len() < 2 {
            return DMatrix::zeros(n_keys, n_keys);
        }

        let n = complete.len() as f64;
        let mean = complete
            .iter()
            .fold(DVector::<f64>::zeros(n_keys), |acc, s| acc + *s)
            / n;
        let mut cov = DMatrix::<f64>::zeros(n_keys, n_keys);
        for s in &complete {
            let diff = *s - &mean;
            cov += &diff * diff.transpose();
        }
        cov / (n - 1.0)
    }

    /// Sample standard deviation per key (square root of the covariance diagonal).
    pub fn std(&self) -> NamedVector {
        let std = self.cov().diagonal().map(f64::sqrt);
        NamedVector::new_unchecked(self.keys.clone(), std)
    }

    /// The sample minimizing the total squared distance to all others.
    ///
    /// This is O(n^2) in the number of samples. Undefined coordinates are left
    /// out of the distance.
    pub fn median(&self) -> Result<NamedVector> {
        let mut best: Option<(usize, f64)> = None;
        for (i, candidate) in self.samples.iter().enumerate() {
            let total: f64 = self
                .samples
                .iter()
                .map(|other| {
                    candidate
                        .iter()
                        .zip(other.iter())
                        .filter(|(a, b)| !a.is_nan() && !b.is_nan())
                        .map(|(a, b)| (a - b).powi(2))
                        .sum::<f64>()
                })
                .sum();
            if best.map_or(true, |(_, d)| total < d) {
                best = Some((i, total));
            }
        }
        let (idx, _) = best.ok_or(ProgError::EmptyData("median of an empty sample set"))?;
        Ok(NamedVector::new_unchecked(
            self.keys.clone(),
            self.samples[idx].clone(),
        ))
    }

    /// Fraction of all samples whose value lies inside the (inclusive) bounds, per key.
    pub fn percentage_in_bounds(&self, bounds: &[(f64, f64)]) -> Result<Vec<f64>> {
        if self.samples.is_empty() {
            return Err(ProgError::EmptyData("percentage in bounds of an empty sample set"));
        }
        let bounds = super::expand_bounds(bounds, self.keys.len())?;
        let n = self.samples.len() as f64;
        Ok(bounds
            .iter()
            .enumerate()
            .map(|(i, (lo, hi))| {
                let inside = self
                    .samples
                    .iter()
                    .filter(|s| *lo <= s[i] && s[i] <= *hi)
                    .count();
                inside as f64 / n
            })
            .collect())
    }
}

impl Index<usize> for UnweightedSamples {
    type Output = DVector<f64>;

    fn index(&self, index: usize) -> &Self::Output {
        &self.samples[index]
    }
}

impl<'a> IntoIterator for &'a UnweightedSamples {
    type Item = &'a DVector<f64>;
    type IntoIter = std::slice::Iter<'a, DVector<f64>>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::names;
    use approx::assert_abs_diff_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn one_key(values: &[f64]) -> UnweightedSamples {
        let samples = values.iter().map(|v| DVector::from_vec(vec![*v])).collect();
        UnweightedSamples::new(names(&["a"]), samples).unwrap()
    }

    #[test]
    fn test_mean_and_std_of_zero_to_nine() {
        let values: Vec<f64> = (0..10).map(f64::from).collect();
        let s = one_key(&values);
        assert_abs_diff_eq!(s.mean().get("a").unwrap(), 4.5, epsilon = 1e-12);

        // Closed-form sample standard deviation: sqrt(sum((x - 4.5)^2) / 9)
        let expected = (values.iter().map(|x| (x - 4.5).powi(2)).sum::<f64>() / 9.0).sqrt();
        assert_abs_diff_eq!(s.std().get("a").unwrap(), expected, epsilon = 1e-12);
    }

    #[test]
    fn test_sample_returns_requested_count_and_keeps_keys() {
        let s = one_key(&[1.0, 2.0, 3.0]);
        let keys_before = s.keys().to_vec();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let drawn = s.sample(25, &mut rng).unwrap();
        assert_eq!(drawn.len(), 25);
        let _ = s.mean();
        let _ = s.cov();
        assert_eq!(s.keys(), keys_before.as_slice());
        assert_eq!(drawn.keys(), keys_before.as_slice());
    }

    #[test]
    fn test_median_is_central_sample() {
        let samples = vec![
            DVector::from_vec(vec![1.0, 2.0]),
            DVector::from_vec(vec![2.0, 3.0]),
            DVector::from_vec(vec![3.0, 4.0]),
        ];
        let s = UnweightedSamples::new(names(&["a", "b"]), samples).unwrap();
        let median = s.median().unwrap();
        assert_eq!(median.get("a"), Some(2.0));
        assert_eq!(median.get("b"), Some(3.0));
    }

    #[test]
    fn test_cov_of_two_keys() {
        let samples = vec![
            DVector::from_vec(vec![1.0, 2.0]),
            DVector::from_vec(vec![3.0, 6.0]),
        ];
        let s = UnweightedSamples::new(names(&["a", "b"]), samples).unwrap();
        let cov = s.cov();
        assert_abs_diff_eq!(cov[(0, 0)], 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(cov[(0, 1)], 4.0, epsilon = 1e-12);
        assert_abs_diff_eq!(cov[(1, 1)], 8.0, epsilon = 1e-12);
    }

    #[test]
    fn test_undefined_values_are_skipped() {
        let s = one_key(&[1.0, f64::NAN, 3.0]);
        assert_abs_diff_eq!(s.mean().get("a").unwrap(), 2.0, epsilon = 1e-12);
        assert_eq!(s.key("a").unwrap(), vec![Some(1.0), None, Some(3.0)]);
        // Undefined samples count against the in-bounds fraction.
        let pib = s.percentage_in_bounds(&[(0.0, 10.0)]).unwrap();
        assert_abs_diff_eq!(pib[0], 2.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_push_rejects_wrong_layout() {
        let mut s = UnweightedSamples::empty(names(&["a", "b"]));
        assert!(s.push(DVector::from_vec(vec![1.0])).is_err());
        assert!(s.push(DVector::from_vec(vec![1.0, 2.0])).is_ok());
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn test_empty_set_errors() {
        let s = UnweightedSamples::empty(names(&["a"]));
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert!(s.sample(3, &mut rng).is_err());
        assert!(s.median().is_err());
    }
}
