// prog_core/src/metrics/mod.rs

//! Summary statistics of distributions, and accuracy metrics for time-of-event
//! predictions against a known ground truth.

use rand::Rng;
use std::collections::BTreeMap;
use tracing::warn;

use crate::error::{ProgError, Result};
use crate::types::NamedVector;
use crate::uncertain_data::UncertainData;

pub mod profile;
pub mod toe;

pub use profile::{alpha_lambda, cumulative_relative_accuracy, monotonicity, prognostic_horizon};
pub use toe::prob_success;

/// Order statistics of a sample. A percentile is `None` when there are too
/// few samples to resolve it.
#[derive(Debug, Clone, PartialEq)]
pub struct Percentiles {
    pub p0_01: Option<f64>,
    pub p0_1: Option<f64>,
    pub p1: Option<f64>,
    pub p10: Option<f64>,
    pub p25: Option<f64>,
    pub p50: f64,
    pub p75: Option<f64>,
}

/// Metrics that compare a sample against the true value.
#[derive(Debug, Clone, PartialEq)]
pub struct GroundTruthMetrics {
    pub mean_absolute_error: f64,
    /// Mean absolute error relative to the ground truth.
    pub mean_absolute_percentage_error: f64,
    /// `1 - |ground_truth - mean| / ground_truth`.
    pub relative_accuracy: f64,
    /// Percentile rank (0-100) of the ground truth within the sample.
    pub ground_truth_percentile: f64,
}

/// Summary of one variable of a distribution.
#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    /// Population standard deviation.
    pub std: f64,
    pub percentiles: Percentiles,
    /// Mean absolute distance to the median.
    pub median_absolute_deviation: f64,
    /// Mean absolute distance to the mean.
    pub mean_absolute_deviation: f64,
    pub number_of_samples: usize,
    pub ground_truth: Option<GroundTruthMetrics>,
}

/// Summarizes a sample of scalar values. Undefined values (NaN) are left out.
pub fn calc_value_metrics(values: &[f64], ground_truth: Option<f64>) -> Result<Metrics> {
    let mut data: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if data.len() < values.len() {
        warn!(
            undefined = values.len() - data.len(),
            "Undefined values were left out of the metrics, which may be biased"
        );
    }
    if data.is_empty() {
        return Err(ProgError::EmptyData("metrics need at least one defined value"));
    }
    data.sort_by(f64::total_cmp);

    let len = data.len();
    let n = len as f64;
    let mean = data.iter().sum::<f64>() / n;
    let median = data[len / 2];
    let std = (data.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n).sqrt();
    let percentile = |divisor: usize, numerator: usize| {
        (len >= divisor).then(|| data[numerator * len / divisor])
    };
    let percentiles = Percentiles {
        p0_01: percentile(10_000, 1),
        p0_1: percentile(1_000, 1),
        p1: percentile(100, 1),
        p10: percentile(10, 1),
        p25: percentile(4, 1),
        p50: median,
        p75: percentile(4, 3),
    };

    let ground_truth = ground_truth.map(|gt| {
        let mean_absolute_error = data.iter().map(|x| (x - gt).abs()).sum::<f64>() / n;
        GroundTruthMetrics {
            mean_absolute_error,
            mean_absolute_percentage_error: mean_absolute_error / gt,
            relative_accuracy: 1.0 - (gt - mean).abs() / gt,
            ground_truth_percentile: percentile_of_score(&data, gt),
        }
    });

    Ok(Metrics {
        min: data[0],
        max: data[len - 1],
        mean,
        median,
        std,
        percentiles,
        median_absolute_deviation: data.iter().map(|x| (x - median).abs()).sum::<f64>() / n,
        mean_absolute_deviation: data.iter().map(|x| (x - mean).abs()).sum::<f64>() / n,
        number_of_samples: len,
        ground_truth,
    })
}

/// Percentile rank of `score`, averaging ties ("rank" convention).
fn percentile_of_score(sorted: &[f64], score: f64) -> f64 {
    let below = sorted.partition_point(|x| *x < score);
    let at_or_below = sorted.partition_point(|x| *x <= score);
    let tie = usize::from(at_or_below > below);
    (below + at_or_below + tie) as f64 * 50.0 / sorted.len() as f64
}

/// Summarizes every variable of a distribution.
///
/// Sample sets are used as-is; any other distribution is sampled `n_samples`
/// times. The mean and median come from the distribution itself when it
/// defines them. `ground_truth` keys that are absent skip the ground-truth
/// metrics for that variable. A variable with no defined value at all (an
/// event that was never reached) is left out of the result.
pub fn calc_metrics<R: Rng + ?Sized>(
    data: &UncertainData,
    ground_truth: Option<&NamedVector>,
    n_samples: usize,
    rng: &mut R,
) -> Result<BTreeMap<String, Metrics>> {
    let samples = data.to_samples(n_samples, rng)?;
    let mean = data.mean();
    let median = data.median()?;

    let mut result = BTreeMap::new();
    for key in data.keys() {
        let values: Vec<f64> = samples
            .key(key)
            .unwrap_or_default()
            .into_iter()
            .map(|v| v.unwrap_or(f64::NAN))
            .collect();
        if values.iter().all(|v| v.is_nan()) {
            warn!(key = key.as_str(), "No defined values; left out of the metrics");
            continue;
        }
        let mut metrics = calc_value_metrics(&values, ground_truth.and_then(|gt| gt.get(key)))?;
        if let Some(m) = mean.get(key) {
            metrics.mean = m;
        }
        if let Some(m) = median.get(key) {
            metrics.median = m;
            metrics.percentiles.p50 = m;
        }
        result.insert(key.clone(), metrics);
    }
    Ok(result)
}

/// Mean of the squared errors of point predictions against the ground truth.
pub fn mean_square_error(values: &[f64], ground_truth: f64) -> Result<f64> {
    if values.is_empty() {
        return Err(ProgError::EmptyData("mean square error of no values"));
    }
    Ok(values.iter().map(|v| (v - ground_truth).powi(2)).sum::<f64>() / values.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::names;
    use crate::uncertain_data::{MultivariateNormalDist, UnweightedSamples};
    use approx::assert_abs_diff_eq;
    use nalgebra::{DMatrix, DVector};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_value_metrics() {
        let values: Vec<f64> = (0..10_i32).map(f64::from).collect();
        let m = calc_value_metrics(&values, Some(5.0)).unwrap();
        assert_eq!(m.min, 0.0);
        assert_eq!(m.max, 9.0);
        assert_abs_diff_eq!(m.mean, 4.5);
        assert_eq!(m.median, 5.0);
        assert_abs_diff_eq!(m.std, 8.25_f64.sqrt(), epsilon = 1e-12);
        assert_eq!(m.percentiles.p10, Some(1.0));
        assert_eq!(m.percentiles.p25, Some(2.0));
        assert_eq!(m.percentiles.p75, Some(7.0));
        assert_eq!(m.percentiles.p1, None);
        assert_abs_diff_eq!(m.median_absolute_deviation, 2.5);
        assert_abs_diff_eq!(m.mean_absolute_deviation, 2.5);
        assert_eq!(m.number_of_samples, 10);

        let gt = m.ground_truth.unwrap();
        assert_abs_diff_eq!(gt.mean_absolute_error, 2.5);
        assert_abs_diff_eq!(gt.mean_absolute_percentage_error, 0.5);
        assert_abs_diff_eq!(gt.relative_accuracy, 0.9);
        assert_abs_diff_eq!(gt.ground_truth_percentile, 60.0);
    }

    #[test]
    fn test_undefined_values_are_skipped() {
        let m = calc_value_metrics(&[1.0, f64::NAN, 3.0], None).unwrap();
        assert_eq!(m.number_of_samples, 2);
        assert_abs_diff_eq!(m.mean, 2.0);
        assert!(m.ground_truth.is_none());
        assert_eq!(
            calc_value_metrics(&[f64::NAN], None),
            Err(ProgError::EmptyData("metrics need at least one defined value"))
        );
    }

    #[test]
    fn test_distribution_mean_overrides_sample_mean() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let data: UncertainData = MultivariateNormalDist::new(
            names(&["a", "b"]),
            DVector::from_vec(vec![10.0, -3.0]),
            DMatrix::identity(2, 2),
        )
        .unwrap()
        .into();
        let gt = NamedVector::from_pairs([("a", 10.0)]);
        let metrics = calc_metrics(&data, Some(&gt), 10_000, &mut rng).unwrap();
        assert_eq!(metrics["a"].mean, 10.0);
        assert_eq!(metrics["a"].percentiles.p50, 10.0);
        assert!(metrics["a"].percentiles.p0_01.is_some());
        assert_abs_diff_eq!(metrics["a"].std, 1.0, epsilon = 0.05);
        assert!(metrics["a"].ground_truth.is_some());
        assert!(metrics["b"].ground_truth.is_none());
    }

    #[test]
    fn test_sample_sets_are_used_directly() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let data: UncertainData = UnweightedSamples::new(
            names(&["t"]),
            vec![DVector::from_vec(vec![1.0]), DVector::from_vec(vec![2.0])],
        )
        .unwrap()
        .into();
        let metrics = data.metrics(None, 1000, &mut rng).unwrap();
        assert_eq!(metrics["t"].number_of_samples, 2);
    }

    #[test]
    fn test_mean_square_error() {
        assert_abs_diff_eq!(mean_square_error(&[1.0, 3.0], 2.0).unwrap(), 1.0);
        assert!(mean_square_error(&[], 2.0).is_err());
    }
}
