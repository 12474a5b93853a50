// prog_core/src/estimation/mod.rs

//! State estimation: fuse a prior state distribution with a stream of
//! `(time, input, measured output)` triples.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Deserializer};
use std::sync::Arc;

use crate::error::{ProgError, Result};
use crate::models::{check_model, PrognosticsModel};
use crate::types::{Input, Output, State};
use crate::uncertain_data::{UncertainData, UnweightedSamples};

pub mod filters;
pub mod resampling;
pub mod sigma_points;

pub use filters::kf::{KalmanFilter, KalmanFilterConfig};
pub use filters::pf::{NoiseStd, ParticleFilter, ParticleFilterConfig};
pub use filters::ukf::{UkfConfig, UnscentedKalmanFilter};
pub use resampling::ResamplingStrategy;
pub use sigma_points::{MerweScaledSigmaPoints, SigmaPointParams};

/// Maps a state to what is actually measured, when that differs from the
/// model's output (different units, a subset of the outputs, ...).
pub type MeasurementEqn = Arc<dyn Fn(&State) -> DVector<f64> + Send + Sync>;

/// The contract for any algorithm that performs the "State Estimator" role.
pub trait StateEstimator: Send + Sync {
    /// Performs one estimation step. `t` must be strictly greater than the
    /// last time the estimator has seen.
    ///
    /// # Arguments
    /// * `t`: Current time (s).
    /// * `u`: Measured inputs, ordered by the model's `inputs()`.
    /// * `z`: Measured outputs, ordered by the model's `outputs()` (or by the
    ///   measurement equation, when one was supplied).
    fn estimate(&mut self, t: f64, u: &Input, z: &Output) -> Result<()>;

    /// The current state estimate.
    fn x(&self) -> UncertainData;

    /// The time of the last estimate.
    fn t(&self) -> f64;
}

/// Returns `t - last`, or an ordering error when time does not advance.
pub(crate) fn step_dt(last: f64, t: f64) -> Result<f64> {
    if t > last {
        Ok(t - last)
    } else {
        Err(ProgError::NonIncreasingTime { last, t })
    }
}

/// The initial state expressed in model state order.
pub(crate) struct Prior {
    pub mean: DVector<f64>,
    pub cov: DMatrix<f64>,
    /// True when the prior carries no spread (a point mass).
    pub is_point: bool,
}

/// Positions of every model state inside the prior's key list.
fn state_mapping(model: &dyn PrognosticsModel, keys: &[String]) -> Result<Vec<usize>> {
    model
        .states()
        .iter()
        .map(|state| {
            keys.iter()
                .position(|k| k == state)
                .ok_or_else(|| ProgError::MissingState(state.clone()))
        })
        .collect()
}

/// Checks the model and reorders the prior's mean and covariance into model
/// state order.
pub(crate) fn prior_in_model_order(model: &dyn PrognosticsModel, x0: &UncertainData) -> Result<Prior> {
    check_model(model)?;
    let mapping = state_mapping(model, x0.keys())?;
    let mean = x0.mean();
    let cov = x0.cov();
    let n = mapping.len();
    Ok(Prior {
        mean: DVector::from_fn(n, |i, _| mean.values()[mapping[i]]),
        cov: DMatrix::from_fn(n, n, |i, j| cov[(mapping[i], mapping[j])]),
        is_point: matches!(x0, UncertainData::Scalar(_)),
    })
}

/// Reorders every sample of a set into model state order.
pub(crate) fn samples_in_model_order(
    model: &dyn PrognosticsModel,
    samples: &UnweightedSamples,
) -> Result<Vec<State>> {
    let mapping = state_mapping(model, samples.keys())?;
    Ok(samples
        .iter()
        .map(|s| DVector::from_fn(mapping.len(), |i, _| s[mapping[i]]))
        .collect())
}

/// Reads an optional noise covariance written as its diagonal.
pub(crate) fn diagonal_matrix<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<DMatrix<f64>>, D::Error> {
    let diagonal: Option<Vec<f64>> = Option::deserialize(deserializer)?;
    Ok(diagonal.map(|d| DMatrix::from_diagonal(&DVector::from_vec(d))))
}

/// Checks a square noise matrix against the expected dimension.
pub(crate) fn check_square(context: &'static str, m: &DMatrix<f64>, dim: usize) -> Result<()> {
    if m.nrows() != dim || m.ncols() != dim {
        return Err(ProgError::DimensionMismatch {
            context,
            expected: dim,
            actual: m.nrows().max(m.ncols()),
        });
    }
    Ok(())
}
