// prog_core/src/prediction/container.rs

use nalgebra::{DMatrix, DVector};
use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::estimation::sigma_points::MerweScaledSigmaPoints;
use crate::types::{NamedVector, State};
use crate::uncertain_data::{MultivariateNormalDist, UncertainData, UnweightedSamples};

/// A map from a state to some derived quantity (output, event state).
pub type StateTransform = Arc<dyn Fn(&State) -> DVector<f64> + Send + Sync>;

// --- Prediction Containers ---
// Every container is indexed by save point: `times()[i]` is the time of
// `snapshot(i)`. Read-only once built.

/// The predicted trajectory of one quantity (input, state, output or event
/// state) across every sample or sigma point.
#[derive(Debug, Clone)]
pub enum Prediction {
    /// One explicit trajectory per sample.
    Samples(UnweightedSamplesPrediction),
    /// One Gaussian per save point.
    Normal(MultivariateNormalDistPrediction),
    /// Gaussians reconstructed from saved state distributions on first access.
    LazyNormal(LazyMultivariateNormalDistPrediction),
}

impl Prediction {
    pub fn times(&self) -> &[f64] {
        match self {
            Self::Samples(p) => p.times(),
            Self::Normal(p) => p.times(),
            Self::LazyNormal(p) => p.times(),
        }
    }

    /// Number of save points.
    pub fn len(&self) -> usize {
        self.times().len()
    }

    pub fn is_empty(&self) -> bool {
        self.times().is_empty()
    }

    /// The distribution across samples at save point `index`.
    pub fn snapshot(&self, index: usize) -> Option<UncertainData> {
        match self {
            Self::Samples(p) => p.snapshot(index).cloned().map(UncertainData::Samples),
            Self::Normal(p) => p.snapshot(index).cloned().map(UncertainData::Normal),
            Self::LazyNormal(p) => p.snapshot(index).cloned().map(UncertainData::Normal),
        }
    }

    /// The mean at every save point.
    pub fn mean(&self) -> Vec<NamedVector> {
        match self {
            Self::Samples(p) => p.mean(),
            Self::Normal(p) => p.mean(),
            Self::LazyNormal(p) => p.mean(),
        }
    }
}

/// Per-sample trajectories stored as `data[sample][time_index]`.
///
/// Samples may stop early (their events came first). The longest time axis
/// is canonical; shorter samples read as undefined past their end.
#[derive(Debug, Clone)]
pub struct UnweightedSamplesPrediction {
    times: Vec<f64>,
    keys: Vec<String>,
    data: Vec<Vec<DVector<f64>>>,
    /// `data[time_index][sample]`, computed on first snapshot.
    transposed: OnceLock<Vec<UnweightedSamples>>,
}

impl UnweightedSamplesPrediction {
    pub fn new(times: Vec<f64>, keys: Vec<String>, data: Vec<Vec<DVector<f64>>>) -> Self {
        Self {
            times,
            keys,
            data,
            transposed: OnceLock::new(),
        }
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn num_samples(&self) -> usize {
        self.data.len()
    }

    /// The trajectory of one sample; `sample(i)[j]` corresponds to `times()[j]`.
    pub fn sample(&self, index: usize) -> Option<&[DVector<f64>]> {
        self.data.get(index).map(Vec::as_slice)
    }

    fn transposed(&self) -> &[UnweightedSamples] {
        self.transposed.get_or_init(|| {
            let undefined = DVector::from_element(self.keys.len(), f64::NAN);
            (0..self.times.len())
                .map(|t| {
                    let column = self
                        .data
                        .iter()
                        .map(|sample| sample.get(t).unwrap_or(&undefined).clone())
                        .collect();
                    UnweightedSamples::from_parts_unchecked(self.keys.clone(), column)
                })
                .collect()
        })
    }

    pub fn snapshot(&self, index: usize) -> Option<&UnweightedSamples> {
        self.transposed().get(index)
    }

    pub fn mean(&self) -> Vec<NamedVector> {
        self.transposed().iter().map(UnweightedSamples::mean).collect()
    }
}

/// One Gaussian per save point.
#[derive(Debug, Clone)]
pub struct MultivariateNormalDistPrediction {
    times: Vec<f64>,
    data: Vec<MultivariateNormalDist>,
}

impl MultivariateNormalDistPrediction {
    pub fn new(times: Vec<f64>, data: Vec<MultivariateNormalDist>) -> Self {
        Self { times, data }
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn snapshot(&self, index: usize) -> Option<&MultivariateNormalDist> {
        self.data.get(index)
    }

    pub fn mean(&self) -> Vec<NamedVector> {
        self.data.iter().map(MultivariateNormalDist::mean).collect()
    }
}

/// Output or event-state distributions derived from saved state
/// distributions.
///
/// Nothing is computed until the first access: then, for every save point,
/// sigma points of the saved state are pushed through `transform` and
/// recombined with the unscented transform. The result is cached.
#[derive(Clone)]
pub struct LazyMultivariateNormalDistPrediction {
    states: MultivariateNormalDistPrediction,
    keys: Vec<String>,
    points: MerweScaledSigmaPoints,
    transform: StateTransform,
    data: OnceLock<Vec<MultivariateNormalDist>>,
}

impl LazyMultivariateNormalDistPrediction {
    /// # Arguments
    /// * `states`: The saved state distributions.
    /// * `keys`: Names of the transformed quantity.
    /// * `points`: Sigma point scheme matching the state dimension.
    /// * `transform`: State to transformed quantity (e.g., the model output).
    pub fn new(
        states: MultivariateNormalDistPrediction,
        keys: Vec<String>,
        points: MerweScaledSigmaPoints,
        transform: StateTransform,
    ) -> Self {
        Self {
            states,
            keys,
            points,
            transform,
            data: OnceLock::new(),
        }
    }

    pub fn times(&self) -> &[f64] {
        self.states.times()
    }

    /// Whether the distributions have been computed yet.
    pub fn is_evaluated(&self) -> bool {
        self.data.get().is_some()
    }

    fn data(&self) -> &[MultivariateNormalDist] {
        self.data.get_or_init(|| {
            self.states
                .data
                .iter()
                .map(|state| {
                    let sigma = self.points.generate(state.mean_vector(), state.cov());
                    let columns: Vec<DVector<f64>> = sigma
                        .column_iter()
                        .map(|point| (self.transform)(&point.into_owned()))
                        .collect();
                    let transformed = if columns.is_empty() {
                        DMatrix::zeros(self.keys.len(), 0)
                    } else {
                        DMatrix::from_columns(&columns)
                    };
                    let (mean, cov) = self.points.unscented_transform(&transformed, None);
                    MultivariateNormalDist::new_unchecked(self.keys.clone(), mean, cov)
                })
                .collect()
        })
    }

    pub fn snapshot(&self, index: usize) -> Option<&MultivariateNormalDist> {
        self.data().get(index)
    }

    pub fn mean(&self) -> Vec<NamedVector> {
        self.data().iter().map(MultivariateNormalDist::mean).collect()
    }
}

impl fmt::Debug for LazyMultivariateNormalDistPrediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyMultivariateNormalDistPrediction")
            .field("times", &self.states.times)
            .field("keys", &self.keys)
            .field("evaluated", &self.is_evaluated())
            .finish()
    }
}
