// prog_core/src/prediction/mod.rs

//! Prediction: roll a state distribution forward in time to a distribution of
//! event times (time of event, ToE), recording trajectories along the way.

use crate::error::{ProgError, Result};
use crate::models::PrognosticsModel;
use crate::types::{FutureLoading, State};
use crate::uncertain_data::UncertainData;

pub mod container;
pub mod monte_carlo;
pub mod profile;
pub mod unscented;

pub use container::{
    LazyMultivariateNormalDistPrediction, MultivariateNormalDistPrediction, Prediction,
    StateTransform, UnweightedSamplesPrediction,
};
pub use monte_carlo::{MonteCarlo, MonteCarloConfig};
pub use profile::ToEPredictionProfile;
pub use unscented::{UnscentedTransformConfig, UnscentedTransformPredictor};

/// The time at which one event occurred for one sample, and the state in which
/// it occurred.
#[derive(Debug, Clone, PartialEq)]
pub struct EventSnapshot {
    pub time: f64,
    pub state: State,
}

/// Everything a prediction produces.
#[derive(Debug, Clone)]
pub struct PredictionResult {
    /// The canonical time axis (the longest one across samples).
    pub times: Vec<f64>,
    pub inputs: Prediction,
    pub states: Prediction,
    pub outputs: Prediction,
    pub event_states: Prediction,
    /// Distribution of event times, keyed by `events`. An event that was not
    /// reached within the horizon is undefined for that sample.
    pub time_of_event: UncertainData,
    /// `final_states[sample][event]`: when and where each event occurred.
    pub final_states: Vec<Vec<Option<EventSnapshot>>>,
    /// The predicted events, in the order used by `time_of_event`.
    pub events: Vec<String>,
}

impl PredictionResult {
    /// The snapshots of one event across all samples.
    pub fn final_states_of(&self, event: &str) -> Option<Vec<Option<&EventSnapshot>>> {
        let idx = self.events.iter().position(|e| e == event)?;
        Some(
            self.final_states
                .iter()
                .map(|sample| sample.get(idx).and_then(Option::as_ref))
                .collect(),
        )
    }
}

/// The contract for any algorithm that performs the "Predictor" role.
pub trait Predictor: Send + Sync {
    type Config: Clone;

    /// The configuration used by [`Predictor::predict`].
    fn config(&self) -> &Self::Config;

    /// Predicts with an explicit configuration for this call only.
    ///
    /// # Arguments
    /// * `state`: The state distribution to start from.
    /// * `loading`: Future loading `(t, x) -> u`.
    /// * `config`: Overrides for this prediction.
    fn predict_with(
        &mut self,
        state: &UncertainData,
        loading: &FutureLoading,
        config: &Self::Config,
    ) -> Result<PredictionResult>;

    /// Predicts with the predictor's own configuration.
    fn predict(&mut self, state: &UncertainData, loading: &FutureLoading) -> Result<PredictionResult> {
        let config = self.config().clone();
        self.predict_with(state, loading, &config)
    }
}

/// Resolves event names to indices into the model's `events()`.
/// `None` selects every event.
pub(crate) fn event_indices(model: &dyn PrognosticsModel, events: Option<&[String]>) -> Result<Vec<usize>> {
    match events {
        None => Ok((0..model.events().len()).collect()),
        Some(names) => names
            .iter()
            .map(|name| {
                model
                    .events()
                    .iter()
                    .position(|e| e == name)
                    .ok_or_else(|| ProgError::UnknownEvent(name.clone()))
            })
            .collect(),
    }
}

/// Shared validation of step and horizon settings.
pub(crate) fn check_timing(dt: f64, horizon: f64, save_freq: f64) -> Result<()> {
    if !(dt > 0.0) {
        return Err(ProgError::InvalidConfig(format!("dt must be positive, got {dt}")));
    }
    if horizon.is_nan() || horizon < 0.0 {
        return Err(ProgError::InvalidConfig(format!(
            "horizon must be non-negative, got {horizon}"
        )));
    }
    if !(save_freq > 0.0) {
        return Err(ProgError::InvalidConfig(format!(
            "save_freq must be positive, got {save_freq}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ThrownObject;
    use crate::types::names;

    #[test]
    fn test_event_indices() {
        let m = ThrownObject::default();
        assert_eq!(event_indices(&m, None).unwrap(), vec![0, 1]);
        assert_eq!(event_indices(&m, Some(&names(&["impact"]))).unwrap(), vec![1]);
        assert_eq!(
            event_indices(&m, Some(&names(&["explode"]))),
            Err(ProgError::UnknownEvent("explode".into()))
        );
    }
}
