// prog_core/src/models/mod.rs

use nalgebra::{DMatrix, DVector};
use rand::{Rng, RngCore};
use rand_distr::StandardNormal;
use serde::Deserialize;
use std::fmt::Debug;

use crate::error::{ProgError, Result};
use crate::types::{EventState, FutureLoading, Input, Output, State};
use crate::utils::time_grid::{SaveSchedule, TimeGrid};

pub mod linear;
pub mod thrown_object;

pub use linear::{LinearModel, LinearSystem};
pub use thrown_object::{LinearThrownObject, ThrownObject, ThrownObjectParams};

// --- PROGNOSTICS MODEL TRAIT ---
// Represents the physics of a degrading system. `x' = f(x, u, dt)`, `z = h(x)`.
/// The contract between the estimation/prediction algorithms and a dynamical
/// model of the monitored system.
///
/// All vectors are ordered by the corresponding name list (`states()`,
/// `inputs()`, `outputs()`, `events()`). The state transition and output
/// functions are deterministic: noise is applied explicitly through
/// `apply_process_noise` / `apply_measurement_noise`, so no algorithm ever needs
/// to mutate a model's noise configuration.
///
/// Implementations must be `Send + Sync`: a single model is shared read-only by
/// every sample of a prediction.
pub trait PrognosticsModel: Debug + Send + Sync {
    /// The ordered names of the state vector `x`.
    fn states(&self) -> &[String];

    /// The ordered names of the input vector `u`.
    fn inputs(&self) -> &[String];

    /// The ordered names of the output vector `z`.
    fn outputs(&self) -> &[String];

    /// The ordered names of the events (failure modes, end-of-life criteria).
    fn events(&self) -> &[String];

    /// Computes an initial state from an input and an output observation.
    fn initialize(&self, u: &Input, z: &Output) -> State;

    /// Advances the state by `dt` under input `u`. Deterministic.
    fn next_state(&self, x: &State, u: &Input, dt: f64) -> State;

    /// The ideal (noise-free) output `z = h(x)`.
    fn output(&self, x: &State) -> Output;

    /// Normalized health per event: 1.0 is healthy, 0.0 is the event occurring.
    fn event_state(&self, x: &State) -> EventState;

    /// Whether each event's threshold is met in state `x`.
    /// Defaults to `event_state <= 0`.
    fn threshold_met(&self, x: &State) -> Vec<bool> {
        self.event_state(x).iter().map(|es| *es <= 0.0).collect()
    }

    /// Standard deviation of the process noise, per state (per unit time).
    fn process_noise(&self) -> DVector<f64> {
        DVector::zeros(self.states().len())
    }

    /// Standard deviation of the measurement noise, per output.
    fn measurement_noise(&self) -> DVector<f64> {
        DVector::zeros(self.outputs().len())
    }

    /// Adds process noise `dt * N(0, sigma)` to every state.
    fn apply_process_noise(&self, x: &State, dt: f64, rng: &mut dyn RngCore) -> State {
        let sigma = self.process_noise();
        if sigma.iter().all(|s| *s == 0.0) {
            return x.clone();
        }
        x + sigma.map(|s| dt * s * rng.sample::<f64, _>(StandardNormal))
    }

    /// Adds measurement noise `N(0, sigma)` to every output.
    fn apply_measurement_noise(&self, z: &Output, rng: &mut dyn RngCore) -> Output {
        let sigma = self.measurement_noise();
        if sigma.iter().all(|s| *s == 0.0) {
            return z.clone();
        }
        z + sigma.map(|s| s * rng.sample::<f64, _>(StandardNormal))
    }

    /// Clamps a state into its physically valid range. Defaults to no limits.
    fn apply_limits(&self, x: State) -> State {
        x
    }

    /// Advances many states at once, one column per state.
    ///
    /// The default loops over columns. Models whose equations vectorize over
    /// states override this to propagate each key across all columns in one pass.
    fn next_state_batch(&self, xs: &DMatrix<f64>, u: &Input, dt: f64) -> DMatrix<f64> {
        let mut out = DMatrix::zeros(xs.nrows(), xs.ncols());
        for (i, col) in xs.column_iter().enumerate() {
            out.set_column(i, &self.next_state(&col.into_owned(), u, dt));
        }
        out
    }

    /// Computes the outputs of many states at once, one column per state.
    fn output_batch(&self, xs: &DMatrix<f64>) -> DMatrix<f64> {
        let mut out = DMatrix::zeros(self.outputs().len(), xs.ncols());
        for (i, col) in xs.column_iter().enumerate() {
            out.set_column(i, &self.output(&col.into_owned()));
        }
        out
    }

    /// The linear structure of the model, if it has one.
    /// Required by the linear Kalman filter.
    fn linear_system(&self) -> Option<LinearSystem> {
        None
    }

    /// Steps the model forward from `x0` until an event threshold is met or the
    /// horizon elapses, recording the trajectory at the configured save points.
    ///
    /// Only the events listed in `config.threshold_events` (all events when
    /// `None`) stop the simulation. Models with an analytical or specialized
    /// integration scheme can override this.
    fn simulate_to_threshold(
        &self,
        loading: &FutureLoading,
        x0: &State,
        config: &SimulationConfig,
        rng: &mut dyn RngCore,
    ) -> Result<SimulationResult> {
        config.validate()?;
        let n_events = self.events().len();
        let watched: Vec<usize> = match &config.threshold_events {
            Some(events) => {
                if let Some(bad) = events.iter().find(|e| **e >= n_events) {
                    return Err(ProgError::UnknownEvent(format!("index {bad}")));
                }
                events.clone()
            }
            None => (0..n_events).collect(),
        };
        let stop_met = |x: &State| {
            let met = self.threshold_met(x);
            watched.iter().any(|e| met.get(*e).copied().unwrap_or(false))
        };

        let mut grid = TimeGrid::new(config.t0, config.dt, config.horizon);
        let mut saves = SaveSchedule::new(config.t0, config.save_freq, &config.save_pts);

        // --- 1. Record the starting point ---
        let mut t = config.t0;
        let mut x = x0.clone();
        let mut result = SimulationResult::default();
        result.record(self, t, loading(t, &x), &x);
        if stop_met(&x) {
            result.threshold_met = true;
            return Ok(result);
        }

        // --- 2. Step until a watched threshold is met or the horizon elapses ---
        while let Some(t_next) = grid.advance() {
            t = t_next;
            let u = loading(t, &x);
            x = self.next_state(&x, &u, config.dt);
            if config.process_noise {
                x = self.apply_process_noise(&x, config.dt, rng);
            }
            x = self.apply_limits(x);

            let stop = stop_met(&x);
            let save = saves.due(t) || stop || grid.is_last();
            if save {
                result.record(self, t, u, &x);
            }
            if stop {
                result.threshold_met = true;
                break;
            }
        }

        Ok(result)
    }
}

/// Settings for one run of `simulate_to_threshold`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// Starting time (s).
    pub t0: f64,
    /// Step size (s).
    pub dt: f64,
    /// Maximum simulated duration after `t0` (s).
    pub horizon: f64,
    /// Interval between saved points (s).
    pub save_freq: f64,
    /// Additional absolute save times (s).
    pub save_pts: Vec<f64>,
    /// Indices into `events()` of the events that stop the simulation.
    /// `None` watches every event.
    pub threshold_events: Option<Vec<usize>>,
    /// Whether the model's process noise is applied at each step.
    pub process_noise: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            t0: 0.0,
            dt: 1.0,
            horizon: 1.0e4,
            save_freq: 10.0,
            save_pts: Vec::new(),
            threshold_events: None,
            process_noise: true,
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.dt > 0.0) {
            return Err(ProgError::InvalidConfig(format!(
                "dt must be positive, got {}",
                self.dt
            )));
        }
        if !(self.save_freq > 0.0) {
            return Err(ProgError::InvalidConfig(format!(
                "save_freq must be positive, got {}",
                self.save_freq
            )));
        }
        if self.horizon.is_nan() || self.horizon < 0.0 {
            return Err(ProgError::InvalidConfig(format!(
                "horizon must be non-negative, got {}",
                self.horizon
            )));
        }
        Ok(())
    }
}

/// The trajectory recorded by `simulate_to_threshold`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimulationResult {
    pub times: Vec<f64>,
    pub inputs: Vec<Input>,
    pub states: Vec<State>,
    pub outputs: Vec<Output>,
    pub event_states: Vec<EventState>,
    /// True when a watched event stopped the simulation (the last recorded
    /// point is the state in which it was met).
    pub threshold_met: bool,
}

impl SimulationResult {
    fn record<M: PrognosticsModel + ?Sized>(&mut self, model: &M, t: f64, u: Input, x: &State) {
        self.times.push(t);
        self.inputs.push(u);
        self.outputs.push(model.output(x));
        self.event_states.push(model.event_state(x));
        self.states.push(x.clone());
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// The last recorded time and state.
    pub fn last(&self) -> Option<(f64, &State)> {
        Some((*self.times.last()?, self.states.last()?))
    }
}

/// Fails fast when a model cannot serve estimation or prediction.
pub(crate) fn check_model(model: &dyn PrognosticsModel) -> Result<()> {
    if model.states().is_empty() {
        return Err(ProgError::UnsupportedModel(
            "model must define at least one state".into(),
        ));
    }
    if model.outputs().is_empty() {
        return Err(ProgError::UnsupportedModel(
            "model must define at least one output".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::names;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn model() -> ThrownObject {
        ThrownObject::new(thrown_object::ThrownObjectParams {
            thrower_height: 10.0,
            throwing_speed: 20.0,
            g: -10.0,
            ..Default::default()
        })
    }

    fn no_input(_t: f64, _x: &State) -> Input {
        Input::zeros(0)
    }

    #[test]
    fn test_simulation_stops_at_first_watched_event() {
        let m = model();
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let x0 = m.initialize(&Input::zeros(0), &Output::zeros(1));
        let config = SimulationConfig {
            save_freq: 1.0,
            process_noise: false,
            ..Default::default()
        };
        let result = m.simulate_to_threshold(&no_input, &x0, &config, &mut rng).unwrap();
        assert!(result.threshold_met);
        // Falling happens first, at t = 3.
        assert_eq!(result.last().unwrap().0, 3.0);
        assert_eq!(result.times, vec![0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_simulation_honors_threshold_subset_and_save_points() {
        let m = model();
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let x0 = m.initialize(&Input::zeros(0), &Output::zeros(1));
        let impact = m.events().iter().position(|e| e == "impact").unwrap();
        let config = SimulationConfig {
            save_freq: 100.0,
            save_pts: vec![2.5],
            threshold_events: Some(vec![impact]),
            process_noise: false,
            ..Default::default()
        };
        let result = m.simulate_to_threshold(&no_input, &x0, &config, &mut rng).unwrap();
        assert!(result.threshold_met);
        assert_eq!(result.times, vec![0.0, 3.0, 6.0]);
        assert_eq!(result.states.len(), result.times.len());
        assert_eq!(result.outputs.len(), result.times.len());
        assert_eq!(names(&["x", "v"]), m.states().to_vec());
    }

    #[test]
    fn test_simulation_reports_horizon() {
        let m = model();
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let x0 = m.initialize(&Input::zeros(0), &Output::zeros(1));
        let config = SimulationConfig {
            horizon: 2.0,
            process_noise: false,
            ..Default::default()
        };
        let result = m.simulate_to_threshold(&no_input, &x0, &config, &mut rng).unwrap();
        assert!(!result.threshold_met);
        assert_eq!(result.last().unwrap().0, 2.0);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let m = model();
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let x0 = m.initialize(&Input::zeros(0), &Output::zeros(1));
        let config = SimulationConfig {
            dt: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            m.simulate_to_threshold(&no_input, &x0, &config, &mut rng),
            Err(ProgError::InvalidConfig(_))
        ));
        let config = SimulationConfig {
            threshold_events: Some(vec![5]),
            ..Default::default()
        };
        assert!(matches!(
            m.simulate_to_threshold(&no_input, &x0, &config, &mut rng),
            Err(ProgError::UnknownEvent(_))
        ));
    }
}
