// prog_core/src/prediction/monte_carlo.rs

use nalgebra::DVector;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::Result;
use crate::estimation::samples_in_model_order;
use crate::models::{check_model, PrognosticsModel, SimulationConfig, SimulationResult};
use crate::prediction::container::{Prediction, UnweightedSamplesPrediction};
use crate::prediction::{check_timing, event_indices, EventSnapshot, PredictionResult, Predictor};
use crate::types::{FutureLoading, State};
use crate::uncertain_data::{UncertainData, UnweightedSamples};

/// Number of samples drawn when the prior is not already a sample set.
const DEFAULT_SAMPLES: usize = 100;

/// Settings of the Monte Carlo predictor.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonteCarloConfig {
    /// Time of the initial state (s).
    pub t0: f64,
    /// Simulation step (s).
    pub dt: f64,
    /// Maximum predicted duration after `t0` (s).
    pub horizon: f64,
    /// Interval between saved points (s).
    pub save_freq: f64,
    /// Additional absolute save times (s).
    pub save_pts: Vec<f64>,
    /// Samples to draw. `None` uses a sample-set prior as-is, and draws 100
    /// samples from anything else.
    pub n_samples: Option<usize>,
    /// Events to predict. `None` predicts every model event.
    pub events: Option<Vec<String>>,
    /// Whether the model's process noise is applied while simulating.
    pub process_noise: bool,
    /// Seed for a reproducible prediction. Without one, the predictor's own
    /// generator is used and advances between calls.
    pub seed: Option<u64>,
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        Self {
            t0: 0.0,
            dt: 0.5,
            horizon: 4000.0,
            save_freq: 10.0,
            save_pts: Vec::new(),
            n_samples: None,
            events: None,
            process_noise: true,
            seed: None,
        }
    }
}

/// Predicts by simulating independent samples of the state distribution.
///
/// Each sample is simulated until every requested event has occurred or the
/// horizon elapses. An event stops only its own branch: once it occurs, its
/// time and state are recorded and simulation resumes from that state for the
/// events still unresolved, so later events see the same history.
pub struct MonteCarlo {
    model: Arc<dyn PrognosticsModel>,
    config: MonteCarloConfig,
    rng: ChaCha8Rng,
}

/// One sample's trajectory and per-event outcome.
struct SampleRun {
    trajectory: SimulationResult,
    time_of_event: Vec<f64>,
    final_states: Vec<Option<EventSnapshot>>,
}

impl MonteCarlo {
    pub fn new(model: Arc<dyn PrognosticsModel>, config: MonteCarloConfig) -> Result<Self> {
        check_model(model.as_ref())?;
        check_timing(config.dt, config.horizon, config.save_freq)?;
        event_indices(model.as_ref(), config.events.as_deref())?;
        let rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        Ok(Self { model, config, rng })
    }

    pub fn model(&self) -> &Arc<dyn PrognosticsModel> {
        &self.model
    }
}

/// Runs the event peel-off loop for one sample.
///
/// `events` holds indices into the model's `events()`; the returned
/// vectors follow the same order.
fn simulate_sample(
    model: &dyn PrognosticsModel,
    x0: State,
    loading: &FutureLoading,
    config: &MonteCarloConfig,
    events: &[usize],
    rng: &mut ChaCha8Rng,
) -> Result<SampleRun> {
    let end = config.t0 + config.horizon;
    let mut unresolved: Vec<usize> = (0..events.len()).collect();
    let mut time_of_event = vec![f64::NAN; events.len()];
    let mut final_states: Vec<Option<EventSnapshot>> = vec![None; events.len()];
    let mut trajectory = SimulationResult::default();

    let mut t = config.t0;
    let mut x = x0;
    loop {
        // --- 1. Simulate against the unresolved events only ---
        let segment_config = SimulationConfig {
            t0: t,
            dt: config.dt,
            horizon: (end - t).max(0.0),
            save_freq: config.save_freq,
            save_pts: config.save_pts.clone(),
            threshold_events: Some(unresolved.iter().map(|i| events[*i]).collect()),
            process_noise: config.process_noise,
        };
        let segment = model.simulate_to_threshold(loading, &x, &segment_config, &mut *rng)?;
        let met = segment.threshold_met;
        let last = segment.last().map(|(t, x)| (t, x.clone()));
        append_segment(&mut trajectory, segment);

        let Some((t_hit, x_hit)) = last else { break };
        if !met {
            break;
        }

        // --- 2. Peel off every event met in the stopping state ---
        let thresholds = model.threshold_met(&x_hit);
        let before = unresolved.len();
        unresolved.retain(|i| {
            let hit = thresholds.get(events[*i]).copied().unwrap_or(false);
            if hit {
                time_of_event[*i] = t_hit;
                final_states[*i] = Some(EventSnapshot {
                    time: t_hit,
                    state: x_hit.clone(),
                });
            }
            !hit
        });
        if unresolved.is_empty() || unresolved.len() == before {
            break;
        }

        // --- 3. Resume from the event state for the rest ---
        t = t_hit;
        x = x_hit;
    }

    Ok(SampleRun {
        trajectory,
        time_of_event,
        final_states,
    })
}

/// Appends a simulated segment to a trajectory. Every segment after the first
/// starts where the previous one stopped, so its first point is dropped.
fn append_segment(trajectory: &mut SimulationResult, segment: SimulationResult) {
    let skip = usize::from(!trajectory.is_empty());
    trajectory.times.extend(segment.times.into_iter().skip(skip));
    trajectory.inputs.extend(segment.inputs.into_iter().skip(skip));
    trajectory.states.extend(segment.states.into_iter().skip(skip));
    trajectory.outputs.extend(segment.outputs.into_iter().skip(skip));
    trajectory
        .event_states
        .extend(segment.event_states.into_iter().skip(skip));
}

impl Predictor for MonteCarlo {
    type Config = MonteCarloConfig;

    fn config(&self) -> &MonteCarloConfig {
        &self.config
    }

    fn predict_with(
        &mut self,
        state: &UncertainData,
        loading: &FutureLoading,
        config: &MonteCarloConfig,
    ) -> Result<PredictionResult> {
        check_timing(config.dt, config.horizon, config.save_freq)?;
        let events = event_indices(self.model.as_ref(), config.events.as_deref())?;
        let event_names: Vec<String> = events
            .iter()
            .map(|i| self.model.events()[*i].clone())
            .collect();

        let mut seeded;
        let rng = match config.seed {
            Some(seed) => {
                seeded = ChaCha8Rng::seed_from_u64(seed);
                &mut seeded
            }
            None => &mut self.rng,
        };

        // --- 1. Draw the samples ---
        let samples = match (state, config.n_samples) {
            (UncertainData::Samples(samples), None) => samples.clone(),
            (other, n) => other.sample(n.unwrap_or(DEFAULT_SAMPLES), &mut *rng)?,
        };
        let samples = samples_in_model_order(self.model.as_ref(), &samples)?;
        debug!(samples = samples.len(), events = ?event_names, "Monte Carlo prediction");

        // --- 2. Simulate every sample independently ---
        let mut runs = Vec::with_capacity(samples.len());
        for x0 in samples {
            runs.push(simulate_sample(self.model.as_ref(), x0, loading, config, &events, &mut *rng)?);
        }

        // --- 3. Combine into per-sample containers ---
        let times = runs
            .iter()
            .map(|run| &run.trajectory.times)
            .max_by_key(|times| times.len())
            .cloned()
            .unwrap_or_default();

        let mut inputs = Vec::with_capacity(runs.len());
        let mut states = Vec::with_capacity(runs.len());
        let mut outputs = Vec::with_capacity(runs.len());
        let mut event_states = Vec::with_capacity(runs.len());
        let mut toe = Vec::with_capacity(runs.len());
        let mut final_states = Vec::with_capacity(runs.len());
        for run in runs {
            let unresolved = run.time_of_event.iter().filter(|t| t.is_nan()).count();
            if unresolved > 0 {
                warn!(unresolved, "Some events were not reached within the prediction horizon");
            }
            inputs.push(run.trajectory.inputs);
            states.push(run.trajectory.states);
            outputs.push(run.trajectory.outputs);
            event_states.push(run.trajectory.event_states);
            toe.push(DVector::from_vec(run.time_of_event));
            final_states.push(run.final_states);
        }

        let model = &self.model;
        let container = |keys: &[String], data| {
            Prediction::Samples(UnweightedSamplesPrediction::new(times.clone(), keys.to_vec(), data))
        };
        Ok(PredictionResult {
            inputs: container(model.inputs(), inputs),
            states: container(model.states(), states),
            outputs: container(model.outputs(), outputs),
            event_states: container(model.events(), event_states),
            time_of_event: UncertainData::Samples(UnweightedSamples::new(event_names.clone(), toe)?),
            final_states,
            events: event_names,
            times,
        })
    }
}
