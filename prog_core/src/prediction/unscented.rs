// prog_core/src/prediction/unscented.rs

use nalgebra::{DMatrix, DVector};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::Result;
use crate::estimation::sigma_points::{MerweScaledSigmaPoints, SigmaPointParams};
use crate::estimation::{check_square, diagonal_matrix, prior_in_model_order};
use crate::models::{check_model, PrognosticsModel};
use crate::prediction::container::{
    LazyMultivariateNormalDistPrediction, MultivariateNormalDistPrediction, Prediction,
    StateTransform, UnweightedSamplesPrediction,
};
use crate::prediction::{check_timing, event_indices, EventSnapshot, PredictionResult, Predictor};
use crate::types::FutureLoading;
use crate::uncertain_data::{MultivariateNormalDist, UncertainData};
use crate::utils::time_grid::{SaveSchedule, TimeGrid};

/// Settings of the unscented transform predictor.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UnscentedTransformConfig {
    pub alpha: f64,
    pub beta: f64,
    pub kappa: f64,
    /// Time of the initial state (s).
    pub t0: f64,
    /// Prediction step (s).
    pub dt: f64,
    /// Maximum predicted duration after `t0` (s).
    pub horizon: f64,
    /// Interval between saved points (s).
    pub save_freq: f64,
    /// Additional absolute save times (s).
    pub save_pts: Vec<f64>,
    /// Events to predict. `None` predicts every model event.
    pub events: Option<Vec<String>>,
    /// Process noise covariance added at each step. Defaults to the model's
    /// process noise over one step, `diag((sigma * dt)^2)`.
    #[serde(deserialize_with = "diagonal_matrix")]
    pub q: Option<DMatrix<f64>>,
}

impl UnscentedTransformConfig {
    pub fn sigma_point_params(&self) -> SigmaPointParams {
        SigmaPointParams {
            alpha: self.alpha,
            beta: self.beta,
            kappa: self.kappa,
        }
    }
}

impl Default for UnscentedTransformConfig {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            beta: 0.0,
            kappa: 0.0,
            t0: 0.0,
            dt: 0.5,
            horizon: 4000.0,
            save_freq: 10.0,
            save_pts: Vec::new(),
            events: None,
            q: None,
        }
    }
}

/// Predicts by propagating the `2n+1` sigma points of the state distribution.
///
/// At every step the sigma points are pushed through the model and recombined
/// with the unscented transform. Each point's time of event is frozen the
/// first time it meets that event's threshold; the frozen times are
/// recombined into a Gaussian time of event.
///
/// The Gaussian time of event is an approximation. It is only as good as the
/// assumption that event times are jointly Gaussian, which strongly nonlinear
/// dynamics or threshold surfaces can break. Compare against [`MonteCarlo`]
/// when in doubt.
///
/// [`MonteCarlo`]: crate::prediction::MonteCarlo
pub struct UnscentedTransformPredictor {
    model: Arc<dyn PrognosticsModel>,
    config: UnscentedTransformConfig,
}

impl UnscentedTransformPredictor {
    pub fn new(model: Arc<dyn PrognosticsModel>, config: UnscentedTransformConfig) -> Result<Self> {
        check_model(model.as_ref())?;
        check_timing(config.dt, config.horizon, config.save_freq)?;
        MerweScaledSigmaPoints::new(model.states().len(), config.sigma_point_params())?;
        event_indices(model.as_ref(), config.events.as_deref())?;
        Ok(Self { model, config })
    }

    fn transform(&self, f: fn(&dyn PrognosticsModel, &DVector<f64>) -> DVector<f64>) -> StateTransform {
        let model = self.model.clone();
        Arc::new(move |x: &DVector<f64>| f(model.as_ref(), x))
    }
}

impl Predictor for UnscentedTransformPredictor {
    type Config = UnscentedTransformConfig;

    fn config(&self) -> &UnscentedTransformConfig {
        &self.config
    }

    fn predict_with(
        &mut self,
        state: &UncertainData,
        loading: &FutureLoading,
        config: &UnscentedTransformConfig,
    ) -> Result<PredictionResult> {
        check_timing(config.dt, config.horizon, config.save_freq)?;
        let model = self.model.as_ref();
        let events = event_indices(model, config.events.as_deref())?;
        let event_names: Vec<String> = events.iter().map(|i| model.events()[*i].clone()).collect();

        let prior = prior_in_model_order(model, state)?;
        let n = prior.mean.nrows();
        let points = MerweScaledSigmaPoints::new(n, config.sigma_point_params())?;
        let n_points = points.num_points();
        let q = match &config.q {
            Some(q) => q.clone(),
            None => DMatrix::from_diagonal(&model.process_noise().map(|s| (s * config.dt).powi(2))),
        };
        check_square("unscented transform predictor Q", &q, n)?;
        debug!(sigma_points = n_points, events = ?event_names, "Unscented transform prediction");

        let mut grid = TimeGrid::new(config.t0, config.dt, config.horizon);
        let mut saves = SaveSchedule::new(config.t0, config.save_freq, &config.save_pts);

        let mut t = config.t0;
        let mut x = prior.mean;
        let mut p = prior.cov;
        let mut saved = SavedTrajectory::default();

        // Frozen event times: `toe[(event, point)]`, NaN until met.
        let mut toe = DMatrix::from_element(events.len(), n_points, f64::NAN);
        let mut final_states: Vec<Vec<Option<EventSnapshot>>> = vec![vec![None; events.len()]; n_points];

        // --- 1. Record the starting point, and any event already met ---
        saved.record(model, t, loading(t, &x), &x, &p);
        let mut all_met = freeze_events(model, &points.generate(&x, &p), &events, t, &mut toe, &mut final_states);

        // --- 2. Step until every point met every event or the horizon elapses ---
        while !all_met {
            let Some(t_next) = grid.advance() else { break };
            t = t_next;
            let u = loading(t, &x);

            let sigma = points.generate(&x, &p);
            let mut propagated = DMatrix::zeros(n, n_points);
            for (i, point) in sigma.column_iter().enumerate() {
                let next = model.apply_limits(model.next_state(&point.into_owned(), &u, config.dt));
                propagated.set_column(i, &next);
            }
            let (x_next, p_next) = points.unscented_transform(&propagated, Some(&q));
            x = x_next;
            p = p_next;

            all_met = freeze_events(model, &points.generate(&x, &p), &events, t, &mut toe, &mut final_states);

            let due = saves.due(t) || all_met || grid.is_last();
            if due {
                saved.record(model, t, u, &x, &p);
            }
        }

        // --- 3. Recombine the frozen times ---
        let unresolved: Vec<&str> = event_names
            .iter()
            .zip(toe.row_iter())
            .filter(|(_, row)| row.iter().any(|v| v.is_nan()))
            .map(|(name, _)| name.as_str())
            .collect();
        if !unresolved.is_empty() {
            warn!(?unresolved, "Some sigma points did not reach their event within the prediction horizon");
        }
        let (toe_mean, toe_cov) = points.unscented_transform(&toe, None);
        let time_of_event = MultivariateNormalDist::new_unchecked(event_names.clone(), toe_mean, toe_cov);

        // --- 4. Assemble the trajectories ---
        let SavedTrajectory { times, inputs, states } = saved;
        let state_prediction = MultivariateNormalDistPrediction::new(times.clone(), states);
        let outputs = LazyMultivariateNormalDistPrediction::new(
            state_prediction.clone(),
            model.outputs().to_vec(),
            points.clone(),
            self.transform(|m, x| m.output(x)),
        );
        let event_states = LazyMultivariateNormalDistPrediction::new(
            state_prediction.clone(),
            model.events().to_vec(),
            points,
            self.transform(|m, x| m.event_state(x)),
        );

        Ok(PredictionResult {
            inputs: Prediction::Samples(UnweightedSamplesPrediction::new(
                times.clone(),
                model.inputs().to_vec(),
                vec![inputs],
            )),
            states: Prediction::Normal(state_prediction),
            outputs: Prediction::LazyNormal(outputs),
            event_states: Prediction::LazyNormal(event_states),
            time_of_event: UncertainData::Normal(time_of_event),
            final_states,
            events: event_names,
            times,
        })
    }
}

/// The mean input and state distribution at every save point.
#[derive(Default)]
struct SavedTrajectory {
    times: Vec<f64>,
    inputs: Vec<DVector<f64>>,
    states: Vec<MultivariateNormalDist>,
}

impl SavedTrajectory {
    fn record(&mut self, model: &dyn PrognosticsModel, t: f64, u: DVector<f64>, x: &DVector<f64>, p: &DMatrix<f64>) {
        self.times.push(t);
        self.inputs.push(u);
        self.states.push(MultivariateNormalDist::new_unchecked(
            model.states().to_vec(),
            x.clone(),
            p.clone(),
        ));
    }
}

/// Freezes the event time of every sigma point that meets an event for the
/// first time at `t`. Returns whether every point has met every event.
fn freeze_events(
    model: &dyn PrognosticsModel,
    sigma: &DMatrix<f64>,
    events: &[usize],
    t: f64,
    toe: &mut DMatrix<f64>,
    final_states: &mut [Vec<Option<EventSnapshot>>],
) -> bool {
    let mut all_met = true;
    for (i, point) in sigma.column_iter().enumerate() {
        let point = point.into_owned();
        let met = model.threshold_met(&point);
        for (e, event) in events.iter().enumerate() {
            if !toe[(e, i)].is_nan() {
                continue;
            }
            if met.get(*event).copied().unwrap_or(false) {
                toe[(e, i)] = t;
                final_states[i][e] = Some(EventSnapshot {
                    time: t,
                    state: point.clone(),
                });
            } else {
                all_met = false;
            }
        }
    }
    all_met
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProgError;
    use crate::models::{ThrownObject, ThrownObjectParams};
    use crate::types::{names, Input, NamedVector, Output, State};
    use approx::assert_abs_diff_eq;
    use std::sync::OnceLock;

    /// A clock that runs at unit rate next to a state that never changes.
    /// Its single event occurs when the clock reaches `DEADLINE`.
    #[derive(Debug)]
    struct Deadline;

    const DEADLINE: f64 = 5.0;

    impl PrognosticsModel for Deadline {
        fn states(&self) -> &[String] {
            static STATES: OnceLock<Vec<String>> = OnceLock::new();
            STATES.get_or_init(|| names(&["clock", "load"]))
        }
        fn inputs(&self) -> &[String] {
            &[]
        }
        fn outputs(&self) -> &[String] {
            static OUTPUTS: OnceLock<Vec<String>> = OnceLock::new();
            OUTPUTS.get_or_init(|| names(&["load"]))
        }
        fn events(&self) -> &[String] {
            static EVENTS: OnceLock<Vec<String>> = OnceLock::new();
            EVENTS.get_or_init(|| names(&["deadline"]))
        }
        fn initialize(&self, _u: &Input, _z: &Output) -> State {
            DVector::zeros(2)
        }
        fn next_state(&self, x: &State, _u: &Input, dt: f64) -> State {
            DVector::from_vec(vec![x[0] + dt, x[1]])
        }
        fn output(&self, x: &State) -> Output {
            DVector::from_vec(vec![x[1]])
        }
        fn event_state(&self, x: &State) -> DVector<f64> {
            DVector::from_vec(vec![1.0 - x[0] / DEADLINE])
        }
        fn threshold_met(&self, x: &State) -> Vec<bool> {
            vec![x[0] >= DEADLINE - 1e-9]
        }
    }

    fn no_input(_t: f64, _x: &State) -> Input {
        Input::zeros(0)
    }

    #[test]
    fn test_simultaneous_crossing_gives_degenerate_toe() {
        let mut pred = UnscentedTransformPredictor::new(
            Arc::new(Deadline),
            UnscentedTransformConfig {
                save_freq: 1.0,
                ..Default::default()
            },
        )
        .unwrap();
        // Only the load is uncertain; every sigma point shares the clock.
        let x0: UncertainData = MultivariateNormalDist::new(
            names(&["clock", "load"]),
            DVector::from_vec(vec![0.0, 3.0]),
            DMatrix::from_diagonal(&DVector::from_vec(vec![0.0, 1.0])),
        )
        .unwrap()
        .into();
        let result = pred.predict(&x0, &no_input).unwrap();

        let toe = result.time_of_event.mean();
        assert_abs_diff_eq!(toe.get("deadline").unwrap(), DEADLINE, epsilon = 1e-9);
        assert_abs_diff_eq!(result.time_of_event.cov()[(0, 0)], 0.0, epsilon = 1e-12);
        assert_eq!(result.final_states.len(), 5);
        assert!(result.final_states.iter().all(|p| p[0].as_ref().map(|s| s.time) == Some(DEADLINE)));

        // Saved every second, up to and including the event.
        assert_eq!(result.times, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(result.inputs.len(), result.times.len());

        // Outputs are reconstructed on request and keep the load's spread.
        let last = result.outputs.snapshot(5).unwrap();
        assert_abs_diff_eq!(last.mean().get("load").unwrap(), 3.0, epsilon = 1e-9);
        assert_abs_diff_eq!(last.cov()[(0, 0)], 1.0, epsilon = 1e-9);
        let es = result.event_states.snapshot(5).unwrap();
        assert_abs_diff_eq!(es.mean().get("deadline").unwrap(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_unreached_event_is_undefined() {
        let mut pred = UnscentedTransformPredictor::new(Arc::new(Deadline), Default::default()).unwrap();
        let x0: UncertainData = NamedVector::from_pairs([("clock", 0.0), ("load", 1.0)]).into();
        let result = pred
            .predict_with(
                &x0,
                &no_input,
                &UnscentedTransformConfig {
                    horizon: 2.0,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(result.time_of_event.mean().get("deadline"), None);
        assert!(result.final_states.iter().all(|p| p[0].is_none()));
        assert_eq!(result.times.last(), Some(&2.0));
    }

    #[test]
    fn test_thrown_object_impact_matches_point_simulation() {
        let model: Arc<dyn PrognosticsModel> = Arc::new(ThrownObject::new(ThrownObjectParams {
            thrower_height: 10.0,
            throwing_speed: 20.0,
            g: -10.0,
            ..Default::default()
        }));
        let mut pred = UnscentedTransformPredictor::new(
            model,
            UnscentedTransformConfig {
                dt: 1.0,
                ..Default::default()
            },
        )
        .unwrap();
        let x0: UncertainData = NamedVector::from_pairs([("x", 10.0), ("v", 20.0)]).into();
        let result = pred.predict(&x0, &no_input).unwrap();
        let toe = result.time_of_event.mean();
        assert_abs_diff_eq!(toe.get("falling").unwrap(), 3.0, epsilon = 1e-9);
        assert_abs_diff_eq!(toe.get("impact").unwrap(), 6.0, epsilon = 1e-9);
        assert!(matches!(result.states, Prediction::Normal(_)));
    }

    #[test]
    fn test_invalid_settings_are_rejected() {
        assert!(matches!(
            UnscentedTransformPredictor::new(
                Arc::new(Deadline),
                UnscentedTransformConfig {
                    kappa: -2.0,
                    ..Default::default()
                }
            ),
            Err(ProgError::InvalidConfig(_))
        ));
        let mut pred = UnscentedTransformPredictor::new(Arc::new(Deadline), Default::default()).unwrap();
        let x0: UncertainData = NamedVector::from_pairs([("clock", 0.0), ("load", 1.0)]).into();
        assert!(matches!(
            pred.predict_with(
                &x0,
                &no_input,
                &UnscentedTransformConfig {
                    q: Some(DMatrix::identity(3, 3)),
                    ..Default::default()
                }
            ),
            Err(ProgError::DimensionMismatch { .. })
        ));
    }
}
