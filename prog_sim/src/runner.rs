// prog_sim/src/runner.rs

//! Runs a scenario end to end: simulate a noisy throw, track it with a state
//! estimator, predict its events at a fixed interval, and score the
//! predictions against the true event times.

use anyhow::{ensure, Context, Result};
use nalgebra::DVector;
use prog_core::estimation::{
    KalmanFilter, ParticleFilter, ParticleFilterConfig, StateEstimator, UnscentedKalmanFilter,
};
use prog_core::metrics::{
    alpha_lambda, calc_metrics, cumulative_relative_accuracy, monotonicity, prognostic_horizon,
    Metrics,
};
use prog_core::models::{LinearThrownObject, PrognosticsModel, ThrownObject};
use prog_core::prediction::{
    MonteCarlo, MonteCarloConfig, PredictionResult, Predictor, ToEPredictionProfile,
    UnscentedTransformConfig, UnscentedTransformPredictor,
};
use prog_core::types::{FutureLoading, Input, NamedVector, Output, State};
use prog_core::uncertain_data::UncertainData;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{
    EstimatorKind, MetricsSettings, PredictorKind, ScenarioConfig, SimulationSettings,
};

// Offsets that give each consumer of the scenario seed its own stream.
const METRICS_STREAM: u64 = 1;
const FILTER_STREAM: u64 = 2;
const PREDICTOR_STREAM: u64 = 3;

/// The simulated ground truth.
#[derive(Debug, Clone)]
pub struct TruthRun {
    pub times: Vec<f64>,
    pub states: Vec<State>,
    /// Noisy measurements, one per time.
    pub measurements: Vec<Output>,
    /// When each event first occurred. Undefined for events not reached
    /// within `max_time`.
    pub event_times: NamedVector,
}

/// Everything a scenario run produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub truth: TruthRun,
    /// Mean of the state estimate after each measurement.
    pub estimates: Vec<(f64, NamedVector)>,
    pub profile: ToEPredictionProfile,
    /// Summary of the last prediction against the true event times.
    pub final_toe_metrics: BTreeMap<String, Metrics>,
    pub alpha_lambda: Option<BTreeMap<String, bool>>,
    pub prognostic_horizon: BTreeMap<String, Option<f64>>,
    pub cumulative_relative_accuracy: BTreeMap<String, Option<f64>>,
    /// `None` with fewer than two predictions.
    pub monotonicity: Option<BTreeMap<String, Option<f64>>>,
}

/// The predictor chosen by a scenario. Each prediction reuses the configured
/// settings with `t0` moved to the issue time.
enum ScenarioPredictor {
    MonteCarlo(MonteCarlo),
    UnscentedTransform(UnscentedTransformPredictor),
}

impl ScenarioPredictor {
    fn build(config: &ScenarioConfig, model: Arc<dyn PrognosticsModel>) -> Result<Self> {
        let settings = &config.predictor;
        Ok(match settings.kind {
            PredictorKind::MonteCarlo => {
                // Seeded once; later predictions keep drawing from the same generator.
                let mc_config = MonteCarloConfig {
                    seed: Some(
                        settings
                            .monte_carlo
                            .seed
                            .unwrap_or(config.simulation.seed.wrapping_add(PREDICTOR_STREAM)),
                    ),
                    ..settings.monte_carlo.clone()
                };
                Self::MonteCarlo(
                    MonteCarlo::new(model, mc_config).context("building the Monte Carlo predictor")?,
                )
            }
            PredictorKind::UnscentedTransform => Self::UnscentedTransform(
                UnscentedTransformPredictor::new(model, settings.unscented_transform.clone())
                    .context("building the unscented transform predictor")?,
            ),
        })
    }

    fn predict_at(
        &mut self,
        t0: f64,
        state: &UncertainData,
        loading: &FutureLoading,
    ) -> prog_core::error::Result<PredictionResult> {
        match self {
            Self::MonteCarlo(p) => {
                let config = MonteCarloConfig {
                    t0,
                    seed: None,
                    ..p.config().clone()
                };
                p.predict_with(state, loading, &config)
            }
            Self::UnscentedTransform(p) => {
                let config = UnscentedTransformConfig {
                    t0,
                    ..p.config().clone()
                };
                p.predict_with(state, loading, &config)
            }
        }
    }
}

/// Simulates the truth from the model's initial state until every event has
/// occurred or `max_time` is reached, measuring the output at every step.
pub fn simulate_truth(
    model: &dyn PrognosticsModel,
    settings: &SimulationSettings,
    rng: &mut ChaCha8Rng,
) -> Result<TruthRun> {
    ensure!(settings.dt > 0.0, "simulation dt must be positive, got {}", settings.dt);

    let u = Input::zeros(model.inputs().len());
    let mut x = model.initialize(&u, &Output::zeros(model.outputs().len()));
    let mut event_times = vec![f64::NAN; model.events().len()];
    let mut times = vec![0.0];
    let mut measurements = vec![model.apply_measurement_noise(&model.output(&x), rng)];
    let mut states = vec![x.clone()];

    let mut step = 0_u32;
    while event_times.iter().any(|t| t.is_nan()) {
        step += 1;
        let t = f64::from(step) * settings.dt;
        if t > settings.max_time {
            break;
        }
        x = model.next_state(&x, &u, settings.dt);
        x = model.apply_limits(model.apply_process_noise(&x, settings.dt, rng));

        for (slot, met) in event_times.iter_mut().zip(model.threshold_met(&x)) {
            if met && slot.is_nan() {
                *slot = t;
            }
        }
        times.push(t);
        measurements.push(model.apply_measurement_noise(&model.output(&x), rng));
        states.push(x.clone());
    }

    let event_times = NamedVector::new(model.events().to_vec(), DVector::from_vec(event_times))?;
    debug!(steps = times.len(), ?event_times, "Simulated ground truth");
    Ok(TruthRun {
        times,
        states,
        measurements,
        event_times,
    })
}

fn build_estimator(
    config: &ScenarioConfig,
    model: Arc<dyn PrognosticsModel>,
    x0: UncertainData,
) -> Result<Box<dyn StateEstimator>> {
    let settings = &config.estimator;
    Ok(match settings.kind {
        EstimatorKind::KalmanFilter => {
            let linear: Arc<dyn PrognosticsModel> =
                Arc::new(LinearThrownObject::new(config.model.clone())?);
            Box::new(KalmanFilter::new(linear, x0, settings.kalman_filter.clone())?)
        }
        EstimatorKind::UnscentedKalmanFilter => Box::new(UnscentedKalmanFilter::new(
            model,
            x0,
            settings.unscented_kalman_filter.clone(),
        )?),
        EstimatorKind::ParticleFilter => {
            let pf_config = ParticleFilterConfig {
                seed: Some(
                    settings
                        .particle_filter
                        .seed
                        .unwrap_or(config.simulation.seed.wrapping_add(FILTER_STREAM)),
                ),
                ..settings.particle_filter.clone()
            };
            Box::new(ParticleFilter::new(model, x0, pf_config)?)
        }
    })
}

/// Runs one scenario.
pub fn run(config: &ScenarioConfig) -> Result<RunReport> {
    let sim = &config.simulation;
    ensure!(
        sim.prediction_interval > 0.0,
        "prediction_interval must be positive, got {}",
        sim.prediction_interval
    );
    let model: Arc<dyn PrognosticsModel> = Arc::new(ThrownObject::new(config.model.clone()));

    // --- 1. Ground truth ---
    let mut truth_rng = ChaCha8Rng::seed_from_u64(sim.seed);
    let truth = simulate_truth(model.as_ref(), sim, &mut truth_rng)?;
    ensure!(
        truth.event_times.values().iter().all(|t| t.is_finite()),
        "the ground truth did not reach every event within {} s",
        sim.max_time
    );
    info!(event_times = ?truth.event_times, "Ground truth ready");

    // --- 2. Estimator and predictor ---
    let x0 = NamedVector::new(model.states().to_vec(), truth.states[0].clone())?;
    let mut estimator = build_estimator(config, model.clone(), x0.into())
        .context("building the state estimator")?;
    let mut predictor = ScenarioPredictor::build(config, model.clone())?;
    let n_inputs = model.inputs().len();
    let loading = move |_t: f64, _x: &State| Input::zeros(n_inputs);

    // --- 3. Estimate, predicting at every interval ---
    let u = Input::zeros(n_inputs);
    let mut estimates = Vec::new();
    let mut profile = ToEPredictionProfile::new();
    let mut last_prediction = None;
    let mut next_prediction = sim.prediction_interval;
    for (t, z) in truth.times.iter().zip(&truth.measurements).skip(1) {
        if *t > sim.duration + 1e-9 {
            break;
        }
        estimator
            .estimate(*t, &u, z)
            .with_context(|| format!("estimating at t = {t}"))?;
        let estimate = estimator.x();
        estimates.push((*t, estimate.mean()));

        if *t + 1e-9 >= next_prediction {
            next_prediction += sim.prediction_interval;
            let prediction = predictor
                .predict_at(*t, &estimate, &loading)
                .with_context(|| format!("predicting at t = {t}"))?;
            for (event, toe) in prediction.time_of_event.mean().iter() {
                info!(t, event, toe, "Predicted time of event");
            }
            profile.add_prediction(*t, prediction.time_of_event.clone());
            last_prediction = Some(prediction);
        }
    }
    let Some(last_prediction) = last_prediction else {
        anyhow::bail!(
            "no prediction was issued: duration {} is shorter than the prediction interval {}",
            sim.duration,
            sim.prediction_interval
        );
    };

    // --- 4. Score the predictions ---
    let mut rng = ChaCha8Rng::seed_from_u64(sim.seed.wrapping_add(METRICS_STREAM));
    let scores = score_profile(&profile, &truth.event_times, &config.metrics, &mut rng)?;
    let final_toe_metrics = calc_metrics(
        &last_prediction.time_of_event,
        Some(&truth.event_times),
        config.metrics.n_samples,
        &mut rng,
    )?;

    Ok(RunReport {
        truth,
        estimates,
        profile,
        final_toe_metrics,
        alpha_lambda: scores.alpha_lambda,
        prognostic_horizon: scores.prognostic_horizon,
        cumulative_relative_accuracy: scores.cumulative_relative_accuracy,
        monotonicity: scores.monotonicity,
    })
}

struct ProfileScores {
    alpha_lambda: Option<BTreeMap<String, bool>>,
    prognostic_horizon: BTreeMap<String, Option<f64>>,
    cumulative_relative_accuracy: BTreeMap<String, Option<f64>>,
    monotonicity: Option<BTreeMap<String, Option<f64>>>,
}

fn score_profile(
    profile: &ToEPredictionProfile,
    ground_truth: &NamedVector,
    settings: &MetricsSettings,
    rng: &mut ChaCha8Rng,
) -> Result<ProfileScores> {
    let alpha_lambda_result = alpha_lambda(
        profile,
        ground_truth,
        settings.lambda,
        settings.alpha,
        settings.beta,
        settings.n_samples,
        rng,
    )?;
    if alpha_lambda_result.is_none() {
        warn!(lambda = settings.lambda, "No prediction was issued at or after lambda");
    }

    // An entry passes when it alone would pass alpha-lambda at its own issue time.
    let within_alpha_bounds = |t: f64, toe: &UncertainData| {
        let mut single = ToEPredictionProfile::new();
        single.add_prediction(t, toe.clone());
        alpha_lambda(
            &single,
            ground_truth,
            t,
            settings.alpha,
            settings.beta,
            settings.n_samples,
            &mut *rng,
        )
        .map(Option::unwrap_or_default)
    };
    let horizon = prognostic_horizon(profile, within_alpha_bounds, ground_truth)?;

    Ok(ProfileScores {
        alpha_lambda: alpha_lambda_result,
        prognostic_horizon: horizon,
        cumulative_relative_accuracy: cumulative_relative_accuracy(profile, ground_truth)?,
        monotonicity: (profile.len() >= 2).then(|| monotonicity(profile)).transpose()?,
    })
}

impl RunReport {
    /// Logs the scores of the run.
    pub fn log_summary(&self) {
        info!(predictions = self.profile.len(), estimates = self.estimates.len(), "Run complete");
        for (event, metrics) in &self.final_toe_metrics {
            info!(
                event = event.as_str(),
                mean = metrics.mean,
                std = metrics.std,
                relative_accuracy = ?metrics.ground_truth.as_ref().map(|g| g.relative_accuracy),
                "Final time-of-event prediction"
            );
        }
        for (event, value) in &self.cumulative_relative_accuracy {
            let horizon = self.prognostic_horizon.get(event).copied().flatten();
            info!(event = event.as_str(), cra = ?value, ?horizon, "Profile accuracy");
        }
        if let Some(passed) = &self.alpha_lambda {
            info!(?passed, "Alpha-lambda");
        }
        if let Some(monotonicity) = &self.monotonicity {
            info!(?monotonicity, "Monotonicity");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EstimatorSettings, PredictorSettings};
    use approx::assert_abs_diff_eq;
    use nalgebra::DMatrix;
    use prog_core::estimation::{NoiseStd, UkfConfig};
    use prog_core::models::ThrownObjectParams;

    fn scenario(estimator: EstimatorKind, predictor: PredictorKind) -> ScenarioConfig {
        ScenarioConfig {
            simulation: SimulationSettings {
                seed: 11,
                dt: 0.1,
                duration: 3.0,
                prediction_interval: 1.0,
                max_time: 20.0,
            },
            model: ThrownObjectParams {
                measurement_noise: 0.5,
                ..Default::default()
            },
            estimator: EstimatorSettings {
                kind: estimator,
                unscented_kalman_filter: UkfConfig {
                    r: Some(DMatrix::from_element(1, 1, 0.25)),
                    ..Default::default()
                },
                particle_filter: ParticleFilterConfig {
                    num_particles: 200,
                    measurement_noise: NoiseStd::Scalar(0.5),
                    ..Default::default()
                },
                ..Default::default()
            },
            predictor: PredictorSettings {
                kind: predictor,
                monte_carlo: MonteCarloConfig {
                    dt: 0.1,
                    n_samples: Some(50),
                    process_noise: false,
                    ..Default::default()
                },
                unscented_transform: UnscentedTransformConfig {
                    dt: 0.1,
                    ..Default::default()
                },
            },
            metrics: MetricsSettings {
                n_samples: 200,
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_truth_reaches_both_events_in_order() {
        let model = ThrownObject::new(ThrownObjectParams::default());
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let truth = simulate_truth(&model, &SimulationSettings::default(), &mut rng).unwrap();
        let falling = truth.event_times.get("falling").unwrap();
        let impact = truth.event_times.get("impact").unwrap();
        // Apex at 40 / 9.81 s; the Euler steps land a little after 8.2 s.
        assert_abs_diff_eq!(falling, 4.1, epsilon = 1e-9);
        assert!(impact > 8.0 && impact < 8.6);
        assert_eq!(truth.times.len(), truth.measurements.len());
        assert_abs_diff_eq!(*truth.times.last().unwrap(), impact, epsilon = 1e-9);
    }

    #[test]
    fn test_truth_stops_at_max_time() {
        let model = ThrownObject::new(ThrownObjectParams::default());
        let settings = SimulationSettings {
            max_time: 1.0,
            ..Default::default()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let truth = simulate_truth(&model, &settings, &mut rng).unwrap();
        assert_eq!(truth.event_times.get("impact"), None);
        assert!(*truth.times.last().unwrap() <= 1.0);
    }

    #[test]
    fn test_ukf_and_monte_carlo_track_the_impact() {
        let config = scenario(EstimatorKind::UnscentedKalmanFilter, PredictorKind::MonteCarlo);
        let report = run(&config).unwrap();
        assert_eq!(report.profile.len(), 3);
        assert_eq!(report.estimates.len(), 30);

        let impact = report.truth.event_times.get("impact").unwrap();
        let predicted = report.final_toe_metrics["impact"].mean;
        assert_abs_diff_eq!(predicted, impact, epsilon = 1.0);
        assert!(report.cumulative_relative_accuracy["impact"].unwrap() > 0.8);
        assert!(report.alpha_lambda.is_some());
        assert!(report.monotonicity.is_some());
    }

    #[test]
    fn test_every_estimator_predictor_pair_runs() {
        for estimator in [
            EstimatorKind::KalmanFilter,
            EstimatorKind::UnscentedKalmanFilter,
            EstimatorKind::ParticleFilter,
        ] {
            for predictor in [PredictorKind::MonteCarlo, PredictorKind::UnscentedTransform] {
                let report = run(&scenario(estimator, predictor)).unwrap();
                assert_eq!(report.profile.len(), 3);
                assert!(report.final_toe_metrics.contains_key("falling"));
            }
        }
    }

    #[test]
    fn test_runs_are_reproducible() {
        let config = scenario(EstimatorKind::ParticleFilter, PredictorKind::MonteCarlo);
        let a = run(&config).unwrap();
        let b = run(&config).unwrap();
        assert_eq!(a.profile, b.profile);
        assert_eq!(a.estimates, b.estimates);
    }

    #[test]
    fn test_rejects_runs_without_predictions() {
        let mut config = scenario(EstimatorKind::UnscentedKalmanFilter, PredictorKind::MonteCarlo);
        config.simulation.duration = 0.5;
        assert!(run(&config).is_err());
        config.simulation.prediction_interval = 0.0;
        assert!(run(&config).is_err());
    }
}
