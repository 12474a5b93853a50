// prog_sim/src/config.rs

//! Scenario files: which model is thrown, how it is observed, and which
//! estimator and predictor track it.
//!
//! Values come from a TOML file and can be overridden from the environment
//! with `PROG_SIM_` variables, nested with `__`
//! (e.g. `PROG_SIM_SIMULATION__SEED=7`).

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use prog_core::estimation::{KalmanFilterConfig, ParticleFilterConfig, UkfConfig};
use prog_core::models::ThrownObjectParams;
use prog_core::prediction::{MonteCarloConfig, UnscentedTransformConfig};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScenarioConfig {
    pub simulation: SimulationSettings,
    pub model: ThrownObjectParams,
    pub estimator: EstimatorSettings,
    pub predictor: PredictorSettings,
    pub metrics: MetricsSettings,
}

/// Timing of the ground-truth run.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationSettings {
    pub seed: u64,
    /// Interval between measurements (s).
    pub dt: f64,
    /// How long measurements keep arriving (s). The truth itself runs until
    /// every event has occurred or `max_time` is reached.
    pub duration: f64,
    /// Interval between predictions (s).
    pub prediction_interval: f64,
    pub max_time: f64,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            seed: 42,
            dt: 0.1,
            duration: 4.0,
            prediction_interval: 1.0,
            max_time: 200.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimatorKind {
    KalmanFilter,
    #[default]
    UnscentedKalmanFilter,
    ParticleFilter,
}

/// The estimator to run, with settings for every kind so a scenario can switch
/// between them by changing `kind` alone.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EstimatorSettings {
    pub kind: EstimatorKind,
    pub kalman_filter: KalmanFilterConfig,
    pub unscented_kalman_filter: UkfConfig,
    pub particle_filter: ParticleFilterConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictorKind {
    #[default]
    MonteCarlo,
    UnscentedTransform,
}

/// The predictor to run. Its `t0` is replaced by the issue time of each
/// prediction.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PredictorSettings {
    pub kind: PredictorKind,
    pub monte_carlo: MonteCarloConfig,
    pub unscented_transform: UnscentedTransformConfig,
}

/// Settings of the accuracy metrics computed at the end of a run.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MetricsSettings {
    /// Allowed relative error on the remaining time.
    pub alpha: f64,
    /// Fraction of the distribution that must be within bounds.
    pub beta: f64,
    /// Issue time at which alpha-lambda is evaluated (s).
    pub lambda: f64,
    /// Draws used for continuous distributions.
    pub n_samples: usize,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            alpha: 0.2,
            beta: 0.5,
            lambda: 1.0,
            n_samples: 1000,
        }
    }
}

impl ScenarioConfig {
    /// Loads a scenario file, then applies `PROG_SIM_` environment overrides.
    pub fn load(path: &Path) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("PROG_SIM_").split("__"))
            .extract()
    }

    /// Parses a scenario from TOML text, without environment overrides.
    pub fn from_toml_str(toml: &str) -> Result<Self, figment::Error> {
        Figment::new().merge(Toml::string(toml)).extract()
    }
}
