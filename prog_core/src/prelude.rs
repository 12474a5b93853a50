// prog_core/src/prelude.rs

// --- Core Abstractions (The main contracts of the library) ---
pub use crate::estimation::StateEstimator;
pub use crate::models::PrognosticsModel;
pub use crate::prediction::Predictor;

// --- Core Data Structures (The "nouns" of the library) ---
pub use crate::error::{ProgError, Result};
pub use crate::types::{names, FutureLoading, Input, NamedVector, Output, State};
pub use crate::uncertain_data::{MultivariateNormalDist, ScalarData, UncertainData, UnweightedSamples};

// --- Estimation Algorithms ---
pub use crate::estimation::{
    KalmanFilter, KalmanFilterConfig, ParticleFilter, ParticleFilterConfig, UkfConfig,
    UnscentedKalmanFilter,
};

// --- Prediction Algorithms ---
pub use crate::prediction::{
    MonteCarlo, MonteCarloConfig, PredictionResult, ToEPredictionProfile, UnscentedTransformConfig,
    UnscentedTransformPredictor,
};

// --- Concrete Model Implementations (Export common ones for convenience) ---
pub use crate::models::{LinearModel, LinearThrownObject, ThrownObject, ThrownObjectParams};
