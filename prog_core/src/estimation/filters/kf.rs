// prog_core/src/estimation/filters/kf.rs

use nalgebra::{DMatrix, DVector};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use crate::error::{ProgError, Result};
use crate::estimation::{check_square, diagonal_matrix, prior_in_model_order, step_dt, StateEstimator};
use crate::models::{LinearSystem, PrognosticsModel};
use crate::types::{Input, Output};
use crate::uncertain_data::{MultivariateNormalDist, UncertainData};
use crate::utils::linalg::symmetrize;

/// Settings of the linear Kalman filter.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KalmanFilterConfig {
    /// Fading-memory factor. `alpha > 1` discounts old information.
    pub alpha: f64,
    /// Time of the initial state (s).
    pub t0: f64,
    /// Process noise covariance added at each predict step.
    /// Defaults to `1e-3 * I`. Written as its diagonal in config files.
    #[serde(deserialize_with = "diagonal_matrix")]
    pub q: Option<DMatrix<f64>>,
    /// Measurement noise covariance. Defaults to `1e-3 * I`.
    #[serde(deserialize_with = "diagonal_matrix")]
    pub r: Option<DMatrix<f64>>,
}

impl Default for KalmanFilterConfig {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            t0: -1e-10,
            q: None,
            r: None,
        }
    }
}

/// A linear Kalman filter over a model that exposes a [`LinearSystem`].
///
/// The continuous model `dx/dt = A x + B u + E` is discretized at each step as
/// `x' = F x + B_aug u_aug` with `F = I + A dt`, `B_aug = [B | E] dt` and
/// `u_aug = [u; 1]`. The update runs against `z - D` with `H = C`.
pub struct KalmanFilter {
    model: Arc<dyn PrognosticsModel>,
    system: LinearSystem,
    alpha: f64,
    q: DMatrix<f64>,
    r: DMatrix<f64>,

    // --- Filter state ---
    x: DVector<f64>,
    p: DMatrix<f64>,
    t: f64,
}

impl KalmanFilter {
    /// # Arguments
    /// * `model`: Must expose `linear_system()`.
    /// * `x0`: Initial state. Its keys must cover every model state.
    /// * `config`: Filter settings.
    pub fn new(model: Arc<dyn PrognosticsModel>, x0: UncertainData, config: KalmanFilterConfig) -> Result<Self> {
        let system = model.linear_system().ok_or_else(|| {
            ProgError::UnsupportedModel("the Kalman filter only supports linear models".into())
        })?;
        let n = model.states().len();
        let n_z = model.outputs().len();
        system.validate(n, model.inputs().len(), n_z)?;

        let prior = prior_in_model_order(model.as_ref(), &x0)?;
        let q = config.q.unwrap_or_else(|| DMatrix::identity(n, n) * 1e-3);
        let r = config.r.unwrap_or_else(|| DMatrix::identity(n_z, n_z) * 1e-3);
        check_square("Kalman filter Q", &q, n)?;
        check_square("Kalman filter R", &r, n_z)?;

        // A point mass carries no covariance to start from.
        let p = if prior.is_point { &q / 10.0 } else { prior.cov };

        Ok(Self {
            model,
            system,
            alpha: config.alpha,
            q,
            r,
            x: prior.mean,
            p,
            t: config.t0,
        })
    }

    fn predict(&mut self, u: &Input, dt: f64) {
        let f = self.system.transition(dt);
        let b = self.system.augmented_control(dt);
        let mut u_aug = DVector::zeros(u.nrows() + 1);
        u_aug.rows_mut(0, u.nrows()).copy_from(u);
        u_aug[u.nrows()] = 1.0;

        self.x = &f * &self.x + b * u_aug;
        self.p = self.alpha.powi(2) * (&f * &self.p * f.transpose()) + &self.q;
    }

    fn update(&mut self, z: &Output) -> Result<()> {
        let h = &self.system.c;

        // --- 1. Innovation ---
        let y = z - &self.system.d - h * &self.x;
        let s = h * &self.p * h.transpose() + &self.r;

        // --- 2. Kalman Gain ---
        let s_inv = s
            .try_inverse()
            .ok_or(ProgError::SingularMatrix("Kalman filter innovation covariance"))?;
        let k = &self.p * h.transpose() * s_inv;

        // --- 3. Update state and covariance (Joseph form) ---
        self.x += &k * y;
        let n = self.x.nrows();
        let i_kh = DMatrix::identity(n, n) - &k * h;
        self.p = &i_kh * &self.p * i_kh.transpose() + &k * &self.r * k.transpose();
        self.p = symmetrize(&self.p);
        Ok(())
    }
}

impl StateEstimator for KalmanFilter {
    fn estimate(&mut self, t: f64, u: &Input, z: &Output) -> Result<()> {
        let dt = step_dt(self.t, t)?;
        if u.nrows() != self.model.inputs().len() {
            return Err(ProgError::DimensionMismatch {
                context: "Kalman filter input",
                expected: self.model.inputs().len(),
                actual: u.nrows(),
            });
        }
        if z.nrows() != self.model.outputs().len() {
            return Err(ProgError::DimensionMismatch {
                context: "Kalman filter measurement",
                expected: self.model.outputs().len(),
                actual: z.nrows(),
            });
        }

        self.predict(u, dt);
        self.update(z)?;
        self.t = t;
        debug!(t, trace_p = self.p.trace(), "Kalman filter step");
        Ok(())
    }

    fn x(&self) -> UncertainData {
        UncertainData::Normal(MultivariateNormalDist::new_unchecked(
            self.model.states().to_vec(),
            self.x.clone(),
            self.p.clone(),
        ))
    }

    fn t(&self) -> f64 {
        self.t
    }
}
