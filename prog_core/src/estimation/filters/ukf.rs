// prog_core/src/estimation/filters/ukf.rs

use nalgebra::{DMatrix, DVector};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use crate::error::{ProgError, Result};
use crate::estimation::sigma_points::{MerweScaledSigmaPoints, SigmaPointParams};
use crate::estimation::{
    check_square, diagonal_matrix, prior_in_model_order, step_dt, MeasurementEqn, StateEstimator,
};
use crate::models::PrognosticsModel;
use crate::types::{Input, Output, State};
use crate::uncertain_data::{MultivariateNormalDist, UncertainData};
use crate::utils::linalg::symmetrize;

/// Settings of the unscented Kalman filter.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UkfConfig {
    /// Sigma point spread.
    pub alpha: f64,
    /// Prior knowledge of the distribution (2.0 is optimal for Gaussian).
    pub beta: f64,
    /// Secondary scaling parameter.
    pub kappa: f64,
    /// Time of the initial state (s).
    pub t0: f64,
    /// Process noise covariance added at each predict step. Defaults to `0.1 * I`.
    #[serde(deserialize_with = "diagonal_matrix")]
    pub q: Option<DMatrix<f64>>,
    /// Measurement noise covariance, sized by what is measured. Defaults to `0.1 * I`.
    #[serde(deserialize_with = "diagonal_matrix")]
    pub r: Option<DMatrix<f64>>,
}

impl UkfConfig {
    pub fn sigma_point_params(&self) -> SigmaPointParams {
        SigmaPointParams {
            alpha: self.alpha,
            beta: self.beta,
            kappa: self.kappa,
        }
    }
}

impl Default for UkfConfig {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            beta: 0.0,
            kappa: 0.0,
            t0: -1e-10,
            q: None,
            r: None,
        }
    }
}

/// An unscented Kalman filter: the model's (possibly nonlinear) state
/// transition and measurement functions are applied to sigma points, and the
/// posterior is recovered with the unscented transform.
pub struct UnscentedKalmanFilter {
    model: Arc<dyn PrognosticsModel>,
    measurement_eqn: Option<MeasurementEqn>,
    points: MerweScaledSigmaPoints,
    q: DMatrix<f64>,
    r: DMatrix<f64>,

    // --- Filter state ---
    x: DVector<f64>,
    p: DMatrix<f64>,
    t: f64,
}

impl UnscentedKalmanFilter {
    pub fn new(model: Arc<dyn PrognosticsModel>, x0: UncertainData, config: UkfConfig) -> Result<Self> {
        Self::with_measurement_eqn(model, x0, None, config)
    }

    /// Creates a filter whose update compares the measurement against
    /// `measurement_eqn(x)` instead of the model's output.
    pub fn with_measurement_eqn(
        model: Arc<dyn PrognosticsModel>,
        x0: UncertainData,
        measurement_eqn: Option<MeasurementEqn>,
        config: UkfConfig,
    ) -> Result<Self> {
        let prior = prior_in_model_order(model.as_ref(), &x0)?;
        let n = prior.mean.nrows();
        let points = MerweScaledSigmaPoints::new(n, config.sigma_point_params())?;

        // The size of what is measured comes from evaluating the measurement once.
        let n_z = match &measurement_eqn {
            Some(measure) => measure(&prior.mean).nrows(),
            None => model.outputs().len(),
        };
        let q = config.q.unwrap_or_else(|| DMatrix::identity(n, n) * 0.1);
        let r = config.r.unwrap_or_else(|| DMatrix::identity(n_z, n_z) * 0.1);
        check_square("UKF Q", &q, n)?;
        check_square("UKF R", &r, n_z)?;

        let p = if prior.is_point { &q / 10.0 } else { prior.cov };

        Ok(Self {
            model,
            measurement_eqn,
            points,
            q,
            r,
            x: prior.mean,
            p,
            t: config.t0,
        })
    }

    fn measure(&self, x: &State) -> DVector<f64> {
        match &self.measurement_eqn {
            Some(measure) => measure(x),
            None => self.model.output(x),
        }
    }

    fn predict(&mut self, u: &Input, dt: f64) {
        let n = self.x.nrows();

        // --- 1. Generate Sigma Points ---
        let sigma_points = self.points.generate(&self.x, &self.p);

        // --- 2. Propagate each point through the NON-LINEAR dynamics model ---
        let mut propagated = DMatrix::zeros(n, self.points.num_points());
        for (i, point) in sigma_points.column_iter().enumerate() {
            let next = self.model.next_state(&point.into_owned(), u, dt);
            propagated.set_column(i, &next);
        }

        // --- 3. Recover the predicted mean and covariance ---
        let (x_pred, p_pred) = self.points.unscented_transform(&propagated, Some(&self.q));
        self.x = x_pred;
        self.p = p_pred;
    }

    fn update(&mut self, z: &Output) -> Result<()> {
        // --- 1. Generate new sigma points from the PREDICTED state ---
        let sigma_points = self.points.generate(&self.x, &self.p);

        // --- 2. Propagate points through the measurement function ---
        let mut measurement_points = DMatrix::zeros(z.nrows(), self.points.num_points());
        for (i, point) in sigma_points.column_iter().enumerate() {
            let z_point = self.measure(&point.into_owned());
            if z_point.nrows() != z.nrows() {
                return Err(ProgError::DimensionMismatch {
                    context: "UKF measurement",
                    expected: z_point.nrows(),
                    actual: z.nrows(),
                });
            }
            measurement_points.set_column(i, &z_point);
        }

        // --- 3. Recover the predicted measurement and its covariance ---
        let (z_pred, s_cov) = self.points.unscented_transform(&measurement_points, Some(&self.r));

        // --- 4. Calculate cross-covariance and Kalman Gain ---
        let t_cov = self
            .points
            .cross_covariance(&sigma_points, &self.x, &measurement_points, &z_pred);
        let s_inv = s_cov
            .clone()
            .try_inverse()
            .ok_or(ProgError::SingularMatrix("UKF innovation covariance"))?;
        let k_gain = t_cov * s_inv;

        // --- 5. Update state and covariance ---
        self.x += &k_gain * (z - z_pred);
        self.p -= &k_gain * s_cov * k_gain.transpose();
        self.p = symmetrize(&self.p);
        Ok(())
    }
}

impl StateEstimator for UnscentedKalmanFilter {
    fn estimate(&mut self, t: f64, u: &Input, z: &Output) -> Result<()> {
        let dt = step_dt(self.t, t)?;
        if z.nrows() != self.r.nrows() {
            return Err(ProgError::DimensionMismatch {
                context: "UKF measurement",
                expected: self.r.nrows(),
                actual: z.nrows(),
            });
        }
        self.predict(u, dt);
        self.update(z)?;
        self.t = t;
        debug!(t, trace_p = self.p.trace(), "UKF step");
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
