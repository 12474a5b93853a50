// prog_core/src/models/thrown_object.rs

use nalgebra::{DMatrix, DVector};
use serde::Deserialize;

use super::{LinearModel, LinearSystem, PrognosticsModel};
use crate::error::Result;
use crate::types::{names, EventState, Input, Output, State};

/// Physical parameters of an object thrown straight up.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThrownObjectParams {
    /// Release height (m).
    pub thrower_height: f64,
    /// Initial upward speed (m/s).
    pub throwing_speed: f64,
    /// Gravitational acceleration (m/s^2, negative is down).
    pub g: f64,
    /// Process noise standard deviation, applied to every state.
    pub process_noise: f64,
    /// Measurement noise standard deviation of the position output.
    pub measurement_noise: f64,
}

impl Default for ThrownObjectParams {
    fn default() -> Self {
        Self {
            thrower_height: 1.83,
            throwing_speed: 40.0,
            g: -9.81,
            process_noise: 0.0,
            measurement_noise: 0.0,
        }
    }
}

// --- Thrown Object Model ---
// State: [x, v]. Explicit Euler integration of constant gravity.
// Two events: `falling` (velocity turns negative) and `impact` (hits the ground).
#[derive(Debug, Clone)]
pub struct ThrownObject {
    pub params: ThrownObjectParams,
    states: Vec<String>,
    inputs: Vec<String>,
    outputs: Vec<String>,
    events: Vec<String>,
}

impl ThrownObject {
    pub fn new(params: ThrownObjectParams) -> Self {
        Self {
            params,
            states: names(&["x", "v"]),
            inputs: Vec::new(),
            outputs: names(&["x"]),
            events: names(&["falling", "impact"]),
        }
    }
}

impl Default for ThrownObject {
    fn default() -> Self {
        Self::new(ThrownObjectParams::default())
    }
}

impl PrognosticsModel for ThrownObject {
    fn states(&self) -> &[String] {
        &self.states
    }

    fn inputs(&self) -> &[String] {
        &self.inputs
    }

    fn outputs(&self) -> &[String] {
        &self.outputs
    }

    fn events(&self) -> &[String] {
        &self.events
    }

    fn initialize(&self, _u: &Input, _z: &Output) -> State {
        DVector::from_vec(vec![self.params.thrower_height, self.params.throwing_speed])
    }

    fn next_state(&self, x: &State, _u: &Input, dt: f64) -> State {
        DVector::from_vec(vec![x[0] + x[1] * dt, x[1] + self.params.g * dt])
    }

    fn output(&self, x: &State) -> Output {
        DVector::from_vec(vec![x[0]])
    }

    fn event_state(&self, x: &State) -> EventState {
        let (pos, vel) = (x[0], x[1]);
        // A throw with no upward speed starts at its apex.
        let falling = if self.params.throwing_speed > 0.0 {
            (vel / self.params.throwing_speed).max(0.0)
        } else {
            0.0
        };
        // Until it starts falling the impact event is untouched; afterwards it
        // is the fraction of the peak height still above ground.
        let impact = if vel < 0.0 {
            let x_max = pos + vel * vel / (-2.0 * self.params.g);
            if x_max > 0.0 {
                (pos / x_max).max(0.0)
            } else {
                0.0
            }
        } else {
            1.0
        };
        DVector::from_vec(vec![falling, impact])
    }

    fn threshold_met(&self, x: &State) -> Vec<bool> {
        vec![x[1] < 0.0, x[0] <= 0.0]
    }

    fn process_noise(&self) -> DVector<f64> {
        DVector::from_element(2, self.params.process_noise)
    }

    fn measurement_noise(&self) -> DVector<f64> {
        DVector::from_element(1, self.params.measurement_noise)
    }

    // The Euler step above is exactly `x + (A x + E) dt`.
    fn linear_system(&self) -> Option<LinearSystem> {
        Some(thrown_object_system(self.params.g))
    }
}

fn thrown_object_system(g: f64) -> LinearSystem {
    LinearSystem {
        a: DMatrix::from_row_slice(2, 2, &[0.0, 1.0, 0.0, 0.0]),
        b: DMatrix::zeros(2, 0),
        c: DMatrix::from_row_slice(1, 2, &[1.0, 0.0]),
        d: DVector::zeros(1),
        e: DVector::from_vec(vec![0.0, g]),
    }
}

/// The thrown object as a pure [`LinearModel`] with a single `impact` event,
/// whose event state is the height as a fraction of the peak height.
#[derive(Debug, Clone)]
pub struct LinearThrownObject {
    pub params: ThrownObjectParams,
    inner: LinearModel,
}

impl LinearThrownObject {
    pub fn new(params: ThrownObjectParams) -> Result<Self> {
        let peak = params.thrower_height
            + params.throwing_speed * params.throwing_speed / (-2.0 * params.g);
        let inner = LinearModel::new(
            names(&["x", "v"]),
            Vec::new(),
            names(&["x"]),
            thrown_object_system(params.g),
        )?
        .with_events(
            names(&["impact"]),
            DMatrix::from_row_slice(1, 2, &[1.0 / peak, 0.0]),
            DVector::zeros(1),
        )?
        .with_process_noise(DVector::from_element(2, params.process_noise))?
        .with_measurement_noise(DVector::from_element(1, params.measurement_noise))?;
        Ok(Self { params, inner })
    }
}

impl PrognosticsModel for LinearThrownObject {
    fn states(&self) -> &[String] {
        self.inner.states()
    }

    fn inputs(&self) -> &[String] {
        self.inner.inputs()
    }

    fn outputs(&self) -> &[String] {
        self.inner.outputs()
    }

    fn events(&self) -> &[String] {
        self.inner.events()
    }

    fn initialize(&self, _u: &Input, _z: &Output) -> State {
        DVector::from_vec(vec![self.params.thrower_height, self.params.throwing_speed])
    }

    fn next_state(&self, x: &State, u: &Input, dt: f64) -> State {
        self.inner.next_state(x, u, dt)
    }

    fn output(&self, x: &State) -> Output {
        self.inner.output(x)
    }

    fn event_state(&self, x: &State) -> EventState {
        self.inner.event_state(x)
    }

    fn process_noise(&self) -> DVector<f64> {
        self.inner.process_noise()
    }

    fn measurement_noise(&self) -> DVector<f64> {
        self.inner.measurement_noise()
    }

    fn linear_system(&self) -> Option<LinearSystem> {
        self.inner.linear_system()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_event_state_without_throwing_speed() {
        let m = ThrownObject::new(ThrownObjectParams {
            throwing_speed: 0.0,
            ..Default::default()
        });
        let x = m.initialize(&Input::zeros(0), &Output::zeros(1));
        let es = m.event_state(&x);
        assert!(es.iter().all(|v| v.is_finite()));
        assert_eq!(es[0], 0.0);
        assert_eq!(es[1], 1.0);
    }

    #[test]
    fn test_euler_step() {
        let m = ThrownObject::default();
        let x0 = m.initialize(&DVector::zeros(0), &DVector::zeros(1));
        let x1 = m.next_state(&x0, &DVector::zeros(0), 0.1);
        assert_abs_diff_eq!(x1[0], 1.83 + 4.0, epsilon = 1e-12);
        assert_abs_diff_eq!(x1[1], 40.0 - 0.981, epsilon = 1e-12);
    }

    #[test]
    fn test_events() {
        let m = ThrownObject::default();
        assert_eq!(m.threshold_met(&DVector::from_vec(vec![10.0, 5.0])), vec![false, false]);
        assert_eq!(m.threshold_met(&DVector::from_vec(vec![10.0, -5.0])), vec![true, false]);
        assert_eq!(m.threshold_met(&DVector::from_vec(vec![0.0, -5.0])), vec![true, true]);

        let es = m.event_state(&DVector::from_vec(vec![10.0, 20.0]));
        assert_abs_diff_eq!(es[0], 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(es[1], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_linear_variant_agrees_with_euler_model() {
        let params = ThrownObjectParams::default();
        let nonlinear = ThrownObject::new(params.clone());
        let linear = LinearThrownObject::new(params).unwrap();
        let mut a = nonlinear.initialize(&DVector::zeros(0), &DVector::zeros(1));
        let mut b = a.clone();
        for _ in 0..50 {
            a = nonlinear.next_state(&a, &DVector::zeros(0), 0.1);
            b = linear.next_state(&b, &DVector::zeros(0), 0.1);
        }
        assert_abs_diff_eq!(a, b, epsilon = 1e-9);
        assert_eq!(linear.events(), &["impact".to_string()]);
        assert_eq!(linear.threshold_met(&DVector::from_vec(vec![-0.1, -3.0])), vec![true]);
    }
}
