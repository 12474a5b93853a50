// prog_core/src/models/linear.rs

use nalgebra::{DMatrix, DVector};

use super::PrognosticsModel;
use crate::error::{ProgError, Result};
use crate::types::{EventState, Input, Output, State};

/// The matrices of a continuous-time linear model:
///
/// `dx/dt = A x + B u + E`, `z = C x + D`.
///
/// `E` is a constant state-rate offset (e.g., gravity) and `D` a constant
/// output offset. The Kalman filter discretizes this with a first-order hold.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearSystem {
    pub a: DMatrix<f64>,
    pub b: DMatrix<f64>,
    pub c: DMatrix<f64>,
    pub d: DVector<f64>,
    pub e: DVector<f64>,
}

impl LinearSystem {
    /// Checks that every matrix agrees with the given state/input/output sizes.
    pub fn validate(&self, n_states: usize, n_inputs: usize, n_outputs: usize) -> Result<()> {
        let checks: [(&'static str, usize, usize); 8] = [
            ("A rows", n_states, self.a.nrows()),
            ("A cols", n_states, self.a.ncols()),
            ("B rows", n_states, self.b.nrows()),
            ("B cols", n_inputs, self.b.ncols()),
            ("C rows", n_outputs, self.c.nrows()),
            ("C cols", n_states, self.c.ncols()),
            ("D", n_outputs, self.d.nrows()),
            ("E", n_states, self.e.nrows()),
        ];
        for (context, expected, actual) in checks {
            if expected != actual {
                return Err(ProgError::DimensionMismatch {
                    context,
                    expected,
                    actual,
                });
            }
        }
        Ok(())
    }

    /// Discrete transition matrix `F = I + A dt`.
    pub fn transition(&self, dt: f64) -> DMatrix<f64> {
        DMatrix::identity(self.a.nrows(), self.a.ncols()) + &self.a * dt
    }

    /// Discrete augmented control matrix `[B | E] dt`, paired with the input `[u; 1]`.
    pub fn augmented_control(&self, dt: f64) -> DMatrix<f64> {
        let n = self.b.nrows();
        let m = self.b.ncols();
        let mut b_aug = DMatrix::zeros(n, m + 1);
        b_aug.view_mut((0, 0), (n, m)).copy_from(&self.b);
        b_aug.set_column(m, &self.e);
        b_aug * dt
    }
}

/// A generic linear model built from its matrices, with linear event states
/// `es = F x + G`.
#[derive(Debug, Clone)]
pub struct LinearModel {
    states: Vec<String>,
    inputs: Vec<String>,
    outputs: Vec<String>,
    events: Vec<String>,
    system: LinearSystem,
    f: DMatrix<f64>,
    g: DVector<f64>,
    process_noise: DVector<f64>,
    measurement_noise: DVector<f64>,
}

impl LinearModel {
    /// # Arguments
    /// * `states`, `inputs`, `outputs`: Ordered names, matching the matrix dimensions.
    /// * `system`: The `A, B, C, D, E` matrices.
    pub fn new(
        states: Vec<String>,
        inputs: Vec<String>,
        outputs: Vec<String>,
        system: LinearSystem,
    ) -> Result<Self> {
        system.validate(states.len(), inputs.len(), outputs.len())?;
        let n = states.len();
        let n_z = outputs.len();
        Ok(Self {
            states,
            inputs,
            outputs,
            events: Vec::new(),
            system,
            f: DMatrix::zeros(0, n),
            g: DVector::zeros(0),
            process_noise: DVector::zeros(n),
            measurement_noise: DVector::zeros(n_z),
        })
    }

    /// Adds events whose event state is `F x + G`.
    pub fn with_events(mut self, events: Vec<String>, f: DMatrix<f64>, g: DVector<f64>) -> Result<Self> {
        if f.nrows() != events.len() || f.ncols() != self.states.len() {
            return Err(ProgError::DimensionMismatch {
                context: "LinearModel event matrix F",
                expected: events.len(),
                actual: f.nrows(),
            });
        }
        if g.nrows() != events.len() {
            return Err(ProgError::DimensionMismatch {
                context: "LinearModel event offset G",
                expected: events.len(),
                actual: g.nrows(),
            });
        }
        self.events = events;
        self.f = f;
        self.g = g;
        Ok(self)
    }

    pub fn with_process_noise(mut self, std: DVector<f64>) -> Result<Self> {
        if std.nrows() != self.states.len() {
            return Err(ProgError::DimensionMismatch {
                context: "LinearModel process noise",
                expected: self.states.len(),
                actual: std.nrows(),
            });
        }
        self.process_noise = std;
        Ok(self)
    }

    pub fn with_measurement_noise(mut self, std: DVector<f64>) -> Result<Self> {
        if std.nrows() != self.outputs.len() {
            return Err(ProgError::DimensionMismatch {
                context: "LinearModel measurement noise",
                expected: self.outputs.len(),
                actual: std.nrows(),
            });
        }
        self.measurement_noise = std;
        Ok(self)
    }
}

impl PrognosticsModel for LinearModel {
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

    /// Least-squares inversion of the output equation.
    fn initialize(&self, _u: &Input, z: &Output) -> State {
        let c = &self.system.c;
        let rhs = z - &self.system.d;
        c.clone()
            .svd(true, true)
            .solve(&rhs, 1e-12)
            .unwrap_or_else(|_| DVector::zeros(self.states.len()))
    }

    fn next_state(&self, x: &State, u: &Input, dt: f64) -> State {
        let s = &self.system;
        x + (&s.a * x + &s.b * u + &s.e) * dt
    }

    fn output(&self, x: &State) -> Output {
        &self.system.c * x + &self.system.d
    }

    fn event_state(&self, x: &State) -> EventState {
        &self.f * x + &self.g
    }

    fn process_noise(&self) -> DVector<f64> {
        self.process_noise.clone()
    }

    fn measurement_noise(&self) -> DVector<f64> {
        self.measurement_noise.clone()
    }

    fn linear_system(&self) -> Option<LinearSystem> {
        Some(self.system.clone())
    }
}
