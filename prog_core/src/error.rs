// prog_core/src/error.rs

use thiserror::Error;

/// Every failure the core library can report.
///
/// Construction problems (a model that cannot serve a filter, an initial state
/// with missing keys) and ordering violations are raised immediately. Numerical
/// degeneracy is surfaced as-is and never retried.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProgError {
    /// The model lacks a capability the algorithm needs (e.g., a linear
    /// structure for the Kalman filter, or an empty state list).
    #[error("unsupported model: {0}")]
    UnsupportedModel(String),

    /// The initial state does not provide a value for a model state.
    #[error("initial state is missing state `{0}`")]
    MissingState(String),

    /// Two objects that must agree on shape or key layout do not.
    #[error("dimension mismatch in {context}: expected {expected}, got {actual}")]
    DimensionMismatch {
        context: &'static str,
        expected: usize,
        actual: usize,
    },

    /// `estimate` was called with a time that does not advance the filter.
    #[error("new time must be greater than previous (last: {last}, got: {t})")]
    NonIncreasingTime { last: f64, t: f64 },

    /// A matrix that must be inverted (or factored) was singular.
    #[error("singular matrix in {0}")]
    SingularMatrix(&'static str),

    /// Every particle weight was zero or non-finite after normalization.
    #[error("degenerate particle weights: no particle explains the measurement")]
    DegenerateWeights,

    /// A configuration value is out of its valid range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// An event name that the model does not define.
    #[error("unknown event `{0}`")]
    UnknownEvent(String),

    /// An operation needs at least one sample or profile entry.
    #[error("empty data: {0}")]
    EmptyData(&'static str),
}

pub type Result<T> = std::result::Result<T, ProgError>;
