//! Error taxonomy for encrypted network evaluation.
//!
//! Configuration problems (bad intervals, mismatched arities, broken wiring)
//! are detected eagerly when a topology or artifact is built and are fatal.
//! Runtime errors abort the whole inference request: there is no partial or
//! degraded result.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, KanFheError>;

/// Errors surfaced by the evaluator and the reference engine.
#[derive(Debug, Error)]
pub enum KanFheError {
    /// Approximation interval is empty, reversed, or non-finite.
    #[error("degenerate approximation interval [{lo}, {hi}]")]
    DegenerateInterval { lo: f64, hi: f64 },

    /// Approximation degree must be at least 1.
    #[error("invalid approximation degree {0} (must be >= 1)")]
    InvalidDegree(usize),

    /// A unit received a different number of inputs than it has coefficients.
    #[error("unit expects {expected} input(s), got {actual}")]
    CoefficientMismatch { expected: usize, actual: usize },

    /// Layer graph references a missing feature, unit, or later layer.
    #[error("invalid wiring: {0}")]
    InvalidWiring(String),

    /// Scheme configuration failed validation.
    #[error("invalid scheme parameters: {0}")]
    InvalidParams(String),

    /// Topology has no layers.
    #[error("network has no layers")]
    EmptyNetwork,

    /// An operation needed more multiplicative depth than the ciphertext has
    /// left. The orchestrator's pre-check is supposed to prevent this; seeing
    /// it at runtime means the refresh policy is wrong.
    #[error("multiplicative depth exhausted: need {needed} level(s), {available} left")]
    DepthExhausted { needed: usize, available: usize },

    /// Two ciphertext operands sit at different levels.
    #[error("ciphertext level mismatch: {lhs} vs {rhs}")]
    LevelMismatch { lhs: usize, rhs: usize },

    /// Two ciphertext operands carry incompatible scales.
    #[error("ciphertext scale mismatch: {lhs:e} vs {rhs:e}")]
    ScaleMismatch { lhs: f64, rhs: f64 },

    /// The collaborator engine reported an internal failure.
    #[error("homomorphic engine failure: {0}")]
    Engine(String),

    /// Model artifact could not be parsed or has an invalid shape.
    #[error("model artifact error: {0}")]
    Model(String),
}

impl From<serde_json::Error> for KanFheError {
    fn from(err: serde_json::Error) -> Self {
        KanFheError::Model(err.to_string())
    }
}
