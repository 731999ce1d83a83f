//! Error types for the detection engine.

use thiserror::Error;

/// Errors raised by the engine.
///
/// `InsufficientData`, `NoFeatureColumns` and `InvalidHyperparameter` are
/// contract violations on input and are reported before any algorithm runs.
/// `DegenerateResult` is produced by an individual algorithm; the consensus
/// orchestrator turns it into a failed record instead of propagating it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("insufficient data: {rows} usable rows, at least {min_rows} required")]
    InsufficientData { rows: usize, min_rows: usize },

    #[error("none of the candidate feature columns are present in the table")]
    NoFeatureColumns,

    #[error("invalid hyperparameter {param}={value}: {constraint}")]
    InvalidHyperparameter {
        param: &'static str,
        value: String,
        constraint: String,
    },

    #[error("{algorithm} produced a degenerate result: {reason}")]
    DegenerateResult {
        algorithm: &'static str,
        reason: String,
    },

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: String, actual: String },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl EngineError {
    pub(crate) fn invalid(
        param: &'static str,
        value: impl ToString,
        constraint: impl Into<String>,
    ) -> Self {
        Self::InvalidHyperparameter {
            param,
            value: value.to_string(),
            constraint: constraint.into(),
        }
    }

    pub(crate) fn degenerate(algorithm: &'static str, reason: impl Into<String>) -> Self {
        Self::DegenerateResult {
            algorithm,
            reason: reason.into(),
        }
    }

    pub fn is_degenerate(&self) -> bool {
        matches!(self, Self::DegenerateResult { .. })
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
