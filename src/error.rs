//! Error types shared by every layer.

use crate::check::ShapePattern;
use briny::prelude::ValidationError;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = core::result::Result<T, LayerError>;

/// A tensor did not match the `(nB, nI)` / `(nB, nO)` contract of a call.
///
/// This is a wiring error upstream (mismatched layer widths, a gradient from
/// the wrong forward pass) and is never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("shape contract violated in `{op}`: expected {expected}, got {got:?}")]
pub struct ShapeContractError {
    /// The operation whose precondition failed.
    pub op: &'static str,
    pub expected: ShapePattern,
    pub got: Vec<usize>,
}

#[derive(Debug, Error)]
pub enum LayerError {
    #[error(transparent)]
    Shape(#[from] ShapeContractError),

    #[error("drop rate must lie in [0, 1), got {0}")]
    InvalidDropRate(f64),

    #[error("invalid layer config: {0}")]
    Config(String),

    #[error("layer config failed validation: {0}")]
    Validation(#[from] ValidationError),

    #[error("failed to read layer config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse layer config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("optimizer failed: {0}")]
    Optimizer(String),

    #[error("parameter store lock poisoned")]
    PoisonedParams,
}

impl LayerError {
    /// The shape violation behind this error, if that is what it is.
    pub fn as_shape(&self) -> Option<&ShapeContractError> {
        match self {
            Self::Shape(err) => Some(err),
            _ => None,
        }
    }
}

/// Rejects drop rates outside `[0, 1)`, including `NaN`.
pub(crate) fn check_drop_rate(drop: f64) -> Result<()> {
    if (0.0..1.0).contains(&drop) {
        Ok(())
    } else {
        Err(LayerError::InvalidDropRate(drop))
    }
}
