//! Error types reported by the simulation engine.
//!
//! Failures fall into three families, each inspectable by the caller:
//!
//! - invalid input (`InvalidParameter`, `InvalidCoupling`, `DimensionMismatch`),
//!   rejected before any computation starts;
//! - `DegenerateState`, a reduction that has no meaningful value (for example a
//!   percentage breakdown of an empty population);
//! - `NumericalFailure`, raised when the integrator cannot produce a trustworthy
//!   trajectory.

use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

/// Reason an integration run was abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum NumericalFailure {
    /// The model produced NaN or an infinite derivative.
    NonFiniteDerivative,
    /// The adaptive controller shrank the step below what `t` can resolve.
    StepSizeUnderflow { step: f64 },
    /// The configured step budget ran out before the horizon was reached.
    MaxStepsExceeded { steps: usize },
}

impl std::fmt::Display for NumericalFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NumericalFailure::NonFiniteDerivative => write!(f, "non-finite derivative"),
            NumericalFailure::StepSizeUnderflow { step } => {
                write!(f, "step size underflow (dt = {step:e})")
            }
            NumericalFailure::MaxStepsExceeded { steps } => {
                write!(f, "exceeded the budget of {steps} steps")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// Out-of-range rate, non-positive population, or similar.
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: String, reason: String },

    /// A malformed cross-population coefficient or travel entry.
    #[error("invalid coupling {origin} -> {destination}: {reason}")]
    InvalidCoupling {
        origin: String,
        destination: String,
        reason: String,
    },

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("degenerate state: {reason}")]
    DegenerateState { reason: String },

    #[error("numerical failure at t = {time}: {failure}")]
    NumericalFailure { time: f64, failure: NumericalFailure },
}

impl EngineError {
    pub(crate) fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        EngineError::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn coupling(
        origin: impl Into<String>,
        destination: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        EngineError::InvalidCoupling {
            origin: origin.into(),
            destination: destination.into(),
            reason: reason.into(),
        }
    }

    /// True for errors raised before any computation took place.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidParameter { .. }
                | EngineError::InvalidCoupling { .. }
                | EngineError::DimensionMismatch { .. }
        )
    }

    pub fn is_numerical(&self) -> bool {
        matches!(self, EngineError::NumericalFailure { .. })
    }
}
