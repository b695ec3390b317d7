//! Error types for the regulation engine

use psu_protocol::ProtocolError;
use thiserror::Error;

use crate::state::Axis;

/// A change request that was refused without touching channel state
///
/// Safe to retry with a corrected value.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    /// Value is NaN or infinite
    #[error("{axis} must be a finite number, got {value}")]
    NotFinite { axis: Axis, value: f64 },

    /// Value is below zero
    #[error("{axis} cannot be negative, got {value}")]
    Negative { axis: Axis, value: f64 },

    /// Value is above the envelope ceiling for its axis
    #[error("{axis} {value} exceeds the maximum of {max}")]
    ExceedsMaximum { axis: Axis, value: f64, max: f64 },

    /// Power was requested while power is not held constant
    #[error("power can only be requested while constant power is enabled")]
    ConstantPowerDisabled,

    /// Envelope ceilings must be positive and finite
    #[error("maximum {axis} must be positive, got {value}")]
    InvalidEnvelope { axis: Axis, value: f64 },
}

/// Errors returned by regulation engine operations
#[derive(Debug, Error)]
pub enum RegulationError {
    /// The request was rejected before any command was issued
    #[error("rejected: {0}")]
    Validation(#[from] ValidationError),

    /// The instrument could not be reached or answered nonsense
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl RegulationError {
    /// Returns true if the request was rejected by validation
    pub fn is_validation(&self) -> bool {
        matches!(self, RegulationError::Validation(_))
    }
}
