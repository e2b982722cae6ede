//! Actuator capability
//!
//! The hardware-facing side of the controller. An actuator performs one
//! motion command at a time and confirms what the machine actually did.
//! Retries, if any, belong here and not in the executor.

mod bounded;
mod simulated;

pub use bounded::BoundedActuator;
pub use simulated::{SimulatedActuator, SimulatorConfig};

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{Confirmation, MotionCommand, Position};

/// Hardware or confirmation failure
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ActuatorError {
    /// The controller refused the command
    #[error("command rejected: {reason}")]
    Rejected { reason: String },

    /// No confirmation within the bounded wait
    #[error("no confirmation within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Confirmed position differs from the commanded target
    #[error("position mismatch: commanded {commanded}, confirmed {confirmed}")]
    PositionMismatch {
        commanded: Position,
        confirmed: Position,
    },

    /// Confirmation does not answer the command that was sent
    #[error("unexpected confirmation for {command}")]
    UnexpectedConfirmation { command: String },

    /// Hardware fault
    #[error("hardware fault: {0}")]
    Fault(String),
}

/// Core trait for machine actuators
///
/// Implementations must be object-safe for dynamic dispatch; the executor
/// holds them as `Arc<dyn Actuator>`.
#[async_trait]
pub trait Actuator: Send + Sync {
    /// Actuator name for logs (e.g., "simulated", "grbl")
    fn name(&self) -> &str;

    /// Perform a command and report the confirmed outcome
    async fn apply(&self, command: &MotionCommand) -> Result<Confirmation, ActuatorError>;

    /// Clear a hardware alarm after an operator reset
    async fn reset(&self) -> Result<(), ActuatorError> {
        Ok(())
    }
}
