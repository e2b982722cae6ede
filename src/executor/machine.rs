//! Machine state
//!
//! Holds the confirmed state of one machine and applies motion commands
//! through its actuator. State is committed only from actuator
//! confirmations; a failed command leaves the last confirmed state in place
//! and latches the machine into ERROR.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::actuator::{Actuator, ActuatorError};
use crate::error::{Error, Result};
use crate::translator::TranslationContext;
use crate::types::{
    CncMachine, Confirmation, MachineStatus, MotionCommand, Tool, ToolStatus, ToolType,
};

use super::ControllerEvent;

/// Confirmed state of one machine plus the actuator that drives it
pub struct MachineState {
    machine_id: String,
    snapshot: Arc<RwLock<CncMachine>>,
    actuator: Arc<dyn Actuator>,
    tolerance: f64,
    events: broadcast::Sender<ControllerEvent>,
}

impl MachineState {
    pub fn new(
        machine: CncMachine,
        actuator: Arc<dyn Actuator>,
        tolerance: f64,
        events: broadcast::Sender<ControllerEvent>,
    ) -> Self {
        Self {
            machine_id: machine.machine_id.clone(),
            snapshot: Arc::new(RwLock::new(machine)),
            actuator,
            tolerance,
            events,
        }
    }

    pub fn machine_id(&self) -> &str {
        &self.machine_id
    }

    /// Shared read handle for status queries
    pub fn shared(&self) -> Arc<RwLock<CncMachine>> {
        self.snapshot.clone()
    }

    /// Point-in-time copy
    pub fn snapshot(&self) -> CncMachine {
        self.snapshot.read().clone()
    }

    pub fn status(&self) -> MachineStatus {
        self.snapshot.read().status
    }

    /// Set the machine status, returning the previous one
    pub fn set_status(&self, status: MachineStatus) -> MachineStatus {
        let mut machine = self.snapshot.write();
        let previous = machine.status;
        if previous != status {
            machine.status = status;
            info!(
                machine_id = %self.machine_id,
                from = %previous,
                to = %status,
                "Machine status changed"
            );
            let _ = self.events.send(ControllerEvent::MachineStatusChanged {
                machine_id: self.machine_id.clone(),
                status,
                at: Utc::now(),
            });
        }
        previous
    }

    /// Translation context starting from the confirmed state
    pub fn translation_context(&self) -> TranslationContext {
        TranslationContext::from_machine(&self.snapshot.read())
    }

    /// Apply one command and commit the confirmed outcome
    pub async fn apply(&self, command: &MotionCommand) -> Result<Confirmation> {
        if let MotionCommand::MoveTo { target, .. } = command {
            self.snapshot.write().target_position = *target;
        }

        debug!(machine_id = %self.machine_id, command = %command, "Applying motion command");

        self.actuator
            .apply(command)
            .await
            .and_then(|confirmation| self.commit(command, &confirmation).map(|_| confirmation))
            .map_err(|source| self.fail(command, source))
    }

    /// Clear the actuator's alarm state
    pub async fn reset_actuator(&self) -> Result<()> {
        self.actuator.reset().await.map_err(|source| Error::Actuator {
            machine_id: self.machine_id.clone(),
            source,
        })
    }

    fn commit(
        &self,
        command: &MotionCommand,
        confirmation: &Confirmation,
    ) -> std::result::Result<(), ActuatorError> {
        let mut machine = self.snapshot.write();
        match (command, confirmation) {
            (MotionCommand::MoveTo { target, .. }, Confirmation::Position(confirmed)) => {
                machine.current_position = *confirmed;
                machine.target_position = *confirmed;
                if !confirmed.approx_eq(target, self.tolerance) {
                    return Err(ActuatorError::PositionMismatch {
                        commanded: *target,
                        confirmed: *confirmed,
                    });
                }
            }
            (MotionCommand::SetSpeed { .. }, Confirmation::Speed(speed)) => {
                machine.speed = *speed;
            }
            (MotionCommand::ChangeTool { tool_id }, Confirmation::Tool(mounted))
                if mounted == tool_id =>
            {
                mount_tool(&mut machine, tool_id);
            }
            _ => {
                return Err(ActuatorError::UnexpectedConfirmation {
                    command: command.kind().to_string(),
                })
            }
        }
        Ok(())
    }

    fn fail(&self, command: &MotionCommand, source: ActuatorError) -> Error {
        {
            let mut machine = self.snapshot.write();
            machine.target_position = machine.current_position;
            if let MotionCommand::ChangeTool { tool_id } = command {
                if let Some(tool) = machine.tools.iter_mut().find(|t| &t.id == tool_id) {
                    tool.status = ToolStatus::Faulted;
                }
            }
        }
        warn!(
            machine_id = %self.machine_id,
            command = %command,
            error = %source,
            "Motion command failed"
        );
        self.set_status(MachineStatus::Error);
        Error::Actuator {
            machine_id: self.machine_id.clone(),
            source,
        }
    }
}

fn mount_tool(machine: &mut CncMachine, tool_id: &str) {
    if let Some(previous) = machine.current_tool.take() {
        if let Some(tool) = machine.tools.iter_mut().find(|t| t.id == previous.id) {
            if tool.status == ToolStatus::Mounted {
                tool.status = ToolStatus::Idle;
            }
        }
    }

    let index = match machine.tools.iter().position(|t| t.id == tool_id) {
        Some(index) => index,
        None => {
            machine.tools.push(Tool::new(tool_id, ToolType::Other));
            machine.tools.len() - 1
        }
    };
    machine.tools[index].status = ToolStatus::Mounted;
    machine.current_tool = Some(machine.tools[index].clone());
}
