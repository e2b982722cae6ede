//! Simulated actuator
//!
//! An in-process machine used by the CLI and by tests. It honours travel
//! limits and a tool rack, can inject failures, and can be paused to hold a
//! command in flight.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Notify};
use tracing::{debug, warn};

use crate::types::{Confirmation, MotionCommand, Position};

use super::{Actuator, ActuatorError};

// ─────────────────────────────────────────────────────────────────
// Simulator Configuration
// ─────────────────────────────────────────────────────────────────

/// Behaviour of the simulated machine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Simulated time per command (ms)
    pub command_latency_ms: u64,

    /// Lower travel limit per axis
    #[serde(skip_serializing_if = "Option::is_none")]
    pub travel_min: Option<Position>,

    /// Upper travel limit per axis
    #[serde(skip_serializing_if = "Option::is_none")]
    pub travel_max: Option<Position>,

    /// Tools physically present (None = any tool mounts)
    #[serde(skip)]
    pub tool_rack: Option<Vec<String>>,

    /// Fail the n-th command (1-based) with a hardware fault
    #[serde(skip)]
    pub fail_at: Option<usize>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            command_latency_ms: 0,
            travel_min: None,
            travel_max: None,
            tool_rack: None,
            fail_at: None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Simulated Actuator
// ─────────────────────────────────────────────────────────────────

/// Simulated implementation of Actuator
pub struct SimulatedActuator {
    config: SimulatorConfig,
    position: RwLock<Position>,
    mounted_tool: RwLock<Option<String>>,
    /// Commands confirmed, in order
    applied: RwLock<Vec<MotionCommand>>,
    started: AtomicUsize,
    started_notify: Notify,
    alarm: AtomicBool,
    paused: watch::Sender<bool>,
}

impl SimulatedActuator {
    /// Create a simulator starting at the given position
    pub fn new(config: SimulatorConfig, position: Position) -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            config,
            position: RwLock::new(position),
            mounted_tool: RwLock::new(None),
            applied: RwLock::new(Vec::new()),
            started: AtomicUsize::new(0),
            started_notify: Notify::new(),
            alarm: AtomicBool::new(false),
            paused,
        }
    }

    /// Simulator at the origin with default behaviour
    pub fn with_defaults() -> Self {
        Self::new(SimulatorConfig::default(), Position::ORIGIN)
    }

    /// Commands confirmed so far
    pub fn applied(&self) -> Vec<MotionCommand> {
        self.applied.read().clone()
    }

    /// Physical position of the simulated machine
    pub fn position(&self) -> Position {
        *self.position.read()
    }

    /// Tool currently in the spindle
    pub fn mounted_tool(&self) -> Option<String> {
        self.mounted_tool.read().clone()
    }

    /// Whether a fault is latched
    pub fn in_alarm(&self) -> bool {
        self.alarm.load(Ordering::SeqCst)
    }

    /// Hold every command until `resume`
    pub fn pause(&self) {
        self.paused.send_replace(true);
    }

    pub fn resume(&self) {
        self.paused.send_replace(false);
    }

    /// Wait until at least `n` commands have been started
    pub async fn wait_for_started(&self, n: usize) {
        loop {
            let notified = self.started_notify.notified();
            if self.started.load(Ordering::SeqCst) >= n {
                return;
            }
            notified.await;
        }
    }

    fn fault(&self, reason: String) -> ActuatorError {
        self.alarm.store(true, Ordering::SeqCst);
        warn!(reason = %reason, "Simulated actuator fault");
        ActuatorError::Fault(reason)
    }

    fn perform(&self, command: &MotionCommand) -> Result<Confirmation, ActuatorError> {
        match command {
            MotionCommand::MoveTo { target, .. } => {
                if let (Some(min), Some(max)) = (&self.config.travel_min, &self.config.travel_max) {
                    if !target.within(min, max) {
                        return Err(ActuatorError::Rejected {
                            reason: format!("target {} outside travel limits", target),
                        });
                    }
                }
                *self.position.write() = *target;
                Ok(Confirmation::Position(*target))
            }
            MotionCommand::SetSpeed { speed } => Ok(Confirmation::Speed(*speed)),
            MotionCommand::ChangeTool { tool_id } => {
                if let Some(rack) = &self.config.tool_rack {
                    if !rack.iter().any(|t| t == tool_id) {
                        return Err(self.fault(format!("tool {} not in rack", tool_id)));
                    }
                }
                *self.mounted_tool.write() = Some(tool_id.clone());
                Ok(Confirmation::Tool(tool_id.clone()))
            }
        }
    }
}

#[async_trait]
impl Actuator for SimulatedActuator {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn apply(&self, command: &MotionCommand) -> Result<Confirmation, ActuatorError> {
        let call = self.started.fetch_add(1, Ordering::SeqCst) + 1;
        self.started_notify.notify_waiters();

        let mut paused = self.paused.subscribe();
        // Sender lives as long as self, so this cannot fail.
        let _ = paused.wait_for(|p| !*p).await;

        if self.config.command_latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.command_latency_ms)).await;
        }

        if self.in_alarm() {
            return Err(ActuatorError::Rejected {
                reason: "alarm active, reset required".to_string(),
            });
        }
        if self.config.fail_at == Some(call) {
            return Err(self.fault(format!("injected failure on command {}", call)));
        }

        let confirmation = self.perform(command)?;
        debug!(command = %command, "Simulated command confirmed");
        self.applied.write().push(command.clone());
        Ok(confirmation)
    }

    async fn reset(&self) -> Result<(), ActuatorError> {
        self.alarm.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_move_confirms_target() {
        let sim = SimulatedActuator::with_defaults();
        let target = Position::new(1.0, 2.0, 3.0);
        let c = sim.apply(&MotionCommand::MoveTo { target, speed: 100 }).await.unwrap();
        assert_eq!(c, Confirmation::Position(target));
        assert_eq!(sim.position(), target);
        assert_eq!(sim.applied().len(), 1);
    }

    #[tokio::test]
    async fn test_travel_limits() {
        let config = SimulatorConfig {
            travel_min: Some(Position::new(0.0, 0.0, -10.0)),
            travel_max: Some(Position::new(100.0, 100.0, 0.0)),
            ..Default::default()
        };
        let sim = SimulatedActuator::new(config, Position::ORIGIN);
        let err = sim
            .apply(&MotionCommand::MoveTo { target: Position::new(200.0, 0.0, 0.0), speed: 1 })
            .await
            .unwrap_err();
        assert!(matches!(err, ActuatorError::Rejected { .. }));
        assert_eq!(sim.position(), Position::ORIGIN);
        assert!(!sim.in_alarm());
    }

    #[tokio::test]
    async fn test_tool_rack_fault_latches_alarm() {
        let config = SimulatorConfig {
            tool_rack: Some(vec!["T1".to_string()]),
            ..Default::default()
        };
        let sim = SimulatedActuator::new(config, Position::ORIGIN);
        let err = sim
            .apply(&MotionCommand::ChangeTool { tool_id: "bad-id".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, ActuatorError::Fault(_)));
        assert!(sim.in_alarm());

        // Alarm rejects everything until reset
        assert!(sim.apply(&MotionCommand::SetSpeed { speed: 10 }).await.is_err());
        sim.reset().await.unwrap();
        assert!(sim.apply(&MotionCommand::ChangeTool { tool_id: "T1".into() }).await.is_ok());
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let config = SimulatorConfig { fail_at: Some(2), ..Default::default() };
        let sim = SimulatedActuator::new(config, Position::ORIGIN);
        assert!(sim.apply(&MotionCommand::SetSpeed { speed: 10 }).await.is_ok());
        assert!(sim.apply(&MotionCommand::SetSpeed { speed: 20 }).await.is_err());
        assert_eq!(sim.applied(), vec![MotionCommand::SetSpeed { speed: 10 }]);
    }

    #[tokio::test]
    async fn test_pause_holds_command() {
        let sim = std::sync::Arc::new(SimulatedActuator::with_defaults());
        sim.pause();
        let handle = {
            let sim = sim.clone();
            tokio::spawn(async move { sim.apply(&MotionCommand::SetSpeed { speed: 5 }).await })
        };
        sim.wait_for_started(1).await;
        assert!(sim.applied().is_empty());
        sim.resume();
        assert!(handle.await.unwrap().is_ok());
        assert_eq!(sim.applied().len(), 1);
    }
}
