//! Executor state machine
//!
//! One executor per machine, running as its own tokio task. It pulls tasks
//! from the machine queue, plans them, applies the motion commands through
//! the machine state, and drives both lifecycles.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::actuator::{Actuator, BoundedActuator};
use crate::error::{Error, Result};
use crate::translator::CommandTranslator;
use crate::types::{CncMachine, MachineStatus, Task, TaskStatus};

use super::machine::MachineState;
use super::queue::{CancelFlag, CancelOutcome, Dequeued, TaskQueue, DEFAULT_QUEUE_CAPACITY};
use super::state::{ControllerEvent, TaskTracker};

// ─────────────────────────────────────────────────────────────────
// Executor Configuration
// ─────────────────────────────────────────────────────────────────

/// Configuration for the machine executors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Maximum pending tasks per machine
    pub queue_capacity: usize,

    /// Bounded wait per motion command (ms, 0 = unbounded)
    pub command_timeout_ms: u64,

    /// Finished tasks kept per machine for status queries
    pub history_limit: usize,

    /// Allowed distance between commanded and confirmed position (mm)
    pub position_tolerance: f64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            command_timeout_ms: 0,
            history_limit: 500,
            position_tolerance: 0.001,
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Operator Control
// ─────────────────────────────────────────────────────────────────

/// Operator request handled by the executor loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// Halt; a running task is cancelled at the next boundary
    Stop,
    /// Return from ERROR or STOPPED to IDLE
    Reset { clear_queue: bool },
}

struct ControlRequest {
    control: Control,
    reply: oneshot::Sender<Result<()>>,
}

/// How a task run ended
enum Outcome {
    Completed,
    Cancelled,
    Stopped(oneshot::Sender<Result<()>>),
    Failed(String),
}

// ─────────────────────────────────────────────────────────────────
// Executor
// ─────────────────────────────────────────────────────────────────

/// Sequential worker owning one machine
pub struct Executor {
    machine: MachineState,
    queue: Arc<TaskQueue>,
    tracker: Arc<TaskTracker>,
    translator: CommandTranslator,
    control_rx: mpsc::Receiver<ControlRequest>,
}

impl Executor {
    /// Start an executor for `machine` on the current runtime
    pub fn spawn(
        machine: CncMachine,
        actuator: Arc<dyn Actuator>,
        config: &ExecutorConfig,
        events: broadcast::Sender<ControllerEvent>,
    ) -> ExecutorHandle {
        let machine_id = machine.machine_id.clone();
        let actuator: Arc<dyn Actuator> = if config.command_timeout_ms > 0 {
            Arc::new(BoundedActuator::new(
                actuator,
                Duration::from_millis(config.command_timeout_ms),
            ))
        } else {
            actuator
        };

        let state = MachineState::new(machine, actuator, config.position_tolerance, events.clone());
        let snapshot = state.shared();
        let queue = Arc::new(TaskQueue::new(&machine_id, config.queue_capacity));
        let tracker = Arc::new(TaskTracker::new(&machine_id, config.history_limit, events));
        let (control_tx, control_rx) = mpsc::channel(16);

        let executor = Executor {
            machine: state,
            queue: queue.clone(),
            tracker: tracker.clone(),
            translator: CommandTranslator::new(),
            control_rx,
        };
        let join = tokio::spawn(executor.run());

        info!(machine_id = %machine_id, "Executor started");

        ExecutorHandle {
            machine_id,
            snapshot,
            queue,
            tracker,
            control_tx,
            join: Mutex::new(Some(join)),
        }
    }

    async fn run(mut self) {
        loop {
            if self.machine.status().is_halted() {
                tokio::select! {
                    request = self.control_rx.recv() => match request {
                        Some(request) => self.handle_control(request).await,
                        None => break,
                    },
                    _ = self.queue.closed() => break,
                }
                continue;
            }

            tokio::select! {
                biased;
                request = self.control_rx.recv() => match request {
                    Some(request) => self.handle_control(request).await,
                    None => break,
                },
                next = self.queue.dequeue_next() => match next {
                    Some(dequeued) => self.execute(dequeued).await,
                    None => break,
                },
            }
        }

        for mut task in self.queue.drain() {
            if task.mark_cancelled().is_ok() {
                self.tracker.publish(&task);
            }
        }
        info!(machine_id = %self.machine.machine_id(), "Executor stopped");
    }

    /// Handle a control request while no task is running
    async fn handle_control(&mut self, request: ControlRequest) {
        let result = match request.control {
            Control::Stop => {
                self.machine.set_status(MachineStatus::Stopped);
                Ok(())
            }
            Control::Reset { clear_queue } => self.reset(clear_queue).await,
        };
        let _ = request.reply.send(result);
    }

    async fn reset(&mut self, clear_queue: bool) -> Result<()> {
        if self.machine.status().is_halted() {
            self.machine.reset_actuator().await?;
            self.machine.set_status(MachineStatus::Idle);
            info!(machine_id = %self.machine.machine_id(), "Machine reset");
        }
        if clear_queue {
            let cleared = self.queue.drain();
            info!(
                machine_id = %self.machine.machine_id(),
                count = cleared.len(),
                "Queue cleared on reset"
            );
            for mut task in cleared {
                task.mark_cancelled()?;
                self.tracker.publish(&task);
            }
        }
        Ok(())
    }

    /// Run one dequeued task to a terminal status
    async fn execute(&mut self, dequeued: Dequeued) {
        let Dequeued { mut task, cancel } = dequeued;
        let task_id = task.task_id.clone();

        let mut stop_reply = None;
        let outcome = self.run_task(&mut task, &cancel).await;
        let result = match outcome {
            Ok(Outcome::Completed) => {
                self.machine.set_status(MachineStatus::Idle);
                task.mark_completed()
            }
            Ok(Outcome::Cancelled) => {
                info!(task_id = %task_id, "Task cancelled");
                self.machine.set_status(MachineStatus::Idle);
                task.mark_cancelled()
            }
            Ok(Outcome::Stopped(reply)) => {
                info!(task_id = %task_id, "Task cancelled by stop");
                self.machine.set_status(MachineStatus::Stopped);
                stop_reply = Some(reply);
                task.mark_cancelled()
            }
            Ok(Outcome::Failed(reason)) => {
                error!(task_id = %task_id, error = %reason, "Task execution failed");
                task.mark_failed(reason)
            }
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            error!(task_id = %task_id, error = %e, "Task lifecycle violated");
        }
        // Queue slot is released before the terminal event goes out
        self.queue.finish(&task_id);
        self.tracker.publish(&task);
        if let Some(reply) = stop_reply {
            let _ = reply.send(Ok(()));
        }

        if task.status == TaskStatus::Completed {
            info!(
                task_id = %task_id,
                commands = task.commands_applied,
                execution_time_ms = task.execution_time_ms().unwrap_or(0),
                "Task completed successfully"
            );
        }
    }

    async fn run_task(&mut self, task: &mut Task, cancel: &CancelFlag) -> Result<Outcome> {
        task.mark_running()?;
        self.tracker.publish(task);
        info!(
            machine_id = %self.machine.machine_id(),
            task_id = %task.task_id,
            gcode = task.gcode.len(),
            "Starting task execution"
        );

        let plan = match self
            .translator
            .plan(&task.gcode, self.machine.translation_context())
        {
            Ok(plan) => plan,
            Err(e) => return Ok(Outcome::Failed(e.to_string())),
        };

        self.machine.set_status(MachineStatus::Running);

        for step in &plan.steps {
            if let Some(outcome) = self.checkpoint(cancel) {
                return Ok(outcome);
            }
            for command in step {
                if let Err(e) = self.machine.apply(command).await {
                    return Ok(Outcome::Failed(e.to_string()));
                }
                task.commands_applied += 1;
                self.tracker.publish(task);
            }
        }

        // A cancel or stop that arrived during the last command still wins
        if let Some(outcome) = self.checkpoint(cancel) {
            return Ok(outcome);
        }
        Ok(Outcome::Completed)
    }

    /// GCode boundary: honour cancel, stop and shutdown
    fn checkpoint(&mut self, cancel: &CancelFlag) -> Option<Outcome> {
        while let Ok(request) = self.control_rx.try_recv() {
            match request.control {
                Control::Stop => return Some(Outcome::Stopped(request.reply)),
                Control::Reset { .. } => {
                    let _ = request.reply.send(Err(Error::InvalidState {
                        machine_id: self.machine.machine_id().to_string(),
                        status: MachineStatus::Running,
                        message: "cannot reset while a task is running".to_string(),
                    }));
                }
            }
        }
        if cancel.is_cancelled() || self.queue.is_closed() {
            return Some(Outcome::Cancelled);
        }
        None
    }
}

// ─────────────────────────────────────────────────────────────────
// Executor Handle
// ─────────────────────────────────────────────────────────────────

/// Caller-side handle to a running executor
pub struct ExecutorHandle {
    machine_id: String,
    snapshot: Arc<RwLock<CncMachine>>,
    queue: Arc<TaskQueue>,
    tracker: Arc<TaskTracker>,
    control_tx: mpsc::Sender<ControlRequest>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl ExecutorHandle {
    pub fn machine_id(&self) -> &str {
        &self.machine_id
    }

    /// Point-in-time machine snapshot
    pub fn status(&self) -> CncMachine {
        self.snapshot.read().clone()
    }

    /// Queue a task
    pub fn submit(&self, task: Task) -> Result<()> {
        if task.status != TaskStatus::Queued {
            return Err(Error::InvalidTransition {
                task_id: task.task_id,
                from: task.status,
                to: TaskStatus::Queued,
            });
        }
        let task_id = task.task_id.clone();
        let gcode = task.gcode.len();
        self.tracker.admit(task, |task| self.queue.enqueue(task))?;
        info!(
            machine_id = %self.machine_id,
            task_id = %task_id,
            gcode,
            "Task queued for execution"
        );
        Ok(())
    }

    /// Cancel a queued or running task
    pub fn cancel(&self, task_id: &str) -> Result<()> {
        match self.queue.cancel(task_id) {
            Some(CancelOutcome::Removed(mut task)) => {
                task.mark_cancelled()?;
                self.tracker.publish(&task);
                info!(machine_id = %self.machine_id, task_id = %task_id, "Queued task cancelled");
                Ok(())
            }
            Some(CancelOutcome::Flagged) => {
                info!(
                    machine_id = %self.machine_id,
                    task_id = %task_id,
                    "Running task flagged for cancellation"
                );
                Ok(())
            }
            None => Err(Error::task_not_found(task_id)),
        }
    }

    /// Task snapshot
    pub fn task(&self, task_id: &str) -> Option<Task> {
        self.tracker.get(task_id)
    }

    pub async fn stop(&self) -> Result<()> {
        self.control(Control::Stop).await
    }

    pub async fn reset(&self, clear_queue: bool) -> Result<()> {
        self.control(Control::Reset { clear_queue }).await
    }

    async fn control(&self, control: Control) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.control_tx
            .send(ControlRequest { control, reply })
            .await
            .map_err(|_| self.gone())?;
        response.await.map_err(|_| self.gone())?
    }

    fn gone(&self) -> Error {
        Error::Internal(format!("executor for machine {} is not running", self.machine_id))
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn tracker(&self) -> Arc<TaskTracker> {
        self.tracker.clone()
    }

    /// Close the queue and wait for the executor to exit
    ///
    /// A running task is cancelled at its next boundary; queued tasks are
    /// cancelled.
    pub async fn shutdown(&self) {
        self.queue.close();
        let join = self.join.lock().take();
        if let Some(join) = join {
            if let Err(e) = join.await {
                warn!(machine_id = %self.machine_id, error = %e, "Executor task panicked");
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
