//! Dispatcher
//!
//! Owns one executor per registered machine, routes submissions to the
//! right queue, and answers status queries from machine and task snapshots.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::join_all;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::actuator::Actuator;
use crate::error::{Error, Result};
use crate::executor::{Executor, ExecutorConfig, ExecutorHandle};
use crate::types::{CncMachine, GCode, Task};

pub use crate::executor::ControllerEvent;

const EVENT_CAPACITY: usize = 1024;

/// Routes tasks to per-machine executors
pub struct Dispatcher {
    config: ExecutorConfig,
    machines: RwLock<HashMap<String, Arc<ExecutorHandle>>>,
    events: broadcast::Sender<ControllerEvent>,
}

impl Dispatcher {
    pub fn new(config: ExecutorConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            config,
            machines: RwLock::new(HashMap::new()),
            events,
        }
    }

    /// Register a machine and start its executor on the current runtime
    pub fn register_machine(&self, machine: CncMachine, actuator: Arc<dyn Actuator>) -> Result<()> {
        let mut machines = self.machines.write();
        if machines.contains_key(&machine.machine_id) {
            return Err(Error::DuplicateMachine {
                machine_id: machine.machine_id,
            });
        }

        let machine_id = machine.machine_id.clone();
        info!(
            machine_id = %machine_id,
            actuator = actuator.name(),
            position = %machine.current_position,
            "Registering machine"
        );
        let handle = Executor::spawn(machine, actuator, &self.config, self.events.clone());
        machines.insert(machine_id, Arc::new(handle));
        Ok(())
    }

    fn handle(&self, machine_id: &str) -> Result<Arc<ExecutorHandle>> {
        self.machines
            .read()
            .get(machine_id)
            .cloned()
            .ok_or_else(|| Error::unknown_machine(machine_id))
    }

    /// Submit a task; returns its id
    pub fn submit(&self, machine_id: &str, task: Task) -> Result<String> {
        let handle = self.handle(machine_id)?;
        let task_id = task.task_id.clone();
        handle.submit(task)?;
        Ok(task_id)
    }

    /// Submit a G-code program as a new task with a generated id
    pub fn submit_gcode(&self, machine_id: &str, gcode: Vec<GCode>) -> Result<String> {
        self.submit(machine_id, Task::with_generated_id(gcode))
    }

    /// Point-in-time machine snapshot
    pub fn status(&self, machine_id: &str) -> Result<CncMachine> {
        Ok(self.handle(machine_id)?.status())
    }

    /// Snapshots of every machine, ordered by id
    pub fn statuses(&self) -> Vec<CncMachine> {
        let mut all: Vec<CncMachine> = self.machines.read().values().map(|h| h.status()).collect();
        all.sort_by(|a, b| a.machine_id.cmp(&b.machine_id));
        all
    }

    /// Task snapshot on one machine
    pub fn task(&self, machine_id: &str, task_id: &str) -> Result<Task> {
        self.handle(machine_id)?
            .task(task_id)
            .ok_or_else(|| Error::task_not_found(task_id))
    }

    /// Task snapshot on any machine, with the machine id
    pub fn find_task(&self, task_id: &str) -> Option<(String, Task)> {
        self.machines
            .read()
            .values()
            .find_map(|h| h.task(task_id).map(|t| (h.machine_id().to_string(), t)))
    }

    pub fn cancel(&self, machine_id: &str, task_id: &str) -> Result<()> {
        self.handle(machine_id)?.cancel(task_id)
    }

    pub async fn stop(&self, machine_id: &str) -> Result<()> {
        self.handle(machine_id)?.stop().await
    }

    pub async fn reset(&self, machine_id: &str, clear_queue: bool) -> Result<()> {
        self.handle(machine_id)?.reset(clear_queue).await
    }

    /// Lifecycle events from every machine
    pub fn subscribe(&self) -> broadcast::Receiver<ControllerEvent> {
        self.events.subscribe()
    }

    /// Wait until a task reaches a terminal status
    ///
    /// Returns the snapshot carried by the terminal event, so the result
    /// survives the tracker evicting the task from its history.
    pub async fn wait_for_task(&self, machine_id: &str, task_id: &str) -> Result<Task> {
        let handle = self.handle(machine_id)?;
        let mut events = self.events.subscribe();
        loop {
            let task = handle
                .task(task_id)
                .ok_or_else(|| Error::task_not_found(task_id))?;
            if task.status.is_terminal() {
                return Ok(task);
            }

            loop {
                match events.recv().await {
                    Ok(ControllerEvent::TaskStatusChanged {
                        machine_id: m,
                        task_id: t,
                        task,
                        ..
                    }) if m == machine_id && t == task_id && task.status.is_terminal() => {
                        return Ok(task)
                    }
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Event subscriber lagged, rechecking task");
                        break;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(Error::Internal("event channel closed".to_string()))
                    }
                }
            }
        }
    }

    /// Registered machine ids, sorted
    pub fn machine_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.machines.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn queue_len(&self, machine_id: &str) -> Result<usize> {
        Ok(self.handle(machine_id)?.queue_len())
    }

    /// Close every queue and wait for the executors to exit
    pub async fn shutdown(&self) {
        let handles: Vec<Arc<ExecutorHandle>> = self.machines.read().values().cloned().collect();
        join_all(handles.iter().map(|h| h.shutdown())).await;
        info!(machines = handles.len(), "Dispatcher shut down");
    }
}
