//! Task state tracking
//!
//! Keeps the latest snapshot of every task a machine has seen, counts
//! outcomes, and publishes lifecycle events.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::{Error, Result};
use crate::types::{MachineStatus, Task, TaskStatus};

// ─────────────────────────────────────────────────────────────────
// Lifecycle Events
// ─────────────────────────────────────────────────────────────────

/// Lifecycle event published to subscribers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ControllerEvent {
    TaskStatusChanged {
        machine_id: String,
        task_id: String,
        status: TaskStatus,
        /// Snapshot of the task as of this transition
        task: Task,
        at: DateTime<Utc>,
    },
    MachineStatusChanged {
        machine_id: String,
        status: MachineStatus,
        at: DateTime<Utc>,
    },
}

impl ControllerEvent {
    pub fn machine_id(&self) -> &str {
        match self {
            ControllerEvent::TaskStatusChanged { machine_id, .. }
            | ControllerEvent::MachineStatusChanged { machine_id, .. } => machine_id,
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Task Tracker
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Counters {
    completed: u64,
    failed: u64,
    cancelled: u64,
}

/// Tracks active and recently finished tasks for one machine
pub struct TaskTracker {
    machine_id: String,

    /// Latest snapshot by task ID
    tasks: RwLock<HashMap<String, Task>>,

    /// Terminal tasks kept before the oldest are evicted
    history_limit: usize,

    counters: RwLock<Counters>,

    events: broadcast::Sender<ControllerEvent>,
}

impl TaskTracker {
    pub fn new(
        machine_id: impl Into<String>,
        history_limit: usize,
        events: broadcast::Sender<ControllerEvent>,
    ) -> Self {
        Self {
            machine_id: machine_id.into(),
            tasks: RwLock::new(HashMap::new()),
            history_limit,
            counters: RwLock::new(Counters::default()),
            events,
        }
    }

    /// Record a new task and hand it to `enqueue` under the tracker lock
    ///
    /// Nothing is recorded if `enqueue` fails. Holding the lock keeps the
    /// QUEUED event ahead of any event the executor publishes for the task.
    pub fn admit<F>(&self, task: Task, enqueue: F) -> Result<()>
    where
        F: FnOnce(Task) -> Result<()>,
    {
        let mut tasks = self.tasks.write();
        if tasks.contains_key(&task.task_id) {
            return Err(Error::DuplicateTask {
                machine_id: self.machine_id.clone(),
                task_id: task.task_id,
            });
        }

        let snapshot = task.clone();
        enqueue(task)?;

        self.emit(&snapshot);
        tasks.insert(snapshot.task_id.clone(), snapshot);
        Ok(())
    }

    /// Store the latest snapshot of a task
    pub fn publish(&self, task: &Task) {
        let mut tasks = self.tasks.write();
        let previous = tasks.insert(task.task_id.clone(), task.clone());
        let changed = previous.map(|p| p.status) != Some(task.status);
        if !changed {
            return;
        }

        self.emit(task);
        if task.status.is_terminal() {
            let mut counters = self.counters.write();
            match task.status {
                TaskStatus::Completed => counters.completed += 1,
                TaskStatus::Failed => counters.failed += 1,
                TaskStatus::Cancelled => counters.cancelled += 1,
                _ => {}
            }
            drop(counters);
            evict_oldest(&mut tasks, self.history_limit);
        }
    }

    fn emit(&self, task: &Task) {
        debug!(
            machine_id = %self.machine_id,
            task_id = %task.task_id,
            status = %task.status,
            "Task status changed"
        );
        let _ = self.events.send(ControllerEvent::TaskStatusChanged {
            machine_id: self.machine_id.clone(),
            task_id: task.task_id.clone(),
            status: task.status,
            task: task.clone(),
            at: Utc::now(),
        });
    }

    /// Snapshot of one task
    pub fn get(&self, task_id: &str) -> Option<Task> {
        self.tasks.read().get(task_id).cloned()
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.tasks.read().contains_key(task_id)
    }

    /// IDs of queued and running tasks, sorted
    pub fn active_task_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .tasks
            .read()
            .iter()
            .filter(|(_, t)| !t.status.is_terminal())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn running_count(&self) -> usize {
        self.count(TaskStatus::Running)
    }

    pub fn queued_count(&self) -> usize {
        self.count(TaskStatus::Queued)
    }

    fn count(&self, status: TaskStatus) -> usize {
        self.tasks.read().values().filter(|t| t.status == status).count()
    }

    pub fn total_completed(&self) -> u64 {
        self.counters.read().completed
    }

    pub fn total_failed(&self) -> u64 {
        self.counters.read().failed
    }

    pub fn total_cancelled(&self) -> u64 {
        self.counters.read().cancelled
    }
}

/// Drop the oldest terminal tasks beyond `keep`
fn evict_oldest(tasks: &mut HashMap<String, Task>, keep: usize) {
    let mut finished: Vec<(String, Option<DateTime<Utc>>)> = tasks
        .iter()
        .filter(|(_, t)| t.status.is_terminal())
        .map(|(id, t)| (id.clone(), t.end_time))
        .collect();

    let excess = finished.len().saturating_sub(keep);
    if excess == 0 {
        return;
    }

    finished.sort_by(|a, b| a.1.cmp(&b.1));
    for (id, _) in finished.into_iter().take(excess) {
        tasks.remove(&id);
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
