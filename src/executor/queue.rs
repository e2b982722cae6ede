//! Per-machine FIFO of pending tasks
//!
//! Submitters enqueue from any task; only the machine's executor dequeues.
//! The queue also tracks the task currently running so a cancel request can
//! reach it as a cooperative flag.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::debug;

use crate::error::{Error, Result};
use crate::types::Task;

/// Default bound on pending tasks per machine
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

/// Cooperative cancellation flag for a running task
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A task handed to the executor together with its cancel flag
#[derive(Debug)]
pub struct Dequeued {
    pub task: Task,
    pub cancel: CancelFlag,
}

/// What a cancel request did
#[derive(Debug)]
pub enum CancelOutcome {
    /// Task was still queued and has been removed
    Removed(Task),
    /// Task is running; it stops at the next boundary
    Flagged,
}

struct QueueState {
    pending: VecDeque<Task>,
    running: Option<(String, CancelFlag)>,
    closed: bool,
}

/// FIFO of tasks for one machine
pub struct TaskQueue {
    machine_id: String,
    capacity: usize,
    inner: Mutex<QueueState>,
    available: Notify,
}

impl TaskQueue {
    pub fn new(machine_id: impl Into<String>, capacity: usize) -> Self {
        Self {
            machine_id: machine_id.into(),
            capacity,
            inner: Mutex::new(QueueState {
                pending: VecDeque::new(),
                running: None,
                closed: false,
            }),
            available: Notify::new(),
        }
    }

    /// Append a task; fails when the queue is full or closed
    pub fn enqueue(&self, task: Task) -> Result<()> {
        let mut state = self.inner.lock();
        if state.closed {
            return Err(Error::Internal(format!(
                "queue for machine {} is closed",
                self.machine_id
            )));
        }
        if state.pending.len() >= self.capacity {
            return Err(Error::QueueFull {
                machine_id: self.machine_id.clone(),
                capacity: self.capacity,
            });
        }
        debug!(machine_id = %self.machine_id, task_id = %task.task_id, "Task enqueued");
        state.pending.push_back(task);
        self.available.notify_one();
        Ok(())
    }

    /// Next task without removing it
    pub fn peek(&self) -> Option<Task> {
        self.inner.lock().pending.front().cloned()
    }

    /// Wait for the next task; `None` once the queue is closed
    ///
    /// Cancel-safe: a task is only taken in the same poll that returns it.
    pub async fn dequeue_next(&self) -> Option<Dequeued> {
        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.inner.lock();
                if state.closed {
                    return None;
                }
                if let Some(task) = state.pending.pop_front() {
                    let cancel = CancelFlag::default();
                    state.running = Some((task.task_id.clone(), cancel.clone()));
                    return Some(Dequeued { task, cancel });
                }
            }

            notified.await;
        }
    }

    /// Cancel a queued or running task
    pub fn cancel(&self, task_id: &str) -> Option<CancelOutcome> {
        let mut state = self.inner.lock();
        if let Some(index) = state.pending.iter().position(|t| t.task_id == task_id) {
            return state.pending.remove(index).map(CancelOutcome::Removed);
        }
        match &state.running {
            Some((running_id, flag)) if running_id == task_id => {
                flag.cancel();
                Some(CancelOutcome::Flagged)
            }
            _ => None,
        }
    }

    /// Clear the running slot once the executor is done with a task
    pub fn finish(&self, task_id: &str) {
        let mut state = self.inner.lock();
        if matches!(&state.running, Some((id, _)) if id == task_id) {
            state.running = None;
        }
    }

    /// Remove every pending task
    pub fn drain(&self) -> Vec<Task> {
        self.inner.lock().pending.drain(..).collect()
    }

    /// Stop accepting tasks and wake the executor
    pub fn close(&self) {
        self.inner.lock().closed = true;
        self.available.notify_waiters();
    }

    /// Resolves once the queue is closed
    pub async fn closed(&self) {
        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_closed() {
                return;
            }
            notified.await;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    pub fn running_task_id(&self) -> Option<String> {
        self.inner.lock().running.as_ref().map(|(id, _)| id.clone())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
