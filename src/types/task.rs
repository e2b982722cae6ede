//! Task records and their lifecycle

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::GCode;

/// Lifecycle status of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Waiting in a machine queue
    Queued,
    /// Being executed
    Running,
    /// All G-code applied
    Completed,
    /// Translation or actuator failure
    Failed,
    /// Cancelled before completion
    Cancelled,
}

impl TaskStatus {
    /// Whether no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// Allowed lifecycle edges
    fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Queued, TaskStatus::Running)
                | (TaskStatus::Queued, TaskStatus::Cancelled)
                | (TaskStatus::Running, TaskStatus::Completed)
                | (TaskStatus::Running, TaskStatus::Failed)
                | (TaskStatus::Running, TaskStatus::Cancelled)
        )
    }
}

impl Default for TaskStatus {
    fn default() -> Self {
        TaskStatus::Queued
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Queued => write!(f, "QUEUED"),
            TaskStatus::Running => write!(f, "RUNNING"),
            TaskStatus::Completed => write!(f, "COMPLETED"),
            TaskStatus::Failed => write!(f, "FAILED"),
            TaskStatus::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// An ordered G-code program submitted for one machine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    /// Execution order
    pub gcode: Vec<GCode>,
    pub status: TaskStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// Failure reason
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Motion commands confirmed by the actuator so far
    pub commands_applied: usize,
}

impl Task {
    /// New queued task
    pub fn new(task_id: impl Into<String>, gcode: Vec<GCode>) -> Self {
        Self {
            task_id: task_id.into(),
            gcode,
            status: TaskStatus::Queued,
            start_time: None,
            end_time: None,
            error: None,
            commands_applied: 0,
        }
    }

    /// New queued task with a generated id
    pub fn with_generated_id(gcode: Vec<GCode>) -> Self {
        Self::new(generate_task_id(), gcode)
    }

    fn transition(&mut self, next: TaskStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                task_id: self.task_id.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// QUEUED → RUNNING
    pub fn mark_running(&mut self) -> Result<()> {
        self.transition(TaskStatus::Running)?;
        self.start_time = Some(Utc::now());
        Ok(())
    }

    /// RUNNING → COMPLETED
    pub fn mark_completed(&mut self) -> Result<()> {
        self.transition(TaskStatus::Completed)?;
        self.end_time = Some(Utc::now());
        Ok(())
    }

    /// RUNNING → FAILED
    pub fn mark_failed(&mut self, error: impl Into<String>) -> Result<()> {
        self.transition(TaskStatus::Failed)?;
        self.end_time = Some(Utc::now());
        self.error = Some(error.into());
        Ok(())
    }

    /// QUEUED | RUNNING → CANCELLED
    pub fn mark_cancelled(&mut self) -> Result<()> {
        self.transition(TaskStatus::Cancelled)?;
        self.end_time = Some(Utc::now());
        Ok(())
    }

    /// Wall-clock execution time, if started
    pub fn execution_time_ms(&self) -> Option<i64> {
        let start = self.start_time?;
        let end = self.end_time.unwrap_or_else(Utc::now);
        Some((end - start).num_milliseconds())
    }
}

/// Generate a short unique task id
pub fn generate_task_id() -> String {
    format!("task-{}", &uuid::Uuid::new_v4().simple().to_string()[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_lifecycle_completed() {
        let mut task = Task::new("t1", vec![]);
        assert_eq!(task.status, TaskStatus::Queued);
        assert!(task.start_time.is_none() && task.end_time.is_none());

        task.mark_running().unwrap();
        assert!(task.start_time.is_some());
        assert!(task.end_time.is_none());

        task.mark_completed().unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert!(task.end_time.is_some());
        assert!(task.execution_time_ms().is_some());
    }

    #[test]
    fn test_cancel_from_queued_never_starts() {
        let mut task = Task::new("t1", vec![]);
        task.mark_cancelled().unwrap();
        assert_eq!(task.status, TaskStatus::Cancelled);
        assert!(task.start_time.is_none());
        assert!(task.end_time.is_some());
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut task = Task::new("t1", vec![]);
        task.mark_running().unwrap();
        task.mark_failed("boom").unwrap();
        assert_eq!(task.error.as_deref(), Some("boom"));

        assert!(matches!(
            task.mark_running(),
            Err(Error::InvalidTransition { .. })
        ));
        assert!(task.mark_cancelled().is_err());
        assert!(task.mark_completed().is_err());
        assert_eq!(task.status, TaskStatus::Failed);
    }

    #[test]
    fn test_queued_cannot_complete() {
        let mut task = Task::new("t1", vec![]);
        assert!(task.mark_completed().is_err());
        assert!(task.mark_failed("x").is_err());
        assert_eq!(task.status, TaskStatus::Queued);
    }

    #[test]
    fn test_generated_ids_unique() {
        let a = generate_task_id();
        let b = generate_task_id();
        assert!(a.starts_with("task-"));
        assert_eq!(a.len(), 13);
        assert_ne!(a, b);
    }
}
