//! Job files
//!
//! A job file is JSON listing the tasks to submit, each bound to a
//! machine:
//!
//! ```json
//! {"tasks": [{"machine": "mill-1", "id": "t1",
//!             "gcode": [{"command": "G01", "parameters": {"x": 10}}]}]}
//! ```
//!
//! `id` is optional; a fresh task id is generated when it is missing.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{GCode, Task};

/// A parsed job file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobFile {
    pub tasks: Vec<JobTask>,
}

/// One task entry of a job file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobTask {
    /// Target machine id
    pub machine: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub gcode: Vec<GCode>,
}

impl JobTask {
    /// Build the queued task for this entry
    pub fn to_task(&self) -> Task {
        match self.id {
            Some(ref id) => Task::new(id.clone(), self.gcode.clone()),
            None => Task::with_generated_id(self.gcode.clone()),
        }
    }
}

impl JobFile {
    /// Load and check a job file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::read(path.as_ref()).map_err(|e| Error::Job(format!("{:#}", e)))
    }

    /// Parse job JSON
    pub fn parse(content: &str) -> Result<Self> {
        Self::parse_checked(content).map_err(|e| Error::Job(format!("{:#}", e)))
    }

    fn read(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse_checked(&content).with_context(|| format!("in {}", path.display()))
    }

    fn parse_checked(content: &str) -> anyhow::Result<Self> {
        let job: JobFile = serde_json::from_str(content).context("malformed job JSON")?;
        if job.tasks.is_empty() {
            bail!("job contains no tasks");
        }
        for (index, task) in job.tasks.iter().enumerate() {
            if task.machine.trim().is_empty() {
                bail!("task #{} has no machine", index);
            }
            if matches!(task.id, Some(ref id) if id.trim().is_empty()) {
                bail!("task #{} has an empty id", index);
            }
        }
        Ok(job)
    }

    /// Distinct machine ids referenced by the job, in first-use order
    pub fn machines(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = Vec::new();
        for task in &self.tasks {
            if !ids.contains(&task.machine.as_str()) {
                ids.push(&task.machine);
            }
        }
        ids
    }
}
