//! Machine and tool records

use std::fmt;

use serde::{Deserialize, Serialize};

use super::Position;

// ─────────────────────────────────────────────────────────────────
// Tools
// ─────────────────────────────────────────────────────────────────

/// Kind of cutting tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolType {
    Drill,
    Mill,
    Laser,
    Other,
}

impl Default for ToolType {
    fn default() -> Self {
        ToolType::Other
    }
}

impl fmt::Display for ToolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolType::Drill => write!(f, "drill"),
            ToolType::Mill => write!(f, "mill"),
            ToolType::Laser => write!(f, "laser"),
            ToolType::Other => write!(f, "other"),
        }
    }
}

/// Condition of a tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    /// In the rack, available
    Idle,
    /// Mounted on the spindle
    Mounted,
    /// Usable but due for replacement
    Worn,
    /// Failed a tool change or reported a fault
    Faulted,
}

impl Default for ToolStatus {
    fn default() -> Self {
        ToolStatus::Idle
    }
}

/// A tool known to a machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tool {
    pub id: String,
    #[serde(rename = "type", default)]
    pub tool_type: ToolType,
    #[serde(default)]
    pub status: ToolStatus,
}

impl Tool {
    pub fn new(id: impl Into<String>, tool_type: ToolType) -> Self {
        Self {
            id: id.into(),
            tool_type,
            status: ToolStatus::Idle,
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Machine
// ─────────────────────────────────────────────────────────────────

/// Operating status of a machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MachineStatus {
    /// No task running
    Idle,
    /// Executing a task
    Running,
    /// Halted after a failed motion command, awaiting reset
    Error,
    /// Halted by an operator stop, awaiting reset
    Stopped,
}

impl MachineStatus {
    /// Whether the machine needs a reset before taking new work
    pub fn is_halted(&self) -> bool {
        matches!(self, MachineStatus::Error | MachineStatus::Stopped)
    }
}

impl Default for MachineStatus {
    fn default() -> Self {
        MachineStatus::Idle
    }
}

impl fmt::Display for MachineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MachineStatus::Idle => write!(f, "IDLE"),
            MachineStatus::Running => write!(f, "RUNNING"),
            MachineStatus::Error => write!(f, "ERROR"),
            MachineStatus::Stopped => write!(f, "STOPPED"),
        }
    }
}

/// Point-in-time view of one machine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CncMachine {
    pub machine_id: String,
    pub status: MachineStatus,
    pub current_position: Position,
    pub target_position: Position,
    /// Active feed rate (0 = none set yet)
    pub speed: u32,
    /// Upper bound for any commanded speed
    pub max_speed: u32,
    pub current_tool: Option<Tool>,
    /// Tool library
    pub tools: Vec<Tool>,
}

impl CncMachine {
    /// New idle machine at the given position with no tool mounted
    pub fn new(machine_id: impl Into<String>, position: Position, max_speed: u32) -> Self {
        Self {
            machine_id: machine_id.into(),
            status: MachineStatus::Idle,
            current_position: position,
            target_position: position,
            speed: 0,
            max_speed,
            current_tool: None,
            tools: Vec::new(),
        }
    }

    /// Builder-style initial feed rate (clamped to `max_speed`)
    pub fn with_feed(mut self, speed: u32) -> Self {
        self.speed = speed.min(self.max_speed);
        self
    }

    /// Builder-style tool library
    pub fn with_tools(mut self, tools: Vec<Tool>) -> Self {
        self.tools = tools;
        self
    }

    /// Find a library tool
    pub fn tool(&self, tool_id: &str) -> Option<&Tool> {
        self.tools.iter().find(|t| t.id == tool_id)
    }
}
