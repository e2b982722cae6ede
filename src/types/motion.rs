//! Positions and primitive motion commands

use std::fmt;

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────
// Position
// ─────────────────────────────────────────────────────────────────

/// Machine axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    /// All axes in coordinate order
    pub fn all() -> &'static [Axis] {
        &[Axis::X, Axis::Y, Axis::Z]
    }

    /// Parameter key used for this axis in G-code records
    pub fn key(&self) -> &'static str {
        match self {
            Axis::X => "x",
            Axis::Y => "y",
            Axis::Z => "z",
        }
    }
}

/// Absolute machine coordinates in millimetres
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    /// Machine origin
    pub const ORIGIN: Position = Position { x: 0.0, y: 0.0, z: 0.0 };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Read a single axis
    pub fn axis(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }

    /// Copy with one axis replaced
    pub fn with_axis(mut self, axis: Axis, value: f64) -> Self {
        match axis {
            Axis::X => self.x = value,
            Axis::Y => self.y = value,
            Axis::Z => self.z = value,
        }
        self
    }

    /// Copy shifted by the given deltas
    pub fn offset(&self, dx: f64, dy: f64, dz: f64) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }

    /// Tolerance-based equality used for motion-complete checks
    pub fn approx_eq(&self, other: &Position, tolerance: f64) -> bool {
        Axis::all()
            .iter()
            .all(|&a| (self.axis(a) - other.axis(a)).abs() <= tolerance)
    }

    /// Whether every coordinate lies within `[min, max]` per axis
    pub fn within(&self, min: &Position, max: &Position) -> bool {
        Axis::all()
            .iter()
            .all(|&a| self.axis(a) >= min.axis(a) && self.axis(a) <= max.axis(a))
    }

    /// Whether all coordinates are finite numbers
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

// ─────────────────────────────────────────────────────────────────
// Motion Commands
// ─────────────────────────────────────────────────────────────────

/// Primitive, hardware-facing instruction derived from a G-code record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MotionCommand {
    /// Move to an absolute position at the given speed
    MoveTo { target: Position, speed: u32 },
    /// Set the active feed rate
    SetSpeed { speed: u32 },
    /// Mount the tool with the given id
    ChangeTool { tool_id: String },
}

impl MotionCommand {
    /// Short name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            MotionCommand::MoveTo { .. } => "move_to",
            MotionCommand::SetSpeed { .. } => "set_speed",
            MotionCommand::ChangeTool { .. } => "change_tool",
        }
    }
}

impl fmt::Display for MotionCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MotionCommand::MoveTo { target, speed } => write!(f, "MoveTo {} @ {}", target, speed),
            MotionCommand::SetSpeed { speed } => write!(f, "SetSpeed {}", speed),
            MotionCommand::ChangeTool { tool_id } => write!(f, "ChangeTool {}", tool_id),
        }
    }
}

/// What the actuator reports after performing a command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confirmation {
    /// Position reached
    Position(Position),
    /// Feed rate accepted
    Speed(u32),
    /// Tool mounted
    Tool(String),
}
