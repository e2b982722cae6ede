//! Type definitions for the CNC controller
//!
//! Value types (positions, G-code records, motion commands) and the
//! records the executor owns and mutates (machines, tools, tasks).

mod gcode;
mod machine;
mod motion;
mod task;

pub use gcode::*;
pub use machine::*;
pub use motion::*;
pub use task::*;
