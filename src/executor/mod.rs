//! Machine executor module
//!
//! Handles the per-machine execution lifecycle:
//! - Queueing submitted tasks in FIFO order
//! - Translating and applying G-code through the actuator
//! - Tracking machine and task state
//! - Publishing lifecycle events

pub mod machine;
pub mod queue;
mod runner;
mod state;

pub use runner::{Executor, ExecutorConfig, ExecutorHandle};
pub use state::{ControllerEvent, TaskTracker};
