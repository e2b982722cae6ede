//! CNC Controller
//!
//! Translates G-code programs into motion commands and runs them on
//! per-machine executors. The [`dispatcher::Dispatcher`] is the operator
//! interface: it registers machines, routes submitted tasks, answers status
//! queries and carries the stop, reset and cancel controls.

pub mod actuator;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod jobs;
pub mod logging;
pub mod translator;
pub mod types;
pub mod version;

pub use dispatcher::{ControllerEvent, Dispatcher};
pub use error::{Error, Result};
