//! Configuration system for the CNC controller
//!
//! Supports multiple configuration sources with the following precedence (highest to lowest):
//! 1. CLI arguments
//! 2. Environment variables (CNC_* prefix)
//! 3. Configuration file (TOML)
//! 4. Default values

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::actuator::SimulatorConfig;
use crate::error::{Error, Result};
use crate::executor::ExecutorConfig;
use crate::types::{Axis, CncMachine, Position, Tool, ToolType};

/// Main controller configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Controller identity
    pub controller: ControllerSettings,

    /// Queue, timeout and tolerance settings shared by all executors
    pub executor: ExecutorConfig,

    /// Behaviour of simulated machines
    pub simulator: SimulatorConfig,

    /// Logging configuration
    pub logging: LoggingSettings,

    /// Machines to register at startup
    pub machines: Vec<MachineSettings>,
}

/// Controller identity settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerSettings {
    /// Human-readable name (defaults to the host name)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level: trace, debug, info, warn, error
    pub level: String,

    /// Log file path (empty = no file logging)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    /// Rotate log files hourly instead of daily
    pub hourly_rotation: bool,

    /// Number of rotated log files to keep
    pub max_files: u32,

    /// Enable JSON formatted logging
    pub json_format: bool,
}

/// One machine and its tool library
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineSettings {
    pub id: String,

    /// Upper bound for any commanded speed
    #[serde(default = "default_max_speed")]
    pub max_speed: u32,

    /// Feed rate active at startup (0 = none, G01 needs an F word first)
    #[serde(default)]
    pub feed_rate: u32,

    #[serde(default)]
    pub initial_position: Position,

    #[serde(default)]
    pub tools: Vec<Tool>,
}

fn default_max_speed() -> u32 {
    3000
}

impl MachineSettings {
    /// Initial machine snapshot
    pub fn to_machine(&self) -> CncMachine {
        CncMachine::new(&self.id, self.initial_position, self.max_speed)
            .with_feed(self.feed_rate)
            .with_tools(self.tools.clone())
    }
}

// ─────────────────────────────────────────────────────────────────
// Defaults
// ─────────────────────────────────────────────────────────────────

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            controller: ControllerSettings::default(),
            executor: ExecutorConfig::default(),
            simulator: SimulatorConfig::default(),
            logging: LoggingSettings::default(),
            machines: vec![MachineSettings {
                id: "mill-1".to_string(),
                max_speed: default_max_speed(),
                feed_rate: 1000,
                initial_position: Position::ORIGIN,
                tools: vec![Tool::new("T1", ToolType::Mill), Tool::new("T2", ToolType::Drill)],
            }],
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            hourly_rotation: false,
            max_files: 5,
            json_format: false,
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Loading
// ─────────────────────────────────────────────────────────────────

impl ControllerConfig {
    /// Load configuration from file with environment variable overrides
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut config = Self::default();

        // 1. Load from config file if it exists
        if let Some(path) = Self::find_config_file(config_path)? {
            debug!(path = %path.display(), "Loading configuration file");
            let content = fs::read_to_string(&path)?;
            config = Self::from_toml(&content)?;
            info!(path = %path.display(), "Configuration loaded from file");
        }

        // 2. Apply environment variable overrides
        config.apply_env_overrides();

        // 3. Expand paths
        config.expand_paths();

        // 4. Validate
        config.validate()?;

        Ok(config)
    }

    /// Parse TOML without env overrides or validation
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::ConfigParse {
            message: e.to_string(),
            source: Some(e),
        })
    }

    /// Find the configuration file to use
    fn find_config_file(explicit_path: Option<&str>) -> Result<Option<PathBuf>> {
        // If explicit path provided, use it (error if not found)
        if let Some(path) = explicit_path {
            let path = PathBuf::from(expand_path(path));
            if path.exists() {
                return Ok(Some(path));
            }
            return Err(Error::ConfigNotFound { path });
        }

        let search_paths = [
            // Current directory
            PathBuf::from("cnc-controller.toml"),
            PathBuf::from("config.toml"),
            // User config directory
            dirs::config_dir()
                .map(|p| p.join("cnc-controller").join("controller.toml"))
                .unwrap_or_default(),
            // Home directory
            dirs::home_dir()
                .map(|p| p.join(".cnc-controller").join("controller.toml"))
                .unwrap_or_default(),
            // System config (Linux)
            PathBuf::from("/etc/cnc-controller/controller.toml"),
        ];

        for path in &search_paths {
            if !path.as_os_str().is_empty() && path.exists() {
                debug!(path = %path.display(), "Found configuration file");
                return Ok(Some(path.clone()));
            }
        }

        debug!("No configuration file found, using defaults");
        Ok(None)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("CNC_CONTROLLER_NAME") {
            self.controller.name = Some(val);
        }

        // Executor settings
        if let Some(n) = env_parse("CNC_QUEUE_CAPACITY") {
            self.executor.queue_capacity = n;
        }
        if let Some(n) = env_parse("CNC_COMMAND_TIMEOUT_MS") {
            self.executor.command_timeout_ms = n;
        }
        if let Some(n) = env_parse("CNC_HISTORY_LIMIT") {
            self.executor.history_limit = n;
        }
        if let Some(n) = env_parse("CNC_POSITION_TOLERANCE") {
            self.executor.position_tolerance = n;
        }

        // Simulator settings
        if let Some(n) = env_parse("CNC_SIM_LATENCY_MS") {
            self.simulator.command_latency_ms = n;
        }

        // Logging settings
        if let Ok(val) = std::env::var("CNC_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = std::env::var("CNC_LOG_FILE") {
            self.logging.file = Some(val);
        }
        if let Ok(val) = std::env::var("CNC_LOG_JSON") {
            self.logging.json_format = val.to_lowercase() == "true" || val == "1";
        }
    }

    /// Expand ~ and other path variables
    fn expand_paths(&mut self) {
        if let Some(ref file) = self.logging.file {
            self.logging.file = Some(expand_path(file));
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.executor.queue_capacity == 0 {
            return Err(Error::config_field_invalid(
                "executor.queue_capacity",
                "queue_capacity must be greater than 0",
            ));
        }
        if self.executor.history_limit == 0 {
            return Err(Error::config_field_invalid(
                "executor.history_limit",
                "history_limit must be greater than 0",
            ));
        }
        let tolerance = self.executor.position_tolerance;
        if !tolerance.is_finite() || tolerance < 0.0 {
            return Err(Error::config_field_invalid(
                "executor.position_tolerance",
                "position_tolerance must be a finite, non-negative number",
            ));
        }

        match (&self.simulator.travel_min, &self.simulator.travel_max) {
            (Some(min), Some(max)) => {
                if Axis::all().iter().any(|&a| min.axis(a) > max.axis(a)) {
                    return Err(Error::config_field_invalid(
                        "simulator.travel_min",
                        "travel_min must not exceed travel_max on any axis",
                    ));
                }
            }
            (None, None) => {}
            _ => {
                return Err(Error::config_validation(
                    "travel_min and travel_max must be set together",
                ))
            }
        }

        let mut seen = HashSet::new();
        for machine in &self.machines {
            if machine.id.trim().is_empty() {
                return Err(Error::config_field_invalid("machines.id", "machine id cannot be empty"));
            }
            if !seen.insert(machine.id.as_str()) {
                return Err(Error::config_field_invalid(
                    "machines.id",
                    format!("duplicate machine id '{}'", machine.id),
                ));
            }
            if machine.max_speed == 0 {
                return Err(Error::config_field_invalid(
                    "machines.max_speed",
                    format!("max_speed for '{}' must be greater than 0", machine.id),
                ));
            }
            if machine.feed_rate > machine.max_speed {
                return Err(Error::config_field_invalid(
                    "machines.feed_rate",
                    format!("feed_rate for '{}' exceeds max_speed", machine.id),
                ));
            }
            if !machine.initial_position.is_finite() {
                return Err(Error::config_field_invalid(
                    "machines.initial_position",
                    format!("initial_position for '{}' must be finite", machine.id),
                ));
            }
        }

        // Validate log level
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(Error::config_field_invalid(
                "logging.level",
                format!(
                    "Invalid log level '{}'. Must be one of: {}",
                    self.logging.level,
                    valid_levels.join(", ")
                ),
            ));
        }

        Ok(())
    }

    /// Controller name, falling back to the host name
    pub fn display_name(&self) -> String {
        self.controller.name.clone().unwrap_or_else(|| {
            hostname::get()
                .ok()
                .and_then(|h| h.into_string().ok())
                .unwrap_or_else(|| "cnc-controller".to_string())
        })
    }

    /// Simulator settings for one machine, with its tool library as the rack
    pub fn simulator_for(&self, machine: &MachineSettings) -> SimulatorConfig {
        let mut sim = self.simulator.clone();
        if !machine.tools.is_empty() {
            sim.tool_rack = Some(machine.tools.iter().map(|t| t.id.clone()).collect());
        }
        sim
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Expand ~ and environment variables in paths
fn expand_path(path: &str) -> String {
    shellexpand::full(path)
        .unwrap_or_else(|_| std::borrow::Cow::Borrowed(path))
        .into_owned()
}

/// Initialize a new configuration file
pub fn init_config(path: Option<&str>, force: bool) -> Result<PathBuf> {
    let config_path = path.map(|p| PathBuf::from(expand_path(p))).unwrap_or_else(|| {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".cnc-controller")
            .join("controller.toml")
    });

    if config_path.exists() && !force {
        return Err(Error::config_validation(format!(
            "Configuration file already exists: {}. Use --force to overwrite.",
            config_path.display()
        )));
    }

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent).map_err(|source| Error::IoWrite {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    fs::write(&config_path, generate_default_config()).map_err(|source| Error::IoWrite {
        path: config_path.clone(),
        source,
    })?;

    Ok(config_path)
}

/// Generate default configuration content with comments
pub fn generate_default_config() -> String {
    r#"# CNC Controller Configuration

[controller]
# Human-readable controller name (defaults to the host name)
# name = "shop-floor-1"

[executor]
# Maximum pending tasks per machine
queue_capacity = 1000

# Bounded wait for each motion command confirmation (ms, 0 = unbounded)
command_timeout_ms = 0

# Finished tasks kept per machine for status queries
history_limit = 500

# Allowed distance between commanded and confirmed position (mm)
position_tolerance = 0.001

[simulator]
# Simulated time per motion command (ms)
command_latency_ms = 0

# Travel limits (both or neither)
# travel_min = { x = 0.0, y = 0.0, z = -100.0 }
# travel_max = { x = 500.0, y = 500.0, z = 0.0 }

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log file path (comment out to disable file logging)
# file = "~/.cnc-controller/logs/controller.log"

# Rotate log files hourly instead of daily
hourly_rotation = false

# Number of rotated log files to keep
max_files = 5

# Enable JSON formatted logging
json_format = false

[[machines]]
id = "mill-1"
max_speed = 3000

# Feed rate active at startup (0 = none, G01 needs an F word first)
feed_rate = 1000

initial_position = { x = 0.0, y = 0.0, z = 0.0 }

[[machines.tools]]
id = "T1"
type = "mill"

[[machines.tools]]
id = "T2"
type = "drill"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_default_config() {
        let config = ControllerConfig::default();
        assert_eq!(config.executor.queue_capacity, 1000);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.machines.len(), 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_generated_config_parses_and_matches_defaults() {
        let config = ControllerConfig::from_toml(&generate_default_config()).unwrap();
        assert!(config.validate().is_ok());
        let defaults = ControllerConfig::default();
        assert_eq!(config.executor, defaults.executor);
        assert_eq!(config.machines[0].id, defaults.machines[0].id);
        assert_eq!(config.machines[0].tools, defaults.machines[0].tools);
    }

    #[test]
    fn test_env_override() {
        env::set_var("CNC_QUEUE_CAPACITY", "42");
        env::set_var("CNC_SIM_LATENCY_MS", "7");
        env::set_var("CNC_LOG_JSON", "1");

        let mut config = ControllerConfig::default();
        config.apply_env_overrides();

        assert_eq!(config.executor.queue_capacity, 42);
        assert_eq!(config.simulator.command_latency_ms, 7);
        assert!(config.logging.json_format);

        env::remove_var("CNC_QUEUE_CAPACITY");
        env::remove_var("CNC_SIM_LATENCY_MS");
        env::remove_var("CNC_LOG_JSON");
    }

    #[test]
    fn test_validation_duplicate_machine() {
        let mut config = ControllerConfig::default();
        config.machines.push(config.machines[0].clone());
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::ConfigValidation { field: Some(ref f), .. } if f == "machines.id"));
    }

    #[test]
    fn test_validation_limits() {
        let mut config = ControllerConfig::default();
        config.executor.queue_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = ControllerConfig::default();
        config.executor.position_tolerance = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = ControllerConfig::default();
        config.machines[0].max_speed = 0;
        assert!(config.validate().is_err());

        let mut config = ControllerConfig::default();
        config.simulator.travel_min = Some(Position::new(10.0, 0.0, 0.0));
        config.simulator.travel_max = Some(Position::new(0.0, 10.0, 10.0));
        assert!(config.validate().is_err());

        let mut config = ControllerConfig::default();
        config.simulator.travel_min = Some(Position::ORIGIN);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_zero_history_limit() {
        let mut config = ControllerConfig::default();
        config.executor.history_limit = 0;
        let err = config.validate().unwrap_err();
        assert!(
            matches!(err, Error::ConfigValidation { field: Some(ref f), .. } if f == "executor.history_limit")
        );

        config.executor.history_limit = 1;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_invalid_log_level() {
        let mut config = ControllerConfig::default();
        config.logging.level = "invalid".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_config_file() {
        let config_str = r#"
[executor]
queue_capacity = 10
command_timeout_ms = 250

[simulator]
travel_min = { x = 0.0, y = 0.0, z = -50.0 }
travel_max = { x = 300.0, y = 200.0, z = 0.0 }

[[machines]]
id = "lathe"
max_speed = 1200
initial_position = { x = 5.0 }

[[machines.tools]]
id = "T7"
type = "laser"
"#;

        let config = ControllerConfig::from_toml(config_str).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.executor.queue_capacity, 10);
        assert_eq!(config.executor.history_limit, 500);
        assert_eq!(config.machines.len(), 1);

        let machine = config.machines[0].to_machine();
        assert_eq!(machine.machine_id, "lathe");
        assert_eq!(machine.current_position, Position::new(5.0, 0.0, 0.0));
        assert_eq!(machine.speed, 0);
        assert_eq!(machine.tool("T7").unwrap().tool_type, ToolType::Laser);

        let sim = config.simulator_for(&config.machines[0]);
        assert_eq!(sim.tool_rack, Some(vec!["T7".to_string()]));
        assert!(sim.travel_max.is_some());
    }

    #[test]
    fn test_parse_error() {
        let err = ControllerConfig::from_toml("[executor\nqueue_capacity = ").unwrap_err();
        assert!(matches!(err, Error::ConfigParse { .. }));
    }

    #[test]
    fn test_missing_explicit_file() {
        let err = ControllerConfig::load(Some("/nonexistent/cnc.toml")).unwrap_err();
        assert!(matches!(err, Error::ConfigNotFound { .. }));
    }
}
