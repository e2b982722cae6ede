//! Common test utilities and fixtures
//!
//! Each test gets its own temporary directory holding a config file and
//! job files, so runs never pick up a user's configuration.

#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;

use assert_cmd::Command;
use tempfile::TempDir;

/// Two machines: a mill with two tools and a lathe with none
pub const TWO_MACHINE_CONFIG: &str = r#"
[executor]
queue_capacity = 16

[logging]
level = "warn"

[[machines]]
id = "mill-1"
max_speed = 3000
feed_rate = 1000

[[machines.tools]]
id = "T1"
type = "mill"

[[machines.tools]]
id = "T2"
type = "drill"

[[machines]]
id = "lathe-1"
max_speed = 1500
initial_position = { x = 5.0, y = 0.0, z = 0.0 }
"#;

/// Two linear moves on the mill, feed taken from the machine
pub const SQUARE_JOB: &str = r#"{
    "tasks": [
        {"machine": "mill-1", "id": "square", "gcode": [
            {"command": "G01", "parameters": {"x": 10, "y": 0}},
            {"command": "G01", "parameters": {"x": 10, "y": 10}}
        ]}
    ]
}"#;

/// Temporary directory with helpers for writing fixtures
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    /// Workspace with the two-machine config already written
    pub fn with_default_machines() -> Self {
        let ws = Self::new();
        ws.write("controller.toml", TWO_MACHINE_CONFIG);
        ws
    }

    pub fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn config_path(&self) -> String {
        self.path("controller.toml").to_string_lossy().into_owned()
    }

    /// `run --job <name> --config <workspace config>`
    pub fn run_job(&self, job_name: &str) -> Command {
        let mut cmd = controller_cmd();
        cmd.arg("--quiet")
            .arg("run")
            .arg("--job")
            .arg(self.path(job_name))
            .arg("--config")
            .arg(self.config_path());
        cmd
    }
}

/// Command for the controller binary, isolated from host overrides
pub fn controller_cmd() -> Command {
    let mut cmd = Command::cargo_bin("cnc-controller").unwrap();
    for key in [
        "CNC_CONFIG",
        "CNC_CONTROLLER_NAME",
        "CNC_QUEUE_CAPACITY",
        "CNC_COMMAND_TIMEOUT_MS",
        "CNC_HISTORY_LIMIT",
        "CNC_POSITION_TOLERANCE",
        "CNC_SIM_LATENCY_MS",
        "CNC_LOG_LEVEL",
        "CNC_LOG_FILE",
        "CNC_LOG_JSON",
        "RUST_LOG",
    ] {
        cmd.env_remove(key);
    }
    cmd
}
