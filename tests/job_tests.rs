//! Job execution tests
//!
//! Runs job files end to end against simulated machines and checks the
//! reported task results and machine snapshots.

mod common;

use predicates::prelude::*;
use serde_json::Value;

use common::{controller_cmd, Workspace, SQUARE_JOB};

/// Run a job with `--json` and parse the report
fn run_json(ws: &Workspace, job: &str, expected_code: i32) -> Value {
    ws.write("job.json", job);
    let output = ws
        .run_job("job.json")
        .arg("--json")
        .assert()
        .code(expected_code)
        .get_output()
        .stdout
        .clone();
    serde_json::from_slice(&output).unwrap()
}

fn machine<'a>(report: &'a Value, id: &str) -> &'a Value {
    report["machines"]
        .as_array()
        .unwrap()
        .iter()
        .find(|m| m["machine_id"] == id)
        .unwrap()
}

// ─────────────────────────────────────────────────────────────────
// Successful Runs
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_square_job_text_report() {
    let ws = Workspace::with_default_machines();
    ws.write("job.json", SQUARE_JOB);

    ws.run_job("job.json")
        .assert()
        .success()
        .stdout(predicate::str::contains("square"))
        .stdout(predicate::str::contains("COMPLETED"))
        .stdout(predicate::str::contains("position=(10, 10, 0)"));
}

#[test]
fn test_square_job_json_report() {
    let ws = Workspace::with_default_machines();
    let report = run_json(&ws, SQUARE_JOB, 0);

    let task = &report["tasks"][0];
    assert_eq!(task["machine"], "mill-1");
    assert_eq!(task["task"]["task_id"], "square");
    assert_eq!(task["task"]["status"], "COMPLETED");
    assert_eq!(task["task"]["commands_applied"], 2);

    let mill = machine(&report, "mill-1");
    assert_eq!(mill["status"], "IDLE");
    assert_eq!(mill["current_position"]["x"], 10.0);
    assert_eq!(mill["current_position"]["y"], 10.0);
    assert_eq!(mill["speed"], 1000);
}

#[test]
fn test_tasks_on_one_machine_run_in_order() {
    let ws = Workspace::with_default_machines();
    let job = r#"{"tasks": [
        {"machine": "mill-1", "id": "first", "gcode": [
            {"command": "G00", "parameters": {"x": 20, "y": 5}}
        ]},
        {"machine": "mill-1", "id": "second", "gcode": [
            {"command": "G91"},
            {"command": "G01", "parameters": {"x": 1, "f": 400}},
            {"command": "M06", "parameters": {"t": "T2"}}
        ]},
        {"machine": "lathe-1", "id": "other", "gcode": [
            {"command": "G28"}
        ]}
    ]}"#;
    let report = run_json(&ws, job, 0);

    let statuses: Vec<&str> = report["tasks"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["task"]["status"].as_str().unwrap())
        .collect();
    assert_eq!(statuses, vec!["COMPLETED", "COMPLETED", "COMPLETED"]);

    let mill = machine(&report, "mill-1");
    assert_eq!(mill["current_position"]["x"], 21.0);
    assert_eq!(mill["current_position"]["y"], 5.0);
    assert_eq!(mill["speed"], 400);
    assert_eq!(mill["current_tool"]["id"], "T2");

    let lathe = machine(&report, "lathe-1");
    assert_eq!(lathe["current_position"]["x"], 0.0);
}

#[test]
fn test_report_covers_tasks_beyond_history_limit() {
    let ws = Workspace::new();
    ws.write(
        "controller.toml",
        r#"
[executor]
history_limit = 1

[logging]
level = "warn"

[[machines]]
id = "mill-1"
max_speed = 3000
"#,
    );
    let job = r#"{"tasks": [
        {"machine": "mill-1", "id": "one", "gcode": [
            {"command": "G00", "parameters": {"x": 1}}
        ]},
        {"machine": "mill-1", "id": "two", "gcode": [
            {"command": "G00", "parameters": {"x": 2}}
        ]},
        {"machine": "mill-1", "id": "three", "gcode": [
            {"command": "G00", "parameters": {"x": 3}}
        ]}
    ]}"#;
    let report = run_json(&ws, job, 0);

    let tasks: Vec<(&str, &str)> = report["tasks"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| {
            (
                t["task"]["task_id"].as_str().unwrap(),
                t["task"]["status"].as_str().unwrap(),
            )
        })
        .collect();
    assert_eq!(
        tasks,
        vec![("one", "COMPLETED"), ("two", "COMPLETED"), ("three", "COMPLETED")]
    );
    assert_eq!(report["tasks"][0]["task"]["commands_applied"], 1);
    assert_eq!(machine(&report, "mill-1")["current_position"]["x"], 3.0);
}

// ─────────────────────────────────────────────────────────────────
// Failures
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_failed_tool_change_leaves_machine_in_error() {
    let ws = Workspace::with_default_machines();
    let job = r#"{"tasks": [
        {"machine": "mill-1", "id": "bad-tool", "gcode": [
            {"command": "G01", "parameters": {"x": 5}},
            {"command": "M06", "parameters": {"t": "T9"}},
            {"command": "G01", "parameters": {"x": 50}}
        ]}
    ]}"#;
    let report = run_json(&ws, job, 50);

    let task = &report["tasks"][0]["task"];
    assert_eq!(task["status"], "FAILED");
    assert_eq!(task["commands_applied"], 1);
    assert!(task["error"].as_str().unwrap().contains("T9"));

    let mill = machine(&report, "mill-1");
    assert_eq!(mill["status"], "ERROR");
    assert_eq!(mill["current_position"]["x"], 5.0);
    assert!(mill["current_tool"].is_null());
}

#[test]
fn test_tasks_behind_failed_machine_are_cancelled_at_exit() {
    let ws = Workspace::with_default_machines();
    let job = r#"{"tasks": [
        {"machine": "mill-1", "id": "breaks", "gcode": [
            {"command": "M06", "parameters": {"t": "T9"}}
        ]},
        {"machine": "mill-1", "id": "waits", "gcode": [
            {"command": "G01", "parameters": {"x": 1}}
        ]},
        {"machine": "lathe-1", "id": "unaffected", "gcode": [
            {"command": "G28"}
        ]}
    ]}"#;
    let report = run_json(&ws, job, 50);

    let statuses: Vec<&str> = report["tasks"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["task"]["status"].as_str().unwrap())
        .collect();
    assert_eq!(statuses, vec!["FAILED", "CANCELLED", "COMPLETED"]);
    assert_eq!(machine(&report, "mill-1")["status"], "ERROR");
    assert_eq!(machine(&report, "lathe-1")["status"], "IDLE");
}

#[test]
fn test_untranslatable_task_fails_without_motion() {
    let ws = Workspace::with_default_machines();
    // lathe-1 has no feed rate configured
    let job = r#"{"tasks": [
        {"machine": "lathe-1", "id": "no-feed", "gcode": [
            {"command": "G00", "parameters": {"x": 0}},
            {"command": "G01", "parameters": {"x": 30}}
        ]}
    ]}"#;
    let report = run_json(&ws, job, 50);

    let task = &report["tasks"][0]["task"];
    assert_eq!(task["status"], "FAILED");
    assert_eq!(task["commands_applied"], 0);
    assert!(task["error"].as_str().unwrap().contains("gcode #1"));

    let lathe = machine(&report, "lathe-1");
    assert_eq!(lathe["status"], "IDLE");
    assert_eq!(lathe["current_position"]["x"], 5.0);
}

#[test]
fn test_unknown_machine_rejected_before_execution() {
    let ws = Workspace::with_default_machines();
    ws.write(
        "job.json",
        r#"{"tasks": [{"machine": "router-9", "gcode": [{"command": "G28"}]}]}"#,
    );

    ws.run_job("job.json")
        .assert()
        .code(40)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("Unknown machine: router-9"));
}

#[test]
fn test_duplicate_task_id_stops_the_run() {
    let ws = Workspace::with_default_machines();
    ws.write(
        "job.json",
        r#"{"tasks": [
            {"machine": "mill-1", "id": "twice", "gcode": [
                {"command": "G00", "parameters": {"x": 1}}
            ]},
            {"machine": "mill-1", "id": "twice", "gcode": [
                {"command": "G00", "parameters": {"x": 2}}
            ]}
        ]}"#,
    );

    ws.run_job("job.json")
        .timeout(std::time::Duration::from_secs(30))
        .assert()
        .code(40)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains(
            "Task twice already submitted to machine mill-1",
        ));
}

#[test]
fn test_malformed_job_file() {
    let ws = Workspace::with_default_machines();
    ws.write("job.json", "{\"tasks\": [");

    ws.run_job("job.json")
        .assert()
        .code(20)
        .stderr(predicate::str::contains("Invalid job file"));
}

#[test]
fn test_missing_job_file() {
    let ws = Workspace::with_default_machines();

    ws.run_job("absent.json")
        .assert()
        .code(20)
        .stderr(predicate::str::contains("failed to read"));
}

// ─────────────────────────────────────────────────────────────────
// Planning
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_plan_prints_motion_commands() {
    let ws = Workspace::with_default_machines();
    ws.write("job.json", SQUARE_JOB);

    controller_cmd()
        .arg("plan")
        .arg("--job")
        .arg(ws.path("job.json"))
        .arg("--config")
        .arg(ws.config_path())
        .assert()
        .success()
        .stdout(predicate::str::contains("square [mill-1]: 2 motion commands"))
        .stdout(predicate::str::contains("MoveTo (10, 0, 0) @ 1000"))
        .stdout(predicate::str::contains("MoveTo (10, 10, 0) @ 1000"));
}

#[test]
fn test_plan_reports_unsupported_command() {
    let ws = Workspace::with_default_machines();
    ws.write(
        "job.json",
        r#"{"tasks": [{"machine": "mill-1", "id": "arc", "gcode": [
            {"command": "G02", "parameters": {"x": 1, "y": 1}}
        ]}]}"#,
    );

    controller_cmd()
        .arg("plan")
        .arg("--job")
        .arg(ws.path("job.json"))
        .arg("--config")
        .arg(ws.config_path())
        .assert()
        .code(50)
        .stdout(predicate::str::contains("arc [mill-1]: rejected"))
        .stdout(predicate::str::contains("Unsupported G-code command: G02"));
}
