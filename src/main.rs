//! CNC Controller - G-code job execution engine
//!
//! This is the main entry point for the controller binary.
//! Jobs are loaded from JSON, dispatched to per-machine executors and
//! driven through simulated actuators.

mod cli;

use std::collections::HashMap;
use std::sync::Arc;

use clap::Parser;
use futures_util::future::join_all;
use serde_json::json;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use cnc_controller::actuator::{Actuator, SimulatedActuator};
use cnc_controller::config::{self, ControllerConfig};
use cnc_controller::dispatcher::{ControllerEvent, Dispatcher};
use cnc_controller::error::{Error, Result};
use cnc_controller::jobs::JobFile;
use cnc_controller::logging;
use cnc_controller::translator::{CommandTranslator, TranslationContext};
use cnc_controller::types::{CncMachine, Task, TaskStatus};
use cnc_controller::version;

use crate::cli::{Cli, Commands};

fn main() -> Result<()> {
    // Parse CLI arguments first (before logging, so we know verbosity)
    let cli = Cli::parse();

    match &cli.command {
        Commands::Version => {
            version::print_version();
            return Ok(());
        }
        Commands::Config { subcommand } => {
            return handle_config_command(subcommand.clone());
        }
        _ => {}
    }

    let config = match ControllerConfig::load(cli.command.config_path()) {
        Ok(cfg) => cfg,
        Err(e) => exit_with(e),
    };

    // The guards must be kept alive for the lifetime of the program
    let _log_guards = logging::init_logging(&config.logging, cli.verbose, cli.quiet)?;

    let build = version::build_info();
    info!(
        version = %build.full_version(),
        controller = %config.display_name(),
        machines = config.machines.len(),
        "Starting CNC Controller"
    );

    let outcome = match cli.command {
        Commands::Run { job, json, .. } => {
            JobFile::load(&job).and_then(|job| run_job(config, job, json))
        }
        Commands::Plan { job, .. } => JobFile::load(&job).and_then(|job| plan_job(&config, &job)),
        Commands::Version | Commands::Config { .. } => {
            // Already handled above
            unreachable!();
        }
    };

    if let Err(e) = outcome {
        error!(error = %e.format_for_log(), "Command failed");
        exit_with(e);
    }

    Ok(())
}

/// Report an error the way the terminal expects and exit with its code
fn exit_with(e: Error) -> ! {
    eprint!("{}", e.format_for_terminal());
    std::process::exit(e.exit_code());
}

/// Reject jobs that reference machines the configuration does not define
fn check_machines(config: &ControllerConfig, job: &JobFile) -> Result<()> {
    match job
        .machines()
        .into_iter()
        .find(|id| !config.machines.iter().any(|m| m.id == *id))
    {
        Some(unknown) => Err(Error::unknown_machine(unknown)),
        None => Ok(()),
    }
}

// ─────────────────────────────────────────────────────────────────
// Run
// ─────────────────────────────────────────────────────────────────

fn run_job(config: ControllerConfig, job: JobFile, json_output: bool) -> Result<()> {
    check_machines(&config, &job)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(num_cpus::get().clamp(1, 8))
        .thread_name("cnc-controller")
        .build()
        .map_err(|e| Error::Internal(format!("Failed to create async runtime: {}", e)))?;

    runtime.block_on(async_run_job(config, job, json_output))
}

async fn async_run_job(config: ControllerConfig, job: JobFile, json_output: bool) -> Result<()> {
    let dispatcher = Arc::new(Dispatcher::new(config.executor.clone()));
    let event_log = tokio::spawn(log_events(dispatcher.subscribe()));
    // Subscribed before the first submit so no transition is missed
    let mut events = dispatcher.subscribe();

    let mut progress =
        match start_machines(&dispatcher, &config).and_then(|_| submit_job(&dispatcher, &job)) {
            Ok(progress) => progress,
            Err(e) => {
                dispatcher.shutdown().await;
                event_log.abort();
                return Err(e);
            }
        };
    info!(tasks = progress.order.len(), "Job submitted");

    let shutdown_signal = tokio::signal::ctrl_c();
    tokio::pin!(shutdown_signal);

    loop {
        progress.drain(&mut events, &dispatcher);
        if progress.settled(&dispatcher)? {
            break;
        }
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => progress.record(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event stream lagged, refreshing task snapshots");
                    progress.refresh(&dispatcher);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = &mut shutdown_signal => {
                warn!("Shutdown signal received, stopping machines");
                stop_all(&dispatcher).await;
                break;
            }
        }
    }

    dispatcher.shutdown().await;
    progress.drain(&mut events, &dispatcher);
    event_log.abort();

    let tasks = progress.into_tasks();
    let machines = dispatcher.statuses();

    if json_output {
        print_json_report(&config, &tasks, &machines)?;
    } else {
        print_text_report(&tasks, &machines);
    }

    let failed = tasks
        .iter()
        .filter(|(_, t)| t.status != TaskStatus::Completed)
        .count();
    if failed > 0 {
        return Err(Error::TasksFailed {
            failed,
            total: tasks.len(),
        });
    }
    Ok(())
}

fn start_machines(dispatcher: &Dispatcher, config: &ControllerConfig) -> Result<()> {
    for settings in &config.machines {
        let actuator: Arc<dyn Actuator> = Arc::new(SimulatedActuator::new(
            config.simulator_for(settings),
            settings.initial_position,
        ));
        dispatcher.register_machine(settings.to_machine(), actuator)?;
    }
    Ok(())
}

fn submit_job(dispatcher: &Dispatcher, job: &JobFile) -> Result<JobProgress> {
    let mut progress = JobProgress::default();
    for entry in &job.tasks {
        let task = entry.to_task();
        let snapshot = task.clone();
        dispatcher.submit(&entry.machine, task)?;
        progress.track(&entry.machine, snapshot);
    }
    Ok(progress)
}

/// Halt every machine; running tasks end CANCELLED at their next boundary
async fn stop_all(dispatcher: &Dispatcher) {
    let ids = dispatcher.machine_ids();
    let results = join_all(ids.iter().map(|id| dispatcher.stop(id))).await;
    for (machine_id, result) in ids.iter().zip(results) {
        if let Err(e) = result {
            warn!(machine_id = %machine_id, error = %e, "Failed to stop machine");
        }
    }
}

/// Latest snapshot of every submitted task, fed from lifecycle events
///
/// Executors keep a bounded history, so the report cannot rely on them
/// still knowing a task once it has finished.
#[derive(Default)]
struct JobProgress {
    /// Submission order
    order: Vec<(String, String)>,
    latest: HashMap<(String, String), Task>,
}

impl JobProgress {
    fn track(&mut self, machine_id: &str, task: Task) {
        let key = (machine_id.to_string(), task.task_id.clone());
        self.order.push(key.clone());
        self.latest.insert(key, task);
    }

    fn record(&mut self, event: ControllerEvent) {
        if let ControllerEvent::TaskStatusChanged {
            machine_id,
            task_id,
            task,
            ..
        } = event
        {
            self.update((machine_id, task_id), task);
        }
    }

    /// Terminal snapshots are never replaced
    fn update(&mut self, key: (String, String), task: Task) {
        if let Some(current) = self.latest.get_mut(&key) {
            if !current.status.is_terminal() {
                *current = task;
            }
        }
    }

    /// Apply every event already buffered
    fn drain(&mut self, events: &mut broadcast::Receiver<ControllerEvent>, dispatcher: &Dispatcher) {
        loop {
            match events.try_recv() {
                Ok(event) => self.record(event),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event stream lagged, refreshing task snapshots");
                    self.refresh(dispatcher);
                }
                Err(_) => break,
            }
        }
    }

    /// Re-read snapshots the executors still hold
    fn refresh(&mut self, dispatcher: &Dispatcher) {
        for (machine_id, task_id) in self.order.clone() {
            if let Ok(task) = dispatcher.task(&machine_id, &task_id) {
                self.update((machine_id, task_id), task);
            }
        }
    }

    /// Whether every task is finished or parked behind a halted machine
    /// that nothing will reset during this run
    fn settled(&self, dispatcher: &Dispatcher) -> Result<bool> {
        for (machine_id, task) in self.tasks() {
            if task.status.is_terminal() {
                continue;
            }
            let halted = dispatcher.status(machine_id)?.status.is_halted();
            if task.status == TaskStatus::Running || !halted {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn tasks(&self) -> impl Iterator<Item = (&str, &Task)> + '_ {
        self.order
            .iter()
            .filter_map(|key| self.latest.get(key).map(|task| (key.0.as_str(), task)))
    }

    fn into_tasks(mut self) -> Vec<(String, Task)> {
        self.order
            .iter()
            .filter_map(|key| self.latest.remove(key).map(|task| (key.0.clone(), task)))
            .collect()
    }
}

/// Mirror lifecycle events into the log
async fn log_events(mut events: broadcast::Receiver<ControllerEvent>) {
    loop {
        match events.recv().await {
            Ok(ControllerEvent::TaskStatusChanged {
                machine_id,
                task_id,
                status,
                ..
            }) => {
                debug!(machine_id = %machine_id, task_id = %task_id, status = %status, "Task event");
            }
            Ok(ControllerEvent::MachineStatusChanged {
                machine_id, status, ..
            }) => {
                debug!(machine_id = %machine_id, status = %status, "Machine event");
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Event log lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn print_text_report(tasks: &[(String, Task)], machines: &[CncMachine]) {
    println!("Tasks:");
    for (machine_id, task) in tasks {
        let elapsed = task
            .execution_time_ms()
            .map(|ms| format!("{}ms", ms))
            .unwrap_or_else(|| "-".to_string());
        print!(
            "  {:<24} {:<12} {:<10} commands={:<4} time={}",
            task.task_id, machine_id, task.status, task.commands_applied, elapsed
        );
        match task.error {
            Some(ref reason) => println!("  error: {}", reason),
            None => println!(),
        }
    }

    println!();
    println!("Machines:");
    for machine in machines {
        let tool = machine
            .current_tool
            .as_ref()
            .map(|t| t.id.as_str())
            .unwrap_or("none");
        println!(
            "  {:<12} {:<8} position={} speed={} tool={}",
            machine.machine_id, machine.status, machine.current_position, machine.speed, tool
        );
    }
}

fn print_json_report(
    config: &ControllerConfig,
    tasks: &[(String, Task)],
    machines: &[CncMachine],
) -> Result<()> {
    let tasks: Vec<serde_json::Value> = tasks
        .iter()
        .map(|(machine_id, task)| json!({ "machine": machine_id, "task": task }))
        .collect();
    let report = json!({
        "controller": config.display_name(),
        "tasks": tasks,
        "machines": machines,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

// ─────────────────────────────────────────────────────────────────
// Plan
// ─────────────────────────────────────────────────────────────────

/// Translate every task without executing; consecutive tasks on one
/// machine continue from the previous task's end state
fn plan_job(config: &ControllerConfig, job: &JobFile) -> Result<()> {
    check_machines(config, job)?;

    let translator = CommandTranslator::new();
    let mut contexts: HashMap<&str, TranslationContext> = config
        .machines
        .iter()
        .map(|m| (m.id.as_str(), TranslationContext::from_machine(&m.to_machine())))
        .collect();

    let mut failed = 0;
    for entry in &job.tasks {
        let label = entry.id.as_deref().unwrap_or("(generated)");
        let Some(start) = contexts.get(entry.machine.as_str()).copied() else {
            return Err(Error::unknown_machine(&entry.machine));
        };

        match translator.plan(&entry.gcode, start) {
            Ok(plan) => {
                println!(
                    "{} [{}]: {} motion commands",
                    label,
                    entry.machine,
                    plan.command_count()
                );
                for (gcode, step) in entry.gcode.iter().zip(&plan.steps) {
                    println!("  {}", gcode);
                    for command in step {
                        println!("    -> {}", command);
                    }
                }
                contexts.insert(entry.machine.as_str(), plan.context);
            }
            Err(e) => {
                failed += 1;
                println!("{} [{}]: rejected, {}", label, entry.machine, e);
            }
        }
    }

    if failed > 0 {
        return Err(Error::TasksFailed {
            failed,
            total: job.tasks.len(),
        });
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────
// Config
// ─────────────────────────────────────────────────────────────────

/// Handle configuration subcommands
fn handle_config_command(subcommand: cli::ConfigSubcommand) -> Result<()> {
    use cli::ConfigSubcommand;

    match subcommand {
        ConfigSubcommand::Show { config } => {
            let cfg = match ControllerConfig::load(config.as_deref()) {
                Ok(cfg) => cfg,
                Err(e) => exit_with(e),
            };
            println!("{}", toml::to_string_pretty(&cfg)?);
        }
        ConfigSubcommand::Init { path, force } => {
            match config::init_config(path.as_deref(), force) {
                Ok(path) => println!("Configuration written to {}", path.display()),
                Err(e) => exit_with(e),
            }
        }
        ConfigSubcommand::Validate { config } => match ControllerConfig::load(config.as_deref()) {
            Ok(cfg) => {
                println!(
                    "Configuration is valid ({} machine{}).",
                    cfg.machines.len(),
                    if cfg.machines.len() == 1 { "" } else { "s" }
                );
            }
            Err(e) => exit_with(e),
        },
    }

    Ok(())
}
