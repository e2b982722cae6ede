//! CLI argument parsing using clap v4
//!
//! Defines the command-line interface for the CNC controller.

use clap::{Parser, Subcommand};

/// CNC Controller - G-code job execution engine
///
/// Queues G-code jobs per machine, translates them into motion commands
/// and drives each machine through its actuator one command at a time.
#[derive(Parser, Debug)]
#[command(name = "cnc-controller")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for the controller
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Execute a job file against the configured (simulated) machines
    Run {
        /// Path to the JSON job file
        #[arg(short, long)]
        job: String,

        /// Path to configuration file
        #[arg(short, long, env = "CNC_CONFIG")]
        config: Option<String>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Translate a job file and print the motion plan without executing it
    Plan {
        /// Path to the JSON job file
        #[arg(short, long)]
        job: String,

        /// Path to configuration file
        #[arg(short, long, env = "CNC_CONFIG")]
        config: Option<String>,
    },

    /// Display version and build information
    Version,

    /// Configuration management
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

/// Configuration subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ConfigSubcommand {
    /// Display the current configuration
    Show {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Initialize a new configuration file
    Init {
        /// Path where to create the config file
        #[arg(short, long)]
        path: Option<String>,

        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Validate a configuration file
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        config: Option<String>,
    },
}

impl Commands {
    /// Config path given to a command that executes or plans jobs
    pub fn config_path(&self) -> Option<&str> {
        match self {
            Commands::Run { config, .. } | Commands::Plan { config, .. } => config.as_deref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_command() {
        let cli = Cli::parse_from(["cnc-controller", "run", "--job", "job.json"]);
        match cli.command {
            Commands::Run { job, json, .. } => {
                assert_eq!(job, "job.json");
                assert!(!json);
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_run_requires_job() {
        assert!(Cli::try_parse_from(["cnc-controller", "run"]).is_err());
    }

    #[test]
    fn test_run_with_config_and_json() {
        let cli = Cli::parse_from([
            "cnc-controller",
            "run",
            "-j",
            "job.json",
            "--config",
            "/path/to/config.toml",
            "--json",
        ]);
        assert_eq!(cli.command.config_path(), Some("/path/to/config.toml"));
        match cli.command {
            Commands::Run { json, .. } => assert!(json),
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_plan_command() {
        let cli = Cli::parse_from(["cnc-controller", "plan", "--job", "job.json"]);
        match cli.command {
            Commands::Plan { job, .. } => assert_eq!(job, "job.json"),
            _ => panic!("Expected Plan command"),
        }
    }

    #[test]
    fn test_verbose_flags() {
        let cli = Cli::parse_from(["cnc-controller", "-vv", "version"]);
        assert_eq!(cli.verbose, 2);
        assert!(!cli.quiet);
        assert!(cli.command.config_path().is_none());
    }

    #[test]
    fn test_quiet_flag() {
        let cli = Cli::parse_from(["cnc-controller", "--quiet", "version"]);
        assert!(cli.quiet);
    }

    #[test]
    fn test_config_show() {
        let cli = Cli::parse_from(["cnc-controller", "config", "show"]);
        match cli.command {
            Commands::Config { subcommand: ConfigSubcommand::Show { config } } => {
                assert!(config.is_none());
            }
            _ => panic!("Expected Config Show command"),
        }
    }

    #[test]
    fn test_config_init() {
        let cli = Cli::parse_from(["cnc-controller", "config", "init", "--force"]);
        match cli.command {
            Commands::Config { subcommand: ConfigSubcommand::Init { path, force } } => {
                assert!(path.is_none());
                assert!(force);
            }
            _ => panic!("Expected Config Init command"),
        }
    }
}
