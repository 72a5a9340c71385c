//! CLI argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use tom_runner::utils::LogLevel;

/// Hierarchical test runner
#[derive(Parser, Debug)]
#[command(name = "tom-runner")]
#[command(version)]
#[command(about = "Run trees of tests under a concurrency cap")]
#[command(long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file (YAML or JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<LogLevel>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the built-in demo suite
    Demo(DemoArgs),

    /// Manage the configuration file
    Config(ConfigArgs),
}

/// Arguments for the demo command
#[derive(Parser, Debug)]
pub struct DemoArgs {
    /// Print the full trace of failing tests
    #[arg(short, long)]
    pub debug: bool,

    /// Children allowed to run at once per suite
    #[arg(short, long)]
    pub max_concurrency: Option<usize>,

    /// Timeout for deferred tests, in milliseconds
    #[arg(short, long)]
    pub timeout: Option<u64>,

    /// Include a failing test
    #[arg(long)]
    pub with_failure: bool,

    /// Print the test tree before running
    #[arg(long)]
    pub tree: bool,

    /// Also report ignored grouping nodes
    #[arg(short, long)]
    pub verbose: bool,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Print the effective configuration
    Show,
}
