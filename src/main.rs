//! tom-runner - hierarchical test runner
//!
//! Runs trees of tests (suites, hooks, deferred and synchronous tests) under
//! a per-suite concurrency cap and reports the outcome through `tracing`.
//!
//! ## Usage
//!
//! ```bash
//! # Run the demo suite
//! tom-runner demo --max-concurrency 2 --timeout 500
//!
//! # Show what a failing run looks like
//! tom-runner demo --with-failure --debug
//!
//! # Write and inspect the configuration
//! tom-runner config init
//! tom-runner config show
//! ```

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use tom_runner::config::{EnvConfig, RunnerConfig, DEFAULT_CONFIG_FILE};
use tom_runner::sample::demo_suite;
use tom_runner::tree::Treeable;
use tom_runner::utils::init_logger;
use tom_runner::views::LogView;
use tom_runner::{RunState, Runner};

mod cli;

use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let env = EnvConfig::load();

    let config_path = args
        .config
        .clone()
        .or_else(|| env.config_file.as_ref().map(PathBuf::from));
    let config = load_config(config_path.as_deref())?.with_env(&env);

    init_logger(args.log_level.unwrap_or(config.log_level));

    match args.command {
        cli::Command::Demo(demo_args) => {
            let passed = run_demo(demo_args, config).await?;
            if !passed {
                std::process::exit(1);
            }
        }
        cli::Command::Config(config_args) => {
            let path = config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
            manage_config(config_args, &path, &config, &env)?;
        }
    }

    Ok(())
}

/// Explicit path, then the default file if present, then built-in defaults
fn load_config(path: Option<&Path>) -> Result<RunnerConfig> {
    match path {
        Some(path) => RunnerConfig::load(path),
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => RunnerConfig::load(DEFAULT_CONFIG_FILE),
        None => Ok(RunnerConfig::default()),
    }
}

async fn run_demo(args: cli::DemoArgs, mut config: RunnerConfig) -> Result<bool> {
    config.debug |= args.debug;
    if let Some(max) = args.max_concurrency {
        config.defaults.max_concurrency = max;
    }
    if let Some(timeout) = args.timeout {
        config.defaults.timeout_millis = timeout;
    }

    let root = demo_suite(&config.defaults, args.with_failure)
        .context("Failed to build demo suite")?;
    if args.tree {
        print!("{}", root.tree());
    }

    info!(
        "Demo: max concurrency {}, timeout {}ms",
        config.defaults.max_concurrency, config.defaults.timeout_millis
    );

    let view = if args.verbose {
        LogView::new().verbose()
    } else {
        LogView::new()
    };
    let runner = Runner::with_options(root, config.runner_options(), Some(Arc::new(view)))?;
    let stats = runner.start().await?;

    println!("{stats}");
    Ok(runner.state() == RunState::Pass && stats.is_all_passed())
}

fn manage_config(
    args: cli::ConfigArgs,
    path: &Path,
    config: &RunnerConfig,
    env: &EnvConfig,
) -> Result<()> {
    match args.action {
        cli::ConfigAction::Init { force } => {
            if path.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", path.display());
            }
            RunnerConfig::default().save(path)?;
            println!("✓ Wrote {}", path.display());
        }
        cli::ConfigAction::Show => {
            let text = serde_yaml::to_string(config).context("Failed to serialize config")?;
            println!("# {}", path.display());
            print!("{text}");
            if env.has_any() {
                println!();
                env.print_summary();
            }
        }
    }
    Ok(())
}
