//! Gauntlet CLI - parallel-safe browser test execution
//!
//! Usage:
//!   gauntlet run                 Run the built-in smoke suite
//!   gauntlet config              Show the resolved run configuration

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gauntlet_core::{ConfigStore, Outcome, UnitStatus, DEFAULT_ENVIRONMENT};
use gauntlet_runner::{CapturePolicy, FailureObserver, FsArtifactSink, SuiteRunner, TestUnit};
use gauntlet_session::{BridgeConfig, PlaywrightDriver, WorkerSession};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "gauntlet")]
#[command(author, version, about = "Parallel-safe browser test execution harness")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the built-in smoke suite against the configured environment
    Run {
        /// Directory holding per-environment config files
        #[arg(long, default_value = "config")]
        config_dir: PathBuf,

        /// Environment to load (<config-dir>/<env>.toml)
        #[arg(short, long, default_value = DEFAULT_ENVIRONMENT)]
        environment: String,

        /// Directory for failure screenshots
        #[arg(long, default_value = "artifacts")]
        artifacts_dir: PathBuf,

        /// Capture a screenshot on every failed attempt, not just the last
        #[arg(long)]
        capture_every_attempt: bool,
    },

    /// Show the resolved run configuration
    Config {
        /// Directory holding per-environment config files
        #[arg(long, default_value = "config")]
        config_dir: PathBuf,

        /// Environment to load (<config-dir>/<env>.toml)
        #[arg(short, long, default_value = DEFAULT_ENVIRONMENT)]
        environment: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Run {
            config_dir,
            environment,
            artifacts_dir,
            capture_every_attempt,
        } => cmd_run(config_dir, environment, artifacts_dir, capture_every_attempt).await,
        Commands::Config {
            config_dir,
            environment,
        } => cmd_config(config_dir, environment),
    }
}

/// Smoke unit: a fresh session must expose a live page, already pointed at
/// the configured base URL when one is set.
struct SmokeUnit;

#[async_trait::async_trait]
impl TestUnit for SmokeUnit {
    fn name(&self) -> &str {
        "smoke_session_opens"
    }

    async fn run(&self, session: &WorkerSession) -> Outcome {
        match session.page() {
            Some(_) => Outcome::Pass,
            None => Outcome::fail("no active page in a fresh session"),
        }
    }
}

async fn cmd_run(
    config_dir: PathBuf,
    environment: String,
    artifacts_dir: PathBuf,
    capture_every_attempt: bool,
) -> Result<()> {
    let store = ConfigStore::new(&config_dir, &environment);
    let config = store
        .load()
        .with_context(|| format!("Failed to load configuration for '{}'", environment))?;

    info!(
        "Loaded environment '{}' (browser: {}, {} worker(s))",
        config.environment.name,
        config.browser.kind,
        config.worker_count()
    );

    let driver = Arc::new(PlaywrightDriver::new(BridgeConfig::default()));
    let policy = if capture_every_attempt {
        CapturePolicy::EveryAttempt
    } else {
        CapturePolicy::TerminalOnly
    };
    let observer = FailureObserver::new(
        Box::new(FsArtifactSink::new(&artifacts_dir)),
        config.screenshot.clone(),
    )
    .with_policy(policy);

    let runner = SuiteRunner::new(config, driver, observer);
    let units: Vec<Arc<dyn TestUnit>> = vec![Arc::new(SmokeUnit)];

    let report = runner.run(units).await.context("Run aborted")?;

    println!();
    for unit in &report.units {
        match &unit.status {
            UnitStatus::Passed { attempts_used } => {
                if *attempts_used == 0 {
                    println!("  PASS  {}", unit.name);
                } else {
                    println!("  PASS  {} (after {} retr{})", unit.name, attempts_used,
                        if *attempts_used == 1 { "y" } else { "ies" });
                }
            }
            UnitStatus::FailedFinal { reason, .. } => {
                println!("  FAIL  {}: {}", unit.name, reason);
            }
            UnitStatus::Skipped { reason } => {
                println!("  SKIP  {}: {}", unit.name, reason);
            }
        }
    }
    println!();
    println!(
        "{} passed, {} failed, {} skipped",
        report.passed(),
        report.failed(),
        report.skipped()
    );

    if !report.all_green() {
        std::process::exit(1);
    }

    Ok(())
}

fn cmd_config(config_dir: PathBuf, environment: String) -> Result<()> {
    let store = ConfigStore::new(&config_dir, &environment);
    let config = store
        .load()
        .with_context(|| format!("Failed to load configuration for '{}'", environment))?;

    println!("{}", serde_json::to_string_pretty(config.as_ref())?);
    Ok(())
}
