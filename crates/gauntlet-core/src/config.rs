//! Run configuration: loaded once per process, read-only thereafter.
//!
//! One TOML file per environment name lives under a config directory
//! (`config/qa.toml`, `config/dev.toml`, ...). The [`ConfigStore`] performs
//! the load exactly once behind a [`OnceCell`] barrier; every consumer
//! receives the same immutable `Arc<RunConfiguration>`. There are no mutation
//! methods: a loading failure is fatal to the run.

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::{HarnessError, Result};

/// Environment selected when none is given explicitly.
pub const DEFAULT_ENVIRONMENT: &str = "qa";

/// Browser kind the session pool launches for every worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserKind {
    Chromium,
    Firefox,
    Webkit,
}

impl std::fmt::Display for BrowserKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BrowserKind::Chromium => write!(f, "chromium"),
            BrowserKind::Firefox => write!(f, "firefox"),
            BrowserKind::Webkit => write!(f, "webkit"),
        }
    }
}

/// Environment under test
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentConfig {
    /// Environment name (qa, dev, ...)
    pub name: String,

    /// URL every fresh page navigates to before the test body runs
    #[serde(default)]
    pub base_url: Option<String>,
}

/// Browser launch settings, one browser per worker
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserConfig {
    /// Browser kind (chromium, firefox, webkit)
    #[serde(rename = "type", default = "default_browser_kind")]
    pub kind: BrowserKind,

    /// Run without a visible window
    #[serde(default = "default_headless")]
    pub headless: bool,

    /// Artificial delay between browser actions, in milliseconds
    #[serde(rename = "slowMo", default)]
    pub slow_mo_ms: u64,

    /// Default timeout applied to every fresh page, in milliseconds
    #[serde(rename = "timeout", default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

/// Failure-screenshot behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenshotConfig {
    /// Capture a screenshot on terminal failure/skip
    #[serde(default = "default_true")]
    pub take_on_failure: bool,

    /// Capture the full scrollable page rather than the viewport
    #[serde(default = "default_true")]
    pub full_page: bool,
}

/// Parallelism settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestExecutionConfig {
    /// Run test units on concurrent workers
    #[serde(default)]
    pub parallel: bool,

    /// Number of workers when parallel execution is enabled
    #[serde(default = "default_thread_count")]
    pub thread_count: usize,
}

/// Governs the retry controller
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Re-attempt failed test units at all
    #[serde(default)]
    pub enabled: bool,

    /// Maximum re-attempts after the first failure
    #[serde(default)]
    pub max_retries: u32,

    /// Wait between attempts, in milliseconds (blocks only the retrying worker)
    #[serde(rename = "delayBetweenRetries", default)]
    pub delay_between_retries_ms: u64,
}

/// Process-wide run settings, immutable after load
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunConfiguration {
    pub environment: EnvironmentConfig,

    #[serde(default)]
    pub browser: BrowserConfig,

    #[serde(default)]
    pub screenshot: ScreenshotConfig,

    #[serde(default)]
    pub test_execution: TestExecutionConfig,

    #[serde(default)]
    pub retry: RetryPolicy,
}

// Default value providers
fn default_browser_kind() -> BrowserKind {
    BrowserKind::Chromium
}

fn default_headless() -> bool {
    true
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_thread_count() -> usize {
    1
}

fn default_true() -> bool {
    true
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            kind: default_browser_kind(),
            headless: default_headless(),
            slow_mo_ms: 0,
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl Default for ScreenshotConfig {
    fn default() -> Self {
        Self {
            take_on_failure: true,
            full_page: true,
        }
    }
}

impl Default for TestExecutionConfig {
    fn default() -> Self {
        Self {
            parallel: false,
            thread_count: default_thread_count(),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            max_retries: 0,
            delay_between_retries_ms: 0,
        }
    }
}

impl RunConfiguration {
    /// Parse a configuration from TOML text and validate it.
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: RunConfiguration = toml::from_str(text)
            .map_err(|e| HarnessError::Configuration(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Workers the suite coordinator spawns for this run.
    pub fn worker_count(&self) -> usize {
        if self.test_execution.parallel {
            self.test_execution.thread_count
        } else {
            1
        }
    }

    fn validate(&self) -> Result<()> {
        if self.test_execution.thread_count == 0 {
            return Err(HarnessError::Configuration(
                "testExecution.threadCount must be at least 1".to_string(),
            ));
        }
        if self.browser.timeout_ms == 0 {
            return Err(HarnessError::Configuration(
                "browser.timeout must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Once-only loader for [`RunConfiguration`].
///
/// The first caller of [`load`](ConfigStore::load) reads and parses the
/// environment file; concurrent callers block until that load completes and
/// then receive the identical cached `Arc`. The underlying file is read at
/// most once per store.
pub struct ConfigStore {
    config_dir: PathBuf,
    environment: String,
    cached: OnceCell<Arc<RunConfiguration>>,
}

impl ConfigStore {
    /// Create a store reading `<config_dir>/<environment>.toml`.
    pub fn new(config_dir: impl Into<PathBuf>, environment: impl Into<String>) -> Self {
        Self {
            config_dir: config_dir.into(),
            environment: environment.into(),
            cached: OnceCell::new(),
        }
    }

    /// Store for an environment name under the conventional `config/` directory.
    pub fn for_environment(environment: impl Into<String>) -> Self {
        Self::new("config", environment)
    }

    /// Environment name this store resolves.
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Load the configuration, reading the source file at most once.
    pub fn load(&self) -> Result<Arc<RunConfiguration>> {
        self.cached
            .get_or_try_init(|| {
                let path = self.config_dir.join(format!("{}.toml", self.environment));
                info!("Loading configuration from {}", path.display());

                let text = std::fs::read_to_string(&path).map_err(|e| {
                    HarnessError::Configuration(format!(
                        "Configuration file not found: {}: {}",
                        path.display(),
                        e
                    ))
                })?;

                let config = RunConfiguration::from_toml(&text)?;
                info!(
                    "Configuration loaded for environment: {}",
                    config.environment.name
                );
                Ok(Arc::new(config))
            })
            .cloned()
    }
}
