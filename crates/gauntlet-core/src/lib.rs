//! # gauntlet-core
//!
//! Core types for the Gauntlet browser-test harness.
//!
//! Gauntlet runs UI tests against a scriptable browser, safely in parallel,
//! with automatic retry and failure-artifact capture. This crate holds the
//! pieces every other crate depends on:
//!
//! - The unified [`HarnessError`] type and [`Result`] alias
//! - The immutable [`RunConfiguration`] and its once-only [`ConfigStore`]
//! - Run/report types ([`WorkerId`], [`Outcome`], [`AttemptRecord`],
//!   [`RunReport`])
//!
//! Configuration is loaded exactly once per process from a TOML file keyed by
//! an environment name (default `"qa"`) and shared read-only between all
//! workers.

mod config;
mod error;
mod report;

pub use config::{
    BrowserConfig, BrowserKind, ConfigStore, EnvironmentConfig, RetryPolicy, RunConfiguration,
    ScreenshotConfig, TestExecutionConfig, DEFAULT_ENVIRONMENT,
};
pub use error::{HarnessError, Result};
pub use report::{AttemptRecord, Outcome, RunReport, UnitReport, UnitStatus, WorkerId};
