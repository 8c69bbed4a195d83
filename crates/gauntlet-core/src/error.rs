//! Unified error types for Gauntlet

use thiserror::Error;

/// Unified error type for all Gauntlet operations
#[derive(Error, Debug)]
pub enum HarnessError {
    // Configuration errors (fatal before any worker starts)
    #[error("Configuration error: {0}")]
    Configuration(String),

    // Engine/driver errors
    #[error("Engine start failed: {0}")]
    EngineStart(String),

    #[error("Bridge communication error: {0}")]
    Bridge(String),

    // Browser errors
    #[error("Browser launch failed: {0}")]
    BrowserLaunch(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Screenshot capture failed: {0}")]
    Screenshot(String),

    // Artifact errors
    #[error("Artifact sink error: {0}")]
    Artifact(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(String),
}

/// Result type alias using HarnessError
pub type Result<T> = std::result::Result<T, HarnessError>;
