//! Driver seam between the session pool and a concrete browser backend.
//!
//! The pool only ever talks to these object-safe traits. The production
//! backend is the Playwright bridge ([`crate::playwright`]); the test suite
//! uses the in-memory [`crate::fake`] backend. Handles form a strict
//! ownership chain: a page belongs to one context, a context to one browser,
//! a browser to one engine, and the whole chain to exactly one worker.

use async_trait::async_trait;
use gauntlet_core::{BrowserConfig, BrowserKind, Result};

/// Everything an engine needs to launch one browser instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub kind: BrowserKind,
    pub headless: bool,
    pub slow_mo_ms: u64,
}

impl From<&BrowserConfig> for LaunchSpec {
    fn from(config: &BrowserConfig) -> Self {
        Self {
            kind: config.kind,
            headless: config.headless,
            slow_mo_ms: config.slow_mo_ms,
        }
    }
}

/// Factory for engines. One engine is started per worker, on first use.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Start a new engine process. Fails with
    /// [`HarnessError::EngineStart`](gauntlet_core::HarnessError::EngineStart)
    /// when the underlying driver cannot be spawned.
    async fn start_engine(&self) -> Result<Box<dyn EngineHandle>>;
}

/// A running browser-engine driver process.
#[async_trait]
pub trait EngineHandle: Send + Sync {
    /// Launch one browser of the requested kind.
    async fn launch_browser(&self, spec: &LaunchSpec) -> Result<Box<dyn BrowserHandle>>;

    /// Stop the engine process. Called once per worker at run end.
    async fn stop(&mut self) -> Result<()>;
}

/// One launched browser instance.
#[async_trait]
pub trait BrowserHandle: Send + Sync {
    /// Create a fresh, isolated cookie/storage sandbox.
    async fn new_context(&self) -> Result<Box<dyn ContextHandle>>;

    async fn close(&mut self) -> Result<()>;
}

/// An isolated browsing context within a browser instance.
#[async_trait]
pub trait ContextHandle: Send + Sync {
    /// Opaque identity, unique within the run. Used to check isolation
    /// between workers, never interpreted.
    fn id(&self) -> &str;

    /// Open a new page (tab) inside this context.
    async fn new_page(&self) -> Result<Box<dyn PageHandle>>;

    async fn close(&mut self) -> Result<()>;
}

/// One navigable tab within a context.
#[async_trait]
pub trait PageHandle: Send + Sync {
    /// Opaque identity, unique within the run.
    fn id(&self) -> &str;

    /// Default timeout applied to subsequent page actions.
    async fn set_default_timeout(&self, timeout_ms: u64) -> Result<()>;

    /// Navigate and wait for the document to load.
    async fn goto(&self, url: &str) -> Result<()>;

    /// Capture a PNG screenshot of the page.
    async fn screenshot(&self, full_page: bool) -> Result<Vec<u8>>;

    async fn close(&mut self) -> Result<()>;
}
