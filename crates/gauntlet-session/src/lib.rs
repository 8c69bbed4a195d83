//! # gauntlet-session
//!
//! Parallel-safe browser session lifecycle for the Gauntlet harness.
//!
//! Every concurrent worker gets its own complete, isolated browser stack:
//! one engine process and one browser for the whole run, plus a fresh
//! context and page per test unit. Handles never cross worker boundaries.
//!
//! # Architecture
//!
//! - [`driver`]: object-safe traits the pool programs against
//! - [`playwright`] + [`bridge`]: production backend, a Node.js Playwright
//!   sidecar per worker engine speaking JSON-RPC over stdio
//! - [`fake`]: in-memory backend for tests
//! - [`pool`]: worker-indexed session ownership and deterministic teardown
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use gauntlet_core::{ConfigStore, WorkerId};
//! use gauntlet_session::{BridgeConfig, PlaywrightDriver, SessionPool};
//!
//! #[tokio::main]
//! async fn main() -> gauntlet_core::Result<()> {
//!     let config = ConfigStore::for_environment("qa").load()?;
//!     let driver = Arc::new(PlaywrightDriver::new(BridgeConfig::default()));
//!     let pool = SessionPool::new(driver, config);
//!
//!     let mut session = pool.worker_session(WorkerId(0));
//!     session.begin_test_session().await?;
//!     // ... run one test against session.page() ...
//!     session.end_test_session().await;
//!     session.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod bridge;
pub mod driver;
pub mod fake;
pub mod playwright;
pub mod pool;

pub use bridge::{BridgeConfig, PlaywrightBridge};
pub use driver::{BrowserHandle, ContextHandle, Driver, EngineHandle, LaunchSpec, PageHandle};
pub use fake::{FakeDriver, FakeState, FAKE_PNG};
pub use playwright::PlaywrightDriver;
pub use pool::{SessionPool, WorkerSession};
