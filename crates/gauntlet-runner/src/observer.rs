//! Failure observation: screenshot capture and artifact attachment.
//!
//! The observer fires on a test unit's terminal failure or skip (and, under
//! [`CapturePolicy::EveryAttempt`], on each intermediate failed attempt).
//! Nothing in here can fail the run: capture and attach errors are logged
//! and swallowed.

use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use gauntlet_core::{HarnessError, Result, ScreenshotConfig};
use gauntlet_session::PageHandle;
use tracing::{debug, error, info, warn};

/// Destination for diagnostic artifacts. The core does not define storage;
/// it only hands over `(name, mime type, bytes)` once per capture.
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    async fn attach(&self, name: &str, mime_type: &str, bytes: &[u8]) -> Result<()>;
}

/// Sink writing artifacts as files under one directory.
pub struct FsArtifactSink {
    dir: PathBuf,
}

impl FsArtifactSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl ArtifactSink for FsArtifactSink {
    async fn attach(&self, name: &str, _mime_type: &str, bytes: &[u8]) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            HarnessError::Artifact(format!(
                "Failed to create artifact directory {}: {}",
                self.dir.display(),
                e
            ))
        })?;
        let path = self.dir.join(name);
        tokio::fs::write(&path, bytes).await.map_err(|e| {
            HarnessError::Artifact(format!("Failed to write artifact {}: {}", path.display(), e))
        })?;
        debug!("Artifact written: {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }
}

/// One attachment captured by the [`MemorySink`].
#[derive(Debug, Clone)]
pub struct Attachment {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Sink collecting attachments in memory, for tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    attachments: Mutex<Vec<Attachment>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attachments(&self) -> Vec<Attachment> {
        self.attachments.lock().expect("sink poisoned").clone()
    }
}

#[async_trait]
impl ArtifactSink for MemorySink {
    async fn attach(&self, name: &str, mime_type: &str, bytes: &[u8]) -> Result<()> {
        self.attachments.lock().expect("sink poisoned").push(Attachment {
            name: name.to_string(),
            mime_type: mime_type.to_string(),
            bytes: bytes.to_vec(),
        });
        Ok(())
    }
}

/// When the observer captures a screenshot for a failing unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CapturePolicy {
    /// Once per unit, on the terminal failure/skip only. Retried attempts
    /// that are later redeemed produce no artifact.
    #[default]
    TerminalOnly,
    /// Additionally on every intermediate failed attempt.
    EveryAttempt,
}

/// Captures a full-page screenshot from the failing worker's current page
/// and attaches it to the run's artifact sink.
pub struct FailureObserver {
    sink: Box<dyn ArtifactSink>,
    screenshot: ScreenshotConfig,
    policy: CapturePolicy,
}

impl FailureObserver {
    pub fn new(sink: Box<dyn ArtifactSink>, screenshot: ScreenshotConfig) -> Self {
        Self {
            sink,
            screenshot,
            policy: CapturePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: CapturePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> CapturePolicy {
        self.policy
    }

    /// Observe a failed or skipped unit. With a live page this captures one
    /// PNG and attaches it under a timestamp-disambiguated key; without one
    /// it logs a warning and does nothing else. Never propagates errors.
    pub async fn on_unit_failure(&self, test_name: &str, page: Option<&dyn PageHandle>) {
        if !self.screenshot.take_on_failure {
            debug!("Screenshot capture disabled, skipping '{}'", test_name);
            return;
        }

        let Some(page) = page else {
            warn!("No active page found to capture screenshot for '{}'", test_name);
            return;
        };

        match page.screenshot(self.screenshot.full_page).await {
            Ok(bytes) => {
                let key = format!("{}_{}.png", test_name, Utc::now().timestamp_millis());
                match self.sink.attach(&key, "image/png", &bytes).await {
                    Ok(()) => info!(
                        "Attached failure screenshot {} ({} bytes)",
                        key,
                        bytes.len()
                    ),
                    Err(e) => error!("Failed to attach screenshot for '{}': {}", test_name, e),
                }
            }
            Err(e) => error!("Failed to capture screenshot for '{}': {}", test_name, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gauntlet_core::{RunConfiguration, WorkerId};
    use gauntlet_session::{FakeDriver, SessionPool, FAKE_PNG};
    use std::sync::Arc;

    fn screenshots_on() -> ScreenshotConfig {
        ScreenshotConfig {
            take_on_failure: true,
            full_page: true,
        }
    }

    async fn open_session(driver: &FakeDriver) -> gauntlet_session::WorkerSession {
        let config = Arc::new(
            RunConfiguration::from_toml("[environment]\nname = \"qa\"").unwrap(),
        );
        let pool = SessionPool::new(Arc::new(driver.clone()), config);
        let mut session = pool.worker_session(WorkerId(0));
        session.begin_test_session().await.unwrap();
        session
    }

    fn sink_and_observer() -> (Arc<MemorySink>, FailureObserver) {
        let sink = Arc::new(MemorySink::new());
        let observer = FailureObserver::new(Box::new(SharedSink(sink.clone())), screenshots_on());
        (sink, observer)
    }

    /// Adapter so tests can keep a handle to the sink they hand over.
    struct SharedSink(Arc<MemorySink>);

    #[async_trait]
    impl ArtifactSink for SharedSink {
        async fn attach(&self, name: &str, mime_type: &str, bytes: &[u8]) -> Result<()> {
            self.0.attach(name, mime_type, bytes).await
        }
    }

    #[tokio::test]
    async fn test_live_page_produces_exactly_one_artifact() {
        let driver = FakeDriver::new();
        let mut session = open_session(&driver).await;
        let (sink, observer) = sink_and_observer();

        observer.on_unit_failure("checkout_flow", session.page()).await;

        let attachments = sink.attachments();
        assert_eq!(attachments.len(), 1);
        assert!(attachments[0].name.starts_with("checkout_flow_"));
        assert!(attachments[0].name.ends_with(".png"));
        assert_eq!(attachments[0].mime_type, "image/png");
        assert_eq!(attachments[0].bytes, FAKE_PNG);
        session.end_test_session().await;
    }

    #[tokio::test]
    async fn test_no_page_produces_no_artifact() {
        let (sink, observer) = sink_and_observer();
        observer.on_unit_failure("setup_crashed", None).await;
        assert!(sink.attachments().is_empty());
    }

    #[tokio::test]
    async fn test_capture_failure_is_swallowed() {
        let driver = FakeDriver::new();
        let mut session = open_session(&driver).await;
        driver.fail_screenshot(true);
        let (sink, observer) = sink_and_observer();

        observer.on_unit_failure("flaky_capture", session.page()).await;

        assert!(sink.attachments().is_empty());
        session.end_test_session().await;
    }

    #[tokio::test]
    async fn test_disabled_screenshots_capture_nothing() {
        let driver = FakeDriver::new();
        let mut session = open_session(&driver).await;
        let sink = Arc::new(MemorySink::new());
        let observer = FailureObserver::new(
            Box::new(SharedSink(sink.clone())),
            ScreenshotConfig {
                take_on_failure: false,
                full_page: true,
            },
        );

        observer.on_unit_failure("quiet", session.page()).await;

        assert!(sink.attachments().is_empty());
        assert_eq!(driver.state().screenshots_taken, 0);
        session.end_test_session().await;
    }

    #[tokio::test]
    async fn test_fs_sink_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FsArtifactSink::new(dir.path().join("artifacts"));

        sink.attach("login_123.png", "image/png", b"bytes")
            .await
            .unwrap();

        let written = std::fs::read(dir.path().join("artifacts/login_123.png")).unwrap();
        assert_eq!(written, b"bytes");
    }
}
