//! Per-worker browser session lifecycle.
//!
//! Every worker owns one [`WorkerSession`]: engine and browser span the
//! worker's whole participation in the run (created on first use), context
//! and page span exactly one test unit. Sessions are moved into their worker
//! task and never shared, so no lock guards any handle: concurrency safety
//! comes from partitioning, not mutual exclusion.

use std::sync::Arc;

use gauntlet_core::{HarnessError, Result, RunConfiguration, WorkerId};
use tracing::{debug, info, warn};

use crate::driver::{BrowserHandle, ContextHandle, Driver, EngineHandle, LaunchSpec, PageHandle};

/// Creates worker sessions that all read the same immutable configuration.
///
/// The pool itself holds no handles; it exists so the suite coordinator has
/// one place that maps a [`WorkerId`] to a fresh, exclusively-owned
/// [`WorkerSession`].
pub struct SessionPool {
    driver: Arc<dyn Driver>,
    config: Arc<RunConfiguration>,
}

impl SessionPool {
    pub fn new(driver: Arc<dyn Driver>, config: Arc<RunConfiguration>) -> Self {
        Self { driver, config }
    }

    /// Create the session owned by `worker`. No engine is started yet;
    /// everything is lazy so idle workers cost nothing.
    pub fn worker_session(&self, worker: WorkerId) -> WorkerSession {
        WorkerSession {
            worker,
            driver: self.driver.clone(),
            config: self.config.clone(),
            engine: None,
            browser: None,
            active: None,
        }
    }

    pub fn config(&self) -> &Arc<RunConfiguration> {
        &self.config
    }
}

/// Context + page pair alive for exactly one test unit.
struct ActiveSession {
    context: Box<dyn ContextHandle>,
    page: Box<dyn PageHandle>,
}

/// One worker's complete, isolated browser stack.
pub struct WorkerSession {
    worker: WorkerId,
    driver: Arc<dyn Driver>,
    config: Arc<RunConfiguration>,
    engine: Option<Box<dyn EngineHandle>>,
    browser: Option<Box<dyn BrowserHandle>>,
    active: Option<ActiveSession>,
}

impl WorkerSession {
    pub fn worker_id(&self) -> WorkerId {
        self.worker
    }

    /// Start this worker's engine if it is not already running. Idempotent:
    /// a live engine is reused for every test the worker runs.
    pub async fn acquire_engine(&mut self) -> Result<&dyn EngineHandle> {
        if self.engine.is_none() {
            info!("{}: starting browser engine", self.worker);
            self.engine = Some(self.driver.start_engine().await?);
        }
        self.engine
            .as_deref()
            .ok_or_else(|| HarnessError::Session("engine unavailable".to_string()))
    }

    /// Launch this worker's browser if it is not already running. One browser
    /// per worker for the run's duration; never recreated between tests.
    pub async fn acquire_browser(&mut self) -> Result<&dyn BrowserHandle> {
        if self.browser.is_none() {
            self.acquire_engine().await?;
            let engine = self
                .engine
                .as_deref()
                .ok_or_else(|| HarnessError::Session("engine unavailable".to_string()))?;
            let spec = LaunchSpec::from(&self.config.browser);
            debug!(
                "{}: launching {} (headless: {})",
                self.worker, spec.kind, spec.headless
            );
            self.browser = Some(engine.launch_browser(&spec).await?);
        }
        self.browser
            .as_deref()
            .ok_or_else(|| HarnessError::Session("browser unavailable".to_string()))
    }

    /// Open a fresh context and page for one test unit, apply the configured
    /// default timeout and best-effort navigate to the base URL.
    ///
    /// Base-URL navigation failure is logged and swallowed: the test may
    /// still proceed and navigate elsewhere itself.
    pub async fn begin_test_session(&mut self) -> Result<()> {
        if self.active.is_some() {
            warn!(
                "{}: previous test session still open, closing it first",
                self.worker
            );
            self.end_test_session().await;
        }

        self.acquire_browser().await?;
        let browser = self
            .browser
            .as_deref()
            .ok_or_else(|| HarnessError::Session("browser unavailable".to_string()))?;

        let mut context = browser.new_context().await?;
        let mut page = match context.new_page().await {
            Ok(page) => page,
            Err(e) => {
                let _ = context.close().await;
                return Err(e);
            }
        };

        if let Err(e) = page.set_default_timeout(self.config.browser.timeout_ms).await {
            let _ = page.close().await;
            let _ = context.close().await;
            return Err(e);
        }

        if let Some(base_url) = self.config.environment.base_url.as_deref() {
            debug!("{}: navigating to base URL {}", self.worker, base_url);
            if let Err(e) = page.goto(base_url).await {
                warn!(
                    "{}: base URL navigation failed ({}), test may navigate itself",
                    self.worker, e
                );
            }
        }

        debug!(
            "{}: test session opened (context: {}, page: {})",
            self.worker,
            context.id(),
            page.id()
        );
        self.active = Some(ActiveSession { context, page });
        Ok(())
    }

    /// Close the page, then the context. Best effort: close failures are
    /// logged, never propagated, so every exit path of a test releases its
    /// per-test resources.
    pub async fn end_test_session(&mut self) {
        if let Some(mut active) = self.active.take() {
            if let Err(e) = active.page.close().await {
                warn!("{}: failed to close page: {}", self.worker, e);
            }
            if let Err(e) = active.context.close().await {
                warn!("{}: failed to close context: {}", self.worker, e);
            }
            debug!("{}: test session closed", self.worker);
        }
    }

    /// Page of the currently-running test unit, if any.
    pub fn page(&self) -> Option<&dyn PageHandle> {
        self.active.as_ref().map(|a| a.page.as_ref())
    }

    /// Context of the currently-running test unit, if any.
    pub fn context(&self) -> Option<&dyn ContextHandle> {
        self.active.as_ref().map(|a| a.context.as_ref())
    }

    /// True once this worker's engine has been started.
    pub fn engine_started(&self) -> bool {
        self.engine.is_some()
    }

    /// Close browser then engine. Called once per worker at the end of the
    /// run; also sweeps up a stale test session left by a misbehaving caller.
    pub async fn shutdown(&mut self) {
        if self.active.is_some() {
            warn!("{}: shutting down with an open test session", self.worker);
            self.end_test_session().await;
        }
        if let Some(mut browser) = self.browser.take() {
            if let Err(e) = browser.close().await {
                warn!("{}: failed to close browser: {}", self.worker, e);
            }
        }
        if let Some(mut engine) = self.engine.take() {
            if let Err(e) = engine.stop().await {
                warn!("{}: failed to stop engine: {}", self.worker, e);
            }
        }
        info!("{}: shut down", self.worker);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeDriver;
    use gauntlet_core::{BrowserKind, RunConfiguration};

    fn config(toml: &str) -> Arc<RunConfiguration> {
        Arc::new(RunConfiguration::from_toml(toml).unwrap())
    }

    fn pool_with(driver: &FakeDriver, toml: &str) -> SessionPool {
        SessionPool::new(Arc::new(driver.clone()), config(toml))
    }

    const QA: &str = r#"
        [environment]
        name = "qa"
        baseUrl = "https://qa.example.com"

        [browser]
        type = "firefox"
        headless = true
        timeout = 5000
    "#;

    #[tokio::test]
    async fn test_begin_end_leaves_zero_live_handles() {
        let driver = FakeDriver::new();
        let pool = pool_with(&driver, QA);
        let mut session = pool.worker_session(WorkerId(0));

        session.begin_test_session().await.unwrap();
        let state = driver.state();
        assert_eq!(state.live_contexts, 1);
        assert_eq!(state.live_pages, 1);

        session.end_test_session().await;
        let state = driver.state();
        assert_eq!(state.live_contexts, 0);
        assert_eq!(state.live_pages, 0);
        assert!(session.page().is_none());
        assert!(session.context().is_none());
    }

    #[tokio::test]
    async fn test_engine_and_browser_amortized_across_tests() {
        let driver = FakeDriver::new();
        let pool = pool_with(&driver, QA);
        let mut session = pool.worker_session(WorkerId(0));

        for _ in 0..3 {
            session.begin_test_session().await.unwrap();
            session.end_test_session().await;
        }

        let state = driver.state();
        assert_eq!(state.engines_started, 1);
        assert_eq!(state.browsers_launched.len(), 1);
        assert_eq!(state.contexts_created, 3);
        assert_eq!(state.pages_created, 3);
    }

    #[tokio::test]
    async fn test_launch_spec_follows_configuration() {
        let driver = FakeDriver::new();
        let pool = pool_with(&driver, QA);
        let mut session = pool.worker_session(WorkerId(0));

        session.begin_test_session().await.unwrap();
        let state = driver.state();
        assert_eq!(state.browsers_launched[0].kind, BrowserKind::Firefox);
        assert!(state.browsers_launched[0].headless);
        assert_eq!(state.timeouts_applied, vec![5000]);
        assert_eq!(state.navigations, vec!["https://qa.example.com"]);
        session.end_test_session().await;
    }

    #[tokio::test]
    async fn test_base_url_navigation_failure_is_swallowed() {
        let driver = FakeDriver::new();
        driver.fail_navigation(true);
        let pool = pool_with(&driver, QA);
        let mut session = pool.worker_session(WorkerId(0));

        session.begin_test_session().await.unwrap();
        assert!(session.page().is_some());
        session.end_test_session().await;
    }

    #[tokio::test]
    async fn test_no_base_url_skips_navigation() {
        let driver = FakeDriver::new();
        let pool = pool_with(&driver, "[environment]\nname = \"qa\"");
        let mut session = pool.worker_session(WorkerId(0));

        session.begin_test_session().await.unwrap();
        assert!(driver.state().navigations.is_empty());
        session.end_test_session().await;
    }

    #[tokio::test]
    async fn test_engine_start_failure_surfaces() {
        let driver = FakeDriver::new();
        driver.fail_engine_start(true);
        let pool = pool_with(&driver, QA);
        let mut session = pool.worker_session(WorkerId(0));

        let err = session.begin_test_session().await.unwrap_err();
        assert!(matches!(err, HarnessError::EngineStart(_)));
        assert!(!session.engine_started());
    }

    #[tokio::test]
    async fn test_workers_never_share_pages_or_contexts() {
        let driver = FakeDriver::new();
        let pool = pool_with(&driver, QA);
        let mut first = pool.worker_session(WorkerId(0));
        let mut second = pool.worker_session(WorkerId(1));

        first.begin_test_session().await.unwrap();
        second.begin_test_session().await.unwrap();

        let first_page = first.page().unwrap().id().to_string();
        let second_page = second.page().unwrap().id().to_string();
        assert_ne!(first_page, second_page);
        assert_ne!(
            first.context().unwrap().id(),
            second.context().unwrap().id()
        );
        // Two workers, two engines, two browsers.
        assert_eq!(driver.state().engines_started, 2);
        assert_eq!(driver.state().browsers_launched.len(), 2);

        first.end_test_session().await;
        second.end_test_session().await;
    }

    #[tokio::test]
    async fn test_shutdown_closes_browser_and_engine() {
        let driver = FakeDriver::new();
        let pool = pool_with(&driver, QA);
        let mut session = pool.worker_session(WorkerId(0));

        session.begin_test_session().await.unwrap();
        // Shutdown with an open session sweeps it up too.
        session.shutdown().await;

        let state = driver.state();
        assert_eq!(state.live_pages, 0);
        assert_eq!(state.live_contexts, 0);
        assert_eq!(state.browsers_closed, 1);
        assert_eq!(state.engines_stopped, 1);
    }

    #[tokio::test]
    async fn test_begin_twice_closes_stale_session() {
        let driver = FakeDriver::new();
        let pool = pool_with(&driver, QA);
        let mut session = pool.worker_session(WorkerId(0));

        session.begin_test_session().await.unwrap();
        session.begin_test_session().await.unwrap();

        let state = driver.state();
        assert_eq!(state.contexts_created, 2);
        assert_eq!(state.live_contexts, 1);
        assert_eq!(state.live_pages, 1);
        session.end_test_session().await;
    }
}
