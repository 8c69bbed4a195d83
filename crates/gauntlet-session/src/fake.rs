//! In-memory driver used by the test suites.
//!
//! Implements the full handle hierarchy without a browser: every create/close
//! updates shared counters so tests can assert on live handles, launch specs
//! and navigation history. Failure injection covers engine start, navigation
//! and screenshot capture.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use gauntlet_core::{HarnessError, Result};

use crate::driver::{BrowserHandle, ContextHandle, Driver, EngineHandle, LaunchSpec, PageHandle};

/// Bytes every fake screenshot returns.
pub const FAKE_PNG: &[u8] = b"\x89PNG-fake";

/// Observable state shared by all handles of one [`FakeDriver`].
#[derive(Debug, Default, Clone)]
pub struct FakeState {
    pub engines_started: usize,
    pub engines_stopped: usize,
    pub browsers_launched: Vec<LaunchSpec>,
    pub browsers_closed: usize,
    pub contexts_created: usize,
    pub pages_created: usize,
    pub live_contexts: usize,
    pub live_pages: usize,
    pub timeouts_applied: Vec<u64>,
    pub navigations: Vec<String>,
    pub screenshots_taken: usize,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<FakeState>,
    next_id: AtomicUsize,
    fail_engine_start: AtomicBool,
    engine_start_limit: AtomicUsize,
    fail_navigation: AtomicBool,
    fail_screenshot: AtomicBool,
}

impl Default for Shared {
    fn default() -> Self {
        Self {
            state: Mutex::default(),
            next_id: AtomicUsize::new(0),
            fail_engine_start: AtomicBool::new(false),
            engine_start_limit: AtomicUsize::new(usize::MAX),
            fail_navigation: AtomicBool::new(false),
            fail_screenshot: AtomicBool::new(false),
        }
    }
}

impl Shared {
    fn next_id(&self) -> usize {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }
}

/// Driver whose handles live entirely in memory.
#[derive(Debug, Default, Clone)]
pub struct FakeDriver {
    shared: Arc<Shared>,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the current counters.
    pub fn state(&self) -> FakeState {
        self.shared.state.lock().expect("fake state poisoned").clone()
    }

    /// Make every subsequent `start_engine` fail.
    pub fn fail_engine_start(&self, fail: bool) {
        self.shared.fail_engine_start.store(fail, Ordering::SeqCst);
    }

    /// Allow `successes` engine starts, then make every later one fail.
    pub fn fail_engine_start_after(&self, successes: usize) {
        self.shared
            .engine_start_limit
            .store(successes, Ordering::SeqCst);
    }

    /// Make every subsequent `goto` fail.
    pub fn fail_navigation(&self, fail: bool) {
        self.shared.fail_navigation.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent `screenshot` fail.
    pub fn fail_screenshot(&self, fail: bool) {
        self.shared.fail_screenshot.store(fail, Ordering::SeqCst);
    }

    fn mutate(&self, f: impl FnOnce(&mut FakeState)) {
        f(&mut self.shared.state.lock().expect("fake state poisoned"));
    }
}

#[async_trait]
impl Driver for FakeDriver {
    async fn start_engine(&self) -> Result<Box<dyn EngineHandle>> {
        let mut state = self.shared.state.lock().expect("fake state poisoned");
        let limit = self.shared.engine_start_limit.load(Ordering::SeqCst);
        if self.shared.fail_engine_start.load(Ordering::SeqCst) || state.engines_started >= limit {
            return Err(HarnessError::EngineStart(
                "fake engine configured to fail".to_string(),
            ));
        }
        state.engines_started += 1;
        drop(state);
        Ok(Box::new(FakeEngine {
            driver: self.clone(),
        }))
    }
}

struct FakeEngine {
    driver: FakeDriver,
}

#[async_trait]
impl EngineHandle for FakeEngine {
    async fn launch_browser(&self, spec: &LaunchSpec) -> Result<Box<dyn BrowserHandle>> {
        self.driver.mutate(|s| s.browsers_launched.push(spec.clone()));
        Ok(Box::new(FakeBrowser {
            driver: self.driver.clone(),
        }))
    }

    async fn stop(&mut self) -> Result<()> {
        self.driver.mutate(|s| s.engines_stopped += 1);
        Ok(())
    }
}

struct FakeBrowser {
    driver: FakeDriver,
}

#[async_trait]
impl BrowserHandle for FakeBrowser {
    async fn new_context(&self) -> Result<Box<dyn ContextHandle>> {
        let id = format!("context_{}", self.driver.shared.next_id());
        self.driver.mutate(|s| {
            s.contexts_created += 1;
            s.live_contexts += 1;
        });
        Ok(Box::new(FakeContext {
            driver: self.driver.clone(),
            id,
        }))
    }

    async fn close(&mut self) -> Result<()> {
        self.driver.mutate(|s| s.browsers_closed += 1);
        Ok(())
    }
}

struct FakeContext {
    driver: FakeDriver,
    id: String,
}

#[async_trait]
impl ContextHandle for FakeContext {
    fn id(&self) -> &str {
        &self.id
    }

    async fn new_page(&self) -> Result<Box<dyn PageHandle>> {
        let id = format!("page_{}", self.driver.shared.next_id());
        self.driver.mutate(|s| {
            s.pages_created += 1;
            s.live_pages += 1;
        });
        Ok(Box::new(FakePage {
            driver: self.driver.clone(),
            id,
        }))
    }

    async fn close(&mut self) -> Result<()> {
        self.driver.mutate(|s| s.live_contexts -= 1);
        Ok(())
    }
}

struct FakePage {
    driver: FakeDriver,
    id: String,
}

#[async_trait]
impl PageHandle for FakePage {
    fn id(&self) -> &str {
        &self.id
    }

    async fn set_default_timeout(&self, timeout_ms: u64) -> Result<()> {
        self.driver.mutate(|s| s.timeouts_applied.push(timeout_ms));
        Ok(())
    }

    async fn goto(&self, url: &str) -> Result<()> {
        if self.driver.shared.fail_navigation.load(Ordering::SeqCst) {
            return Err(HarnessError::Navigation(format!(
                "fake navigation to {} configured to fail",
                url
            )));
        }
        self.driver.mutate(|s| s.navigations.push(url.to_string()));
        Ok(())
    }

    async fn screenshot(&self, _full_page: bool) -> Result<Vec<u8>> {
        if self.driver.shared.fail_screenshot.load(Ordering::SeqCst) {
            return Err(HarnessError::Screenshot(
                "fake screenshot configured to fail".to_string(),
            ));
        }
        self.driver.mutate(|s| s.screenshots_taken += 1);
        Ok(FAKE_PNG.to_vec())
    }

    async fn close(&mut self) -> Result<()> {
        self.driver.mutate(|s| s.live_pages -= 1);
        Ok(())
    }
}
