//! Production driver backed by the Playwright bridge sidecar.
//!
//! One engine handle owns one bridge process; browser, context and page
//! handles carry the bridge-assigned ids and share the bridge connection.

use std::sync::Arc;

use async_trait::async_trait;
use gauntlet_core::Result;
use tracing::info;

use crate::bridge::{BridgeConfig, PlaywrightBridge};
use crate::driver::{BrowserHandle, ContextHandle, Driver, EngineHandle, LaunchSpec, PageHandle};

/// Driver that starts one Playwright bridge process per worker engine.
#[derive(Debug, Clone, Default)]
pub struct PlaywrightDriver {
    bridge_config: BridgeConfig,
}

impl PlaywrightDriver {
    pub fn new(bridge_config: BridgeConfig) -> Self {
        Self { bridge_config }
    }
}

#[async_trait]
impl Driver for PlaywrightDriver {
    async fn start_engine(&self) -> Result<Box<dyn EngineHandle>> {
        let bridge = PlaywrightBridge::start(self.bridge_config.clone()).await?;
        Ok(Box::new(PlaywrightEngine {
            bridge: Arc::new(bridge),
        }))
    }
}

struct PlaywrightEngine {
    bridge: Arc<PlaywrightBridge>,
}

#[async_trait]
impl EngineHandle for PlaywrightEngine {
    async fn launch_browser(&self, spec: &LaunchSpec) -> Result<Box<dyn BrowserHandle>> {
        info!(
            "Launching {} browser (headless: {}, slowMo: {}ms)",
            spec.kind, spec.headless, spec.slow_mo_ms
        );
        let id = self.bridge.launch_browser(spec).await?;
        Ok(Box::new(PlaywrightBrowser {
            bridge: self.bridge.clone(),
            id,
        }))
    }

    async fn stop(&mut self) -> Result<()> {
        self.bridge.stop().await
    }
}

struct PlaywrightBrowser {
    bridge: Arc<PlaywrightBridge>,
    id: String,
}

#[async_trait]
impl BrowserHandle for PlaywrightBrowser {
    async fn new_context(&self) -> Result<Box<dyn ContextHandle>> {
        let id = self.bridge.new_context(&self.id).await?;
        Ok(Box::new(PlaywrightContext {
            bridge: self.bridge.clone(),
            id,
        }))
    }

    async fn close(&mut self) -> Result<()> {
        self.bridge.close_browser(&self.id).await
    }
}

struct PlaywrightContext {
    bridge: Arc<PlaywrightBridge>,
    id: String,
}

#[async_trait]
impl ContextHandle for PlaywrightContext {
    fn id(&self) -> &str {
        &self.id
    }

    async fn new_page(&self) -> Result<Box<dyn PageHandle>> {
        let id = self.bridge.new_page(&self.id).await?;
        Ok(Box::new(PlaywrightPage {
            bridge: self.bridge.clone(),
            id,
        }))
    }

    async fn close(&mut self) -> Result<()> {
        self.bridge.close_context(&self.id).await
    }
}

struct PlaywrightPage {
    bridge: Arc<PlaywrightBridge>,
    id: String,
}

#[async_trait]
impl PageHandle for PlaywrightPage {
    fn id(&self) -> &str {
        &self.id
    }

    async fn set_default_timeout(&self, timeout_ms: u64) -> Result<()> {
        self.bridge.set_default_timeout(&self.id, timeout_ms).await
    }

    async fn goto(&self, url: &str) -> Result<()> {
        self.bridge.navigate(&self.id, url).await
    }

    async fn screenshot(&self, full_page: bool) -> Result<Vec<u8>> {
        self.bridge.screenshot(&self.id, full_page).await
    }

    async fn close(&mut self) -> Result<()> {
        self.bridge.close_page(&self.id).await
    }
}
