//! Node.js Playwright bridge: one sidecar process per worker engine.
//!
//! The bridge script is embedded at build time and written to a temp file
//! when the engine starts. Communication is JSON-RPC over stdin/stdout, one
//! message per line; stderr is forwarded to the log.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, Mutex, RwLock};
use tracing::{debug, error, warn};

use gauntlet_core::{BrowserKind, HarnessError, Result};

use crate::driver::LaunchSpec;

/// Embedded bridge JavaScript.
fn bridge_script() -> &'static str {
    include_str!("bridge_script.js")
}

/// Bridge configuration.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Path to the Node.js executable (discovered on PATH if None).
    pub node_path: Option<PathBuf>,
    /// Timeout for bridge responses in milliseconds.
    pub response_timeout_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            node_path: None,
            response_timeout_ms: 30_000,
        }
    }
}

/// Request sent to the bridge.
#[derive(Debug, Serialize)]
struct BridgeRequest {
    id: u64,
    method: String,
    params: serde_json::Value,
}

/// Response from the bridge.
#[derive(Debug, Deserialize)]
struct BridgeResponse {
    id: u64,
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<BridgeErrorResponse>,
}

#[derive(Debug, Deserialize)]
struct BridgeErrorResponse {
    message: String,
}

type PendingRequests = HashMap<u64, oneshot::Sender<Result<serde_json::Value>>>;

static BRIDGE_INSTANCE: AtomicU64 = AtomicU64::new(0);

/// Handle to one running bridge process.
pub struct PlaywrightBridge {
    config: BridgeConfig,
    script_path: PathBuf,
    process: Mutex<Option<Child>>,
    stdin: Mutex<Option<tokio::process::ChildStdin>>,
    request_id: AtomicU64,
    pending_requests: Arc<RwLock<PendingRequests>>,
}

impl PlaywrightBridge {
    /// Spawn the bridge process and wait for its ping handshake.
    pub async fn start(config: BridgeConfig) -> Result<Self> {
        let node_path = find_node(&config)?;

        let script_path = std::env::temp_dir().join(format!(
            "gauntlet_bridge_{}_{}.js",
            std::process::id(),
            BRIDGE_INSTANCE.fetch_add(1, Ordering::SeqCst)
        ));
        tokio::fs::write(&script_path, bridge_script())
            .await
            .map_err(|e| {
                HarnessError::EngineStart(format!("Failed to write bridge script: {}", e))
            })?;

        debug!("Starting Playwright bridge at {}", script_path.display());

        let mut child = match Command::new(&node_path)
            .arg(&script_path)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                let _ = tokio::fs::remove_file(&script_path).await;
                return Err(HarnessError::EngineStart(format!(
                    "Failed to spawn node: {}",
                    e
                )));
            }
        };

        let stdin = match child.stdin.take() {
            Some(stdin) => stdin,
            None => {
                let _ = child.kill().await;
                let _ = tokio::fs::remove_file(&script_path).await;
                return Err(HarnessError::EngineStart(
                    "Failed to open bridge stdin".to_string(),
                ));
            }
        };

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let reader = BufReader::new(stderr);
                let mut lines = reader.lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    warn!("[playwright bridge] {}", line);
                }
            });
        }

        let stdout = match child.stdout.take() {
            Some(stdout) => stdout,
            None => {
                let _ = child.kill().await;
                let _ = tokio::fs::remove_file(&script_path).await;
                return Err(HarnessError::EngineStart(
                    "Failed to open bridge stdout".to_string(),
                ));
            }
        };

        let pending = Arc::new(RwLock::new(PendingRequests::new()));
        let pending_reader = pending.clone();
        tokio::spawn(async move {
            let reader = BufReader::new(stdout);
            let mut lines = reader.lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<BridgeResponse>(&line) {
                    Ok(response) => {
                        let mut pending = pending_reader.write().await;
                        if let Some(sender) = pending.remove(&response.id) {
                            let result = if let Some(err) = response.error {
                                Err(HarnessError::Bridge(err.message))
                            } else {
                                Ok(response.result.unwrap_or(serde_json::Value::Null))
                            };
                            let _ = sender.send(result);
                        }
                    }
                    Err(e) => {
                        error!("Failed to parse bridge response: {} - {}", e, line);
                    }
                }
            }
        });

        let bridge = Self {
            config,
            script_path,
            process: Mutex::new(Some(child)),
            stdin: Mutex::new(Some(stdin)),
            request_id: AtomicU64::new(1),
            pending_requests: pending,
        };

        let ready = match bridge.call("ping", serde_json::json!({})).await {
            Ok(ready) => ready,
            Err(e) => {
                let _ = bridge.stop().await;
                return Err(e);
            }
        };
        if ready.as_str() != Some("pong") {
            let _ = bridge.stop().await;
            return Err(HarnessError::EngineStart(
                "Bridge did not respond to ping".to_string(),
            ));
        }

        debug!("Playwright bridge started");
        Ok(bridge)
    }

    /// Stop the bridge process and delete its temp script. Best effort: a
    /// dead bridge is not an error.
    pub async fn stop(&self) -> Result<()> {
        let _ = self.call("shutdown", serde_json::json!({})).await;
        if let Some(mut child) = self.process.lock().await.take() {
            let _ = child.kill().await;
        }
        let _ = tokio::fs::remove_file(&self.script_path).await;
        debug!("Playwright bridge stopped");
        Ok(())
    }

    /// Call a bridge method and wait for its response.
    pub async fn call(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst);
        let request = BridgeRequest {
            id,
            method: method.to_string(),
            params,
        };
        let request_json = serde_json::to_string(&request)?;

        let (tx, rx) = oneshot::channel();
        self.pending_requests.write().await.insert(id, tx);

        let sent = async {
            let mut stdin_guard = self.stdin.lock().await;
            let stdin = stdin_guard
                .as_mut()
                .ok_or_else(|| HarnessError::Bridge("Bridge is not running".to_string()))?;
            stdin.write_all(request_json.as_bytes()).await?;
            stdin.write_all(b"\n").await?;
            stdin.flush().await?;
            Ok::<(), HarnessError>(())
        }
        .await;
        if let Err(e) = sent {
            // Nothing will ever answer an unsent request.
            self.pending_requests.write().await.remove(&id);
            return Err(e);
        }

        let timeout = tokio::time::Duration::from_millis(self.config.response_timeout_ms);
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(HarnessError::Bridge(
                "Response channel closed".to_string(),
            )),
            Err(_) => {
                self.pending_requests.write().await.remove(&id);
                Err(HarnessError::Bridge(format!(
                    "Method {} timed out after {}ms",
                    method, self.config.response_timeout_ms
                )))
            }
        }
    }

    // ========================================================================
    // Browser methods
    // ========================================================================

    /// Launch one browser of the requested kind. Returns the browser id.
    pub async fn launch_browser(&self, spec: &LaunchSpec) -> Result<String> {
        let result = self
            .call(
                "launchBrowser",
                serde_json::json!({
                    "browserType": browser_type_name(spec.kind),
                    "headless": spec.headless,
                    "slowMo": spec.slow_mo_ms,
                }),
            )
            .await
            .map_err(|e| HarnessError::BrowserLaunch(e.to_string()))?;

        expect_id(result, "browser")
    }

    /// Create an isolated context inside a browser. Returns the context id.
    pub async fn new_context(&self, browser_id: &str) -> Result<String> {
        let result = self
            .call("newContext", serde_json::json!({ "browserId": browser_id }))
            .await?;
        expect_id(result, "context")
    }

    /// Open a page inside a context. Returns the page id.
    pub async fn new_page(&self, context_id: &str) -> Result<String> {
        let result = self
            .call("newPage", serde_json::json!({ "contextId": context_id }))
            .await?;
        expect_id(result, "page")
    }

    pub async fn set_default_timeout(&self, page_id: &str, timeout_ms: u64) -> Result<()> {
        self.call(
            "setDefaultTimeout",
            serde_json::json!({ "pageId": page_id, "timeout": timeout_ms }),
        )
        .await?;
        Ok(())
    }

    pub async fn navigate(&self, page_id: &str, url: &str) -> Result<()> {
        self.call(
            "navigate",
            serde_json::json!({
                "pageId": page_id,
                "url": url,
                "waitUntil": "domcontentloaded",
            }),
        )
        .await
        .map_err(|e| HarnessError::Navigation(format!("{}: {}", url, e)))?;
        Ok(())
    }

    /// Capture a PNG screenshot. The bridge returns base64-encoded bytes.
    pub async fn screenshot(&self, page_id: &str, full_page: bool) -> Result<Vec<u8>> {
        let result = self
            .call(
                "screenshot",
                serde_json::json!({ "pageId": page_id, "fullPage": full_page }),
            )
            .await
            .map_err(|e| HarnessError::Screenshot(e.to_string()))?;

        let encoded = result.as_str().ok_or_else(|| {
            HarnessError::Screenshot("Bridge returned a non-string screenshot payload".to_string())
        })?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| HarnessError::Screenshot(format!("Invalid base64 payload: {}", e)))
    }

    pub async fn close_page(&self, page_id: &str) -> Result<()> {
        self.call("closePage", serde_json::json!({ "pageId": page_id }))
            .await?;
        Ok(())
    }

    pub async fn close_context(&self, context_id: &str) -> Result<()> {
        self.call("closeContext", serde_json::json!({ "contextId": context_id }))
            .await?;
        Ok(())
    }

    pub async fn close_browser(&self, browser_id: &str) -> Result<()> {
        self.call("closeBrowser", serde_json::json!({ "browserId": browser_id }))
            .await?;
        Ok(())
    }
}

fn browser_type_name(kind: BrowserKind) -> &'static str {
    match kind {
        BrowserKind::Chromium => "chromium",
        BrowserKind::Firefox => "firefox",
        BrowserKind::Webkit => "webkit",
    }
}

fn expect_id(result: serde_json::Value, what: &str) -> Result<String> {
    result
        .as_str()
        .map(|s| s.to_string())
        .ok_or_else(|| HarnessError::Bridge(format!("Invalid {} id response", what)))
}

/// Find the Node.js executable.
fn find_node(config: &BridgeConfig) -> Result<PathBuf> {
    if let Some(ref path) = config.node_path {
        return Ok(path.clone());
    }

    which::which("node").map_err(|_| {
        HarnessError::EngineStart(
            "Node.js not found on PATH; the Playwright driver requires Node >= 18".to_string(),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_browser_type_names_match_playwright() {
        assert_eq!(browser_type_name(BrowserKind::Chromium), "chromium");
        assert_eq!(browser_type_name(BrowserKind::Firefox), "firefox");
        assert_eq!(browser_type_name(BrowserKind::Webkit), "webkit");
    }

    #[test]
    fn test_request_serialization() {
        let request = BridgeRequest {
            id: 7,
            method: "launchBrowser".to_string(),
            params: serde_json::json!({ "headless": true }),
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"id\":7"));
        assert!(json.contains("\"method\":\"launchBrowser\""));
    }

    #[test]
    fn test_response_with_error_parses() {
        let response: BridgeResponse =
            serde_json::from_str(r#"{"id":3,"error":{"message":"unknown page: page_9"}}"#)
                .unwrap();
        assert_eq!(response.id, 3);
        assert!(response.result.is_none());
        assert_eq!(response.error.unwrap().message, "unknown page: page_9");
    }

    #[test]
    fn test_expect_id_rejects_non_string() {
        let err = expect_id(serde_json::json!(42), "browser").unwrap_err();
        assert!(matches!(err, HarnessError::Bridge(_)));
    }

    fn dead_bridge(script_path: PathBuf) -> PlaywrightBridge {
        PlaywrightBridge {
            config: BridgeConfig::default(),
            script_path,
            process: Mutex::new(None),
            stdin: Mutex::new(None),
            request_id: AtomicU64::new(1),
            pending_requests: Arc::new(RwLock::new(PendingRequests::new())),
        }
    }

    #[tokio::test]
    async fn test_failed_send_leaves_no_pending_entry() {
        let bridge = dead_bridge(PathBuf::from("/nonexistent/bridge.js"));

        let err = bridge.call("ping", serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, HarnessError::Bridge(_)));
        assert!(bridge.pending_requests.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_stop_removes_bridge_script() {
        let dir = tempfile::tempdir().unwrap();
        let script_path = dir.path().join("bridge.js");
        tokio::fs::write(&script_path, bridge_script()).await.unwrap();

        let bridge = dead_bridge(script_path.clone());
        bridge.stop().await.unwrap();

        assert!(!script_path.exists());
    }
}
