//! The renderer boundary: the traits the pool holds sessions behind, plus
//! the production headless-Chrome implementation.
//!
//! ## Why spawn_blocking?
//!
//! The `headless_chrome` crate drives the DevTools protocol over a blocking
//! websocket — every call parks its thread until the browser answers.
//! `tokio::task::spawn_blocking` moves that work onto the blocking thread
//! pool so renderer round-trips never stall the async workers running other
//! conversions.
//!
//! ## Why a trait seam?
//!
//! The rendering capability is an external collaborator. Putting it behind
//! [`RenderBackend`]/[`RenderSession`] lets tests substitute a mock (no
//! Chrome on CI) and lets embedders plug in a different engine while keeping
//! the pool and orchestrator untouched.

use crate::config::ConverterConfig;
use crate::error::PlatenError;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use headless_chrome::browser::tab::RequestPausedDecision;
use headless_chrome::browser::transport::{SessionId, Transport};
use headless_chrome::protocol::cdp::Emulation;
use headless_chrome::protocol::cdp::Fetch::{
    events::RequestPausedEvent, FailRequest, RequestPattern, RequestStage,
};
use headless_chrome::protocol::cdp::Network::{ErrorReason, ResourceType};
use headless_chrome::types::PrintToPdfOptions;
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::ffi::OsStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::info;

/// Factory for renderer sessions; one per renderer process.
#[async_trait]
pub trait RenderBackend: Send + Sync {
    /// Create a fresh session configured per the backend's policy.
    async fn spawn_session(&self) -> Result<Box<dyn RenderSession>, PlatenError>;

    /// Terminate the underlying renderer infrastructure. Called exactly once
    /// by pool shutdown; sessions still alive afterwards are unusable.
    async fn shutdown(&self);
}

/// One exclusively-held renderer instance.
#[async_trait]
pub trait RenderSession: Send + Sync {
    /// Load `document` and produce PDF bytes, bounded by `timeout`.
    async fn render(&self, document: &str, timeout: Duration) -> Result<Vec<u8>, PlatenError>;

    /// Cheap state wipe between uses (navigate to a blank page).
    async fn reset(&self) -> Result<(), PlatenError>;

    /// Gracefully discard the instance. Infallible by design: a close that
    /// fails leaves nothing the caller could do, and browser teardown reaps
    /// stragglers.
    async fn close(&self);
}

// ── Headless Chrome implementation ───────────────────────────────────────

/// Production [`RenderBackend`]: one headless Chrome process, one tab per
/// session.
///
/// Every tab is configured with script execution disabled and image, font,
/// and media requests aborted — a deliberate latency/fidelity tradeoff for
/// print rendering of self-contained documents.
pub struct ChromeBackend {
    browser: Mutex<Option<Browser>>,
}

impl ChromeBackend {
    /// Launch the browser process.
    pub async fn launch(config: &ConverterConfig) -> Result<Self, PlatenError> {
        let path = config.browser_path.clone();
        let browser = tokio::task::spawn_blocking(move || -> Result<Browser, PlatenError> {
            let options = LaunchOptions::default_builder()
                .headless(true)
                .sandbox(false)
                // The default idle timeout tears the browser down between
                // requests; pooled sessions must outlive quiet periods.
                .idle_browser_timeout(Duration::from_secs(86_400))
                .args(vec![
                    OsStr::new("--disable-gpu"),
                    OsStr::new("--disable-dev-shm-usage"),
                ])
                .path(path)
                .build()
                .map_err(|e| PlatenError::BrowserLaunch {
                    detail: e.to_string(),
                })?;
            Browser::new(options).map_err(|e| PlatenError::BrowserLaunch {
                detail: e.to_string(),
            })
        })
        .await
        .map_err(|e| PlatenError::Internal(format!("browser launch task panicked: {e}")))??;

        info!("headless browser launched");
        Ok(Self {
            browser: Mutex::new(Some(browser)),
        })
    }

    fn browser(&self) -> Result<Browser, PlatenError> {
        self.browser
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or(PlatenError::PoolClosed)
    }
}

#[async_trait]
impl RenderBackend for ChromeBackend {
    async fn spawn_session(&self) -> Result<Box<dyn RenderSession>, PlatenError> {
        let browser = self.browser()?;
        let tab = tokio::task::spawn_blocking(move || configure_tab(&browser))
            .await
            .map_err(|e| PlatenError::Internal(format!("session spawn task panicked: {e}")))??;
        Ok(Box::new(ChromeSession { tab }))
    }

    async fn shutdown(&self) {
        let browser = self.browser.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(browser) = browser {
            // Dropping the last handle terminates the browser process and
            // every tab with it.
            let _ = tokio::task::spawn_blocking(move || drop(browser)).await;
            info!("headless browser terminated");
        }
    }
}

fn spawn_err(e: impl std::fmt::Display) -> PlatenError {
    PlatenError::SessionSpawn {
        detail: e.to_string(),
    }
}

fn render_err(e: impl std::fmt::Display) -> PlatenError {
    PlatenError::RenderFailed {
        detail: e.to_string(),
    }
}

/// Open a tab and apply the session policy: no scripts, no heavy
/// subresources.
fn configure_tab(browser: &Browser) -> Result<Arc<Tab>, PlatenError> {
    let tab = browser.new_tab().map_err(spawn_err)?;
    tab.call_method(Emulation::SetScriptExecutionDisabled { value: true })
        .map_err(spawn_err)?;

    let patterns: Vec<RequestPattern> = [ResourceType::Image, ResourceType::Font, ResourceType::Media]
        .into_iter()
        .map(|resource| RequestPattern {
            url_pattern: None,
            resource_Type: Some(resource),
            request_stage: Some(RequestStage::Request),
        })
        .collect();
    tab.enable_fetch(Some(&patterns), None).map_err(spawn_err)?;
    tab.enable_request_interception(Arc::new(abort_subresource))
        .map_err(spawn_err)?;

    Ok(tab)
}

/// Interceptor aborting every paused request. Only image/font/media requests
/// are ever paused (see the fetch patterns above).
fn abort_subresource(
    _transport: Arc<Transport>,
    _session: SessionId,
    event: RequestPausedEvent,
) -> RequestPausedDecision {
    RequestPausedDecision::Fail(FailRequest {
        request_id: event.params.request_id,
        error_reason: ErrorReason::Aborted,
    })
}

struct ChromeSession {
    tab: Arc<Tab>,
}

#[async_trait]
impl RenderSession for ChromeSession {
    async fn render(&self, document: &str, timeout: Duration) -> Result<Vec<u8>, PlatenError> {
        let tab = Arc::clone(&self.tab);
        // A data: URL keeps the load self-contained; nothing to fetch beyond
        // the document itself.
        let url = format!("data:text/html;base64,{}", BASE64.encode(document));

        tokio::task::spawn_blocking(move || -> Result<Vec<u8>, PlatenError> {
            tab.set_default_timeout(timeout);
            tab.navigate_to(&url).map_err(render_err)?;
            // Structural parse completion is enough: scripts are disabled and
            // blocked subresources would never settle anyway.
            tab.wait_until_navigated().map_err(render_err)?;
            tab.print_to_pdf(Some(pdf_options())).map_err(render_err)
        })
        .await
        .map_err(|e| PlatenError::Internal(format!("render task panicked: {e}")))?
    }

    async fn reset(&self) -> Result<(), PlatenError> {
        let tab = Arc::clone(&self.tab);
        tokio::task::spawn_blocking(move || -> Result<(), PlatenError> {
            tab.navigate_to("about:blank").map_err(render_err)?;
            tab.wait_until_navigated().map_err(render_err)?;
            Ok(())
        })
        .await
        .map_err(|e| PlatenError::Internal(format!("reset task panicked: {e}")))?
    }

    async fn close(&self) {
        let tab = Arc::clone(&self.tab);
        let _ = tokio::task::spawn_blocking(move || tab.close_target()).await;
    }
}

/// Print settings: backgrounds on, CSS-declared page sizes honoured, no
/// printer margins.
fn pdf_options() -> PrintToPdfOptions {
    PrintToPdfOptions {
        print_background: Some(true),
        prefer_css_page_size: Some(true),
        margin_top: Some(0.0),
        margin_bottom: Some(0.0),
        margin_left: Some(0.0),
        margin_right: Some(0.0),
        ..Default::default()
    }
}
