//! Rendered-page fetch through a shared headless Chromium.
//!
//! One browser process serves every request. Pages are leased per attempt
//! and closed when the lease drops, including when a timeout cancels the
//! attempt mid-navigation.

use crate::adapters::retry::RetryPolicy;
use crate::config::{BrowserSettings, TransportConfig};
use crate::domain::model::{FetchRequest, RawResponse};
use crate::domain::ports::Transport;
use crate::utils::error::{AppError, Result, TransportError, TransportErrorKind};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{EnableParams, SetBlockedUrLsParams};
use chromiumoxide::Page;
use futures::StreamExt;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Reads what the page was served as, not what it looks like.
const DOCUMENT_SNAPSHOT_SCRIPT: &str = r#"(() => {
    const nav = performance.getEntriesByType('navigation')[0];
    return {
        status: (nav && nav.responseStatus) || 200,
        contentType: document.contentType || null,
        body: document.body ? document.body.innerText : document.documentElement.outerHTML
    };
})()"#;

#[derive(Debug, Deserialize)]
struct DocumentSnapshot {
    status: u16,
    #[serde(rename = "contentType")]
    content_type: Option<String>,
    body: String,
}

impl From<DocumentSnapshot> for RawResponse {
    fn from(snapshot: DocumentSnapshot) -> Self {
        RawResponse::new(
            snapshot.status,
            snapshot.content_type,
            snapshot.body.into_bytes(),
        )
    }
}

struct LaunchedBrowser {
    browser: Browser,
    handler: JoinHandle<()>,
}

/// Lazily launched browser shared by all rendered fetches.
pub struct BrowserPool {
    settings: BrowserSettings,
    launch_timeout: Duration,
    inner: Mutex<Option<LaunchedBrowser>>,
}

impl std::fmt::Debug for BrowserPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowserPool")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl BrowserPool {
    pub fn new(settings: BrowserSettings, launch_timeout: Duration) -> Self {
        Self {
            settings,
            launch_timeout,
            inner: Mutex::new(None),
        }
    }

    pub async fn is_running(&self) -> bool {
        self.inner
            .lock()
            .await
            .as_ref()
            .is_some_and(|launched| !launched.handler.is_finished())
    }

    fn browser_config(&self) -> std::result::Result<BrowserConfig, String> {
        let mut builder = BrowserConfig::builder().request_timeout(self.launch_timeout);
        if let Some(executable) = &self.settings.executable {
            builder = builder.chrome_executable(executable);
        }
        if self.settings.no_sandbox {
            builder = builder.no_sandbox();
        }
        builder.arg("--disable-gpu").build()
    }

    async fn launch(&self) -> std::result::Result<LaunchedBrowser, TransportErrorKind> {
        tracing::info!("Launching headless browser");
        let config = self.browser_config().map_err(TransportErrorKind::Render)?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| TransportErrorKind::Render(format!("browser launch failed: {}", e)))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::warn!("Browser handler stopped: {}", e);
                    break;
                }
            }
        });

        tracing::info!("Browser launched");
        Ok(LaunchedBrowser { browser, handler })
    }

    /// Opens a blank page with sub-resource blocking applied, launching
    /// (or relaunching) the browser when needed.
    pub async fn acquire_page(&self) -> std::result::Result<PageLease, TransportErrorKind> {
        let mut guard = self.inner.lock().await;

        if guard
            .as_ref()
            .is_some_and(|launched| launched.handler.is_finished())
        {
            tracing::warn!("Browser connection lost; relaunching");
            *guard = None;
        }
        if guard.is_none() {
            *guard = Some(self.launch().await?);
        }

        let launched = guard
            .as_ref()
            .ok_or_else(|| TransportErrorKind::Render("browser unavailable".to_string()))?;
        let page = launched
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| TransportErrorKind::Render(format!("failed to open page: {}", e)))?;
        drop(guard);

        let lease = PageLease { page: Some(page) };
        lease.block_sub_resources(&self.settings.blocked_url_patterns).await?;
        Ok(lease)
    }

    /// Closes the browser; later fetches launch a new one.
    pub async fn shutdown(&self) {
        let Some(mut launched) = self.inner.lock().await.take() else {
            return;
        };

        if let Err(e) = launched.browser.close().await {
            tracing::warn!("Browser did not close cleanly: {}", e);
        }
        let _ = launched.browser.wait().await;
        launched.handler.abort();
        tracing::info!("Browser shut down");
    }
}

/// A page that is closed when dropped.
pub struct PageLease {
    page: Option<Page>,
}

impl PageLease {
    fn page(&self) -> std::result::Result<&Page, TransportErrorKind> {
        self.page
            .as_ref()
            .ok_or_else(|| TransportErrorKind::Render("page already closed".to_string()))
    }

    async fn block_sub_resources(
        &self,
        patterns: &[String],
    ) -> std::result::Result<(), TransportErrorKind> {
        if patterns.is_empty() {
            return Ok(());
        }
        let page = self.page()?;
        page.execute(EnableParams::default())
            .await
            .map_err(|e| TransportErrorKind::Render(e.to_string()))?;
        page.execute(SetBlockedUrLsParams::new(patterns.to_vec()))
            .await
            .map_err(|e| TransportErrorKind::Render(e.to_string()))?;
        Ok(())
    }

    pub async fn render(&self, url: &str) -> std::result::Result<RawResponse, TransportErrorKind> {
        let page = self.page()?;
        page.goto(url)
            .await
            .map_err(|e| TransportErrorKind::Render(format!("navigation failed: {}", e)))?;

        let snapshot: DocumentSnapshot = page
            .evaluate(DOCUMENT_SNAPSHOT_SCRIPT)
            .await
            .map_err(|e| TransportErrorKind::Render(format!("snapshot failed: {}", e)))?
            .into_value()
            .map_err(|e| TransportErrorKind::Body(format!("unexpected snapshot: {}", e)))?;

        Ok(snapshot.into())
    }
}

impl Drop for PageLease {
    fn drop(&mut self) {
        let Some(page) = self.page.take() else {
            return;
        };
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                if let Err(e) = page.close().await {
                    tracing::debug!("Failed to close page: {}", e);
                }
            });
        }
    }
}

/// Loads each URL in a real page and returns the rendered text.
#[derive(Debug, Clone)]
pub struct RenderedPageTransport {
    pool: Arc<BrowserPool>,
    retry: RetryPolicy,
}

impl RenderedPageTransport {
    pub fn new(pool: Arc<BrowserPool>, config: &TransportConfig) -> Result<Self> {
        if config.browser.executable.as_deref().is_some_and(str::is_empty) {
            return Err(AppError::InvalidConfigValueError {
                field: "transport.browser.executable".to_string(),
                value: String::new(),
                reason: "must be omitted or point to a Chromium binary".to_string(),
            });
        }
        Ok(Self {
            pool,
            retry: RetryPolicy::from_config(config),
        })
    }

    async fn attempt(&self, url: &str) -> std::result::Result<RawResponse, TransportErrorKind> {
        let lease = self.pool.acquire_page().await?;
        tracing::debug!("Rendering {}", url);
        lease.render(url).await
    }
}

#[async_trait]
impl Transport for RenderedPageTransport {
    async fn fetch(
        &self,
        request: &FetchRequest,
    ) -> std::result::Result<RawResponse, TransportError> {
        let url = request.url.as_str();
        self.retry
            .execute(url, request.deadline, |_| self.attempt(url))
            .await
    }

    fn name(&self) -> &'static str {
        "browser"
    }
}
