//! Chromium-based engine using chromiumoxide.

use super::{CapturePage, Engine, EngineLauncher, ObservedResponse, ResourceKind, ResponseStream};
use crate::capture::intercept::{InterceptionPolicy, Verdict};
use crate::error::NavigationError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine as _;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::fetch::{
    self, ContinueRequestParams, EventRequestPaused, FailRequestParams, RequestPattern,
    RequestStage,
};
use chromiumoxide::cdp::browser_protocol::network::{
    ErrorReason, EventLoadingFailed, EventLoadingFinished, EventResponseReceived,
    GetResponseBodyParams, RequestId, ResourceType,
};
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::collections::HashMap;
use std::hash::Hash;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Flags for headless operation on small, unprivileged hosts.
pub const CHROMIUM_FLAGS: &[&str] = &[
    "--headless=new",
    "--no-sandbox",
    "--disable-setuid-sandbox",
    "--disable-dev-shm-usage",
    "--disable-gpu",
    "--single-process",
    "--disable-extensions",
    "--disable-background-networking",
];

/// Find the Chromium binary path.
///
/// A configured path (argument or `TRACE_CHROMIUM_PATH`) is authoritative:
/// if it does not exist the result is `None`, with no fallback to discovery.
pub fn find_chromium(explicit: Option<&Path>) -> Option<PathBuf> {
    // 1. Explicit path from config / CLI, then TRACE_CHROMIUM_PATH env
    let configured = explicit
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os("TRACE_CHROMIUM_PATH").map(PathBuf::from));
    if let Some(path) = configured {
        return path.exists().then_some(path);
    }

    // 2. Standard Linux install location
    let standard = PathBuf::from("/usr/bin/google-chrome");
    if standard.exists() {
        return Some(standard);
    }

    // 3. System PATH
    for name in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    None
}

/// Launches a fresh headless Chromium process per call.
pub struct ChromiumLauncher {
    executable: Option<PathBuf>,
    launch_timeout: Duration,
}

impl ChromiumLauncher {
    pub fn new(executable: Option<PathBuf>, launch_timeout: Duration) -> Self {
        Self {
            executable,
            launch_timeout,
        }
    }
}

#[async_trait]
impl EngineLauncher for ChromiumLauncher {
    async fn launch(&self) -> Result<Arc<dyn Engine>> {
        let engine =
            ChromiumEngine::launch(self.executable.as_deref(), self.launch_timeout).await?;
        Ok(Arc::new(engine))
    }
}

/// A running Chromium process.
pub struct ChromiumEngine {
    browser: RwLock<Option<Browser>>,
    handler: Mutex<Option<JoinHandle<()>>>,
    active_count: Arc<AtomicUsize>,
}

impl ChromiumEngine {
    /// Launch headless Chromium and wait until its DevTools endpoint answers.
    pub async fn launch(executable: Option<&Path>, launch_timeout: Duration) -> Result<Self> {
        let chrome_path = match executable {
            Some(path) => find_chromium(Some(path)).with_context(|| {
                format!("configured Chromium executable {} does not exist", path.display())
            })?,
            None => find_chromium(None)
                .context("Chromium not found. Set TRACE_CHROMIUM_PATH or run `trace doctor`.")?,
        };

        let mut builder = BrowserConfig::builder().chrome_executable(chrome_path);
        for flag in CHROMIUM_FLAGS {
            builder = builder.arg(*flag);
        }
        let config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = tokio::time::timeout(launch_timeout, Browser::launch(config))
            .await
            .with_context(|| format!("Chromium did not become responsive within {launch_timeout:?}"))?
            .context("failed to launch Chromium")?;

        // The handler drives the CDP connection; it must be polled for the
        // browser to make progress.
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    trace!("chromium handler: {e}");
                }
            }
        });

        Ok(Self {
            browser: RwLock::new(Some(browser)),
            handler: Mutex::new(Some(handler)),
            active_count: Arc::new(AtomicUsize::new(0)),
        })
    }
}

#[async_trait]
impl Engine for ChromiumEngine {
    async fn open_page(&self) -> Result<Box<dyn CapturePage>> {
        let guard = self.browser.read().await;
        let browser = guard.as_ref().context("browser has been shut down")?;
        let page = browser
            .new_page("about:blank")
            .await
            .context("failed to create new page")?;
        drop(guard);

        self.active_count.fetch_add(1, Ordering::Relaxed);

        Ok(Box::new(ChromiumPage {
            page,
            interceptor: Mutex::new(None),
            active_count: Arc::clone(&self.active_count),
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        let Some(mut browser) = self.browser.write().await.take() else {
            return Ok(());
        };

        let closed = browser.close().await;
        if let Err(e) = browser.wait().await {
            debug!("failed to reap Chromium process: {e}");
        }

        if let Some(handler) = self.handler.lock().await.take() {
            handler.abort();
        }

        closed.context("failed to close Chromium")?;
        Ok(())
    }

    fn active_pages(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }
}

/// A single Chromium page.
pub struct ChromiumPage {
    page: Page,
    interceptor: Mutex<Option<JoinHandle<()>>>,
    active_count: Arc<AtomicUsize>,
}

fn resource_kind(resource_type: &ResourceType) -> ResourceKind {
    match resource_type {
        ResourceType::Document => ResourceKind::Document,
        ResourceType::Script => ResourceKind::Script,
        ResourceType::Xhr => ResourceKind::Xhr,
        ResourceType::Fetch => ResourceKind::Fetch,
        ResourceType::Stylesheet => ResourceKind::Stylesheet,
        ResourceType::Image => ResourceKind::Image,
        ResourceType::Font => ResourceKind::Font,
        ResourceType::Media => ResourceKind::Media,
        ResourceType::Ping => ResourceKind::Ping,
        ResourceType::Prefetch => ResourceKind::Prefetch,
        ResourceType::WebSocket => ResourceKind::WebSocket,
        ResourceType::EventSource => ResourceKind::EventSource,
        _ => ResourceKind::Other,
    }
}

async fn read_body(page: Page, request_id: RequestId) -> Result<String> {
    let body = page
        .execute(GetResponseBodyParams::new(request_id))
        .await
        .context("failed to read response body")?
        .result;

    if body.base64_encoded {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(body.body.as_bytes())
            .context("response body is not valid base64")?;
        String::from_utf8(bytes).context("response body is not UTF-8")
    } else {
        Ok(body.body)
    }
}

/// Responses whose headers have arrived but whose body is still loading.
///
/// A body can only be read once loading has finished, so a response is
/// handed out by [`finished`](Self::finished) and never before. A finish or
/// failure for an id that was never received is ignored.
#[derive(Debug)]
struct OutstandingResponses<K> {
    pending: HashMap<K, String>,
}

impl<K: Hash + Eq> OutstandingResponses<K> {
    fn new() -> Self {
        Self {
            pending: HashMap::new(),
        }
    }

    fn received(&mut self, id: K, url: String) {
        self.pending.insert(id, url);
    }

    /// URL of the response whose body is now readable.
    fn finished(&mut self, id: &K) -> Option<String> {
        self.pending.remove(id)
    }

    fn failed(&mut self, id: &K) {
        self.pending.remove(id);
    }

    fn len(&self) -> usize {
        self.pending.len()
    }
}

enum NetworkEvent {
    Received(Arc<EventResponseReceived>),
    Finished(Arc<EventLoadingFinished>),
    Failed(Arc<EventLoadingFailed>),
}

#[async_trait]
impl CapturePage for ChromiumPage {
    async fn intercept(&self, policy: Arc<InterceptionPolicy>) -> Result<()> {
        // Subscribe before enabling the Fetch domain so no paused request is missed.
        let mut paused = self
            .page
            .event_listener::<EventRequestPaused>()
            .await
            .context("failed to subscribe to paused requests")?;

        let page = self.page.clone();
        let task = tokio::spawn(async move {
            while let Some(event) = paused.next().await {
                let kind = resource_kind(&event.resource_type);
                let answered = match policy.classify(kind, &event.request.url) {
                    Verdict::Continue => page
                        .execute(ContinueRequestParams::new(event.request_id.clone()))
                        .await
                        .map(|_| ()),
                    Verdict::Abort(reason) => {
                        trace!(url = %event.request.url, %reason, "request aborted");
                        page.execute(FailRequestParams::new(
                            event.request_id.clone(),
                            ErrorReason::BlockedByClient,
                        ))
                        .await
                        .map(|_| ())
                    }
                };
                if let Err(e) = answered {
                    debug!(url = %event.request.url, "failed to answer paused request: {e}");
                }
            }
        });
        *self.interceptor.lock().await = Some(task);

        let enable = fetch::EnableParams::builder()
            .pattern(
                RequestPattern::builder()
                    .url_pattern("*")
                    .request_stage(RequestStage::Request)
                    .build(),
            )
            .build();
        self.page
            .execute(enable)
            .await
            .context("failed to enable request interception")?;
        Ok(())
    }

    async fn responses(&self) -> Result<ResponseStream> {
        let mut received = self
            .page
            .event_listener::<EventResponseReceived>()
            .await
            .context("failed to subscribe to responses")?;
        let mut finished = self
            .page
            .event_listener::<EventLoadingFinished>()
            .await
            .context("failed to subscribe to finished loads")?;
        let mut failed = self
            .page
            .event_listener::<EventLoadingFailed>()
            .await
            .context("failed to subscribe to failed loads")?;
        let page = self.page.clone();

        let stream = async_stream::stream! {
            let mut outstanding = OutstandingResponses::<RequestId>::new();
            loop {
                let event = tokio::select! {
                    biased;
                    Some(e) = received.next() => NetworkEvent::Received(e),
                    Some(e) = finished.next() => NetworkEvent::Finished(e),
                    Some(e) = failed.next() => NetworkEvent::Failed(e),
                    else => break,
                };
                match event {
                    NetworkEvent::Received(e) => {
                        outstanding.received(e.request_id.clone(), e.response.url.clone());
                    }
                    NetworkEvent::Finished(e) => {
                        if let Some(url) = outstanding.finished(&e.request_id) {
                            let body = read_body(page.clone(), e.request_id.clone());
                            yield ObservedResponse::new(url, body);
                        }
                    }
                    NetworkEvent::Failed(e) => {
                        outstanding.failed(&e.request_id);
                        trace!(pending = outstanding.len(), "load failed");
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }

    async fn navigate(&self, url: &str) -> Result<(), NavigationError> {
        let issued = self
            .page
            .execute(NavigateParams::new(url))
            .await
            .map_err(|e| NavigationError::Failed(e.to_string()))?;

        match issued.result.error_text {
            Some(error_text) => Err(NavigationError::Rejected(error_text)),
            None => Ok(()),
        }
    }

    async fn evaluate(&self, script: &str) -> Result<()> {
        self.page
            .evaluate(script)
            .await
            .context("JS execution failed")?;
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        if let Some(task) = self.interceptor.lock().await.take() {
            task.abort();
        }
        self.active_count.fetch_sub(1, Ordering::Relaxed);
        self.page.close().await.context("failed to close page")?;
        Ok(())
    }
}
