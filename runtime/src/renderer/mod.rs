//! Browser engine abstraction for page captures.
//!
//! Defines the `EngineLauncher`, `Engine` and `CapturePage` traits that
//! abstract over the browser engine (currently Chromium via chromiumoxide).
//! The capture pipeline only talks to these traits, so lifecycle policies
//! and the race can be exercised against a scripted engine in tests.

pub mod chromium;

use anyhow::Result;
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use std::future::Future;
use std::sync::Arc;

use crate::capture::intercept::InterceptionPolicy;
use crate::error::NavigationError;

/// Resource type of an outbound request, as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Document,
    Script,
    Xhr,
    Fetch,
    Stylesheet,
    Image,
    Font,
    Media,
    Ping,
    Prefetch,
    WebSocket,
    EventSource,
    Other,
}

/// A response observed on a page whose body has not been read yet.
///
/// The body is only fetched from the engine when [`ObservedResponse::text`]
/// is awaited; dropping the response discards it unread.
pub struct ObservedResponse {
    url: String,
    body: BoxFuture<'static, Result<String>>,
}

impl ObservedResponse {
    pub fn new<F>(url: impl Into<String>, body: F) -> Self
    where
        F: Future<Output = Result<String>> + Send + 'static,
    {
        Self {
            url: url.into(),
            body: Box::pin(body),
        }
    }

    /// URL the response was served from.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Read the response body as text.
    pub async fn text(self) -> Result<String> {
        self.body.await
    }
}

impl std::fmt::Debug for ObservedResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservedResponse")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

/// Every response a page produces from the moment the stream is created.
pub type ResponseStream = BoxStream<'static, ObservedResponse>;

/// Launches browser engine processes.
#[async_trait]
pub trait EngineLauncher: Send + Sync {
    /// Launch a new engine and wait until it is responsive.
    async fn launch(&self) -> Result<Arc<dyn Engine>>;
}

/// A running browser engine that can open isolated pages.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Open a new, blank page context.
    async fn open_page(&self) -> Result<Box<dyn CapturePage>>;
    /// Terminate the engine process. Further `open_page` calls fail.
    async fn shutdown(&self) -> Result<()>;
    /// Number of currently open pages.
    fn active_pages(&self) -> usize;
}

/// A single isolated page (tab) used for exactly one capture.
#[async_trait]
pub trait CapturePage: Send + Sync {
    /// Start routing every outbound request of this page through `policy`.
    async fn intercept(&self, policy: Arc<InterceptionPolicy>) -> Result<()>;
    /// Subscribe to the responses this page receives from now on.
    async fn responses(&self) -> Result<ResponseStream>;
    /// Issue a navigation. Returns once the engine has committed to it,
    /// not when the document has finished loading.
    async fn navigate(&self, url: &str) -> Result<(), NavigationError>;
    /// Evaluate a script in the page, discarding its result.
    async fn evaluate(&self, script: &str) -> Result<()>;
    /// Close this page.
    async fn close(self: Box<Self>) -> Result<()>;
}
