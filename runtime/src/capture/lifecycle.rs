//! Engine lifecycle: who owns the browser process, and for how long.

use crate::error::CaptureError;
use crate::renderer::{CapturePage, Engine, EngineLauncher};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Ownership policy for the browser engine. Chosen at deployment time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecycleMode {
    /// A fresh engine per capture, torn down with its page.
    #[default]
    Ephemeral,
    /// One engine for the process lifetime; each capture gets its own page.
    Shared,
}

impl FromStr for LifecycleMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ephemeral" | "per-request" => Ok(LifecycleMode::Ephemeral),
            "shared" | "warm" => Ok(LifecycleMode::Shared),
            other => Err(format!(
                "unknown engine mode '{other}' (expected 'ephemeral' or 'shared')"
            )),
        }
    }
}

impl fmt::Display for LifecycleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleMode::Ephemeral => f.write_str("ephemeral"),
            LifecycleMode::Shared => f.write_str("shared"),
        }
    }
}

/// A page handed out for exactly one capture.
///
/// Must be given back through [`EngineManager::release`], which consumes it.
pub struct PageLease {
    page: Box<dyn CapturePage>,
    /// Set in ephemeral mode: the engine dies with the page.
    owned_engine: Option<Arc<dyn Engine>>,
}

impl PageLease {
    pub fn page(&self) -> &dyn CapturePage {
        self.page.as_ref()
    }
}

/// Hands out isolated pages according to the configured [`LifecycleMode`].
pub struct EngineManager {
    mode: LifecycleMode,
    launcher: Arc<dyn EngineLauncher>,
    shared: RwLock<Option<Arc<dyn Engine>>>,
    leased: AtomicUsize,
}

impl EngineManager {
    pub fn new(mode: LifecycleMode, launcher: Arc<dyn EngineLauncher>) -> Self {
        Self {
            mode,
            launcher,
            shared: RwLock::new(None),
            leased: AtomicUsize::new(0),
        }
    }

    pub fn mode(&self) -> LifecycleMode {
        self.mode
    }

    /// Number of pages currently leased out.
    pub fn active_pages(&self) -> usize {
        self.leased.load(Ordering::Relaxed)
    }

    /// Launch the shared engine. A no-op in ephemeral mode.
    ///
    /// In shared mode a failure here is fatal: the process must not serve.
    pub async fn startup(&self) -> Result<(), CaptureError> {
        if self.mode == LifecycleMode::Ephemeral {
            return Ok(());
        }

        let mut shared = self.shared.write().await;
        if shared.is_some() {
            return Ok(());
        }
        let engine = self
            .launcher
            .launch()
            .await
            .map_err(|e| CaptureError::EngineLaunch(format!("{e:#}")))?;
        *shared = Some(engine);
        info!("shared browser engine started");
        Ok(())
    }

    /// Open a fresh page for one capture.
    pub async fn acquire(&self) -> Result<PageLease, CaptureError> {
        let lease = match self.mode {
            LifecycleMode::Ephemeral => self.acquire_ephemeral().await?,
            LifecycleMode::Shared => self.acquire_shared().await?,
        };
        self.leased.fetch_add(1, Ordering::Relaxed);
        Ok(lease)
    }

    async fn acquire_ephemeral(&self) -> Result<PageLease, CaptureError> {
        let engine = self
            .launcher
            .launch()
            .await
            .map_err(|e| CaptureError::EngineUnavailable(format!("{e:#}")))?;

        match engine.open_page().await {
            Ok(page) => Ok(PageLease {
                page,
                owned_engine: Some(engine),
            }),
            Err(e) => {
                if let Err(shutdown_err) = engine.shutdown().await {
                    warn!("failed to shut down engine after page error: {shutdown_err:#}");
                }
                Err(CaptureError::EngineUnavailable(format!("{e:#}")))
            }
        }
    }

    async fn acquire_shared(&self) -> Result<PageLease, CaptureError> {
        let engine = self
            .shared
            .read()
            .await
            .clone()
            .ok_or_else(|| CaptureError::EngineUnavailable("shared engine is not running".into()))?;

        let page = engine
            .open_page()
            .await
            .map_err(|e| CaptureError::EngineUnavailable(format!("{e:#}")))?;
        Ok(PageLease {
            page,
            owned_engine: None,
        })
    }

    /// Close the page, and in ephemeral mode the engine behind it.
    ///
    /// Never fails: teardown errors are logged.
    pub async fn release(&self, lease: PageLease) {
        self.leased.fetch_sub(1, Ordering::Relaxed);

        if let Err(e) = lease.page.close().await {
            warn!("failed to close page: {e:#}");
        }
        if let Some(engine) = lease.owned_engine {
            if let Err(e) = engine.shutdown().await {
                warn!("failed to shut down engine: {e:#}");
            }
        }
    }

    /// Stop the shared engine. Safe to call more than once.
    pub async fn shutdown(&self) {
        let Some(engine) = self.shared.write().await.take() else {
            return;
        };
        match engine.shutdown().await {
            Ok(()) => info!("shared browser engine stopped"),
            Err(e) => warn!("failed to stop shared engine: {e:#}"),
        }
    }
}
