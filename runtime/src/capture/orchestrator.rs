//! Per-call capture driver.

use super::intercept::InterceptionPolicy;
use super::lifecycle::{EngineManager, PageLease};
use super::matcher::ResponseMatcher;
use super::race::{RaceCoordinator, RaceResult};
use super::{CaptureOutcome, CaptureReport, CaptureRequest, Signature};
use crate::config::RuntimeConfig;
use crate::error::CaptureError;
use crate::renderer::EngineLauncher;
use anyhow::Context;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, info_span, warn, Instrument};
use url::Url;

/// Runs captures end to end. Cheap to share between concurrent calls.
pub struct CaptureService {
    engines: Arc<EngineManager>,
    policy: Arc<InterceptionPolicy>,
    coordinator: RaceCoordinator,
    signature: Signature,
}

impl CaptureService {
    pub fn new(
        engines: Arc<EngineManager>,
        policy: Arc<InterceptionPolicy>,
        coordinator: RaceCoordinator,
        signature: Signature,
    ) -> Self {
        Self {
            engines,
            policy,
            coordinator,
            signature,
        }
    }

    /// Wire a service from configuration around the given engine launcher.
    pub fn from_config(
        config: &RuntimeConfig,
        launcher: Arc<dyn EngineLauncher>,
    ) -> anyhow::Result<Self> {
        let signature = Signature::parse(&config.signature)
            .with_context(|| format!("invalid signature '{}'", config.signature))?;
        Ok(Self::new(
            Arc::new(EngineManager::new(config.mode, launcher)),
            Arc::new(InterceptionPolicy::with_extra_hosts(&config.extra_block_hosts)),
            RaceCoordinator::new(config.race.clone()),
            signature,
        ))
    }

    pub fn engines(&self) -> &Arc<EngineManager> {
        &self.engines
    }

    pub fn deadline(&self) -> Duration {
        self.coordinator.settings().deadline
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Validate the target and build the request for this call.
    pub fn request_for(&self, target: Option<&str>) -> Result<CaptureRequest, CaptureError> {
        let raw = target
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(CaptureError::MissingInput)?;
        let target = Url::parse(raw).map_err(|e| CaptureError::InvalidUrl(format!("{raw}: {e}")))?;
        Ok(CaptureRequest {
            target,
            deadline: self.deadline(),
            signature: self.signature.clone(),
        })
    }

    /// Capture the signature response of `target`.
    ///
    /// Always produces exactly one report, and always releases the page it
    /// acquired.
    pub async fn handle(&self, target: Option<&str>) -> CaptureReport {
        let started = Instant::now();

        let request = match self.request_for(target) {
            Ok(request) => request,
            Err(err) => {
                info!(error = %err, "capture rejected");
                return CaptureReport::failed(err, started.elapsed());
            }
        };

        let id = uuid::Uuid::new_v4();
        let span = info_span!("capture", %id, url = %request.target);
        async move {
            let (outcome, elapsed) = self.run(&request, started).await;
            let report = CaptureReport { outcome, elapsed };
            match report.outcome.error() {
                None => info!(elapsed = ?report.elapsed, "capture matched"),
                Some(err) => info!(elapsed = ?report.elapsed, code = err.code(), "capture failed: {err}"),
            }
            report
        }
        .instrument(span)
        .await
    }

    /// Elapsed time is taken once the outcome is known, before teardown.
    async fn run(&self, request: &CaptureRequest, started: Instant) -> (CaptureOutcome, Duration) {
        let lease = match self.engines.acquire().await {
            Ok(lease) => lease,
            Err(err) => return (CaptureOutcome::Failed(err), started.elapsed()),
        };

        let outcome = AssertUnwindSafe(self.capture_on(&lease, request))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| {
                warn!("capture panicked");
                CaptureOutcome::Failed(CaptureError::Unexpected("capture task panicked".into()))
            });
        let elapsed = started.elapsed();

        self.engines.release(lease).await;
        (outcome, elapsed)
    }

    async fn capture_on(&self, lease: &PageLease, request: &CaptureRequest) -> CaptureOutcome {
        let page = lease.page();

        // Both hooks go in before navigation so no early request or response
        // slips past them.
        if let Err(e) = page.intercept(Arc::clone(&self.policy)).await {
            return CaptureOutcome::Failed(CaptureError::Unexpected(format!("{e:#}")));
        }
        let matcher = match ResponseMatcher::arm(page, request.signature.clone()).await {
            Ok(matcher) => matcher,
            Err(e) => return CaptureOutcome::Failed(CaptureError::Unexpected(format!("{e:#}"))),
        };

        let race = self
            .coordinator
            .run(page, &request.target, request.deadline, matcher)
            .await;

        match race.result {
            RaceResult::Matched {
                capture,
                navigation: None,
            } => CaptureOutcome::Matched(capture),
            RaceResult::Matched {
                capture,
                navigation: Some(navigation),
            } => CaptureOutcome::MatchedAfterNavigationError {
                capture,
                navigation,
            },
            RaceResult::TimedOut { .. } => CaptureOutcome::TimedOut,
        }
    }
}
