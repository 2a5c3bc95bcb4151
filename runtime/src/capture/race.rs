//! Navigation and deadline race for a single capture.
//!
//! ```text
//! INIT → NAVIGATING → RACING → { MATCHED | TIMED_OUT } → DONE
//! ```
//!
//! Navigation, the deferred scroll and response observation interleave on
//! the calling task. The deadline is the only thing that cancels a capture.

use super::matcher::ResponseMatcher;
use super::Capture;
use crate::error::NavigationError;
use crate::renderer::CapturePage;
use std::time::{Duration, Instant};
use tracing::debug;
use url::Url;

/// Timing knobs for the race.
#[derive(Debug, Clone)]
pub struct RaceSettings {
    /// Hard limit for the whole race.
    pub deadline: Duration,
    /// Limit for issuing the navigation itself.
    pub navigation_timeout: Duration,
    /// Vertical scroll in pixels, to wake lazily initialised scripts.
    pub scroll_offset: i64,
    /// Pause between issuing navigation and scrolling.
    pub scroll_delay: Duration,
}

impl Default for RaceSettings {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(30),
            navigation_timeout: Duration::from_secs(20),
            scroll_offset: 800,
            scroll_delay: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Navigating,
    Racing,
    Matched,
    TimedOut,
}

/// How the race ended.
#[derive(Debug, Clone)]
pub enum RaceResult {
    Matched {
        capture: Capture,
        /// Navigation error recorded before the match, if any.
        navigation: Option<NavigationError>,
    },
    TimedOut {
        navigation: Option<NavigationError>,
    },
}

/// A finished race tagged with its wall-clock duration.
#[derive(Debug, Clone)]
pub struct RaceOutcome {
    pub result: RaceResult,
    pub elapsed: Duration,
}

/// Drives one page through navigation and interaction while waiting for
/// the matcher.
#[derive(Debug, Clone, Default)]
pub struct RaceCoordinator {
    settings: RaceSettings,
}

impl RaceCoordinator {
    pub fn new(settings: RaceSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &RaceSettings {
        &self.settings
    }

    /// Run the race. `matcher` must already be armed on `page`.
    pub async fn run(
        &self,
        page: &dyn CapturePage,
        target: &Url,
        deadline: Duration,
        matcher: ResponseMatcher,
    ) -> RaceOutcome {
        let started = Instant::now();
        let mut phase = Phase::Navigating;
        debug!(?phase, %target, "race started");

        let matched = async move {
            match matcher.first_match().await {
                Some(capture) => capture,
                // The page went quiet for good; only the deadline can end this.
                None => std::future::pending().await,
            }
        };
        let navigate = self.navigate(page, target);
        let scroll = self.scroll(page);
        let timer = tokio::time::sleep(deadline);
        tokio::pin!(matched, navigate, scroll, timer);

        let mut navigation = None;
        let mut navigated = false;
        let mut scrolled = false;
        let result = loop {
            tokio::select! {
                biased;
                capture = &mut matched => {
                    phase = Phase::Matched;
                    break RaceResult::Matched { capture, navigation };
                }
                nav = &mut navigate, if !navigated => {
                    navigated = true;
                    navigation = nav;
                    phase = Phase::Racing;
                    debug!(?phase, elapsed = ?started.elapsed(), "navigation issued");
                }
                // Not polled, and so not started, until navigation is over.
                () = &mut scroll, if navigated && !scrolled => {
                    scrolled = true;
                }
                () = &mut timer => {
                    phase = Phase::TimedOut;
                    break RaceResult::TimedOut { navigation };
                }
            }
        };

        let elapsed = started.elapsed();
        debug!(?phase, ?elapsed, "race done");
        RaceOutcome { result, elapsed }
    }

    /// Issue the navigation. Errors are logged and handed back, never
    /// propagated: the target call may still fire from a partially loaded page.
    async fn navigate(&self, page: &dyn CapturePage, target: &Url) -> Option<NavigationError> {
        let timeout = self.settings.navigation_timeout;
        let navigation = match tokio::time::timeout(timeout, page.navigate(target.as_str())).await {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(err),
            Err(_) => Some(NavigationError::TimedOut(timeout)),
        };
        if let Some(err) = &navigation {
            debug!(error = %err, "navigation error ignored");
        }
        navigation
    }

    /// Scroll after a short pause to wake lazily initialised scripts.
    async fn scroll(&self, page: &dyn CapturePage) {
        tokio::time::sleep(self.settings.scroll_delay).await;
        let script = format!("window.scrollBy(0, {})", self.settings.scroll_offset);
        if let Err(err) = page.evaluate(&script).await {
            debug!("scroll trigger failed: {err:#}");
        }
    }
}
