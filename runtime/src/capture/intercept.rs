//! Per-page request interception policy.
//!
//! Heavy visual resources never carry the captured call and slow the page
//! down, so they are aborted before reaching the network. Tracker hosts are
//! aborted for non-essential request kinds. Documents, scripts, XHR and fetch
//! always go through: the captured call is one of them.

use crate::renderer::ResourceKind;
use std::fmt;
use url::Url;

/// Analytics and ad-tracking hosts aborted by default (host or any subdomain).
pub const DEFAULT_TRACKER_HOSTS: &[&str] = &[
    "google-analytics.com",
    "googletagmanager.com",
    "googlesyndication.com",
    "googleadservices.com",
    "doubleclick.net",
    "adservice.google.com",
    "facebook.net",
    "connect.facebook.net",
    "amazon-adsystem.com",
    "scorecardresearch.com",
    "hotjar.com",
    "segment.io",
    "mixpanel.com",
    "newrelic.com",
    "nr-data.net",
    "criteo.com",
    "taboola.com",
    "outbrain.com",
];

impl ResourceKind {
    /// Kinds that may carry the captured call or the scripts that fire it.
    pub fn is_essential(self) -> bool {
        matches!(
            self,
            ResourceKind::Document | ResourceKind::Script | ResourceKind::Xhr | ResourceKind::Fetch
        )
    }

    /// Kinds that are always aborted.
    pub fn is_heavy(self) -> bool {
        matches!(
            self,
            ResourceKind::Image | ResourceKind::Stylesheet | ResourceKind::Font | ResourceKind::Media
        )
    }
}

/// Why a request was aborted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    HeavyResource(ResourceKind),
    Tracker(String),
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::HeavyResource(kind) => write!(f, "heavy resource ({kind:?})"),
            AbortReason::Tracker(host) => write!(f, "tracker host {host}"),
        }
    }
}

/// Decision for one outbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Continue,
    Abort(AbortReason),
}

/// Classifies outbound requests. Immutable, shared between pages by `Arc`.
#[derive(Debug, Clone)]
pub struct InterceptionPolicy {
    tracker_hosts: Vec<String>,
}

impl InterceptionPolicy {
    pub fn new(tracker_hosts: Vec<String>) -> Self {
        let tracker_hosts = tracker_hosts
            .into_iter()
            .map(|h| h.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|h| !h.is_empty())
            .collect();
        Self { tracker_hosts }
    }

    /// Default tracker list extended with `extra` hosts.
    pub fn with_extra_hosts(extra: &[String]) -> Self {
        let hosts = DEFAULT_TRACKER_HOSTS
            .iter()
            .map(|h| h.to_string())
            .chain(extra.iter().cloned())
            .collect();
        Self::new(hosts)
    }

    pub fn classify(&self, kind: ResourceKind, url: &str) -> Verdict {
        if kind.is_essential() {
            return Verdict::Continue;
        }
        if kind.is_heavy() {
            return Verdict::Abort(AbortReason::HeavyResource(kind));
        }
        match self.tracker_host(url) {
            Some(host) => Verdict::Abort(AbortReason::Tracker(host)),
            None => Verdict::Continue,
        }
    }

    fn tracker_host(&self, url: &str) -> Option<String> {
        let parsed = Url::parse(url).ok()?;
        let host = parsed.host_str()?.to_ascii_lowercase();
        let hit = self.tracker_hosts.iter().any(|pattern| {
            host == *pattern
                || host
                    .strip_suffix(pattern.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        });
        hit.then_some(host)
    }
}

impl Default for InterceptionPolicy {
    fn default() -> Self {
        Self::with_extra_hosts(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_KINDS: &[ResourceKind] = &[
        ResourceKind::Document,
        ResourceKind::Script,
        ResourceKind::Xhr,
        ResourceKind::Fetch,
        ResourceKind::Stylesheet,
        ResourceKind::Image,
        ResourceKind::Font,
        ResourceKind::Media,
        ResourceKind::Ping,
        ResourceKind::Prefetch,
        ResourceKind::WebSocket,
        ResourceKind::EventSource,
        ResourceKind::Other,
    ];

    #[test]
    fn test_essential_kinds_never_aborted() {
        let policy = InterceptionPolicy::default();
        let urls = [
            "https://example.com/app.js",
            "https://www.google-analytics.com/analytics.js",
            "https://stats.doubleclick.net/collect",
            "not a url",
        ];
        for kind in [
            ResourceKind::Document,
            ResourceKind::Script,
            ResourceKind::Xhr,
            ResourceKind::Fetch,
        ] {
            for url in urls {
                assert_eq!(policy.classify(kind, url), Verdict::Continue, "{kind:?} {url}");
            }
        }
    }

    #[test]
    fn test_heavy_kinds_always_aborted() {
        let policy = InterceptionPolicy::new(Vec::new());
        for kind in [
            ResourceKind::Image,
            ResourceKind::Stylesheet,
            ResourceKind::Font,
            ResourceKind::Media,
        ] {
            assert_eq!(
                policy.classify(kind, "https://example.com/asset"),
                Verdict::Abort(AbortReason::HeavyResource(kind))
            );
        }
    }

    #[test]
    fn test_essential_and_heavy_are_disjoint() {
        for kind in ALL_KINDS {
            assert!(!(kind.is_essential() && kind.is_heavy()), "{kind:?}");
        }
    }

    #[test]
    fn test_tracker_hosts_abort_other_kinds() {
        let policy = InterceptionPolicy::default();
        assert_eq!(
            policy.classify(ResourceKind::Ping, "https://www.google-analytics.com/g/collect"),
            Verdict::Abort(AbortReason::Tracker("www.google-analytics.com".into()))
        );
        assert_eq!(
            policy.classify(ResourceKind::Other, "https://example.com/beacon"),
            Verdict::Continue
        );
    }

    #[test]
    fn test_tracker_match_respects_label_boundary() {
        let policy = InterceptionPolicy::new(vec!["hotjar.com".into()]);
        assert!(matches!(
            policy.classify(ResourceKind::Ping, "https://script.hotjar.com/x"),
            Verdict::Abort(_)
        ));
        assert_eq!(
            policy.classify(ResourceKind::Ping, "https://nothotjar.com/x"),
            Verdict::Continue
        );
    }

    #[test]
    fn test_extra_hosts_are_normalized() {
        let policy = InterceptionPolicy::with_extra_hosts(&[" .Metrics.Example.ORG ".into()]);
        assert!(matches!(
            policy.classify(ResourceKind::Other, "https://metrics.example.org/p"),
            Verdict::Abort(AbortReason::Tracker(_))
        ));
    }
}
