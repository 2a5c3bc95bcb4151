// Copyright 2026 Trace Contributors
// SPDX-License-Identifier: Apache-2.0

//! Capture pipeline: render a page and catch the first response whose URL
//! matches a signature.
//!
//! The pieces, leaf to root:
//! - [`lifecycle`] hands out isolated pages from an ephemeral or shared engine.
//! - [`intercept`] decides which outbound requests reach the network.
//! - [`matcher`] watches responses and decodes the first matching one.
//! - [`race`] drives navigation and races the matcher against a deadline.
//! - [`orchestrator`] wires them together for one call and always cleans up.

pub mod intercept;
pub mod lifecycle;
pub mod matcher;
pub mod orchestrator;
pub mod race;

use crate::error::{CaptureError, NavigationError};
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use url::Url;

/// Signature used when none is configured: the video metadata call.
pub const DEFAULT_SIGNATURE: &str = "fetch-video";

/// Predicate over a response URL identifying the one call of interest.
#[derive(Debug, Clone)]
pub enum Signature {
    /// URL contains this substring.
    Contains(String),
    /// URL matches this regular expression.
    Pattern(Regex),
}

impl Signature {
    /// Parse a signature. `re:<regex>` selects a regular expression, anything
    /// else is a plain substring.
    pub fn parse(raw: &str) -> Result<Self, regex::Error> {
        match raw.strip_prefix("re:") {
            Some(pattern) => Ok(Signature::Pattern(Regex::new(pattern)?)),
            None => Ok(Signature::Contains(raw.to_string())),
        }
    }

    pub fn matches(&self, url: &str) -> bool {
        match self {
            Signature::Contains(needle) => url.contains(needle.as_str()),
            Signature::Pattern(re) => re.is_match(url),
        }
    }
}

impl Default for Signature {
    fn default() -> Self {
        Signature::Contains(DEFAULT_SIGNATURE.to_string())
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signature::Contains(needle) => write!(f, "{needle}"),
            Signature::Pattern(re) => write!(f, "re:{}", re.as_str()),
        }
    }
}

/// One capture: what to load, what to wait for, and for how long.
#[derive(Debug, Clone)]
pub struct CaptureRequest {
    pub target: Url,
    pub deadline: Duration,
    pub signature: Signature,
}

/// The decoded payload of the first matching response.
#[derive(Debug, Clone, PartialEq)]
pub struct Capture {
    /// URL of the response the payload was read from.
    pub url: String,
    pub payload: Value,
}

/// Result of a single capture. Produced once and never changed.
#[derive(Debug, Clone)]
pub enum CaptureOutcome {
    Matched(Capture),
    /// Navigation reported an error but the page still fired the call.
    MatchedAfterNavigationError {
        capture: Capture,
        navigation: NavigationError,
    },
    TimedOut,
    Failed(CaptureError),
}

impl CaptureOutcome {
    pub fn capture(&self) -> Option<&Capture> {
        match self {
            CaptureOutcome::Matched(capture)
            | CaptureOutcome::MatchedAfterNavigationError { capture, .. } => Some(capture),
            CaptureOutcome::TimedOut | CaptureOutcome::Failed(_) => None,
        }
    }

    /// The caller-visible error for an unsuccessful outcome.
    pub fn error(&self) -> Option<CaptureError> {
        match self {
            CaptureOutcome::TimedOut => Some(CaptureError::Timeout),
            CaptureOutcome::Failed(err) => Some(err.clone()),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.capture().is_some()
    }
}

/// Outcome of one call tagged with the wall-clock time it took.
#[derive(Debug, Clone)]
pub struct CaptureReport {
    pub outcome: CaptureOutcome,
    pub elapsed: Duration,
}

impl CaptureReport {
    pub fn failed(error: CaptureError, elapsed: Duration) -> Self {
        Self {
            outcome: CaptureOutcome::Failed(error),
            elapsed,
        }
    }

    /// Build the JSON body returned to the caller.
    pub fn to_response(&self) -> CaptureResponse {
        CaptureResponse {
            success: self.outcome.is_success(),
            time_taken: format_elapsed(self.elapsed),
            data: self.outcome.capture().map(|c| c.payload.clone()),
            error: self.outcome.error().map(|e| e.to_string()),
        }
    }
}

/// Wire shape of a capture result.
#[derive(Debug, Clone, Serialize)]
pub struct CaptureResponse {
    pub success: bool,
    pub time_taken: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Seconds with two decimals, e.g. `"2.07s"`.
pub fn format_elapsed(elapsed: Duration) -> String {
    format!("{:.2}s", elapsed.as_secs_f64())
}
