// Copyright 2026 Trace Contributors
// SPDX-License-Identifier: Apache-2.0

//! Error types for the capture pipeline.
//!
//! [`CaptureError`] is the only error a caller of the pipeline ever sees.
//! [`NavigationError`] and [`DecodeError`] are contained inside a single
//! capture: they are logged where they happen and never propagated.

use std::time::Duration;

/// Errors visible to the caller of a capture.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// No target URL was supplied.
    #[error("No URL provided")]
    MissingInput,

    /// The target URL could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The browsing engine could not be launched or did not respond.
    #[error("Browser engine unavailable: {0}")]
    EngineUnavailable(String),

    /// The shared browsing engine failed to launch at startup.
    #[error("Failed to launch browser engine: {0}")]
    EngineLaunch(String),

    /// The deadline elapsed without a matching response.
    #[error("API not found")]
    Timeout,

    /// Anything else.
    #[error("{0}")]
    Unexpected(String),
}

impl CaptureError {
    /// Whether the caller sent a bad request (as opposed to a server-side failure).
    pub fn is_client_error(&self) -> bool {
        matches!(self, CaptureError::MissingInput | CaptureError::InvalidUrl(_))
    }

    /// Short machine-readable code, used in logs.
    pub fn code(&self) -> &'static str {
        match self {
            CaptureError::MissingInput => "missing_input",
            CaptureError::InvalidUrl(_) => "invalid_url",
            CaptureError::EngineUnavailable(_) => "engine_unavailable",
            CaptureError::EngineLaunch(_) => "engine_launch",
            CaptureError::Timeout => "timeout",
            CaptureError::Unexpected(_) => "unexpected",
        }
    }
}

/// Navigation failed. Contained: the race continues regardless.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum NavigationError {
    /// The engine refused or could not issue the navigation.
    #[error("navigation failed: {0}")]
    Failed(String),

    /// The navigation was issued but the engine reported a network error.
    #[error("navigation rejected by engine: {0}")]
    Rejected(String),

    /// The navigation did not settle within its own timeout.
    #[error("navigation timed out after {0:?}")]
    TimedOut(Duration),
}

/// A response matched the signature but its body could not be decoded.
/// Contained: the matcher keeps watching.
#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("response body unreadable: {0}")]
    Unreadable(String),

    #[error("response body is empty")]
    Empty,

    #[error("response body is not JSON: {0}")]
    Malformed(#[from] serde_json::Error),
}
