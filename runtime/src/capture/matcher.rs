//! First-match response watcher.

use super::{Capture, Signature};
use crate::error::DecodeError;
use crate::renderer::{CapturePage, ObservedResponse, ResponseStream};
use anyhow::Result;
use futures::StreamExt;
use serde_json::Value;
use tracing::{debug, trace};

/// Watches a page's responses for the first one matching a signature whose
/// body decodes as JSON.
///
/// Consumed by [`ResponseMatcher::first_match`], so it resolves at most once.
pub struct ResponseMatcher {
    responses: ResponseStream,
    signature: Signature,
}

impl ResponseMatcher {
    /// Subscribe to `page`'s responses. Must happen before navigation: a
    /// response that arrives earlier is never seen.
    pub async fn arm(page: &dyn CapturePage, signature: Signature) -> Result<Self> {
        let responses = page.responses().await?;
        Ok(Self::new(responses, signature))
    }

    pub fn new(responses: ResponseStream, signature: Signature) -> Self {
        Self {
            responses,
            signature,
        }
    }

    /// Wait for the first matching, decodable response.
    ///
    /// Returns `None` only when the page stops producing responses.
    pub async fn first_match(mut self) -> Option<Capture> {
        let mut rejected = 0usize;
        while let Some(response) = self.responses.next().await {
            if !self.signature.matches(response.url()) {
                trace!(url = response.url(), "response ignored");
                continue;
            }

            let url = response.url().to_string();
            match decode(response).await {
                Ok(payload) => {
                    debug!(%url, rejected, "matching response decoded");
                    return Some(Capture { url, payload });
                }
                Err(err) => {
                    rejected += 1;
                    debug!(%url, error = %err, "matching response skipped");
                }
            }
        }
        debug!(rejected, "response stream ended without a match");
        None
    }
}

/// Read and parse a response body.
pub async fn decode(response: ObservedResponse) -> Result<Value, DecodeError> {
    let text = response
        .text()
        .await
        .map_err(|e| DecodeError::Unreadable(format!("{e:#}")))?;
    if text.trim().is_empty() {
        return Err(DecodeError::Empty);
    }
    Ok(serde_json::from_str(&text)?)
}
