//! Agent Backend Traits
//!
//! The Conductor never talks HTTP directly. It hands a resolved target and a
//! payload to an [`AgentBackend`] and consumes the tokens that come back on a
//! channel, which keeps the orchestration logic testable with a scripted
//! backend.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::endpoint::ResolvedTarget;
use crate::error::TransportError;
use crate::streaming::TrailingLinePolicy;

/// Token stream events from agent backends
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamingToken {
    /// One decoded fragment of the response
    Fragment(String),
    /// Response body ended normally
    Complete,
    /// The request or stream failed; no further tokens follow
    Error(TransportError),
}

/// Request body sent to the agent
///
/// Only the latest prompt travels; the agent keeps its own context keyed by
/// the session header.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationPayload {
    /// The user prompt
    pub prompt: String,
    /// Optional image as a data URI
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl InvocationPayload {
    /// Create a text-only payload
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            image: None,
        }
    }

    /// Attach an image data URI
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }
}

/// HTTP client settings shared by network backends
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpSettings {
    /// TCP connect timeout
    pub connect_timeout: Duration,
    /// Longest silence allowed between body reads (`None` = unbounded)
    ///
    /// An idle limit, not a deadline: a reply that keeps streaming is never
    /// cut off however long it runs.
    pub read_timeout: Option<Duration>,
    /// What to do with an unterminated final line
    pub trailing_line: TrailingLinePolicy,
    /// Honour `HTTP_PROXY` / `HTTPS_PROXY` from the environment
    pub system_proxy: bool,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            read_timeout: Some(Duration::from_secs(120)),
            trailing_line: TrailingLinePolicy::Discard,
            system_proxy: true,
        }
    }
}

/// Agent backend trait
///
/// Implementations issue one request per call and stream its outcome.
#[async_trait]
pub trait AgentBackend: Send + Sync {
    /// Backend name for logs and status display
    fn name(&self) -> &str;

    /// Start the request and return a channel of tokens
    ///
    /// Returns without waiting on the network. Connect failures and non-success statuses arrive on the channel
    /// as `Error`. An `Err` return is reserved for failures before any I/O.
    /// Tokens arrive in body order and end with exactly one `Complete` or
    /// `Error`.
    async fn send_streaming(
        &self,
        target: &ResolvedTarget,
        payload: &InvocationPayload,
    ) -> Result<mpsc::Receiver<StreamingToken>, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_without_image() {
        let json = serde_json::to_value(InvocationPayload::new("hi")).unwrap();
        assert_eq!(json, serde_json::json!({ "prompt": "hi" }));
    }

    #[test]
    fn test_payload_with_image() {
        let payload = InvocationPayload::new("look").with_image("data:image/png;base64,AA==");
        let json = serde_json::to_value(payload).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "prompt": "look", "image": "data:image/png;base64,AA==" })
        );
    }

    #[test]
    fn test_http_settings_default() {
        let settings = HttpSettings::default();
        assert_eq!(settings.connect_timeout, Duration::from_secs(10));
        assert_eq!(settings.trailing_line, TrailingLinePolicy::Discard);
        assert_eq!(settings.read_timeout, Some(Duration::from_secs(120)));
    }
}
