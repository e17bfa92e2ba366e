//! HTTP Agent Backend
//!
//! POSTs the invocation payload to the resolved target and streams the
//! line-delimited response body back through the decoder.
//!
//! `send_streaming` hands out the token channel before any network I/O. One
//! task is spawned per request: it connects, checks the status, then owns the
//! body stream and forwards fragments in arrival order, so a slow consumer
//! applies back-pressure to the socket instead of buffering without bound.
//! Connect failures and non-success statuses arrive as `StreamingToken::Error`.

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;

use super::traits::{AgentBackend, HttpSettings, InvocationPayload, StreamingToken};
use crate::endpoint::ResolvedTarget;
use crate::error::TransportError;
use crate::streaming::{decode_stream, TrailingLinePolicy};

/// Token channel depth per request
const CHANNEL_CAPACITY: usize = 100;

/// reqwest-backed agent client
#[derive(Clone, Debug)]
pub struct HttpAgentBackend {
    http_client: reqwest::Client,
    trailing_line: TrailingLinePolicy,
}

impl HttpAgentBackend {
    /// Build a backend with the given client settings
    pub fn new(settings: &HttpSettings) -> Result<Self, TransportError> {
        let mut builder = reqwest::Client::builder().connect_timeout(settings.connect_timeout);
        if let Some(timeout) = settings.read_timeout {
            builder = builder.read_timeout(timeout);
        }
        if !settings.system_proxy {
            builder = builder.no_proxy();
        }

        let http_client = builder
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;

        Ok(Self {
            http_client,
            trailing_line: settings.trailing_line,
        })
    }
}

#[async_trait]
impl AgentBackend for HttpAgentBackend {
    fn name(&self) -> &'static str {
        "HTTP"
    }

    async fn send_streaming(
        &self,
        target: &ResolvedTarget,
        payload: &InvocationPayload,
    ) -> Result<mpsc::Receiver<StreamingToken>, TransportError> {
        let mut request = self.http_client.post(&target.url);
        for (name, value) in &target.headers {
            request = request.header(name, value);
        }
        let request = request.json(payload);

        tracing::debug!(
            url = %target.url,
            prompt_len = payload.prompt.len(),
            has_image = payload.image.is_some(),
            "Issuing agent request"
        );

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        tokio::spawn(stream_response(request, self.trailing_line, tx));

        Ok(rx)
    }
}

/// Issue the request and forward its body as tokens
async fn stream_response(
    request: reqwest::RequestBuilder,
    trailing_line: TrailingLinePolicy,
    tx: mpsc::Sender<StreamingToken>,
) {
    let response = match request.send().await {
        Ok(response) => response,
        Err(e) => {
            let error = TransportError::from(e);
            tracing::warn!(error = %error, "Agent request failed");
            let _ = tx.send(StreamingToken::Error(error)).await;
            return;
        }
    };

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        tracing::warn!(status = status.as_u16(), "Agent returned error status");
        let _ = tx
            .send(StreamingToken::Error(TransportError::Status {
                status: status.as_u16(),
                body,
            }))
            .await;
        return;
    }

    let mut fragments = Box::pin(decode_stream(response.bytes_stream(), trailing_line));
    let mut count = 0usize;
    while let Some(item) = fragments.next().await {
        match item {
            Ok(fragment) => {
                count += 1;
                if tx.send(StreamingToken::Fragment(fragment)).await.is_err() {
                    // Receiver dropped, stop reading
                    tracing::debug!(fragments = count, "Token receiver dropped");
                    return;
                }
            }
            Err(e) => {
                tracing::warn!(fragments = count, error = %e, "Response stream failed");
                let _ = tx.send(StreamingToken::Error(e)).await;
                return;
            }
        }
    }

    tracing::debug!(fragments = count, "Response stream complete");
    let _ = tx.send(StreamingToken::Complete).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_backend_creation() {
        let backend = HttpAgentBackend::new(&HttpSettings::default()).unwrap();
        assert_eq!(backend.name(), "HTTP");
        assert_eq!(backend.trailing_line, TrailingLinePolicy::Discard);
    }

    #[test]
    fn test_backend_without_read_timeout() {
        let settings = HttpSettings {
            read_timeout: None,
            trailing_line: TrailingLinePolicy::Flush,
            ..Default::default()
        };
        let backend = HttpAgentBackend::new(&settings).unwrap();
        assert_eq!(backend.trailing_line, TrailingLinePolicy::Flush);
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        // Bind then drop to get a port nothing listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let settings = HttpSettings {
            connect_timeout: Duration::from_secs(2),
            system_proxy: false,
            ..Default::default()
        };
        let backend = HttpAgentBackend::new(&settings).unwrap();
        let target = ResolvedTarget {
            url: format!("http://127.0.0.1:{port}/invocations"),
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
        };

        let mut rx = backend
            .send_streaming(&target, &InvocationPayload::new("hi"))
            .await
            .unwrap();
        let token = rx.recv().await.unwrap();
        assert!(
            matches!(token, StreamingToken::Error(TransportError::Network(_))),
            "got {token:?}"
        );
        assert_eq!(rx.recv().await, None);
    }
}
