//! Remote reconciliation endpoint contract
//!
//! The engine only needs success-or-failure per operation; response bodies
//! are never interpreted. Any non-success response counts as a recoverable
//! failure until the operation's retries are exhausted.

use std::time::Duration;

use async_trait::async_trait;

use crate::queue::PendingOperation;

/// Failure reported by the remote endpoint.
#[derive(Debug, Clone)]
pub struct RemoteError {
    /// HTTP status, if the request reached the server
    pub status: Option<u16>,
    pub message: String,
}

impl std::fmt::Display for RemoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for RemoteError {}

/// The consumed remote contract: deliver one operation, report success or
/// failure. Implementations must tolerate at-least-once delivery.
#[async_trait]
pub trait RemoteEndpoint: Send + Sync {
    async fn reconcile(&self, op: &PendingOperation) -> Result<(), RemoteError>;
}

/// HTTP implementation posting operations to `{base_url}/reconcile`.
pub struct HttpEndpoint {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpEndpoint {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl RemoteEndpoint for HttpEndpoint {
    async fn reconcile(&self, op: &PendingOperation) -> Result<(), RemoteError> {
        let url = format!("{}/reconcile", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "kind": op.kind,
            "domain": op.domain,
            "record_id": op.record_id,
            "payload": op.payload,
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| RemoteError {
                status: None,
                message: format!("Network error: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(RemoteError {
                status: Some(status),
                message: format!("HTTP {}: {}", status, text),
            });
        }

        Ok(())
    }
}
