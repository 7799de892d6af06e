// # HTTP Client Trait
//
// The single network seam of the agent. Both the public-IP lookup and the
// provider update request are plain GETs with a per-call timeout.
//
// ## Contract
//
// - Any HTTP response, whatever its status, is `Ok(HttpResponse)`.
//   Classification of 4xx/5xx is the caller's job.
// - Timeouts, connection failures and unreadable bodies are
//   `Err(Error::Network { .. })`. The status is attached when the response
//   line had already been received.
// - Error messages must not contain the request URL: update URLs carry
//   provider tokens.
// - No retries. A failed call is recorded and retried on the next cycle.
//
// Implementations: `ddns-http` (reqwest).

use async_trait::async_trait;
use std::time::Duration;
use url::Url;

/// Status and body of a completed HTTP exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Trait for outbound HTTP implementations
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Issue a GET request bounded by `timeout`
    async fn get(&self, url: &Url, timeout: Duration) -> Result<HttpResponse, crate::Error>;
}
