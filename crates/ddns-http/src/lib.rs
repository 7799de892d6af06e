// # HTTP Client
//
// This crate provides the reqwest-backed `HttpClient` for the DDNS agent.
//
// ## Purpose
//
// The agent makes exactly two kinds of outbound request, both plain GETs:
// - the public IP lookup against the configured check-IP URL
// - one provider update per target
//
// ## Behavior
//
// - Every request carries its own timeout, chosen by the caller
// - Redirects are not followed: the URL Guard validated this URL, not
//   wherever a server might send us next
// - Error messages are stripped of the request URL (update URLs carry
//   provider tokens)

use async_trait::async_trait;
use ddns_core::traits::{HttpClient, HttpResponse};
use ddns_core::{Error, Result};
use std::error::Error as _;
use std::time::Duration;
use url::Url;

const USER_AGENT: &str = concat!("ddns-agent/", env!("CARGO_PKG_VERSION"));

/// reqwest-backed HTTP client
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    /// Create a new client
    ///
    /// # Errors
    ///
    /// Returns [`Error::Network`] if the TLS backend cannot be initialized.
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| Error::network(format!("Failed to build HTTP client: {}", describe(e))))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn get(&self, url: &Url, timeout: Duration) -> Result<HttpResponse> {
        let response = self
            .client
            .get(url.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| Error::network(describe(e)))?;

        let status = response.status().as_u16();
        tracing::debug!("HTTP {} from {}", status, url.host_str().unwrap_or("?"));

        let body = response
            .text()
            .await
            .map_err(|e| Error::network_with_status(describe(e), status))?;

        Ok(HttpResponse::new(status, body))
    }
}

/// Human-readable failure text that never contains the request URL
fn describe(err: reqwest::Error) -> String {
    let err = err.without_url();
    if err.is_timeout() {
        return "request timed out".to_string();
    }

    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
