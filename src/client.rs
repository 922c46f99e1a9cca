//! HTTP client for the portal backend.
//!
//! One `PortalClient` is shared by every stage of the pipeline. It
//! carries the portal origin, a stable per-context session id, and a
//! fresh `x-request-id` on every request so backend logs can correlate
//! the stages of a single page load.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Client, RequestBuilder, Response};
use tracing::debug;
use url::Url;
use uuid::Uuid;

/// Default request timeout in seconds
pub(crate) const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Shared HTTP client bound to the portal origin.
pub struct PortalClient {
    client: Client,
    origin: Url,
    session_id: String,
}

impl PortalClient {
    /// Create a client for the given portal origin (the page's own origin
    /// in a browser host).
    pub fn new(origin: &str) -> Result<Self> {
        let origin =
            Url::parse(origin).with_context(|| format!("invalid portal origin: {}", origin))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            origin,
            session_id: Uuid::new_v4().to_string(),
        })
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.origin
            .join(path)
            .with_context(|| format!("failed to build URL for endpoint: {}", path))
    }

    fn with_request_ids(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("x-request-id", Uuid::new_v4().to_string())
            .header("x-request-session-id", &self.session_id)
    }

    /// GET a path relative to the portal origin.
    pub async fn get(&self, path: &str) -> Result<Response> {
        let url = self.endpoint(path)?;
        debug!("GET {}", url);
        self.with_request_ids(self.client.get(url.clone()))
            .send()
            .await
            .with_context(|| format!("request to {} failed", url))
    }

    /// GET an absolute URL on another host (the trace endpoint lives on
    /// the configured worker domain, not the portal origin).
    pub async fn get_absolute(&self, url: &str) -> Result<Response> {
        let url = Url::parse(url).with_context(|| format!("invalid URL: {}", url))?;
        debug!("GET {}", url);
        self.with_request_ids(self.client.get(url.clone()))
            .send()
            .await
            .with_context(|| format!("request to {} failed", url))
    }

    /// GET with cache-bypass semantics: always hits origin, never a
    /// cached response.
    pub async fn get_no_store(&self, path: &str) -> Result<Response> {
        let url = self.endpoint(path)?;
        debug!("GET {} (no-store)", url);
        self.with_request_ids(
            self.client
                .get(url.clone())
                .header("Cache-Control", "no-store")
                .header("Pragma", "no-cache"),
        )
        .send()
        .await
        .with_context(|| format!("request to {} failed", url))
    }

    /// Lightweight existence check against the portal origin.
    pub async fn head_origin(&self) -> Result<Response> {
        debug!("HEAD {}", self.origin);
        self.with_request_ids(self.client.head(self.origin.clone()))
            .send()
            .await
            .with_context(|| format!("request to {} failed", self.origin))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joining() {
        let client = PortalClient::new("https://portal.example.com").unwrap();
        let url = client.endpoint("/api/env").unwrap();
        assert_eq!(url.as_str(), "https://portal.example.com/api/env");

        let client = PortalClient::new("https://portal.example.com/").unwrap();
        let url = client.endpoint("/api/userdetails").unwrap();
        assert_eq!(url.as_str(), "https://portal.example.com/api/userdetails");
    }

    #[test]
    fn test_invalid_origin_rejected() {
        assert!(PortalClient::new("not a url").is_err());
    }
}
