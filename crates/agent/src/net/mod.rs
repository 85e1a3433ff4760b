//! Network access behind a trait seam.
//!
//! The interceptor and lifecycle manager only ever talk to the network
//! through [`Network`], so tests can substitute a scripted implementation
//! and count calls. The production implementation wraps reqwest.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, header};
use url::Url;

use offcache_core::{AppConfig, Error};

/// A raw network response.
///
/// Unlike a typical HTTP client wrapper this carries non-ok statuses as
/// values, not errors: the caching policy needs to see them. Err means
/// the transport itself failed (no connectivity, DNS, reset, timeout).
#[derive(Debug, Clone)]
pub struct NetResponse {
    /// Final URL after redirects.
    pub url: Url,
    pub status: u16,
    pub status_text: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl NetResponse {
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The seam between the agent and the outside world.
#[async_trait]
pub trait Network: Send + Sync {
    /// Issue a GET request.
    ///
    /// # Errors
    ///
    /// Returns `Error::Network` only for transport-level failure; HTTP
    /// error statuses come back as an `Ok` response.
    async fn get(&self, url: &Url) -> Result<NetResponse, Error>;
}

/// reqwest-backed [`Network`] implementation.
pub struct HttpNetwork {
    http: Client,
}

impl HttpNetwork {
    /// Build an HTTP client from the application configuration.
    pub fn new(config: &AppConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout())
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http })
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn get(&self, url: &Url) -> Result<NetResponse, Error> {
        let response = self
            .http
            .get(url.as_str())
            .header(
                header::ACCEPT,
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .send()
            .await
            .map_err(|e| Error::Network(format!("transport failure: {e}")))?;

        let status = response.status();
        let final_url = response.url().clone();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let body = response
            .bytes()
            .await
            .map_err(|e| Error::Network(format!("failed to read response body: {e}")))?;

        tracing::debug!(url = %final_url, status = status.as_u16(), bytes = body.len(), "fetched");

        Ok(NetResponse {
            url: final_url,
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body,
        })
    }
}
