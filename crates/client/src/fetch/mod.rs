//! Network seam for the offline cache service.
//!
//! ### Transport vs. status
//! - Connection failures, DNS errors and timeouts are `Error::Network`:
//!   the service treats them as "offline".
//! - Any HTTP status, including 4xx/5xx, is a normal response handed back
//!   to the caller. Whether it may be cached is decided by the service.
//!
//! ### Limits
//! - Request timeout: 20s (configurable)
//! - Max body bytes: 5MB (configurable)

pub mod request;
pub mod url;

use async_trait::async_trait;
use reqwest::{Client, header};
use std::time::{Duration, Instant};

pub use request::{HttpResponse, Request, RequestMode};
pub use url::{UrlError, parse_origin, resolve, same_origin};

use m360_core::{AppConfig, Error};

/// Hop-by-hop headers and headers that describe the wire encoding rather
/// than the resource. Never forwarded in either direction.
const SKIPPED_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "transfer-encoding",
    "upgrade",
    "te",
    "trailer",
    "host",
    "content-length",
    "content-encoding",
    "accept-encoding",
];

fn forwardable(headers: &header::HeaderMap) -> header::HeaderMap {
    let mut out = header::HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if !SKIPPED_HEADERS.contains(&name.as_str()) {
            out.append(name.clone(), value.clone());
        }
    }
    out
}

/// Something that can perform a request against the real network.
#[async_trait]
pub trait Network: Send + Sync {
    /// Perform the request. Returns `Error::Network` only for transport
    /// failures; error statuses come back as `Ok`.
    async fn fetch(&self, request: &Request) -> Result<HttpResponse, Error>;
}

/// Configuration for the HTTP network.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "m360-offline/0.1")
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 5MB)
    pub max_bytes: usize,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "m360-offline/0.1".to_string(),
            max_bytes: 5 * 1024 * 1024,
            timeout: Duration::from_millis(20000),
            max_redirects: 5,
        }
    }
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            max_bytes: config.max_bytes,
            timeout: config.timeout(),
            ..Default::default()
        }
    }
}

/// reqwest-backed network.
pub struct HttpNetwork {
    http: Client,
    config: FetchConfig,
}

impl HttpNetwork {
    /// Create a new network client with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, config })
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &Request) -> Result<HttpResponse, Error> {
        let start = Instant::now();

        let mut builder = self
            .http
            .request(request.method.clone(), request.url.clone())
            .headers(forwardable(&request.headers));
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Network(format!("timeout: {e}"))
            } else {
                Error::Network(format!("network error: {e}"))
            }
        })?;

        if let Some(len) = response.content_length()
            && len as usize > self.config.max_bytes
        {
            return Err(Error::FetchTooLarge(format!("{} bytes exceeds {}", len, self.config.max_bytes)));
        }

        let status = response.status();
        let final_url = response.url().clone();
        let headers = forwardable(response.headers());

        let body = response
            .bytes()
            .await
            .map_err(|e| Error::Network(format!("failed to read response: {e}")))?;

        if body.len() > self.config.max_bytes {
            return Err(Error::FetchTooLarge(format!("{} bytes exceeds {}", body.len(), self.config.max_bytes)));
        }

        let fetch_ms = start.elapsed().as_millis() as u64;

        tracing::debug!(
            "fetched {} {} -> {} {} in {}ms ({} bytes)",
            request.method,
            request.url,
            final_url,
            status.as_u16(),
            fetch_ms,
            body.len()
        );

        Ok(HttpResponse { url: final_url, status, headers, body, fetch_ms })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_fetch_config_default() {
        let config = FetchConfig::default();
        assert_eq!(config.user_agent, "m360-offline/0.1");
        assert_eq!(config.max_bytes, 5 * 1024 * 1024);
        assert_eq!(config.timeout, Duration::from_millis(20000));
        assert_eq!(config.max_redirects, 5);
    }

    #[test]
    fn test_fetch_config_from_app_config() {
        let app = AppConfig { user_agent: "tour-kiosk/2".into(), timeout_ms: 1500, ..Default::default() };
        let config = FetchConfig::from(&app);
        assert_eq!(config.user_agent, "tour-kiosk/2");
        assert_eq!(config.timeout, Duration::from_millis(1500));
    }

    #[test]
    fn test_forwardable_drops_hop_by_hop() {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("127.0.0.1:8360"));
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert(header::ACCEPT_ENCODING, HeaderValue::from_static("gzip"));
        headers.insert(header::ACCEPT, HeaderValue::from_static("text/html"));

        let out = forwardable(&headers);
        assert_eq!(out.len(), 1);
        assert_eq!(out.get(header::ACCEPT).unwrap(), "text/html");
    }

    #[tokio::test]
    async fn test_http_network_new() {
        let network = HttpNetwork::new(FetchConfig::default());
        assert!(network.is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network_error() {
        let network = HttpNetwork::new(FetchConfig { timeout: Duration::from_millis(500), ..Default::default() }).unwrap();
        let url = ::url::Url::parse("http://127.0.0.1:9/").unwrap();

        let result = network.fetch(&Request::get(url)).await;
        assert!(matches!(result, Err(Error::Network(_))));
    }
}
