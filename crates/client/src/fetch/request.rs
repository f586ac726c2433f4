//! Request and response values passed between the page, the service and the
//! network.

use bytes::Bytes;
use m360_core::{Error, StoredResponse};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use url::Url;

/// How the page issued a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMode {
    /// Top-level document load.
    Navigate,
    /// Anything a document loads: scripts, styles, images, data files.
    Subresource,
}

/// An outgoing request from a controlled page.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub mode: RequestMode,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl Request {
    /// A subresource GET.
    pub fn get(url: Url) -> Self {
        Self { method: Method::GET, url, mode: RequestMode::Subresource, headers: HeaderMap::new(), body: None }
    }

    /// A top-level document GET.
    pub fn navigate(url: Url) -> Self {
        Self { mode: RequestMode::Navigate, ..Self::get(url) }
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn is_get(&self) -> bool {
        self.method == Method::GET
    }

    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate
    }
}

/// A response, either fresh from the network or rebuilt from a store.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// URL the response was produced for (after redirects, when from network)
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Time taken by the network, 0 when served from a store
    pub fetch_ms: u64,
}

impl HttpResponse {
    /// Whether this response may be written to a store.
    pub fn is_cacheable(&self) -> bool {
        self.status.is_success()
    }

    /// Snapshot keyed by the request that produced it.
    ///
    /// Header values that are not valid UTF-8 are dropped.
    pub fn snapshot(&self, request: &Request) -> StoredResponse {
        let headers = self
            .headers
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string())))
            .collect();

        StoredResponse::get(request.url.as_str(), self.status.as_u16(), headers, self.body.to_vec())
    }

    /// Rebuild a response from a stored snapshot.
    pub fn from_stored(stored: StoredResponse) -> Result<Self, Error> {
        let url = Url::parse(&stored.url).map_err(|e| Error::CorruptEntry(format!("{}: {e}", stored.url)))?;
        let status = StatusCode::from_u16(stored.status).map_err(|e| Error::CorruptEntry(e.to_string()))?;

        let mut headers = HeaderMap::new();
        for (name, value) in &stored.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| Error::CorruptEntry(e.to_string()))?;
            let value = HeaderValue::from_str(value).map_err(|e| Error::CorruptEntry(e.to_string()))?;
            headers.append(name, value);
        }

        Ok(Self { url, status, headers, body: Bytes::from(stored.body), fetch_ms: 0 })
    }
}
