//! HTTP front that places the offline cache service in front of the origin.
//!
//! Every path except the status endpoint is treated as a request from a
//! controlled page: the registration decides, and passthrough requests are
//! forwarded to the origin without caching.

use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, Uri, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use m360_client::{FetchDecision, HttpResponse, Network, Registration, Request, RequestMode, ResponseSource};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::FrontError;

/// Response header naming where an intercepted response came from.
pub const SOURCE_HEADER: &str = "x-m360-source";

#[derive(Clone)]
pub struct AppState {
    pub registration: Arc<Registration>,
    pub network: Arc<dyn Network>,
    pub origin: Url,
    /// Configured cache version, reported by the status endpoint.
    pub version: String,
}

/// Body of `GET /__m360/status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    pub store: Option<String>,
    pub state: Option<String>,
    pub online: bool,
    pub entries: u64,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/__m360/status", get(status))
        .fallback(intercept)
        .with_state(state)
}

/// Whether the page is loading a top-level document.
fn is_navigation(method: &Method, headers: &HeaderMap) -> bool {
    if let Some(mode) = headers.get("sec-fetch-mode") {
        return mode.as_bytes().eq_ignore_ascii_case(b"navigate");
    }

    *method == Method::GET
        && headers
            .get(header::ACCEPT)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|accept| accept.split(',').next().is_some_and(|first| first.trim().starts_with("text/html")))
}

/// Request for the same path on the origin. Never leaves the origin.
fn to_request(origin: &Url, method: Method, uri: &Uri, headers: HeaderMap, body: Bytes) -> Request {
    let mut url = origin.clone();
    url.set_path(uri.path());
    url.set_query(uri.query());

    let mode = if is_navigation(&method, &headers) { RequestMode::Navigate } else { RequestMode::Subresource };

    Request { method, url, mode, headers, body: (!body.is_empty()).then_some(body) }
}

fn into_response(response: HttpResponse, source: Option<ResponseSource>) -> Response {
    let mut headers = response.headers;
    if let Some(source) = source {
        headers.insert(HeaderName::from_static(SOURCE_HEADER), HeaderValue::from_static(source.as_str()));
    }
    (response.status, headers, response.body).into_response()
}

async fn intercept(
    State(state): State<AppState>, method: Method, uri: Uri, headers: HeaderMap, body: Bytes,
) -> Result<Response, FrontError> {
    let request = to_request(&state.origin, method, &uri, headers, body);

    match state.registration.handle_fetch(request.clone()).await? {
        FetchDecision::Respond(intercepted) => {
            tracing::debug!(url = %request.url, source = intercepted.source.as_str(), "intercepted");
            Ok(into_response(intercepted.response, Some(intercepted.source)))
        }
        FetchDecision::Passthrough(reason) => {
            tracing::debug!(url = %request.url, ?reason, "forwarding");
            let response = state.network.fetch(&request).await?;
            Ok(into_response(response, None))
        }
    }
}

async fn status(State(state): State<AppState>) -> Result<axum::Json<StatusResponse>, FrontError> {
    let Some(worker) = state.registration.controller().await else {
        return Ok(axum::Json(StatusResponse {
            version: state.version,
            store: None,
            state: None,
            online: true,
            entries: 0,
        }));
    };

    let entries = worker.store().len().await?;
    Ok(axum::Json(StatusResponse {
        version: state.version,
        store: Some(worker.version().to_string()),
        state: Some(worker.state().to_string()),
        online: worker.is_online(),
        entries,
    }))
}
