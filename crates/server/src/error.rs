//! Structured errors for the offline front.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// A failed fetch as seen by the page.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct FrontError(#[from] pub m360_core::Error);

impl IntoResponse for FrontError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), error = %self.0, "request failed");
        }
        (status, self.0.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use m360_core::Error;

    #[test]
    fn test_network_failure_is_bad_gateway() {
        let response = FrontError(Error::Network("offline".into())).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_storage_failure_is_internal() {
        let response = FrontError(Error::CorruptEntry("bad headers".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_display_is_transparent() {
        let err = FrontError::from(Error::Network("dns".into()));
        assert_eq!(err.to_string(), "NETWORK_ERROR: dns");
    }
}
