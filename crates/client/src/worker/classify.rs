//! Per-request routing decision.

use crate::fetch::{Request, same_origin};
use url::Url;

/// Category of a GET request, computed fresh for each request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClassification {
    /// Top-level document load on the site origin: network first.
    Navigation,
    /// Script, style, image or data file on the site origin: cache first.
    SameOriginAsset,
    /// Anything on another origin: never intercepted.
    CrossOrigin,
}

/// Classify a request against the controlled origin.
///
/// Method filtering happens before this; a cross-origin navigation is still
/// cross-origin.
pub fn classify(request: &Request, origin: &Url) -> RequestClassification {
    if !same_origin(&request.url, origin) {
        RequestClassification::CrossOrigin
    } else if request.is_navigation() {
        RequestClassification::Navigation
    } else {
        RequestClassification::SameOriginAsset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> Url {
        Url::parse("http://127.0.0.1:8080/").unwrap()
    }

    #[test]
    fn test_navigation() {
        let request = Request::navigate(Url::parse("http://127.0.0.1:8080/tours/rumtek").unwrap());
        assert_eq!(classify(&request, &origin()), RequestClassification::Navigation);
    }

    #[test]
    fn test_same_origin_asset() {
        let request = Request::get(Url::parse("http://127.0.0.1:8080/assets/index.js").unwrap());
        assert_eq!(classify(&request, &origin()), RequestClassification::SameOriginAsset);
    }

    #[test]
    fn test_cross_origin() {
        let asset = Request::get(Url::parse("https://fonts.example.com/inter.woff2").unwrap());
        assert_eq!(classify(&asset, &origin()), RequestClassification::CrossOrigin);

        let nav = Request::navigate(Url::parse("https://maps.example.com/").unwrap());
        assert_eq!(classify(&nav, &origin()), RequestClassification::CrossOrigin);
    }

    #[test]
    fn test_port_mismatch_is_cross_origin() {
        let request = Request::get(Url::parse("http://127.0.0.1:8081/logo.png").unwrap());
        assert_eq!(classify(&request, &origin()), RequestClassification::CrossOrigin);
    }
}
