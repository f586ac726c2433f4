//! URL resolution against the site origin.

use url::Url;

/// Error type for URL resolution failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("origin has no host: {0}")]
    MissingHost(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

fn check_scheme(url: &Url) -> Result<(), UrlError> {
    match url.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }
}

/// Parse an origin, keeping only scheme, host and port.
pub fn parse_origin(input: &str) -> Result<Url, UrlError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let parsed = Url::parse(trimmed).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
    check_scheme(&parsed)?;
    if parsed.host_str().is_none() {
        return Err(UrlError::MissingHost(trimmed.to_string()));
    }

    Url::parse(&parsed.origin().ascii_serialization()).map_err(|e| UrlError::InvalidUrl(e.to_string()))
}

/// Resolve a path or absolute URL against the origin.
///
/// Normalization steps:
/// 1. Trim leading/trailing whitespace
/// 2. Absolute URLs are parsed as-is, anything else is joined onto the origin
/// 3. Lowercase the host
/// 4. Remove fragment (#...)
/// 5. Keep query string intact (do not reorder)
pub fn resolve(origin: &Url, target: &str) -> Result<Url, UrlError> {
    let trimmed = target.trim();

    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let mut parsed = if trimmed.contains("://") {
        Url::parse(trimmed)
    } else {
        origin.join(trimmed)
    }
    .map_err(|e| UrlError::InvalidUrl(e.to_string()))?;

    check_scheme(&parsed)?;

    if let Some(host) = parsed.host_str() {
        let lowered = host.to_lowercase();
        parsed
            .set_host(Some(&lowered))
            .map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
    }

    parsed.set_fragment(None);

    Ok(parsed)
}

/// Whether two URLs share scheme, host and port.
pub fn same_origin(a: &Url, b: &Url) -> bool {
    a.origin() == b.origin()
}
