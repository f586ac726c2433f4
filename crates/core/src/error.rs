//! Unified error types for the m360 offline cache.
//!
//! The code prefix of every message is stable so it can be matched on by
//! whatever hosts the service (logs, the HTTP front).

use tokio_rusqlite::rusqlite;

/// Unified error types for the offline cache service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input parameters (e.g., empty store name).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Invalid URL or a URL that cannot be resolved against the origin.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// Only GET requests may be stored.
    #[error("UNSUPPORTED_METHOD: {0} requests are never cached")]
    UnsupportedMethod(String),

    /// Database operation failed.
    #[error("CACHE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("CACHE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// Stored entry could not be decoded.
    #[error("CACHE_ERROR: corrupt entry: {0}")]
    CorruptEntry(String),

    /// Transport-level failure: offline, DNS, connection reset, timeout.
    #[error("NETWORK_ERROR: {0}")]
    Network(String),

    /// Network answered with a non-success status where one was required.
    #[error("HTTP_ERROR: {0}")]
    HttpError(String),

    /// Response exceeded the configured byte limit.
    #[error("FETCH_TOO_LARGE: {0}")]
    FetchTooLarge(String),

    /// Seeding the store failed; the version was not installed.
    #[error("INSTALL_FAILED: {version}: {reason}")]
    InstallFailed { version: String, reason: String },

    /// Lifecycle operation called in the wrong state.
    #[error("INVALID_STATE: {0}")]
    InvalidState(String),
}

impl Error {
    /// HTTP status the local front should answer with for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::InvalidInput(_) | Error::InvalidUrl(_) | Error::UnsupportedMethod(_) => 400,
            Error::Network(_) | Error::HttpError(_) | Error::FetchTooLarge(_) => 502,
            Error::InstallFailed { .. } | Error::InvalidState(_) => 503,
            Error::Database(_) | Error::MigrationFailed(_) | Error::CorruptEntry(_) => 500,
        }
    }

    /// Whether this error means the network could not be reached at all.
    pub fn is_network(&self) -> bool {
        matches!(self, Error::Network(_))
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}
