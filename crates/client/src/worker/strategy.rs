//! Navigation and asset strategies.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use m360_core::{CacheStore, Error};
use tokio::task::JoinHandle;

use super::OfflineCacheService;
use crate::fetch::{HttpResponse, Network, Request, resolve};

/// Why a request was not intercepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BypassReason {
    NonGet,
    CrossOrigin,
    /// The worker is not (or no longer) the running version.
    NotControlling,
}

/// Where an intercepted response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Network,
    Cache,
    /// Cached document served because a navigation could not reach the network.
    OfflineFallback,
}

impl ResponseSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseSource::Network => "network",
            ResponseSource::Cache => "cache",
            ResponseSource::OfflineFallback => "offline-fallback",
        }
    }
}

/// Background refresh of one store entry.
///
/// Dropping the handle detaches the task; it still completes (or fails
/// quietly) on its own.
#[derive(Debug)]
pub struct Revalidation {
    handle: JoinHandle<Result<HttpResponse, Error>>,
}

impl Revalidation {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the refresh to finish. True if a fresh copy was stored.
    pub async fn settled(self) -> bool {
        matches!(self.join().await, Ok(response) if response.is_cacheable())
    }

    async fn join(self) -> Result<HttpResponse, Error> {
        self.handle
            .await
            .map_err(|e| Error::Network(format!("background fetch aborted: {e}")))?
    }
}

/// Response produced by the service for an intercepted request.
#[derive(Debug)]
pub struct Intercepted {
    pub response: HttpResponse,
    pub source: ResponseSource,
    pub revalidation: Option<Revalidation>,
}

/// Outcome of `handle_fetch`.
#[derive(Debug)]
pub enum FetchDecision {
    /// Not intercepted: the caller performs the request itself, uncached.
    Passthrough(BypassReason),
    Respond(Intercepted),
}

impl FetchDecision {
    pub fn intercepted(self) -> Option<Intercepted> {
        match self {
            FetchDecision::Respond(intercepted) => Some(intercepted),
            FetchDecision::Passthrough(_) => None,
        }
    }
}

fn record_outcome(online: &AtomicBool, result: &Result<HttpResponse, Error>) {
    match result {
        Ok(_) => online.store(true, Ordering::Relaxed),
        Err(e) if e.is_network() => online.store(false, Ordering::Relaxed),
        Err(_) => {}
    }
}

/// Fetch from the network and, on a 2xx, overwrite the store entry.
///
/// Store write failures are logged and never change the returned result.
fn spawn_refresh(
    network: Arc<dyn Network>, store: CacheStore, online: Arc<AtomicBool>, request: Request,
) -> Revalidation {
    let handle = tokio::spawn(async move {
        let result = network.fetch(&request).await;
        record_outcome(&online, &result);

        if let Ok(response) = &result {
            if response.is_cacheable() {
                match store.put(&response.snapshot(&request)).await {
                    Ok(()) => tracing::debug!(url = %request.url, store = store.name(), "cache updated"),
                    Err(e) => tracing::warn!(url = %request.url, error = %e, "cache update dropped"),
                }
            } else {
                tracing::debug!(url = %request.url, status = response.status.as_u16(), "not caching error status");
            }
        }

        result
    });

    Revalidation { handle }
}

impl OfflineCacheService {
    /// Network first; the cached shell when the network is unreachable.
    ///
    /// Network responses are returned as-is and never written to the store.
    pub(crate) async fn navigate(&self, request: Request) -> Result<Intercepted, Error> {
        let result = self.network().fetch(&request).await;
        record_outcome(&self.online_flag(), &result);

        let cause = match result {
            Ok(response) => {
                return Ok(Intercepted { response, source: ResponseSource::Network, revalidation: None });
            }
            Err(e) if e.is_network() => e,
            Err(e) => return Err(e),
        };

        tracing::debug!(url = %request.url, error = %cause, "navigation offline, trying cached shell");

        let fallback = match resolve(&self.config().origin, &self.config().offline_fallback) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(path = %self.config().offline_fallback, error = %e, "unusable offline fallback");
                return Err(cause);
            }
        };

        let store = self.store();
        for url in [&request.url, &fallback] {
            if let Some(stored) = store.match_request("GET", url.as_str()).await? {
                let response = HttpResponse::from_stored(stored)?;
                return Ok(Intercepted { response, source: ResponseSource::OfflineFallback, revalidation: None });
            }
        }

        Err(cause)
    }

    /// Cache first with a concurrent network refresh.
    pub(crate) async fn serve_asset(&self, request: Request) -> Result<Intercepted, Error> {
        let store = self.store();
        let refresh = spawn_refresh(self.network(), store.clone(), self.online_flag(), request.clone());

        let cached = match store.match_request(request.method.as_str(), request.url.as_str()).await {
            Ok(cached) => cached,
            Err(e) => {
                tracing::warn!(url = %request.url, error = %e, "cache lookup failed, waiting on network");
                None
            }
        };

        if let Some(stored) = cached {
            match HttpResponse::from_stored(stored) {
                Ok(response) => {
                    tracing::debug!(url = %request.url, "cache hit");
                    return Ok(Intercepted { response, source: ResponseSource::Cache, revalidation: Some(refresh) });
                }
                Err(e) => tracing::warn!(url = %request.url, error = %e, "unreadable cache entry, waiting on network"),
            }
        }

        let response = refresh.join().await?;
        Ok(Intercepted { response, source: ResponseSource::Network, revalidation: None })
    }
}
