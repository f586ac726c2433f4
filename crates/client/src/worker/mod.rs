//! Offline cache service: versioned install/activate lifecycle plus the
//! per-request fetch policy.
//!
//! ### Lifecycle
//! - `install()` seeds the current store with the seed paths, atomically.
//!   Any failure leaves no trace of this version and the worker redundant.
//! - `activate()` records the current store as the active one and deletes
//!   every other generation, in one transaction, then starts intercepting.
//! - `resume()` takes over the store a previous process activated, without
//!   touching the network.
//!
//! ### Fetch policy
//! - non-GET and cross-origin requests pass through untouched
//! - navigations: network first, cached shell on network failure
//! - same-origin assets: cache first, with the network refreshing the store
//!   in the background (stale-while-revalidate)

pub mod classify;
pub mod strategy;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use m360_core::{AppConfig, CacheStorage, CacheStore, Error, StoredResponse};
use tokio::sync::watch;
use url::Url;

use crate::fetch::{Network, Request, parse_origin, resolve};

pub use classify::{RequestClassification, classify};
pub use strategy::{BypassReason, FetchDecision, Intercepted, ResponseSource, Revalidation};

/// Lifecycle state of one worker version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Parsed,
    Installing,
    Installed,
    Activating,
    /// Activated and intercepting requests.
    Running,
    /// Failed to install, or replaced by a newer version.
    Redundant,
}

impl WorkerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerState::Parsed => "parsed",
            WorkerState::Installing => "installing",
            WorkerState::Installed => "installed",
            WorkerState::Activating => "activating",
            WorkerState::Running => "running",
            WorkerState::Redundant => "redundant",
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What one worker version needs to know.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Current store name; doubles as the version tag.
    pub store_name: String,
    pub origin: Url,
    pub seed_paths: Vec<String>,
    pub offline_fallback: String,
}

impl ServiceConfig {
    pub fn new(store_name: impl Into<String>, origin: Url) -> Self {
        Self {
            store_name: store_name.into(),
            origin,
            seed_paths: vec!["/".into(), "/index.html".into(), "/placeholder.svg".into()],
            offline_fallback: "/".into(),
        }
    }

    pub fn with_seed_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.seed_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_offline_fallback(mut self, path: impl Into<String>) -> Self {
        self.offline_fallback = path.into();
        self
    }
}

impl TryFrom<&AppConfig> for ServiceConfig {
    type Error = Error;

    fn try_from(config: &AppConfig) -> Result<Self, Self::Error> {
        let origin = parse_origin(&config.origin).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        Ok(Self {
            store_name: config.store_name(),
            origin,
            seed_paths: config.seed_paths.clone(),
            offline_fallback: config.offline_fallback.clone(),
        })
    }
}

/// One version of the offline cache service.
pub struct OfflineCacheService {
    storage: CacheStorage,
    network: Arc<dyn Network>,
    config: ServiceConfig,
    state: watch::Sender<WorkerState>,
    online: Arc<AtomicBool>,
}

impl fmt::Debug for OfflineCacheService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OfflineCacheService")
            .field("store", &self.config.store_name)
            .field("state", &self.state())
            .field("online", &self.is_online())
            .finish()
    }
}

impl OfflineCacheService {
    pub fn new(storage: CacheStorage, network: Arc<dyn Network>, config: ServiceConfig) -> Self {
        let (state, _) = watch::channel(WorkerState::Parsed);
        Self { storage, network, config, state, online: Arc::new(AtomicBool::new(true)) }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Version tag (store name) of this worker.
    pub fn version(&self) -> &str {
        &self.config.store_name
    }

    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    /// Watch lifecycle transitions.
    pub fn subscribe(&self) -> watch::Receiver<WorkerState> {
        self.state.subscribe()
    }

    /// Outcome of the most recent network attempt. Starts out true.
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Relaxed)
    }

    /// Handle to the current store. Never creates it, so an evicted
    /// generation stays evicted.
    pub fn store(&self) -> CacheStore {
        self.storage.store(&self.config.store_name)
    }

    fn transition(&self, next: WorkerState) {
        let previous = self.state.send_replace(next);
        tracing::info!(store = %self.config.store_name, from = %previous, to = %next, "worker state");
    }

    pub(crate) fn retire(&self) {
        self.transition(WorkerState::Redundant);
    }

    pub(crate) fn online_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.online)
    }

    pub(crate) fn network(&self) -> Arc<dyn Network> {
        Arc::clone(&self.network)
    }

    fn seed_urls(&self) -> Result<Vec<Url>, Error> {
        let mut urls: Vec<Url> = Vec::with_capacity(self.config.seed_paths.len());
        for path in &self.config.seed_paths {
            let url = resolve(&self.config.origin, path).map_err(|e| Error::InvalidUrl(format!("{path}: {e}")))?;
            if !urls.contains(&url) {
                urls.push(url);
            }
        }
        Ok(urls)
    }

    async fn seed(&self) -> Result<usize, Error> {
        let urls = self.seed_urls()?;
        let store = self.storage.open_store(&self.config.store_name).await?;

        let mut entries: Vec<StoredResponse> = Vec::with_capacity(urls.len());
        for url in urls {
            let request = Request::get(url);
            let response = match self.network.fetch(&request).await {
                Ok(response) => {
                    self.online.store(true, Ordering::Relaxed);
                    response
                }
                Err(e) => {
                    if e.is_network() {
                        self.online.store(false, Ordering::Relaxed);
                    }
                    return Err(e);
                }
            };
            if !response.is_cacheable() {
                return Err(Error::HttpError(format!("{}: status {}", request.url, response.status.as_u16())));
            }
            entries.push(response.snapshot(&request));
        }

        store.put_all(&entries).await?;
        Ok(entries.len())
    }

    /// Pre-populate the current store with the seed paths.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidState` when called twice, and
    /// `Error::InstallFailed` when any seed could not be fetched or stored.
    /// In the latter case the worker becomes redundant, and a store created
    /// by this install is removed again.
    pub async fn install(&self) -> Result<(), Error> {
        let current = self.state();
        if current != WorkerState::Parsed {
            return Err(Error::InvalidState(format!("cannot install a worker that is {current}")));
        }
        self.transition(WorkerState::Installing);

        let existed = match self.storage.has_store(&self.config.store_name).await {
            Ok(existed) => existed,
            Err(e) => return Err(self.fail_install(e, true).await),
        };

        match self.seed().await {
            Ok(count) => {
                tracing::info!(store = %self.config.store_name, seeded = count, "install complete");
                self.transition(WorkerState::Installed);
                Ok(())
            }
            Err(e) => Err(self.fail_install(e, existed).await),
        }
    }

    async fn fail_install(&self, cause: Error, store_existed: bool) -> Error {
        tracing::warn!(store = %self.config.store_name, error = %cause, "install failed");

        if !store_existed
            && let Err(e) = self.storage.delete_store(&self.config.store_name).await
        {
            tracing::warn!(store = %self.config.store_name, error = %e, "could not remove partially installed store");
        }

        self.transition(WorkerState::Redundant);
        Error::InstallFailed { version: self.config.store_name.clone(), reason: cause.to_string() }
    }

    /// Claim the current store, evict every other generation and start
    /// intercepting.
    ///
    /// Activating an already running worker only repeats the claim. Returns
    /// the names of the deleted stores.
    ///
    /// # Errors
    ///
    /// If the claim fails nothing was evicted. A worker that was only
    /// installed becomes redundant and its store is removed, so no half
    /// activated generation is left behind.
    pub async fn activate(&self) -> Result<Vec<String>, Error> {
        let previous = self.state();
        match previous {
            WorkerState::Installed => self.transition(WorkerState::Activating),
            WorkerState::Running => {}
            other => return Err(Error::InvalidState(format!("cannot activate a worker that is {other}"))),
        }

        match self.storage.claim_store(&self.config.store_name).await {
            Ok(evicted) => {
                for name in &evicted {
                    tracing::info!(store = %name, current = %self.config.store_name, "evicted stale cache store");
                }
                if previous != WorkerState::Running {
                    self.transition(WorkerState::Running);
                }
                Ok(evicted)
            }
            Err(e) if previous == WorkerState::Running => Err(e),
            Err(e) => {
                tracing::warn!(store = %self.config.store_name, error = %e, "activation failed");
                if let Err(cleanup) = self.storage.delete_store(&self.config.store_name).await {
                    tracing::warn!(store = %self.config.store_name, error = %cleanup, "could not remove unactivated store");
                }
                self.transition(WorkerState::Redundant);
                Err(e)
            }
        }
    }

    /// Take over the store that a previous process activated.
    ///
    /// # Errors
    ///
    /// `Error::InvalidState` unless the worker is freshly parsed and its
    /// store is the one recorded as active.
    pub async fn resume(&self) -> Result<(), Error> {
        let current = self.state();
        if current != WorkerState::Parsed {
            return Err(Error::InvalidState(format!("cannot resume a worker that is {current}")));
        }

        let active = self.storage.active_store().await?;
        if active.as_deref() != Some(self.config.store_name.as_str()) {
            return Err(Error::InvalidState(format!("{} is not the active cache store", self.config.store_name)));
        }

        self.transition(WorkerState::Running);
        Ok(())
    }

    /// Route one request from a controlled page.
    ///
    /// `Ok(FetchDecision::Passthrough)` means the caller should perform the
    /// request itself without caching. An `Err` is a failed fetch that should
    /// surface to the page.
    pub async fn handle_fetch(&self, request: Request) -> Result<FetchDecision, Error> {
        if self.state() != WorkerState::Running {
            return Ok(FetchDecision::Passthrough(BypassReason::NotControlling));
        }

        if !request.is_get() {
            tracing::debug!(method = %request.method, url = %request.url, "bypass: non-GET");
            return Ok(FetchDecision::Passthrough(BypassReason::NonGet));
        }

        match classify(&request, &self.config.origin) {
            RequestClassification::CrossOrigin => {
                tracing::debug!(url = %request.url, "bypass: cross-origin");
                Ok(FetchDecision::Passthrough(BypassReason::CrossOrigin))
            }
            RequestClassification::Navigation => self.navigate(request).await.map(FetchDecision::Respond),
            RequestClassification::SameOriginAsset => self.serve_asset(request).await.map(FetchDecision::Respond),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedNetwork, origin};

    async fn service(network: Arc<ScriptedNetwork>, version: &str) -> (CacheStorage, OfflineCacheService) {
        let storage = CacheStorage::open_in_memory().await.unwrap();
        let config = ServiceConfig::new(format!("monastery360-cache-{version}"), origin());
        let service = OfflineCacheService::new(storage.clone(), network, config);
        (storage, service)
    }

    fn seeded_network() -> Arc<ScriptedNetwork> {
        let network = Arc::new(ScriptedNetwork::new());
        network.respond("/", 200, b"<html>root</html>");
        network.respond("/index.html", 200, b"<html>shell</html>");
        network.respond("/placeholder.svg", 200, b"<svg/>");
        network
    }

    #[test]
    fn test_service_config_from_app_config() {
        let app = AppConfig { cache_version: "v3".into(), origin: "https://monastery360.example/x".into(), ..Default::default() };
        let config = ServiceConfig::try_from(&app).unwrap();
        assert_eq!(config.store_name, "monastery360-cache-v3");
        assert_eq!(config.origin.as_str(), "https://monastery360.example/");
        assert_eq!(config.seed_paths, app.seed_paths);
    }

    #[tokio::test]
    async fn test_install_seeds_every_path() {
        let (storage, service) = service(seeded_network(), "v1").await;

        service.install().await.unwrap();
        assert_eq!(service.state(), WorkerState::Installed);

        let store = storage.open_store("monastery360-cache-v1").await.unwrap();
        assert_eq!(
            store.keys().await.unwrap(),
            vec![
                "http://127.0.0.1:8080/".to_string(),
                "http://127.0.0.1:8080/index.html".to_string(),
                "http://127.0.0.1:8080/placeholder.svg".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_install_dedups_seed_paths() {
        let network = seeded_network();
        let storage = CacheStorage::open_in_memory().await.unwrap();
        let config = ServiceConfig::new("monastery360-cache-v1", origin()).with_seed_paths(["/", "/", "/index.html"]);
        let service = OfflineCacheService::new(storage.clone(), network.clone(), config);

        service.install().await.unwrap();
        assert_eq!(network.calls_to("/"), 1);
        assert_eq!(service.store().len().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_install_failure_leaves_nothing() {
        let network = Arc::new(ScriptedNetwork::new());
        network.respond("/", 200, b"root");
        network.respond("/index.html", 200, b"shell");
        // placeholder.svg is unscripted: 404

        let (storage, service) = service(network, "v2").await;
        let result = service.install().await;

        assert!(matches!(result, Err(Error::InstallFailed { ref version, .. }) if version == "monastery360-cache-v2"));
        assert_eq!(service.state(), WorkerState::Redundant);
        assert!(!storage.has_store("monastery360-cache-v2").await.unwrap());
    }

    #[tokio::test]
    async fn test_install_failure_offline() {
        let network = seeded_network();
        network.set_online(false);

        let (storage, service) = service(network, "v1").await;
        let result = service.install().await;

        assert!(matches!(result, Err(Error::InstallFailed { .. })));
        assert!(!service.is_online());
        assert!(storage.store_names().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_install_failure_keeps_preexisting_store() {
        let network = seeded_network();
        let (storage, service) = service(network.clone(), "v1").await;
        let store = storage.open_store("monastery360-cache-v1").await.unwrap();
        store
            .put(&StoredResponse::get("http://127.0.0.1:8080/", 200, Vec::new(), b"kept".to_vec()))
            .await
            .unwrap();

        network.set_online(false);
        assert!(service.install().await.is_err());

        let hit = store.match_request("GET", "http://127.0.0.1:8080/").await.unwrap().unwrap();
        assert_eq!(hit.body, b"kept");
    }

    #[tokio::test]
    async fn test_install_twice_rejected() {
        let (_storage, service) = service(seeded_network(), "v1").await;
        service.install().await.unwrap();
        assert!(matches!(service.install().await, Err(Error::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_activate_requires_install() {
        let (_storage, service) = service(seeded_network(), "v1").await;
        assert!(matches!(service.activate().await, Err(Error::InvalidState(_))));
        assert_eq!(service.state(), WorkerState::Parsed);
    }

    #[tokio::test]
    async fn test_activate_evicts_old_generations() {
        let (storage, service) = service(seeded_network(), "v2").await;
        storage.open_store("monastery360-cache-v1").await.unwrap();
        storage.open_store("unrelated-cache").await.unwrap();

        service.install().await.unwrap();
        let evicted = service.activate().await.unwrap();

        assert_eq!(evicted, vec!["monastery360-cache-v1".to_string(), "unrelated-cache".to_string()]);
        assert_eq!(storage.store_names().await.unwrap(), vec!["monastery360-cache-v2".to_string()]);
        assert_eq!(service.state(), WorkerState::Running);
    }

    #[tokio::test]
    async fn test_activate_twice_is_idempotent() {
        let (storage, service) = service(seeded_network(), "v1").await;
        service.install().await.unwrap();
        service.activate().await.unwrap();

        let evicted = service.activate().await.unwrap();
        assert!(evicted.is_empty());
        assert_eq!(storage.store_names().await.unwrap(), vec!["monastery360-cache-v1".to_string()]);
        assert_eq!(service.store().len().await.unwrap(), 3);
        assert_eq!(service.state(), WorkerState::Running);
    }

    #[tokio::test]
    async fn test_not_running_passes_through() {
        let (_storage, service) = service(seeded_network(), "v1").await;
        service.install().await.unwrap();

        let decision = service.handle_fetch(Request::get(crate::testing::site("/logo.png"))).await.unwrap();
        assert!(matches!(decision, FetchDecision::Passthrough(BypassReason::NotControlling)));
    }

    #[tokio::test]
    async fn test_subscribe_sees_transitions() {
        let (_storage, service) = service(seeded_network(), "v1").await;
        let rx = service.subscribe();
        service.install().await.unwrap();
        service.activate().await.unwrap();
        assert_eq!(*rx.borrow(), WorkerState::Running);
    }

    #[tokio::test]
    async fn test_activate_records_active_store() {
        let (storage, service) = service(seeded_network(), "v1").await;
        service.install().await.unwrap();
        service.activate().await.unwrap();
        assert_eq!(storage.active_store().await.unwrap().as_deref(), Some("monastery360-cache-v1"));
    }

    #[tokio::test]
    async fn test_failed_activation_leaves_previous_generation() {
        let network = seeded_network();
        let (storage, v1) = service(network.clone(), "v1").await;
        v1.install().await.unwrap();
        v1.activate().await.unwrap();

        let v2 = OfflineCacheService::new(
            storage.clone(),
            network,
            ServiceConfig::new("monastery360-cache-v2", origin()),
        );
        v2.install().await.unwrap();
        // store vanishes between install and activate
        storage.delete_store("monastery360-cache-v2").await.unwrap();

        assert!(matches!(v2.activate().await, Err(Error::InvalidState(_))));
        assert_eq!(v2.state(), WorkerState::Redundant);
        assert_eq!(storage.store_names().await.unwrap(), vec!["monastery360-cache-v1".to_string()]);
        assert_eq!(storage.active_store().await.unwrap().as_deref(), Some("monastery360-cache-v1"));
        assert_eq!(v1.store().len().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_resume_takes_over_active_store_offline() {
        let network = seeded_network();
        let (storage, first) = service(network.clone(), "v1").await;
        first.install().await.unwrap();
        first.activate().await.unwrap();
        drop(first);

        network.set_online(false);
        let config = ServiceConfig::new("monastery360-cache-v1", origin());
        let resumed = OfflineCacheService::new(storage, network.clone(), config);
        resumed.resume().await.unwrap();

        assert_eq!(resumed.state(), WorkerState::Running);
        assert_eq!(network.calls_to("/"), 1);
        let decision = resumed.handle_fetch(Request::navigate(crate::testing::site("/"))).await.unwrap();
        assert_eq!(decision.intercepted().unwrap().response.body.as_ref(), b"<html>root</html>");
    }

    #[tokio::test]
    async fn test_resume_requires_recorded_store() {
        let (storage, service) = service(seeded_network(), "v2").await;
        storage.open_store("monastery360-cache-v2").await.unwrap();

        assert!(matches!(service.resume().await, Err(Error::InvalidState(_))));
        assert_eq!(service.state(), WorkerState::Parsed);
    }

    #[tokio::test]
    async fn test_store_handle_never_recreates_evicted_store() {
        let (storage, service) = service(seeded_network(), "v1").await;
        service.install().await.unwrap();
        storage.delete_store("monastery360-cache-v1").await.unwrap();

        assert_eq!(service.store().len().await.unwrap(), 0);
        assert!(!storage.has_store("monastery360-cache-v1").await.unwrap());
    }

    #[test]
    fn test_worker_state_display() {
        assert_eq!(WorkerState::Running.to_string(), "running");
        assert_eq!(WorkerState::Redundant.as_str(), "redundant");
    }
}
