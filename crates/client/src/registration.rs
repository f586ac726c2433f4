//! Version registration: install a new worker, activate it and hand it
//! control, while the previous worker keeps serving until that succeeds.
//!
//! The active store name is persisted by activation, so a fresh process
//! picks the last activated generation back up before touching the network.

use std::sync::Arc;

use m360_core::{CacheStorage, Error};
use tokio::sync::{Mutex, RwLock};

use crate::fetch::{Network, Request};
use crate::worker::{BypassReason, FetchDecision, OfflineCacheService, ServiceConfig};

/// Registration for one site origin.
pub struct Registration {
    storage: CacheStorage,
    network: Arc<dyn Network>,
    controller: RwLock<Option<Arc<OfflineCacheService>>>,
    updating: Mutex<()>,
}

impl Registration {
    pub fn new(storage: CacheStorage, network: Arc<dyn Network>) -> Self {
        Self { storage, network, controller: RwLock::new(None), updating: Mutex::new(()) }
    }

    /// The worker currently intercepting requests, if any.
    pub async fn controller(&self) -> Option<Arc<OfflineCacheService>> {
        self.controller.read().await.clone()
    }

    /// Store name of the controlling worker.
    pub async fn active_version(&self) -> Option<String> {
        self.controller().await.map(|w| w.version().to_string())
    }

    /// Register a worker version.
    ///
    /// Without a controller, the store recorded as active on disk is adopted
    /// first. Re-registering the controlling version is then a no-op. A new
    /// version is installed, activated and then claims control immediately.
    /// If install or activation fails the previous controller stays in place.
    pub async fn register(&self, config: ServiceConfig) -> Result<Arc<OfflineCacheService>, Error> {
        let _updating = self.updating.lock().await;

        if self.controller().await.is_none() {
            self.resume_saved(&config).await;
        }

        if let Some(active) = self.controller().await
            && active.version() == config.store_name
        {
            tracing::debug!(store = %config.store_name, "version already active");
            return Ok(active);
        }

        let worker = Arc::new(OfflineCacheService::new(self.storage.clone(), Arc::clone(&self.network), config));

        worker.install().await?;
        let evicted = worker.activate().await?;

        let previous = self.controller.write().await.replace(Arc::clone(&worker));
        if let Some(previous) = previous {
            previous.retire();
        }

        tracing::info!(store = %worker.version(), evicted = evicted.len(), "worker claimed control");
        Ok(worker)
    }

    /// Adopt the store a previous process activated as the controller.
    ///
    /// It serves with the new configuration's origin and fallback; only the
    /// store name is carried over.
    async fn resume_saved(&self, config: &ServiceConfig) {
        let saved = match self.storage.active_store().await {
            Ok(Some(saved)) => saved,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(error = %e, "could not read active cache store");
                return;
            }
        };

        let resumed = ServiceConfig { store_name: saved, ..config.clone() };
        let worker = Arc::new(OfflineCacheService::new(self.storage.clone(), Arc::clone(&self.network), resumed));
        match worker.resume().await {
            Ok(()) => {
                tracing::info!(store = %worker.version(), "resumed saved cache store");
                *self.controller.write().await = Some(worker);
            }
            Err(e) => tracing::warn!(store = %worker.version(), error = %e, "could not resume saved cache store"),
        }
    }

    /// Route a request through the controlling worker.
    pub async fn handle_fetch(&self, request: Request) -> Result<FetchDecision, Error> {
        match self.controller().await {
            Some(worker) => worker.handle_fetch(request).await,
            None => Ok(FetchDecision::Passthrough(BypassReason::NotControlling)),
        }
    }
}
