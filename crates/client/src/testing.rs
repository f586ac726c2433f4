//! In-process network double for service tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use m360_core::Error;
use reqwest::StatusCode;
use reqwest::header::{self, HeaderMap, HeaderValue};
use tokio::sync::Semaphore;
use url::Url;

use crate::fetch::{HttpResponse, Network, Request};

pub(crate) fn origin() -> Url {
    Url::parse("http://127.0.0.1:8080/").unwrap()
}

pub(crate) fn site(path: &str) -> Url {
    origin().join(path).unwrap()
}

/// Scripted responses keyed by path. Unscripted paths answer 404; offline
/// mode fails every fetch with `Error::Network`.
pub(crate) struct ScriptedNetwork {
    routes: Mutex<HashMap<String, (u16, Vec<u8>)>>,
    calls: Mutex<Vec<String>>,
    online: AtomicBool,
    gate: Mutex<Option<Arc<Semaphore>>>,
}

impl ScriptedNetwork {
    pub(crate) fn new() -> Self {
        Self {
            routes: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            online: AtomicBool::new(true),
            gate: Mutex::new(None),
        }
    }

    pub(crate) fn respond(&self, path: &str, status: u16, body: &[u8]) {
        self.routes
            .lock()
            .unwrap()
            .insert(path.to_string(), (status, body.to_vec()));
    }

    pub(crate) fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Hold every following fetch until a permit is added to the returned
    /// semaphore.
    pub(crate) fn hold(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    pub(crate) fn calls_to(&self, path: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|p| *p == path).count()
    }
}

#[async_trait]
impl Network for ScriptedNetwork {
    async fn fetch(&self, request: &Request) -> Result<HttpResponse, Error> {
        let path = request.url.path().to_string();
        self.calls.lock().unwrap().push(path.clone());

        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }

        if !self.online.load(Ordering::SeqCst) {
            return Err(Error::Network(format!("offline: {}", request.url)));
        }

        let (status, body) = self
            .routes
            .lock()
            .unwrap()
            .get(&path)
            .cloned()
            .unwrap_or((404, b"not found".to_vec()));

        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/octet-stream"));

        Ok(HttpResponse {
            url: request.url.clone(),
            status: StatusCode::from_u16(status).unwrap(),
            headers,
            body: Bytes::from(body),
            fetch_ms: 1,
        })
    }
}
