//! Request key generation.

use sha2::{Digest, Sha256};

/// Compute the store key for a request: SHA-256 over method and URL.
///
/// The method is upper-cased so `get` and `GET` share a key. Fragments
/// never reach the network and are dropped.
pub fn compute_request_key(method: &str, url: &str) -> String {
    let url = url.split_once('#').map_or(url, |(base, _)| base);
    let mut hasher = Sha256::new();
    hasher.update(method.to_ascii_uppercase().as_bytes());
    hasher.update(b"\n");
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}
