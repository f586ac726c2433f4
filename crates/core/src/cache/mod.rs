//! SQLite-backed storage for versioned response caches.
//!
//! This module provides named cache stores (one per cache generation) using
//! SQLite with async access via tokio-rusqlite. It supports:
//!
//! - Request-keyed entries (SHA-256 over method and URL), GET only
//! - Atomic multi-entry writes for seeding
//! - Whole-store eviction when a generation is superseded
//! - Automatic schema migrations and WAL mode for concurrent access

pub mod connection;
pub mod entries;
pub mod hash;
pub mod migrations;
pub mod stores;

pub use crate::Error;

pub use connection::CacheStorage;
pub use entries::{CacheStore, StoredResponse};
