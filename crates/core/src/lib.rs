//! Core types and shared functionality for the m360 offline cache.
//!
//! This crate provides:
//! - Versioned cache storage with SQLite backend
//! - Unified error types
//! - Layered configuration

pub mod cache;
pub mod config;
pub mod error;

pub use cache::{CacheStorage, CacheStore, StoredResponse};
pub use config::{AppConfig, ConfigError};
pub use error::Error;
