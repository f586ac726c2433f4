//! Client code for the m360 offline cache.
//!
//! This crate provides the request model, the network seam and the offline
//! cache service with its registration, shared by the server binary.

pub mod fetch;
pub mod registration;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use fetch::{FetchConfig, HttpNetwork, HttpResponse, Network, Request, RequestMode};
pub use registration::Registration;
pub use worker::{
    BypassReason, FetchDecision, Intercepted, OfflineCacheService, RequestClassification, ResponseSource,
    Revalidation, ServiceConfig, WorkerState, classify,
};
