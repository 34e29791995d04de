//! Shell Cache Core Business Logic
//!
//! This crate provides the core functionality for Shell Cache: request
//! classification, freshness, the namespaced cache store, the per-request
//! strategy executor and the install/activate lifecycle.

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod interceptor;
pub mod lifecycle;
pub mod request;
pub mod routing;

#[cfg(test)]
mod testing;

pub use cache::{CacheStore, FreshnessPolicy, StoredResponse};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CacheConfig, DEFAULT_DYNAMIC_PATTERNS, FETCHED_AT_HEADER};
pub use error::CoreError;
pub use interceptor::Interceptor;
pub use lifecycle::{ActivateReport, InstallReport, LifecycleManager, LifecycleState, PhaseGate};
pub use request::{InterceptedRequest, InterceptedResponse, RequestIdentity, ResponseSource};
pub use routing::{RequestClass, RequestClassifier, UrlPattern};
