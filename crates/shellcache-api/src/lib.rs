//! Shell Cache HTTP API
//!
//! This crate provides the Axum-based HTTP surface for Shell Cache: the
//! interception point every proxied request passes through, plus a few
//! administrative endpoints under `/_shellcache`.

pub mod error;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::create_router;
pub use state::{AppState, MetricsHandle};
