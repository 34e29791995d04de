//! Shell Cache Body Storage
//!
//! This crate provides content-addressed storage for cached response
//! bodies, with local disk and in-memory backends.

pub mod backend;
pub mod error;
pub mod local;
pub mod memory;

pub use backend::{StorageBackend, compute_sha256, validate_digest};
pub use error::StorageError;
pub use local::LocalStorage;
pub use memory::MemoryStorage;
