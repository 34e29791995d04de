//! Shell Cache Database Layer
//!
//! This crate provides the metadata index for Shell Cache: cache namespaces
//! and the entries inside them, stored in SQLite via sqlx.

pub mod error;
pub mod models;
pub mod repository;
pub mod utils;

pub use error::DbError;
pub use models::*;
pub use repository::Database;

/// Re-export sqlx types for convenience
pub use sqlx::SqlitePool;
