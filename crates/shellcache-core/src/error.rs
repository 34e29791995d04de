//! Core error types

use thiserror::Error;

use crate::lifecycle::LifecycleState;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Database error: {0}")]
    Database(#[from] shellcache_db::DbError),

    #[error("Storage error: {0}")]
    Storage(#[from] shellcache_storage::StorageError),

    #[error("Shell installation failed for {} resource(s): {}", failures.len(), failures.join("; "))]
    InstallPopulation { failures: Vec<String> },

    #[error("Invalid lifecycle transition: {from} -> {to}")]
    InvalidTransition {
        from: LifecycleState,
        to: LifecycleState,
    },

    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
