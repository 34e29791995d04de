//! Cache store and freshness policy

mod freshness;
mod store;

pub use freshness::{FreshnessPolicy, entry_age};
pub use store::{CacheStore, StoredResponse};
