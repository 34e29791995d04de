//! Request routing: URL patterns and the request classifier

mod classifier;
mod pattern;

pub use classifier::{RequestClass, RequestClassifier};
pub use pattern::{UrlPattern, match_target};
