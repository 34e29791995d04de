//! Shell Cache Network Collaborator
//!
//! This crate provides the outbound side of the cache: the request and
//! response types exchanged with the network, the [`Fetcher`] seam, and a
//! reqwest-backed implementation.

pub mod client;
pub mod error;
pub mod exchange;

pub use client::{Fetcher, HttpFetcher, HttpFetcherConfig};
pub use error::ProxyError;
pub use exchange::{OutboundRequest, UpstreamResponse, strip_hop_by_hop};
