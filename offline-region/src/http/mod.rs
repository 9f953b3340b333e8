//! HTTP transport with a client-side response cache.
//!
//! The downloader talks to tile servers through the [`HttpTransport`] trait.
//! [`CachingHttpClient`] is the production implementation: a reqwest client
//! that consults an [`HttpCacheStore`] before going to the network, sends
//! conditional requests for stale entries, and labels every response with
//! its [`ResponseSource`].
//!
//! # Architecture
//!
//! ```text
//! TileFetcher ──► HttpTransport ──► CachingHttpClient ──► reqwest
//!                                          │
//!                                          └──► HttpCacheStore
//!                                                 ├── MemoryHttpCache (moka)
//!                                                 └── DiskHttpCache (files)
//! ```

mod cache_control;
mod client;
mod config;
mod store;

pub use cache_control::{CacheControl, RequestCacheControl};
pub use client::{
    CachingHttpClient, HttpTransport, ResponseSource, TransportError, TransportResponse,
};
pub use config::{HttpClientConfig, TRANSPORT_VERSION};
pub use store::{
    BoxFuture, CachedResponse, DiskHttpCache, HttpCacheError, HttpCacheStore, MemoryHttpCache,
};

#[cfg(test)]
pub use client::tests::{network_response, tile_of, MockTransport};
