//! HTTP transport with a client-side response cache.

use std::future::Future;
use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;
use reqwest::header::{
    HeaderMap, CACHE_CONTROL, ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED,
};
use reqwest::{StatusCode, Url};
use thiserror::Error;
use tracing::{debug, trace, warn};

use super::cache_control::{CacheControl, RequestCacheControl};
use super::config::HttpClientConfig;
use super::store::{CachedResponse, HttpCacheStore};

/// Errors from a single HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The HTTP client could not be constructed.
    #[error("Failed to create HTTP client: {0}")]
    Build(String),

    /// Could not connect to the server (DNS, TCP, TLS).
    #[error("Connection to {url} failed: {reason}")]
    Connect { url: String, reason: String },

    /// The request exceeded the configured timeout.
    #[error("Request to {url} timed out")]
    Timeout { url: String },

    /// Any other failure while sending the request.
    #[error("Request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    /// The response body could not be read in full.
    #[error("Failed to read response body from {url}: {reason}")]
    Body { url: String, reason: String },
}

impl TransportError {
    fn from_reqwest(url: &str, error: reqwest::Error) -> Self {
        if error.is_timeout() {
            TransportError::Timeout {
                url: url.to_string(),
            }
        } else if error.is_connect() {
            TransportError::Connect {
                url: url.to_string(),
                reason: error.to_string(),
            }
        } else {
            TransportError::Request {
                url: url.to_string(),
                reason: error.to_string(),
            }
        }
    }
}

/// Where a response was satisfied from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    /// Served from the local store without a network round trip.
    Cache,
    /// Server answered `304 Not Modified`; body came from the local store.
    Revalidated,
    /// Full response from the network.
    Network,
}

impl ResponseSource {
    pub fn is_from_cache(self) -> bool {
        !matches!(self, ResponseSource::Network)
    }
}

/// A fully-read HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Bytes,
    pub source: ResponseSource,
}

/// Trait for the HTTP transport used by the tile fetcher.
///
/// Implementations own caching and connection management. The returned
/// future may be dropped at any point to abort the exchange.
pub trait HttpTransport: Send + Sync {
    /// Performs a GET, consuming the full response body.
    fn get(
        &self,
        url: &Url,
        directives: &RequestCacheControl,
    ) -> impl Future<Output = Result<TransportResponse, TransportError>> + Send;
}

/// reqwest-based transport backed by an [`HttpCacheStore`].
///
/// Cache keys are the exact request URL strings.
#[derive(Clone)]
pub struct CachingHttpClient {
    client: reqwest::Client,
    store: Arc<dyn HttpCacheStore>,
}

impl CachingHttpClient {
    /// Creates a client using `store` for cached responses.
    pub fn new(
        config: &HttpClientConfig,
        store: Arc<dyn HttpCacheStore>,
    ) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent())
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .tcp_nodelay(true)
            .build()
            .map_err(|e| TransportError::Build(e.to_string()))?;

        Ok(Self { client, store })
    }

    async fn lookup(&self, key: &str) -> Option<CachedResponse> {
        match self.store.get(key).await {
            Ok(entry) => entry,
            Err(e) => {
                warn!(url = key, error = %e, "HTTP cache lookup failed");
                None
            }
        }
    }

    async fn store_quietly(&self, key: &str, response: CachedResponse) {
        if let Err(e) = self.store.put(key, response).await {
            warn!(url = key, error = %e, "Failed to write HTTP cache entry");
        }
    }
}

fn header_string(headers: &HeaderMap, name: reqwest::header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

impl HttpTransport for CachingHttpClient {
    async fn get(
        &self,
        url: &Url,
        directives: &RequestCacheControl,
    ) -> Result<TransportResponse, TransportError> {
        let key = url.as_str();
        let cached = self.lookup(key).await;

        if let Some(entry) = &cached {
            let now = SystemTime::now();
            let servable = !directives.no_cache
                && (entry.is_fresh(now)
                    || directives
                        .max_stale
                        .is_some_and(|max_stale| entry.is_within_max_stale(now, max_stale)));

            if servable {
                trace!(url = key, bytes = entry.body.len(), "Served from HTTP cache");
                return Ok(TransportResponse {
                    status: StatusCode::OK.as_u16(),
                    body: entry.body.clone(),
                    source: ResponseSource::Cache,
                });
            }
        }

        let mut request = self.client.get(url.clone());
        if let Some(value) = directives.header_value() {
            request = request.header(CACHE_CONTROL, value);
        }
        if let Some(entry) = cached.as_ref().filter(|entry| entry.has_validators()) {
            trace!(url = key, "Revalidating stale HTTP cache entry");
            if let Some(etag) = &entry.etag {
                request = request.header(IF_NONE_MATCH, etag.as_str());
            }
            if let Some(last_modified) = &entry.last_modified {
                request = request.header(IF_MODIFIED_SINCE, last_modified.as_str());
            }
        }

        let response = request
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(key, e))?;

        let status = response.status();
        let headers = response.headers().clone();
        debug!(url = key, status = status.as_u16(), "HTTP response received");

        let body = response.bytes().await.map_err(|e| TransportError::Body {
            url: key.to_string(),
            reason: e.to_string(),
        })?;

        let control = headers
            .get(CACHE_CONTROL)
            .and_then(|v| v.to_str().ok())
            .map(CacheControl::parse);
        let etag = header_string(&headers, ETAG);
        let last_modified = header_string(&headers, LAST_MODIFIED);

        if status == StatusCode::NOT_MODIFIED {
            if let Some(entry) = cached {
                let refreshed = CachedResponse {
                    body: entry.body,
                    etag: etag.or(entry.etag),
                    last_modified: last_modified.or(entry.last_modified),
                    control: control.unwrap_or(entry.control),
                    stored_at: SystemTime::now(),
                };
                let body = refreshed.body.clone();
                self.store_quietly(key, refreshed).await;

                return Ok(TransportResponse {
                    status: StatusCode::OK.as_u16(),
                    body,
                    source: ResponseSource::Revalidated,
                });
            }
        }

        if status.is_success() {
            let control = control.unwrap_or_default();
            if control.is_storable() {
                let entry = CachedResponse {
                    body: body.clone(),
                    etag,
                    last_modified,
                    control,
                    stored_at: SystemTime::now(),
                };
                self.store_quietly(key, entry).await;
            }
        }

        Ok(TransportResponse {
            status: status.as_u16(),
            body,
            source: ResponseSource::Network,
        })
    }
}
