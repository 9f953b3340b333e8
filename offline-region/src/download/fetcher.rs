//! Single-tile fetch with cooperative cancellation.

use std::sync::Arc;

use reqwest::Url;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::outcome::{DownloadOutcome, FetchError};
use crate::coord::TileCoord;
use crate::http::{HttpTransport, RequestCacheControl};
use crate::source::TileSource;

/// Appended to every tile URL.
///
/// The on-device renderer requests tiles with this trailing marker, and the
/// HTTP cache is keyed by the exact URL string, so both sides must produce
/// byte-identical URLs to share cache entries.
pub const CACHE_KEY_MARKER: char = '?';

/// Fetches one tile through the HTTP transport and classifies the result.
pub struct TileFetcher<T: HttpTransport> {
    transport: T,
    source: Arc<dyn TileSource>,
    cache_control: RequestCacheControl,
}

impl<T: HttpTransport> TileFetcher<T> {
    /// Creates a fetcher with no request cache directives.
    pub fn new(transport: T, source: Arc<dyn TileSource>) -> Self {
        Self {
            transport,
            source,
            cache_control: RequestCacheControl::default(),
        }
    }

    /// Sets the cache directives sent with every tile request.
    pub fn with_cache_control(mut self, cache_control: RequestCacheControl) -> Self {
        self.cache_control = cache_control;
        self
    }

    /// Returns the tile source URLs are built from.
    pub fn source(&self) -> &dyn TileSource {
        self.source.as_ref()
    }

    /// The exact URL requested for `tile`, marker included.
    pub fn tile_url(&self, tile: &TileCoord) -> String {
        let mut url = self.source.tile_url(tile);
        url.push(CACHE_KEY_MARKER);
        url
    }

    /// Fetches `tile`. Never fails: every problem becomes a `Failure` outcome.
    ///
    /// If `cancellation` fires while the request is in flight, the request
    /// future is dropped (closing the connection) and the fetch resolves to
    /// [`FetchError::Cancelled`]. When cancellation and a response are both
    /// ready, cancellation wins.
    pub async fn fetch(&self, tile: TileCoord, cancellation: &CancellationToken) -> DownloadOutcome {
        let raw_url = self.tile_url(&tile);
        let url = match Url::parse(&raw_url) {
            Ok(url) => url,
            Err(e) => {
                warn!(
                    zoom = tile.zoom,
                    x = tile.x,
                    y = tile.y,
                    url = %raw_url,
                    error = %e,
                    "Tile source produced an invalid URL"
                );
                return DownloadOutcome::Failure {
                    reason: FetchError::InvalidUrl {
                        url: raw_url,
                        reason: e.to_string(),
                    },
                };
            }
        };

        let result = tokio::select! {
            biased;

            _ = cancellation.cancelled() => {
                debug!(zoom = tile.zoom, x = tile.x, y = tile.y, "Tile fetch aborted");
                return DownloadOutcome::Failure {
                    reason: FetchError::Cancelled,
                };
            }

            result = self.transport.get(&url, &self.cache_control) => result,
        };

        match result {
            Ok(response) => {
                let from_cache = response.source.is_from_cache();
                trace!(
                    zoom = tile.zoom,
                    x = tile.x,
                    y = tile.y,
                    status = response.status,
                    bytes = response.body.len(),
                    "Tile fetched ({})",
                    if from_cache { "cache hit" } else { "cache miss" }
                );
                DownloadOutcome::Success {
                    from_cache,
                    byte_size: response.body.len() as u64,
                }
            }
            Err(e) => {
                warn!(
                    zoom = tile.zoom,
                    x = tile.x,
                    y = tile.y,
                    error = %e,
                    "Tile download failed"
                );
                DownloadOutcome::Failure {
                    reason: FetchError::Network(e),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{network_response, MockTransport, ResponseSource, TransportError};
    use crate::source::UrlTemplate;
    use std::time::Duration;

    fn source() -> Arc<dyn TileSource> {
        Arc::new(UrlTemplate::new("test", "http://tiles.test/{z}/{x}/{y}", 4).unwrap())
    }

    #[tokio::test]
    async fn test_appends_marker() {
        let mock = MockTransport::serving(1000);
        let fetcher = TileFetcher::new(mock.clone(), source());

        let outcome = fetcher
            .fetch(TileCoord::new(1, 0, 1), &CancellationToken::new())
            .await;

        assert_eq!(
            outcome,
            DownloadOutcome::Success {
                from_cache: false,
                byte_size: 1000
            }
        );
        assert_eq!(mock.requests(), vec!["http://tiles.test/1/0/1?".to_string()]);
    }

    #[tokio::test]
    async fn test_cache_source_reported() {
        let mock = MockTransport::new(|_| {
            let mut response = network_response(64);
            response.source = ResponseSource::Revalidated;
            Some(Ok(response))
        });
        let fetcher = TileFetcher::new(mock, source());

        let outcome = fetcher
            .fetch(TileCoord::new(0, 0, 0), &CancellationToken::new())
            .await;
        assert_eq!(
            outcome,
            DownloadOutcome::Success {
                from_cache: true,
                byte_size: 64
            }
        );
    }

    #[tokio::test]
    async fn test_error_status_is_still_a_response() {
        let mock = MockTransport::new(|_| {
            let mut response = network_response(12);
            response.status = 404;
            Some(Ok(response))
        });
        let fetcher = TileFetcher::new(mock, source());

        let outcome = fetcher
            .fetch(TileCoord::new(0, 0, 0), &CancellationToken::new())
            .await;
        assert!(outcome.is_success());
    }

    #[tokio::test]
    async fn test_invalid_url_skips_network() {
        let mock = MockTransport::serving(10);
        let bad: Arc<dyn TileSource> =
            Arc::new(UrlTemplate::new("bad", "not a url/{z}/{x}/{y}", 4).unwrap());
        let fetcher = TileFetcher::new(mock.clone(), bad);

        let outcome = fetcher
            .fetch(TileCoord::new(2, 1, 1), &CancellationToken::new())
            .await;

        assert!(matches!(
            outcome,
            DownloadOutcome::Failure {
                reason: FetchError::InvalidUrl { .. }
            }
        ));
        assert!(mock.requests().is_empty());
    }

    #[tokio::test]
    async fn test_network_failure() {
        let mock = MockTransport::new(|url| {
            Some(Err(TransportError::Connect {
                url: url.to_string(),
                reason: "connection refused".to_string(),
            }))
        });
        let fetcher = TileFetcher::new(mock, source());

        let outcome = fetcher
            .fetch(TileCoord::new(0, 0, 0), &CancellationToken::new())
            .await;

        match outcome {
            DownloadOutcome::Failure {
                reason: FetchError::Network(TransportError::Connect { reason, .. }),
            } => assert_eq!(reason, "connection refused"),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cancel_aborts_in_flight_request() {
        let mock = MockTransport::new(|_| None);
        let fetcher = TileFetcher::new(mock.clone(), source());
        let cancellation = CancellationToken::new();

        let trigger = cancellation.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            fetcher.fetch(TileCoord::new(3, 2, 1), &cancellation),
        )
        .await
        .expect("fetch must not hang after cancellation");

        assert_eq!(
            outcome,
            DownloadOutcome::Failure {
                reason: FetchError::Cancelled
            }
        );
        assert_eq!(mock.requests().len(), 1);
        assert_eq!(mock.peak_in_flight(), 1);
    }

    #[tokio::test]
    async fn test_cancellation_wins_a_tie() {
        let mock = MockTransport::serving(10);
        let fetcher = TileFetcher::new(mock.clone(), source());
        let cancellation = CancellationToken::new();
        cancellation.cancel();

        let outcome = fetcher.fetch(TileCoord::new(0, 0, 0), &cancellation).await;
        assert_eq!(
            outcome,
            DownloadOutcome::Failure {
                reason: FetchError::Cancelled
            }
        );
        // Biased select never polls the request
        assert!(mock.requests().is_empty());
    }
}
