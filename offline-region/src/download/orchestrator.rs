//! Region download orchestration.
//!
//! Walks zoom levels from the most detailed down to zero. Within a level,
//! tiles are enumerated lazily and dispatched through a sliding window of
//! at most `max_concurrent_fetches` in-flight fetches; a level completes
//! (every fetch settled) before the next one starts.

use std::sync::Arc;
use std::time::Instant;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::config::DownloaderConfig;
use super::fetcher::TileFetcher;
use super::outcome::{DownloadError, DownloadOutcome};
use super::stats::{DownloadSummary, StatsAggregator};
use crate::coord::{tile_range, BoundingBox, TileCoord, TileRange, MAX_ZOOM};
use crate::http::{CachingHttpClient, HttpCacheStore, HttpClientConfig, HttpTransport};
use crate::source::TileSource;

/// Reported after every settled fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadProgress {
    pub tile: TileCoord,
    pub outcome: DownloadOutcome,
    /// Fetches settled so far in this run, this one included.
    pub tiles_settled: u64,
}

/// Callback invoked on the coordinating task for each settled fetch.
pub type ProgressCallback = Box<dyn Fn(&DownloadProgress) + Send + Sync>;

/// Downloads every tile of a bounding box for a range of zoom levels.
pub struct DownloadOrchestrator<T: HttpTransport> {
    fetcher: TileFetcher<T>,
    config: DownloaderConfig,
    on_progress: Option<ProgressCallback>,
}

impl DownloadOrchestrator<CachingHttpClient> {
    /// Builds an orchestrator over a reqwest client backed by `store`.
    pub fn with_http(
        source: Arc<dyn TileSource>,
        http: &HttpClientConfig,
        store: Arc<dyn HttpCacheStore>,
        config: DownloaderConfig,
    ) -> Result<Self, DownloadError> {
        let transport = CachingHttpClient::new(http, store)?;
        Ok(Self::new(transport, source, config))
    }
}

impl<T: HttpTransport> DownloadOrchestrator<T> {
    /// Creates an orchestrator fetching from `source` through `transport`.
    ///
    /// # Arguments
    ///
    /// * `transport` - HTTP transport, usually a [`CachingHttpClient`]
    /// * `source` - Tile source producing URLs and the default max zoom
    /// * `config` - Concurrency bound and request cache directives
    pub fn new(transport: T, source: Arc<dyn TileSource>, config: DownloaderConfig) -> Self {
        let fetcher =
            TileFetcher::new(transport, source).with_cache_control(config.cache_control.clone());
        Self {
            fetcher,
            config,
            on_progress: None,
        }
    }

    /// Registers a callback run after every settled fetch.
    ///
    /// The callback runs on the task driving [`run`](Self::run), so it must
    /// not block. Cancelling the run's token from inside it is supported.
    pub fn with_progress(
        mut self,
        callback: impl Fn(&DownloadProgress) + Send + Sync + 'static,
    ) -> Self {
        self.on_progress = Some(Box::new(callback));
        self
    }

    /// Returns the downloader configuration.
    pub fn config(&self) -> &DownloaderConfig {
        &self.config
    }

    /// Returns the per-tile fetcher.
    pub fn fetcher(&self) -> &TileFetcher<T> {
        &self.fetcher
    }

    /// Downloads `bbox` up to the tile source's maximum zoom.
    pub async fn download(
        &self,
        bbox: &BoundingBox,
        cancellation: &CancellationToken,
    ) -> Result<DownloadSummary, DownloadError> {
        let zoom_max = self.fetcher.source().max_zoom();
        self.run(bbox, zoom_max, cancellation).await
    }

    /// Downloads every tile intersecting `bbox` for zoom `zoom_max` down to 0.
    ///
    /// # Arguments
    ///
    /// * `bbox` - Region to download
    /// * `zoom_max` - Most detailed zoom level, fetched first
    /// * `cancellation` - Stops new dispatches and aborts in-flight fetches
    ///
    /// # Returns
    ///
    /// Statistics for every fetch that was dispatched, with the wall-clock
    /// time measured from the start of the call.
    ///
    /// Individual tile failures never abort the run; they are counted in the
    /// summary. Cancellation stops new dispatches and aborts in-flight
    /// fetches, after which the partial summary is returned.
    ///
    /// # Errors
    ///
    /// Fails only before any tile is dispatched: when `zoom_max` exceeds
    /// [`MAX_ZOOM`] or the bounding box cannot be mapped to tiles.
    pub async fn run(
        &self,
        bbox: &BoundingBox,
        zoom_max: u8,
        cancellation: &CancellationToken,
    ) -> Result<DownloadSummary, DownloadError> {
        let started = Instant::now();

        if zoom_max > MAX_ZOOM {
            return Err(DownloadError::InvalidZoom {
                requested: zoom_max,
                max: MAX_ZOOM,
            });
        }

        let ranges = (0..=zoom_max)
            .rev()
            .map(|zoom| tile_range(bbox, zoom))
            .collect::<Result<Vec<_>, _>>()?;

        debug!(
            source = self.fetcher.source().name(),
            zoom_max,
            max_concurrent = self.config.max_concurrent_fetches,
            "Starting region download"
        );

        let stats = StatsAggregator::new();

        for range in ranges {
            if cancellation.is_cancelled() {
                debug!(zoom = range.zoom, "Download cancelled before zoom level");
                break;
            }
            self.download_level(range, &stats, cancellation).await;
        }

        let summary = stats.snapshot(started.elapsed());
        if summary.tiles_failed > 0 {
            info!(
                tiles_attempted = summary.tiles_attempted,
                tiles_failed = summary.tiles_failed,
                tiles_cancelled = summary.tiles_cancelled,
                bytes_downloaded = summary.bytes_downloaded,
                bytes_from_cache = summary.bytes_from_cache,
                elapsed_ms = summary.elapsed_millis(),
                "Region download finished, {} tiles failed",
                summary.tiles_failed
            );
        } else {
            info!(
                tiles_attempted = summary.tiles_attempted,
                bytes_downloaded = summary.bytes_downloaded,
                bytes_from_cache = summary.bytes_from_cache,
                elapsed_ms = summary.elapsed_millis(),
                "Region download finished"
            );
        }

        Ok(summary)
    }

    /// Fetches one zoom level and returns once every dispatched fetch settled.
    async fn download_level(
        &self,
        range: TileRange,
        stats: &StatsAggregator,
        cancellation: &CancellationToken,
    ) {
        debug!(zoom = range.zoom, tiles = range.len(), "Starting zoom level");

        let window = self.config.max_concurrent_fetches.max(1);
        let mut tiles = range.iter();
        let mut pending = FuturesUnordered::new();

        loop {
            // Top up the window; checked right before every dispatch
            while pending.len() < window && !cancellation.is_cancelled() {
                let Some(tile) = tiles.next() else {
                    break;
                };
                pending.push(async move { (tile, self.fetcher.fetch(tile, cancellation).await) });
            }

            let Some((tile, outcome)) = pending.next().await else {
                break;
            };
            self.settle(tile, outcome, stats);
        }

        debug!(zoom = range.zoom, settled = stats.settled(), "Zoom level settled");
    }

    fn settle(&self, tile: TileCoord, outcome: DownloadOutcome, stats: &StatsAggregator) {
        stats.record(&outcome);

        match &outcome {
            DownloadOutcome::Success {
                from_cache,
                byte_size,
            } => info!(
                zoom = tile.zoom,
                x = tile.x,
                y = tile.y,
                from_cache,
                bytes = byte_size,
                "Tile complete"
            ),
            DownloadOutcome::Failure { reason } => info!(
                zoom = tile.zoom,
                x = tile.x,
                y = tile.y,
                reason = %reason,
                "Tile failed"
            ),
        }

        if let Some(callback) = &self.on_progress {
            callback(&DownloadProgress {
                tile,
                outcome,
                tiles_settled: stats.settled(),
            });
        }
    }
}
