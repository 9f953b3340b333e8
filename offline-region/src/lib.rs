//! Offline Region - pre-download map tiles for offline use
//!
//! Given a geographic bounding box and a maximum zoom level, this library
//! fetches every covering tile from a tile server so that a map renderer
//! sharing the same HTTP cache can later display the region without a
//! network connection.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use offline_region::coord::BoundingBox;
//! use offline_region::download::{DownloadOrchestrator, DownloaderConfig};
//! use offline_region::http::{DiskHttpCache, HttpClientConfig};
//! use offline_region::source::UrlTemplate;
//! use offline_region::CancellationToken;
//!
//! let store = Arc::new(DiskHttpCache::open(DiskHttpCache::default_directory().unwrap_or_default()).await?);
//! let source = Arc::new(UrlTemplate::openstreetmap());
//! let orchestrator = DownloadOrchestrator::with_http(
//!     source,
//!     &HttpClientConfig::default(),
//!     store,
//!     DownloaderConfig::default(),
//! )?;
//!
//! let bbox = BoundingBox::new(40.70, -74.02, 40.80, -73.93)?;
//! let summary = orchestrator.run(&bbox, 14, &CancellationToken::new()).await?;
//! println!("{summary}");
//! ```

pub mod coord;
pub mod download;
pub mod http;
pub mod logging;
pub mod source;

pub use tokio_util::sync::CancellationToken;
