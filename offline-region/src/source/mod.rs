//! Tile sources: where tiles are fetched from.
//!
//! A [`TileSource`] turns a tile coordinate into a URL and declares the
//! deepest zoom level it serves. [`UrlTemplate`] covers the common
//! `{z}/{x}/{y}` style endpoints.
//!
//! # Example
//!
//! ```ignore
//! use offline_region::source::{TileSource, UrlTemplate};
//! use offline_region::coord::TileCoord;
//!
//! let source = UrlTemplate::new("osm", "https://tile.openstreetmap.org/{z}/{x}/{y}.png", 19)?;
//! assert_eq!(
//!     source.tile_url(&TileCoord::new(2, 1, 3)),
//!     "https://tile.openstreetmap.org/2/1/3.png"
//! );
//! ```

use thiserror::Error;

use crate::coord::{TileCoord, MAX_ZOOM};

/// Errors raised while configuring a tile source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// The template lacks one of the `{z}`, `{x}`, `{y}` placeholders.
    #[error("URL template '{template}' is missing the {placeholder} placeholder")]
    MissingPlaceholder {
        template: String,
        placeholder: &'static str,
    },

    /// The declared maximum zoom exceeds what the downloader supports.
    #[error("Maximum zoom {0} exceeds supported maximum {MAX_ZOOM}")]
    UnsupportedMaxZoom(u8),
}

/// Map source configuration consumed by the downloader.
pub trait TileSource: Send + Sync {
    /// Builds the request URL for a tile.
    fn tile_url(&self, tile: &TileCoord) -> String;

    /// Deepest zoom level served by this source.
    fn max_zoom(&self) -> u8;

    /// Name for logging and identification.
    fn name(&self) -> &str;
}

/// Tile source backed by a URL template with `{z}`, `{x}` and `{y}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlTemplate {
    name: String,
    template: String,
    max_zoom: u8,
}

impl UrlTemplate {
    /// Creates a template source.
    ///
    /// The template is not checked for URL validity here; a template that
    /// renders to an unparsable URL surfaces as a per-tile failure.
    pub fn new(
        name: impl Into<String>,
        template: impl Into<String>,
        max_zoom: u8,
    ) -> Result<Self, SourceError> {
        let template = template.into();

        for placeholder in ["{z}", "{x}", "{y}"] {
            if !template.contains(placeholder) {
                return Err(SourceError::MissingPlaceholder {
                    template,
                    placeholder,
                });
            }
        }
        if max_zoom > MAX_ZOOM {
            return Err(SourceError::UnsupportedMaxZoom(max_zoom));
        }

        Ok(Self {
            name: name.into(),
            template,
            max_zoom,
        })
    }

    /// OpenStreetMap standard raster tiles.
    pub fn openstreetmap() -> Self {
        Self {
            name: "OpenStreetMap".to_string(),
            template: "https://tile.openstreetmap.org/{z}/{x}/{y}.png".to_string(),
            max_zoom: 19,
        }
    }

    /// Esri World Imagery. Note the `{y}/{x}` ordering of this endpoint.
    pub fn arcgis_world_imagery() -> Self {
        Self {
            name: "ArcGIS".to_string(),
            template:
                "https://server.arcgisonline.com/ArcGIS/rest/services/World_Imagery/MapServer/tile/{z}/{y}/{x}"
                    .to_string(),
            max_zoom: 19,
        }
    }

    pub fn template(&self) -> &str {
        &self.template
    }
}

impl TileSource for UrlTemplate {
    fn tile_url(&self, tile: &TileCoord) -> String {
        self.template
            .replace("{z}", &tile.zoom.to_string())
            .replace("{x}", &tile.x.to_string())
            .replace("{y}", &tile.y.to_string())
    }

    fn max_zoom(&self) -> u8 {
        self.max_zoom
    }

    fn name(&self) -> &str {
        &self.name
    }
}
