//! Coordinate conversion module
//!
//! Provides conversions between geographic coordinates (latitude/longitude)
//! and Web Mercator tile coordinates, and computes the rectangle of tiles
//! covering a bounding box at a given zoom level.

mod types;

pub use types::{
    BoundingBox, CoordError, TileCoord, TileRange, TileRangeIter, MAX_LAT, MAX_LON, MAX_ZOOM,
    MIN_LAT, MIN_LON, MIN_ZOOM,
};

use std::f64::consts::PI;

/// Converts geographic coordinates to tile coordinates.
///
/// # Arguments
///
/// * `lat` - Latitude in degrees (-85.05112878 to 85.05112878)
/// * `lon` - Longitude in degrees (-180.0 to 180.0)
/// * `zoom` - Zoom level (0 to 22)
///
/// Longitude 180 maps to the last column rather than wrapping past the edge.
#[inline]
pub fn to_tile_coords(lat: f64, lon: f64, zoom: u8) -> Result<TileCoord, CoordError> {
    if !(MIN_LAT..=MAX_LAT).contains(&lat) {
        return Err(CoordError::InvalidLatitude(lat));
    }
    if !(MIN_LON..=MAX_LON).contains(&lon) {
        return Err(CoordError::InvalidLongitude(lon));
    }
    if zoom > MAX_ZOOM {
        return Err(CoordError::InvalidZoom(zoom));
    }

    let n = 2.0_f64.powi(zoom as i32);
    let last = (1u64 << zoom) as u32 - 1;

    let x = ((lon + 180.0) / 360.0 * n) as u32;

    let lat_rad = lat * PI / 180.0;
    let y = ((1.0 - lat_rad.tan().asinh() / PI) / 2.0 * n) as u32;

    Ok(TileCoord {
        zoom,
        x: x.min(last),
        y: y.min(last),
    })
}

/// Computes the minimal tile rectangle covering `bbox` at `zoom`.
///
/// Latitudes beyond the Web Mercator limits are clamped. The north edge of
/// the box maps to `min_y`.
pub fn tile_range(bbox: &BoundingBox, zoom: u8) -> Result<TileRange, CoordError> {
    let north = bbox.max_lat().clamp(MIN_LAT, MAX_LAT);
    let south = bbox.min_lat().clamp(MIN_LAT, MAX_LAT);

    let north_west = to_tile_coords(north, bbox.min_lon(), zoom)?;
    let south_east = to_tile_coords(south, bbox.max_lon(), zoom)?;

    Ok(TileRange {
        zoom,
        min_x: north_west.x,
        max_x: south_east.x,
        min_y: north_west.y,
        max_y: south_east.y,
    })
}

/// Converts tile coordinates back to geographic coordinates.
///
/// Returns the latitude/longitude of the tile's northwest corner.
#[inline]
pub fn tile_to_lat_lon(tile: &TileCoord) -> (f64, f64) {
    let n = 2.0_f64.powi(tile.zoom as i32);

    let lon = tile.x as f64 / n * 360.0 - 180.0;

    let y = tile.y as f64 / n;
    let lat_rad = (PI * (1.0 - 2.0 * y)).sinh().atan();
    let lat = lat_rad * 180.0 / PI;

    (lat, lon)
}
