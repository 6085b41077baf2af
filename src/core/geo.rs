use crate::core::constants::{
    GRID_TILES, MAP_SIZE, MAX_LATITUDE, MAX_TILE_LATITUDE, PIXEL_EPSILON, SHARD_SIZE, TILE_SIZE,
    VERTICAL_OVERSHOOT,
};
use crate::ArchiveError;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

/// Represents a geographical coordinate with latitude and longitude
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    /// Creates a new LatLng coordinate
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Clamps latitude to the Web Mercator range
    pub fn clamp_lat(lat: f64) -> f64 {
        lat.clamp(-MAX_LATITUDE, MAX_LATITUDE)
    }
}

impl Default for LatLng {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

/// A point in the flat global pixel space (0..MAP_SIZE on both axes, x may
/// leave that range when a view wraps around the antimeridian).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GlobalPixel {
    pub x: f64,
    pub y: f64,
}

impl GlobalPixel {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Normalized identity of a tile: `x` reduced into [0, 2048), `y` in [0, 2048).
///
/// Every cache lookup goes through this type, so unnormalized coordinates
/// coming from wrapped viewports can never leak into cache state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileKey {
    pub x: u32,
    pub y: u32,
}

impl TileKey {
    /// Normalize an arbitrary tile coordinate. Returns `None` when `y` is
    /// outside the grid, since there is no vertical wraparound.
    pub fn new(x: i64, y: i64) -> Option<Self> {
        if !(0..GRID_TILES).contains(&y) {
            return None;
        }
        Some(Self {
            x: normalize_tile_x(x),
            y: y as u32,
        })
    }

    /// Shard directory indices used for the on-disk layout.
    pub fn shard(&self) -> (u32, u32) {
        (self.x / SHARD_SIZE, self.y / SHARD_SIZE)
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.x, self.y)
    }
}

impl FromStr for TileKey {
    type Err = ArchiveError;

    /// Parses the `"{x}-{y}"` key format of the tile-cache document.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ArchiveError::InvalidCoordinates(format!("malformed tile key '{}'", s));
        // x may be negative in hand-edited documents, so split on the last dash
        let (x, y) = s.rsplit_once('-').ok_or_else(invalid)?;
        let x: i64 = x.parse().map_err(|_| invalid())?;
        let y: i64 = y.parse().map_err(|_| invalid())?;
        TileKey::new(x, y).ok_or_else(invalid)
    }
}

/// A (tile, pixel) address. Tile coordinates are kept verbatim (they may be
/// unnormalized on the X axis); pixel offsets are always in [0, 1000).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelAddress {
    pub tile_x: i64,
    pub tile_y: i64,
    pub pixel_x: u32,
    pub pixel_y: u32,
}

impl PixelAddress {
    pub fn new(tile_x: i64, tile_y: i64, pixel_x: u32, pixel_y: u32) -> Self {
        Self {
            tile_x,
            tile_y,
            pixel_x,
            pixel_y,
        }
    }

    /// The normalized tile this pixel lives in.
    pub fn tile_key(&self) -> Option<TileKey> {
        TileKey::new(self.tile_x, self.tile_y)
    }

    pub fn global_pixel(&self) -> GlobalPixel {
        tile_to_global_pixel(self.tile_x, self.tile_y, self.pixel_x, self.pixel_y)
    }

    pub fn to_lat_lng(&self) -> LatLng {
        global_pixel_to_lat_lng(self.global_pixel())
    }
}

/// Forward spherical Web Mercator scaled so the world spans `MAP_SIZE` pixels.
pub fn lat_lng_to_global_pixel(lat: f64, lng: f64) -> GlobalPixel {
    let lat = LatLng::clamp_lat(lat);
    let lat_rad = lat.to_radians();
    let lng_rad = lng.to_radians();

    let x = (lng_rad + PI) / (2.0 * PI) * MAP_SIZE;

    let mercator_y = (lat_rad.tan() + 1.0 / lat_rad.cos()).ln();
    if !mercator_y.is_finite() {
        // exact pole
        return GlobalPixel::new(x, if lat > 0.0 { 0.0 } else { MAP_SIZE });
    }

    let y = (1.0 - mercator_y / PI) / 2.0 * MAP_SIZE;
    GlobalPixel::new(x, y)
}

/// Split a global pixel into its tile and in-tile offset. `None` when the
/// point is above or below the grid.
pub fn global_pixel_to_tile(point: GlobalPixel) -> Option<PixelAddress> {
    if !point.is_finite() {
        return None;
    }

    let x = snap_to_boundary(point.x);
    let y = snap_to_boundary(point.y);
    let tile = TILE_SIZE as f64;

    let tile_x = (x / tile).floor() as i64;
    let tile_y = (y / tile).floor() as i64;
    if !(0..GRID_TILES).contains(&tile_y) {
        return None;
    }

    let pixel_x = ((x - tile_x as f64 * tile).floor() as u32).min(TILE_SIZE as u32 - 1);
    let pixel_y = ((y - tile_y as f64 * tile).floor() as u32).min(TILE_SIZE as u32 - 1);

    Some(PixelAddress::new(tile_x, tile_y, pixel_x, pixel_y))
}

/// Exact inverse of [`global_pixel_to_tile`].
pub fn tile_to_global_pixel(tile_x: i64, tile_y: i64, pixel_x: u32, pixel_y: u32) -> GlobalPixel {
    GlobalPixel::new(
        (tile_x * TILE_SIZE + pixel_x as i64) as f64,
        (tile_y * TILE_SIZE + pixel_y as i64) as f64,
    )
}

/// Inverse Mercator. Longitude is periodic and never clamped.
pub fn global_pixel_to_lat_lng(point: GlobalPixel) -> LatLng {
    let x_norm = point.x / MAP_SIZE;
    let y_norm = point.y / MAP_SIZE;

    let lng = (x_norm * 2.0 - 1.0) * 180.0;
    let lat = (PI * (1.0 - 2.0 * y_norm)).sinh().atan().to_degrees();

    LatLng::new(lat, lng)
}

/// Convert a geographic position straight to a tile address.
///
/// Latitude is clamped a hair inside the Mercator bound so the poles still
/// map into the first/last tile row, and a few pixels of vertical overshoot
/// are tolerated before rejecting.
pub fn lat_lng_to_tile(lat: f64, lng: f64) -> Option<PixelAddress> {
    let lat = lat.clamp(-MAX_TILE_LATITUDE, MAX_TILE_LATITUDE);
    let point = lat_lng_to_global_pixel(lat, lng);

    if !point.is_finite() {
        return None;
    }
    if point.y < -VERTICAL_OVERSHOOT || point.y > MAP_SIZE + VERTICAL_OVERSHOOT {
        return None;
    }

    global_pixel_to_tile(point)
}

/// Geographic position of a (tile, pixel) address's top-left corner.
pub fn tile_to_lat_lng(tile_x: i64, tile_y: i64, pixel_x: u32, pixel_y: u32) -> LatLng {
    global_pixel_to_lat_lng(tile_to_global_pixel(tile_x, tile_y, pixel_x, pixel_y))
}

/// Wrap a tile X coordinate into [0, 2048).
pub fn normalize_tile_x(x: i64) -> u32 {
    x.rem_euclid(GRID_TILES) as u32
}

/// Euclidean distance between two tile coordinates on a horizontal cylinder:
/// X takes the shorter way around, Y never wraps.
pub fn wrapped_tile_distance(a: (i64, i64), b: (i64, i64)) -> f64 {
    let direct_x = (a.0 - b.0).abs().rem_euclid(GRID_TILES);
    let dx = direct_x.min(GRID_TILES - direct_x) as f64;
    let dy = (a.1 - b.1) as f64;
    (dx * dx + dy * dy).sqrt()
}

fn snap_to_boundary(value: f64) -> f64 {
    let rounded = value.round();
    if (value - rounded).abs() < PIXEL_EPSILON {
        rounded
    } else {
        value
    }
}
