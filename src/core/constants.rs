//! Grid-wide constants. Keeping them in a single place makes the tile grid
//! geometry easy to audit.

/// Number of tiles along each axis of the grid.
pub const GRID_TILES: i64 = 2048;

/// Square tile size in pixels.
pub const TILE_SIZE: i64 = 1000;

/// Size of the flat global pixel space along each axis (2,048,000).
pub const MAP_SIZE: f64 = (GRID_TILES * TILE_SIZE) as f64;

/// Web Mercator latitude bound applied by the forward projection.
pub const MAX_LATITUDE: f64 = 85.05112878;

/// Tighter clamp used when converting a lat/lng straight to a tile address,
/// so that the pole itself still lands inside tile row 0 / 2047.
pub const MAX_TILE_LATITUDE: f64 = 85.05111026927486;

/// Vertical overshoot (in global pixels) tolerated before a point is
/// considered outside the dataset.
pub const VERTICAL_OVERSHOOT: f64 = 5.0;

/// Global-pixel values this close to an integer are snapped onto it before
/// flooring, absorbing projection round-trip noise.
pub const PIXEL_EPSILON: f64 = 1e-6;

/// Tiles per shard directory on disk (`tiles/{x/64}/{y/64}/...`).
pub const SHARD_SIZE: u32 = 64;

/// Default upstream tile endpoint.
pub const DEFAULT_TILE_URL: &str = "https://backend.wplace.live/files/s0/tiles/{x}/{y}.png";
