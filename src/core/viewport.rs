use crate::core::constants::{GRID_TILES, MAP_SIZE};
use crate::core::geo::{
    global_pixel_to_lat_lng, lat_lng_to_global_pixel, lat_lng_to_tile, GlobalPixel, LatLng,
};
use serde::{Deserialize, Serialize};

/// Inclusive rectangle of *unnormalized* tile coordinates.
///
/// A view straddling the antimeridian produces e.g. `start_x = 2046,
/// end_x = 2049`; normalization happens per tile, never on the rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileRect {
    pub start_x: i64,
    pub start_y: i64,
    pub end_x: i64,
    pub end_y: i64,
}

impl TileRect {
    pub fn new(start_x: i64, start_y: i64, end_x: i64, end_y: i64) -> Self {
        Self {
            start_x,
            start_y,
            end_x,
            end_y,
        }
    }

    pub fn contains(&self, tile_x: i64, tile_y: i64) -> bool {
        tile_x >= self.start_x && tile_x <= self.end_x && tile_y >= self.start_y && tile_y <= self.end_y
    }

    pub fn width(&self) -> i64 {
        (self.end_x - self.start_x + 1).max(0)
    }

    pub fn height(&self) -> i64 {
        (self.end_y - self.start_y + 1).max(0)
    }

    /// Every (x, y) in the rectangle whose row exists in the grid, row-major
    /// by column as the queue planner walks it.
    pub fn addressable_tiles(&self) -> impl Iterator<Item = (i64, i64)> + '_ {
        (self.start_x..=self.end_x).flat_map(move |x| {
            (self.start_y.max(0)..=self.end_y.min(GRID_TILES - 1)).map(move |y| (x, y))
        })
    }
}

/// What the (external) map view currently shows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub north: f64,
    pub south: f64,
    pub west: f64,
    pub east: f64,
    /// Reference point for fetch ordering
    pub center: LatLng,
    /// Width of the whole world in screen pixels at the current zoom
    pub world_width_px: f64,
}

impl Viewport {
    pub fn new(north: f64, south: f64, west: f64, east: f64, center: LatLng, world_width_px: f64) -> Self {
        Self {
            north,
            south,
            west,
            east,
            center,
            world_width_px,
        }
    }

    /// Build a viewport the way a slippy map would: 256px tiles at `zoom`,
    /// a screen of `width` x `height` pixels centered on `center`.
    pub fn from_center(center: LatLng, zoom: f64, width: f64, height: f64) -> Self {
        let world_width_px = 256.0 * 2_f64.powf(zoom);
        let scale = MAP_SIZE / world_width_px;
        let middle = lat_lng_to_global_pixel(center.lat, center.lng);

        let half_w = width / 2.0 * scale;
        let half_h = height / 2.0 * scale;
        let north_west = global_pixel_to_lat_lng(GlobalPixel::new(middle.x - half_w, middle.y - half_h));
        let south_east = global_pixel_to_lat_lng(GlobalPixel::new(middle.x + half_w, middle.y + half_h));

        Self::new(
            north_west.lat,
            south_east.lat,
            north_west.lng,
            south_east.lng,
            center,
            world_width_px,
        )
    }

    /// Visible tiles in unnormalized coordinates, or `None` if a corner lies
    /// outside the dataset.
    pub fn visible_tiles(&self) -> Option<TileRect> {
        let top_left = lat_lng_to_tile(self.north, self.west);
        let bottom_right = lat_lng_to_tile(self.south, self.east);

        match (top_left, bottom_right) {
            (Some(top_left), Some(bottom_right)) => Some(TileRect::new(
                top_left.tile_x,
                top_left.tile_y,
                bottom_right.tile_x,
                bottom_right.tile_y,
            )),
            (top_left, bottom_right) => {
                if top_left.is_none() {
                    log::warn!("Top-left corner out of bounds");
                }
                if bottom_right.is_none() {
                    log::warn!("Bottom-right corner out of bounds");
                }
                None
            }
        }
    }

    /// Tile under the view center (unnormalized).
    pub fn center_tile(&self) -> Option<(i64, i64)> {
        lat_lng_to_tile(self.center.lat, self.center.lng).map(|a| (a.tile_x, a.tile_y))
    }

    /// Screen pixels covered by one dataset pixel.
    pub fn pixel_scale(&self) -> f64 {
        self.world_width_px / MAP_SIZE
    }
}
