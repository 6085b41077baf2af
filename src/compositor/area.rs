//! Tile and pixel rectangles for export.
//!
//! Both constructors take corners in grid coordinates and choose, per axis,
//! whether the rectangle runs the direct way or wraps around the seam. The
//! choice compares `direct + 1` with `wrapped + 1` and keeps the shorter one.
//! It is applied to Y as well as X even though Y never wraps in the grid, so a
//! Y-wrapped area names rows outside the dataset and fails validation as
//! missing tiles.

use crate::core::constants::{GRID_TILES, TILE_SIZE};
use crate::core::geo::{normalize_tile_x, PixelAddress, TileKey};
use crate::{ArchiveError, Result};

/// Inclusive tile rectangle; `max_x` may exceed the grid when wrapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileArea {
    pub min_x: i64,
    pub min_y: i64,
    pub max_x: i64,
    pub max_y: i64,
}

/// Returns the wrapped `(min, max)` when going around the seam is shorter.
fn wrap_axis(min: i64, max: i64) -> Option<(i64, i64)> {
    if max - min + 1 > min - max + GRID_TILES + 1 {
        Some((max, min + GRID_TILES))
    } else {
        None
    }
}

fn check_tile(value: i64) -> Result<()> {
    if (0..GRID_TILES).contains(&value) {
        Ok(())
    } else {
        Err(ArchiveError::InvalidCoordinates(format!(
            "Tile coordinates must be between 0 and {}",
            GRID_TILES - 1
        )))
    }
}

fn check_pixel(value: u32) -> Result<()> {
    if i64::from(value) < TILE_SIZE {
        Ok(())
    } else {
        Err(ArchiveError::InvalidCoordinates(format!(
            "Pixel coordinates must be between 0 and {}",
            TILE_SIZE - 1
        )))
    }
}

impl TileArea {
    /// Rectangle spanned by two corner tiles, wrapping where shorter.
    pub fn between(start_x: i64, start_y: i64, end_x: i64, end_y: i64) -> Result<Self> {
        for value in [start_x, start_y, end_x, end_y] {
            check_tile(value)?;
        }

        let (mut min_x, mut max_x) = (start_x.min(end_x), start_x.max(end_x));
        let (mut min_y, mut max_y) = (start_y.min(end_y), start_y.max(end_y));
        if let Some((lo, hi)) = wrap_axis(min_x, max_x) {
            min_x = lo;
            max_x = hi;
        }
        if let Some((lo, hi)) = wrap_axis(min_y, max_y) {
            min_y = lo;
            max_y = hi;
        }
        Ok(Self {
            min_x,
            min_y,
            max_x,
            max_y,
        })
    }

    pub fn tiles_wide(&self) -> u64 {
        (self.max_x - self.min_x + 1).max(0) as u64
    }

    pub fn tiles_high(&self) -> u64 {
        (self.max_y - self.min_y + 1).max(0) as u64
    }

    pub fn tile_count(&self) -> u64 {
        self.tiles_wide() * self.tiles_high()
    }

    /// Every tile of the area, column by column, in area coordinates.
    pub fn tiles(&self) -> impl Iterator<Item = (i64, i64)> + '_ {
        (self.min_x..=self.max_x).flat_map(move |x| (self.min_y..=self.max_y).map(move |y| (x, y)))
    }

    /// The cache key for an area tile; `None` for rows outside the grid.
    pub fn key_of(x: i64, y: i64) -> Option<TileKey> {
        TileKey::new(x, y)
    }

    /// How a missing tile is reported: X normalized, Y verbatim.
    pub fn reported(x: i64, y: i64) -> (i64, i64) {
        (i64::from(normalize_tile_x(x)), y)
    }
}

/// Exact pixel rectangle between two (tile, pixel) corners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CropArea {
    /// Smallest tile rectangle containing the crop
    pub tiles: TileArea,
    pub start_pixel_x: u32,
    pub start_pixel_y: u32,
    pub end_pixel_x: u32,
    pub end_pixel_y: u32,
}

impl CropArea {
    pub fn between(start: PixelAddress, end: PixelAddress) -> Result<Self> {
        for value in [start.tile_x, start.tile_y, end.tile_x, end.tile_y] {
            check_tile(value)?;
        }
        for value in [start.pixel_x, start.pixel_y, end.pixel_x, end.pixel_y] {
            check_pixel(value)?;
        }

        // order each axis, moving the pixel offset along with its tile
        let (mut min_x, mut max_x, mut start_px, mut end_px) =
            order_axis(start.tile_x, start.pixel_x, end.tile_x, end.pixel_x);
        let (mut min_y, mut max_y, mut start_py, mut end_py) =
            order_axis(start.tile_y, start.pixel_y, end.tile_y, end.pixel_y);

        if let Some((lo, hi)) = wrap_axis(min_x, max_x) {
            min_x = lo;
            max_x = hi;
            std::mem::swap(&mut start_px, &mut end_px);
        }
        if let Some((lo, hi)) = wrap_axis(min_y, max_y) {
            min_y = lo;
            max_y = hi;
            std::mem::swap(&mut start_py, &mut end_py);
        }

        Ok(Self {
            tiles: TileArea {
                min_x,
                min_y,
                max_x,
                max_y,
            },
            start_pixel_x: start_px,
            start_pixel_y: start_py,
            end_pixel_x: end_px,
            end_pixel_y: end_py,
        })
    }

    /// Global pixel of the top-left corner (may exceed the map when wrapped).
    pub fn min_global(&self) -> (i64, i64) {
        (
            self.tiles.min_x * TILE_SIZE + i64::from(self.start_pixel_x),
            self.tiles.min_y * TILE_SIZE + i64::from(self.start_pixel_y),
        )
    }

    pub fn max_global(&self) -> (i64, i64) {
        (
            self.tiles.max_x * TILE_SIZE + i64::from(self.end_pixel_x),
            self.tiles.max_y * TILE_SIZE + i64::from(self.end_pixel_y),
        )
    }

    pub fn width(&self) -> i64 {
        self.max_global().0 - self.min_global().0 + 1
    }

    pub fn height(&self) -> i64 {
        self.max_global().1 - self.min_global().1 + 1
    }

    /// Offset of the crop inside the composite of `self.tiles`.
    pub fn offset(&self) -> (u32, u32) {
        (self.start_pixel_x, self.start_pixel_y)
    }
}

fn order_axis(start_tile: i64, start_pixel: u32, end_tile: i64, end_pixel: u32) -> (i64, i64, u32, u32) {
    if start_tile > end_tile || (start_tile == end_tile && start_pixel > end_pixel) {
        (end_tile, start_tile, end_pixel, start_pixel)
    } else {
        (start_tile, end_tile, start_pixel, end_pixel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_area() {
        let area = TileArea::between(12, 8, 10, 9).unwrap();
        assert_eq!(area, TileArea { min_x: 10, min_y: 8, max_x: 12, max_y: 9 });
        assert_eq!(area.tile_count(), 6);
    }

    #[test]
    fn test_area_wraps_across_seam() {
        let area = TileArea::between(2047, 5, 1, 5).unwrap();
        assert_eq!(area, TileArea { min_x: 2047, min_y: 5, max_x: 2049, max_y: 5 });
        assert_eq!(area.tiles_wide(), 3);
        let keys: Vec<_> = area.tiles().filter_map(|(x, y)| TileArea::key_of(x, y)).collect();
        assert_eq!(keys, vec![TileKey { x: 2047, y: 5 }, TileKey { x: 0, y: 5 }, TileKey { x: 1, y: 5 }]);
    }

    #[test]
    fn test_y_axis_wraps_too() {
        let area = TileArea::between(0, 0, 0, 2047).unwrap();
        assert_eq!((area.min_y, area.max_y), (2047, 2048));
        assert!(TileArea::key_of(0, 2048).is_none());
    }

    #[test]
    fn test_rejects_out_of_range_corner() {
        assert!(matches!(
            TileArea::between(0, 0, 2048, 0),
            Err(ArchiveError::InvalidCoordinates(_))
        ));
        assert!(CropArea::between(PixelAddress::new(0, 0, 1000, 0), PixelAddress::new(0, 0, 0, 0)).is_err());
    }

    #[test]
    fn test_crop_orders_pixels_within_one_tile() {
        let crop = CropArea::between(PixelAddress::new(5, 5, 10, 10), PixelAddress::new(5, 5, 0, 0)).unwrap();
        assert_eq!((crop.start_pixel_x, crop.end_pixel_x), (0, 10));
        assert_eq!((crop.start_pixel_y, crop.end_pixel_y), (0, 10));
        assert_eq!((crop.width(), crop.height()), (11, 11));
        assert_eq!(crop.offset(), (0, 0));
    }

    #[test]
    fn test_crop_across_seam_swaps_pixels() {
        let crop = CropArea::between(PixelAddress::new(0, 3, 500, 0), PixelAddress::new(2047, 3, 100, 9)).unwrap();
        assert_eq!((crop.tiles.min_x, crop.tiles.max_x), (2047, 2048));
        assert_eq!(crop.offset(), (100, 0));
        assert_eq!(crop.width(), 1401);
        assert_eq!(crop.height(), 10);
    }
}
