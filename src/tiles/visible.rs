//! What a renderer should draw for a viewport, and which visible tiles still
//! need attention.

use super::cache::CacheState;
use super::source::TileLayout;
use crate::core::geo::{tile_to_lat_lng, LatLng, TileKey};
use crate::core::viewport::{TileRect, Viewport};
use crate::prelude::{HashSet, PathBuf};

/// A downloaded, non-empty tile placed at its on-screen (unnormalized)
/// position.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawableTile {
    pub tile_x: i64,
    pub tile_y: i64,
    pub key: TileKey,
    pub path: PathBuf,
    pub north_west: LatLng,
    pub south_east: LatLng,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisibleStatus {
    Downloading,
    Needed,
}

/// Tiles to draw for `viewport`. Nothing is drawn below `min_pixel_scale`;
/// empty and missing tiles are skipped.
pub fn tiles_to_draw(
    viewport: &Viewport,
    cache: &CacheState,
    layout: &TileLayout,
    min_pixel_scale: f64,
) -> Vec<DrawableTile> {
    if viewport.pixel_scale() < min_pixel_scale {
        return Vec::new();
    }
    let Some(rect) = viewport.visible_tiles() else {
        return Vec::new();
    };

    let tiles: Vec<DrawableTile> = rect
        .addressable_tiles()
        .filter_map(|(tile_x, tile_y)| {
            let key = TileKey::new(tile_x, tile_y)?;
            if !cache.is_downloaded(&key) || cache.is_empty_tile(&key) {
                return None;
            }
            Some(DrawableTile {
                tile_x,
                tile_y,
                key,
                path: layout.tile_path(key),
                north_west: tile_to_lat_lng(tile_x, tile_y, 0, 0),
                south_east: tile_to_lat_lng(tile_x + 1, tile_y + 1, 0, 0),
            })
        })
        .collect();

    #[cfg(feature = "debug")]
    log::debug!("Showing {} tiles", tiles.len());
    tiles
}

/// Status indicator for each visible tile that is not yet downloaded.
pub fn status_overview(
    rect: &TileRect,
    cache: &CacheState,
    in_flight: &HashSet<TileKey>,
) -> Vec<(i64, i64, VisibleStatus)> {
    rect.addressable_tiles()
        .filter_map(|(tile_x, tile_y)| {
            let key = TileKey::new(tile_x, tile_y)?;
            if in_flight.contains(&key) {
                Some((tile_x, tile_y, VisibleStatus::Downloading))
            } else if !cache.is_downloaded(&key) {
                Some((tile_x, tile_y, VisibleStatus::Needed))
            } else {
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::constants::MAP_SIZE;

    fn seam_viewport(world_width_px: f64) -> Viewport {
        let nw = tile_to_lat_lng(2047, 3, 100, 100);
        let se = tile_to_lat_lng(2048, 3, 900, 900);
        let center = tile_to_lat_lng(2048, 3, 0, 500);
        Viewport::new(nw.lat, se.lat, nw.lng, se.lng, center, world_width_px)
    }

    #[test]
    fn test_empty_tiles_are_not_drawn() {
        let mut cache = CacheState::new();
        cache.mark_downloaded(TileKey { x: 2047, y: 3 }, 1);
        cache.mark_empty(TileKey { x: 0, y: 3 }, 1);

        let tiles = tiles_to_draw(&seam_viewport(MAP_SIZE), &cache, &TileLayout::default(), 0.25);
        assert_eq!(tiles.len(), 1);
        assert_eq!(tiles[0].tile_x, 2047);
        assert_eq!(tiles[0].path, PathBuf::from("tiles/31/0/2047_3.png"));
    }

    #[test]
    fn test_wrapped_tile_keeps_screen_position() {
        let mut cache = CacheState::new();
        cache.mark_downloaded(TileKey { x: 0, y: 3 }, 1);

        let tiles = tiles_to_draw(&seam_viewport(MAP_SIZE), &cache, &TileLayout::default(), 0.25);
        assert_eq!(tiles.len(), 1);
        assert_eq!(tiles[0].tile_x, 2048);
        assert_eq!(tiles[0].key, TileKey { x: 0, y: 3 });
        assert!(tiles[0].north_west.lng >= 180.0);
    }

    #[test]
    fn test_nothing_drawn_when_zoomed_out() {
        let mut cache = CacheState::new();
        cache.mark_downloaded(TileKey { x: 2047, y: 3 }, 1);
        let tiles = tiles_to_draw(&seam_viewport(MAP_SIZE / 8.0), &cache, &TileLayout::default(), 0.25);
        assert!(tiles.is_empty());
    }

    #[test]
    fn test_status_overview() {
        let mut cache = CacheState::new();
        cache.mark_downloaded(TileKey { x: 1, y: 1 }, 1);
        let mut in_flight = HashSet::default();
        in_flight.insert(TileKey { x: 2, y: 1 });

        let overview = status_overview(&TileRect::new(1, 1, 3, 1), &cache, &in_flight);
        assert_eq!(
            overview,
            vec![(2, 1, VisibleStatus::Downloading), (3, 1, VisibleStatus::Needed)]
        );
    }
}
