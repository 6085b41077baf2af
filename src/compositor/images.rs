use crate::core::constants::TILE_SIZE;
use crate::core::geo::TileKey;
use crate::prelude::{Arc, Mutex};
use crate::Result;
use image::imageops::{self, FilterType};
use image::{ImageFormat, RgbaImage};
use lru::LruCache;
use once_cell::sync::Lazy;
use std::num::NonZeroUsize;

const TILE_PX: u32 = TILE_SIZE as u32;

/// Fully transparent tile used for tiles known to be empty.
static BLANK_TILE: Lazy<Arc<RgbaImage>> = Lazy::new(|| Arc::new(RgbaImage::new(TILE_PX, TILE_PX)));

pub fn blank_tile() -> Arc<RgbaImage> {
    BLANK_TILE.clone()
}

/// Decode stored tile bytes into a tile-sized RGBA image. Other sizes are
/// scaled with nearest-neighbor sampling so pixel values are kept exactly.
pub fn decode_tile(bytes: &[u8]) -> Result<RgbaImage> {
    let image = image::load_from_memory_with_format(bytes, ImageFormat::Png)?.to_rgba8();
    if image.dimensions() == (TILE_PX, TILE_PX) {
        return Ok(image);
    }
    Ok(imageops::resize(&image, TILE_PX, TILE_PX, FilterType::Nearest))
}

/// LRU of decoded tiles keyed by tile and fetch timestamp, so a refetched
/// tile is never served from an old decode.
#[derive(Debug)]
pub struct DecodedTiles {
    cache: Mutex<LruCache<(TileKey, u64), Arc<RgbaImage>>>,
}

impl DecodedTiles {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn get(&self, tile: TileKey, timestamp: u64) -> Option<Arc<RgbaImage>> {
        self.cache.lock().ok()?.get(&(tile, timestamp)).cloned()
    }

    pub fn insert(&self, tile: TileKey, timestamp: u64, image: Arc<RgbaImage>) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.put((tile, timestamp), image);
        }
    }

    pub fn len(&self) -> usize {
        self.cache.lock().map(|cache| cache.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ColorType, ImageEncoder, Rgba};

    fn png(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
        let image = RgbaImage::from_pixel(width, height, Rgba(color));
        let mut out = Vec::new();
        image::codecs::png::PngEncoder::new(&mut out)
            .write_image(image.as_raw(), width, height, ColorType::Rgba8.into())
            .unwrap();
        out
    }

    #[test]
    fn test_small_tile_is_scaled_without_smoothing() {
        let decoded = decode_tile(&png(10, 10, [1, 2, 3, 255])).unwrap();
        assert_eq!(decoded.dimensions(), (1000, 1000));
        assert_eq!(*decoded.get_pixel(999, 0), Rgba([1, 2, 3, 255]));
    }

    #[test]
    fn test_blank_tile_is_transparent() {
        let blank = blank_tile();
        assert_eq!(blank.dimensions(), (1000, 1000));
        assert_eq!(blank.get_pixel(500, 500)[3], 0);
    }

    #[test]
    fn test_refetch_changes_cache_key() {
        let decoded = DecodedTiles::new(2);
        let tile = TileKey { x: 1, y: 1 };
        decoded.insert(tile, 10, blank_tile());
        assert!(decoded.get(tile, 10).is_some());
        assert!(decoded.get(tile, 11).is_none());
        assert_eq!(decoded.len(), 1);
    }
}
