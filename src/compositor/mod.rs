//! Area compositor
//!
//! Stitches cached tiles into one image for a [`TileArea`] and cuts exact
//! pixel rectangles out of it for a [`CropArea`]. Every check (coordinates,
//! size caps, completeness) happens before the first tile is read, so a
//! failed export never leaves a partial file behind.

pub mod area;
pub mod images;

pub use area::{CropArea, TileArea};
pub use images::DecodedTiles;

use crate::core::config::ExportConfig;
use crate::core::constants::TILE_SIZE;
use crate::core::geo::{PixelAddress, TileKey};
use crate::prelude::{Arc, Mutex, PathBuf};
use crate::runtime::unix_millis;
use crate::tiles::cache::CacheState;
use crate::tiles::lock;
use crate::tiles::source::TileLayout;
use crate::traits::Store;
use crate::{ArchiveError, Result};
use futures::future::try_join_all;
use image::codecs::png::PngEncoder;
use image::{imageops, ColorType, GenericImage, ImageEncoder, RgbaImage};

const TILE_PX: u32 = TILE_SIZE as u32;

/// How one area tile will be produced.
#[derive(Debug, Clone, Copy)]
enum TilePlan {
    Blank,
    Stored { key: TileKey, timestamp: u64 },
}

pub struct AreaCompositor {
    store: Arc<dyn Store>,
    cache: Arc<Mutex<CacheState>>,
    layout: TileLayout,
    config: ExportConfig,
    decoded: DecodedTiles,
}

impl AreaCompositor {
    pub fn new(
        store: Arc<dyn Store>,
        cache: Arc<Mutex<CacheState>>,
        layout: TileLayout,
        config: ExportConfig,
    ) -> Self {
        let decoded = DecodedTiles::new(config.decoded_tile_cache);
        Self {
            store,
            cache,
            layout,
            config,
            decoded,
        }
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Reject areas over the tile budget.
    pub fn check_size(&self, area: &TileArea) -> Result<()> {
        let requested = area.tile_count();
        if requested > u64::from(self.config.max_area_tiles) {
            return Err(ArchiveError::AreaTooLarge {
                tiles_wide: area.tiles_wide(),
                tiles_high: area.tiles_high(),
                requested,
                limit: self.config.max_area_tiles,
            });
        }
        Ok(())
    }

    /// Confirm every tile of `area` is downloaded and decide how to draw it.
    fn plan(&self, area: &TileArea) -> Result<Vec<(i64, i64, TilePlan)>> {
        let cache = lock(&self.cache);
        let mut missing = Vec::new();
        let mut plan = Vec::with_capacity(area.tile_count() as usize);

        for (x, y) in area.tiles() {
            match TileArea::key_of(x, y).filter(|key| cache.is_downloaded(key)) {
                Some(key) if cache.is_empty_tile(&key) => plan.push((x, y, TilePlan::Blank)),
                Some(key) => plan.push((
                    x,
                    y,
                    TilePlan::Stored {
                        key,
                        timestamp: cache.timestamp(&key).unwrap_or(0),
                    },
                )),
                None => missing.push(TileArea::reported(x, y)),
            }
        }

        if !missing.is_empty() {
            return Err(ArchiveError::MissingTiles(missing));
        }
        Ok(plan)
    }

    async fn load(&self, source: TilePlan) -> Result<Arc<RgbaImage>> {
        let (key, timestamp) = match source {
            TilePlan::Blank => return Ok(images::blank_tile()),
            TilePlan::Stored { key, timestamp } => (key, timestamp),
        };
        if let Some(image) = self.decoded.get(key, timestamp) {
            return Ok(image);
        }

        let bytes = self.store.read_bytes(&self.layout.tile_path(key)).await?;
        let image = Arc::new(images::decode_tile(&bytes)?);
        #[cfg(feature = "debug")]
        log::debug!("Loaded local tile ({}, {})", key.x, key.y);
        self.decoded.insert(key, timestamp, image.clone());
        Ok(image)
    }

    /// Assemble `area` into one image of `tiles_wide * 1000` by
    /// `tiles_high * 1000` pixels.
    pub async fn composite(&self, area: &TileArea) -> Result<RgbaImage> {
        self.check_size(area)?;
        let plan = self.plan(area)?;
        #[cfg(feature = "debug")]
        log::debug!(
            "Compositing ({}, {}) to ({}, {}): {} tiles",
            area.min_x,
            area.min_y,
            area.max_x,
            area.max_y,
            plan.len()
        );

        let tiles = try_join_all(plan.iter().map(|(_, _, source)| self.load(*source))).await?;

        let mut canvas = RgbaImage::new(
            area.tiles_wide() as u32 * TILE_PX,
            area.tiles_high() as u32 * TILE_PX,
        );
        for ((x, y, _), tile) in plan.iter().zip(tiles) {
            let px = (x - area.min_x) as u32 * TILE_PX;
            let py = (y - area.min_y) as u32 * TILE_PX;
            canvas.copy_from(tile.as_ref(), px, py)?;
        }
        Ok(canvas)
    }

    /// Cut `crop` out of the composite of its tiles.
    pub async fn crop(&self, crop: &CropArea) -> Result<RgbaImage> {
        let (width, height) = (crop.width(), crop.height());
        let limit = i64::from(self.config.max_crop_dimension);
        if width > limit || height > limit {
            return Err(ArchiveError::CropTooLarge {
                width: width.max(0) as u64,
                height: height.max(0) as u64,
                limit: self.config.max_crop_dimension,
            });
        }
        if width <= 0 || height <= 0 {
            return Err(ArchiveError::InvalidCoordinates(format!(
                "empty crop area {}x{}",
                width, height
            )));
        }

        let composite = self.composite(&crop.tiles).await?;
        let (x, y) = crop.offset();
        Ok(imageops::crop_imm(&composite, x, y, width as u32, height as u32).to_image())
    }

    /// Composite the tiles between two corners and write a PNG under the
    /// export directory.
    pub async fn export_tiles(&self, start_x: i64, start_y: i64, end_x: i64, end_y: i64) -> Result<PathBuf> {
        let area = TileArea::between(start_x, start_y, end_x, end_y)?;
        let image = self.composite(&area).await?;
        let name = format!(
            "wplace_tiles_{}_{}_to_{}_{}_{}.png",
            area.min_x,
            area.min_y,
            area.max_x,
            area.max_y,
            unix_millis()
        );
        self.write_png(&name, &image).await
    }

    /// Crop the exact pixel rectangle between two corners and write a PNG
    /// under the export directory.
    pub async fn export_crop(&self, start: PixelAddress, end: PixelAddress) -> Result<PathBuf> {
        let crop = CropArea::between(start, end)?;
        let image = self.crop(&crop).await?;
        let (min_x, min_y) = crop.min_global();
        let (max_x, max_y) = crop.max_global();
        let name = format!(
            "wplace_crop_{}_{}_to_{}_{}_{}.png",
            min_x,
            min_y,
            max_x,
            max_y,
            unix_millis()
        );
        self.write_png(&name, &image).await
    }

    async fn write_png(&self, name: &str, image: &RgbaImage) -> Result<PathBuf> {
        let bytes = encode_png(image)?;
        let path = self.config.export_dir.join(name);
        self.store.create_dir_all(&self.config.export_dir).await?;
        self.store.write_bytes(&path, &bytes).await?;
        log::info!(
            "Exported {}x{} pixels to {}",
            image.width(),
            image.height(),
            path.display()
        );
        Ok(path)
    }

    /// Reveal the stored file of a downloaded, non-empty tile.
    pub async fn reveal_tile(&self, tile_x: i64, tile_y: i64) -> Result<PathBuf> {
        let key = TileKey::new(tile_x, tile_y).ok_or_else(|| {
            ArchiveError::InvalidCoordinates(format!("tile ({}, {}) is outside the grid", tile_x, tile_y))
        })?;
        {
            let cache = lock(&self.cache);
            if !cache.is_downloaded(&key) {
                return Err(ArchiveError::MissingTiles(vec![(i64::from(key.x), i64::from(key.y))]));
            }
            if cache.is_empty_tile(&key) {
                return Err(ArchiveError::InvalidCoordinates(format!(
                    "tile {} is empty and has no file",
                    key
                )));
            }
        }
        let path = self.layout.tile_path(key);
        self.store.reveal(&path).await?;
        Ok(path)
    }
}

pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    PngEncoder::new(&mut out).write_image(image.as_raw(), image.width(), image.height(), ColorType::Rgba8.into())?;
    Ok(out)
}
