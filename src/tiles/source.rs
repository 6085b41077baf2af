use crate::core::constants::DEFAULT_TILE_URL;
use crate::core::geo::TileKey;
use std::path::{Path, PathBuf};

/// Trait representing anything that can produce tile URLs for a given tile.
pub trait TileSource: Send + Sync {
    /// Build a URL for the requested (normalized) `tile`.
    fn url(&self, tile: TileKey) -> String;
}

/// The wplace tile endpoint, or any server following the same `{x}/{y}` scheme.
#[derive(Debug, Clone)]
pub struct WplaceSource {
    template: String,
}

impl WplaceSource {
    pub fn new() -> Self {
        Self::with_template(DEFAULT_TILE_URL)
    }

    /// Use a custom template. `{x}` and `{y}` are substituted.
    pub fn with_template(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }
}

impl Default for WplaceSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TileSource for WplaceSource {
    fn url(&self, tile: TileKey) -> String {
        self.template
            .replace("{x}", &tile.x.to_string())
            .replace("{y}", &tile.y.to_string())
    }
}

/// On-disk placement of tile files, sharded in blocks of 64x64 tiles so no
/// directory ever holds more than 4096 files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileLayout {
    tile_dir: PathBuf,
}

impl TileLayout {
    pub fn new(tile_dir: impl Into<PathBuf>) -> Self {
        Self {
            tile_dir: tile_dir.into(),
        }
    }

    pub fn tile_dir(&self) -> &Path {
        &self.tile_dir
    }

    /// Directory holding `tile`: `tiles/{x/64}/{y/64}`
    pub fn shard_dir(&self, tile: TileKey) -> PathBuf {
        let (sx, sy) = tile.shard();
        self.tile_dir.join(sx.to_string()).join(sy.to_string())
    }

    /// File holding `tile`: `tiles/{x/64}/{y/64}/{x}_{y}.png`
    pub fn tile_path(&self, tile: TileKey) -> PathBuf {
        self.shard_dir(tile).join(format!("{}_{}.png", tile.x, tile.y))
    }
}

impl Default for TileLayout {
    fn default() -> Self {
        Self::new("tiles")
    }
}
