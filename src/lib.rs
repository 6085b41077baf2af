//! # tilekeep
//!
//! Acquisition, caching and reassembly of a fixed 2048×2048 tile grid
//! (1000×1000 pixels per tile) laid over a Web-Mercator world.
//!
//! The crate is organised the same way a map engine is: `core` holds the
//! coordinate math, viewport and configuration, `tiles` holds everything that
//! moves tile bytes around (cache state, persistence, the download scheduler),
//! and `compositor` stitches cached tiles back into exportable images.
//!
//! Network and disk access are never performed directly. Everything goes
//! through the [`Transport`] and [`Store`] collaborator traits, which makes
//! the whole pipeline drivable from tests with in-memory implementations.

pub mod compositor;
pub mod core;
pub mod prelude;
pub mod runtime;
pub mod tiles;
pub mod traits;
pub use crate::core::constants;

use std::path::PathBuf;

// Re-export public API
pub use crate::core::{
    archive::TileArchive,
    builder::ArchiveBuilder,
    config::{ArchiveConfig, ConcurrencyPolicy, DownloadConfig, ExportConfig, StorageConfig},
    geo::{LatLng, PixelAddress, TileKey},
    viewport::{TileRect, Viewport},
};

pub use compositor::{AreaCompositor, CropArea, TileArea};

pub use tiles::{
    cache::{CacheEvent, CacheState, TileRecord},
    favorites::FavoritePixel,
    scheduler::{DownloadScheduler, SchedulerEvent, TileState, TileStatus},
    store::{FsStore, MemoryStore},
    transport::HttpTransport,
};

pub use traits::{FetchOutcome, Store, Transport};

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, ArchiveError>;

/// Common error types
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("HTTP {status} for tile {tile}")]
    Http { status: u16, tile: TileKey },

    #[error("Timed out fetching tile {0}")]
    Timeout(TileKey),

    #[error("Invalid coordinates: {0}")]
    InvalidCoordinates(String),

    #[error(
        "Requested area spans {tiles_wide}x{tiles_high} tiles ({requested} tiles requested, {limit} allowed)"
    )]
    AreaTooLarge {
        tiles_wide: u64,
        tiles_high: u64,
        requested: u64,
        limit: u32,
    },

    #[error("Crop area too large: {width}x{height} pixels. Maximum allowed: {limit}x{limit}")]
    CropTooLarge { width: u64, height: u64, limit: u32 },

    #[error("Missing downloaded tiles: {}. Please download these tiles first.", format_missing(.0))]
    MissingTiles(Vec<(i64, i64)>),

    #[error("Not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Error type alias for convenience
pub type Error = ArchiveError;

fn format_missing(tiles: &[(i64, i64)]) -> String {
    tiles
        .iter()
        .map(|(x, y)| format!("({}, {})", x, y))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_area_too_large_message() {
        let err = ArchiveError::AreaTooLarge {
            tiles_wide: 6,
            tiles_high: 6,
            requested: 36,
            limit: 25,
        };
        let message = err.to_string();
        assert!(message.contains("36 tiles requested, 25 allowed"), "{}", message);
    }

    #[test]
    fn test_missing_tiles_message_lists_every_tile() {
        let err = ArchiveError::MissingTiles(vec![(1, 2), (2047, 0)]);
        let message = err.to_string();
        assert!(message.contains("(1, 2), (2047, 0)"), "{}", message);
    }
}
