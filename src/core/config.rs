//! Configuration for downloading, exporting and storage
//!
//! This module provides a small hierarchical configuration that can be built
//! from presets, tweaked in code, or loaded from a JSON file. Every section
//! uses `#[serde(default)]` so partial files are fine.

use crate::core::constants::DEFAULT_TILE_URL;
use crate::{ArchiveError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Lowest accepted download rate in tiles per second.
pub const MIN_TILES_PER_SECOND: f64 = 0.1;

/// Highest accepted download rate in tiles per second.
pub const MAX_TILES_PER_SECOND: f64 = 10.0;

/// How many transfers may be in flight at once. Exactly one policy is active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum ConcurrencyPolicy {
    /// One transfer at a time; the next pop waits for it.
    Sequential,
    /// Up to `max_in_flight` transfers, with at least `min_spacing_ms`
    /// between two request starts.
    Bounded { max_in_flight: usize, min_spacing_ms: u64 },
}

impl ConcurrencyPolicy {
    pub fn max_in_flight(&self) -> usize {
        match self {
            Self::Sequential => 1,
            Self::Bounded { max_in_flight, .. } => (*max_in_flight).max(1),
        }
    }

    fn min_spacing(&self) -> Duration {
        match self {
            Self::Sequential => Duration::ZERO,
            Self::Bounded { min_spacing_ms, .. } => Duration::from_millis(*min_spacing_ms),
        }
    }
}

impl Default for ConcurrencyPolicy {
    fn default() -> Self {
        Self::Sequential
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Re-fetch downloaded tiles once they are older than `stale_after_hours`
    pub auto_refresh: bool,
    pub stale_after_hours: f64,
    /// Queue drain rate, clamped into [0.1, 10]
    pub tiles_per_second: f64,
    pub concurrency: ConcurrencyPolicy,
    /// Flush the tile-cache document after this many successful downloads
    pub flush_every: u32,
    /// Below this many screen pixels per dataset pixel nothing is queued
    pub min_pixel_scale: f64,
    /// Per-request timeout; `None` waits forever
    pub request_timeout_secs: Option<u64>,
    /// Upstream URL template with `{x}` and `{y}` placeholders
    pub tile_url: String,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            auto_refresh: true,
            stale_after_hours: 1.0,
            tiles_per_second: 1.8,
            concurrency: ConcurrencyPolicy::Sequential,
            flush_every: 10,
            min_pixel_scale: 0.25,
            request_timeout_secs: Some(30),
            tile_url: DEFAULT_TILE_URL.to_string(),
        }
    }
}

/// Presets for DownloadConfig
impl DownloadConfig {
    /// Slow and polite: one tile every two seconds, no refresh.
    pub fn gentle() -> Self {
        Self {
            auto_refresh: false,
            tiles_per_second: 0.5,
            ..Self::default()
        }
    }

    /// The earlier concurrent variant: three transfers, 200ms apart.
    pub fn burst() -> Self {
        Self {
            tiles_per_second: MAX_TILES_PER_SECOND,
            concurrency: ConcurrencyPolicy::Bounded {
                max_in_flight: 3,
                min_spacing_ms: 200,
            },
            ..Self::default()
        }
    }

    pub fn for_testing() -> Self {
        Self {
            tiles_per_second: MAX_TILES_PER_SECOND,
            flush_every: 2,
            min_pixel_scale: 0.0,
            request_timeout_secs: None,
            ..Self::default()
        }
    }

    pub fn clamped_rate(&self) -> f64 {
        clamp_rate(self.tiles_per_second)
    }

    /// Delay between two queue pops: `1000 / min(rate, 10)` ms, widened to
    /// the policy's minimum spacing.
    pub fn pop_interval(&self) -> Duration {
        let interval = Duration::from_secs_f64(1.0 / self.clamped_rate());
        interval.max(self.concurrency.min_spacing())
    }
}

/// Clamp a tiles-per-second value into the accepted range. NaN falls back to
/// the minimum.
pub fn clamp_rate(rate: f64) -> f64 {
    if rate.is_nan() {
        return MIN_TILES_PER_SECOND;
    }
    rate.clamp(MIN_TILES_PER_SECOND, MAX_TILES_PER_SECOND)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Maximum tiles (width * height) a composite may span
    pub max_area_tiles: u32,
    /// Maximum width or height of a crop, in pixels
    pub max_crop_dimension: u32,
    /// Decoded tile images kept between exports
    pub decoded_tile_cache: usize,
    pub export_dir: PathBuf,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            max_area_tiles: 25,
            max_crop_dimension: 5000,
            decoded_tile_cache: 32,
            export_dir: PathBuf::from("exports"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory for the filesystem store
    pub root: PathBuf,
    pub cache_document: PathBuf,
    pub favorites_document: PathBuf,
    pub tile_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            cache_document: PathBuf::from("downloaded_tiles.json"),
            favorites_document: PathBuf::from("favorites.json"),
            tile_dir: PathBuf::from("tiles"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    pub download: DownloadConfig,
    pub export: ExportConfig,
    pub storage: StorageConfig,
}

impl ArchiveConfig {
    /// Load a JSON configuration file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn for_testing() -> Self {
        Self {
            download: DownloadConfig::for_testing(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.download.tile_url.contains("{x}") || !self.download.tile_url.contains("{y}") {
            return Err(ArchiveError::Config(format!(
                "tile_url '{}' must contain {{x}} and {{y}}",
                self.download.tile_url
            )));
        }
        if self.download.flush_every == 0 {
            return Err(ArchiveError::Config("flush_every must be at least 1".into()));
        }
        if self.export.max_area_tiles == 0 || self.export.max_crop_dimension == 0 {
            return Err(ArchiveError::Config("export limits must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pop_interval_follows_rate() {
        let mut config = DownloadConfig::default();
        config.tiles_per_second = 2.0;
        assert_eq!(config.pop_interval(), Duration::from_millis(500));

        config.tiles_per_second = 50.0;
        assert_eq!(config.pop_interval(), Duration::from_millis(100));

        config.tiles_per_second = 0.0;
        assert_eq!(config.pop_interval(), Duration::from_secs(10));
    }

    #[test]
    fn test_bounded_policy_widens_interval() {
        let config = DownloadConfig::burst();
        assert_eq!(config.concurrency.max_in_flight(), 3);
        assert_eq!(config.pop_interval(), Duration::from_millis(200));
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let json = r#"{ "download": { "tiles_per_second": 4.0, "concurrency": { "mode": "bounded", "max_in_flight": 2, "min_spacing_ms": 50 } } }"#;
        let config: ArchiveConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.download.tiles_per_second, 4.0);
        assert!(config.download.auto_refresh);
        assert_eq!(
            config.download.concurrency,
            ConcurrencyPolicy::Bounded {
                max_in_flight: 2,
                min_spacing_ms: 50
            }
        );
        assert_eq!(config.export.max_area_tiles, 25);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_template() {
        let mut config = ArchiveConfig::default();
        config.download.tile_url = "https://example.com/tile.png".into();
        assert!(matches!(config.validate(), Err(ArchiveError::Config(_))));
    }
}
