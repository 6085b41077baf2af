//! Prelude module for common tilekeep types and traits
//!
//! This module re-exports the most commonly used types, traits, and functions
//! for easy importing with `use tilekeep::prelude::*;`

pub use crate::core::{
    archive::TileArchive,
    builder::ArchiveBuilder,
    config::{ArchiveConfig, ConcurrencyPolicy, DownloadConfig, ExportConfig, StorageConfig},
    constants::{GRID_TILES, MAP_SIZE, TILE_SIZE},
    geo::{
        global_pixel_to_lat_lng, global_pixel_to_tile, lat_lng_to_global_pixel, lat_lng_to_tile,
        normalize_tile_x, tile_to_global_pixel, tile_to_lat_lng, wrapped_tile_distance,
        GlobalPixel, LatLng, PixelAddress, TileKey,
    },
    viewport::{TileRect, Viewport},
};

pub use crate::tiles::{
    cache::{CacheEvent, CacheState, TileRecord},
    favorites::FavoritePixel,
    persistence::CachePersistence,
    scheduler::{DownloadScheduler, QueueEntry, SchedulerEvent, TileState, TileStatus},
    source::{TileLayout, TileSource, WplaceSource},
    stats::RangeSummary,
    store::{FsStore, MemoryStore},
    transport::HttpTransport,
    visible::{DrawableTile, VisibleStatus},
};

pub use crate::compositor::{AreaCompositor, CropArea, TileArea};

pub use crate::traits::{FetchOutcome, Store, Transport};

pub use crate::runtime::{async_delay, spawn, TaskHandle};

pub use crate::{ArchiveError, Error, Result};

pub use std::{
    collections::VecDeque,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};

pub use fxhash::{FxHashMap as HashMap, FxHashSet as HashSet};

pub use futures::Future;
