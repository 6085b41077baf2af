//! The archive context
//!
//! `TileArchive` owns every piece of mutable state (cache, queue, decoded
//! tiles) together with the injected collaborators. Nothing in the crate is
//! global; front ends construct one archive and call into it.

use crate::compositor::AreaCompositor;
use crate::core::builder::ArchiveBuilder;
use crate::core::config::ArchiveConfig;
use crate::core::geo::{PixelAddress, TileKey};
use crate::core::viewport::{TileRect, Viewport};
use crate::prelude::{Arc, Mutex, PathBuf};
use crate::runtime::unix_millis;
use crate::tiles::cache::{CacheEvent, CacheState, TileRecord};
use crate::tiles::favorites::{favorite_key, FavoritePixel};
use crate::tiles::lock;
use crate::tiles::persistence::{favorites_document, CacheDocument, CachePersistence};
use crate::tiles::scheduler::{DownloadScheduler, TileState};
use crate::tiles::source::TileLayout;
use crate::tiles::stats::RangeSummary;
use crate::tiles::visible::{self, DrawableTile, VisibleStatus};
use crate::traits::{Store, Transport};
use crate::Result;
use crossbeam_channel::Receiver;
use std::ops::RangeInclusive;

pub struct TileArchive {
    config: ArchiveConfig,
    cache: Arc<Mutex<CacheState>>,
    store: Arc<dyn Store>,
    persistence: Arc<CachePersistence>,
    layout: TileLayout,
    scheduler: DownloadScheduler,
    compositor: AreaCompositor,
}

impl TileArchive {
    pub fn builder() -> ArchiveBuilder {
        ArchiveBuilder::new()
    }

    pub(crate) fn new(config: ArchiveConfig, transport: Arc<dyn Transport>, store: Arc<dyn Store>) -> Self {
        let cache = Arc::new(Mutex::new(CacheState::new()));
        let layout = TileLayout::new(config.storage.tile_dir.clone());
        let persistence = Arc::new(CachePersistence::new(
            store.clone(),
            config.storage.cache_document.clone(),
            config.storage.favorites_document.clone(),
        ));
        let scheduler = DownloadScheduler::new(
            transport,
            store.clone(),
            cache.clone(),
            persistence.clone(),
            layout.clone(),
            config.download.clone(),
        );
        let compositor = AreaCompositor::new(store.clone(), cache.clone(), layout.clone(), config.export.clone());

        Self {
            config,
            cache,
            store,
            persistence,
            layout,
            scheduler,
            compositor,
        }
    }

    pub fn config(&self) -> &ArchiveConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &DownloadScheduler {
        &self.scheduler
    }

    pub fn compositor(&self) -> &AreaCompositor {
        &self.compositor
    }

    pub fn layout(&self) -> &TileLayout {
        &self.layout
    }

    /// Replace the in-memory cache with the persisted documents.
    pub async fn reload(&self) -> Result<()> {
        let loaded = self.persistence.load().await?;
        lock(&self.cache).replace_with(loaded);
        Ok(())
    }

    /// Write both documents now.
    pub async fn save(&self) -> Result<()> {
        let (document, favorites) = {
            let cache = lock(&self.cache);
            (CacheDocument::of(&cache), favorites_document(&cache))
        };
        self.persistence.write_cache(&document).await?;
        self.persistence.write_favorites(&favorites).await
    }

    pub fn subscribe(&self) -> Receiver<CacheEvent> {
        lock(&self.cache).subscribe()
    }

    /// Queue downloads for what `viewport` shows.
    pub fn update_viewport(&self, viewport: &Viewport) -> usize {
        self.scheduler.queue_viewport(viewport)
    }

    /// Queue downloads for an explicit tile rectangle, nearest to `center` first.
    pub fn fetch_rect(&self, rect: TileRect, center: (i64, i64)) -> usize {
        self.scheduler.queue_rect(rect, center)
    }

    pub fn tile_record(&self, tile: TileKey) -> TileRecord {
        let ttl = self.scheduler.config().stale_after_hours;
        lock(&self.cache).query(&tile, ttl, unix_millis())
    }

    pub fn tile_state(&self, tile: TileKey) -> TileState {
        self.scheduler.tile_state(tile)
    }

    pub fn downloaded_count(&self) -> usize {
        lock(&self.cache).downloaded_count()
    }

    pub fn empty_count(&self) -> usize {
        lock(&self.cache).empty_count()
    }

    pub fn stale_count(&self) -> usize {
        let ttl = self.scheduler.config().stale_after_hours;
        lock(&self.cache).stale_count(ttl, unix_millis())
    }

    pub fn tiles_to_draw(&self, viewport: &Viewport) -> Vec<DrawableTile> {
        let min_scale = self.scheduler.config().min_pixel_scale;
        visible::tiles_to_draw(viewport, &lock(&self.cache), &self.layout, min_scale)
    }

    pub fn status_overview(&self, viewport: &Viewport) -> Vec<(i64, i64, VisibleStatus)> {
        if viewport.pixel_scale() < self.scheduler.config().min_pixel_scale {
            return Vec::new();
        }
        let Some(rect) = viewport.visible_tiles() else {
            return Vec::new();
        };
        let in_flight = self.scheduler.in_flight_tiles();
        visible::status_overview(&rect, &lock(&self.cache), &in_flight)
    }

    /// Bookmark a pixel and persist the favorites document. The bookmark is
    /// kept in memory even if the write fails.
    pub async fn add_favorite(&self, address: PixelAddress, name: Option<String>) -> Result<FavoritePixel> {
        let favorite = FavoritePixel::new(address, name, unix_millis());
        lock(&self.cache).add_favorite(favorite.clone());
        log::info!("Added favorite: {}", favorite.name);
        self.save_favorites().await?;
        Ok(favorite)
    }

    pub async fn remove_favorite(&self, address: &PixelAddress) -> Result<Option<FavoritePixel>> {
        let removed = lock(&self.cache).remove_favorite(&favorite_key(address));
        if let Some(favorite) = &removed {
            log::info!("Removed favorite: {}", favorite.name);
            self.save_favorites().await?;
        }
        Ok(removed)
    }

    pub fn is_favorite(&self, address: &PixelAddress) -> bool {
        lock(&self.cache).is_favorite(&favorite_key(address))
    }

    pub fn favorites(&self) -> Vec<FavoritePixel> {
        lock(&self.cache).favorites()
    }

    async fn save_favorites(&self) -> Result<()> {
        let favorites = favorites_document(&lock(&self.cache));
        self.persistence.write_favorites(&favorites).await
    }

    pub async fn export_tiles(&self, start_x: i64, start_y: i64, end_x: i64, end_y: i64) -> Result<PathBuf> {
        self.compositor.export_tiles(start_x, start_y, end_x, end_y).await
    }

    pub async fn export_crop(&self, start: PixelAddress, end: PixelAddress) -> Result<PathBuf> {
        self.compositor.export_crop(start, end).await
    }

    pub async fn reveal_tile(&self, tile_x: i64, tile_y: i64) -> Result<PathBuf> {
        self.compositor.reveal_tile(tile_x, tile_y).await
    }

    /// Counts for downloaded tiles with `x` in `columns` and `y < below_row`.
    pub async fn range_summary(&self, columns: RangeInclusive<u32>, below_row: u32) -> Result<RangeSummary> {
        let snapshot = {
            let cache = lock(&self.cache);
            CacheState::from_parts(
                cache.downloaded_tiles(),
                cache.empty_tiles(),
                cache.timestamps(),
                Vec::new(),
            )
        };
        RangeSummary::collect(&snapshot, self.store.as_ref(), &self.layout, columns, below_row).await
    }
}
