//! Download scheduler
//!
//! Keeps the cache in step with a moving viewport. Every queueing call
//! replaces the queue wholesale and advances a generation counter; the drain
//! loop it spawns captures that generation and stops as soon as a newer one
//! exists. Transfers already issued always run to completion and apply their
//! result, whatever generation issued them.
//!
//! ```text
//! NotQueued -> Queued -> InFlight -> Downloaded | Empty | Failed
//!                                                          |
//!               (next queueing pass) <---------------------+
//! ```

use super::cache::CacheState;
use super::lock;
use super::persistence::{CacheDocument, CachePersistence};
use super::source::TileLayout;
use crate::core::config::{clamp_rate, DownloadConfig};
use crate::core::geo::{wrapped_tile_distance, TileKey};
use crate::core::viewport::{TileRect, Viewport};
use crate::prelude::{Arc, HashSet, Mutex, PathBuf, VecDeque};
use crate::runtime::{async_delay, spawn, unix_millis};
use crate::traits::{FetchOutcome, Store, Transport};
use crate::{ArchiveError, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::cmp::Ordering;
use std::time::Duration;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};

/// One pending fetch, in the coordinates the viewport produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueueEntry {
    pub tile_x: i64,
    pub tile_y: i64,
    /// Wrap-aware distance from the reference tile
    pub distance: f64,
}

impl QueueEntry {
    pub fn key(&self) -> Option<TileKey> {
        TileKey::new(self.tile_x, self.tile_y)
    }
}

/// Per-tile indicator for whatever draws download status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileStatus {
    Downloading { stale: bool },
    Downloaded,
    Failed,
    /// The tile turned out empty; any indicator should be removed
    Cleared,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerEvent {
    QueueReplaced { generation: u64, queued: usize },
    /// Status change for an unnormalized tile position
    Status { tile_x: i64, tile_y: i64, status: TileStatus },
    /// A visible tile was written and should be (re)loaded by the renderer
    TileReady { tile_x: i64, tile_y: i64, path: PathBuf },
    Flushed { downloaded: usize },
}

/// Where a tile currently is in its download lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileState {
    NotQueued,
    Queued,
    InFlight,
    Downloaded,
    Empty,
    Failed,
}

/// What to queue again after a resume or a rate change.
#[derive(Debug, Clone, Copy)]
struct QueueRequest {
    rect: TileRect,
    center: (i64, i64),
}

#[derive(Debug, Default)]
struct SchedulerState {
    generation: u64,
    queue: VecDeque<QueueEntry>,
    in_flight: HashSet<TileKey>,
    failed: HashSet<TileKey>,
    last_request: Option<QueueRequest>,
    paused: bool,
    successes: u32,
}

struct Shared {
    transport: Arc<dyn Transport>,
    store: Arc<dyn Store>,
    cache: Arc<Mutex<CacheState>>,
    persistence: Arc<CachePersistence>,
    layout: TileLayout,
    config: Mutex<DownloadConfig>,
    state: Mutex<SchedulerState>,
    permits: Arc<Semaphore>,
    subscribers: Mutex<Vec<Sender<SchedulerEvent>>>,
    idle: Notify,
}

/// Cloneable handle to the scheduler. All clones drive the same queue.
#[derive(Clone)]
pub struct DownloadScheduler {
    shared: Arc<Shared>,
}

impl DownloadScheduler {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<dyn Store>,
        cache: Arc<Mutex<CacheState>>,
        persistence: Arc<CachePersistence>,
        layout: TileLayout,
        config: DownloadConfig,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.concurrency.max_in_flight()));
        Self {
            shared: Arc::new(Shared {
                transport,
                store,
                cache,
                persistence,
                layout,
                config: Mutex::new(config),
                state: Mutex::new(SchedulerState::default()),
                permits,
                subscribers: Mutex::new(Vec::new()),
                idle: Notify::new(),
            }),
        }
    }

    pub fn subscribe(&self) -> Receiver<SchedulerEvent> {
        let (tx, rx) = unbounded();
        lock(&self.shared.subscribers).push(tx);
        rx
    }

    pub fn config(&self) -> DownloadConfig {
        lock(&self.shared.config).clone()
    }

    pub fn generation(&self) -> u64 {
        lock(&self.shared.state).generation
    }

    pub fn is_paused(&self) -> bool {
        lock(&self.shared.state).paused
    }

    pub fn queue_len(&self) -> usize {
        lock(&self.shared.state).queue.len()
    }

    pub fn in_flight_tiles(&self) -> HashSet<TileKey> {
        lock(&self.shared.state).in_flight.clone()
    }

    pub fn in_flight_count(&self) -> usize {
        lock(&self.shared.state).in_flight.len()
    }

    /// Snapshot of the pending queue, nearest first.
    pub fn queued(&self) -> Vec<QueueEntry> {
        lock(&self.shared.state).queue.iter().copied().collect()
    }

    /// Queue whatever `viewport` shows. Returns the number of queued tiles.
    ///
    /// Must be called from within a tokio runtime.
    pub fn queue_viewport(&self, viewport: &Viewport) -> usize {
        let min_scale = lock(&self.shared.config).min_pixel_scale;
        if viewport.pixel_scale() < min_scale {
            #[cfg(feature = "debug")]
            log::debug!("Pixel scale {:.3} below {}, clearing queue", viewport.pixel_scale(), min_scale);
            self.clear_view();
            return 0;
        }

        match (viewport.visible_tiles(), viewport.center_tile()) {
            (Some(rect), Some(center)) => self.queue_rect(rect, center),
            (_, None) => {
                log::warn!("Center out of bounds, skipping tile queuing");
                self.clear_view();
                0
            }
            (None, _) => {
                self.clear_view();
                0
            }
        }
    }

    /// Queue every tile of `rect` that needs fetching, nearest to `center`
    /// first. The previous queue is discarded.
    ///
    /// Must be called from within a tokio runtime.
    pub fn queue_rect(&self, rect: TileRect, center: (i64, i64)) -> usize {
        let config = self.config();
        let generation;
        let queued;
        {
            let mut state = lock(&self.shared.state);
            state.last_request = Some(QueueRequest { rect, center });
            if state.paused {
                return 0;
            }

            let entries = {
                let cache = lock(&self.shared.cache);
                plan_queue(&rect, center, &cache, &state.in_flight, &config, unix_millis())
            };
            state.generation += 1;
            generation = state.generation;
            queued = entries.len();
            state.queue = entries.into();
        }

        #[cfg(feature = "debug")]
        log::debug!("Queue replaced: {} tiles, generation {}", queued, generation);
        self.emit(SchedulerEvent::QueueReplaced { generation, queued });

        if queued > 0 {
            let scheduler = self.clone();
            spawn(async move { scheduler.drain(generation).await });
        } else {
            self.shared.idle.notify_waiters();
        }
        queued
    }

    /// Stop draining and drop the queue. In-flight transfers still finish.
    pub fn pause(&self) {
        let mut state = lock(&self.shared.state);
        state.paused = true;
        state.queue.clear();
        state.generation += 1;
        drop(state);
        log::info!("Downloads paused");
        self.shared.idle.notify_waiters();
    }

    /// Resume and re-queue the last requested area from scratch.
    pub fn resume(&self) -> usize {
        let request = {
            let mut state = lock(&self.shared.state);
            state.paused = false;
            state.last_request
        };
        log::info!("Downloads resumed");
        match request {
            Some(request) => self.queue_rect(request.rect, request.center),
            None => 0,
        }
    }

    /// Change the drain rate (clamped into [0.1, 10]). A pending queue is
    /// rebuilt so the new interval applies immediately.
    pub fn set_tiles_per_second(&self, rate: f64) -> f64 {
        let rate = clamp_rate(rate);
        lock(&self.shared.config).tiles_per_second = rate;
        self.requeue_if_pending();
        rate
    }

    pub fn set_auto_refresh(&self, enabled: bool) {
        lock(&self.shared.config).auto_refresh = enabled;
        self.requeue_if_pending();
    }

    pub fn set_stale_after_hours(&self, hours: f64) {
        lock(&self.shared.config).stale_after_hours = hours.max(0.0);
        self.requeue_if_pending();
    }

    fn requeue_if_pending(&self) {
        let request = {
            let state = lock(&self.shared.state);
            if state.queue.is_empty() {
                None
            } else {
                state.last_request
            }
        };
        if let Some(request) = request {
            self.queue_rect(request.rect, request.center);
        }
    }

    /// Drop the queue and the remembered view: nothing of the current view
    /// can be queued, so a later resume has nothing to re-queue.
    fn clear_view(&self) {
        let mut state = lock(&self.shared.state);
        state.queue.clear();
        state.last_request = None;
        state.generation += 1;
        drop(state);
        self.shared.idle.notify_waiters();
    }

    pub fn tile_state(&self, tile: TileKey) -> TileState {
        {
            let state = lock(&self.shared.state);
            if state.in_flight.contains(&tile) {
                return TileState::InFlight;
            }
            if state.queue.iter().any(|entry| entry.key() == Some(tile)) {
                return TileState::Queued;
            }
            if state.failed.contains(&tile) {
                return TileState::Failed;
            }
        }
        let cache = lock(&self.shared.cache);
        if cache.is_empty_tile(&tile) {
            TileState::Empty
        } else if cache.is_downloaded(&tile) {
            TileState::Downloaded
        } else {
            TileState::NotQueued
        }
    }

    /// True when nothing is queued and nothing is in flight.
    pub fn is_idle(&self) -> bool {
        let state = lock(&self.shared.state);
        state.queue.is_empty() && state.in_flight.is_empty()
    }

    /// Wait until the queue has drained and every transfer has finished.
    pub async fn wait_until_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            if self.is_idle() {
                return;
            }
            notified.await;
        }
    }

    /// Write the tile-cache document now.
    pub async fn flush(&self) -> Result<()> {
        let (document, downloaded) = {
            let cache = lock(&self.shared.cache);
            (CacheDocument::of(&cache), cache.downloaded_count())
        };
        self.shared.persistence.write_cache(&document).await?;
        self.emit(SchedulerEvent::Flushed { downloaded });
        Ok(())
    }

    fn emit(&self, event: SchedulerEvent) {
        lock(&self.shared.subscribers).retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// The drain loop for one generation.
    async fn drain(self, generation: u64) {
        loop {
            if !self.is_current(generation) {
                #[cfg(feature = "debug")]
                log::debug!("Generation {} superseded, stopping", generation);
                return;
            }

            let permit = match self.shared.permits.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };

            let (claimed, interval) = {
                let mut state = lock(&self.shared.state);
                if state.generation != generation || state.paused {
                    return;
                }
                let Some(entry) = state.queue.pop_front() else {
                    drop(state);
                    self.shared.idle.notify_waiters();
                    return;
                };
                let config = self.config();
                let cache = lock(&self.shared.cache);
                let claimed = claim(&mut state, &cache, &entry, &config, unix_millis());
                (claimed.map(|stale| (entry, stale)), config.pop_interval())
            };

            match claimed {
                Some((entry, stale)) => {
                    self.emit(SchedulerEvent::Status {
                        tile_x: entry.tile_x,
                        tile_y: entry.tile_y,
                        status: TileStatus::Downloading { stale },
                    });
                    let scheduler = self.clone();
                    spawn(async move { scheduler.transfer(entry, permit).await });
                }
                None => drop(permit),
            }

            async_delay(interval).await;
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        let state = lock(&self.shared.state);
        state.generation == generation && !state.paused
    }

    async fn transfer(self, entry: QueueEntry, permit: OwnedSemaphorePermit) {
        let Some(tile) = entry.key() else {
            return;
        };
        let timeout = lock(&self.shared.config).request_timeout_secs;

        let status = match self.fetch(tile, timeout).await {
            Ok(FetchOutcome::Empty) => {
                lock(&self.shared.cache).mark_empty(tile, unix_millis());
                log::info!("Tile {},{} is empty (404), marked as complete", entry.tile_x, entry.tile_y);
                TileStatus::Cleared
            }
            Ok(FetchOutcome::Tile(bytes)) => match self.persist(tile, &bytes).await {
                Ok(path) => {
                    self.complete(entry, tile, path).await;
                    TileStatus::Downloaded
                }
                Err(e) => {
                    log::warn!("Failed to store tile {}: {}", tile, e);
                    TileStatus::Failed
                }
            },
            Err(e) => {
                log::warn!("Failed to download tile {},{}: {}", entry.tile_x, entry.tile_y, e);
                TileStatus::Failed
            }
        };

        {
            let mut state = lock(&self.shared.state);
            state.in_flight.remove(&tile);
            if status == TileStatus::Failed {
                state.failed.insert(tile);
            } else {
                state.failed.remove(&tile);
            }
        }
        drop(permit);

        self.emit(SchedulerEvent::Status {
            tile_x: entry.tile_x,
            tile_y: entry.tile_y,
            status,
        });
        self.shared.idle.notify_waiters();
    }

    async fn fetch(&self, tile: TileKey, timeout: Option<u64>) -> Result<FetchOutcome> {
        let request = self.shared.transport.fetch_tile(tile);
        match timeout {
            Some(secs) => tokio::time::timeout(Duration::from_secs(secs), request)
                .await
                .map_err(|_| ArchiveError::Timeout(tile))?,
            None => request.await,
        }
    }

    async fn persist(&self, tile: TileKey, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.shared.layout.tile_path(tile);
        self.shared.store.create_dir_all(&self.shared.layout.shard_dir(tile)).await?;
        self.shared.store.write_bytes(&path, bytes).await?;
        Ok(path)
    }

    async fn complete(&self, entry: QueueEntry, tile: TileKey, path: PathBuf) {
        let downloaded = {
            let mut cache = lock(&self.shared.cache);
            cache.mark_downloaded(tile, unix_millis());
            cache.downloaded_count()
        };
        log::info!("Downloaded tile {},{} ({} total)", entry.tile_x, entry.tile_y, downloaded);

        let (visible, flush_due) = {
            let mut state = lock(&self.shared.state);
            state.successes += 1;
            let flush_every = lock(&self.shared.config).flush_every.max(1);
            let visible = state
                .last_request
                .map_or(false, |request| request.rect.contains(entry.tile_x, entry.tile_y));
            (visible, state.successes % flush_every == 0)
        };

        if visible {
            self.emit(SchedulerEvent::TileReady {
                tile_x: entry.tile_x,
                tile_y: entry.tile_y,
                path,
            });
        }
        if flush_due {
            if let Err(e) = self.flush().await {
                log::error!("Failed to save downloaded tiles list: {}", e);
            }
        }
    }
}

/// Re-check eligibility of a popped entry against the live cache and mark
/// it in flight. Returns whether it is a stale refresh, or `None` to skip it.
fn claim(
    state: &mut SchedulerState,
    cache: &CacheState,
    entry: &QueueEntry,
    config: &DownloadConfig,
    now: u64,
) -> Option<bool> {
    let tile = entry.key()?;
    if state.in_flight.contains(&tile) {
        return None;
    }
    let record = cache.query(&tile, config.stale_after_hours, now);
    if record.downloaded && !(config.auto_refresh && record.stale) {
        return None;
    }
    state.in_flight.insert(tile);
    Some(record.stale)
}

/// Compute the fetch queue for `rect`: tiles not yet downloaded, or stale
/// ones when auto-refresh is on, minus those already in flight. Sorted by
/// wrap-aware distance from `center` using unnormalized coordinates, one
/// entry per normalized tile.
pub fn plan_queue(
    rect: &TileRect,
    center: (i64, i64),
    cache: &CacheState,
    in_flight: &HashSet<TileKey>,
    config: &DownloadConfig,
    now: u64,
) -> Vec<QueueEntry> {
    let mut entries: Vec<QueueEntry> = rect
        .addressable_tiles()
        .filter_map(|(tile_x, tile_y)| {
            let key = TileKey::new(tile_x, tile_y)?;
            if in_flight.contains(&key) {
                return None;
            }
            let needed = !cache.is_downloaded(&key)
                || (config.auto_refresh && cache.is_stale(&key, config.stale_after_hours, now));
            needed.then(|| QueueEntry {
                tile_x,
                tile_y,
                distance: wrapped_tile_distance((tile_x, tile_y), center),
            })
        })
        .collect();

    entries.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap_or(Ordering::Equal));

    // a view wider than the world would list the same tile twice
    let mut seen = HashSet::default();
    entries.retain(|entry| entry.key().map_or(false, |key| seen.insert(key)));
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(rect: TileRect, center: (i64, i64), cache: &CacheState) -> Vec<QueueEntry> {
        plan_queue(&rect, center, cache, &HashSet::default(), &DownloadConfig::default(), 0)
    }

    fn keys(entries: &[QueueEntry]) -> Vec<String> {
        entries.iter().filter_map(|e| e.key()).map(|k| k.to_string()).collect()
    }

    #[test]
    fn test_seam_queue_normalizes_each_tile_once() {
        let cache = CacheState::new();
        let entries = plan(TileRect::new(2046, 10, 2049, 10), (2048, 10), &cache);

        let mut got = keys(&entries);
        got.sort();
        assert_eq!(got, vec!["0-10", "1-10", "2046-10", "2047-10"]);
        // nearest first
        assert_eq!(entries[0].tile_x, 2048);
    }

    #[test]
    fn test_downloaded_and_empty_tiles_are_skipped() {
        let mut cache = CacheState::new();
        let now = unix_millis();
        cache.mark_downloaded(TileKey { x: 0, y: 0 }, now);
        cache.mark_empty(TileKey { x: 1, y: 0 }, now);

        let entries = plan_queue(
            &TileRect::new(0, 0, 2, 0),
            (0, 0),
            &cache,
            &HashSet::default(),
            &DownloadConfig::default(),
            now,
        );
        assert_eq!(keys(&entries), vec!["2-0"]);
    }

    #[test]
    fn test_stale_tiles_follow_auto_refresh() {
        let mut cache = CacheState::new();
        cache.mark_downloaded(TileKey { x: 5, y: 5 }, 0);
        let now = 2 * 3_600_000;
        let rect = TileRect::new(5, 5, 5, 5);

        let mut config = DownloadConfig::default();
        let entries = plan_queue(&rect, (5, 5), &cache, &HashSet::default(), &config, now);
        assert_eq!(entries.len(), 1);

        config.auto_refresh = false;
        let entries = plan_queue(&rect, (5, 5), &cache, &HashSet::default(), &config, now);
        assert!(entries.is_empty());
    }

    #[test]
    fn test_in_flight_tiles_are_skipped() {
        let cache = CacheState::new();
        let mut in_flight = HashSet::default();
        in_flight.insert(TileKey { x: 3, y: 4 });

        let entries = plan_queue(
            &TileRect::new(3, 4, 4, 4),
            (3, 4),
            &cache,
            &in_flight,
            &DownloadConfig::default(),
            0,
        );
        assert_eq!(keys(&entries), vec!["4-4"]);
    }

    #[test]
    fn test_rows_outside_grid_are_ignored() {
        let cache = CacheState::new();
        let entries = plan(TileRect::new(0, 2046, 0, 2049), (0, 2047), &cache);
        assert_eq!(keys(&entries).len(), 2);
    }
}
