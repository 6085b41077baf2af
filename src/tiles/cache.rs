//! In-memory record of which tiles are downloaded, known to be empty, or
//! stale, plus favorite-pixel bookmarks.
//!
//! Other concerns never read these collections directly: they subscribe to
//! [`CacheEvent`]s or ask for a [`TileRecord`].

use super::favorites::FavoritePixel;
use crate::core::geo::TileKey;
use crate::prelude::{HashMap, HashSet};
use crossbeam_channel::{unbounded, Receiver, Sender};

/// Change notification emitted on every cache mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheEvent {
    Downloaded { tile: TileKey, timestamp: u64 },
    Empty { tile: TileKey, timestamp: u64 },
    FavoriteAdded(FavoritePixel),
    FavoriteRemoved(FavoritePixel),
    /// The whole state was replaced from persisted documents.
    Loaded { downloaded: usize, empty: usize },
}

/// Derived view of one tile's cache membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TileRecord {
    pub downloaded: bool,
    pub empty: bool,
    pub stale: bool,
}

#[derive(Debug, Default)]
pub struct CacheState {
    downloaded: HashSet<TileKey>,
    empty: HashSet<TileKey>,
    timestamps: HashMap<TileKey, u64>,
    favorites: HashMap<String, FavoritePixel>,
    subscribers: Vec<Sender<CacheEvent>>,
}

impl CacheState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a state from loaded collections. Empty tiles missing from the
    /// downloaded set are added to it.
    pub fn from_parts(
        downloaded: impl IntoIterator<Item = TileKey>,
        empty: impl IntoIterator<Item = TileKey>,
        timestamps: impl IntoIterator<Item = (TileKey, u64)>,
        favorites: impl IntoIterator<Item = FavoritePixel>,
    ) -> Self {
        let mut state = Self {
            downloaded: downloaded.into_iter().collect(),
            empty: empty.into_iter().collect(),
            timestamps: timestamps.into_iter().collect(),
            favorites: favorites.into_iter().map(|f| (f.key(), f)).collect(),
            subscribers: Vec::new(),
        };

        let orphaned: Vec<TileKey> = state
            .empty
            .iter()
            .filter(|tile| !state.downloaded.contains(tile))
            .copied()
            .collect();
        if !orphaned.is_empty() {
            log::warn!("{} empty tiles were not marked downloaded; repairing", orphaned.len());
            state.downloaded.extend(orphaned);
        }
        state
    }

    /// Replace all cached data with `other`, keeping subscribers.
    pub fn replace_with(&mut self, other: CacheState) {
        self.downloaded = other.downloaded;
        self.empty = other.empty;
        self.timestamps = other.timestamps;
        self.favorites = other.favorites;
        let event = CacheEvent::Loaded {
            downloaded: self.downloaded.len(),
            empty: self.empty.len(),
        };
        self.emit(event);
    }

    /// Receive every subsequent [`CacheEvent`].
    pub fn subscribe(&mut self) -> Receiver<CacheEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.push(tx);
        rx
    }

    fn emit(&mut self, event: CacheEvent) {
        // drop subscribers whose receiver is gone
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Record a successful fetch. A tile that used to be empty has content now.
    pub fn mark_downloaded(&mut self, tile: TileKey, timestamp: u64) {
        self.downloaded.insert(tile);
        self.empty.remove(&tile);
        self.timestamps.insert(tile, timestamp);
        self.emit(CacheEvent::Downloaded { tile, timestamp });
    }

    /// Record that the upstream has no content for `tile`.
    pub fn mark_empty(&mut self, tile: TileKey, timestamp: u64) {
        self.downloaded.insert(tile);
        self.empty.insert(tile);
        self.timestamps.insert(tile, timestamp);
        self.emit(CacheEvent::Empty { tile, timestamp });
    }

    pub fn is_downloaded(&self, tile: &TileKey) -> bool {
        self.downloaded.contains(tile)
    }

    pub fn is_empty_tile(&self, tile: &TileKey) -> bool {
        self.empty.contains(tile)
    }

    pub fn timestamp(&self, tile: &TileKey) -> Option<u64> {
        self.timestamps.get(tile).copied()
    }

    /// True once the last fetch is more than `ttl_hours` old. A tile without
    /// a timestamp is never stale.
    pub fn is_stale(&self, tile: &TileKey, ttl_hours: f64, now: u64) -> bool {
        match self.timestamps.get(tile) {
            Some(&timestamp) => {
                let age_hours = now.saturating_sub(timestamp) as f64 / 3_600_000.0;
                age_hours > ttl_hours
            }
            None => false,
        }
    }

    pub fn query(&self, tile: &TileKey, ttl_hours: f64, now: u64) -> TileRecord {
        TileRecord {
            downloaded: self.is_downloaded(tile),
            empty: self.is_empty_tile(tile),
            stale: self.is_stale(tile, ttl_hours, now),
        }
    }

    pub fn downloaded_count(&self) -> usize {
        self.downloaded.len()
    }

    pub fn empty_count(&self) -> usize {
        self.empty.len()
    }

    pub fn stale_count(&self, ttl_hours: f64, now: u64) -> usize {
        self.downloaded
            .iter()
            .filter(|tile| self.is_stale(tile, ttl_hours, now))
            .count()
    }

    /// Downloaded tiles in key order.
    pub fn downloaded_tiles(&self) -> Vec<TileKey> {
        let mut tiles: Vec<_> = self.downloaded.iter().copied().collect();
        tiles.sort();
        tiles
    }

    pub fn empty_tiles(&self) -> Vec<TileKey> {
        let mut tiles: Vec<_> = self.empty.iter().copied().collect();
        tiles.sort();
        tiles
    }

    pub fn timestamps(&self) -> Vec<(TileKey, u64)> {
        let mut stamps: Vec<_> = self.timestamps.iter().map(|(k, v)| (*k, *v)).collect();
        stamps.sort();
        stamps
    }

    /// Add or replace a bookmark. Returns the previous one under the same key.
    pub fn add_favorite(&mut self, favorite: FavoritePixel) -> Option<FavoritePixel> {
        let previous = self.favorites.insert(favorite.key(), favorite.clone());
        self.emit(CacheEvent::FavoriteAdded(favorite));
        previous
    }

    pub fn remove_favorite(&mut self, key: &str) -> Option<FavoritePixel> {
        let removed = self.favorites.remove(key)?;
        self.emit(CacheEvent::FavoriteRemoved(removed.clone()));
        Some(removed)
    }

    pub fn is_favorite(&self, key: &str) -> bool {
        self.favorites.contains_key(key)
    }

    /// Bookmarks, oldest first.
    pub fn favorites(&self) -> Vec<FavoritePixel> {
        let mut favorites: Vec<_> = self.favorites.values().cloned().collect();
        favorites.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.key().cmp(&b.key())));
        favorites
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geo::PixelAddress;

    const HOUR: u64 = 3_600_000;

    fn key(x: u32, y: u32) -> TileKey {
        TileKey { x, y }
    }

    #[test]
    fn test_fresh_tile_is_not_stale() {
        let mut cache = CacheState::new();
        cache.mark_downloaded(key(1, 1), 10 * HOUR);

        assert!(!cache.is_stale(&key(1, 1), 1.0, 10 * HOUR));
        assert!(!cache.is_stale(&key(1, 1), 1.0, 11 * HOUR));
        assert!(cache.is_stale(&key(1, 1), 1.0, 11 * HOUR + 1));
    }

    #[test]
    fn test_missing_timestamp_is_not_stale() {
        let cache = CacheState::from_parts(vec![key(3, 3)], vec![], vec![], vec![]);
        assert!(cache.is_downloaded(&key(3, 3)));
        assert!(!cache.is_stale(&key(3, 3), 1.0, u64::MAX));
    }

    #[test]
    fn test_empty_stays_subset_of_downloaded() {
        let mut cache = CacheState::new();
        cache.mark_empty(key(0, 0), 1);
        cache.mark_downloaded(key(1, 0), 1);
        cache.mark_empty(key(1, 0), 2);
        cache.mark_downloaded(key(0, 0), 3);

        for tile in cache.empty_tiles() {
            assert!(cache.is_downloaded(&tile));
        }
        assert_eq!(cache.empty_tiles(), vec![key(1, 0)]);
        assert_eq!(cache.query(&key(1, 0), 1.0, 2), TileRecord {
            downloaded: true,
            empty: true,
            stale: false
        });
    }

    #[test]
    fn test_from_parts_repairs_orphaned_empty() {
        let cache = CacheState::from_parts(vec![], vec![key(5, 6)], vec![(key(5, 6), 1)], vec![]);
        assert!(cache.is_downloaded(&key(5, 6)));
        assert!(cache.is_empty_tile(&key(5, 6)));
    }

    #[test]
    fn test_subscribers_receive_events() {
        let mut cache = CacheState::new();
        let rx = cache.subscribe();

        cache.mark_empty(key(2, 2), 5);
        let favorite = FavoritePixel::new(PixelAddress::new(2, 2, 1, 1), Some("a".into()), 6);
        cache.add_favorite(favorite.clone());
        cache.remove_favorite(&favorite.key());

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0], CacheEvent::Empty { tile: key(2, 2), timestamp: 5 });
        assert_eq!(events[2], CacheEvent::FavoriteRemoved(favorite));
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let mut cache = CacheState::new();
        drop(cache.subscribe());
        cache.mark_downloaded(key(0, 1), 1);
        assert!(cache.subscribers.is_empty());
    }
}
