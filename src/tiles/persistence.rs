//! Tile-cache and favorites documents.
//!
//! The tile-cache document has had three shapes over time:
//!
//! * a bare array of downloaded keys,
//! * `{ downloaded, empty, timestamps, favorites }` with bookmarks inline,
//! * `{ downloaded, empty, timestamps }` next to a separate favorites document.
//!
//! Loading accepts all three. Inline bookmarks are moved into the favorites
//! document on load: the favorites document is written first and only then
//! is the cache document rewritten without them, so a crash between the two
//! steps leaves both copies rather than none.

use super::cache::CacheState;
use super::favorites::FavoritePixel;
use crate::core::geo::TileKey;
use crate::prelude::{Arc, Path, PathBuf};
use crate::traits::Store;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StoredCache {
    Legacy(Vec<String>),
    Current(CacheDocument),
}

/// Current tile-cache document. `favorites` is only ever read.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CacheDocument {
    #[serde(default)]
    pub downloaded: Vec<String>,
    #[serde(default)]
    pub empty: Vec<String>,
    #[serde(default)]
    pub timestamps: BTreeMap<String, serde_json::Number>,
    #[serde(default, skip_serializing)]
    pub favorites: Option<BTreeMap<String, FavoritePixel>>,
}

impl CacheDocument {
    /// Snapshot the tile part of `state`.
    pub fn of(state: &CacheState) -> Self {
        Self {
            downloaded: state.downloaded_tiles().iter().map(TileKey::to_string).collect(),
            empty: state.empty_tiles().iter().map(TileKey::to_string).collect(),
            timestamps: state
                .timestamps()
                .into_iter()
                .map(|(tile, ts)| (tile.to_string(), serde_json::Number::from(ts)))
                .collect(),
            favorites: None,
        }
    }
}

/// Favorites document: favorite key to bookmark.
pub type FavoritesDocument = BTreeMap<String, FavoritePixel>;

pub fn favorites_document(state: &CacheState) -> FavoritesDocument {
    state.favorites().into_iter().map(|f| (f.key(), f)).collect()
}

/// Loads and saves [`CacheState`] through a [`Store`].
pub struct CachePersistence {
    store: Arc<dyn Store>,
    cache_path: PathBuf,
    favorites_path: PathBuf,
}

impl CachePersistence {
    pub fn new(store: Arc<dyn Store>, cache_path: impl Into<PathBuf>, favorites_path: impl Into<PathBuf>) -> Self {
        Self {
            store,
            cache_path: cache_path.into(),
            favorites_path: favorites_path.into(),
        }
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    pub fn favorites_path(&self) -> &Path {
        &self.favorites_path
    }

    /// Load both documents, migrating inline bookmarks when present. Absent
    /// documents give an empty state.
    pub async fn load(&self) -> Result<CacheState> {
        let stored = match self.store.read_document(&self.cache_path).await? {
            Some(value) => Some(serde_json::from_value::<StoredCache>(value)?),
            None => None,
        };

        let mut favorites: FavoritesDocument = match self.store.read_document(&self.favorites_path).await? {
            Some(value) => serde_json::from_value(value)?,
            None => FavoritesDocument::new(),
        };

        let document = match stored {
            None => CacheDocument::default(),
            Some(StoredCache::Legacy(keys)) => {
                log::info!("Loaded legacy tile list with {} entries", keys.len());
                CacheDocument {
                    downloaded: keys,
                    ..CacheDocument::default()
                }
            }
            Some(StoredCache::Current(document)) => document,
        };

        if let Some(inline) = &document.favorites {
            let mut migrated = 0;
            for (key, favorite) in inline {
                if !favorites.contains_key(key) {
                    favorites.insert(key.clone(), favorite.clone());
                    migrated += 1;
                }
            }
            log::info!("Migrating {} inline favorites ({} new)", inline.len(), migrated);
            self.migrate(&document, &favorites).await;
        }

        let state = CacheState::from_parts(
            parse_keys(&document.downloaded),
            parse_keys(&document.empty),
            parse_timestamps(&document.timestamps),
            favorites.into_values(),
        );
        log::info!(
            "Loaded {} downloaded tiles ({} empty), {} favorites",
            state.downloaded_count(),
            state.empty_count(),
            state.favorites().len()
        );
        Ok(state)
    }

    async fn migrate(&self, document: &CacheDocument, favorites: &FavoritesDocument) {
        if let Err(e) = self.write_favorites(favorites).await {
            log::error!("Failed to write migrated favorites, keeping inline copy: {}", e);
            return;
        }
        if let Err(e) = self.write_cache(document).await {
            log::error!("Failed to rewrite tile cache without favorites: {}", e);
        }
    }

    pub async fn write_cache(&self, document: &CacheDocument) -> Result<()> {
        let value = serde_json::to_value(document)?;
        self.store.write_document(&self.cache_path, &value).await
    }

    pub async fn write_favorites(&self, favorites: &FavoritesDocument) -> Result<()> {
        let value = serde_json::to_value(favorites)?;
        self.store.write_document(&self.favorites_path, &value).await
    }
}

fn parse_keys(keys: &[String]) -> Vec<TileKey> {
    keys.iter()
        .filter_map(|key| match key.parse::<TileKey>() {
            Ok(tile) => Some(tile),
            Err(e) => {
                log::warn!("Skipping tile entry: {}", e);
                None
            }
        })
        .collect()
}

fn parse_timestamps(timestamps: &BTreeMap<String, serde_json::Number>) -> Vec<(TileKey, u64)> {
    timestamps
        .iter()
        .filter_map(|(key, ts)| {
            let tile = key.parse::<TileKey>().ok()?;
            let millis = ts
                .as_u64()
                .or_else(|| ts.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))?;
            Some((tile, millis))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geo::PixelAddress;
    use crate::tiles::store::MemoryStore;
    use serde_json::json;

    fn persistence(store: &Arc<MemoryStore>) -> CachePersistence {
        CachePersistence::new(store.clone(), "downloaded_tiles.json", "favorites.json")
    }

    #[tokio::test]
    async fn test_absent_documents_give_empty_state() {
        let store = Arc::new(MemoryStore::new());
        let state = persistence(&store).load().await.unwrap();
        assert_eq!(state.downloaded_count(), 0);
        assert!(state.favorites().is_empty());
    }

    #[tokio::test]
    async fn test_legacy_array_has_no_empty_or_timestamps() {
        let store = Arc::new(MemoryStore::new());
        store
            .write_document(Path::new("downloaded_tiles.json"), &json!(["1-2", "2047-0", "bogus"]))
            .await
            .unwrap();

        let state = persistence(&store).load().await.unwrap();
        assert_eq!(state.downloaded_tiles(), vec![TileKey { x: 1, y: 2 }, TileKey { x: 2047, y: 0 }]);
        assert_eq!(state.empty_count(), 0);
        assert!(state.timestamps().is_empty());
    }

    #[tokio::test]
    async fn test_inline_favorites_are_migrated() {
        let store = Arc::new(MemoryStore::new());
        let doc = json!({
            "downloaded": ["4-4"],
            "empty": ["4-4"],
            "timestamps": { "4-4": 1000.0 },
            "favorites": {
                "1-2-3-4": { "tileX": 1, "tileY": 2, "pixelX": 3, "pixelY": 4, "name": "a", "timestamp": 5 }
            }
        });
        store.write_document(Path::new("downloaded_tiles.json"), &doc).await.unwrap();

        let state = persistence(&store).load().await.unwrap();
        assert!(state.is_favorite("1-2-3-4"));
        assert!(state.is_empty_tile(&TileKey { x: 4, y: 4 }));
        assert_eq!(state.timestamp(&TileKey { x: 4, y: 4 }), Some(1000));

        let favorites = store.read_document(Path::new("favorites.json")).await.unwrap().unwrap();
        assert_eq!(favorites["1-2-3-4"]["name"], "a");
        let cache = store.read_document(Path::new("downloaded_tiles.json")).await.unwrap().unwrap();
        assert!(cache.get("favorites").is_none());
        assert_eq!(cache["downloaded"], json!(["4-4"]));

        // second load is a no-op migration
        let again = persistence(&store).load().await.unwrap();
        assert_eq!(again.favorites(), state.favorites());
    }

    #[tokio::test]
    async fn test_favorites_document_wins_on_conflict() {
        let store = Arc::new(MemoryStore::new());
        let doc = json!({
            "downloaded": [],
            "favorites": {
                "1-2-3-4": { "tileX": 1, "tileY": 2, "pixelX": 3, "pixelY": 4, "name": "old", "timestamp": 1 }
            }
        });
        store.write_document(Path::new("downloaded_tiles.json"), &doc).await.unwrap();
        let current = FavoritePixel::new(PixelAddress::new(1, 2, 3, 4), Some("new".into()), 2);
        let mut favorites = FavoritesDocument::new();
        favorites.insert(current.key(), current.clone());
        persistence(&store).write_favorites(&favorites).await.unwrap();

        let state = persistence(&store).load().await.unwrap();
        assert_eq!(state.favorites(), vec![current]);
    }

    #[tokio::test]
    async fn test_failed_favorites_write_keeps_inline_copy() {
        let store = Arc::new(MemoryStore::new());
        let doc = json!({
            "downloaded": ["0-0"],
            "favorites": {
                "0-0-1-1": { "tileX": 0, "tileY": 0, "pixelX": 1, "pixelY": 1, "name": "x", "timestamp": 1 }
            }
        });
        store.write_document(Path::new("downloaded_tiles.json"), &doc).await.unwrap();
        store.set_fail_writes(true);

        let state = persistence(&store).load().await.unwrap();
        assert!(state.is_favorite("0-0-1-1"));
        let cache = store.read_document(Path::new("downloaded_tiles.json")).await.unwrap().unwrap();
        assert!(cache.get("favorites").is_some());
    }

    #[tokio::test]
    async fn test_save_round_trip() {
        let store = Arc::new(MemoryStore::new());
        let mut state = CacheState::new();
        state.mark_downloaded(TileKey { x: 7, y: 8 }, 42);
        state.mark_empty(TileKey { x: 9, y: 8 }, 43);
        state.add_favorite(FavoritePixel::new(PixelAddress::new(7, 8, 0, 0), None, 44));

        let persistence = persistence(&store);
        persistence.write_cache(&CacheDocument::of(&state)).await.unwrap();
        persistence.write_favorites(&favorites_document(&state)).await.unwrap();

        let loaded = persistence.load().await.unwrap();
        assert_eq!(loaded.downloaded_tiles(), state.downloaded_tiles());
        assert_eq!(loaded.empty_tiles(), state.empty_tiles());
        assert_eq!(loaded.timestamps(), state.timestamps());
        assert_eq!(loaded.favorites(), state.favorites());
    }
}
