use super::cache::CacheState;
use super::source::TileLayout;
use crate::traits::Store;
use crate::Result;
use serde::Serialize;
use std::ops::RangeInclusive;

/// Counts over the downloaded tiles of a column range.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RangeSummary {
    pub tiles: usize,
    pub empty: usize,
    pub non_empty: usize,
    /// Bytes on disk over the non-empty tiles that have a file
    pub total_bytes: u64,
    pub missing_files: usize,
}

impl RangeSummary {
    pub fn average_file_size(&self) -> f64 {
        let present = self.non_empty.saturating_sub(self.missing_files);
        if present == 0 {
            0.0
        } else {
            self.total_bytes as f64 / present as f64
        }
    }

    /// Summarize downloaded tiles with `x` in `columns` and `y < below_row`.
    pub async fn collect(
        cache: &CacheState,
        store: &dyn Store,
        layout: &TileLayout,
        columns: RangeInclusive<u32>,
        below_row: u32,
    ) -> Result<Self> {
        let mut summary = RangeSummary::default();
        let tiles: Vec<_> = cache
            .downloaded_tiles()
            .into_iter()
            .filter(|tile| columns.contains(&tile.x) && tile.y < below_row)
            .map(|tile| (tile, cache.is_empty_tile(&tile)))
            .collect();

        for (tile, empty) in tiles {
            summary.tiles += 1;
            if empty {
                summary.empty += 1;
                continue;
            }
            summary.non_empty += 1;

            match store.file_size(&layout.tile_path(tile)).await? {
                Some(size) => summary.total_bytes += size,
                None => {
                    log::warn!("File not found: {}", layout.tile_path(tile).display());
                    summary.missing_files += 1;
                }
            }
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geo::TileKey;
    use crate::tiles::store::MemoryStore;

    #[tokio::test]
    async fn test_range_summary_counts() {
        let layout = TileLayout::default();
        let store = MemoryStore::new();
        let mut cache = CacheState::new();

        cache.mark_downloaded(TileKey { x: 600, y: 10 }, 1);
        store.insert(layout.tile_path(TileKey { x: 600, y: 10 }), vec![0; 300]);
        cache.mark_downloaded(TileKey { x: 601, y: 10 }, 1);
        store.insert(layout.tile_path(TileKey { x: 601, y: 10 }), vec![0; 100]);
        cache.mark_downloaded(TileKey { x: 602, y: 10 }, 1);
        cache.mark_empty(TileKey { x: 603, y: 10 }, 1);
        cache.mark_downloaded(TileKey { x: 700, y: 10 }, 1);
        cache.mark_downloaded(TileKey { x: 600, y: 1500 }, 1);

        let summary = RangeSummary::collect(&cache, &store, &layout, 598..=606, 1450)
            .await
            .unwrap();
        assert_eq!(summary.tiles, 4);
        assert_eq!(summary.empty, 1);
        assert_eq!(summary.non_empty, 3);
        assert_eq!(summary.total_bytes, 400);
        assert_eq!(summary.missing_files, 1);
        assert_eq!(summary.average_file_size(), 200.0);
    }
}
