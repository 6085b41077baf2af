//! Archive builder for fluent configuration
//!
//! Collaborators default to the real thing (HTTP transport, filesystem store
//! under the configured root); tests and embedders inject their own.

use crate::core::archive::TileArchive;
use crate::core::config::{ArchiveConfig, DownloadConfig, ExportConfig};
use crate::prelude::{Arc, PathBuf};
use crate::tiles::source::WplaceSource;
use crate::tiles::store::{FsStore, MemoryStore};
use crate::tiles::transport::HttpTransport;
use crate::traits::{Store, Transport};
use crate::Result;
use std::time::Duration;

/// Builder for [`TileArchive`]
pub struct ArchiveBuilder {
    config: ArchiveConfig,
    transport: Option<Arc<dyn Transport>>,
    store: Option<Arc<dyn Store>>,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self {
            config: ArchiveConfig::default(),
            transport: None,
            store: None,
        }
    }

    /// Everything in memory; the transport still has to be supplied.
    pub fn in_memory() -> Self {
        Self::new()
            .with_config(ArchiveConfig::for_testing())
            .with_store(Arc::new(MemoryStore::new()))
    }

    pub fn with_config(mut self, config: ArchiveConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_download_config(mut self, config: DownloadConfig) -> Self {
        self.config.download = config;
        self
    }

    pub fn with_export_config(mut self, config: ExportConfig) -> Self {
        self.config.export = config;
        self
    }

    /// Root directory for the default filesystem store
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.storage.root = root.into();
        self
    }

    pub fn with_tiles_per_second(mut self, rate: f64) -> Self {
        self.config.download.tiles_per_second = rate;
        self
    }

    pub fn with_auto_refresh(mut self, enabled: bool, stale_after_hours: f64) -> Self {
        self.config.download.auto_refresh = enabled;
        self.config.download.stale_after_hours = stale_after_hours;
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    /// Build an archive with an empty cache, without touching the store.
    pub fn build(self) -> Result<TileArchive> {
        self.config.validate()?;

        let store: Arc<dyn Store> = match self.store {
            Some(store) => store,
            None => Arc::new(FsStore::new(self.config.storage.root.clone())),
        };
        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => {
                let source = WplaceSource::with_template(self.config.download.tile_url.clone());
                let timeout = self.config.download.request_timeout_secs.map(Duration::from_secs);
                Arc::new(HttpTransport::new(source).with_timeout(timeout))
            }
        };

        Ok(TileArchive::new(self.config, transport, store))
    }

    /// Build an archive and load the persisted cache and favorites.
    pub async fn open(self) -> Result<TileArchive> {
        let archive = self.build()?;
        archive.reload().await?;
        Ok(archive)
    }
}

impl Default for ArchiveBuilder {
    fn default() -> Self {
        Self::new()
    }
}
