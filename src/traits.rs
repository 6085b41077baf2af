//! Collaborator interfaces
//!
//! The archive never touches the network or the filesystem itself. A
//! [`Transport`] fetches tile bytes and a [`Store`] performs durable reads and
//! writes. Both are object safe so the archive can hold them as `Arc<dyn _>`.

use crate::core::geo::TileKey;
use crate::Result;
use async_trait::async_trait;
use std::path::Path;

/// Outcome of a tile fetch that reached the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The tile exists; these are its encoded bytes.
    Tile(Vec<u8>),
    /// The server answered 404: the tile has no content.
    Empty,
}

/// Fetches tile bytes for a normalized tile address.
///
/// A 404 must be reported as `Ok(FetchOutcome::Empty)`. Every other non-success
/// status and every transport-level failure is an `Err` and is retried on the
/// next queueing pass.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch_tile(&self, tile: TileKey) -> Result<FetchOutcome>;
}

/// Durable storage for tile files, small JSON documents and exports.
///
/// Paths are relative to whatever root the implementation was built with.
#[async_trait]
pub trait Store: Send + Sync {
    /// Read a whole file.
    async fn read_bytes(&self, path: &Path) -> Result<Vec<u8>>;

    /// Write a whole file, replacing any previous content.
    async fn write_bytes(&self, path: &Path, data: &[u8]) -> Result<()>;

    /// Read a JSON document. `Ok(None)` means the document does not exist.
    async fn read_document(&self, path: &Path) -> Result<Option<serde_json::Value>>;

    /// Write a JSON document.
    async fn write_document(&self, path: &Path, document: &serde_json::Value) -> Result<()>;

    /// Create a directory and all of its parents. Idempotent.
    async fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Size of a stored file, `None` if absent.
    async fn file_size(&self, path: &Path) -> Result<Option<u64>>;

    /// Show a stored file to the user (file manager, shell, ...).
    async fn reveal(&self, path: &Path) -> Result<()>;
}
