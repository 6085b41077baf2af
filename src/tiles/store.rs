//! [`Store`] implementations: the real filesystem and an in-memory map for
//! tests and dry runs.

use crate::prelude::{HashMap, Mutex, Path, PathBuf};
use crate::traits::Store;
use crate::{ArchiveError, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Filesystem store rooted at a directory. Every path handed to it is
/// resolved relative to that root.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        self.root.join(path)
    }
}

#[async_trait]
impl Store for FsStore {
    async fn read_bytes(&self, path: &Path) -> Result<Vec<u8>> {
        let full = self.resolve(path);
        match tokio::fs::read(&full).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ArchiveError::NotFound(full)),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_bytes(&self, path: &Path, data: &[u8]) -> Result<()> {
        let full = self.resolve(path);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, data).await?;
        Ok(())
    }

    async fn read_document(&self, path: &Path) -> Result<Option<serde_json::Value>> {
        let full = self.resolve(path);
        let text = match tokio::fs::read_to_string(&full).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&text)?))
    }

    async fn write_document(&self, path: &Path, document: &serde_json::Value) -> Result<()> {
        let text = serde_json::to_string_pretty(document)?;
        self.write_bytes(path, text.as_bytes()).await
    }

    async fn create_dir_all(&self, path: &Path) -> Result<()> {
        tokio::fs::create_dir_all(self.resolve(path)).await?;
        Ok(())
    }

    async fn file_size(&self, path: &Path) -> Result<Option<u64>> {
        match tokio::fs::metadata(self.resolve(path)).await {
            Ok(meta) => Ok(Some(meta.len())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn reveal(&self, path: &Path) -> Result<()> {
        let full = self.resolve(path);
        if !tokio::fs::try_exists(&full).await? {
            return Err(ArchiveError::NotFound(full));
        }

        #[cfg(target_os = "windows")]
        let command = {
            let mut command = tokio::process::Command::new("explorer");
            command.arg(format!("/select,{}", full.display()));
            command
        };
        #[cfg(target_os = "macos")]
        let command = {
            let mut command = tokio::process::Command::new("open");
            command.arg("-R").arg(&full);
            command
        };
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        let command = {
            let mut command = tokio::process::Command::new("xdg-open");
            command.arg(full.parent().unwrap_or(self.root.as_path()));
            command
        };

        run_opener(command).await?;
        log::info!("Revealed {}", full.display());
        Ok(())
    }
}

/// Run a file-manager command to completion so the child is reaped. A
/// non-zero exit is logged, not returned: the file exists either way.
async fn run_opener(mut command: tokio::process::Command) -> Result<()> {
    let status = command.status().await?;
    if !status.success() {
        log::warn!("File manager exited with {}", status);
    }
    Ok(())
}

/// In-memory store. Documents are kept as serialized JSON bytes so they go
/// through the same encode/decode path as on disk.
#[derive(Debug, Default)]
pub struct MemoryStore {
    files: Mutex<HashMap<PathBuf, Vec<u8>>>,
    revealed: Mutex<Vec<PathBuf>>,
    reads: AtomicUsize,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `read_bytes` calls served so far.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Make every subsequent write fail with an IO error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.lock_files().contains_key(path)
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<_> = self.lock_files().keys().cloned().collect();
        paths.sort();
        paths
    }

    pub fn revealed(&self) -> Vec<PathBuf> {
        self.revealed.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Seed a file directly.
    pub fn insert(&self, path: impl Into<PathBuf>, data: Vec<u8>) {
        self.lock_files().insert(path.into(), data);
    }

    fn lock_files(&self) -> std::sync::MutexGuard<'_, HashMap<PathBuf, Vec<u8>>> {
        // a poisoned map is still a consistent map of whole files
        self.files.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_writable(&self, path: &Path) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                format!("writes disabled: {}", path.display()),
            )
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn read_bytes(&self, path: &Path) -> Result<Vec<u8>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.lock_files()
            .get(path)
            .cloned()
            .ok_or_else(|| ArchiveError::NotFound(path.to_path_buf()))
    }

    async fn write_bytes(&self, path: &Path, data: &[u8]) -> Result<()> {
        self.check_writable(path)?;
        self.lock_files().insert(path.to_path_buf(), data.to_vec());
        Ok(())
    }

    async fn read_document(&self, path: &Path) -> Result<Option<serde_json::Value>> {
        match self.lock_files().get(path) {
            Some(data) => Ok(Some(serde_json::from_slice(data)?)),
            None => Ok(None),
        }
    }

    async fn write_document(&self, path: &Path, document: &serde_json::Value) -> Result<()> {
        let data = serde_json::to_vec_pretty(document)?;
        self.write_bytes(path, &data).await
    }

    async fn create_dir_all(&self, path: &Path) -> Result<()> {
        self.check_writable(path)
    }

    async fn file_size(&self, path: &Path) -> Result<Option<u64>> {
        Ok(self.lock_files().get(path).map(|data| data.len() as u64))
    }

    async fn reveal(&self, path: &Path) -> Result<()> {
        if !self.contains(path) {
            return Err(ArchiveError::NotFound(path.to_path_buf()));
        }
        if let Ok(mut revealed) = self.revealed.lock() {
            revealed.push(path.to_path_buf());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fs_store_documents() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        let path = Path::new("nested/doc.json");

        assert!(store.read_document(path).await.unwrap().is_none());
        store
            .write_document(path, &serde_json::json!({ "downloaded": ["1-2"] }))
            .await
            .unwrap();
        let doc = store.read_document(path).await.unwrap().unwrap();
        assert_eq!(doc["downloaded"][0], "1-2");
        assert!(store.file_size(path).await.unwrap().unwrap() > 0);
    }

    #[tokio::test]
    async fn test_fs_store_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        let err = store.read_bytes(Path::new("tiles/0/0/1_1.png")).await.unwrap_err();
        assert!(matches!(err, ArchiveError::NotFound(_)));
        assert!(store.file_size(Path::new("nope")).await.unwrap().is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_opener_runs_to_completion() {
        run_opener(tokio::process::Command::new("true")).await.unwrap();
        // a failing opener is logged only
        run_opener(tokio::process::Command::new("false")).await.unwrap();
        assert!(run_opener(tokio::process::Command::new("/nonexistent/opener")).await.is_err());
    }

    #[tokio::test]
    async fn test_memory_store_counts_reads_and_fails_writes() {
        let store = MemoryStore::new();
        store.write_bytes(Path::new("a"), b"abc").await.unwrap();
        assert_eq!(store.read_bytes(Path::new("a")).await.unwrap(), b"abc");
        assert_eq!(store.reads(), 1);

        store.set_fail_writes(true);
        assert!(store.write_bytes(Path::new("b"), b"x").await.is_err());
        assert!(!store.contains(Path::new("b")));
    }

    #[tokio::test]
    async fn test_memory_store_reveal_requires_file() {
        let store = MemoryStore::new();
        assert!(store.reveal(Path::new("x.png")).await.is_err());
        store.insert("x.png", vec![1]);
        store.reveal(Path::new("x.png")).await.unwrap();
        assert_eq!(store.revealed(), vec![PathBuf::from("x.png")]);
    }
}
