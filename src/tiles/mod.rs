pub mod cache;
pub mod favorites;
pub mod persistence;
pub mod scheduler;
pub mod source;
pub mod stats;
pub mod store;
pub mod transport;
pub mod visible;

// Re-exports for convenience
pub use cache::{CacheEvent, CacheState, TileRecord};
pub use scheduler::DownloadScheduler;
pub use source::{TileLayout, TileSource, WplaceSource};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the data if a panicking thread poisoned it. All
/// guarded state here is updated in single steps, so it stays consistent.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
