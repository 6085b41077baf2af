//! Shared fixtures for the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use image::{Rgba, RgbaImage};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tilekeep::compositor::encode_png;
use tilekeep::{
    ArchiveBuilder, ArchiveError, DownloadConfig, FetchOutcome, MemoryStore, TileArchive, TileKey, Transport,
};
use tokio::time::Instant;

/// How the scripted transport answers for one tile.
#[derive(Debug, Clone)]
pub enum Reply {
    Png([u8; 4]),
    NotFound,
    /// Fail this many times, then serve a tile of the given color
    FailThenPng(u32, [u8; 4]),
}

/// Transport that answers from a script and records every request, when it
/// started, and how many were running at once.
pub struct ScriptedTransport {
    replies: Mutex<HashMap<TileKey, Reply>>,
    default: Reply,
    fetched: Mutex<Vec<TileKey>>,
    started: Mutex<Vec<Instant>>,
    delay: Mutex<Duration>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedTransport {
    /// Every unscripted tile is served as a solid tile of `color`.
    pub fn serving(color: [u8; 4]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(HashMap::new()),
            default: Reply::Png(color),
            fetched: Mutex::new(Vec::new()),
            started: Mutex::new(Vec::new()),
            delay: Mutex::new(Duration::ZERO),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        })
    }

    /// Make every response take `delay` (virtual time under a paused clock).
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    /// Request start times in milliseconds after `origin`.
    pub fn start_offsets(&self, origin: Instant) -> Vec<u128> {
        self.started
            .lock()
            .unwrap()
            .iter()
            .map(|t| t.duration_since(origin).as_millis())
            .collect()
    }

    /// Most requests ever running at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn script(&self, x: u32, y: u32, reply: Reply) {
        self.replies.lock().unwrap().insert(TileKey { x, y }, reply);
    }

    pub fn fetched(&self) -> Vec<TileKey> {
        self.fetched.lock().unwrap().clone()
    }

    pub fn fetch_count(&self, x: u32, y: u32) -> usize {
        self.fetched().iter().filter(|t| **t == TileKey { x, y }).count()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn fetch_tile(&self, tile: TileKey) -> tilekeep::Result<FetchOutcome> {
        self.fetched.lock().unwrap().push(tile);
        self.started.lock().unwrap().push(Instant::now());
        let running = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        let reply = {
            let mut replies = self.replies.lock().unwrap();
            match replies.get_mut(&tile) {
                Some(Reply::FailThenPng(remaining, _)) if *remaining > 0 => {
                    *remaining -= 1;
                    None
                }
                Some(Reply::FailThenPng(_, color)) => Some(Reply::Png(*color)),
                Some(reply) => Some(reply.clone()),
                None => Some(self.default.clone()),
            }
        };
        match reply {
            Some(Reply::Png(color)) => Ok(FetchOutcome::Tile(solid_png(color, 1000))),
            Some(Reply::NotFound) => Ok(FetchOutcome::Empty),
            _ => Err(ArchiveError::Http { status: 503, tile }),
        }
    }
}

pub fn solid_png(color: [u8; 4], size: u32) -> Vec<u8> {
    let image = RgbaImage::from_pixel(size, size, Rgba(color));
    encode_png(&image).unwrap()
}

/// In-memory archive driven by `transport`.
pub fn archive(transport: &Arc<ScriptedTransport>, store: &Arc<MemoryStore>) -> TileArchive {
    init_logging();
    ArchiveBuilder::in_memory()
        .with_store(store.clone())
        .with_transport(transport.clone())
        .build()
        .unwrap()
}

/// In-memory archive with a specific download configuration.
pub fn archive_with(
    transport: &Arc<ScriptedTransport>,
    store: &Arc<MemoryStore>,
    download: DownloadConfig,
) -> TileArchive {
    init_logging();
    ArchiveBuilder::in_memory()
        .with_download_config(download)
        .with_store(store.clone())
        .with_transport(transport.clone())
        .build()
        .unwrap()
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
