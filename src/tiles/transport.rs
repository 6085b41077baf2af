use super::source::{TileSource, WplaceSource};
use crate::core::geo::TileKey;
use crate::traits::{FetchOutcome, Transport};
use crate::{ArchiveError, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use std::time::Duration;

/// Shared async HTTP client used for every tile fetch
pub(crate) static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .user_agent(concat!("tilekeep/", env!("CARGO_PKG_VERSION")))
        .tcp_keepalive(Duration::from_secs(30))
        .pool_idle_timeout(Duration::from_secs(90))
        .pool_max_idle_per_host(4)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
});

/// [`Transport`] over HTTP. A 404 becomes [`FetchOutcome::Empty`], any other
/// non-success status an [`ArchiveError::Http`].
pub struct HttpTransport {
    source: Box<dyn TileSource>,
    timeout: Option<Duration>,
}

impl HttpTransport {
    pub fn new(source: impl TileSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            timeout: Some(Duration::from_secs(30)),
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new(WplaceSource::new())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch_tile(&self, tile: TileKey) -> Result<FetchOutcome> {
        let url = self.source.url(tile);

        #[cfg(feature = "debug")]
        log::debug!("GET {}", url);

        let mut request = HTTP_CLIENT.get(&url);
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(FetchOutcome::Empty);
        }
        if !status.is_success() {
            return Err(ArchiveError::Http {
                status: status.as_u16(),
                tile,
            });
        }

        let bytes = response.bytes().await?;
        Ok(FetchOutcome::Tile(bytes.to_vec()))
    }
}
