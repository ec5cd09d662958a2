use std::sync::Arc;
use std::time::Duration;

use spuddns_application::ports::CachePersistence;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const PERSIST_INTERVAL: Duration = Duration::from_secs(30);

/// Restores the cache from disk at startup and flushes it back on a fixed
/// cadence, so restarts do not start cold.
pub struct CachePersistJob {
    cache: Arc<dyn CachePersistence>,
    path: String,
    shutdown: CancellationToken,
}

impl CachePersistJob {
    pub fn new(cache: Arc<dyn CachePersistence>, path: String) -> Self {
        Self {
            cache,
            path,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub async fn start(self: Arc<Self>) {
        debug!(path = %self.path, "persistent cache started");

        if let Err(e) = self.cache.restore(&self.path) {
            warn!(path = %self.path, error = %e, "failed to load cache");
        }

        let mut ticker = tokio::time::interval(PERSIST_INTERVAL);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    debug!("persistent cache stopped");
                    break;
                }
                _ = ticker.tick() => {
                    debug!(path = %self.path, "persisting cache to disk");
                    if let Err(e) = self.cache.persist(&self.path) {
                        warn!(path = %self.path, error = %e, "failed to persist cache");
                    }
                }
            }
        }
    }
}
