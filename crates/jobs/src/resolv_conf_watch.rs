use std::sync::Arc;
use std::time::{Duration, SystemTime};

use spuddns_application::SharedResolvConf;
use spuddns_domain::ResolvConf;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const WATCH_INTERVAL: Duration = Duration::from_secs(5);

/// Polls the system resolver configuration and swaps in a fresh snapshot
/// when the file changes. Readers always see a consistent snapshot.
pub struct ResolvConfWatchJob {
    path: String,
    shared: SharedResolvConf,
    shutdown: CancellationToken,
}

impl ResolvConfWatchJob {
    pub fn new(path: String, shared: SharedResolvConf) -> Self {
        Self {
            path,
            shared,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub async fn start(self: Arc<Self>) {
        debug!(file = %self.path, "starting resolvconf watch");

        let mut last_modified: Option<SystemTime> = None;
        let mut ticker = tokio::time::interval(WATCH_INTERVAL);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    debug!("resolvconf watch stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let modified = match std::fs::metadata(&self.path).and_then(|m| m.modified()) {
                        Ok(modified) => modified,
                        Err(e) => {
                            warn!(file = %self.path, error = %e, "failed to stat resolvconf");
                            continue;
                        }
                    };

                    if last_modified.is_some_and(|seen| modified <= seen) {
                        continue;
                    }

                    match std::fs::read_to_string(&self.path) {
                        Ok(content) => {
                            let conf = ResolvConf::parse(&content);
                            debug!(
                                file = %self.path,
                                servers = conf.nameservers.len(),
                                search = conf.search.len(),
                                "reloaded resolvconf"
                            );
                            self.shared.store(Arc::new(conf));
                            last_modified = Some(modified);
                        }
                        Err(e) => {
                            warn!(file = %self.path, error = %e, "failed to read resolvconf");
                        }
                    }
                }
            }
        }
    }
}
