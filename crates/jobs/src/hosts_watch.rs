use std::sync::Arc;
use std::time::{Duration, SystemTime};

use spuddns_application::SharedHosts;
use spuddns_domain::HostsTable;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const WATCH_INTERVAL: Duration = Duration::from_secs(5);

/// Keeps the hosts-file snapshot fresh for the hosts resolver.
pub struct HostsWatchJob {
    path: String,
    shared: SharedHosts,
    shutdown: CancellationToken,
}

impl HostsWatchJob {
    pub fn new(path: String, shared: SharedHosts) -> Self {
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
        debug!(file = %self.path, "starting hosts watch");

        let mut last_modified: Option<SystemTime> = None;
        let mut ticker = tokio::time::interval(WATCH_INTERVAL);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    debug!("hosts watch stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let modified = match std::fs::metadata(&self.path).and_then(|m| m.modified()) {
                        Ok(modified) => modified,
                        Err(e) => {
                            warn!(file = %self.path, error = %e, "failed to stat hosts file");
                            continue;
                        }
                    };

                    if last_modified.is_some_and(|seen| modified <= seen) {
                        continue;
                    }

                    match std::fs::read_to_string(&self.path) {
                        Ok(content) => {
                            let table = HostsTable::parse(&content);
                            debug!(
                                file = %self.path,
                                a = table.a.len(),
                                aaaa = table.aaaa.len(),
                                "reloaded hosts file"
                            );
                            self.shared.store(Arc::new(table));
                            last_modified = Some(modified);
                        }
                        Err(e) => {
                            warn!(file = %self.path, error = %e, "failed to read hosts file");
                        }
                    }
                }
            }
        }
    }
}
