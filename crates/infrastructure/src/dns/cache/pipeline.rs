use std::sync::Arc;

use spuddns_application::ports::ResponseCache;
use spuddns_domain::{AppConfig, DnsExchange};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Depth of the cache-write buffer. Producers enqueue from detached tasks,
/// so a full buffer back-pressures them without stalling client replies.
pub const PIPELINE_CAPACITY: usize = 300;

/// Starts the single consumer that filters resolved exchanges through the
/// cacheability rules and commits the survivors. Returns the producer
/// handle.
pub fn spawn_cache_pipeline(
    config: Arc<AppConfig>,
    cache: Arc<dyn ResponseCache>,
    shutdown: CancellationToken,
) -> mpsc::Sender<DnsExchange> {
    let (tx, mut rx) = mpsc::channel::<DnsExchange>(PIPELINE_CAPACITY);

    tokio::spawn(async move {
        debug!("cache pipeline started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("cache pipeline stopped");
                    break;
                }
                exchange = rx.recv() => {
                    let Some(exchange) = exchange else { break };

                    let qname = exchange.question.name().to_utf8();
                    let qtype = exchange.question.query_type();

                    if !config.is_cacheable(&exchange.question, Some(&exchange.response)) {
                        debug!(query = %qname, %qtype, "skipping cache for dns response");
                        continue;
                    }

                    debug!(query = %qname, %qtype, "caching dns response");
                    if let Err(e) = cache.cache_response(&exchange.question, &exchange.response) {
                        warn!(query = %qname, %qtype, error = %e, "failed to cache dns exchange");
                    }
                }
            }
        }
    });

    tx
}
