use std::sync::Arc;
use std::time::Duration;

use hickory_proto::op::Query;
use rand::Rng;
use spuddns_application::ports::{
    ChainSpec, DnsQueryClient, ExpireCallback, MetricsSink, ResolverFactory, ResponseCache,
};
use spuddns_application::resolve::resolve_with;
use spuddns_application::SharedResolvConf;
use spuddns_domain::{AppConfig, DnsExchange, DnsQuery, DnsResponse};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Floor for the TTL of a resiliently re-inserted stale entry, so upstream
/// caching cannot hand back a value that immediately expires again.
const RESILIENT_TTL_MIN_SECS: u64 = 3 * 60;
const RESILIENT_TTL_MAX_SECS: u64 = 5 * 60;

/// The cache's expire callback: re-queries popular entries shortly before
/// they lapse and, when the upstream is down, keeps serving the stale value
/// for a short while instead of going dark.
pub struct CacheMinder {
    config: Arc<AppConfig>,
    resolv_conf: SharedResolvConf,
    factory: Arc<dyn ResolverFactory>,
    default_forwarder: Option<Arc<dyn DnsQueryClient>>,
    pipeline: mpsc::Sender<DnsExchange>,
    metrics: Arc<dyn MetricsSink>,
}

impl CacheMinder {
    pub fn new(
        config: Arc<AppConfig>,
        resolv_conf: SharedResolvConf,
        factory: Arc<dyn ResolverFactory>,
        default_forwarder: Option<Arc<dyn DnsQueryClient>>,
        pipeline: mpsc::Sender<DnsExchange>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            resolv_conf,
            factory,
            default_forwarder,
            pipeline,
            metrics,
        })
    }

    /// The callback to register with the cache store.
    pub fn expire_callback(self: &Arc<Self>) -> ExpireCallback {
        let minder = Arc::clone(self);
        Arc::new(move |question, response, retrieve_count, cache| {
            let minder = Arc::clone(&minder);
            Box::pin(async move {
                minder
                    .refresh_expiring(question, response, retrieve_count, cache)
                    .await
            })
        })
    }

    pub async fn refresh_expiring(
        &self,
        question: Query,
        expiring: DnsResponse,
        retrieve_count: u32,
        _cache: Arc<dyn ResponseCache>,
    ) -> bool {
        let qname = question.name().to_utf8();
        let qtype = question.query_type();
        debug!(query = %qname, %qtype, retrieve_count, "cache entry expiring");

        if retrieve_count < self.config.predictive_threshold {
            return false;
        }

        debug!(query = %qname, %qtype, "refreshing frequent cache item");

        let query = match DnsQuery::from_questions(vec![question.clone()]) {
            Ok(query) => query,
            Err(e) => {
                warn!(error = %e, "invalid dns query");
                return false;
            }
        };

        let forwarder = match &self.default_forwarder {
            Some(forwarder) => Arc::clone(forwarder),
            None => {
                let mut servers = Vec::new();
                if let Some(resolver) = expiring.resolver.clone() {
                    servers.push(resolver);
                }
                let resolv = self.resolv_conf.load_full();
                servers.extend(
                    self.config
                        .upstream_resolvers_for(&qname, None, Some(&resolv)),
                );
                self.factory.chain(ChainSpec {
                    servers,
                    cache: None,
                    default_forwarder: None,
                })
            }
        };

        match resolve_with(&query, forwarder.as_ref()).await {
            Ok(Some(fresh)) => {
                self.metrics.inc_queries_predictively_refreshed();
                debug!(query = %qname, ttl = ?fresh.ttl(), "re-cached common query");
                let _ = self
                    .pipeline
                    .send(DnsExchange {
                        question,
                        response: fresh,
                    })
                    .await;
                true
            }
            _ => {
                if !self.config.resilient_cache {
                    return false;
                }

                warn!(query = %qname, %qtype, "re-caching last value (resilient cache)");
                self.metrics.inc_queries_resiliently_refreshed();

                // The hit count is not carried over: a formerly hot entry has
                // to prove itself again before the next refresh.
                let mut stale = expiring;
                let floor_secs = rand::thread_rng()
                    .gen_range(RESILIENT_TTL_MIN_SECS..=RESILIENT_TTL_MAX_SECS);
                let floor = Duration::from_secs(floor_secs);
                stale.set_ttl(stale.ttl().max(floor));
                stale.from_cache = false;

                let _ = self
                    .pipeline
                    .send(DnsExchange {
                        question,
                        response: stale,
                    })
                    .await;
                true
            }
        }
    }
}
