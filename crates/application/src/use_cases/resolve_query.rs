use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use hickory_proto::op::Query;
use hickory_proto::rr::Name;
use spuddns_domain::{AppConfig, DnsExchange, DnsQuery, DnsResponse, DomainError, ResolvConf};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::ports::{ChainSpec, DnsQueryClient, MetricsSink, ResolverFactory};
use crate::resolve::{name_exists, resolve_with};
use crate::SharedResolvConf;

/// Overall budget for resolving one candidate name through a chain.
const CANDIDATE_TIMEOUT: Duration = Duration::from_secs(5);

/// TTL on the CNAME synthesized when a name only exists under an expanded
/// form.
const SYNTHESIZED_CNAME_TTL: Duration = Duration::from_secs(5 * 60);

/// The shared resolution pipeline behind every listener: access control,
/// CPE-ID handling, search-domain expansion, per-candidate chain resolution,
/// and publication of successful exchanges to the cache-write pipeline.
pub struct ResolveQueryUseCase {
    config: Arc<AppConfig>,
    resolv_conf: SharedResolvConf,
    cache: Option<Arc<dyn DnsQueryClient>>,
    hosts: Option<Arc<dyn DnsQueryClient>>,
    default_forwarder: Option<Arc<dyn DnsQueryClient>>,
    factory: Arc<dyn ResolverFactory>,
    pipeline: Option<mpsc::Sender<DnsExchange>>,
    metrics: Arc<dyn MetricsSink>,
}

impl ResolveQueryUseCase {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<AppConfig>,
        resolv_conf: SharedResolvConf,
        cache: Option<Arc<dyn DnsQueryClient>>,
        hosts: Option<Arc<dyn DnsQueryClient>>,
        default_forwarder: Option<Arc<dyn DnsQueryClient>>,
        factory: Arc<dyn ResolverFactory>,
        pipeline: Option<mpsc::Sender<DnsExchange>>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            config,
            resolv_conf,
            cache,
            hosts,
            default_forwarder,
            factory,
            pipeline,
            metrics,
        }
    }

    /// Resolves a client query to the response that goes back on the wire.
    /// All failures collapse to REFUSED, SERVFAIL, or NXDOMAIN.
    pub async fn resolve(&self, query: DnsQuery) -> DnsResponse {
        let started = Instant::now();

        let result = self.resolve_only(query).await;
        self.metrics.observe_response(started.elapsed());

        match result {
            Ok(exchange) => {
                if exchange.response.is_success() {
                    if exchange.response.from_cache {
                        self.metrics.inc_queries_answered_from_cache();
                    } else {
                        self.publish(exchange.clone());
                    }
                    self.metrics.inc_queries_answered();
                }
                exchange.response
            }
            Err(DomainError::UnrecognizedClient) => {
                warn!("refusing query from unrecognized client");
                DnsResponse::refused()
            }
            Err(e) => {
                self.metrics.inc_queries_failed();
                warn!(error = %e, "query resolution failed");
                DnsResponse::servfail()
            }
        }
    }

    async fn resolve_only(&self, mut query: DnsQuery) -> Result<DnsExchange, DomainError> {
        let original_question = query
            .first_question_cloned()
            .ok_or_else(|| DomainError::InvalidQuery("empty question".into()))?;

        let acl = self
            .config
            .ac_item(query.client_id.as_deref(), query.client_ip.as_deref())?;

        let (forward_cpe_id, add_cpe_id) = match &acl {
            Some(item) => (item.forward_cpe_id, item.add_cpe_id.clone()),
            None => (self.config.forward_cpe_id, self.config.add_cpe_id.clone()),
        };

        if !forward_cpe_id {
            query.clear_extras();
        }
        if query.cpe_id().is_none() {
            query.set_cpe_id(&add_cpe_id);
        }

        if let Some(hosts) = &self.hosts {
            if let Ok(Some(answer)) = resolve_with(&query, hosts.as_ref()).await {
                return Ok(DnsExchange {
                    question: original_question,
                    response: answer,
                });
            }
        }

        let resolv: Arc<ResolvConf> = self.resolv_conf.load_full();
        let original_name = original_question.name().to_utf8();
        let candidates = resolv.fully_qualified_names(&original_name);

        let cache_view = match &acl {
            Some(item) if !item.use_shared_cache => None,
            _ => self.cache.clone(),
        };

        let mut has_upstreams = false;

        for candidate in &candidates {
            debug!(
                name = %candidate,
                original = %original_name,
                qtype = %original_question.query_type(),
                "trying candidate name"
            );

            let Ok(name) = Name::from_ascii(candidate) else {
                warn!(name = %candidate, "candidate name was invalid");
                continue;
            };
            let mut question = Query::query(name, original_question.query_type());
            question.set_query_class(original_question.query_class());

            let Ok(modified) = query.with_question(question) else {
                continue;
            };

            let servers =
                self.config
                    .upstream_resolvers_for(candidate, acl.as_ref(), Some(&resolv));
            has_upstreams = has_upstreams || !servers.is_empty();

            let chain = self.factory.chain(ChainSpec {
                servers,
                cache: cache_view.clone(),
                default_forwarder: self.default_forwarder.clone(),
            });

            let answer = match tokio::time::timeout(
                CANDIDATE_TIMEOUT,
                resolve_with(&modified, chain.as_ref()),
            )
            .await
            {
                Ok(result) => result?,
                Err(_) => {
                    warn!(name = %candidate, "candidate resolution timed out");
                    continue;
                }
            };

            if let Some(answer) = answer {
                // The exchange keeps the client's original question so the
                // cache key matches what will be asked again.
                return Ok(DnsExchange {
                    question: original_question,
                    response: answer,
                });
            }

            if name_exists(&modified, chain.as_ref()).await {
                let mut answer = DnsResponse::noerror();
                answer.change_name_from(&original_name, candidate, SYNTHESIZED_CNAME_TTL);
                return Ok(DnsExchange {
                    question: original_question,
                    response: answer,
                });
            }
        }

        let mut response = DnsResponse::nxdomain();
        if has_upstreams {
            // Only meaningful when some candidate actually had somewhere to
            // recurse to.
            let mut msg = response.message().clone();
            msg.set_recursion_available(true);
            response = DnsResponse::from_message(msg)?;
        }

        Ok(DnsExchange {
            question: original_question,
            response,
        })
    }

    fn publish(&self, exchange: DnsExchange) {
        let Some(pipeline) = &self.pipeline else {
            return;
        };

        // Detached so a full pipeline buffer never stalls the client reply.
        let tx = pipeline.clone();
        tokio::spawn(async move {
            if tx.send(exchange).await.is_err() {
                debug!("cache pipeline is gone, dropping exchange");
            }
        });
    }
}

impl std::fmt::Debug for ResolveQueryUseCase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolveQueryUseCase")
            .field("cache", &self.cache.is_some())
            .field("hosts", &self.hosts.is_some())
            .field("default_forwarder", &self.default_forwarder.is_some())
            .finish()
    }
}

/// A fresh shared resolv.conf handle, as swapped by the watcher job.
pub fn shared_resolv_conf(initial: ResolvConf) -> SharedResolvConf {
    Arc::new(ArcSwap::from_pointee(initial))
}
