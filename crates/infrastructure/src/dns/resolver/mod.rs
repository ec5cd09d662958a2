mod hosts;
mod https;
mod mdns;
mod static_map;
mod udp;

pub use hosts::HostsResolver;
pub use https::DohResolver;
pub use mdns::MdnsResolver;
pub use static_map::StaticResolver;
pub use udp::UdpResolver;

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use spuddns_application::ports::{ChainSpec, DnsQueryClient, MetricsSink, ResolverFactory};
use spuddns_domain::{AppConfig, DnsQuery, DnsResponse, DomainError, MdnsOptions};
use tracing::debug;

/// Default per-server timeout for mDNS probes and DoH requests.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(2);

/// An ordered chain of resolution sources with first-success semantics.
///
/// A source that errors is skipped; a source with a non-success answer is
/// skipped; the first successful answer short-circuits, with the configured
/// TTL floor applied to responses that did not come from the cache. An
/// exhausted chain is an NXDOMAIN, not an error.
pub struct MultiClient {
    clients: Vec<Arc<dyn DnsQueryClient>>,
    force_minimum_ttl: i64,
}

impl MultiClient {
    pub fn new(clients: Vec<Arc<dyn DnsQueryClient>>, force_minimum_ttl: i64) -> Self {
        Self {
            clients,
            force_minimum_ttl,
        }
    }
}

#[async_trait]
impl DnsQueryClient for MultiClient {
    async fn query_dns(&self, query: &DnsQuery) -> Result<Option<DnsResponse>, DomainError> {
        for client in &self.clients {
            let response = match client.query_dns(query).await {
                Ok(response) => response,
                Err(e) => {
                    debug!(error = %e, "resolver in chain failed, trying next");
                    continue;
                }
            };

            let Some(mut response) = response else {
                continue;
            };
            if !response.is_success() {
                continue;
            }

            if !response.from_cache && self.force_minimum_ttl > 0 {
                let floor = Duration::from_secs(self.force_minimum_ttl as u64);
                if response.ttl() < floor {
                    response.set_ttl(floor);
                }
            }

            return Ok(Some(response));
        }

        Ok(Some(DnsResponse::nxdomain()))
    }
}

/// Assembles resolver chains: static map first, then the cache view, the
/// mDNS prober, one forwarder per configured server (UDP for addresses, DoH
/// for URLs), and finally the default forwarder.
pub struct ChainFactory {
    config: Arc<AppConfig>,
    metrics: Arc<dyn MetricsSink>,
    static_resolver: Arc<StaticResolver>,
    mdns_resolver: Arc<MdnsResolver>,
    query_timeout: Duration,
}

impl ChainFactory {
    pub fn new(config: Arc<AppConfig>, metrics: Arc<dyn MetricsSink>) -> Self {
        let mdns = MdnsOptions::from_config(&config);
        Self {
            static_resolver: Arc::new(StaticResolver::new(config.static_records.clone())),
            mdns_resolver: Arc::new(MdnsResolver::new(mdns, DEFAULT_QUERY_TIMEOUT)),
            config,
            metrics,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }
}

impl ResolverFactory for ChainFactory {
    fn chain(&self, spec: ChainSpec) -> Arc<dyn DnsQueryClient> {
        let mdns = MdnsOptions::from_config(&self.config);
        let mut clients: Vec<Arc<dyn DnsQueryClient>> =
            vec![self.static_resolver.clone() as Arc<dyn DnsQueryClient>];

        if let Some(cache) = spec.cache {
            clients.push(cache);
        }

        clients.push(self.mdns_resolver.clone() as Arc<dyn DnsQueryClient>);

        for server in &spec.servers {
            if server.parse::<IpAddr>().is_ok() || server.parse::<std::net::SocketAddr>().is_ok() {
                clients.push(Arc::new(UdpResolver::new(
                    vec![server.clone()],
                    mdns,
                    self.metrics.clone(),
                )));
            } else if reqwest::Url::parse(server).is_ok() {
                clients.push(Arc::new(DohResolver::new(
                    vec![server.clone()],
                    self.query_timeout,
                    mdns,
                    self.metrics.clone(),
                )));
            } else {
                debug!(server = %server, "ignoring unrecognized upstream server");
            }
        }

        if let Some(default_forwarder) = spec.default_forwarder {
            clients.push(default_forwarder);
        }

        Arc::new(MultiClient::new(clients, self.config.force_minimum_ttl))
    }
}
