use std::sync::Arc;

use anyhow::{Context, Result};
use arc_swap::ArcSwap;
use spuddns_application::ports::{DnsQueryClient, MetricsSink, NullMetrics, ResponseCache};
use spuddns_application::use_cases::ResolveQueryUseCase;
use spuddns_application::{SharedHosts, SharedResolvConf};
use spuddns_domain::{AppConfig, HostsTable, ResolvConf};
use spuddns_infrastructure::dns::cache::{spawn_cache_pipeline, CacheMinder, SpudCache};
use spuddns_infrastructure::dns::resolver::{ChainFactory, HostsResolver};
use spuddns_infrastructure::metrics::PrometheusMetrics;
use tokio_util::sync::CancellationToken;
use tracing::warn;

pub const HOSTS_PATH: &str = "/etc/hosts";

pub struct Services {
    pub use_case: Arc<ResolveQueryUseCase>,
    pub metrics: Option<Arc<PrometheusMetrics>>,
    pub resolv_conf: SharedResolvConf,
    pub hosts: SharedHosts,
    pub cache: Option<Arc<SpudCache>>,
}

/// Wires the whole graph: metrics, cache + pipeline + minder, resolver
/// factory, and the shared resolution use case.
pub fn build_services(config: Arc<AppConfig>, shutdown: CancellationToken) -> Result<Services> {
    let prometheus = if config.disable_metrics {
        None
    } else {
        Some(PrometheusMetrics::new().context("failed to initialize metrics")?)
    };
    let sink: Arc<dyn MetricsSink> = match &prometheus {
        Some(metrics) => metrics.clone(),
        None => Arc::new(NullMetrics),
    };

    let initial_resolv = if config.respect_resolvconf {
        match std::fs::read_to_string(&config.resolvconf_path) {
            Ok(content) => ResolvConf::parse(&content),
            Err(e) => {
                warn!(
                    file = %config.resolvconf_path,
                    error = %e,
                    "failed to read resolvconf on start, will retry"
                );
                config.static_resolv_conf()
            }
        }
    } else {
        config.static_resolv_conf()
    };
    let resolv_conf: SharedResolvConf = Arc::new(ArcSwap::from_pointee(initial_resolv));

    let initial_hosts = std::fs::read_to_string(HOSTS_PATH)
        .map(|content| HostsTable::parse(&content))
        .unwrap_or_default();
    let hosts: SharedHosts = Arc::new(ArcSwap::from_pointee(initial_hosts));
    let hosts_client: Arc<dyn DnsQueryClient> = Arc::new(HostsResolver::new(hosts.clone()));

    let factory = Arc::new(ChainFactory::new(config.clone(), sink.clone()));

    let (cache, cache_view, pipeline) = if config.disable_cache {
        (None, None, None)
    } else {
        let cache = SpudCache::new(sink.clone(), shutdown.clone());
        let pipeline = spawn_cache_pipeline(config.clone(), cache.clone(), shutdown);

        if config.predictive_cache || config.resilient_cache {
            let minder = CacheMinder::new(
                config.clone(),
                resolv_conf.clone(),
                factory.clone(),
                None,
                pipeline.clone(),
                sink.clone(),
            );
            cache.set_expire_callback(minder.expire_callback());
        }

        let view = cache.clone().as_dns_client();
        (Some(cache), Some(view), Some(pipeline))
    };

    let use_case = Arc::new(ResolveQueryUseCase::new(
        config,
        resolv_conf.clone(),
        cache_view,
        Some(hosts_client),
        None,
        factory,
        pipeline,
        sink,
    ));

    Ok(Services {
        use_case,
        metrics: prometheus,
        resolv_conf,
        hosts,
        cache,
    })
}
