mod cache;
mod dns_client;
mod metrics;
mod resolver_factory;

pub use cache::{CachePersistence, ExpireCallback, ExpireDecision, ResponseCache};
pub use dns_client::DnsQueryClient;
pub use metrics::{MetricsSink, NullMetrics};
pub use resolver_factory::{ChainSpec, ResolverFactory};
