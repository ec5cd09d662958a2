use std::sync::Arc;

use super::dns_client::DnsQueryClient;

/// Per-query tailoring for a resolver chain: the upstream servers selected
/// for the candidate name, the cache view the client is allowed to read, and
/// the fallback forwarder.
pub struct ChainSpec {
    pub servers: Vec<String>,
    pub cache: Option<Arc<dyn DnsQueryClient>>,
    pub default_forwarder: Option<Arc<dyn DnsQueryClient>>,
}

/// Builds a resolver chain for one resolution attempt.
pub trait ResolverFactory: Send + Sync {
    fn chain(&self, spec: ChainSpec) -> Arc<dyn DnsQueryClient>;
}
