use std::sync::Arc;

use futures::future::BoxFuture;
use hickory_proto::op::Query;
use spuddns_domain::{DnsResponse, DomainError};

use super::dns_client::DnsQueryClient;

/// Decision returned by an expire callback: `true` retains the entry,
/// `false` lets it fall out of the cache.
pub type ExpireDecision = BoxFuture<'static, bool>;

/// Invoked shortly before an entry's natural expiry with the question, the
/// response that is about to expire, the hit count observed so far, and a
/// handle back to the cache.
pub type ExpireCallback =
    Arc<dyn Fn(Query, DnsResponse, u32, Arc<dyn ResponseCache>) -> ExpireDecision + Send + Sync>;

/// The shared response cache. Reading happens through `DnsQueryClient` so a
/// cache can sit inside a resolver chain.
pub trait ResponseCache: DnsQueryClient {
    fn cache_response(&self, question: &Query, response: &DnsResponse)
        -> Result<(), DomainError>;

    fn set_expire_callback(&self, callback: ExpireCallback);

    fn remove(&self, question: &Query);

    /// The same cache viewed as a plain resolution source.
    fn as_dns_client(self: Arc<Self>) -> Arc<dyn DnsQueryClient>;
}

/// Optional disk persistence for a cache implementation.
pub trait CachePersistence: Send + Sync {
    fn persist(&self, path: &str) -> Result<(), DomainError>;
    fn restore(&self, path: &str) -> Result<(), DomainError>;
}
