use async_trait::async_trait;
use spuddns_domain::{DnsQuery, DnsResponse, DomainError};

/// The interface every resolution source implements, including the cache and
/// composed chains.
///
/// `Ok(None)` means "no opinion, try the next source"; a non-success response
/// means "authoritative non-answer"; a successful response short-circuits
/// whatever chain is running.
#[async_trait]
pub trait DnsQueryClient: Send + Sync {
    async fn query_dns(&self, query: &DnsQuery) -> Result<Option<DnsResponse>, DomainError>;
}
