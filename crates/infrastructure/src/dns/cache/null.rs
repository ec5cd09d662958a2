use std::sync::Arc;

use async_trait::async_trait;
use hickory_proto::op::Query;
use spuddns_application::ports::{DnsQueryClient, ExpireCallback, ResponseCache};
use spuddns_domain::{DnsQuery, DnsResponse, DomainError};

/// Cache that never hits and never stores. Stands in when caching is
/// disabled globally or withheld from a client by policy.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullCache;

#[async_trait]
impl DnsQueryClient for NullCache {
    async fn query_dns(&self, _query: &DnsQuery) -> Result<Option<DnsResponse>, DomainError> {
        Ok(None)
    }
}

impl ResponseCache for NullCache {
    fn cache_response(
        &self,
        _question: &Query,
        _response: &DnsResponse,
    ) -> Result<(), DomainError> {
        Ok(())
    }

    fn set_expire_callback(&self, _callback: ExpireCallback) {}

    fn remove(&self, _question: &Query) {}

    fn as_dns_client(self: Arc<Self>) -> Arc<dyn DnsQueryClient> {
        self
    }
}
