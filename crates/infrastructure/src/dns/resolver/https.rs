use std::net::IpAddr;
use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use spuddns_application::ports::{DnsQueryClient, MetricsSink};
use spuddns_domain::{DnsQuery, DnsResponse, DomainError, CONTENT_TYPE_DNS_MESSAGE, MdnsOptions};
use tracing::{debug, warn};

/// Shared HTTP client with connection pooling across all DoH endpoints.
static SHARED_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .use_rustls_tls()
        .pool_max_idle_per_host(4)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
});

/// DNS-over-HTTPS forwarder (RFC 8484, POST only). An endpoint is never used
/// to resolve its own hostname.
pub struct DohResolver {
    endpoints: Vec<String>,
    timeout: Duration,
    mdns: MdnsOptions,
    metrics: Arc<dyn MetricsSink>,
}

impl DohResolver {
    pub fn new(
        endpoints: Vec<String>,
        timeout: Duration,
        mdns: MdnsOptions,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            endpoints,
            timeout,
            mdns,
            metrics,
        }
    }
}

#[async_trait]
impl DnsQueryClient for DohResolver {
    async fn query_dns(&self, query: &DnsQuery) -> Result<Option<DnsResponse>, DomainError> {
        if query.is_mdns() && !self.mdns.forward {
            return Ok(None);
        }

        debug!("attempting to resolve query with dns over https");
        let started = Instant::now();

        let packed = query
            .prepared_msg()
            .to_vec()
            .map_err(|e| DomainError::InvalidQuery(e.to_string()))?;
        let qname = query
            .first_question()
            .map(|q| q.name().to_utf8())
            .unwrap_or_default();

        for endpoint in &self.endpoints {
            let Ok(url) = reqwest::Url::parse(endpoint) else {
                warn!(endpoint = %endpoint, "unable to parse dns over https endpoint");
                continue;
            };

            if let Some(host) = url.host_str() {
                if host.parse::<IpAddr>().is_err() && qname == format!("{host}.") {
                    warn!(host = %host, "not using https resolver to resolve itself");
                    continue;
                }
            }

            let request = SHARED_CLIENT
                .post(url)
                .header("Accept", CONTENT_TYPE_DNS_MESSAGE)
                .header("Content-Type", CONTENT_TYPE_DNS_MESSAGE)
                .body(packed.clone())
                .send();

            let response = match tokio::time::timeout(self.timeout, request).await {
                Ok(Ok(response)) => response,
                Ok(Err(e)) => {
                    warn!(server = %endpoint, error = %e, "dns over https request failed");
                    continue;
                }
                Err(_) => {
                    warn!(server = %endpoint, "dns over https request timed out");
                    continue;
                }
            };

            if response.status() != reqwest::StatusCode::OK {
                warn!(server = %endpoint, status = %response.status(), "not ok status for dns over https request");
                continue;
            }

            let body = match tokio::time::timeout(self.timeout, response.bytes()).await {
                Ok(Ok(body)) => body,
                _ => {
                    warn!(server = %endpoint, "failed to read https dns response body");
                    continue;
                }
            };

            match DnsResponse::from_bytes(&body) {
                Ok(mut dns_response) => {
                    if dns_response.is_success() {
                        debug!(server = %endpoint, "dns over https lookup succeeded");
                        dns_response.resolver = Some(endpoint.clone());
                    }
                    self.metrics.observe_forward(started.elapsed());
                    return Ok(Some(dns_response));
                }
                Err(e) => {
                    warn!(server = %endpoint, error = %e, "failed to parse https dns response");
                    continue;
                }
            }
        }

        Err(DomainError::TransportError {
            server: self.endpoints.join(","),
            msg: "https lookup failed".to_string(),
        })
    }
}
