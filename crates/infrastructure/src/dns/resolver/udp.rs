use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use spuddns_application::ports::{DnsQueryClient, MetricsSink};
use spuddns_domain::{DnsQuery, DnsResponse, DomainError, MdnsOptions};
use tokio::net::UdpSocket;
use tracing::{debug, warn};

const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_UDP_RESPONSE_SIZE: usize = 4096;

/// Classic UDP/53 forwarder. Tries its servers in order; the first clean
/// exchange wins and is stamped with the server that produced it.
pub struct UdpResolver {
    servers: Vec<String>,
    mdns: MdnsOptions,
    metrics: Arc<dyn MetricsSink>,
}

impl UdpResolver {
    pub fn new(servers: Vec<String>, mdns: MdnsOptions, metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            servers,
            mdns,
            metrics,
        }
    }

    async fn exchange(
        &self,
        message: &[u8],
        server: &str,
        addr: SocketAddr,
    ) -> Result<Vec<u8>, DomainError> {
        let bind_addr: &str = if addr.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(|e| DomainError::TransportError {
                server: server.to_string(),
                msg: format!("failed to bind udp socket: {e}"),
            })?;

        tokio::time::timeout(EXCHANGE_TIMEOUT, socket.send_to(message, addr))
            .await
            .map_err(|_| DomainError::TransportTimeout {
                server: server.to_string(),
            })?
            .map_err(|e| DomainError::TransportError {
                server: server.to_string(),
                msg: e.to_string(),
            })?;

        let mut buf = vec![0u8; MAX_UDP_RESPONSE_SIZE];
        let (len, _) = tokio::time::timeout(EXCHANGE_TIMEOUT, socket.recv_from(&mut buf))
            .await
            .map_err(|_| DomainError::TransportTimeout {
                server: server.to_string(),
            })?
            .map_err(|e| DomainError::TransportError {
                server: server.to_string(),
                msg: e.to_string(),
            })?;

        buf.truncate(len);
        Ok(buf)
    }
}

fn server_socket_addr(server: &str) -> Result<SocketAddr, DomainError> {
    if let Ok(ip) = server.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, 53));
    }
    server
        .parse::<SocketAddr>()
        .map_err(|_| DomainError::TransportError {
            server: server.to_string(),
            msg: "invalid server address".to_string(),
        })
}

#[async_trait]
impl DnsQueryClient for UdpResolver {
    async fn query_dns(&self, query: &DnsQuery) -> Result<Option<DnsResponse>, DomainError> {
        if query.is_mdns() && !self.mdns.forward {
            return Ok(None);
        }

        debug!("attempting to resolve query with standard dns");
        let started = Instant::now();

        let packed = query
            .prepared_msg()
            .to_vec()
            .map_err(|e| DomainError::InvalidQuery(e.to_string()))?;

        let mut last_err = None;

        for server in &self.servers {
            let addr = match server_socket_addr(server) {
                Ok(addr) => addr,
                Err(e) => {
                    warn!(server = %server, error = %e, "invalid upstream server");
                    last_err = Some(e);
                    continue;
                }
            };

            let bytes = match self.exchange(&packed, server, addr).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(server = %server, error = %e, "dns lookup failed, will try next resolver");
                    last_err = Some(e);
                    continue;
                }
            };

            match DnsResponse::from_bytes(&bytes) {
                Ok(mut response) => {
                    debug!(server = %server, answers = response.message().answers().len(), "dns lookup succeeded");
                    response.resolver = Some(server.clone());
                    self.metrics.observe_forward(started.elapsed());
                    return Ok(Some(response));
                }
                Err(e) => {
                    // Malformed reply: treat as a non-response from this
                    // server and move on.
                    warn!(server = %server, error = %e, "failed to parse upstream reply");
                    last_err = Some(e);
                    continue;
                }
            }
        }

        match last_err {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_addresses_get_the_default_port() {
        assert_eq!(
            server_socket_addr("8.8.8.8").unwrap(),
            "8.8.8.8:53".parse().unwrap()
        );
        assert_eq!(
            server_socket_addr("2001:4860:4860::8888").unwrap().port(),
            53
        );
        assert_eq!(
            server_socket_addr("192.0.2.1:5353").unwrap().port(),
            5353
        );
        assert!(server_socket_addr("not an address").is_err());
    }
}
