use std::time::Duration;

use async_trait::async_trait;
use hickory_proto::op::{Message, MessageType};
use spuddns_application::ports::DnsQueryClient;
use spuddns_domain::{DnsQuery, DnsResponse, DomainError, MdnsOptions};
use tokio::net::UdpSocket;
use tracing::{debug, warn};

const MDNS_GROUP: &str = "224.0.0.251:5353";
const MAX_DATAGRAM: usize = 1500;

/// Resolves `.local.` names on the LAN by multicasting the query and waiting
/// for a matching response. Anything else is left to the rest of the chain.
pub struct MdnsResolver {
    options: MdnsOptions,
    timeout: Duration,
}

impl MdnsResolver {
    pub fn new(options: MdnsOptions, timeout: Duration) -> Self {
        Self { options, timeout }
    }
}

#[async_trait]
impl DnsQueryClient for MdnsResolver {
    async fn query_dns(&self, query: &DnsQuery) -> Result<Option<DnsResponse>, DomainError> {
        if !self.options.enable || !query.is_mdns() {
            return Ok(None);
        }

        let qname = query
            .first_question()
            .map(|q| q.name().to_utf8())
            .unwrap_or_default();
        debug!(qname = %qname, "attempting to resolve query with mdns");

        let prepared = query.prepared_msg();
        let query_id = prepared.id();
        let packed = prepared
            .to_vec()
            .map_err(|e| DomainError::InvalidQuery(e.to_string()))?;

        let socket = UdpSocket::bind("0.0.0.0:0").await.map_err(|e| {
            warn!(error = %e, "failed to bind udp socket for mdns");
            DomainError::TransportError {
                server: MDNS_GROUP.to_string(),
                msg: e.to_string(),
            }
        })?;

        socket
            .send_to(&packed, MDNS_GROUP)
            .await
            .map_err(|e| DomainError::TransportError {
                server: MDNS_GROUP.to_string(),
                msg: e.to_string(),
            })?;

        let listen = async {
            let mut buf = [0u8; MAX_DATAGRAM];
            loop {
                let (len, from) = match socket.recv_from(&mut buf).await {
                    Ok(received) => received,
                    Err(e) => {
                        debug!(error = %e, "mdns receive failed");
                        continue;
                    }
                };
                debug!(addr = %from, "received mdns data");

                let Ok(msg) = Message::from_vec(&buf[..len]) else {
                    continue;
                };
                if msg.message_type() != MessageType::Response || msg.id() != query_id {
                    continue;
                }

                return DnsResponse::from_message(msg);
            }
        };

        match tokio::time::timeout(self.timeout, listen).await {
            Ok(Ok(response)) => Ok(Some(response)),
            Ok(Err(e)) => Err(e),
            // Nobody on the LAN answered in time.
            Err(_) => Ok(Some(DnsResponse::nxdomain())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hickory_proto::op::Query;
    use hickory_proto::rr::{Name, RecordType};
    use std::str::FromStr;

    fn query(name: &str) -> DnsQuery {
        DnsQuery::from_questions(vec![Query::query(
            Name::from_str(name).unwrap(),
            RecordType::A,
        )])
        .unwrap()
    }

    #[tokio::test]
    async fn ignores_non_local_names() {
        let resolver = MdnsResolver::new(MdnsOptions::default(), Duration::from_millis(50));
        let result = resolver.query_dns(&query("example.com.")).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn disabled_resolver_has_no_opinion() {
        let options = MdnsOptions {
            enable: false,
            forward: false,
        };
        let resolver = MdnsResolver::new(options, Duration::from_millis(50));
        let result = resolver.query_dns(&query("printer.local.")).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn unanswered_probe_times_out_to_nxdomain() {
        let resolver = MdnsResolver::new(MdnsOptions::default(), Duration::from_millis(100));
        let result = resolver.query_dns(&query("no-such-host.local.")).await;
        // Either the probe went out and nobody answered, or the sandbox
        // refused the multicast send; both are non-fatal here.
        if let Ok(Some(response)) = result {
            assert!(!response.is_success());
        }
    }
}
