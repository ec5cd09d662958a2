use std::time::Duration;

use async_trait::async_trait;
use hickory_proto::rr::RecordType;
use spuddns_application::ports::DnsQueryClient;
use spuddns_application::SharedHosts;
use spuddns_domain::{DnsAnswer, DnsQuery, DnsResponse, DomainError};
use tracing::debug;

const HOSTS_TTL: Duration = Duration::from_secs(30);

/// Answers A/AAAA questions from the hosts-file snapshot maintained by the
/// watcher job. Other question types are not its business.
pub struct HostsResolver {
    table: SharedHosts,
}

impl HostsResolver {
    pub fn new(table: SharedHosts) -> Self {
        Self { table }
    }
}

#[async_trait]
impl DnsQueryClient for HostsResolver {
    async fn query_dns(&self, query: &DnsQuery) -> Result<Option<DnsResponse>, DomainError> {
        let question = query
            .first_question()
            .ok_or_else(|| DomainError::InvalidQuery("query question was missing".into()))?;
        let qtype = question.query_type();

        if qtype != RecordType::A && qtype != RecordType::AAAA {
            return Ok(None);
        }

        let qname = question.name().to_utf8();
        debug!(qname = %qname, "attempting to resolve from etc hosts");

        let table = self.table.load();
        let map = if qtype == RecordType::A {
            &table.a
        } else {
            &table.aaaa
        };

        match map.get(&qname) {
            Some(addr) => {
                let response = DnsResponse::from_answers(&[DnsAnswer {
                    name: qname.clone(),
                    rtype: u16::from(qtype),
                    ttl: HOSTS_TTL,
                    data: addr.clone(),
                }])?;
                Ok(Some(response))
            }
            None => Ok(Some(DnsResponse::nxdomain())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arc_swap::ArcSwap;
    use hickory_proto::op::Query;
    use hickory_proto::rr::Name;
    use spuddns_domain::HostsTable;
    use std::str::FromStr;
    use std::sync::Arc;

    fn resolver(content: &str) -> HostsResolver {
        HostsResolver::new(Arc::new(ArcSwap::from_pointee(HostsTable::parse(content))))
    }

    fn query(name: &str, rtype: RecordType) -> DnsQuery {
        DnsQuery::from_questions(vec![Query::query(Name::from_str(name).unwrap(), rtype)]).unwrap()
    }

    #[tokio::test]
    async fn answers_a_questions_from_the_table() {
        let resolver = resolver("192.168.1.5 nas.lan");
        let response = resolver
            .query_dns(&query("nas.lan.", RecordType::A))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(response.answers().unwrap()[0].data, "192.168.1.5");
    }

    #[tokio::test]
    async fn misses_are_nxdomain_and_other_types_pass() {
        let resolver = resolver("192.168.1.5 nas.lan");

        let miss = resolver
            .query_dns(&query("other.lan.", RecordType::A))
            .await
            .unwrap()
            .unwrap();
        assert!(!miss.is_success());

        let pass = resolver
            .query_dns(&query("nas.lan.", RecordType::MX))
            .await
            .unwrap();
        assert!(pass.is_none());
    }
}
