use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use hickory_proto::rr::RecordType;
use spuddns_application::ports::DnsQueryClient;
use spuddns_domain::{DnsAnswer, DnsQuery, DnsResponse, DomainError};
use tracing::debug;

const STATIC_TTL: Duration = Duration::from_secs(30);

/// Answers from the statically configured name → address map. Always the
/// first client in a chain.
pub struct StaticResolver {
    records: HashMap<String, String>,
}

impl StaticResolver {
    pub fn new(records: HashMap<String, String>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl DnsQueryClient for StaticResolver {
    async fn query_dns(&self, query: &DnsQuery) -> Result<Option<DnsResponse>, DomainError> {
        let question = query
            .first_question()
            .ok_or_else(|| DomainError::InvalidQuery("query question was missing".into()))?;
        let qname = question.name().to_utf8();

        debug!(qname = %qname, "attempting to resolve query with static record from config");

        let trimmed = qname.trim_end_matches('.');
        for candidate in [trimmed, qname.as_str()] {
            let Some(addr) = self.records.get(candidate) else {
                continue;
            };

            let ip: IpAddr = addr.parse().map_err(|_| {
                DomainError::InvalidIpAddress(format!(
                    "static entry '{addr}' was not a valid address"
                ))
            })?;
            let rtype = match ip {
                IpAddr::V4(_) => RecordType::A,
                IpAddr::V6(_) => RecordType::AAAA,
            };

            let response = DnsResponse::from_answers(&[DnsAnswer {
                name: qname.clone(),
                rtype: u16::from(rtype),
                ttl: STATIC_TTL,
                data: addr.clone(),
            }])?;
            return Ok(Some(response));
        }

        Ok(Some(DnsResponse::nxdomain()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hickory_proto::op::Query;
    use hickory_proto::rr::Name;
    use std::str::FromStr;

    fn resolver(entries: &[(&str, &str)]) -> StaticResolver {
        StaticResolver::new(
            entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    fn query(name: &str, rtype: RecordType) -> DnsQuery {
        DnsQuery::from_questions(vec![Query::query(Name::from_str(name).unwrap(), rtype)]).unwrap()
    }

    #[tokio::test]
    async fn resolves_names_with_and_without_terminator() {
        let resolver = resolver(&[("example.com", "127.0.0.1")]);
        let response = resolver
            .query_dns(&query("example.com.", RecordType::A))
            .await
            .unwrap()
            .unwrap();

        assert!(response.is_success());
        let answers = response.answers().unwrap();
        assert_eq!(answers[0].data, "127.0.0.1");
        assert_eq!(answers[0].record_type(), RecordType::A);
        assert_eq!(answers[0].name, "example.com.");
    }

    #[tokio::test]
    async fn ipv6_entries_become_aaaa_answers() {
        let resolver = resolver(&[("example.com.", "2001:db8::1")]);
        let response = resolver
            .query_dns(&query("example.com.", RecordType::AAAA))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            response.answers().unwrap()[0].record_type(),
            RecordType::AAAA
        );
    }

    #[tokio::test]
    async fn miss_is_nxdomain() {
        let resolver = resolver(&[]);
        let response = resolver
            .query_dns(&query("example.com.", RecordType::A))
            .await
            .unwrap()
            .unwrap();
        assert!(!response.is_success());
    }

    #[tokio::test]
    async fn invalid_static_entry_is_a_hard_error() {
        let resolver = resolver(&[("example.com", "not-an-address")]);
        let err = resolver
            .query_dns(&query("example.com.", RecordType::A))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidIpAddress(_)));
    }
}
