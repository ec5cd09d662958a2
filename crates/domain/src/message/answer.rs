use std::net::{Ipv4Addr, Ipv6Addr};
use std::time::Duration;

use hickory_proto::rr::rdata::svcb::SVCB;
use hickory_proto::rr::rdata::{A, AAAA, CNAME, HTTPS, MX, NS, TXT};
use hickory_proto::rr::{Name, RData, Record, RecordType};
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// A single normalized DNS answer. A response can technically carry several
/// answers; each one maps to exactly one of these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsAnswer {
    pub name: String,
    #[serde(rename = "type")]
    pub rtype: u16,
    #[serde(with = "ttl_seconds")]
    pub ttl: Duration,
    pub data: String,
}

mod ttl_seconds {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ttl: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(ttl.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

impl DnsAnswer {
    pub fn record_type(&self) -> RecordType {
        RecordType::from(self.rtype)
    }

    /// Extracts the normalized form of a wire RR. Types outside the supported
    /// set fail with `UnsupportedRecord`.
    pub fn from_record(record: &Record) -> Result<Self, DomainError> {
        let rtype = u16::from(record.record_type());
        let data = match record.data() {
            Some(RData::A(a)) => a.0.to_string(),
            Some(RData::AAAA(aaaa)) => aaaa.0.to_string(),
            Some(RData::CNAME(cname)) => cname.0.to_utf8(),
            Some(RData::MX(mx)) => format!("{} {}", mx.preference(), mx.exchange().to_utf8()),
            Some(RData::TXT(txt)) => txt
                .txt_data()
                .iter()
                .map(|part| String::from_utf8_lossy(part).into_owned())
                .collect::<Vec<_>>()
                .join(" "),
            Some(RData::NS(ns)) => ns.0.to_utf8(),
            Some(RData::HTTPS(https)) => https.0.target_name().to_utf8(),
            _ => return Err(DomainError::UnsupportedRecord(rtype)),
        };

        Ok(Self {
            name: record.name().to_utf8(),
            rtype,
            ttl: Duration::from_secs(u64::from(record.ttl())),
            data,
        })
    }

    /// Converts back to a wire RR with class IN and the TTL in seconds.
    pub fn to_record(&self) -> Result<Record, DomainError> {
        let name = parse_name(&self.name, self.rtype)?;
        let ttl = self.ttl.as_secs() as u32;

        let rdata = match self.record_type() {
            RecordType::A => {
                let addr: Ipv4Addr = self
                    .data
                    .parse()
                    .map_err(|_| DomainError::InvalidIpAddress(self.data.clone()))?;
                RData::A(A(addr))
            }
            RecordType::AAAA => {
                let addr: Ipv6Addr = self
                    .data
                    .parse()
                    .map_err(|_| DomainError::InvalidIpAddress(self.data.clone()))?;
                RData::AAAA(AAAA(addr))
            }
            RecordType::CNAME => RData::CNAME(CNAME(parse_name(&self.data, self.rtype)?)),
            RecordType::MX => {
                let (preference, exchange) =
                    self.data
                        .split_once(' ')
                        .ok_or_else(|| DomainError::MalformedRecord {
                            code: self.rtype,
                            msg: "invalid MX data format".into(),
                        })?;
                let preference: u16 =
                    preference
                        .parse()
                        .map_err(|e| DomainError::MalformedRecord {
                            code: self.rtype,
                            msg: format!("invalid MX preference: {e}"),
                        })?;
                RData::MX(MX::new(preference, parse_name(exchange, self.rtype)?))
            }
            RecordType::TXT => {
                RData::TXT(TXT::new(self.data.split(' ').map(String::from).collect()))
            }
            RecordType::NS => RData::NS(NS(parse_name(&self.data, self.rtype)?)),
            RecordType::HTTPS => {
                RData::HTTPS(HTTPS(SVCB::new(0, parse_name(&self.data, self.rtype)?, vec![])))
            }
            _ => return Err(DomainError::UnsupportedRecord(self.rtype)),
        };

        Ok(Record::from_rdata(name, ttl, rdata))
    }
}

fn parse_name(name: &str, rtype: u16) -> Result<Name, DomainError> {
    Name::from_ascii(name).map_err(|e| DomainError::MalformedRecord {
        code: rtype,
        msg: format!("invalid name '{name}': {e}"),
    })
}
