use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use spuddns_domain::DnsAnswer;

/// Persisted form of a cached response. Stored as a JSON blob under the
/// composed `<name>::<qtype>` key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub answers: Vec<DnsAnswer>,
    pub expires: DateTime<Utc>,
    #[serde(default)]
    pub request_count: u32,
    #[serde(default)]
    pub resolver: String,
}

impl CacheEntry {
    pub fn is_expired(&self) -> bool {
        self.expires <= Utc::now()
    }
}
