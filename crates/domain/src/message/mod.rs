pub mod answer;
pub mod query;
pub mod response;

use hickory_proto::op::Query;

pub use answer::DnsAnswer;
pub use query::DnsQuery;
pub use response::DnsResponse;

/// EDNS0 local option code carrying the CPE-ID preshared key.
pub const EDNS0_CPE_ID_OPTION_CODE: u16 = 65074;

pub const CONTENT_TYPE_DNS_MESSAGE: &str = "application/dns-message";
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// A resolved question/answer pair published to the cache-write pipeline.
/// Always carries the client's original question so the cache key matches
/// what the client will ask again.
#[derive(Debug, Clone)]
pub struct DnsExchange {
    pub question: Query,
    pub response: DnsResponse,
}

/// Composed cache key for a question: `<name>::<qtype>`.
pub fn question_cache_key(question: &Query) -> String {
    format!(
        "{}::{}",
        question.name().to_utf8(),
        u16::from(question.query_type())
    )
}
