pub mod config;
pub mod errors;
pub mod hosts;
pub mod message;
pub mod resolv_conf;

pub use config::{AclItem, AppConfig, MdnsOptions};
pub use errors::DomainError;
pub use hosts::HostsTable;
pub use message::{
    question_cache_key, DnsAnswer, DnsExchange, DnsQuery, DnsResponse,
    CONTENT_TYPE_DNS_MESSAGE, CONTENT_TYPE_JSON, EDNS0_CPE_ID_OPTION_CODE,
};
pub use resolv_conf::ResolvConf;
