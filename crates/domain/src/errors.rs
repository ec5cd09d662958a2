use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum DomainError {
    #[error("Query is invalid: {0}")]
    InvalidQuery(String),

    #[error("RR type '{0}' is unsupported")]
    UnsupportedRecord(u16),

    #[error("RR type '{code}' with data '{msg}' is malformed")]
    MalformedRecord { code: u16, msg: String },

    #[error("unrecognized client")]
    UnrecognizedClient,

    #[error("Invalid IP address: {0}")]
    InvalidIpAddress(String),

    #[error("Invalid DNS response: {0}")]
    InvalidDnsResponse(String),

    #[error("Transport error talking to {server}: {msg}")]
    TransportError { server: String, msg: String },

    #[error("Transport timeout connecting to {server}")]
    TransportTimeout { server: String },

    #[error("Cache entry could not be decoded: {0}")]
    CacheSerde(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("TLS initialization failed: {0}")]
    TlsLoad(String),

    #[error("I/O error: {0}")]
    IoError(String),
}
