mod dns;
mod doh;
mod dot;

pub use dns::run_dns_server;
pub use doh::run_doh_server;
pub use dot::{load_tls_config, run_dot_server};
