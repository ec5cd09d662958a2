mod cache_persist;
mod hosts_watch;
mod resolv_conf_watch;
mod runner;

pub use cache_persist::CachePersistJob;
pub use hosts_watch::HostsWatchJob;
pub use resolv_conf_watch::ResolvConfWatchJob;
pub use runner::{JobRunner, SpawnableJob};
