pub mod ports;
pub mod resolve;
pub mod use_cases;

use std::sync::Arc;

use arc_swap::ArcSwap;
use spuddns_domain::{HostsTable, ResolvConf};

/// Atomically swappable resolv.conf snapshot shared between the watcher job
/// and the resolution pipeline.
pub type SharedResolvConf = Arc<ArcSwap<ResolvConf>>;

/// Atomically swappable hosts-file snapshot.
pub type SharedHosts = Arc<ArcSwap<HostsTable>>;
