mod acl;
mod root;
mod skip_rules;

pub use acl::AclItem;
pub use root::{AppConfig, DEFAULT_CONFIG_PATH};
pub use skip_rules::{str_to_ip_net, SkipRules};

/// mDNS behavior knobs handed to the resolver chain.
#[derive(Debug, Clone, Copy)]
pub struct MdnsOptions {
    pub enable: bool,
    pub forward: bool,
}

impl Default for MdnsOptions {
    fn default() -> Self {
        Self {
            enable: true,
            forward: false,
        }
    }
}

impl MdnsOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            enable: config.mdns_enable,
            forward: config.mdns_forward,
        }
    }
}
