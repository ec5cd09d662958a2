use serde::{Deserialize, Serialize};

/// Per-client policy, selected by preshared key or client address. An empty
/// upstream list means "use the globally configured resolution path".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AclItem {
    pub upstream_resolvers: Vec<String>,
    pub forward_cpe_id: bool,
    pub add_cpe_id: String,
    pub use_shared_cache: bool,
}
