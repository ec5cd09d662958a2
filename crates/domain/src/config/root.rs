use std::collections::HashMap;
use std::net::IpAddr;

use hickory_proto::op::Query;
use hickory_proto::rr::RecordType;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::acl::AclItem;
use super::skip_rules::SkipRules;
use crate::errors::DomainError;
use crate::message::DnsResponse;
use crate::resolv_conf::{make_qualified, ResolvConf};

pub const DEFAULT_CONFIG_PATH: &str = "./spuddns.json";

/// Main configuration. Loaded from a JSON file; when the file is absent the
/// environment supplies a minimal configuration instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub enable_acls: bool,
    /// Keyed by preshared key; `"ip:<addr>"` pins an item to a client
    /// address and `"*"` is the catch-all.
    pub acls: HashMap<String, AclItem>,
    pub add_cpe_id: String,
    pub forward_cpe_id: bool,
    pub bind_address: String,
    pub dns_server_port: u16,
    pub dns_over_http_enable: bool,
    pub dns_over_http_port: u16,
    pub dns_over_tls_enable: bool,
    pub dns_over_tls_port: u16,
    pub dns_over_tls_cert_file: String,
    pub dns_over_tls_key_file: String,
    pub disable_cache: bool,
    pub disable_metrics: bool,
    /// Addresses, networks, names and `*.name` wildcards excluded from the
    /// cache.
    pub do_not_cache: Vec<String>,
    pub force_minimum_ttl: i64,
    pub log_level: i32,
    pub mdns_enable: bool,
    pub mdns_forward: bool,
    pub predictive_cache: bool,
    /// Cache hits required before an expiring entry is proactively
    /// re-queried.
    pub predictive_threshold: u32,
    pub resilient_cache: bool,
    /// When non-empty, the cache is restored from and flushed to this path.
    pub persistent_cache_file: String,
    pub static_records: HashMap<String, String>,
    pub upstream_resolvers: Vec<String>,
    pub conditional_forwards: HashMap<String, Vec<String>>,
    pub respect_resolvconf: bool,
    pub resolvconf_path: String,
    pub search_domains: Vec<String>,

    #[serde(skip)]
    pub skip_rules: SkipRules,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            enable_acls: false,
            acls: HashMap::new(),
            add_cpe_id: String::new(),
            forward_cpe_id: false,
            bind_address: String::new(),
            dns_server_port: 53,
            dns_over_http_enable: false,
            dns_over_http_port: 8080,
            dns_over_tls_enable: false,
            dns_over_tls_port: 853,
            dns_over_tls_cert_file: String::new(),
            dns_over_tls_key_file: String::new(),
            disable_cache: false,
            disable_metrics: true,
            do_not_cache: vec!["127.0.0.1/16".to_string()],
            force_minimum_ttl: -1,
            log_level: 0,
            mdns_enable: true,
            mdns_forward: false,
            predictive_cache: true,
            predictive_threshold: 10,
            resilient_cache: true,
            persistent_cache_file: String::new(),
            static_records: HashMap::new(),
            upstream_resolvers: vec![],
            conditional_forwards: HashMap::new(),
            respect_resolvconf: true,
            resolvconf_path: "/etc/resolv.conf".to_string(),
            search_domains: vec![],
            skip_rules: SkipRules::default(),
        }
    }
}

impl AppConfig {
    /// Loads the configuration file, falling back to environment variables
    /// when it does not exist.
    pub fn load(path: &str) -> Result<Self, DomainError> {
        let data = match std::fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let mut config = Self::from_env();
                config.prepare();
                return Ok(config);
            }
            Err(e) => return Err(DomainError::IoError(e.to_string())),
        };

        let mut config: Self =
            serde_json::from_str(&data).map_err(|e| DomainError::ConfigError(e.to_string()))?;
        config.prepare();
        Ok(config)
    }

    /// Environment-only configuration, for container deployments without a
    /// config file. resolv.conf is not consulted in this mode.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        config.dns_server_port = env_int("DNS_SERVER_PORT", config.dns_server_port);
        config.dns_over_http_enable = env_bool("DNS_OVER_HTTP_ENABLE", config.dns_over_http_enable);
        config.mdns_enable = env_bool("MDNS_ENABLE", config.mdns_enable);
        config.respect_resolvconf = false;
        config.upstream_resolvers = env_list("UPSTREAM_RESOLVERS", config.upstream_resolvers);
        config.conditional_forwards =
            env_map_list("CONDITIONAL_FORWARDS", config.conditional_forwards);
        config.disable_metrics = env_bool("DISABLE_METRICS", config.disable_metrics);
        config.search_domains = env_list("SEARCH_DOMAINS", config.search_domains);

        config
    }

    /// Compiles the do-not-cache rules and fills in the default upstream when
    /// nothing else could possibly resolve.
    pub fn prepare(&mut self) {
        self.skip_rules = SkipRules::compile(&self.do_not_cache);

        if !self.respect_resolvconf
            && self.upstream_resolvers.is_empty()
            && self.conditional_forwards.is_empty()
        {
            warn!("no upstream resolvers configured, defaulting to 8.8.8.8");
            self.upstream_resolvers = vec!["8.8.8.8".to_string()];
        }
    }

    /// The resolv.conf snapshot implied by the configuration itself, used
    /// when the system file is not being watched.
    pub fn static_resolv_conf(&self) -> ResolvConf {
        ResolvConf {
            search: self
                .search_domains
                .iter()
                .map(|s| make_qualified(s))
                .collect(),
            nameservers: self.upstream_resolvers.clone(),
            options: HashMap::new(),
        }
    }

    /// Whether an exchange may be committed to the shared cache.
    pub fn is_cacheable(&self, question: &Query, response: Option<&DnsResponse>) -> bool {
        let Some(response) = response else {
            return false;
        };

        if self.disable_cache || !response.is_success() || response.from_cache {
            return false;
        }

        let Ok(answers) = response.answers() else {
            return false;
        };

        if !answers.is_empty() && self.skip_rules.matches_name(&question.name().to_utf8()) {
            return false;
        }

        for answer in &answers {
            if answer.record_type() != RecordType::A && answer.record_type() != RecordType::AAAA {
                continue;
            }

            // An A/AAAA answer that does not parse disqualifies the response.
            let Ok(ip) = answer.data.parse::<IpAddr>() else {
                return false;
            };
            if self.skip_rules.contains_ip(ip) {
                return false;
            }
        }

        true
    }

    /// Walks the conditional-forward map label by label, TLD first, down to
    /// and including the full name.
    pub fn conditional_forward_for(&self, name: &str) -> Option<&[String]> {
        if self.conditional_forwards.is_empty() {
            return None;
        }

        let mut host = String::new();
        for segment in name.split('.').rev() {
            if segment.is_empty() {
                continue;
            }
            host = if host.is_empty() {
                segment.to_string()
            } else {
                format!("{segment}.{host}")
            };
            if let Some(servers) = self.conditional_forwards.get(&host) {
                return Some(servers);
            }
        }

        None
    }

    /// The upstream servers to try for a name: the ACL override when set,
    /// else a conditional forward, else the system nameservers, else the
    /// global upstream list.
    pub fn upstream_resolvers_for(
        &self,
        name: &str,
        acl: Option<&AclItem>,
        resolv: Option<&ResolvConf>,
    ) -> Vec<String> {
        if let Some(acl) = acl {
            if !acl.upstream_resolvers.is_empty() {
                return acl.upstream_resolvers.clone();
            }
        }

        if let Some(servers) = self.conditional_forward_for(name) {
            return servers.to_vec();
        }

        if let Some(resolv) = resolv {
            if !resolv.nameservers.is_empty() {
                return resolv.nameservers.clone();
            }
        }

        self.upstream_resolvers.clone()
    }

    /// Selects the access-control item for a client. With ACLs disabled
    /// every client is unconstrained; with them enabled an unmatched client
    /// is rejected.
    pub fn ac_item(
        &self,
        client_id: Option<&str>,
        client_ip: Option<&str>,
    ) -> Result<Option<AclItem>, DomainError> {
        if !self.enable_acls {
            return Ok(None);
        }

        if let Some(key) = client_id {
            if let Some(item) = self.acls.get(key) {
                return Ok(Some(item.clone()));
            }
        }

        if let Some(ip) = client_ip {
            if let Some(item) = self.acls.get(&format!("ip:{ip}")) {
                return Ok(Some(item.clone()));
            }
        }

        if let Some(item) = self.acls.get("*") {
            return Ok(Some(item.clone()));
        }

        Err(DomainError::UnrecognizedClient)
    }

    pub fn do_not_cache_nets_contain(&self, ip: IpAddr) -> bool {
        self.skip_rules.contains_ip(ip)
    }
}

fn env_bool(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(data) if !data.is_empty() => {
            data == "1" || data.eq_ignore_ascii_case("true") || data.eq_ignore_ascii_case("yes")
        }
        _ => default,
    }
}

fn env_int<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|data| data.parse().ok())
        .unwrap_or(default)
}

fn env_list(name: &str, default: Vec<String>) -> Vec<String> {
    match std::env::var(name) {
        Ok(data) if !data.is_empty() => data.split_whitespace().map(String::from).collect(),
        _ => default,
    }
}

fn env_map_list(
    name: &str,
    default: HashMap<String, Vec<String>>,
) -> HashMap<String, Vec<String>> {
    let Ok(data) = std::env::var(name) else {
        return default;
    };
    if data.is_empty() {
        return default;
    }

    let mut map = HashMap::new();
    for item in data.split_whitespace() {
        if let Some((suffix, resolver)) = item.split_once(':') {
            map.insert(suffix.to_string(), vec![resolver.to_string()]);
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::DnsAnswer;
    use hickory_proto::rr::Name;
    use std::str::FromStr;
    use std::time::Duration;

    fn question(name: &str) -> Query {
        Query::query(Name::from_str(name).unwrap(), RecordType::A)
    }

    fn response_with(name: &str, data: &str) -> DnsResponse {
        DnsResponse::from_answers(&[DnsAnswer {
            name: name.into(),
            rtype: u16::from(RecordType::A),
            ttl: Duration::from_secs(60),
            data: data.into(),
        }])
        .unwrap()
    }

    fn prepared(do_not_cache: &[&str]) -> AppConfig {
        let mut config = AppConfig {
            do_not_cache: do_not_cache.iter().map(|s| s.to_string()).collect(),
            ..AppConfig::default()
        };
        config.prepare();
        config
    }

    #[test]
    fn cacheability_honours_names_networks_and_case() {
        let config = prepared(&["127.0.0.1", "example.com", "*.google.com", "127.0.0.1/24"]);

        let ok = response_with("rit.edu.", "192.168.1.1");
        assert!(config.is_cacheable(&question("rit.edu."), Some(&ok)));

        for blocked in ["search.google.com.", "GOOGLE.COM.", "example.com.", "google.com."] {
            let response = response_with(blocked, "192.168.1.1");
            assert!(
                !config.is_cacheable(&question(blocked), Some(&response)),
                "{blocked} should not be cacheable"
            );
        }

        // 127.0.0.2 falls inside the /24 expansion of 127.0.0.1/24.
        let in_net = response_with("rit.edu.", "127.0.0.2");
        assert!(!config.is_cacheable(&question("rit.edu."), Some(&in_net)));
    }

    #[test]
    fn invalid_address_data_never_reaches_the_cache() {
        // The record conversion refuses bad A data outright, so the
        // cacheability check can only ever see parseable addresses.
        let err = DnsResponse::from_answers(&[DnsAnswer {
            name: "example.com.".into(),
            rtype: u16::from(RecordType::A),
            ttl: Duration::from_secs(1),
            data: "asdfasdf".into(),
        }])
        .unwrap_err();
        assert!(matches!(err, DomainError::InvalidIpAddress(_)));

        let config = prepared(&[]);
        let response = response_with("example.com.", "192.0.2.1");
        assert!(config.is_cacheable(&question("example.com."), Some(&response)));
    }

    #[test]
    fn cached_and_failed_responses_are_not_recached() {
        let config = prepared(&[]);

        let mut cached = response_with("example.com.", "192.0.2.1");
        cached.from_cache = true;
        assert!(!config.is_cacheable(&question("example.com."), Some(&cached)));

        assert!(!config.is_cacheable(&question("example.com."), Some(&DnsResponse::nxdomain())));
        assert!(!config.is_cacheable(&question("example.com."), None));
    }

    #[test]
    fn conditional_forward_walk_is_tld_first() {
        let mut config = AppConfig::default();
        config
            .conditional_forwards
            .insert("example.com".to_string(), vec!["10.0.0.1".to_string()]);
        config
            .conditional_forwards
            .insert("com".to_string(), vec!["10.0.0.2".to_string()]);

        // The shortest suffix wins because the walk starts at the TLD.
        assert_eq!(
            config.conditional_forward_for("a.example.com.").unwrap(),
            ["10.0.0.2"]
        );

        config.conditional_forwards.remove("com");
        assert_eq!(
            config.conditional_forward_for("a.b.example.com.").unwrap(),
            ["10.0.0.1"]
        );
        // The full name itself participates in the walk.
        assert_eq!(
            config.conditional_forward_for("example.com.").unwrap(),
            ["10.0.0.1"]
        );
        assert!(config.conditional_forward_for("example.org.").is_none());
    }

    #[test]
    fn upstream_selection_priority() {
        let mut config = AppConfig {
            upstream_resolvers: vec!["9.9.9.9".to_string()],
            ..AppConfig::default()
        };
        config
            .conditional_forwards
            .insert("corp.lan".to_string(), vec!["10.1.1.1".to_string()]);

        let acl = AclItem {
            upstream_resolvers: vec!["10.9.9.9".to_string()],
            ..AclItem::default()
        };
        let resolv = ResolvConf {
            nameservers: vec!["192.0.2.53".to_string()],
            ..ResolvConf::default()
        };

        assert_eq!(
            config.upstream_resolvers_for("host.corp.lan.", Some(&acl), Some(&resolv)),
            ["10.9.9.9"]
        );
        assert_eq!(
            config.upstream_resolvers_for("host.corp.lan.", None, Some(&resolv)),
            ["10.1.1.1"]
        );
        assert_eq!(
            config.upstream_resolvers_for("example.com.", None, Some(&resolv)),
            ["192.0.2.53"]
        );
        assert_eq!(
            config.upstream_resolvers_for("example.com.", None, None),
            ["9.9.9.9"]
        );
    }

    #[test]
    fn acl_selection_order_and_rejection() {
        let mut config = AppConfig {
            enable_acls: true,
            ..AppConfig::default()
        };
        config.acls.insert("test".to_string(), AclItem::default());

        assert!(config.ac_item(Some("test"), None).unwrap().is_some());
        assert!(matches!(
            config.ac_item(Some("example"), None),
            Err(DomainError::UnrecognizedClient)
        ));
        assert!(matches!(
            config.ac_item(None, None),
            Err(DomainError::UnrecognizedClient)
        ));

        config.acls.insert(
            "ip:192.0.2.7".to_string(),
            AclItem {
                add_cpe_id: "pinned".into(),
                ..AclItem::default()
            },
        );
        let by_ip = config
            .ac_item(Some("unknown"), Some("192.0.2.7"))
            .unwrap()
            .unwrap();
        assert_eq!(by_ip.add_cpe_id, "pinned");

        config.acls.insert("*".to_string(), AclItem::default());
        assert!(config.ac_item(Some("nobody"), None).unwrap().is_some());
    }

    #[test]
    fn acls_disabled_means_unconstrained() {
        let config = AppConfig::default();
        assert!(config.ac_item(Some("anyone"), None).unwrap().is_none());
    }

    #[test]
    fn defaults_match_the_documented_table() {
        let config = AppConfig::default();
        assert_eq!(config.dns_server_port, 53);
        assert_eq!(config.dns_over_http_port, 8080);
        assert_eq!(config.dns_over_tls_port, 853);
        assert!(config.disable_metrics);
        assert_eq!(config.force_minimum_ttl, -1);
        assert!(config.predictive_cache);
        assert_eq!(config.predictive_threshold, 10);
        assert!(config.resilient_cache);
        assert!(config.respect_resolvconf);
        assert_eq!(config.resolvconf_path, "/etc/resolv.conf");
    }

    #[test]
    fn partial_json_keeps_defaults_for_missing_keys() {
        let mut config: AppConfig =
            serde_json::from_str(r#"{"dns_server_port": 5353, "predictive_threshold": 2}"#)
                .unwrap();
        config.prepare();
        assert_eq!(config.dns_server_port, 5353);
        assert_eq!(config.predictive_threshold, 2);
        assert_eq!(config.dns_over_tls_port, 853);
        assert!(config.mdns_enable);
    }
}
