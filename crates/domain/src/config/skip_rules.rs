use std::net::IpAddr;

use ipnet::IpNet;
use regex::Regex;
use tracing::warn;

/// Treats a bare address as a host network (/32 or /128); otherwise parses
/// the string as CIDR notation.
pub fn str_to_ip_net(data: &str) -> Option<IpNet> {
    if let Ok(ip) = data.parse::<IpAddr>() {
        return Some(IpNet::from(ip));
    }
    data.parse::<IpNet>().ok()
}

/// Compiled `do_not_cache` rules: a union of excluded networks and a single
/// case-insensitive alternation over the name patterns.
#[derive(Debug, Clone, Default)]
pub struct SkipRules {
    nets: Vec<IpNet>,
    regex: Option<Regex>,
}

impl SkipRules {
    pub fn compile(entries: &[String]) -> Self {
        let mut nets = Vec::new();
        let mut patterns = Vec::new();

        for entry in entries {
            if let Some(net) = str_to_ip_net(entry) {
                nets.push(net);
                continue;
            }

            let mut name = entry.as_str();
            if let Some(stripped) = name.strip_prefix('*') {
                name = stripped.strip_prefix('.').unwrap_or(stripped);
                patterns.push(format!(r".+\.{}(\.)?", regex::escape(name)));
            }
            patterns.push(format!(r"(^{}(\.?)$)", regex::escape(name)));
        }

        let regex = if patterns.is_empty() {
            None
        } else {
            match Regex::new(&format!("(?i){}", patterns.join("|"))) {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!(error = %e, "failed to compile cache exclude regex");
                    None
                }
            }
        };

        Self { nets, regex }
    }

    pub fn matches_name(&self, name: &str) -> bool {
        self.regex.as_ref().is_some_and(|re| re.is_match(name))
    }

    pub fn contains_ip(&self, ip: IpAddr) -> bool {
        self.nets.iter().any(|net| net.contains(&ip))
    }
}
