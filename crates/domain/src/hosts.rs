use std::collections::HashMap;
use std::net::IpAddr;

use crate::resolv_conf::make_qualified;

/// Host/address maps parsed from `/etc/hosts`-style content, split by
/// address family. Names are stored fully qualified.
#[derive(Debug, Clone, Default)]
pub struct HostsTable {
    pub a: HashMap<String, String>,
    pub aaaa: HashMap<String, String>,
}

impl HostsTable {
    pub fn parse(content: &str) -> Self {
        let mut table = Self::default();

        for line in content.lines() {
            let line = line.split('#').next().unwrap_or("");
            let words: Vec<&str> = line.split_whitespace().collect();
            if words.len() < 2 {
                continue;
            }

            let Ok(addr) = words[0].parse::<IpAddr>() else {
                continue;
            };

            for host in &words[1..] {
                match addr {
                    IpAddr::V4(_) => {
                        table.a.insert(make_qualified(host), addr.to_string());
                    }
                    IpAddr::V6(_) => {
                        table.aaaa.insert(make_qualified(host), addr.to_string());
                    }
                }
            }
        }

        table
    }
}
