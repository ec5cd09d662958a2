use std::collections::HashMap;

const NDOTS_OPTION: &str = "ndots";

/// Snapshot of the system resolver configuration: search domains (stored
/// fully qualified), nameservers, and options. Governs how bare names are
/// expanded into candidate FQDNs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvConf {
    pub search: Vec<String>,
    pub nameservers: Vec<String>,
    pub options: HashMap<String, String>,
}

/// Appends the trailing terminator when missing.
pub fn make_qualified(name: &str) -> String {
    if name.is_empty() {
        return ".".to_string();
    }
    if name.ends_with('.') {
        name.to_string()
    } else {
        format!("{name}.")
    }
}

impl ResolvConf {
    pub fn parse(content: &str) -> Self {
        let mut conf = Self::default();

        for line in content.lines() {
            let words: Vec<&str> = line.split_whitespace().collect();
            if words.len() < 2 {
                continue;
            }

            match words[0] {
                "nameserver" => conf.nameservers.push(words[1].to_string()),
                "search" | "domain" => {
                    for s in &words[1..] {
                        conf.search.push(make_qualified(s));
                    }
                }
                "option" | "options" => {
                    for opt in &words[1..] {
                        if let Some((key, value)) = opt.split_once(':') {
                            conf.options.insert(key.to_string(), value.to_string());
                        }
                    }
                }
                _ => {}
            }
        }

        conf
    }

    fn ndots(&self) -> usize {
        self.options
            .get(NDOTS_OPTION)
            .and_then(|v| v.parse().ok())
            .unwrap_or(1)
    }

    /// A name counts as fully qualified when it carries at least `ndots`
    /// dots, not counting the trailing terminator.
    pub fn name_is_fully_qualified(&self, name: &str) -> bool {
        if name.is_empty() {
            return false;
        }

        let ndots = self.ndots();
        let trimmed = &name[..name.len() - 1];
        trimmed.chars().filter(|&c| c == '.').count() >= ndots
    }

    /// The ordered candidate FQDNs for a name. The name itself leads when it
    /// is already qualified under the ndots policy or when there is no search
    /// list; each search domain the name does not already end with
    /// contributes one more candidate. The order is the trial order.
    pub fn fully_qualified_names(&self, name: &str) -> Vec<String> {
        let mut names = Vec::new();
        if name.is_empty() {
            return names;
        }

        let name = make_qualified(name);

        if self.name_is_fully_qualified(&name) || self.search.is_empty() {
            names.push(name.clone());
        }

        for search in &self.search {
            if name.ends_with(search.as_str()) {
                continue;
            }
            names.push(make_qualified(&format!("{name}{search}")));
        }

        names
    }
}
