use rkboot::Enablable;
use serde::{Deserialize, Serialize};

/// The `prom:` section of the boot file. A single object, off unless `enabled: true`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PromEntryConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub enabled: bool,
    /// 0 picks a free port.
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_address")]
    pub address: String,
    /// Scrape path.
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default)]
    pub description: String,
    /// Histogram buckets in seconds; empty renders summaries.
    #[serde(default)]
    pub buckets: Vec<f64>,
}

impl PromEntryConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            port: default_port(),
            address: default_address(),
            path: default_path(),
            description: String::new(),
            buckets: Vec::new(),
        }
    }
}

impl Enablable for PromEntryConfig {
    fn enabled(&self) -> bool {
        self.enabled
    }
}

fn default_name() -> String {
    "prom".to_string()
}

fn default_port() -> u16 {
    1608
}

fn default_address() -> String {
    "0.0.0.0".to_string()
}

fn default_path() -> String {
    "/metrics".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(doc: &str) -> Vec<PromEntryConfig> {
        rkboot::entry_configs(doc.as_bytes(), "prom").unwrap()
    }

    #[test]
    fn section_is_off_by_default() {
        assert!(parse("prom:\n  port: 9000\n").is_empty());
        assert!(parse("app:\n  name: demo\n").is_empty());
    }

    #[test]
    fn defaults_fill_missing_fields() {
        let mut items = parse("prom:\n  enabled: true\n");
        let cfg = items.remove(0);
        assert_eq!(cfg.name, "prom");
        assert_eq!(cfg.port, 1608);
        assert_eq!(cfg.address, "0.0.0.0");
        assert_eq!(cfg.path, "/metrics");
        assert!(cfg.buckets.is_empty());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let res = serde_json::from_value::<PromEntryConfig>(serde_json::json!({
            "enabled": true,
            "pushGateway": {"enabled": true},
        }));
        assert!(res.is_err());
    }
}
