use rkboot::Enablable;
use serde::{Deserialize, Serialize};

/// One item of the `http:` section of the boot file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct HttpEntryConfig {
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// 0 picks a free port.
    #[serde(default)]
    pub port: u16,
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default)]
    pub description: String,
    /// Per-request handler timeout.
    #[serde(default = "default_timeout_sec")]
    pub timeout_sec: u64,
    #[serde(default)]
    pub common_service: CommonServiceConfig,
    #[serde(default)]
    pub prom: PromConfig,
}

impl HttpEntryConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            port: 0,
            address: default_address(),
            description: String::new(),
            timeout_sec: default_timeout_sec(),
            common_service: CommonServiceConfig::default(),
            prom: PromConfig::default(),
        }
    }
}

impl Enablable for HttpEntryConfig {
    fn enabled(&self) -> bool {
        self.enabled
    }
}

/// Built-in diagnostics routes (ping, healthy, info, entries, shutdown).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CommonServiceConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_path_prefix")]
    pub path_prefix: String,
}

impl Default for CommonServiceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path_prefix: default_path_prefix(),
        }
    }
}

/// Request metrics, recorded into the named `prom` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PromConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_prom_entry")]
    pub entry: String,
}

impl Default for PromConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            entry: default_prom_entry(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_address() -> String {
    "0.0.0.0".to_string()
}

fn default_timeout_sec() -> u64 {
    30
}

fn default_path_prefix() -> String {
    "/rk/v1".to_string()
}

fn default_prom_entry() -> String {
    "prom".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let cfg: HttpEntryConfig = parse_item("name: greeter\n");
        assert!(cfg.enabled);
        assert_eq!(cfg.port, 0);
        assert_eq!(cfg.address, "0.0.0.0");
        assert_eq!(cfg.timeout_sec, 30);
        assert!(!cfg.common_service.enabled);
        assert_eq!(cfg.common_service.path_prefix, "/rk/v1");
        assert!(!cfg.prom.enabled);
        assert_eq!(cfg.prom.entry, "prom");
    }

    #[test]
    fn camel_case_keys() {
        let cfg: HttpEntryConfig = parse_item(
            "name: greeter\nport: 8080\ntimeoutSec: 5\ncommonService:\n  enabled: true\n  pathPrefix: /ops\nprom:\n  enabled: true\n  entry: metrics\n",
        );
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.timeout_sec, 5);
        assert!(cfg.common_service.enabled);
        assert_eq!(cfg.common_service.path_prefix, "/ops");
        assert!(cfg.prom.enabled);
        assert_eq!(cfg.prom.entry, "metrics");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let res = serde_json::from_value::<HttpEntryConfig>(
            serde_json::json!({"name": "greeter", "prot": 8080}),
        );
        assert!(res.is_err());
    }

    fn parse_item(yaml: &str) -> HttpEntryConfig {
        let doc = format!("http:\n{}", indent(yaml));
        let mut items: Vec<HttpEntryConfig> = rkboot::entry_configs(doc.as_bytes(), "http").unwrap();
        items.remove(0)
    }

    fn indent(yaml: &str) -> String {
        yaml.lines().map(|l| format!("  {l}\n")).collect()
    }
}
