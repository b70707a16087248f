use rkboot::Enablable;
use serde::{Deserialize, Serialize};

/// One item of the `config:` section of the boot file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConfigEntryConfig {
    pub name: String,
    /// YAML or JSON file, chosen by extension. Relative paths resolve against the
    /// working directory.
    pub path: String,
    /// Variables named `<envPrefix>__A__B` override key `a.b`. Empty disables overrides.
    #[serde(default)]
    pub env_prefix: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl Enablable for ConfigEntryConfig {
    fn enabled(&self) -> bool {
        self.enabled
    }
}

fn default_enabled() -> bool {
    true
}
