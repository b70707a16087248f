use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Environment prefix for boot-level overrides, e.g. `RKBOOT__APP__NAME=demo`.
pub const ENV_PREFIX: &str = "RKBOOT__";

/// Application identity declared under the `app:` key of the boot file.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AppSection {
    pub name: String,
    pub version: String,
    pub description: String,
    pub keywords: Vec<String>,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: "unknown".to_string(),
            version: "local".to_string(),
            description: String::new(),
            keywords: Vec::new(),
        }
    }
}

/// Boot-level settings read from the same document the entry factories decode.
///
/// Only the `app` and `logging` keys belong to the framework itself; every other
/// top-level key is owned by an entry factory and ignored here.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct AppConfig {
    /// Application identity (defaults when absent).
    #[serde(default)]
    pub app: AppSection,
    /// Logging configuration (optional, uses a console-only fallback if None).
    #[serde(default)]
    pub logging: Option<LoggingConfig>,
}

/// Logging configuration - maps subsystem names to their logging settings.
/// Key "default" is the catch-all for logs that don't match explicit subsystems.
pub type LoggingConfig = HashMap<String, Section>;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Section {
    pub console_level: String, // "info", "debug", "error", "off"
    #[serde(default)]
    pub file: String, // "logs/api.log"
    #[serde(default)]
    pub file_level: String,
    #[serde(default)]
    pub max_age_days: Option<u32>,
    #[serde(default)]
    pub max_backups: Option<usize>, // How many files to keep
    #[serde(default)]
    pub max_size_mb: Option<u64>, // Max size of the file in MB
}

/// Create a default logging configuration.
pub fn default_logging_config() -> LoggingConfig {
    let mut logging = HashMap::new();
    logging.insert(
        "default".to_string(),
        Section {
            console_level: "info".to_string(),
            file: "logs/rkboot.log".to_string(),
            file_level: "debug".to_string(),
            max_age_days: Some(7),
            max_backups: Some(3),
            max_size_mb: Some(100),
        },
    );
    logging
}

impl AppConfig {
    /// Layered extraction: defaults → boot document → `RKBOOT__*` environment variables.
    ///
    /// The document may be YAML or JSON; unknown top-level keys are left to entry factories.
    pub fn from_raw(raw: &[u8]) -> Result<Self> {
        use figment::{
            providers::{Env, Format, Serialized, Yaml},
            Figment,
        };

        let text = std::str::from_utf8(raw).context("Boot config is not valid UTF-8")?;

        let figment = Figment::new()
            .merge(Serialized::defaults(AppConfig::default()))
            .merge(Yaml::string(text))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        figment
            .extract()
            .with_context(|| "Failed to extract boot config from figment".to_string())
    }

    /// Serialize configuration to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize config to YAML")
    }

    /// Apply overrides from command line arguments.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        // Set logging level based on verbose flags for "default" section.
        let logging = self.logging.get_or_insert_with(default_logging_config);
        if let Some(default_section) = logging.get_mut("default") {
            default_section.console_level = match args.verbose {
                0 => default_section.console_level.clone(), // keep
                1 => "debug".to_string(),
                _ => "trace".to_string(),
            };
        }
    }
}

/// Command line arguments structure.
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    pub config: Option<String>,
    pub print_config: bool,
    pub verbose: u8,
}

#[cfg(test)]
mod tests;
