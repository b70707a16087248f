use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use figment::providers::{Env, Format, Json, Yaml};
use figment::Figment;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info};

use rkboot::{BootCtx, Category, Entry, EntryRegistry, FactoryCtx, FactoryRegistration, FactoryResult};

use crate::config::ConfigEntryConfig;

pub const CONFIG_ENTRY_TYPE: &str = "config";

/// A named configuration file, loaded once at registration time.
#[derive(Debug)]
pub struct ConfigEntry {
    name: String,
    description: String,
    path: PathBuf,
    env_prefix: String,
    values: Value,
}

impl ConfigEntry {
    /// Read the file and merge environment overrides. A missing or malformed file is an error.
    pub fn load(cfg: &ConfigEntryConfig) -> Result<Self> {
        let path = resolve_path(Path::new(&cfg.path))?;
        if !path.is_file() {
            bail!("config file {} not found", path.display());
        }

        let mut figment = Figment::new();
        figment = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => figment.merge(Json::file(&path)),
            _ => figment.merge(Yaml::file(&path)),
        };
        if !cfg.env_prefix.is_empty() {
            figment = figment.merge(Env::prefixed(&format!("{}__", cfg.env_prefix)).split("__"));
        }

        let values: Value = figment
            .extract()
            .with_context(|| format!("failed to load config file {}", path.display()))?;

        debug!(config = %cfg.name, path = %path.display(), "config file loaded");

        Ok(Self {
            name: cfg.name.clone(),
            description: cfg.description.clone(),
            path,
            env_prefix: cfg.env_prefix.clone(),
            values,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn values(&self) -> &Value {
        &self.values
    }

    /// Dotted lookup, e.g. `server.port` or `peers.0.host`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        key.split('.')
            .filter(|part| !part.is_empty())
            .try_fold(&self.values, |node, part| match node {
                Value::Object(map) => map.get(part),
                Value::Array(items) => part.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            })
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Deserialize the whole document.
    pub fn extract<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.values.clone())
            .with_context(|| format!("config '{}' does not match the requested type", self.name))
    }

    /// Deserialize the value under a dotted key.
    pub fn extract_at<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let value = self
            .get(key)
            .with_context(|| format!("key '{key}' not found in config '{}'", self.name))?;
        serde_json::from_value(value.clone())
            .with_context(|| format!("key '{key}' in config '{}' has an unexpected shape", self.name))
    }
}

fn resolve_path(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().context("failed to resolve working directory")?;
    Ok(cwd.join(path))
}

#[async_trait]
impl Entry for ConfigEntry {
    fn name(&self) -> &str {
        &self.name
    }

    fn entry_type(&self) -> &str {
        CONFIG_ENTRY_TYPE
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn bootstrap(&self, ctx: &BootCtx) -> Result<()> {
        info!(event_id = %ctx.event_id(), config = %self.name, path = %self.path.display(), "config entry ready");
        Ok(())
    }

    async fn interrupt(&self, _ctx: &BootCtx) -> Result<()> {
        Ok(())
    }

    fn info(&self) -> Value {
        serde_json::json!({
            "name": self.name,
            "type": CONFIG_ENTRY_TYPE,
            "description": self.description,
            "path": self.path.display().to_string(),
            "envPrefix": self.env_prefix,
        })
    }
}

/// Factory for the `config:` section.
pub fn register_config_entries_from_config(ctx: &FactoryCtx<'_>) -> FactoryResult {
    let mut entries: Vec<Arc<dyn Entry>> = Vec::new();
    for cfg in ctx.entry_configs::<ConfigEntryConfig>(CONFIG_ENTRY_TYPE)? {
        let entry = ConfigEntry::load(&cfg).with_context(|| format!("config entry '{}'", cfg.name))?;
        entries.push(Arc::new(entry));
    }
    Ok(entries)
}

inventory::submit! {
    FactoryRegistration {
        category: Category::Plugin,
        name: CONFIG_ENTRY_TYPE,
        factory: register_config_entries_from_config,
    }
}

pub fn get_config_entry(registry: &EntryRegistry, name: &str) -> Option<Arc<ConfigEntry>> {
    registry.get_typed::<ConfigEntry>(CONFIG_ENTRY_TYPE, name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::io::Write;

    fn write_file(dir: &tempfile::TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(body.as_bytes()).unwrap();
        path
    }

    fn item(name: &str, path: &Path, env_prefix: &str) -> ConfigEntryConfig {
        ConfigEntryConfig {
            name: name.to_string(),
            path: path.display().to_string(),
            env_prefix: env_prefix.to_string(),
            description: String::new(),
            enabled: true,
        }
    }

    #[test]
    fn loads_yaml_with_dotted_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "app.yaml",
            "server:\n  port: 8080\n  host: localhost\npeers:\n  - host: a\n  - host: b\n",
        );

        let entry = ConfigEntry::load(&item("ut", &path, "")).unwrap();
        assert_eq!(entry.get("server.port"), Some(&Value::from(8080)));
        assert_eq!(entry.get_str("server.host"), Some("localhost"));
        assert_eq!(entry.get_str("peers.1.host"), Some("b"));
        assert!(entry.get("server.missing").is_none());
        assert!(entry.get("peers.x").is_none());
    }

    #[test]
    fn loads_json_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "app.json", r#"{"feature": {"enabled": true}}"#);

        let entry = ConfigEntry::load(&item("ut", &path, "")).unwrap();
        assert_eq!(entry.get("feature.enabled"), Some(&Value::Bool(true)));
    }

    #[test]
    fn typed_extraction() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Server {
            port: u16,
            host: String,
        }

        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "app.yaml", "server:\n  port: 8080\n  host: localhost\n");
        let entry = ConfigEntry::load(&item("ut", &path, "")).unwrap();

        let server: Server = entry.extract_at("server").unwrap();
        assert_eq!(
            server,
            Server {
                port: 8080,
                host: "localhost".into()
            }
        );
        assert!(entry.extract_at::<Server>("nope").is_err());
        assert!(entry.extract::<Vec<String>>().is_err());
    }

    #[test]
    fn env_prefix_overrides_file_values() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("app.yaml", "server:\n  port: 8080\n  host: localhost\n")?;
            jail.set_env("UTCFG__SERVER__HOST", "example.org");

            let entry = ConfigEntry::load(&ConfigEntryConfig {
                name: "ut".into(),
                path: "app.yaml".into(),
                env_prefix: "UTCFG".into(),
                description: String::new(),
                enabled: true,
            })
            .map_err(|e| e.to_string())?;

            assert_eq!(entry.get_str("server.host"), Some("example.org"));
            assert_eq!(entry.get("server.port"), Some(&Value::from(8080)));
            Ok(())
        });
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = ConfigEntry::load(&item("ut", Path::new("/definitely/not/here.yaml"), ""))
            .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn factory_registers_enabled_items() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "app.yaml", "a: 1\n");
        let raw = format!(
            "config:\n  - name: primary\n    path: {p}\n  - name: standby\n    path: {p}\n    enabled: false\n",
            p = path.display()
        );

        let registry = EntryRegistry::new();
        let entries =
            register_config_entries_from_config(&FactoryCtx::new(raw.as_bytes(), &registry))
                .unwrap();
        assert_eq!(entries.len(), 1);

        registry.add_in(Category::Plugin, entries[0].clone());
        let entry = get_config_entry(&registry, "primary").unwrap();
        assert_eq!(entry.get("a"), Some(&Value::from(1)));
        assert_eq!(entry.info()["envPrefix"], "");
        assert!(get_config_entry(&registry, "standby").is_none());
    }

    #[test]
    fn factory_fails_on_unreadable_file() {
        let registry = EntryRegistry::new();
        let raw = b"config:\n  name: broken\n  path: /definitely/not/here.yaml\n";
        let err = register_config_entries_from_config(&FactoryCtx::new(raw, &registry)).unwrap_err();
        assert!(format!("{err:#}").contains("broken"));
    }
}
