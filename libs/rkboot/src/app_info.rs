//! Built-in `app` entry describing the running application.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rkboot_bootstrap::config::{AppConfig, AppSection};

use crate::catalog::{FactoryCtx, FactoryRegistration, FactoryResult};
use crate::context::BootCtx;
use crate::entry::Entry;
use crate::registry::{Category, EntryRegistry};

pub const APP_INFO_ENTRY_TYPE: &str = "app";

/// Name, version and uptime of the application, decoded from the `app:` section.
#[derive(Debug)]
pub struct AppInfoEntry {
    section: AppSection,
    started_at: DateTime<Utc>,
}

impl AppInfoEntry {
    pub fn new(section: AppSection) -> Self {
        Self {
            section,
            started_at: Utc::now(),
        }
    }

    pub fn section(&self) -> &AppSection {
        &self.section
    }

    pub fn version(&self) -> &str {
        &self.section.version
    }

    pub fn keywords(&self) -> &[String] {
        &self.section.keywords
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn uptime(&self) -> chrono::Duration {
        Utc::now() - self.started_at
    }
}

#[async_trait]
impl Entry for AppInfoEntry {
    fn name(&self) -> &str {
        &self.section.name
    }

    fn entry_type(&self) -> &str {
        APP_INFO_ENTRY_TYPE
    }

    fn description(&self) -> &str {
        &self.section.description
    }

    async fn bootstrap(&self, ctx: &BootCtx) -> anyhow::Result<()> {
        tracing::info!(event_id = %ctx.event_id(), app = %self.section.name, version = %self.section.version, "app info ready");
        Ok(())
    }

    async fn interrupt(&self, _ctx: &BootCtx) -> anyhow::Result<()> {
        Ok(())
    }

    fn info(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.section.name,
            "type": APP_INFO_ENTRY_TYPE,
            "version": self.section.version,
            "description": self.section.description,
            "keywords": self.section.keywords,
            "startTime": self.started_at.to_rfc3339(),
            "uptimeSec": self.uptime().num_seconds(),
        })
    }
}

/// Factory for the `app` entry. Always yields exactly one entry, with defaults when the
/// section is absent.
pub fn register_app_info_from_config(ctx: &FactoryCtx<'_>) -> FactoryResult {
    let cfg = AppConfig::from_raw(ctx.raw())?;
    let entry: Arc<dyn Entry> = Arc::new(AppInfoEntry::new(cfg.app));
    Ok(vec![entry])
}

inventory::submit! {
    FactoryRegistration {
        category: Category::Plugin,
        name: APP_INFO_ENTRY_TYPE,
        factory: register_app_info_from_config,
    }
}

/// The application's info entry; there is one per process, whatever its name.
pub fn get_app_info_entry(registry: &EntryRegistry) -> Option<Arc<AppInfoEntry>> {
    registry.first_typed::<AppInfoEntry>(APP_INFO_ENTRY_TYPE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_decodes_app_section() {
        let registry = EntryRegistry::new();
        let raw = b"app:\n  name: demo\n  version: 1.2.3\n  keywords: [a, b]\n";
        let entries = register_app_info_from_config(&FactoryCtx::new(raw, &registry)).unwrap();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name(), "demo");
        assert_eq!(entries[0].entry_type(), "app");

        registry.add_in(Category::Plugin, entries[0].clone());
        let app = get_app_info_entry(&registry).unwrap();
        assert_eq!(app.version(), "1.2.3");
        assert_eq!(app.keywords(), &["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn factory_falls_back_to_defaults() {
        let registry = EntryRegistry::new();
        let entries =
            register_app_info_from_config(&FactoryCtx::new(b"http: []\n", &registry)).unwrap();
        assert_eq!(entries[0].name(), "unknown");
        assert_eq!(entries[0].info()["version"], "local");
    }

    #[test]
    fn info_reports_uptime_fields() {
        let entry = AppInfoEntry::new(AppSection::default());
        let info = entry.info();
        assert!(info["startTime"].is_string());
        assert!(info["uptimeSec"].as_i64().unwrap() >= 0);
        assert!(entry.uptime() >= chrono::Duration::zero());
    }
}
