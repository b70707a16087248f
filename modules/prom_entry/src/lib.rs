//! `prom` entry: a Prometheus recorder plus its own scrape server.
//!
//! ```yaml
//! prom:
//!   enabled: true
//!   port: 1608
//!   path: /metrics
//! ```
//!
//! The entry is a plugin, so it exists before any http entry is built. An http entry
//! that declares `prom.enabled` looks it up at factory time and layers
//! [`instrument`] over its router.

pub mod config;
pub mod entry;
mod middleware;

pub use config::PromEntryConfig;
pub use entry::{get_prom_entry, register_prom_entries_from_config, PromEntry, PROM_ENTRY_TYPE};
pub use middleware::instrument;
