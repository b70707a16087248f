//! `config` entries: named configuration files declared in the boot file.
//!
//! ```yaml
//! config:
//!   - name: my-config
//!     path: config/app.yaml
//!     envPrefix: MYAPP
//! ```
//!
//! Files are loaded at registration time, so entries of later categories can read them
//! from their factories through [`get_config_entry`].

pub mod config;
pub mod entry;

pub use config::ConfigEntryConfig;
pub use entry::{get_config_entry, register_config_entries_from_config, ConfigEntry, CONFIG_ENTRY_TYPE};
