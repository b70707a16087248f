//! rkboot - config-driven entry lifecycle for server processes
//!
//! A boot file declares a set of entries (servers, config sources, exporters, user
//! resources). Registration factories turn the file into [`Entry`] instances, grouped by
//! [`Category`] and stored in the [`EntryRegistry`]; the [`Boot`] orchestrator then
//! bootstraps them in order, waits for a termination signal and interrupts them in
//! reverse.
//!
//! ```ignore
//! let boot = rkboot::Boot::new(rkboot::BootOptions::new(BootConfigSource::path("boot.yaml")))?;
//! boot.bootstrap().await?;
//! boot.wait_for_shutdown_sig().await?;
//! ```

pub use anyhow::Result;
pub use async_trait::async_trait;

// Re-exported so entry crates can submit registrations without their own dependency.
pub use inventory;

pub mod app_info;
pub mod boot;
pub mod catalog;
pub mod context;
pub mod decode;
pub mod entry;
pub mod guard;
pub mod hooks;
pub mod registry;
pub mod shutdown;

pub use app_info::{get_app_info_entry, AppInfoEntry, APP_INFO_ENTRY_TYPE};
pub use boot::{Boot, BootError, BootOptions, BootState};
pub use catalog::{FactoryCatalog, FactoryCtx, FactoryFn, FactoryRegistration, FactoryResult, NamedFactory};
pub use context::BootCtx;
pub use decode::{entry_configs, unmarshal_boot, Enablable};
pub use entry::{AsAny, Entry, EntryKey};
pub use guard::sync_on_panic;
pub use hooks::{Hook, HookTable};
pub use registry::{Category, EntryMap, EntryRegistry};
pub use shutdown::{ShutdownController, ShutdownHandle, ShutdownHook};

pub use rkboot_bootstrap::config::{AppConfig, AppSection};
pub use rkboot_bootstrap::config_source::{
    BootConfigSource, ConfigOrigin, ConfigSourceError, EmbeddedFs, LoadedConfig, StaticFs, DEFAULT_BOOT_FILE,
};
pub use rkboot_bootstrap::signals::Signal;
