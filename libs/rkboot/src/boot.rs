//! Boot orchestrator - drives entries through the process lifecycle
//!
//! Created → ConfigLoaded → EntriesRegistered → Bootstrapped → Running → ShuttingDown → Terminated.
//! Startup is fail-fast: config, factory and bootstrap errors abort with a [`BootError`].
//! Shutdown is fail-open: interrupt errors are logged and the sweep continues.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rkboot_bootstrap::config_source::{BootConfigSource, ConfigSourceError, LoadedConfig};
use rkboot_bootstrap::logging::EVENT_TARGET;
use rkboot_bootstrap::signals::Signal;

use crate::app_info::get_app_info_entry;
use crate::catalog::{FactoryCatalog, FactoryCtx};
use crate::context::BootCtx;
use crate::entry::EntryKey;
use crate::guard::sync_on_panic;
use crate::hooks::HookTable;
use crate::registry::{Category, EntryRegistry};
use crate::shutdown::{ShutdownController, ShutdownHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BootState {
    Created,
    ConfigLoaded,
    EntriesRegistered,
    /// Set when the bootstrap sweep begins.
    Bootstrapped,
    Running,
    ShuttingDown,
    Terminated,
}

impl fmt::Display for BootState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BootState::Created => "created",
            BootState::ConfigLoaded => "config-loaded",
            BootState::EntriesRegistered => "entries-registered",
            BootState::Bootstrapped => "bootstrapped",
            BootState::Running => "running",
            BootState::ShuttingDown => "shutting-down",
            BootState::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BootError {
    #[error(transparent)]
    Config(#[from] ConfigSourceError),

    #[error("registration factory '{factory}' ({category}) failed")]
    Factory {
        category: Category,
        factory: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("bootstrap failed for entry {entry_type}/{name}")]
    Bootstrap {
        entry_type: String,
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("cannot {op} in state '{state}'")]
    InvalidState { op: &'static str, state: BootState },
}

/// Construction options for [`Boot`].
pub struct BootOptions {
    pub source: BootConfigSource,
    /// Factories to run; link-time registrations when `None`.
    pub catalog: Option<FactoryCatalog>,
    /// Registry to fill; a fresh one when `None`.
    pub registry: Option<Arc<EntryRegistry>>,
    pub os_signals: bool,
    /// Pause after every entry was interrupted, before the process is reported terminated.
    pub draining: Duration,
}

impl BootOptions {
    pub fn new(source: BootConfigSource) -> Self {
        Self {
            source,
            catalog: None,
            registry: None,
            os_signals: true,
            draining: Duration::ZERO,
        }
    }

    pub fn with_catalog(mut self, catalog: FactoryCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn with_registry(mut self, registry: Arc<EntryRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_draining(mut self, draining: Duration) -> Self {
        self.draining = draining;
        self
    }

    /// Only in-process requests end [`Boot::wait_for_shutdown_sig`].
    pub fn without_os_signals(mut self) -> Self {
        self.os_signals = false;
        self
    }
}

impl Default for BootOptions {
    fn default() -> Self {
        Self::new(BootConfigSource::default())
    }
}

/// Owns the registry, hook table and shutdown controller of one process.
pub struct Boot {
    config: LoadedConfig,
    registry: Arc<EntryRegistry>,
    hooks: HookTable,
    shutdown: ShutdownController,
    state: Mutex<BootState>,
    started_at: DateTime<Utc>,
    draining: Duration,
}

impl Boot {
    /// Resolve the boot document, then run every registration factory.
    pub fn new(opts: BootOptions) -> Result<Self, BootError> {
        let loaded = opts.source.resolve()?;
        Self::from_loaded(loaded, opts)
    }

    /// Like [`Boot::new`] for a document the caller already resolved, e.g. to set up
    /// logging first. `opts.source` is ignored.
    pub fn from_loaded(loaded: LoadedConfig, opts: BootOptions) -> Result<Self, BootError> {
        let mut state = BootState::Created;
        tracing::info!(origin = %loaded.origin, path = %loaded.path.display(), "Phase: config loaded");
        advance_local(&mut state, BootState::ConfigLoaded);

        let registry = opts.registry.unwrap_or_default();
        let catalog = opts.catalog.unwrap_or_else(FactoryCatalog::discover);

        tracing::info!(factories = catalog.len(), "Phase: register entries");
        for (category, factory) in catalog.iter() {
            let ctx = FactoryCtx::new(&loaded.raw, &registry);
            let entries = factory
                .invoke(&ctx)
                .map_err(|source| BootError::Factory {
                    category,
                    factory: factory.name().to_string(),
                    source,
                })?;

            for entry in entries {
                let key = EntryKey::of(entry.as_ref());
                tracing::debug!(%category, factory = factory.name(), entry = %key, "registering entry");
                if registry.add_in(category, entry).is_some() {
                    tracing::warn!(entry = %key, "entry registered twice; keeping the latest");
                }
            }
        }
        advance_local(&mut state, BootState::EntriesRegistered);

        let mut shutdown = ShutdownController::new();
        if !opts.os_signals {
            shutdown = shutdown.without_os_signals();
        }

        Ok(Self {
            config: loaded,
            registry,
            hooks: HookTable::new(),
            shutdown,
            state: Mutex::new(state),
            started_at: Utc::now(),
            draining: opts.draining,
        })
    }

    pub fn registry(&self) -> &Arc<EntryRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &LoadedConfig {
        &self.config
    }

    pub fn state(&self) -> BootState {
        *self.state.lock()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn hooks(&self) -> &HookTable {
        &self.hooks
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.handle()
    }

    /// Fresh lifecycle context with a new event id.
    pub fn new_ctx(&self) -> BootCtx {
        BootCtx::new(self.registry.clone(), self.shutdown.handle())
    }

    pub fn add_hook_before<F>(&self, entry_type: &str, name: &str, hook: F)
    where
        F: Fn(&BootCtx) + Send + Sync + 'static,
    {
        self.hooks.add_before(entry_type, name, hook);
    }

    pub fn add_hook_after<F>(&self, entry_type: &str, name: &str, hook: F)
    where
        F: Fn(&BootCtx) + Send + Sync + 'static,
    {
        self.hooks.add_after(entry_type, name, hook);
    }

    pub fn add_shutdown_hook<F>(&self, name: impl Into<String>, hook: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.shutdown.add_hook(name, hook);
    }

    /// Bootstrap every entry: categories in [`Category::ORDER`], entries in registration
    /// order, each wrapped by its before/after hooks.
    ///
    /// The first error aborts the sweep. A panic is logged, logs are flushed and the panic
    /// is resumed.
    pub async fn bootstrap(&self) -> Result<(), BootError> {
        self.advance("bootstrap", &[BootState::EntriesRegistered], BootState::Bootstrapped)?;

        let ctx = self.new_ctx();
        tracing::info!(event_id = %ctx.event_id(), entries = self.registry.len(), "Phase: bootstrap");

        sync_on_panic("bootstrap", async {
            for category in Category::ORDER {
                for entry in self.registry.list_by_category(category) {
                    let key = EntryKey::of(entry.as_ref());

                    (self.hooks.resolve_before(&key))(&ctx);

                    tracing::info!(event_id = %ctx.event_id(), %category, entry = %key, "bootstrapping entry");
                    entry
                        .bootstrap(&ctx)
                        .await
                        .map_err(|source| BootError::Bootstrap {
                            entry_type: key.entry_type.clone(),
                            name: key.name.clone(),
                            source,
                        })?;

                    (self.hooks.resolve_after(&key))(&ctx);
                }
            }
            Ok::<(), BootError>(())
        })
        .await?;

        tracing::info!(
            target: EVENT_TARGET,
            event = "boot_start",
            event_id = %ctx.event_id(),
            app = %self.app_name(),
            start_time = %self.started_at.to_rfc3339(),
            "boot started"
        );
        self.advance("run", &[BootState::Bootstrapped], BootState::Running)?;
        Ok(())
    }

    /// Block until an OS signal or an in-process request, then run shutdown hooks and
    /// interrupt every entry.
    pub async fn wait_for_shutdown_sig(&self) -> Result<Signal, BootError> {
        let current = self.state();
        if current != BootState::Running {
            return Err(BootError::InvalidState {
                op: "wait for shutdown",
                state: current,
            });
        }

        tracing::info!("Phase: wait");
        let sig = self.shutdown.wait().await;
        tracing::info!(signal = %sig, "shutdown signal received");

        self.advance("shut down", &[BootState::Running], BootState::ShuttingDown)?;
        let failed = self.shutdown.run_hooks();
        if failed > 0 {
            tracing::warn!(failed, "shutdown hooks panicked");
        }
        self.interrupt_sweep(Some(&sig)).await;
        Ok(sig)
    }

    /// Interrupt every entry without waiting for a signal, e.g. after a failed bootstrap.
    ///
    /// Shutdown hooks are not run. Fails only when the process was already terminated.
    pub async fn interrupt(&self) -> Result<(), BootError> {
        {
            let mut state = self.state.lock();
            if *state == BootState::Terminated {
                return Err(BootError::InvalidState {
                    op: "interrupt",
                    state: *state,
                });
            }
            *state = BootState::ShuttingDown;
        }
        self.interrupt_sweep(None).await;
        Ok(())
    }

    /// Reverse of the bootstrap order. Never fails.
    async fn interrupt_sweep(&self, sig: Option<&Signal>) {
        let ctx = self.new_ctx();
        tracing::info!(event_id = %ctx.event_id(), "Phase: interrupt");

        sync_on_panic("interrupt", async {
            for category in Category::ORDER.iter().rev() {
                let entries = self.registry.list_by_category(*category);
                for entry in entries.iter().rev() {
                    let key = EntryKey::of(entry.as_ref());
                    tracing::info!(event_id = %ctx.event_id(), %category, entry = %key, "interrupting entry");
                    if let Err(e) = entry.interrupt(&ctx).await {
                        tracing::warn!(entry = %key, error = %e, "interrupt failed; continuing");
                    }
                }
            }
        })
        .await;

        if !self.draining.is_zero() {
            tracing::info!(draining = ?self.draining, "draining");
            tokio::time::sleep(self.draining).await;
        }

        let lifetime = Utc::now() - self.started_at;
        tracing::info!(
            target: EVENT_TARGET,
            event = "boot_stop",
            event_id = %ctx.event_id(),
            app = %self.app_name(),
            signal = sig.map(Signal::name).unwrap_or("none"),
            lifetime_ms = lifetime.num_milliseconds(),
            "boot stopped"
        );

        *self.state.lock() = BootState::Terminated;
    }

    fn app_name(&self) -> String {
        get_app_info_entry(&self.registry)
            .map(|app| app.section().name.clone())
            .unwrap_or_else(|| "unknown".to_string())
    }

    fn advance(&self, op: &'static str, from: &[BootState], to: BootState) -> Result<(), BootError> {
        let mut state = self.state.lock();
        if !from.contains(&*state) {
            return Err(BootError::InvalidState { op, state: *state });
        }
        let from = *state;
        tracing::debug!(%from, %to, "boot state change");
        *state = to;
        Ok(())
    }
}

fn advance_local(state: &mut BootState, to: BootState) {
    let from = *state;
    tracing::debug!(%from, %to, "boot state change");
    *state = to;
}

impl fmt::Debug for Boot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Boot")
            .field("origin", &self.config.origin)
            .field("state", &self.state())
            .field("registry", &self.registry)
            .field("hooks", &self.hooks)
            .finish()
    }
}
