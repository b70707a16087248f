use async_trait::async_trait;
use serde::Serialize;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::context::BootCtx;

/// Upcasting support for typed lookups; blanket-implemented for every entry type.
///
/// Call these on `&dyn Entry` / `Arc<dyn Entry>`, never on `&Arc<dyn Entry>`, or the
/// blanket impl resolves to the `Arc` itself.
pub trait AsAny: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// A lifecycle-managed unit: a server, an exporter, a config source, a user resource.
///
/// Entries are created by registration factories before anything is bootstrapped,
/// then owned by the [`EntryRegistry`](crate::EntryRegistry) for the rest of the process.
#[async_trait]
pub trait Entry: AsAny {
    /// Unique within [`Entry::entry_type`].
    fn name(&self) -> &str;

    /// Category discriminator, usually the boot file key the entry was decoded from.
    fn entry_type(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// Called exactly once by the orchestrator. Errors and panics abort startup.
    async fn bootstrap(&self, ctx: &BootCtx) -> anyhow::Result<()>;

    /// Called once on shutdown. Must tolerate a bootstrap that never ran or failed.
    async fn interrupt(&self, ctx: &BootCtx) -> anyhow::Result<()>;

    /// JSON view used by diagnostics endpoints.
    fn info(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.name(),
            "type": self.entry_type(),
            "description": self.description(),
        })
    }
}

impl fmt::Debug for dyn Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("type", &self.entry_type())
            .field("name", &self.name())
            .finish()
    }
}

/// `(type, name)` identity of an entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EntryKey {
    pub entry_type: String,
    pub name: String,
}

impl EntryKey {
    pub fn new(entry_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            entry_type: entry_type.into(),
            name: name.into(),
        }
    }

    pub fn of(entry: &dyn Entry) -> Self {
        Self::new(entry.entry_type(), entry.name())
    }
}

impl fmt::Display for EntryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.entry_type, self.name)
    }
}
