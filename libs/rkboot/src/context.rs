use std::sync::Arc;
use uuid::Uuid;

use crate::registry::EntryRegistry;
use crate::shutdown::ShutdownHandle;

/// Context threaded through hooks and entry lifecycle calls.
///
/// The event id correlates every log line of one bootstrap or interrupt sweep.
/// It carries no deadline; entries that want one bring their own.
#[derive(Clone)]
pub struct BootCtx {
    event_id: Uuid,
    registry: Arc<EntryRegistry>,
    shutdown: ShutdownHandle,
}

impl BootCtx {
    pub fn new(registry: Arc<EntryRegistry>, shutdown: ShutdownHandle) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            registry,
            shutdown,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    /// Registry for resolving other entries, e.g. a dependency created by a plugin.
    pub fn registry(&self) -> &Arc<EntryRegistry> {
        &self.registry
    }

    /// Handle for requesting a graceful shutdown from inside the process.
    pub fn shutdown(&self) -> &ShutdownHandle {
        &self.shutdown
    }
}

impl std::fmt::Debug for BootCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BootCtx")
            .field("event_id", &self.event_id)
            .field("entries", &self.registry.len())
            .finish()
    }
}
