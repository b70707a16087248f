use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::context::BootCtx;
use crate::entry::EntryKey;

/// Callback run immediately before or after an entry's bootstrap.
pub type Hook = Arc<dyn Fn(&BootCtx) + Send + Sync>;

/// Per-entry before/after bootstrap hooks, keyed by `(type, name)`.
///
/// At most one hook per key and phase; registering again replaces the previous one.
#[derive(Default)]
pub struct HookTable {
    before: RwLock<HashMap<EntryKey, Hook>>,
    after: RwLock<HashMap<EntryKey, Hook>>,
}

impl HookTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_before<F>(&self, entry_type: &str, name: &str, hook: F)
    where
        F: Fn(&BootCtx) + Send + Sync + 'static,
    {
        self.before
            .write()
            .insert(EntryKey::new(entry_type, name), Arc::new(hook));
    }

    pub fn add_after<F>(&self, entry_type: &str, name: &str, hook: F)
    where
        F: Fn(&BootCtx) + Send + Sync + 'static,
    {
        self.after
            .write()
            .insert(EntryKey::new(entry_type, name), Arc::new(hook));
    }

    /// The registered before-hook, or a no-op.
    pub fn resolve_before(&self, key: &EntryKey) -> Hook {
        Self::resolve(&self.before, key)
    }

    /// The registered after-hook, or a no-op.
    pub fn resolve_after(&self, key: &EntryKey) -> Hook {
        Self::resolve(&self.after, key)
    }

    fn resolve(map: &RwLock<HashMap<EntryKey, Hook>>, key: &EntryKey) -> Hook {
        if let Some(hook) = map.read().get(key) {
            return hook.clone();
        }
        let noop: Hook = Arc::new(|_: &BootCtx| {});
        noop
    }

    pub fn len(&self) -> usize {
        self.before.read().len() + self.after.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for HookTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookTable")
            .field("before", &self.before.read().len())
            .field("after", &self.after.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::EntryRegistry;
    use crate::shutdown::ShutdownController;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ctx() -> BootCtx {
        let shutdown = ShutdownController::new();
        BootCtx::new(Arc::new(EntryRegistry::new()), shutdown.handle())
    }

    #[test]
    fn missing_hooks_resolve_to_noop() {
        let table = HookTable::new();
        let key = EntryKey::new("myEntry", "ut");
        (table.resolve_before(&key))(&ctx());
        (table.resolve_after(&key))(&ctx());
        assert!(table.is_empty());
    }

    #[test]
    fn hooks_are_keyed_by_type_and_name() {
        let table = HookTable::new();
        let before = Arc::new(AtomicUsize::new(0));
        let after = Arc::new(AtomicUsize::new(0));

        let b = before.clone();
        table.add_before("myEntry", "ut", move |_| {
            b.fetch_add(1, Ordering::SeqCst);
        });
        let a = after.clone();
        table.add_after("myEntry", "ut", move |_| {
            a.fetch_add(10, Ordering::SeqCst);
        });

        let ctx = ctx();
        (table.resolve_before(&EntryKey::new("myEntry", "ut")))(&ctx);
        (table.resolve_before(&EntryKey::new("myEntry", "other")))(&ctx);
        (table.resolve_after(&EntryKey::new("myEntry", "ut")))(&ctx);

        assert_eq!(before.load(Ordering::SeqCst), 1);
        assert_eq!(after.load(Ordering::SeqCst), 10);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn registering_again_replaces() {
        let table = HookTable::new();
        let hits = Arc::new(AtomicUsize::new(0));

        table.add_before("t", "n", |_| panic!("replaced hook must not run"));
        let h = hits.clone();
        table.add_before("t", "n", move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        (table.resolve_before(&EntryKey::new("t", "n")))(&ctx());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(table.len(), 1);
    }
}
