use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;

use crate::entry::{Entry, EntryKey};

/// Fixed registration groups. Factories run, and entries bootstrap, in [`Category::ORDER`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Category {
    /// First-party optional integrations (app info, config, metrics).
    Plugin,
    /// Caller-supplied custom entries.
    User,
    /// The caller's HTTP/RPC framework integration.
    WebFramework,
}

impl Category {
    /// Later categories may rely on entries created by earlier ones.
    pub const ORDER: [Category; 3] = [Category::Plugin, Category::User, Category::WebFramework];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Plugin => "plugin",
            Category::User => "user",
            Category::WebFramework => "web-framework",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Name → entry view of one type partition.
pub type EntryMap = HashMap<String, Arc<dyn Entry>>;

struct Slot {
    entry: Arc<dyn Entry>,
    category: Category,
    // insertion order, used for deterministic bootstrap/interrupt sweeps
    seq: u64,
}

#[derive(Default)]
struct Inner {
    by_type: HashMap<String, HashMap<String, Slot>>,
    next_seq: u64,
}

/// Process-wide store of entries, partitioned by type then name.
///
/// Mutation happens mostly during startup; lookups may come from request handlers
/// concurrently with rare add/remove calls, hence the read-write lock.
#[derive(Default)]
pub struct EntryRegistry {
    inner: RwLock<Inner>,
}

impl fmt::Debug for EntryRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys = self.keys();
        keys.sort();
        let keys: Vec<String> = keys.iter().map(ToString::to_string).collect();
        f.debug_struct("EntryRegistry").field("entries", &keys).finish()
    }
}

impl EntryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert under [`Category::User`]; see [`EntryRegistry::add_in`].
    pub fn add(&self, entry: Arc<dyn Entry>) -> Option<Arc<dyn Entry>> {
        self.add_in(Category::User, entry)
    }

    /// Insert or overwrite under `(entry_type, name)`. Latest registration wins and
    /// takes the position of a new entry in the sweep order.
    ///
    /// Returns the replaced entry, if any.
    pub fn add_in(&self, category: Category, entry: Arc<dyn Entry>) -> Option<Arc<dyn Entry>> {
        let entry_type = entry.entry_type().to_string();
        let name = entry.name().to_string();

        let mut inner = self.inner.write();
        let seq = inner.next_seq;
        inner.next_seq += 1;

        let replaced = inner.by_type.entry(entry_type).or_default().insert(
            name,
            Slot {
                entry,
                category,
                seq,
            },
        );

        replaced.map(|slot| slot.entry)
    }

    pub fn get(&self, entry_type: &str, name: &str) -> Option<Arc<dyn Entry>> {
        self.inner
            .read()
            .by_type
            .get(entry_type)
            .and_then(|names| names.get(name))
            .map(|slot| slot.entry.clone())
    }

    /// Lookup plus downcast; `None` when absent or of another concrete type.
    pub fn get_typed<T: Entry>(&self, entry_type: &str, name: &str) -> Option<Arc<T>> {
        self.get(entry_type, name)?.into_any_arc().downcast::<T>().ok()
    }

    /// First entry of `entry_type` whose concrete type is `T`, in sweep order.
    ///
    /// Useful for singletons such as the app info entry, whose name comes from config.
    pub fn first_typed<T: Entry>(&self, entry_type: &str) -> Option<Arc<T>> {
        let mut slots: Vec<(u64, Arc<dyn Entry>)> = {
            let inner = self.inner.read();
            inner
                .by_type
                .get(entry_type)
                .map(|names| {
                    names
                        .values()
                        .map(|s| (s.seq, s.entry.clone()))
                        .collect()
                })
                .unwrap_or_default()
        };
        slots.sort_by_key(|(seq, _)| *seq);

        slots
            .into_iter()
            .find_map(|(_, e)| e.into_any_arc().downcast::<T>().ok())
    }

    /// Always returns a map; empty when the type is unknown.
    pub fn list_by_type(&self, entry_type: &str) -> EntryMap {
        self.inner
            .read()
            .by_type
            .get(entry_type)
            .map(|names| {
                names
                    .iter()
                    .map(|(name, slot)| (name.clone(), slot.entry.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Snapshot of every partition: type → (name → entry).
    pub fn list_all(&self) -> HashMap<String, EntryMap> {
        self.inner
            .read()
            .by_type
            .iter()
            .map(|(entry_type, names)| {
                let map = names
                    .iter()
                    .map(|(name, slot)| (name.clone(), slot.entry.clone()))
                    .collect();
                (entry_type.clone(), map)
            })
            .collect()
    }

    /// Entries of one category in registration order.
    pub fn list_by_category(&self, category: Category) -> Vec<Arc<dyn Entry>> {
        let mut slots: Vec<(u64, Arc<dyn Entry>)> = self
            .inner
            .read()
            .by_type
            .values()
            .flat_map(|names| names.values())
            .filter(|slot| slot.category == category)
            .map(|slot| (slot.seq, slot.entry.clone()))
            .collect();

        slots.sort_by_key(|(seq, _)| *seq);
        slots.into_iter().map(|(_, entry)| entry).collect()
    }

    pub fn category_of(&self, entry_type: &str, name: &str) -> Option<Category> {
        self.inner
            .read()
            .by_type
            .get(entry_type)
            .and_then(|names| names.get(name))
            .map(|slot| slot.category)
    }

    /// Delete an entry; no effect when absent.
    pub fn remove(&self, entry_type: &str, name: &str) -> Option<Arc<dyn Entry>> {
        let mut inner = self.inner.write();
        let names = inner.by_type.get_mut(entry_type)?;
        let removed = names.remove(name);
        if names.is_empty() {
            inner.by_type.remove(entry_type);
        }
        removed.map(|slot| slot.entry)
    }

    pub fn contains(&self, entry_type: &str, name: &str) -> bool {
        self.inner
            .read()
            .by_type
            .get(entry_type)
            .is_some_and(|names| names.contains_key(name))
    }

    pub fn keys(&self) -> Vec<EntryKey> {
        self.inner
            .read()
            .by_type
            .iter()
            .flat_map(|(entry_type, names)| {
                names
                    .keys()
                    .map(move |name| EntryKey::new(entry_type.clone(), name.clone()))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().by_type.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
