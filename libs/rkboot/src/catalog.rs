use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use serde::de::DeserializeOwned;

use crate::decode::{self, Enablable};
use crate::entry::Entry;
use crate::registry::{Category, EntryRegistry};

/// What a factory sees: the raw boot config and the registry filled so far.
///
/// Factories of later categories can look up entries produced by earlier ones.
pub struct FactoryCtx<'a> {
    raw: &'a [u8],
    registry: &'a EntryRegistry,
}

impl<'a> FactoryCtx<'a> {
    pub fn new(raw: &'a [u8], registry: &'a EntryRegistry) -> Self {
        Self { raw, registry }
    }

    pub fn raw(&self) -> &'a [u8] {
        self.raw
    }

    pub fn registry(&self) -> &'a EntryRegistry {
        self.registry
    }

    pub fn unmarshal<T: DeserializeOwned>(&self) -> Result<T> {
        decode::unmarshal_boot(self.raw)
    }

    pub fn entry_configs<T: DeserializeOwned + Enablable>(&self, key: &str) -> Result<Vec<T>> {
        decode::entry_configs(self.raw, key)
    }
}

pub type FactoryResult = Result<Vec<Arc<dyn Entry>>>;

/// Link-time factory signature.
pub type FactoryFn = fn(&FactoryCtx<'_>) -> FactoryResult;

/// Link-time registration submitted with [`inventory::submit!`].
///
/// ```ignore
/// inventory::submit! {
///     rkboot::FactoryRegistration {
///         category: rkboot::Category::User,
///         name: "myEntry",
///         factory: register_my_entries,
///     }
/// }
/// ```
pub struct FactoryRegistration {
    pub category: Category,
    pub name: &'static str,
    pub factory: FactoryFn,
}

inventory::collect!(FactoryRegistration);

type DynFactory = dyn Fn(&FactoryCtx<'_>) -> FactoryResult + Send + Sync;

/// A factory plus the name it is reported under in logs and errors.
#[derive(Clone)]
pub struct NamedFactory {
    name: String,
    factory: Arc<DynFactory>,
}

impl NamedFactory {
    pub fn new<F>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&FactoryCtx<'_>) -> FactoryResult + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            factory: Arc::new(factory),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn invoke(&self, ctx: &FactoryCtx<'_>) -> FactoryResult {
        (self.factory)(ctx)
    }
}

impl fmt::Debug for NamedFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NamedFactory").field(&self.name).finish()
    }
}

/// Ordered set of registration factories, grouped by [`Category`].
///
/// Within a category factories run in insertion order. [`FactoryCatalog::discover`]
/// inserts link-time registrations sorted by name so the order does not depend on
/// the linker.
#[derive(Debug, Clone)]
pub struct FactoryCatalog {
    groups: Vec<(Category, Vec<NamedFactory>)>,
}

impl Default for FactoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl FactoryCatalog {
    /// Empty catalog.
    pub fn new() -> Self {
        Self {
            groups: Category::ORDER.iter().map(|c| (*c, Vec::new())).collect(),
        }
    }

    /// Catalog pre-filled with every [`FactoryRegistration`] linked into the binary.
    pub fn discover() -> Self {
        let mut regs: Vec<&'static FactoryRegistration> = Vec::new();
        for r in ::inventory::iter::<FactoryRegistration> {
            regs.push(r);
        }
        regs.sort_by_key(|r| r.name);

        let mut catalog = Self::new();
        for r in regs {
            tracing::debug!(category = %r.category, factory = r.name, "discovered registration");
            catalog.register(r.category, r.name, r.factory);
        }
        catalog
    }

    /// Append a factory to `category`; it runs after the ones already there.
    pub fn register<F>(&mut self, category: Category, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&FactoryCtx<'_>) -> FactoryResult + Send + Sync + 'static,
    {
        let named = NamedFactory::new(name, factory);
        if let Some((_, list)) = self.groups.iter_mut().find(|(c, _)| *c == category) {
            list.push(named);
        }
        self
    }

    /// Factories of one category, in run order.
    pub fn factories(&self, category: Category) -> &[NamedFactory] {
        self.groups
            .iter()
            .find(|(c, _)| *c == category)
            .map(|(_, list)| list.as_slice())
            .unwrap_or(&[])
    }

    /// All factories in run order: categories per [`Category::ORDER`], then insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (Category, &NamedFactory)> {
        self.groups
            .iter()
            .flat_map(|(c, list)| list.iter().map(move |f| (*c, f)))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.iter().any(|(_, f)| f.name() == name)
    }

    pub fn len(&self) -> usize {
        self.groups.iter().map(|(_, list)| list.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: &FactoryCtx<'_>) -> FactoryResult {
        Ok(Vec::new())
    }

    #[test]
    fn iteration_follows_category_order_then_insertion() {
        let mut catalog = FactoryCatalog::new();
        catalog
            .register(Category::WebFramework, "http", noop)
            .register(Category::User, "b", noop)
            .register(Category::Plugin, "config", noop)
            .register(Category::User, "a", noop);

        let order: Vec<_> = catalog
            .iter()
            .map(|(c, f)| format!("{c}:{}", f.name()))
            .collect();
        assert_eq!(
            order,
            vec!["plugin:config", "user:b", "user:a", "web-framework:http"]
        );
        assert_eq!(catalog.len(), 4);
        assert_eq!(catalog.factories(Category::User).len(), 2);
    }

    #[test]
    fn empty_catalog() {
        let catalog = FactoryCatalog::new();
        assert!(catalog.is_empty());
        assert!(catalog.factories(Category::Plugin).is_empty());
        assert!(!catalog.contains("app"));
    }

    #[test]
    fn discovery_includes_the_app_info_registration() {
        let catalog = FactoryCatalog::discover();
        assert!(catalog.contains("app"));
        assert!(catalog
            .factories(Category::Plugin)
            .iter()
            .any(|f| f.name() == "app"));
    }

    #[test]
    fn factory_sees_raw_config_and_registry() {
        let mut catalog = FactoryCatalog::new();
        catalog.register(Category::User, "sample", |ctx| {
            let v: serde_yaml::Value = ctx.unmarshal()?;
            anyhow::ensure!(v.get("sample").is_some(), "sample key missing");
            anyhow::ensure!(ctx.registry().is_empty(), "registry not empty");
            Ok(Vec::new())
        });

        let registry = EntryRegistry::new();
        let ctx = FactoryCtx::new(b"sample: 1\n", &registry);
        let (_, factory) = catalog.iter().next().unwrap();
        assert!(factory.invoke(&ctx).is_ok());

        let ctx = FactoryCtx::new(b"other: 1\n", &registry);
        assert!(factory.invoke(&ctx).is_err());
    }
}
