//! Helpers for factories that decode their section of the boot config.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;

/// Decode the whole boot config into `T`. Unknown keys are ignored unless `T` forbids them.
pub fn unmarshal_boot<T: DeserializeOwned>(raw: &[u8]) -> Result<T> {
    serde_yaml::from_slice(raw).context("failed to decode boot config")
}

/// Implemented by per-entry config items that can be switched off in the boot file.
pub trait Enablable {
    fn enabled(&self) -> bool;
}

/// Decode the list of entry configs under a top-level `key`, dropping disabled items.
///
/// A sequence yields one item per element, a mapping is treated as a single item and an
/// absent or null key yields nothing.
pub fn entry_configs<T>(raw: &[u8], key: &str) -> Result<Vec<T>>
where
    T: DeserializeOwned + Enablable,
{
    let doc: serde_yaml::Value = serde_yaml::from_slice(raw).context("failed to decode boot config")?;

    let section = match doc.get(key) {
        None | Some(serde_yaml::Value::Null) => return Ok(Vec::new()),
        Some(v) => v.clone(),
    };

    let items: Vec<T> = match section {
        serde_yaml::Value::Sequence(_) => serde_yaml::from_value(section)
            .with_context(|| format!("invalid `{key}` section in boot config"))?,
        other => vec![serde_yaml::from_value(other)
            .with_context(|| format!("invalid `{key}` section in boot config"))?],
    };

    Ok(items.into_iter().filter(Enablable::enabled).collect())
}
