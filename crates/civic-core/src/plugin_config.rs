//! Per-tenant plugin settings. Which keys a plugin accepts is decided by the
//! plugin itself; this module only stores them.

use crate::error::CoreError;
use crate::storage::{Reader, WriteTx, record};
use crate::PluginConfigId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginConfiguration {
    pub id: PluginConfigId,
    /// Plugin identifier, e.g. `civic.notifications.sendgrid`.
    pub identifier: String,
    pub active: bool,
    pub values: BTreeMap<String, String>,
}

record!(PluginConfiguration, id, "plugin configuration", "plugin_configurations");

impl PluginConfiguration {
    /// Configuration of a plugin that was never configured for a tenant.
    #[must_use]
    pub fn unsaved(identifier: impl Into<String>) -> Self {
        Self {
            id: PluginConfigId(0),
            identifier: identifier.into(),
            active: false,
            values: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn value(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }
}

pub fn find_configuration(reader: &impl Reader, identifier: &str) -> Result<Option<PluginConfiguration>, CoreError> {
    Ok(reader.find::<PluginConfiguration>(|c| c.identifier == identifier)?)
}

/// Insert or replace the configuration of `identifier`.
pub fn save_configuration(
    tx: &mut WriteTx,
    identifier: &str,
    active: bool,
    values: BTreeMap<String, String>,
) -> Result<PluginConfiguration, CoreError> {
    match tx.find::<PluginConfiguration>(|c| c.identifier == identifier)? {
        Some(mut existing) => {
            existing.active = active;
            existing.values = values;
            tx.put(&existing)?;
            Ok(existing)
        }
        None => Ok(tx.insert(PluginConfiguration {
            id: PluginConfigId(0),
            identifier: identifier.to_string(),
            active,
            values,
        })?),
    }
}
