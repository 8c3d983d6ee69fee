//! Ordered plugin registry with per-tenant configuration.

use super::{
    Capability, CertificatePlugin, Delivery, LoadRequest, LoadedDocument, Notification, Plugin, PluginError,
    SECRET_MASK, SendgridPlugin, WebhookPlugin,
};
use civic_core::plugin_config::{find_configuration, save_configuration};
use civic_core::{PluginConfiguration, TenantDb};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Outcome of one plugin's delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub identifier: &'static str,
    pub outcome: Result<Delivery, String>,
}

/// Outcome of asking a loader for a document.
#[derive(Debug)]
pub struct LoadAttempt {
    pub identifier: &'static str,
    pub result: Result<LoadedDocument, PluginError>,
}

/// Every plugin known to the server, in dispatch order.
pub struct PluginsManager {
    plugins: Vec<Arc<dyn Plugin>>,
}

impl std::fmt::Debug for PluginsManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.plugins.iter().map(|p| p.meta().identifier))
            .finish()
    }
}

impl PluginsManager {
    #[must_use]
    pub fn new(plugins: Vec<Arc<dyn Plugin>>) -> Self {
        Self { plugins }
    }

    /// The plugins shipped with Civic.
    #[must_use]
    pub fn builtin() -> Self {
        Self::new(vec![
            Arc::new(SendgridPlugin::new()) as Arc<dyn Plugin>,
            Arc::new(WebhookPlugin::new()) as Arc<dyn Plugin>,
            Arc::new(CertificatePlugin::new()) as Arc<dyn Plugin>,
        ])
    }

    #[must_use]
    pub fn plugins(&self) -> &[Arc<dyn Plugin>] {
        &self.plugins
    }

    #[must_use]
    pub fn get(&self, identifier: &str) -> Option<&Arc<dyn Plugin>> {
        self.plugins.iter().find(|p| p.meta().identifier == identifier)
    }

    fn require(&self, identifier: &str) -> Result<&Arc<dyn Plugin>, PluginError> {
        self.get(identifier)
            .ok_or_else(|| PluginError::UnknownPlugin(identifier.to_string()))
    }

    /// Every load type declared by any plugin, sorted.
    #[must_use]
    pub fn load_types(&self) -> Vec<&'static str> {
        let mut types: Vec<_> = self.plugins.iter().flat_map(|p| p.load_types()).collect();
        types.sort_unstable();
        types.dedup();
        types
    }

    // =========================================================================
    // CONFIGURATION
    // =========================================================================

    /// Stored configuration of a plugin, defaults filled in. Plugins never
    /// configured for the tenant come back inactive.
    pub fn configuration(&self, db: &TenantDb, identifier: &str) -> Result<PluginConfiguration, PluginError> {
        let plugin = self.require(identifier)?;
        let mut config = db
            .read(|tx| find_configuration(tx, identifier))?
            .unwrap_or_else(|| PluginConfiguration::unsaved(identifier));
        for field in plugin.config_fields() {
            if let Some(default) = field.default
                && config.value(field.key).is_none()
            {
                config.values.insert(field.key.to_string(), default.to_string());
            }
        }
        Ok(config)
    }

    /// Configuration values safe to show: secrets are masked.
    pub fn masked_values(&self, identifier: &str, config: &PluginConfiguration) -> BTreeMap<String, String> {
        let secrets: Vec<&str> = self
            .get(identifier)
            .map(|p| p.config_fields().into_iter().filter(|f| f.secret).map(|f| f.key).collect())
            .unwrap_or_default();
        config
            .values
            .iter()
            .map(|(key, value)| {
                let shown = if secrets.contains(&key.as_str()) && !value.is_empty() {
                    SECRET_MASK.to_string()
                } else {
                    value.clone()
                };
                (key.clone(), shown)
            })
            .collect()
    }

    /// Merge `values` into the stored configuration and save it, in one
    /// write transaction.
    ///
    /// An empty value clears a key; the secret mask keeps the stored value.
    /// Unknown keys are rejected, and an active plugin must have every
    /// required key.
    pub fn save_configuration(
        &self,
        db: &TenantDb,
        identifier: &str,
        active: Option<bool>,
        values: BTreeMap<String, String>,
    ) -> Result<PluginConfiguration, PluginError> {
        let plugin = self.require(identifier)?;
        let fields = plugin.config_fields();

        let unknown: Vec<&str> = values
            .keys()
            .filter(|key| !fields.iter().any(|f| f.key == key.as_str()))
            .map(String::as_str)
            .collect();
        if !unknown.is_empty() {
            return Err(PluginError::Configuration(format!("unknown keys: {}", unknown.join(", "))));
        }

        let outcome = db.write(|tx| {
            let current = find_configuration(&*tx, identifier)?
                .unwrap_or_else(|| PluginConfiguration::unsaved(identifier));
            match merge_values(&**plugin, &current, active, values) {
                Ok((active, merged)) => Ok(Ok(save_configuration(tx, identifier, active, merged)?)),
                Err(err) => Ok(Err(err)),
            }
        })?;
        let saved = outcome?;
        tracing::info!(tenant = %db.tenant(), plugin = identifier, active = saved.active, "plugin configuration saved");
        Ok(saved)
    }

    // =========================================================================
    // DISPATCH
    // =========================================================================

    /// Active plugins with `capability` and their configuration.
    fn active_with(
        &self,
        db: &TenantDb,
        capability: Capability,
    ) -> Result<Vec<(&Arc<dyn Plugin>, PluginConfiguration)>, PluginError> {
        let mut active = Vec::new();
        for plugin in &self.plugins {
            let meta = plugin.meta();
            if !meta.has(capability) {
                continue;
            }
            let config = self.configuration(db, meta.identifier)?;
            if config.active {
                active.push((plugin, config));
            }
        }
        Ok(active)
    }

    /// Hand a notification to every active notification plugin. A failing
    /// plugin does not stop the others.
    pub async fn notify(&self, db: &TenantDb, notification: &Notification) -> Result<Vec<DeliveryReport>, PluginError> {
        let mut reports = Vec::new();
        for (plugin, config) in self.active_with(db, Capability::Notifications)? {
            let identifier = plugin.meta().identifier;
            let outcome = plugin.notify(&config, notification).await.map_err(|err| {
                tracing::warn!(plugin = identifier, tenant = %db.tenant(), error = %err, "notification failed");
                err.to_string()
            });
            reports.push(DeliveryReport { identifier, outcome });
        }
        Ok(reports)
    }

    /// Ask the first active plugin declaring the request's load type.
    /// `None` when no active plugin handles it.
    pub async fn load_document(&self, db: &TenantDb, request: &LoadRequest) -> Result<Option<LoadAttempt>, PluginError> {
        for (plugin, config) in self.active_with(db, Capability::DocumentLoading)? {
            if !plugin.load_types().contains(&request.load_type.as_str()) {
                continue;
            }
            let identifier = plugin.meta().identifier;
            let result = plugin.load_document(&config, request).await;
            if let Err(err) = &result {
                tracing::warn!(plugin = identifier, document = %request.document, error = %err, "document load failed");
            }
            return Ok(Some(LoadAttempt { identifier, result }));
        }
        Ok(None)
    }
}

/// Apply `values` over `current` and check the result against the plugin's
/// fields. An empty value clears a key; the secret mask keeps the stored value.
fn merge_values(
    plugin: &dyn Plugin,
    current: &PluginConfiguration,
    active: Option<bool>,
    values: BTreeMap<String, String>,
) -> Result<(bool, BTreeMap<String, String>), PluginError> {
    let mut merged = current.values.clone();
    for (key, value) in values {
        let value = value.trim().to_string();
        if value == SECRET_MASK {
            continue;
        }
        if value.is_empty() {
            merged.remove(&key);
        } else {
            merged.insert(key, value);
        }
    }

    let active = active.unwrap_or(current.active);
    if active {
        let missing: Vec<&str> = plugin
            .config_fields()
            .iter()
            .filter(|f| f.required && f.default.is_none() && merged.get(f.key).is_none_or(String::is_empty))
            .map(|f| f.key)
            .collect();
        if !missing.is_empty() {
            return Err(PluginError::Configuration(format!("missing required keys: {}", missing.join(", "))));
        }
    }
    plugin.validate_configuration(&merged)?;
    Ok((active, merged))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]

    use super::*;
    use crate::plugins::{ConfigField, PluginMeta};
    use async_trait::async_trait;
    use civic_core::{DocumentId, EntryKind, EventKind, TenantId};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        identifier: &'static str,
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Plugin for Counting {
        fn meta(&self) -> PluginMeta {
            PluginMeta {
                identifier: self.identifier,
                name: "Counting",
                description: "",
                capabilities: &[Capability::Notifications, Capability::DocumentLoading],
            }
        }

        fn config_fields(&self) -> Vec<ConfigField> {
            vec![
                ConfigField::required("secret", "Secret").secret(),
                ConfigField::optional("mode", "Mode").with_default("fast"),
            ]
        }

        async fn notify(&self, _: &PluginConfiguration, _: &Notification) -> Result<Delivery, PluginError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(PluginError::Server("boom".into()))
            } else {
                Ok(Delivery::Sent)
            }
        }

        fn load_types(&self) -> Vec<&'static str> {
            vec!["cndt"]
        }

        async fn load_document(&self, _: &PluginConfiguration, _: &LoadRequest) -> Result<LoadedDocument, PluginError> {
            Ok(LoadedDocument {
                file_url: format!("https://files.example/{}.pdf", self.identifier),
                begin_date: None,
                expiration_date: None,
            })
        }
    }

    fn counting(identifier: &'static str, fail: bool) -> Arc<Counting> {
        Arc::new(Counting {
            identifier,
            calls: AtomicUsize::new(0),
            fail,
        })
    }

    fn tenant_db(dir: &tempfile::TempDir) -> TenantDb {
        TenantDb::open(TenantId::new("acme").unwrap(), dir.path().join("acme.redb")).unwrap()
    }

    fn secret(value: &str) -> BTreeMap<String, String> {
        BTreeMap::from([("secret".to_string(), value.to_string())])
    }

    fn notification() -> Notification {
        Notification {
            event: EventKind::FileApproved,
            tenant: "acme".into(),
            tenant_name: "Acme".into(),
            entry: None,
            entry_name: None,
            recipient: None,
            document: None,
            document_name: None,
            message: None,
        }
    }

    #[test]
    fn save_rejects_unknown_and_missing_keys() {
        let dir = tempfile::tempdir().unwrap();
        let db = tenant_db(&dir);
        let manager = PluginsManager::new(vec![counting("a", false) as Arc<dyn Plugin>]);

        let unknown = BTreeMap::from([("nope".to_string(), "x".to_string())]);
        assert!(matches!(
            manager.save_configuration(&db, "a", Some(false), unknown),
            Err(PluginError::Configuration(_))
        ));
        assert!(matches!(
            manager.save_configuration(&db, "a", Some(true), BTreeMap::new()),
            Err(PluginError::Configuration(_))
        ));
        assert!(matches!(
            manager.save_configuration(&db, "missing", Some(true), BTreeMap::new()),
            Err(PluginError::UnknownPlugin(_))
        ));
    }

    #[test]
    fn secrets_are_masked_and_mask_keeps_value() {
        let dir = tempfile::tempdir().unwrap();
        let db = tenant_db(&dir);
        let manager = PluginsManager::new(vec![counting("a", false) as Arc<dyn Plugin>]);

        manager.save_configuration(&db, "a", Some(true), secret("s3cr3t")).unwrap();
        let saved = manager.save_configuration(&db, "a", None, secret(SECRET_MASK)).unwrap();
        assert!(saved.active);
        assert_eq!(saved.value("secret"), Some("s3cr3t"));

        let config = manager.configuration(&db, "a").unwrap();
        assert_eq!(config.value("mode"), Some("fast"));
        let masked = manager.masked_values("a", &config);
        assert_eq!(masked["secret"], SECRET_MASK);
        assert_eq!(masked["mode"], "fast");
    }

    #[test]
    fn concurrent_saves_keep_both_keys() {
        let dir = tempfile::tempdir().unwrap();
        let db = tenant_db(&dir);
        let manager = PluginsManager::new(vec![counting("a", false) as Arc<dyn Plugin>]);

        std::thread::scope(|scope| {
            for key in ["secret", "mode"] {
                let (db, manager) = (&db, &manager);
                scope.spawn(move || {
                    for round in 0..50 {
                        let values = BTreeMap::from([(key.to_string(), format!("{key}-{round}"))]);
                        manager.save_configuration(db, "a", None, values).unwrap();
                    }
                });
            }
        });

        let config = manager.configuration(&db, "a").unwrap();
        assert_eq!(config.value("secret"), Some("secret-49"));
        assert_eq!(config.value("mode"), Some("mode-49"));
    }

    #[tokio::test]
    async fn notify_reaches_every_active_plugin() {
        let dir = tempfile::tempdir().unwrap();
        let db = tenant_db(&dir);
        let failing = counting("failing", true);
        let working = counting("working", false);
        let inactive = counting("inactive", false);
        let manager = PluginsManager::new(vec![
            failing.clone() as Arc<dyn Plugin>,
            working.clone() as Arc<dyn Plugin>,
            inactive.clone() as Arc<dyn Plugin>,
        ]);
        manager.save_configuration(&db, "failing", Some(true), secret("x")).unwrap();
        manager.save_configuration(&db, "working", Some(true), secret("x")).unwrap();

        let reports = manager.notify(&db, &notification()).await.unwrap();
        assert_eq!(reports.len(), 2);
        assert!(reports[0].outcome.is_err());
        assert_eq!(reports[1].outcome, Ok(Delivery::Sent));
        assert_eq!(inactive.calls.load(Ordering::SeqCst), 0);
        assert_eq!(working.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn load_uses_first_active_loader() {
        let dir = tempfile::tempdir().unwrap();
        let db = tenant_db(&dir);
        let manager = PluginsManager::new(vec![
            counting("first", false) as Arc<dyn Plugin>,
            counting("second", false) as Arc<dyn Plugin>,
        ]);
        let mut request = LoadRequest {
            tenant: "acme".into(),
            document: DocumentId(1),
            load_type: "cndt".into(),
            entry_kind: EntryKind::Provider,
            document_number: "11222333000181".into(),
        };
        assert!(manager.load_document(&db, &request).await.unwrap().is_none());

        manager.save_configuration(&db, "second", Some(true), secret("x")).unwrap();
        let attempt = manager.load_document(&db, &request).await.unwrap().unwrap();
        assert_eq!(attempt.identifier, "second");
        assert!(attempt.result.unwrap().file_url.ends_with("second.pdf"));

        request.load_type = "other".into();
        assert!(manager.load_document(&db, &request).await.unwrap().is_none());
        assert_eq!(manager.load_types(), vec!["cndt"]);
    }
}
