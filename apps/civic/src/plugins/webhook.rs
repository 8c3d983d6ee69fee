//! Notifications posted as JSON to a tenant-provided URL.

use super::{Capability, ConfigField, Delivery, Notification, Plugin, PluginError, PluginMeta, check_status, http_client, required_value};
use async_trait::async_trait;
use civic_core::PluginConfiguration;
use civic_core::validation::validate_url;
use std::collections::BTreeMap;

/// Header carrying the shared token, when one is configured.
pub const WEBHOOK_TOKEN_HEADER: &str = "x-civic-token";

pub struct WebhookPlugin {
    client: reqwest::Client,
}

impl WebhookPlugin {
    pub const IDENTIFIER: &'static str = "civic.notifications.webhook";

    #[must_use]
    pub fn new() -> Self {
        Self { client: http_client() }
    }
}

impl Default for WebhookPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Plugin for WebhookPlugin {
    fn meta(&self) -> PluginMeta {
        PluginMeta {
            identifier: Self::IDENTIFIER,
            name: "Webhook",
            description: "Posts every notification as JSON to a URL.",
            capabilities: &[Capability::Notifications],
        }
    }

    fn config_fields(&self) -> Vec<ConfigField> {
        vec![
            ConfigField::required("url", "Target URL"),
            ConfigField::optional("token", "Shared token").secret(),
        ]
    }

    fn validate_configuration(&self, values: &BTreeMap<String, String>) -> Result<(), PluginError> {
        match values.get("url") {
            Some(url) if validate_url(url).is_none() => {
                Err(PluginError::Configuration(format!("'{url}' is not a valid URL")))
            }
            _ => Ok(()),
        }
    }

    async fn notify(&self, config: &PluginConfiguration, notification: &Notification) -> Result<Delivery, PluginError> {
        let url = required_value(config, "url")?;
        let mut request = self.client.post(url).json(notification);
        if let Some(token) = config.value("token") {
            request = request.header(WEBHOOK_TOKEN_HEADER, token);
        }
        check_status(request.send().await?).await?;
        Ok(Delivery::Sent)
    }
}
