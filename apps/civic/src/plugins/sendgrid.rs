//! Email notifications through the SendGrid v3 API.

use super::{
    Capability, ConfigField, Delivery, Notification, Plugin, PluginError, PluginMeta, check_status, http_client,
    required_value,
};
use async_trait::async_trait;
use civic_core::PluginConfiguration;
use civic_core::validation::validate_email;
use serde_json::json;
use std::collections::BTreeMap;

pub const SENDGRID_API_BASE: &str = "https://api.sendgrid.com";

pub struct SendgridPlugin {
    client: reqwest::Client,
}

impl SendgridPlugin {
    pub const IDENTIFIER: &'static str = "civic.notifications.sendgrid";

    #[must_use]
    pub fn new() -> Self {
        Self { client: http_client() }
    }
}

impl Default for SendgridPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Plugin for SendgridPlugin {
    fn meta(&self) -> PluginMeta {
        PluginMeta {
            identifier: Self::IDENTIFIER,
            name: "SendGrid",
            description: "Emails document notifications to the entry's address.",
            capabilities: &[Capability::Notifications],
        }
    }

    fn config_fields(&self) -> Vec<ConfigField> {
        vec![
            ConfigField::required("api_key", "API key").secret(),
            ConfigField::required("from_email", "Sender address"),
            ConfigField::optional("from_name", "Sender name"),
            ConfigField::optional("copy_to", "Always copy to"),
            ConfigField::optional("api_base", "API base URL").with_default(SENDGRID_API_BASE),
        ]
    }

    fn validate_configuration(&self, values: &BTreeMap<String, String>) -> Result<(), PluginError> {
        for key in ["from_email", "copy_to"] {
            if let Some(address) = values.get(key).filter(|v| !v.is_empty())
                && validate_email(address).is_none()
            {
                return Err(PluginError::Configuration(format!("'{address}' is not a valid email address")));
            }
        }
        Ok(())
    }

    async fn notify(&self, config: &PluginConfiguration, notification: &Notification) -> Result<Delivery, PluginError> {
        let mut recipients: Vec<&str> = notification.recipient.iter().map(String::as_str).collect();
        if let Some(copy) = config.value("copy_to")
            && !recipients.contains(&copy)
        {
            recipients.push(copy);
        }
        if recipients.is_empty() {
            return Ok(Delivery::Skipped("entry has no email address".to_string()));
        }

        let api_key = required_value(config, "api_key")?;
        let from_email = required_value(config, "from_email")?;
        let base = config.value("api_base").unwrap_or(SENDGRID_API_BASE);

        let mut from = json!({ "email": from_email });
        if let Some(name) = config.value("from_name") {
            from["name"] = json!(name);
        }
        let to: Vec<_> = recipients.iter().map(|email| json!({ "email": email })).collect();
        let payload = json!({
            "personalizations": [{ "to": to }],
            "from": from,
            "subject": notification.subject(),
            "content": [{ "type": "text/plain", "value": notification.body() }],
        });

        let url = format!("{}/v3/mail/send", base.trim_end_matches('/'));
        let response = self.client.post(&url).bearer_auth(api_key).json(&payload).send().await?;
        check_status(response).await?;
        tracing::debug!(recipients = recipients.len(), event = ?notification.event, "sendgrid mail accepted");
        Ok(Delivery::Sent)
    }
}
