//! # Plugins
//!
//! Pluggable integrations selected per tenant through stored configuration.
//!
//! Two capabilities exist today:
//! - **Notifications**: deliver workflow notifications (email, webhooks)
//! - **Document loading**: fetch certificates from government services for
//!   documents whose load type the plugin declares
//!
//! ```text
//! ┌──────────────────┐   notify()        ┌──────────────────────┐
//! │  PluginsManager  │ ────────────────► │  SendgridPlugin      │ ──► SendGrid API
//! │                  │                   │  WebhookPlugin       │ ──► tenant webhook
//! │  (per tenant     │   load_document() │                      │
//! │   configuration) │ ────────────────► │  CertificatePlugin   │ ──► certificate API
//! └──────────────────┘                   └──────────────────────┘
//! ```
//!
//! Plugins never touch the tenant database; the manager reads their
//! configuration and [`crate::services`] records what they did.

mod certificates;
mod manager;
mod sendgrid;
mod webhook;

pub use certificates::CertificatePlugin;
pub use manager::{DeliveryReport, LoadAttempt, PluginsManager};
pub use sendgrid::SendgridPlugin;
pub use webhook::WebhookPlugin;

use async_trait::async_trait;
use chrono::NaiveDate;
use civic_core::{CoreError, DocumentId, EntryId, EntryKind, EventKind, PluginConfiguration};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// Timeout applied to every outgoing plugin request.
pub const PLUGIN_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Value shown instead of a stored secret.
pub const SECRET_MASK: &str = "********";

// =============================================================================
// ERROR TYPE
// =============================================================================

#[derive(Debug, Error)]
pub enum PluginError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The remote service answered with an error.
    #[error("Server error: {0}")]
    Server(String),

    /// Stored or submitted configuration is not usable.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("unknown plugin '{0}'")]
    UnknownPlugin(String),

    #[error("plugin '{0}' does not support this operation")]
    Unsupported(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}

// =============================================================================
// DESCRIPTORS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Capability {
    Notifications,
    DocumentLoading,
}

/// Static description of a plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginMeta {
    /// Stable identifier, e.g. `civic.notifications.sendgrid`.
    pub identifier: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub capabilities: &'static [Capability],
}

impl PluginMeta {
    #[must_use]
    pub fn has(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

/// A configuration key accepted by a plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigField {
    pub key: &'static str,
    pub label: &'static str,
    pub required: bool,
    /// Never returned to API callers in clear.
    pub secret: bool,
    pub default: Option<&'static str>,
}

impl ConfigField {
    #[must_use]
    pub const fn required(key: &'static str, label: &'static str) -> Self {
        Self {
            key,
            label,
            required: true,
            secret: false,
            default: None,
        }
    }

    #[must_use]
    pub const fn optional(key: &'static str, label: &'static str) -> Self {
        Self {
            key,
            label,
            required: false,
            secret: false,
            default: None,
        }
    }

    #[must_use]
    pub const fn secret(mut self) -> Self {
        self.secret = true;
        self
    }

    #[must_use]
    pub const fn with_default(mut self, default: &'static str) -> Self {
        self.default = Some(default);
        self
    }
}

// =============================================================================
// PAYLOADS
// =============================================================================

/// Something worth telling the people responsible for an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub event: EventKind,
    pub tenant: String,
    pub tenant_name: String,
    pub entry: Option<EntryId>,
    pub entry_name: Option<String>,
    /// Address of the entry, when it has one.
    pub recipient: Option<String>,
    pub document: Option<DocumentId>,
    pub document_name: Option<String>,
    pub message: Option<String>,
}

impl Notification {
    #[must_use]
    pub fn subject(&self) -> String {
        let document = self.document_name.as_deref().unwrap_or("document");
        let what = match self.event {
            EventKind::FileApproved => format!("{document} approved"),
            EventKind::FileRefused => format!("{document} refused"),
            EventKind::DocumentExpiring => format!("{document} is about to expire"),
            EventKind::DocumentExpired => format!("{document} has expired"),
            EventKind::DocumentLoaded => format!("{document} updated automatically"),
            EventKind::DocumentLoadFailed => format!("{document} could not be updated"),
            other => format!("{other:?}"),
        };
        format!("[{}] {what}", self.tenant_name)
    }

    #[must_use]
    pub fn body(&self) -> String {
        let mut body = self.subject();
        if let Some(entry) = &self.entry_name {
            body.push_str(&format!("\n\nEntry: {entry}"));
        }
        if let Some(message) = &self.message {
            body.push_str(&format!("\n{message}"));
        }
        body
    }
}

/// Result of a delivery attempt that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    Skipped(String),
}

/// What a loader needs to fetch a certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadRequest {
    pub tenant: String,
    pub document: DocumentId,
    pub load_type: String,
    pub entry_kind: EntryKind,
    pub document_number: String,
}

/// A certificate fetched by a loader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadedDocument {
    pub file_url: String,
    #[serde(default)]
    pub begin_date: Option<NaiveDate>,
    #[serde(default)]
    pub expiration_date: Option<NaiveDate>,
}

// =============================================================================
// PLUGIN TRAIT
// =============================================================================

/// A pluggable integration.
///
/// Only `meta` is mandatory; the defaults describe a plugin with no
/// configuration that supports nothing.
#[async_trait]
pub trait Plugin: Send + Sync {
    fn meta(&self) -> PluginMeta;

    fn config_fields(&self) -> Vec<ConfigField> {
        Vec::new()
    }

    /// Extra checks beyond required/unknown keys, run before saving.
    fn validate_configuration(&self, _values: &BTreeMap<String, String>) -> Result<(), PluginError> {
        Ok(())
    }

    async fn notify(
        &self,
        _config: &PluginConfiguration,
        _notification: &Notification,
    ) -> Result<Delivery, PluginError> {
        Err(PluginError::Unsupported(self.meta().identifier.to_string()))
    }

    /// Document load types this plugin can fetch.
    fn load_types(&self) -> Vec<&'static str> {
        Vec::new()
    }

    async fn load_document(
        &self,
        _config: &PluginConfiguration,
        _request: &LoadRequest,
    ) -> Result<LoadedDocument, PluginError> {
        Err(PluginError::Unsupported(self.meta().identifier.to_string()))
    }
}

/// Shared HTTP client with the plugin timeout.
pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(PLUGIN_HTTP_TIMEOUT)
        .build()
        .unwrap_or_default()
}

/// Required configuration value, or a configuration error naming it.
pub(crate) fn required_value<'a>(config: &'a PluginConfiguration, key: &str) -> Result<&'a str, PluginError> {
    config
        .value(key)
        .ok_or_else(|| PluginError::Configuration(format!("'{key}' is not configured")))
}

/// Turn a non-success response into [`PluginError::Server`].
pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, PluginError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let detail: String = body.chars().take(200).collect();
    Err(PluginError::Server(format!("{status}: {detail}")))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]

    use super::*;

    fn notification(event: EventKind) -> Notification {
        Notification {
            event,
            tenant: "acme".into(),
            tenant_name: "Acme City".into(),
            entry: Some(EntryId(1)),
            entry_name: Some("Bus 12".into()),
            recipient: None,
            document: Some(DocumentId(3)),
            document_name: Some("Insurance".into()),
            message: Some("2026-11-01".into()),
        }
    }

    #[test]
    fn subject_names_tenant_and_document() {
        assert_eq!(
            notification(EventKind::DocumentExpiring).subject(),
            "[Acme City] Insurance is about to expire"
        );
        let body = notification(EventKind::FileRefused).body();
        assert!(body.starts_with("[Acme City] Insurance refused"));
        assert!(body.contains("Entry: Bus 12"));
        assert!(body.ends_with("2026-11-01"));
    }

    #[test]
    fn config_field_builders() {
        let field = ConfigField::required("api_key", "API key").secret();
        assert!(field.required && field.secret);
        let field = ConfigField::optional("api_base", "API base").with_default("https://x");
        assert_eq!(field.default, Some("https://x"));
    }
}
