//! Certificate loader backed by a government lookup service.
//!
//! The service exposes one resource per certificate kind:
//!
//! ```text
//! GET <base_url>/<load_type>?document=<number>
//!     -> 200 {"file_url": "...", "begin_date": "2026-01-01", "expiration_date": "2026-07-01"}
//!     -> 404 when no certificate exists for the number
//! ```

use super::{
    Capability, ConfigField, LoadRequest, LoadedDocument, Plugin, PluginError, PluginMeta, check_status,
    http_client, required_value,
};
use async_trait::async_trait;
use civic_core::{EntryKind, PluginConfiguration};
use civic_core::validation::validate_url;
use std::collections::BTreeMap;

/// Labour debt clearance certificate.
pub const LOAD_TYPE_CNDT: &str = "cndt";
/// Federal tax clearance certificate.
pub const LOAD_TYPE_CND_FEDERAL: &str = "cnd_federal";
/// Employee severance fund (FGTS) regularity certificate.
pub const LOAD_TYPE_CRF_FGTS: &str = "crf_fgts";

pub struct CertificatePlugin {
    client: reqwest::Client,
}

impl CertificatePlugin {
    pub const IDENTIFIER: &'static str = "civic.verification.certificates";

    #[must_use]
    pub fn new() -> Self {
        Self { client: http_client() }
    }
}

impl Default for CertificatePlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Plugin for CertificatePlugin {
    fn meta(&self) -> PluginMeta {
        PluginMeta {
            identifier: Self::IDENTIFIER,
            name: "Certificate lookup",
            description: "Fetches clearance certificates of providers.",
            capabilities: &[Capability::DocumentLoading],
        }
    }

    fn config_fields(&self) -> Vec<ConfigField> {
        vec![
            ConfigField::required("base_url", "Service URL"),
            ConfigField::optional("token", "Access token").secret(),
        ]
    }

    fn validate_configuration(&self, values: &BTreeMap<String, String>) -> Result<(), PluginError> {
        match values.get("base_url") {
            Some(url) if validate_url(url).is_none() => {
                Err(PluginError::Configuration(format!("'{url}' is not a valid URL")))
            }
            _ => Ok(()),
        }
    }

    fn load_types(&self) -> Vec<&'static str> {
        vec![LOAD_TYPE_CNDT, LOAD_TYPE_CND_FEDERAL, LOAD_TYPE_CRF_FGTS]
    }

    async fn load_document(
        &self,
        config: &PluginConfiguration,
        request: &LoadRequest,
    ) -> Result<LoadedDocument, PluginError> {
        if request.entry_kind != EntryKind::Provider {
            return Err(PluginError::Server(
                "certificates are only issued for providers".to_string(),
            ));
        }
        let base = required_value(config, "base_url")?;
        let url = format!("{}/{}", base.trim_end_matches('/'), request.load_type);

        let mut call = self
            .client
            .get(&url)
            .query(&[("document", request.document_number.as_str())]);
        if let Some(token) = config.value("token") {
            call = call.bearer_auth(token);
        }
        let response = check_status(call.send().await?).await?;
        let loaded: LoadedDocument = serde_json::from_slice(&response.bytes().await?)?;
        if validate_url(&loaded.file_url).is_none() {
            return Err(PluginError::Server(format!("service returned an invalid file URL '{}'", loaded.file_url)));
        }
        tracing::debug!(load_type = %request.load_type, document = %request.document, "certificate fetched");
        Ok(loaded)
    }
}
