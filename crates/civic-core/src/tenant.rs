//! # Tenants
//!
//! A tenant is one municipality or client. Each tenant lives in its own
//! database file; requests are routed to it by id or by host name.

use crate::error::{CoreError, ErrorCode, FieldError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of the shared registry database. Never a valid tenant id.
pub const PUBLIC_SCHEMA: &str = "public";

const MAX_TENANT_ID_LENGTH: usize = 63;

/// Validated tenant identifier.
///
/// Lowercase ASCII, starts with a letter, then letters, digits, `-` or `_`,
/// 2 to 63 characters. Also used as the database file stem, so it must be
/// filesystem safe.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TenantId(String);

impl TenantId {
    pub fn new(raw: impl AsRef<str>) -> Result<Self, CoreError> {
        let raw = raw.as_ref().trim();
        let valid_chars = raw
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');
        let starts_with_letter = raw.chars().next().is_some_and(|c| c.is_ascii_lowercase());

        if raw.len() < 2 || raw.len() > MAX_TENANT_ID_LENGTH || !valid_chars || !starts_with_letter {
            return Err(CoreError::invalid(
                "id",
                ErrorCode::Invalid,
                format!("'{raw}' is not a valid tenant id."),
            ));
        }
        if raw == PUBLIC_SCHEMA {
            return Err(CoreError::invalid(
                "id",
                ErrorCode::Invalid,
                "'public' is reserved.",
            ));
        }
        Ok(Self(raw.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TenantId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A registered tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
    /// Normalized host names routed to this tenant.
    pub domains: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Tenant {
    /// Build a tenant, normalizing and validating its domains.
    pub fn new(
        id: TenantId,
        name: impl Into<String>,
        domains: impl IntoIterator<Item = impl AsRef<str>>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, CoreError> {
        let name = name.into().trim().to_string();
        let mut errors = Vec::new();
        if name.is_empty() {
            errors.push(FieldError::required("name"));
        }

        let mut normalized = Vec::new();
        for domain in domains {
            match normalize_host(domain.as_ref()) {
                Some(host) if !normalized.contains(&host) => normalized.push(host),
                Some(_) => {}
                None => errors.push(FieldError::new(
                    "domains",
                    ErrorCode::Invalid,
                    format!("'{}' is not a valid domain.", domain.as_ref()),
                )),
            }
        }

        if !errors.is_empty() {
            return Err(CoreError::Validation(errors));
        }

        Ok(Self {
            id,
            name,
            domains: normalized,
            created_at,
        })
    }
}

/// Normalize a `Host` header or configured domain.
///
/// Lowercases, strips the port and a trailing dot. Returns `None` when the
/// result is not a plausible host name.
#[must_use]
pub fn normalize_host(raw: &str) -> Option<String> {
    let host = raw.trim().to_ascii_lowercase();
    let host = match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name.to_string(),
        _ => host,
    };
    let host = host.trim_end_matches('.').to_string();

    let valid = !host.is_empty()
        && host.len() <= 253
        && host.split('.').all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        });

    valid.then_some(host)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]

    use super::*;

    #[test]
    fn tenant_id_validation() {
        assert!(TenantId::new("acme").is_ok());
        assert!(TenantId::new("sao-paulo_2").is_ok());
        assert!(TenantId::new("a").is_err());
        assert!(TenantId::new("9lives").is_err());
        assert!(TenantId::new("Acme").is_err());
        assert!(TenantId::new("../etc").is_err());
        assert!(TenantId::new("public").is_err());
    }

    #[test]
    fn host_normalization() {
        assert_eq!(normalize_host("Portal.Acme.gov:8080").as_deref(), Some("portal.acme.gov"));
        assert_eq!(normalize_host("acme.gov.").as_deref(), Some("acme.gov"));
        assert_eq!(normalize_host("localhost").as_deref(), Some("localhost"));
        assert!(normalize_host("").is_none());
        assert!(normalize_host("bad..host").is_none());
        assert!(normalize_host("-bad.host").is_none());
        assert!(normalize_host("spa ce.com").is_none());
    }

    #[test]
    fn tenant_new_dedups_domains() {
        let tenant = Tenant::new(
            TenantId::new("acme").unwrap(),
            "Acme",
            ["acme.gov", "ACME.gov:443", "www.acme.gov"],
            Utc::now(),
        )
        .unwrap();
        assert_eq!(tenant.domains, vec!["acme.gov", "www.acme.gov"]);
    }

    #[test]
    fn tenant_new_rejects_blank_name_and_bad_domain() {
        let err = Tenant::new(TenantId::new("acme").unwrap(), " ", ["bad host"], Utc::now())
            .unwrap_err();
        match err {
            CoreError::Validation(errors) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected error: {other}"),
        }
    }
}
