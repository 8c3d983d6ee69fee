//! # Errors
//!
//! Storage failures, validation failures and the field-level error payload
//! returned to API callers.

use crate::AttributeId;
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// STORAGE ERRORS
// =============================================================================

/// Failure inside the redb layer or while encoding a record.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("record codec error: {0}")]
    Codec(#[from] postcard::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// FIELD ERRORS
// =============================================================================

/// Machine-readable error code attached to every [`FieldError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    Required,
    Invalid,
    NotFound,
    Unique,
    DuplicatedInputItem,
    InvalidStatus,
    PermissionDenied,
    GraphqlError,
    PluginError,
}

impl ErrorCode {
    /// Upper snake case name used on the wire.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Required => "REQUIRED",
            Self::Invalid => "INVALID",
            Self::NotFound => "NOT_FOUND",
            Self::Unique => "UNIQUE",
            Self::DuplicatedInputItem => "DUPLICATED_INPUT_ITEM",
            Self::InvalidStatus => "INVALID_STATUS",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::GraphqlError => "GRAPHQL_ERROR",
            Self::PluginError => "PLUGIN_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validation error bound to an input field.
///
/// `field` is `None` for errors that concern the whole input. Attribute
/// assignment errors carry the offending attribute ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: Option<String>,
    pub code: ErrorCode,
    pub message: String,
    pub attributes: Vec<AttributeId>,
}

impl FieldError {
    #[must_use]
    pub fn new(field: impl Into<String>, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            field: Some(field.into()),
            code,
            message: message.into(),
            attributes: Vec::new(),
        }
    }

    /// An error that is not tied to a single field.
    #[must_use]
    pub fn general(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            field: None,
            code,
            message: message.into(),
            attributes: Vec::new(),
        }
    }

    #[must_use]
    pub fn required(field: &str) -> Self {
        Self::new(field, ErrorCode::Required, format!("This field is required: {field}."))
    }

    #[must_use]
    pub fn with_attributes(mut self, attributes: Vec<AttributeId>) -> Self {
        self.attributes = attributes;
        self
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(f, "{}: {} ({})", field, self.message, self.code),
            None => write!(f, "{} ({})", self.message, self.code),
        }
    }
}

/// Accumulates field errors while cleaning an input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    errors: Vec<FieldError>,
}

impl ValidationErrors {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: FieldError) {
        self.errors.push(error);
    }

    pub fn extend(&mut self, errors: impl IntoIterator<Item = FieldError>) {
        self.errors.extend(errors);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<FieldError> {
        self.errors
    }

    /// `Ok(value)` when nothing was recorded, otherwise a validation error.
    pub fn finish<T>(self, value: T) -> Result<T, CoreError> {
        if self.errors.is_empty() {
            Ok(value)
        } else {
            Err(CoreError::Validation(self.errors))
        }
    }
}

// =============================================================================
// CORE ERROR
// =============================================================================

/// Main error type of the core crate.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Input failed validation. Carries every problem found, not just the first.
    #[error("validation failed: {}", format_field_errors(.0))]
    Validation(Vec<FieldError>),

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: u64 },

    #[error("tenant error: {0}")]
    Tenant(String),

    #[error("snapshot error: {0}")]
    Snapshot(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CoreError {
    /// Single-error validation failure.
    #[must_use]
    pub fn invalid(field: &str, code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Validation(vec![FieldError::new(field, code, message)])
    }

    /// Field errors for API payloads. Non-validation errors become a single
    /// general error.
    #[must_use]
    pub fn field_errors(&self) -> Vec<FieldError> {
        match self {
            Self::Validation(errors) => errors.clone(),
            Self::NotFound { kind, id } => vec![FieldError::new(
                "id",
                ErrorCode::NotFound,
                format!("Couldn't resolve {kind} with id {id}."),
            )],
            other => vec![FieldError::general(ErrorCode::GraphqlError, other.to_string())],
        }
    }

    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::NotFound { .. })
    }
}

impl From<redb::StorageError> for CoreError {
    fn from(err: redb::StorageError) -> Self {
        Self::Store(StoreError::Storage(err))
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Store(StoreError::Io(err))
    }
}

fn format_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_finish() {
        let errors = ValidationErrors::new();
        assert_eq!(errors.finish(5).ok(), Some(5));

        let mut errors = ValidationErrors::new();
        errors.push(FieldError::required("name"));
        let result = errors.finish(());
        assert!(matches!(result, Err(CoreError::Validation(ref e)) if e.len() == 1));
    }

    #[test]
    fn not_found_maps_to_id_field() {
        let err = CoreError::NotFound { kind: "entry", id: 9 };
        let fields = err.field_errors();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].field.as_deref(), Some("id"));
        assert_eq!(fields[0].code, ErrorCode::NotFound);
    }

    #[test]
    fn validation_message_lists_every_error() {
        let err = CoreError::Validation(vec![
            FieldError::required("name"),
            FieldError::new("slug", ErrorCode::Unique, "taken"),
        ]);
        let text = err.to_string();
        assert!(text.contains("name"));
        assert!(text.contains("UNIQUE"));
    }
}
