//! Errors of the binary: HTTP-level API errors and CLI command errors.
//!
//! GraphQL validation problems never become an [`ApiError`]; they travel in
//! the `errors` field of mutation payloads.

use crate::plugins::PluginError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use civic_core::CoreError;
use serde_json::json;
use thiserror::Error;

/// Errors answered before a request reaches GraphQL.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("no tenant is served at this address")]
    TenantNotFound,

    #[error("invalid API key")]
    Unauthorized,

    #[error("too many requests")]
    RateLimited,

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::TenantNotFound => StatusCode::NOT_FOUND,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::TenantNotFound => "TENANT_NOT_FOUND",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::RateLimited => "RATE_LIMITED",
            Self::Internal(_) => "INTERNAL",
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Internal(detail) = &self {
            tracing::error!(error = %detail, "request failed");
        }
        let body = json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        });
        (self.status(), Json(body)).into_response()
    }
}

/// Errors of CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Usage(String),
}
