//! Request middleware: rate limiting, tenant resolution and authentication.

use super::AppState;
use crate::config::ApiKey;
use crate::error::ApiError;
use crate::graphql::Caller;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, Method, Request, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use civic_core::{Tenant, TenantDb, TenantId, TenantPool};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tower_http::cors::{Any, CorsLayer};
use tracing::Instrument;

/// Header naming the tenant explicitly; takes precedence over `Host`.
pub const TENANT_HEADER: &str = "x-tenant";

/// Label of the caller when no API keys are configured.
const OPEN_ACCESS_LABEL: &str = "open-access";

/// The tenant a request was routed to.
#[derive(Clone)]
pub struct ResolvedTenant {
    pub tenant: Tenant,
    pub db: Arc<TenantDb>,
}

pub fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, HeaderName::from_static(TENANT_HEADER)])
}

pub async fn rate_limit(State(state): State<AppState>, request: Request<Body>, next: Next) -> Response {
    if let Some(limiter) = &state.limiter
        && limiter.check().is_err()
    {
        tracing::warn!(path = %request.uri().path(), "rate limit exceeded");
        return ApiError::RateLimited.into_response();
    }
    next.run(request).await
}

pub async fn resolve_tenant(State(state): State<AppState>, mut request: Request<Body>, next: Next) -> Response {
    let resolved = match lookup_tenant(&state.pool, request.headers()) {
        Ok(resolved) => resolved,
        Err(err) => return err.into_response(),
    };
    let span = tracing::info_span!("tenant", tenant = %resolved.tenant.id);
    request.extensions_mut().insert(resolved);
    next.run(request).instrument(span).await
}

fn lookup_tenant(pool: &TenantPool, headers: &HeaderMap) -> Result<ResolvedTenant, ApiError> {
    let id = match header_str(headers, TENANT_HEADER) {
        Some(raw) => TenantId::new(raw).map_err(|_| ApiError::TenantNotFound)?,
        None => {
            let host = header_str(headers, header::HOST.as_str()).ok_or(ApiError::TenantNotFound)?;
            pool.resolve_host(host)?.ok_or(ApiError::TenantNotFound)?
        }
    };
    let tenant = pool.tenant(&id)?.ok_or(ApiError::TenantNotFound)?;
    let db = pool.database(&id)?;
    Ok(ResolvedTenant { tenant, db })
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Attach a [`Caller`]: staff for a valid bearer key, anonymous without one.
/// A key that matches nothing is rejected.
pub async fn authenticate(State(state): State<AppState>, mut request: Request<Body>, next: Next) -> Response {
    let caller = if state.api_keys.is_empty() {
        Caller::Staff(OPEN_ACCESS_LABEL.to_string())
    } else {
        match bearer_token(request.headers()) {
            None => Caller::Anonymous,
            Some(token) => match match_key(&state.api_keys, token) {
                Some(key) => Caller::Staff(key.label.clone()),
                None => {
                    tracing::warn!("rejected request with an unknown API key");
                    return ApiError::Unauthorized.into_response();
                }
            },
        }
    };
    request.extensions_mut().insert(caller);
    next.run(request).await
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    header_str(headers, header::AUTHORIZATION.as_str())?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

/// Compare against every key in constant time.
fn match_key<'a>(keys: &'a [ApiKey], token: &str) -> Option<&'a ApiKey> {
    let mut found = None;
    for key in keys {
        if bool::from(key.key.as_bytes().ct_eq(token.as_bytes())) {
            found = Some(key);
        }
    }
    found
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]

    use super::*;
    use axum::http::HeaderValue;

    fn keys() -> Vec<ApiKey> {
        vec![
            ApiKey {
                label: "ana".into(),
                key: "k-ana".into(),
            },
            ApiKey {
                label: "bruno".into(),
                key: "k-bruno".into(),
            },
        ]
    }

    #[test]
    fn bearer_token_requires_scheme() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer  k-ana "));
        assert_eq!(bearer_token(&headers), Some("k-ana"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn keys_match_exactly() {
        let keys = keys();
        assert_eq!(match_key(&keys, "k-bruno").map(|k| k.label.as_str()), Some("bruno"));
        assert!(match_key(&keys, "k-br").is_none());
        assert!(match_key(&keys, "").is_none());
    }
}
