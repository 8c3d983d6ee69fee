//! # HTTP API
//!
//! axum server exposing the GraphQL schema of each tenant.
//!
//! ## Routes
//!
//! | Method | Path       | Description                          |
//! |--------|------------|--------------------------------------|
//! | GET    | `/health`  | Liveness probe, no tenant required   |
//! | GET    | `/graphql` | GraphiQL explorer                    |
//! | POST   | `/graphql` | GraphQL endpoint of the tenant       |
//!
//! ## Request pipeline
//!
//! ```text
//! trace ─► cors ─► rate limit ─► tenant (X-Tenant / Host) ─► auth ─► handler
//! ```
//!
//! Unknown tenants answer 404 and invalid API keys 401, both as JSON
//! `{"error": {"code", "message"}}`.

mod handlers;
pub mod middleware;

use crate::config::{ApiKey, ServerConfig};
use crate::error::CliError;
use crate::graphql::{CivicSchema, build_schema};
use crate::jobs;
use crate::plugins::PluginsManager;
use axum::Router;
use axum::middleware::from_fn_with_state;
use axum::routing::get;
use civic_core::TenantPool;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

pub use middleware::{ResolvedTenant, TENANT_HEADER};

/// Shared state of every request.
#[derive(Clone)]
pub struct AppState {
    pub pool: Arc<TenantPool>,
    pub plugins: Arc<PluginsManager>,
    pub schema: CivicSchema,
    pub api_keys: Arc<Vec<ApiKey>>,
    /// `None` when rate limiting is disabled.
    pub limiter: Option<Arc<DefaultDirectRateLimiter>>,
    pub warn_days: i64,
}

impl AppState {
    pub fn new(pool: Arc<TenantPool>, plugins: Arc<PluginsManager>, config: &ServerConfig) -> Self {
        let limiter = NonZeroU32::new(config.rate_limit).map(|rate| Arc::new(RateLimiter::direct(Quota::per_second(rate))));
        Self {
            pool,
            plugins,
            schema: build_schema(),
            api_keys: Arc::new(config.api_keys.clone()),
            limiter,
            warn_days: config.expiry_warning_days,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let graphql = Router::new()
        .route("/graphql", get(handlers::graphiql).post(handlers::graphql))
        .route_layer(from_fn_with_state(state.clone(), middleware::authenticate))
        .route_layer(from_fn_with_state(state.clone(), middleware::resolve_tenant));

    Router::new()
        .route("/health", get(handlers::health))
        .merge(graphql)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::cors())
                .layer(from_fn_with_state(state.clone(), middleware::rate_limit)),
        )
        .with_state(state)
}

/// Run the server until Ctrl-C, with the expiry sweeper alongside.
pub async fn serve(pool: Arc<TenantPool>, plugins: Arc<PluginsManager>, config: ServerConfig) -> Result<(), CliError> {
    let state = AppState::new(Arc::clone(&pool), Arc::clone(&plugins), &config);
    let sweeper = config
        .sweep_interval
        .map(|interval| jobs::spawn_sweeper(pool, plugins, interval, config.expiry_warning_days));

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    tracing::info!(
        addr = %config.bind,
        api_keys = config.api_keys.len(),
        rate_limit = config.rate_limit,
        "civic server listening"
    );
    if config.api_keys.is_empty() {
        tracing::warn!("no API keys configured: every caller is treated as staff");
    }

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = sweeper {
        handle.abort();
    }
    tracing::info!("civic server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
