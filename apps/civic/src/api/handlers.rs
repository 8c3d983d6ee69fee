//! Route handlers.

use super::{AppState, ResolvedTenant};
use crate::graphql::{Caller, RequestContext};
use async_graphql::http::GraphiQLSource;
use axum::extract::State;
use axum::response::Html;
use axum::{Extension, Json};
use chrono::Utc;
use serde_json::{Value, json};

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn graphiql() -> Html<String> {
    Html(GraphiQLSource::build().endpoint("/graphql").finish())
}

pub async fn graphql(
    State(state): State<AppState>,
    Extension(resolved): Extension<ResolvedTenant>,
    Extension(caller): Extension<Caller>,
    Json(request): Json<async_graphql::Request>,
) -> Json<async_graphql::Response> {
    let context = RequestContext {
        tenant: resolved.tenant,
        db: resolved.db,
        caller,
        plugins: state.plugins.clone(),
        warn_days: state.warn_days,
        today: Utc::now().date_naive(),
    };
    Json(state.schema.execute(request.data(context)).await)
}
