//! # GraphQL
//!
//! The tenant-scoped GraphQL schema.
//!
//! Every request runs against exactly one tenant database, chosen by the HTTP
//! layer and handed to resolvers through [`RequestContext`]. Mutations follow
//! one shape:
//!
//! ```text
//! input ─► decode ids ─► civic_core mutation ─► commit ─► notify plugins
//!                │                 │
//!                └────── errors ───┴──► payload { errors: [...] }
//! ```
//!
//! Validation problems are data (`errors` on the payload); only storage
//! failures surface as GraphQL errors.

pub mod ids;
pub mod inputs;
pub mod mutation;
pub mod query;
pub mod types;

use crate::plugins::{PluginError, PluginsManager};
use async_graphql::{EmptySubscription, Schema};
use chrono::NaiveDate;
use civic_core::storage::ReadTx;
use civic_core::{Actor, CoreError, ErrorCode, FieldError, MutationContext, Tenant, TenantDb};
use std::sync::Arc;

pub use mutation::MutationRoot;
pub use query::QueryRoot;
pub use types::ErrorNode;

pub type CivicSchema = Schema<QueryRoot, MutationRoot, EmptySubscription>;

/// Maximum nesting accepted in a single query.
pub const MAX_QUERY_DEPTH: usize = 12;

#[must_use]
pub fn build_schema() -> CivicSchema {
    Schema::build(QueryRoot, MutationRoot, EmptySubscription)
        .limit_depth(MAX_QUERY_DEPTH)
        .finish()
}

// =============================================================================
// REQUEST CONTEXT
// =============================================================================

/// Who is calling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caller {
    /// No credentials: published data only, no mutations.
    Anonymous,
    /// Authenticated staff member, by API key label.
    Staff(String),
}

/// Per-request data available to every resolver.
pub struct RequestContext {
    pub tenant: Tenant,
    pub db: Arc<TenantDb>,
    pub caller: Caller,
    pub plugins: Arc<PluginsManager>,
    pub warn_days: i64,
    pub today: NaiveDate,
}

impl RequestContext {
    #[must_use]
    pub fn is_staff(&self) -> bool {
        matches!(self.caller, Caller::Staff(_))
    }

    /// Context for a mutation, or `PermissionDenied` for anonymous callers.
    pub fn mutation_context(&self) -> Result<MutationContext, CoreError> {
        match &self.caller {
            Caller::Staff(label) => Ok(MutationContext::new(Actor::Staff(label.clone()))),
            Caller::Anonymous => Err(permission_denied()),
        }
    }

    /// Run a read transaction, turning storage failures into GraphQL errors.
    pub fn read<T>(&self, f: impl FnOnce(&ReadTx) -> Result<T, CoreError>) -> async_graphql::Result<T> {
        self.db.read(f).map_err(internal)
    }
}

pub(crate) fn request_context<'a>(ctx: &async_graphql::Context<'a>) -> async_graphql::Result<&'a RequestContext> {
    ctx.data::<RequestContext>()
}

pub(crate) fn permission_denied() -> CoreError {
    CoreError::Validation(vec![FieldError::general(
        ErrorCode::PermissionDenied,
        "You need a staff API key to perform this action.",
    )])
}

/// Log a failure and hide its details from the caller.
pub(crate) fn internal(err: CoreError) -> async_graphql::Error {
    tracing::error!(error = %err, "graphql resolver failed");
    async_graphql::Error::new("Internal server error.")
}

/// Staff-only queries fail outright for anonymous callers.
pub(crate) fn require_staff(rc: &RequestContext) -> async_graphql::Result<()> {
    if rc.is_staff() {
        Ok(())
    } else {
        Err(async_graphql::Error::new("PERMISSION_DENIED"))
    }
}

/// Plugin failures as payload errors.
pub(crate) fn plugin_errors(err: PluginError) -> Result<Vec<FieldError>, CoreError> {
    match err {
        PluginError::Core(core) if !core.is_validation() => Err(core),
        PluginError::Core(core) => Ok(core.field_errors()),
        other => Ok(vec![FieldError::general(ErrorCode::PluginError, other.to_string())]),
    }
}
