//! # Mutations
//!
//! Shared create/update/delete plumbing. A model describes how to clean its
//! input and how to save itself; the drivers in this module run both steps,
//! plus event recording, inside one write transaction.
//!
//! ```text
//! input ─► clean_input ─► save ─► events ─► commit
//!              │            │
//!              └─ Validation(errors) aborts, nothing is written
//! ```

use crate::error::{CoreError, ErrorCode, FieldError};
use crate::event::{Event, EventDraft, record_events};
use crate::storage::{Reader, Record, TenantDb, WriteTx};
use chrono::{DateTime, NaiveDate, Utc};

// =============================================================================
// CONTEXT
// =============================================================================

/// Who is performing a mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Actor {
    /// Background jobs and CLI maintenance.
    System,
    /// An authenticated staff member, by API key label.
    Staff(String),
    /// A plugin acting on behalf of the system.
    Plugin(String),
}

impl Actor {
    /// Label written into events. `None` for the system.
    #[must_use]
    pub fn label(&self) -> Option<String> {
        match self {
            Self::System => None,
            Self::Staff(label) => Some(label.clone()),
            Self::Plugin(identifier) => Some(format!("plugin:{identifier}")),
        }
    }
}

/// Actor and clock of a mutation.
#[derive(Debug, Clone)]
pub struct MutationContext {
    pub actor: Actor,
    pub now: DateTime<Utc>,
}

impl MutationContext {
    #[must_use]
    pub fn new(actor: Actor) -> Self {
        Self {
            actor,
            now: Utc::now(),
        }
    }

    /// Context with a fixed clock.
    #[must_use]
    pub fn at(actor: Actor, now: DateTime<Utc>) -> Self {
        Self { actor, now }
    }

    #[must_use]
    pub fn today(&self) -> NaiveDate {
        self.now.date_naive()
    }
}

/// What happened to a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Created,
    Updated,
    Deleted,
}

/// A saved (or deleted) model and the events recorded with it.
#[derive(Debug, Clone)]
pub struct MutationOutcome<T> {
    pub model: T,
    pub events: Vec<Event>,
}

// =============================================================================
// MODEL MUTATION
// =============================================================================

/// Validation and persistence rules of one model.
///
/// One input type serves both create and update: on update, `None` fields
/// keep their current value.
pub trait ModelMutation {
    type Model: Record;
    type Input;
    /// The input after validation, ready to be applied.
    type Cleaned;

    /// Validate `input`. `instance` is `None` when creating.
    fn clean_input(
        tx: &WriteTx,
        instance: Option<&Self::Model>,
        input: Self::Input,
        ctx: &MutationContext,
    ) -> Result<Self::Cleaned, CoreError>;

    /// Build the new version of the model and persist it together with any
    /// dependent records.
    fn save(
        tx: &mut WriteTx,
        instance: Option<Self::Model>,
        cleaned: Self::Cleaned,
        ctx: &MutationContext,
    ) -> Result<Self::Model, CoreError>;

    /// Remove dependents or refuse the deletion.
    fn before_delete(
        _tx: &mut WriteTx,
        _model: &Self::Model,
        _ctx: &MutationContext,
    ) -> Result<(), CoreError> {
        Ok(())
    }

    /// Events to record for a change.
    fn events(_model: &Self::Model, _change: Change) -> Vec<EventDraft> {
        Vec::new()
    }
}

/// Create a model inside an existing transaction.
pub fn create_in<M: ModelMutation>(
    tx: &mut WriteTx,
    input: M::Input,
    ctx: &MutationContext,
) -> Result<MutationOutcome<M::Model>, CoreError> {
    let cleaned = M::clean_input(tx, None, input, ctx)?;
    let model = M::save(tx, None, cleaned, ctx)?;
    let events = record_events(tx, M::events(&model, Change::Created), ctx)?;
    tracing::debug!(kind = M::Model::KIND, id = model.key(), "created");
    Ok(MutationOutcome { model, events })
}

/// Update a model inside an existing transaction.
pub fn update_in<M: ModelMutation>(
    tx: &mut WriteTx,
    id: u64,
    input: M::Input,
    ctx: &MutationContext,
) -> Result<MutationOutcome<M::Model>, CoreError> {
    let instance = tx.require::<M::Model>(id)?;
    let cleaned = M::clean_input(tx, Some(&instance), input, ctx)?;
    let model = M::save(tx, Some(instance), cleaned, ctx)?;
    let events = record_events(tx, M::events(&model, Change::Updated), ctx)?;
    tracing::debug!(kind = M::Model::KIND, id, "updated");
    Ok(MutationOutcome { model, events })
}

/// Delete a model inside an existing transaction.
pub fn delete_in<M: ModelMutation>(
    tx: &mut WriteTx,
    id: u64,
    ctx: &MutationContext,
) -> Result<MutationOutcome<M::Model>, CoreError> {
    let model = tx.require::<M::Model>(id)?;
    M::before_delete(tx, &model, ctx)?;
    tx.remove::<M::Model>(id)?;
    let events = record_events(tx, M::events(&model, Change::Deleted), ctx)?;
    tracing::debug!(kind = M::Model::KIND, id, "deleted");
    Ok(MutationOutcome { model, events })
}

pub fn create<M: ModelMutation>(
    db: &TenantDb,
    input: M::Input,
    ctx: &MutationContext,
) -> Result<MutationOutcome<M::Model>, CoreError> {
    db.write(|tx| create_in::<M>(tx, input, ctx))
}

pub fn update<M: ModelMutation>(
    db: &TenantDb,
    id: u64,
    input: M::Input,
    ctx: &MutationContext,
) -> Result<MutationOutcome<M::Model>, CoreError> {
    db.write(|tx| update_in::<M>(tx, id, input, ctx))
}

pub fn delete<M: ModelMutation>(
    db: &TenantDb,
    id: u64,
    ctx: &MutationContext,
) -> Result<MutationOutcome<M::Model>, CoreError> {
    db.write(|tx| delete_in::<M>(tx, id, ctx))
}

// =============================================================================
// CLEANING HELPERS
// =============================================================================

/// Trim a name; record `Required` when creating without one and `Invalid`
/// when blank or too long.
pub fn clean_name(
    errors: &mut Vec<FieldError>,
    field: &str,
    value: Option<String>,
    creating: bool,
) -> Option<String> {
    match value.map(|v| v.trim().to_string()) {
        None if creating => {
            errors.push(FieldError::required(field));
            None
        }
        None => None,
        Some(v) if v.is_empty() => {
            errors.push(FieldError::new(field, ErrorCode::Required, format!("{field} cannot be blank.")));
            None
        }
        Some(v) if v.chars().count() > crate::primitives::MAX_NAME_LENGTH => {
            errors.push(FieldError::new(field, ErrorCode::Invalid, format!("{field} is too long.")));
            None
        }
        Some(v) => Some(v),
    }
}

/// Trim optional free text and bound its length. Empty text becomes `None`.
pub fn clean_text(errors: &mut Vec<FieldError>, field: &str, value: Option<String>) -> Option<Option<String>> {
    let value = value?;
    let trimmed = value.trim();
    if trimmed.chars().count() > crate::primitives::MAX_TEXT_LENGTH {
        errors.push(FieldError::new(field, ErrorCode::Invalid, format!("{field} is too long.")));
        return None;
    }
    Some((!trimmed.is_empty()).then(|| trimmed.to_string()))
}

/// Resolve the slug of a model: an explicit slug must already be a valid
/// slug and unused; otherwise one is derived from the name.
pub fn clean_slug(
    errors: &mut Vec<FieldError>,
    explicit: Option<String>,
    name: Option<&str>,
    fallback: &str,
    mut taken: impl FnMut(&str) -> bool,
) -> Option<String> {
    match explicit.map(|s| s.trim().to_string()) {
        Some(slug) => {
            if slug.is_empty() || crate::slug::slugify(&slug) != slug {
                errors.push(FieldError::new("slug", ErrorCode::Invalid, format!("'{slug}' is not a valid slug.")));
                None
            } else if taken(&slug) {
                errors.push(FieldError::new("slug", ErrorCode::Unique, format!("Slug '{slug}' is already in use.")));
                None
            } else {
                Some(slug)
            }
        }
        None => name.map(|name| crate::slug::unique_slug(name, fallback, taken)),
    }
}

/// Turn accumulated errors into `Err(Validation)`.
pub fn finish<T>(errors: Vec<FieldError>, value: impl FnOnce() -> T) -> Result<T, CoreError> {
    if errors.is_empty() {
        Ok(value())
    } else {
        Err(CoreError::Validation(errors))
    }
}
