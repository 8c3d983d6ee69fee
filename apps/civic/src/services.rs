//! # Services
//!
//! Glue between committed changes and plugins.
//!
//! Notifications are dispatched only after the change that produced them has
//! been committed, and every delivery attempt is recorded back as an event
//! (`NotificationSent` / `NotificationFailed`) of the same entry and document.

use crate::plugins::{Delivery, LoadRequest, Notification, PluginError, PluginsManager};
use civic_core::document::{ExpiryTransition, FileInput, record_load_failure, record_loaded_file};
use civic_core::event::{EventDraft, record_events};
use civic_core::{
    Actor, CoreError, Document, DocumentFile, DocumentId, DocumentStatus, Entry, EntryId, EntryType, Event,
    EventKind, MutationContext, Reader, Tenant, TenantDb,
};

/// Event kinds that produce a notification.
pub const NOTIFIED_EVENTS: &[EventKind] = &[
    EventKind::FileApproved,
    EventKind::FileRefused,
    EventKind::DocumentLoaded,
    EventKind::DocumentLoadFailed,
    EventKind::DocumentExpiring,
    EventKind::DocumentExpired,
];

// =============================================================================
// NOTIFICATIONS
// =============================================================================

fn build_notification(
    reader: &impl Reader,
    tenant: &Tenant,
    event: EventKind,
    entry: Option<EntryId>,
    document: Option<DocumentId>,
    message: Option<String>,
) -> Result<Notification, CoreError> {
    let document = match document {
        Some(id) => reader.get::<Document>(id.0)?,
        None => None,
    };
    let entry_id = entry.or(document.as_ref().map(|d| d.entry));
    let entry = match entry_id {
        Some(id) => reader.get::<Entry>(id.0)?,
        None => None,
    };
    Ok(Notification {
        event,
        tenant: tenant.id.to_string(),
        tenant_name: tenant.name.clone(),
        entry: entry_id,
        entry_name: entry.as_ref().map(|e| e.name.clone()),
        recipient: entry.and_then(|e| e.email),
        document: document.as_ref().map(|d| d.id),
        document_name: document.map(|d| d.name),
        message,
    })
}

/// Notifications for the notifiable events among `events`.
pub fn notifications_for_events(
    db: &TenantDb,
    tenant: &Tenant,
    events: &[Event],
) -> Result<Vec<Notification>, CoreError> {
    db.read(|tx| {
        events
            .iter()
            .filter(|e| NOTIFIED_EVENTS.contains(&e.kind))
            .map(|e| build_notification(tx, tenant, e.kind, e.entry, e.document, e.message.clone()))
            .collect()
    })
}

pub fn notification_for_transition(
    db: &TenantDb,
    tenant: &Tenant,
    transition: &ExpiryTransition,
) -> Result<Notification, CoreError> {
    let kind = if transition.status == DocumentStatus::Expired {
        EventKind::DocumentExpired
    } else {
        EventKind::DocumentExpiring
    };
    let message = transition
        .expiration_date
        .map(|date| format!("Expiration date: {date}"));
    db.read(|tx| {
        build_notification(
            tx,
            tenant,
            kind,
            Some(transition.document.entry),
            Some(transition.document.id),
            message,
        )
    })
}

/// Deliver notifications and record the outcome of every attempt.
/// Returns how many deliveries succeeded.
pub async fn dispatch(plugins: &PluginsManager, db: &TenantDb, notifications: Vec<Notification>) -> usize {
    let mut delivered = 0;
    for notification in notifications {
        let reports = match plugins.notify(db, &notification).await {
            Ok(reports) => reports,
            Err(err) => {
                tracing::warn!(tenant = %db.tenant(), error = %err, "could not read plugin configuration");
                continue;
            }
        };
        for report in reports {
            let (kind, message) = match &report.outcome {
                Ok(Delivery::Sent) => {
                    delivered += 1;
                    (EventKind::NotificationSent, report.identifier.to_string())
                }
                Ok(Delivery::Skipped(reason)) => {
                    tracing::debug!(plugin = report.identifier, reason = %reason, "notification skipped");
                    continue;
                }
                Err(error) => (EventKind::NotificationFailed, format!("{}: {error}", report.identifier)),
            };
            let mut draft = EventDraft::new(kind).message(message);
            if let Some(entry) = notification.entry {
                draft = draft.entry(entry);
            }
            if let Some(document) = notification.document {
                draft = draft.document(document);
            }
            let ctx = MutationContext::new(Actor::Plugin(report.identifier.to_string()));
            if let Err(err) = db.write(|tx| Ok(record_events(tx, vec![draft], &ctx)?)) {
                tracing::warn!(tenant = %db.tenant(), error = %err, "could not record notification outcome");
            }
        }
    }
    delivered
}

/// Notify about committed events. Failures are logged, never returned.
pub async fn notify_events(plugins: &PluginsManager, tenant: &Tenant, db: &TenantDb, events: &[Event]) -> usize {
    match notifications_for_events(db, tenant, events) {
        Ok(notifications) if notifications.is_empty() => 0,
        Ok(notifications) => dispatch(plugins, db, notifications).await,
        Err(err) => {
            tracing::warn!(tenant = %tenant.id, error = %err, "could not build notifications");
            0
        }
    }
}

// =============================================================================
// DOCUMENT LOADING
// =============================================================================

/// What happened when a document was handed to the loaders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded { plugin: String, file: DocumentFile },
    Failed { plugin: String, message: String },
    /// No active plugin declares the document's load type.
    NoLoader,
    /// The document is uploaded by hand.
    Manual,
}

/// Ask the plugins for a fresh copy of a document, store it, and notify.
pub async fn load_document(
    plugins: &PluginsManager,
    tenant: &Tenant,
    db: &TenantDb,
    document: DocumentId,
) -> Result<LoadOutcome, PluginError> {
    let (document, entry, entry_type) = db.read(|tx| {
        let document = tx.require::<Document>(document.0)?;
        let entry = tx.require::<Entry>(document.entry.0)?;
        let entry_type = tx.require::<EntryType>(entry.entry_type.0)?;
        Ok((document, entry, entry_type))
    })?;
    if !document.is_loadable() {
        return Ok(LoadOutcome::Manual);
    }

    let request = LoadRequest {
        tenant: tenant.id.to_string(),
        document: document.id,
        load_type: document.load_type.clone(),
        entry_kind: entry_type.kind,
        document_number: entry.document_number.clone(),
    };
    let Some(attempt) = plugins.load_document(db, &request).await? else {
        tracing::debug!(document = %document.id, load_type = %document.load_type, "no loader for document");
        return Ok(LoadOutcome::NoLoader);
    };

    let ctx = MutationContext::new(Actor::Plugin(attempt.identifier.to_string()));
    let stored = match attempt.result {
        Ok(loaded) => {
            let input = FileInput {
                file_url: loaded.file_url,
                begin_date: loaded.begin_date,
                expiration_date: loaded.expiration_date,
            };
            db.write(|tx| record_loaded_file(tx, document.id, input, attempt.identifier, &ctx))
                .map_err(|err| err.to_string())
        }
        Err(err) => Err(err.to_string()),
    };

    let outcome = match stored {
        Ok(outcome) => {
            notify_events(plugins, tenant, db, &outcome.events).await;
            LoadOutcome::Loaded {
                plugin: attempt.identifier.to_string(),
                file: outcome.model,
            }
        }
        Err(message) => {
            db.write(|tx| record_load_failure(tx, document.id, &message, &ctx))?;
            let notification = db.read(|tx| {
                build_notification(
                    tx,
                    tenant,
                    EventKind::DocumentLoadFailed,
                    Some(entry.id),
                    Some(document.id),
                    Some(message.clone()),
                )
            })?;
            dispatch(plugins, db, vec![notification]).await;
            LoadOutcome::Failed {
                plugin: attempt.identifier.to_string(),
                message,
            }
        }
    };
    Ok(outcome)
}
