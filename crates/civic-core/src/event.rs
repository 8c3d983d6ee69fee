//! # Events
//!
//! Audit trail of everything that happens to entries and documents. Events
//! are written inside the transaction of the change that produced them, so
//! the trail never disagrees with the data.

use crate::mutation::MutationContext;
use crate::storage::{Reader, WriteTx, record};
use crate::{DocumentFileId, DocumentId, EntryId, EventId};
use crate::error::StoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EventKind {
    EntryCreated,
    EntryUpdated,
    EntryDeleted,
    DocumentCreated,
    DocumentUpdated,
    DocumentDeleted,
    FileAdded,
    FileApproved,
    FileRefused,
    DocumentLoaded,
    DocumentLoadFailed,
    DocumentExpiring,
    DocumentExpired,
    NotificationSent,
    NotificationFailed,
}

/// A recorded event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub date: DateTime<Utc>,
    pub kind: EventKind,
    /// Label of whoever caused the event; `None` for the system.
    pub actor: Option<String>,
    pub entry: Option<EntryId>,
    pub document: Option<DocumentId>,
    pub file: Option<DocumentFileId>,
    pub message: Option<String>,
}

record!(Event, id, "event", "events");

/// An event about to be recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDraft {
    pub kind: EventKind,
    pub entry: Option<EntryId>,
    pub document: Option<DocumentId>,
    pub file: Option<DocumentFileId>,
    pub message: Option<String>,
}

impl EventDraft {
    #[must_use]
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            entry: None,
            document: None,
            file: None,
            message: None,
        }
    }

    #[must_use]
    pub fn entry(mut self, entry: EntryId) -> Self {
        self.entry = Some(entry);
        self
    }

    #[must_use]
    pub fn document(mut self, document: DocumentId) -> Self {
        self.document = Some(document);
        self
    }

    #[must_use]
    pub fn file(mut self, file: DocumentFileId) -> Self {
        self.file = Some(file);
        self
    }

    #[must_use]
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Persist a batch of drafts, stamped with the context's actor and time.
pub fn record_events(
    tx: &mut WriteTx,
    drafts: Vec<EventDraft>,
    ctx: &MutationContext,
) -> Result<Vec<Event>, StoreError> {
    drafts
        .into_iter()
        .map(|draft| {
            tx.insert(Event {
                id: EventId(0),
                date: ctx.now,
                kind: draft.kind,
                actor: ctx.actor.label(),
                entry: draft.entry,
                document: draft.document,
                file: draft.file,
                message: draft.message,
            })
        })
        .collect()
}

/// Filter for event listings.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub entry: Option<EntryId>,
    pub document: Option<DocumentId>,
    pub kinds: Vec<EventKind>,
}

/// Matching events, newest first, at most `limit`.
pub fn list_events(
    reader: &impl Reader,
    filter: &EventFilter,
    limit: usize,
) -> Result<Vec<Event>, StoreError> {
    let mut events = reader.filter::<Event>(|event| {
        filter.entry.is_none_or(|entry| event.entry == Some(entry))
            && filter.document.is_none_or(|document| event.document == Some(document))
            && (filter.kinds.is_empty() || filter.kinds.contains(&event.kind))
    })?;
    events.reverse();
    events.truncate(limit);
    Ok(events)
}
