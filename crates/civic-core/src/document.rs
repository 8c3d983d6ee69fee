//! # Documents
//!
//! Compliance documents attached to entries and their file workflow.
//!
//! ```text
//!            add_file              approve_file
//!   (none) ───────────► Waiting ─────────────────► Approved ──► active file
//!                          │
//!                          └──── refuse_file ────► Refused
//! ```
//!
//! Only `Waiting` files can be decided. A document's status is derived from
//! its active file and its latest upload (see [`DocumentStatus`]).

use crate::assignment::{
    AssignedAttribute, AttributeAssignment, AttributeAssignmentInput, AttributeOwner, CleanedAttribute,
    delete_owner_values,
};
use crate::attribute::AttributeTarget;
use crate::entry::{Entry, EntryType};
use crate::error::{CoreError, ErrorCode, FieldError};
use crate::event::{EventDraft, EventKind, record_events};
use crate::mutation::{Change, ModelMutation, MutationContext, MutationOutcome, clean_name, clean_text, finish};
use crate::primitives::{MANUAL_LOAD_TYPE, MAX_TEXT_LENGTH};
use crate::storage::{Reader, WriteTx, record};
use crate::validation::validate_url;
use crate::{DefaultDocumentId, DocumentFileId, DocumentId, EntryId, EntryTypeId};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// MODELS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileStatus {
    Waiting,
    Approved,
    Refused,
}

/// Compliance status of a document on a given day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DocumentStatus {
    /// Nothing uploaded, or nothing left to decide and no active file.
    Missing,
    /// An upload waits for a decision and there is no active file.
    Waiting,
    Approved,
    /// Approved, expiring within the warning window.
    Expiring,
    Expired,
    /// The latest upload was refused and there is no active file.
    Refused,
}

/// Template from which documents are instantiated for new entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultDocument {
    pub id: DefaultDocumentId,
    pub name: String,
    pub description: Option<String>,
    pub entry_types: Vec<EntryTypeId>,
    pub expires: bool,
    /// Plugin load type, or `manual`.
    pub load_type: String,
}

record!(DefaultDocument, id, "default document", "default_documents");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub entry: EntryId,
    pub name: String,
    pub description: Option<String>,
    pub is_published: bool,
    pub expires: bool,
    pub load_type: String,
    pub default_document: Option<DefaultDocumentId>,
    pub attributes: Vec<AssignedAttribute>,
    pub active_file: Option<DocumentFileId>,
    /// Last expiry status an event was recorded for. Cleared on approval.
    pub expiry_notified: Option<DocumentStatus>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

record!(Document, id, "document", "documents");

impl Document {
    /// Whether a plugin can fetch this document.
    #[must_use]
    pub fn is_loadable(&self) -> bool {
        self.load_type != MANUAL_LOAD_TYPE
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentFile {
    pub id: DocumentFileId,
    pub document: DocumentId,
    pub file_url: String,
    pub begin_date: Option<NaiveDate>,
    pub expiration_date: Option<NaiveDate>,
    pub status: FileStatus,
    pub refusal_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

record!(DocumentFile, id, "document file", "document_files");

// =============================================================================
// STATUS
// =============================================================================

/// Status of `document` given all of its files.
#[must_use]
pub fn status_of(document: &Document, files: &[DocumentFile], today: NaiveDate, warn_days: i64) -> DocumentStatus {
    if let Some(active) = document
        .active_file
        .and_then(|id| files.iter().find(|f| f.id == id))
    {
        return match (document.expires, active.expiration_date) {
            (true, Some(expiration)) if expiration < today => DocumentStatus::Expired,
            (true, Some(expiration)) if within_warning(expiration, today, warn_days) => DocumentStatus::Expiring,
            _ => DocumentStatus::Approved,
        };
    }
    match files.iter().max_by_key(|f| (f.created_at, f.id)).map(|f| f.status) {
        Some(FileStatus::Waiting) => DocumentStatus::Waiting,
        Some(FileStatus::Refused) => DocumentStatus::Refused,
        Some(FileStatus::Approved) | None => DocumentStatus::Missing,
    }
}

/// A window reaching past the calendar counts every future date as inside it.
fn within_warning(expiration: NaiveDate, today: NaiveDate, warn_days: i64) -> bool {
    match Duration::try_days(warn_days).and_then(|window| today.checked_add_signed(window)) {
        Some(limit) => expiration <= limit,
        None => true,
    }
}

pub fn files_of(reader: &impl Reader, document: DocumentId) -> Result<Vec<DocumentFile>, CoreError> {
    Ok(reader.filter::<DocumentFile>(|f| f.document == document)?)
}

pub fn document_status(
    reader: &impl Reader,
    document: &Document,
    today: NaiveDate,
    warn_days: i64,
) -> Result<DocumentStatus, CoreError> {
    let files = files_of(reader, document.id)?;
    Ok(status_of(document, &files, today, warn_days))
}

#[derive(Debug, Clone, Default)]
pub struct DocumentFilter {
    pub entry: Option<EntryId>,
    pub status: Option<DocumentStatus>,
    pub published_only: bool,
}

pub fn list_documents(
    reader: &impl Reader,
    filter: &DocumentFilter,
    today: NaiveDate,
    warn_days: i64,
) -> Result<Vec<Document>, CoreError> {
    let documents = reader.filter::<Document>(|d| {
        filter.entry.is_none_or(|entry| d.entry == entry) && (!filter.published_only || d.is_published)
    })?;
    let Some(wanted) = filter.status else {
        return Ok(documents);
    };
    let mut matching = Vec::new();
    for document in documents {
        if document_status(reader, &document, today, warn_days)? == wanted {
            matching.push(document);
        }
    }
    Ok(matching)
}

// =============================================================================
// FILE WORKFLOW
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct FileInput {
    pub file_url: String,
    pub begin_date: Option<NaiveDate>,
    pub expiration_date: Option<NaiveDate>,
}

fn clean_file(document: &Document, input: &FileInput) -> Result<String, CoreError> {
    let mut errors = Vec::new();
    let url = validate_url(&input.file_url);
    if url.is_none() {
        errors.push(FieldError::new("file_url", ErrorCode::Invalid, "Enter a valid file URL."));
    }
    if document.expires {
        match (input.begin_date, input.expiration_date) {
            (_, None) => errors.push(FieldError::new(
                "expiration_date",
                ErrorCode::Required,
                "This document expires; an expiration date is required.",
            )),
            (Some(begin), Some(expiration)) if expiration < begin => errors.push(FieldError::new(
                "expiration_date",
                ErrorCode::Invalid,
                "Expiration date cannot precede the begin date.",
            )),
            _ => {}
        }
    }
    finish(errors, || url.unwrap_or_default())
}

fn draft_for(document: &Document, file: &DocumentFile, kind: EventKind) -> EventDraft {
    EventDraft::new(kind)
        .entry(document.entry)
        .document(document.id)
        .file(file.id)
}

/// Upload a new file; it waits for a staff decision.
pub fn add_file(
    tx: &mut WriteTx,
    document: DocumentId,
    input: FileInput,
    ctx: &MutationContext,
) -> Result<MutationOutcome<DocumentFile>, CoreError> {
    let mut document = tx.require::<Document>(document.0)?;
    let url = clean_file(&document, &input)?;
    let file = tx.insert(DocumentFile {
        id: DocumentFileId(0),
        document: document.id,
        file_url: url,
        begin_date: input.begin_date,
        expiration_date: input.expiration_date,
        status: FileStatus::Waiting,
        refusal_reason: None,
        created_at: ctx.now,
        decided_at: None,
    })?;
    document.updated_at = ctx.now;
    tx.put(&document)?;
    let events = record_events(tx, vec![draft_for(&document, &file, EventKind::FileAdded)], ctx)?;
    Ok(MutationOutcome { model: file, events })
}

fn waiting_file(tx: &WriteTx, file: DocumentFileId) -> Result<DocumentFile, CoreError> {
    let file = tx.require::<DocumentFile>(file.0)?;
    if file.status != FileStatus::Waiting {
        return Err(CoreError::Validation(vec![FieldError::new(
            "status",
            ErrorCode::InvalidStatus,
            format!("Only waiting files can be decided; this one is {:?}.", file.status),
        )]));
    }
    Ok(file)
}

/// Approve a waiting file and make it the document's active file.
pub fn approve_file(
    tx: &mut WriteTx,
    file: DocumentFileId,
    ctx: &MutationContext,
) -> Result<MutationOutcome<DocumentFile>, CoreError> {
    let mut file = waiting_file(tx, file)?;
    let mut document = tx.require::<Document>(file.document.0)?;
    file.status = FileStatus::Approved;
    file.decided_at = Some(ctx.now);
    tx.put(&file)?;

    document.active_file = Some(file.id);
    document.expiry_notified = None;
    document.updated_at = ctx.now;
    tx.put(&document)?;

    let events = record_events(tx, vec![draft_for(&document, &file, EventKind::FileApproved)], ctx)?;
    Ok(MutationOutcome { model: file, events })
}

/// Refuse a waiting file. A reason is mandatory.
pub fn refuse_file(
    tx: &mut WriteTx,
    file: DocumentFileId,
    reason: &str,
    ctx: &MutationContext,
) -> Result<MutationOutcome<DocumentFile>, CoreError> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(CoreError::Validation(vec![FieldError::required("refusal_reason")]));
    }
    if reason.chars().count() > MAX_TEXT_LENGTH {
        return Err(CoreError::invalid("refusal_reason", ErrorCode::Invalid, "Refusal reason is too long."));
    }
    let mut file = waiting_file(tx, file)?;
    let mut document = tx.require::<Document>(file.document.0)?;
    file.status = FileStatus::Refused;
    file.refusal_reason = Some(reason.to_string());
    file.decided_at = Some(ctx.now);
    tx.put(&file)?;
    document.updated_at = ctx.now;
    tx.put(&document)?;

    let draft = draft_for(&document, &file, EventKind::FileRefused).message(reason);
    let events = record_events(tx, vec![draft], ctx)?;
    Ok(MutationOutcome { model: file, events })
}

/// Store a file fetched by a plugin. It skips review and becomes active.
pub fn record_loaded_file(
    tx: &mut WriteTx,
    document: DocumentId,
    input: FileInput,
    source: &str,
    ctx: &MutationContext,
) -> Result<MutationOutcome<DocumentFile>, CoreError> {
    let mut document = tx.require::<Document>(document.0)?;
    let url = clean_file(&document, &input)?;
    let file = tx.insert(DocumentFile {
        id: DocumentFileId(0),
        document: document.id,
        file_url: url,
        begin_date: input.begin_date,
        expiration_date: input.expiration_date,
        status: FileStatus::Approved,
        refusal_reason: None,
        created_at: ctx.now,
        decided_at: Some(ctx.now),
    })?;
    document.active_file = Some(file.id);
    document.expiry_notified = None;
    document.updated_at = ctx.now;
    tx.put(&document)?;

    let draft = draft_for(&document, &file, EventKind::DocumentLoaded).message(source);
    let events = record_events(tx, vec![draft], ctx)?;
    Ok(MutationOutcome { model: file, events })
}

/// Record that a plugin could not fetch a document.
pub fn record_load_failure(
    tx: &mut WriteTx,
    document: DocumentId,
    message: &str,
    ctx: &MutationContext,
) -> Result<(), CoreError> {
    let document = tx.require::<Document>(document.0)?;
    let draft = EventDraft::new(EventKind::DocumentLoadFailed)
        .entry(document.entry)
        .document(document.id)
        .message(message);
    record_events(tx, vec![draft], ctx)?;
    Ok(())
}

// =============================================================================
// EXPIRATION
// =============================================================================

/// A document that entered the expiring or expired state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiryTransition {
    pub document: Document,
    pub status: DocumentStatus,
    pub expiration_date: Option<NaiveDate>,
}

/// Find documents that became expiring or expired since the last sweep and
/// record one event for each.
pub fn expiration_sweep(
    tx: &mut WriteTx,
    today: NaiveDate,
    warn_days: i64,
    ctx: &MutationContext,
) -> Result<Vec<ExpiryTransition>, CoreError> {
    let mut transitions = Vec::new();
    let mut drafts = Vec::new();

    for mut document in tx.filter::<Document>(|d| d.expires && d.active_file.is_some())? {
        let files = files_of(&*tx, document.id)?;
        let status = status_of(&document, &files, today, warn_days);
        if !matches!(status, DocumentStatus::Expiring | DocumentStatus::Expired)
            || document.expiry_notified == Some(status)
        {
            continue;
        }
        let expiration_date = document
            .active_file
            .and_then(|id| files.iter().find(|f| f.id == id))
            .and_then(|f| f.expiration_date);
        let kind = if status == DocumentStatus::Expired {
            EventKind::DocumentExpired
        } else {
            EventKind::DocumentExpiring
        };
        let mut draft = EventDraft::new(kind).entry(document.entry).document(document.id);
        if let Some(date) = expiration_date {
            draft = draft.message(date.to_string());
        }
        drafts.push(draft);

        document.expiry_notified = Some(status);
        tx.put(&document)?;
        transitions.push(ExpiryTransition {
            document,
            status,
            expiration_date,
        });
    }

    record_events(tx, drafts, ctx)?;
    if !transitions.is_empty() {
        tracing::info!(count = transitions.len(), %today, "documents changed expiry status");
    }
    Ok(transitions)
}

// =============================================================================
// ENTRY HOOKS
// =============================================================================

/// Create the documents of a new entry from the defaults linked to its type.
pub fn instantiate_defaults(tx: &mut WriteTx, entry: &Entry, ctx: &MutationContext) -> Result<Vec<Document>, CoreError> {
    let defaults = tx.filter::<DefaultDocument>(|d| d.entry_types.contains(&entry.entry_type))?;
    let mut documents = Vec::with_capacity(defaults.len());
    for default in defaults {
        let document = tx.insert(Document {
            id: DocumentId(0),
            entry: entry.id,
            name: default.name.clone(),
            description: default.description.clone(),
            is_published: false,
            expires: default.expires,
            load_type: default.load_type.clone(),
            default_document: Some(default.id),
            attributes: Vec::new(),
            active_file: None,
            expiry_notified: None,
            created_at: ctx.now,
            updated_at: ctx.now,
        })?;
        documents.push(document);
    }
    let drafts = documents
        .iter()
        .map(|d| EventDraft::new(EventKind::DocumentCreated).entry(entry.id).document(d.id))
        .collect();
    record_events(tx, drafts, ctx)?;
    Ok(documents)
}

fn remove_document_dependents(tx: &mut WriteTx, document: DocumentId) -> Result<(), CoreError> {
    tx.remove_where::<DocumentFile>(|f| f.document == document)?;
    delete_owner_values(tx, AttributeOwner::Document(document))?;
    Ok(())
}

/// Delete every document of an entry together with its files.
pub fn delete_entry_documents(tx: &mut WriteTx, entry: EntryId, ctx: &MutationContext) -> Result<usize, CoreError> {
    let documents = tx.remove_where::<Document>(|d| d.entry == entry)?;
    for document in &documents {
        remove_document_dependents(tx, document.id)?;
    }
    let drafts = documents
        .iter()
        .map(|d| EventDraft::new(EventKind::DocumentDeleted).entry(entry).document(d.id).message(d.name.clone()))
        .collect();
    record_events(tx, drafts, ctx)?;
    Ok(documents.len())
}

fn clean_load_type(errors: &mut Vec<FieldError>, raw: Option<String>) -> Option<String> {
    let value = raw?.trim().to_ascii_lowercase();
    let valid = !value.is_empty()
        && value.len() <= 64
        && value.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if valid {
        Some(value)
    } else {
        errors.push(FieldError::new("load_type", ErrorCode::Invalid, format!("'{value}' is not a valid load type.")));
        None
    }
}

// =============================================================================
// DOCUMENT MUTATIONS
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct DocumentInput {
    /// Set on creation only.
    pub entry: Option<EntryId>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_published: Option<bool>,
    pub expires: Option<bool>,
    pub load_type: Option<String>,
    pub attributes: Option<Vec<AttributeAssignmentInput>>,
}

#[derive(Debug)]
pub struct CleanedDocumentInput {
    entry: EntryId,
    name: Option<String>,
    description: Option<Option<String>>,
    is_published: Option<bool>,
    expires: Option<bool>,
    load_type: Option<String>,
    attributes: Vec<CleanedAttribute>,
}

pub struct DocumentMutation;

impl ModelMutation for DocumentMutation {
    type Model = Document;
    type Input = DocumentInput;
    type Cleaned = CleanedDocumentInput;

    fn clean_input(
        tx: &WriteTx,
        instance: Option<&Document>,
        input: DocumentInput,
        _ctx: &MutationContext,
    ) -> Result<CleanedDocumentInput, CoreError> {
        let creating = instance.is_none();
        let mut errors = Vec::new();

        let entry_id = match (instance, input.entry) {
            (Some(document), Some(requested)) if requested != document.entry => {
                errors.push(FieldError::new("entry", ErrorCode::Invalid, "A document cannot move to another entry."));
                document.entry
            }
            (Some(document), _) => document.entry,
            (None, Some(requested)) => requested,
            (None, None) => return Err(CoreError::Validation(vec![FieldError::required("entry")])),
        };
        let Some(entry) = tx.get::<Entry>(entry_id.0)? else {
            return Err(CoreError::invalid("entry", ErrorCode::NotFound, "Entry not found."));
        };
        let allowed = tx
            .get::<EntryType>(entry.entry_type.0)?
            .map(|t| t.document_attributes)
            .unwrap_or_default();

        let name = clean_name(&mut errors, "name", input.name, creating);
        let description = clean_text(&mut errors, "description", input.description);
        let load_type = clean_load_type(&mut errors, input.load_type);

        let attributes = match AttributeAssignment::clean_input(
            tx,
            &allowed,
            AttributeTarget::Document,
            input.attributes.unwrap_or_default(),
            creating,
        ) {
            Ok(attributes) => attributes,
            Err(CoreError::Validation(attribute_errors)) => {
                errors.extend(attribute_errors);
                Vec::new()
            }
            Err(other) => return Err(other),
        };

        finish(errors, || CleanedDocumentInput {
            entry: entry_id,
            name,
            description,
            is_published: input.is_published,
            expires: input.expires,
            load_type,
            attributes,
        })
    }

    fn save(
        tx: &mut WriteTx,
        instance: Option<Document>,
        cleaned: CleanedDocumentInput,
        ctx: &MutationContext,
    ) -> Result<Document, CoreError> {
        let mut document = match instance {
            Some(document) => document,
            None => tx.insert(Document {
                id: DocumentId(0),
                entry: cleaned.entry,
                name: String::new(),
                description: None,
                is_published: false,
                expires: false,
                load_type: MANUAL_LOAD_TYPE.to_string(),
                default_document: None,
                attributes: Vec::new(),
                active_file: None,
                expiry_notified: None,
                created_at: ctx.now,
                updated_at: ctx.now,
            })?,
        };
        if let Some(name) = cleaned.name {
            document.name = name;
        }
        if let Some(description) = cleaned.description {
            document.description = description;
        }
        if let Some(published) = cleaned.is_published {
            document.is_published = published;
        }
        if let Some(expires) = cleaned.expires {
            if expires != document.expires {
                document.expiry_notified = None;
            }
            document.expires = expires;
        }
        if let Some(load_type) = cleaned.load_type {
            document.load_type = load_type;
        }
        AttributeAssignment::save(
            tx,
            AttributeOwner::Document(document.id),
            &mut document.attributes,
            cleaned.attributes,
        )?;
        document.updated_at = ctx.now;
        tx.put(&document)?;
        Ok(document)
    }

    fn before_delete(tx: &mut WriteTx, model: &Document, _ctx: &MutationContext) -> Result<(), CoreError> {
        remove_document_dependents(tx, model.id)
    }

    fn events(model: &Document, change: Change) -> Vec<EventDraft> {
        let kind = match change {
            Change::Created => EventKind::DocumentCreated,
            Change::Updated => EventKind::DocumentUpdated,
            Change::Deleted => EventKind::DocumentDeleted,
        };
        vec![
            EventDraft::new(kind)
                .entry(model.entry)
                .document(model.id)
                .message(model.name.clone()),
        ]
    }
}

#[derive(Debug, Clone, Default)]
pub struct DefaultDocumentInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub entry_types: Option<Vec<EntryTypeId>>,
    pub expires: Option<bool>,
    pub load_type: Option<String>,
}

#[derive(Debug)]
pub struct CleanedDefaultDocumentInput {
    name: Option<String>,
    description: Option<Option<String>>,
    entry_types: Option<Vec<EntryTypeId>>,
    expires: Option<bool>,
    load_type: Option<String>,
}

pub struct DefaultDocumentMutation;

impl ModelMutation for DefaultDocumentMutation {
    type Model = DefaultDocument;
    type Input = DefaultDocumentInput;
    type Cleaned = CleanedDefaultDocumentInput;

    fn clean_input(
        tx: &WriteTx,
        instance: Option<&DefaultDocument>,
        input: DefaultDocumentInput,
        _ctx: &MutationContext,
    ) -> Result<CleanedDefaultDocumentInput, CoreError> {
        let mut errors = Vec::new();
        let name = clean_name(&mut errors, "name", input.name, instance.is_none());
        let description = clean_text(&mut errors, "description", input.description);
        let load_type = clean_load_type(&mut errors, input.load_type);

        let entry_types = match input.entry_types {
            None => None,
            Some(ids) => {
                let mut unique = Vec::with_capacity(ids.len());
                for id in ids {
                    if unique.contains(&id) {
                        continue;
                    }
                    if tx.exists::<EntryType>(id.0)? {
                        unique.push(id);
                    } else {
                        errors.push(FieldError::new(
                            "entry_types",
                            ErrorCode::NotFound,
                            format!("Entry type {id} not found."),
                        ));
                    }
                }
                Some(unique)
            }
        };

        finish(errors, || CleanedDefaultDocumentInput {
            name,
            description,
            entry_types,
            expires: input.expires,
            load_type,
        })
    }

    fn save(
        tx: &mut WriteTx,
        instance: Option<DefaultDocument>,
        cleaned: CleanedDefaultDocumentInput,
        _ctx: &MutationContext,
    ) -> Result<DefaultDocument, CoreError> {
        let mut default = instance.unwrap_or(DefaultDocument {
            id: DefaultDocumentId(0),
            name: String::new(),
            description: None,
            entry_types: Vec::new(),
            expires: false,
            load_type: MANUAL_LOAD_TYPE.to_string(),
        });
        if let Some(name) = cleaned.name {
            default.name = name;
        }
        if let Some(description) = cleaned.description {
            default.description = description;
        }
        if let Some(types) = cleaned.entry_types {
            default.entry_types = types;
        }
        if let Some(expires) = cleaned.expires {
            default.expires = expires;
        }
        if let Some(load_type) = cleaned.load_type {
            default.load_type = load_type;
        }
        if default.id.0 == 0 {
            Ok(tx.insert(default)?)
        } else {
            tx.put(&default)?;
            Ok(default)
        }
    }

    fn before_delete(tx: &mut WriteTx, model: &DefaultDocument, _ctx: &MutationContext) -> Result<(), CoreError> {
        for mut document in tx.filter::<Document>(|d| d.default_document == Some(model.id))? {
            document.default_document = None;
            tx.put(&document)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]

    use super::*;
    use crate::entry::{EntryInput, EntryKind, EntryMutation, EntryTypeInput, EntryTypeMutation};
    use crate::event::{Event, EventKind};
    use crate::mutation::{self, Actor};
    use crate::{TenantDb, TenantId};
    use chrono::TimeZone;

    struct Fixture {
        _dir: tempfile::TempDir,
        db: TenantDb,
        ctx: MutationContext,
        entry: Entry,
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let db = TenantDb::open(TenantId::new("acme").unwrap(), dir.path().join("a.redb")).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let ctx = MutationContext::at(Actor::Staff("clerk".into()), now);
        let entry_type = mutation::create::<EntryTypeMutation>(
            &db,
            EntryTypeInput {
                name: Some("Providers".into()),
                kind: Some(EntryKind::Provider),
                ..EntryTypeInput::default()
            },
            &ctx,
        )
        .unwrap()
        .model;
        let entry = mutation::create::<EntryMutation>(
            &db,
            EntryInput {
                entry_type: Some(entry_type.id),
                name: Some("Acme".into()),
                document_number: Some("52998224725".into()),
                ..EntryInput::default()
            },
            &ctx,
        )
        .unwrap()
        .model;
        Fixture { _dir: dir, db, ctx, entry }
    }

    impl Fixture {
        fn document(&self, expires: bool) -> Document {
            let input = DocumentInput {
                entry: Some(self.entry.id),
                name: Some("CNDT".into()),
                expires: Some(expires),
                load_type: Some("cndt".into()),
                ..DocumentInput::default()
            };
            mutation::create::<DocumentMutation>(&self.db, input, &self.ctx).unwrap().model
        }

        fn upload(&self, document: DocumentId, expiration: Option<NaiveDate>) -> Result<DocumentFile, CoreError> {
            let input = FileInput {
                file_url: "https://files.acme.gov/cndt.pdf".into(),
                begin_date: Some(date(2026, 1, 1)),
                expiration_date: expiration,
            };
            self.db.write(|tx| add_file(tx, document, input, &self.ctx)).map(|o| o.model)
        }

        fn status(&self, document: DocumentId, today: NaiveDate) -> DocumentStatus {
            self.db
                .read(|tx| {
                    let document = tx.require::<Document>(document.0)?;
                    document_status(tx, &document, today, 15)
                })
                .unwrap()
        }
    }

    #[test]
    fn expiring_documents_require_valid_dates() {
        let f = fixture();
        let document = f.document(true);
        let missing = f.upload(document.id, None).unwrap_err();
        assert_eq!(missing.field_errors()[0].code, ErrorCode::Required);

        let backwards = f.upload(document.id, Some(date(2025, 12, 31))).unwrap_err();
        assert_eq!(backwards.field_errors()[0].code, ErrorCode::Invalid);

        let open_ended = f.document(false);
        assert!(f.upload(open_ended.id, None).is_ok());
    }

    #[test]
    fn approval_workflow_drives_status() {
        let f = fixture();
        let document = f.document(true);
        let today = date(2026, 3, 1);
        assert_eq!(f.status(document.id, today), DocumentStatus::Missing);

        let file = f.upload(document.id, Some(date(2026, 12, 31))).unwrap();
        assert_eq!(file.status, FileStatus::Waiting);
        assert_eq!(f.status(document.id, today), DocumentStatus::Waiting);

        let approved = f.db.write(|tx| approve_file(tx, file.id, &f.ctx)).unwrap();
        assert_eq!(approved.events[0].kind, EventKind::FileApproved);
        assert_eq!(f.status(document.id, today), DocumentStatus::Approved);
        assert_eq!(f.status(document.id, date(2026, 12, 20)), DocumentStatus::Expiring);
        assert_eq!(f.status(document.id, date(2027, 1, 1)), DocumentStatus::Expired);

        let again = f.db.write(|tx| approve_file(tx, file.id, &f.ctx)).unwrap_err();
        assert_eq!(again.field_errors()[0].code, ErrorCode::InvalidStatus);
    }

    #[test]
    fn oversized_warning_window_saturates() {
        let f = fixture();
        let document = f.document(true);
        let file = f.upload(document.id, Some(date(2030, 6, 30))).unwrap();
        let approved = f.db.write(|tx| approve_file(tx, file.id, &f.ctx)).unwrap().model;
        let stored = f.db.read(|tx| tx.require::<Document>(document.id.0)).unwrap();
        let files = [approved];
        let today = date(2026, 3, 1);

        assert_eq!(status_of(&stored, &files, today, 100_000_000), DocumentStatus::Expiring);
        assert_eq!(status_of(&stored, &files, today, i64::MAX), DocumentStatus::Expiring);
        assert_eq!(status_of(&stored, &files, date(2031, 1, 1), i64::MAX), DocumentStatus::Expired);
        assert_eq!(status_of(&stored, &files, today, 0), DocumentStatus::Approved);
    }

    #[test]
    fn refusal_requires_reason() {
        let f = fixture();
        let document = f.document(false);
        let file = f.upload(document.id, None).unwrap();

        let err = f.db.write(|tx| refuse_file(tx, file.id, "  ", &f.ctx)).unwrap_err();
        assert_eq!(err.field_errors()[0].code, ErrorCode::Required);

        let refused = f.db.write(|tx| refuse_file(tx, file.id, "Illegible scan", &f.ctx)).unwrap();
        assert_eq!(refused.model.refusal_reason.as_deref(), Some("Illegible scan"));
        assert_eq!(f.status(document.id, date(2026, 3, 1)), DocumentStatus::Refused);
    }

    #[test]
    fn sweep_records_each_transition_once() {
        let f = fixture();
        let document = f.document(true);
        let file = f.upload(document.id, Some(date(2026, 3, 10))).unwrap();
        f.db.write(|tx| approve_file(tx, file.id, &f.ctx)).unwrap();

        let sweep = |today| f.db.write(|tx| expiration_sweep(tx, today, 15, &f.ctx)).unwrap();
        let first = sweep(date(2026, 3, 1));
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].status, DocumentStatus::Expiring);
        assert!(sweep(date(2026, 3, 2)).is_empty());

        let expired = sweep(date(2026, 3, 11));
        assert_eq!(expired[0].status, DocumentStatus::Expired);
        assert_eq!(expired[0].expiration_date, Some(date(2026, 3, 10)));
        assert!(sweep(date(2026, 3, 12)).is_empty());

        let events = f.db.read(|tx| Ok(tx.list::<Event>()?)).unwrap();
        let expiry_events = events
            .iter()
            .filter(|e| matches!(e.kind, EventKind::DocumentExpiring | EventKind::DocumentExpired))
            .count();
        assert_eq!(expiry_events, 2);
    }

    #[test]
    fn loaded_files_become_active_and_reset_notification() {
        let f = fixture();
        let document = f.document(true);
        let file = f.upload(document.id, Some(date(2026, 3, 5))).unwrap();
        f.db.write(|tx| approve_file(tx, file.id, &f.ctx)).unwrap();
        f.db.write(|tx| expiration_sweep(tx, date(2026, 3, 1), 15, &f.ctx)).unwrap();

        let loaded = f
            .db
            .write(|tx| {
                record_loaded_file(
                    tx,
                    document.id,
                    FileInput {
                        file_url: "https://certidoes.example/cndt/1.pdf".into(),
                        begin_date: Some(date(2026, 3, 1)),
                        expiration_date: Some(date(2026, 9, 1)),
                    },
                    "civic.verification.certificates",
                    &f.ctx,
                )
            })
            .unwrap();
        assert_eq!(loaded.model.status, FileStatus::Approved);
        assert_eq!(loaded.events[0].kind, EventKind::DocumentLoaded);

        let stored = f.db.read(|tx| tx.require::<Document>(document.id.0)).unwrap();
        assert_eq!(stored.active_file, Some(loaded.model.id));
        assert_eq!(stored.expiry_notified, None);
        assert!(stored.is_loadable());
    }

    #[test]
    fn status_filter_and_deletion() {
        let f = fixture();
        let waiting = f.document(false);
        f.upload(waiting.id, None).unwrap();
        let _missing = f.document(false);

        let filter = DocumentFilter {
            status: Some(DocumentStatus::Waiting),
            ..DocumentFilter::default()
        };
        let found = f.db.read(|tx| list_documents(tx, &filter, date(2026, 3, 1), 15)).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, waiting.id);

        mutation::delete::<DocumentMutation>(&f.db, waiting.id.0, &f.ctx).unwrap();
        let files = f.db.read(|tx| Ok(tx.list::<DocumentFile>()?)).unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn invalid_load_type_is_rejected() {
        let f = fixture();
        let input = DocumentInput {
            entry: Some(f.entry.id),
            name: Some("Alvará".into()),
            load_type: Some("Not valid!".into()),
            ..DocumentInput::default()
        };
        let err = mutation::create::<DocumentMutation>(&f.db, input, &f.ctx).unwrap_err();
        assert_eq!(err.field_errors()[0].field.as_deref(), Some("load_type"));
    }
}
