//! # Catalog
//!
//! Categories, channels, entry types and the entries (vehicles and
//! providers) whose documents a tenant tracks.

use crate::assignment::{
    AssignedAttribute, AttributeAssignment, AttributeAssignmentInput, AttributeOwner, CleanedAttribute,
    delete_owner_values,
};
use crate::attribute::{Attribute, AttributeTarget, AttributeValue, detach_everywhere};
use crate::document::{DefaultDocument, delete_entry_documents, instantiate_defaults};
use crate::error::{CoreError, ErrorCode, FieldError};
use crate::event::{EventDraft, EventKind};
use crate::mutation::{Change, ModelMutation, MutationContext, clean_name, clean_slug, clean_text, finish};
use crate::storage::{Reader, WriteTx, record};
use crate::validation::{validate_email, validate_plate, validate_taxpayer_number};
use crate::{AttributeId, CategoryId, ChannelId, EntryId, EntryTypeId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// MODELS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub parent: Option<CategoryId>,
}

record!(Category, id, "category", "categories");

/// A publication channel (for example the public site or an internal list).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: ChannelId,
    pub name: String,
    pub slug: String,
    pub is_active: bool,
}

record!(Channel, id, "channel", "channels");

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntryKind {
    Vehicle,
    Provider,
}

impl EntryKind {
    /// Normalize a document number for this kind: a licence plate for
    /// vehicles, a CPF or CNPJ for providers.
    #[must_use]
    pub fn normalize_document_number(&self, raw: &str) -> Option<String> {
        match self {
            Self::Vehicle => validate_plate(raw),
            Self::Provider => validate_taxpayer_number(raw),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryType {
    pub id: EntryTypeId,
    pub name: String,
    pub slug: String,
    pub kind: EntryKind,
    /// Attributes entries of this type may carry.
    pub entry_attributes: Vec<AttributeId>,
    /// Attributes documents of entries of this type may carry.
    pub document_attributes: Vec<AttributeId>,
}

record!(EntryType, id, "entry type", "entry_types");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub id: EntryId,
    pub entry_type: EntryTypeId,
    pub name: String,
    pub slug: String,
    /// Plate for vehicles, CPF/CNPJ digits for providers.
    pub document_number: String,
    pub email: Option<String>,
    pub category: Option<CategoryId>,
    pub channels: Vec<ChannelId>,
    pub is_published: bool,
    pub attributes: Vec<AssignedAttribute>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

record!(Entry, id, "entry", "entries");

// =============================================================================
// QUERIES
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct EntryFilter {
    pub entry_type: Option<EntryTypeId>,
    pub kind: Option<EntryKind>,
    pub category: Option<CategoryId>,
    pub channel: Option<ChannelId>,
    /// Case-insensitive match on name, slug or document number.
    pub search: Option<String>,
    pub published_only: bool,
}

pub fn list_entries(reader: &impl Reader, filter: &EntryFilter) -> Result<Vec<Entry>, CoreError> {
    let kinds: Option<Vec<EntryTypeId>> = match filter.kind {
        Some(kind) => Some(
            reader
                .filter::<EntryType>(|t| t.kind == kind)?
                .into_iter()
                .map(|t| t.id)
                .collect(),
        ),
        None => None,
    };
    let search = filter.search.as_deref().map(str::to_lowercase);

    Ok(reader.filter::<Entry>(|entry| {
        filter.entry_type.is_none_or(|t| entry.entry_type == t)
            && kinds.as_ref().is_none_or(|types| types.contains(&entry.entry_type))
            && filter.category.is_none_or(|c| entry.category == Some(c))
            && filter.channel.is_none_or(|c| entry.channels.contains(&c))
            && (!filter.published_only || entry.is_published)
            && search.as_deref().is_none_or(|needle| {
                entry.name.to_lowercase().contains(needle)
                    || entry.slug.contains(needle)
                    || entry.document_number.to_lowercase().contains(needle)
            })
    })?)
}

/// Categories whose parent is `parent` (roots when `None`).
pub fn child_categories(reader: &impl Reader, parent: Option<CategoryId>) -> Result<Vec<Category>, CoreError> {
    Ok(reader.filter::<Category>(|c| c.parent == parent)?)
}

// =============================================================================
// CATEGORY
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct CategoryInput {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
    /// `Some(None)` moves the category to the root.
    pub parent: Option<Option<CategoryId>>,
}

#[derive(Debug)]
pub struct CleanedCategoryInput {
    name: Option<String>,
    slug: Option<String>,
    description: Option<Option<String>>,
    parent: Option<Option<CategoryId>>,
}

pub struct CategoryMutation;

impl ModelMutation for CategoryMutation {
    type Model = Category;
    type Input = CategoryInput;
    type Cleaned = CleanedCategoryInput;

    fn clean_input(
        tx: &WriteTx,
        instance: Option<&Category>,
        input: CategoryInput,
        _ctx: &MutationContext,
    ) -> Result<CleanedCategoryInput, CoreError> {
        let creating = instance.is_none();
        let own_id = instance.map(|c| c.id);
        let categories = tx.list::<Category>()?;
        let mut errors = Vec::new();

        let name = clean_name(&mut errors, "name", input.name, creating);
        let slug = clean_slug(
            &mut errors,
            input.slug,
            if creating { name.as_deref() } else { None },
            "category",
            |candidate| categories.iter().any(|c| c.slug == candidate && Some(c.id) != own_id),
        );
        let description = clean_text(&mut errors, "description", input.description);

        if let Some(Some(parent)) = input.parent {
            if !categories.iter().any(|c| c.id == parent) {
                errors.push(FieldError::new("parent", ErrorCode::NotFound, "Parent category not found."));
            } else if let Some(own_id) = own_id {
                // Walk up from the new parent; reaching ourselves means a cycle.
                let mut cursor = Some(parent);
                let mut steps = 0;
                while let Some(current) = cursor {
                    if current == own_id {
                        errors.push(FieldError::new(
                            "parent",
                            ErrorCode::Invalid,
                            "A category cannot be its own ancestor.",
                        ));
                        break;
                    }
                    steps += 1;
                    if steps > categories.len() {
                        break;
                    }
                    cursor = categories.iter().find(|c| c.id == current).and_then(|c| c.parent);
                }
            }
        }

        finish(errors, || CleanedCategoryInput {
            name,
            slug,
            description,
            parent: input.parent,
        })
    }

    fn save(
        tx: &mut WriteTx,
        instance: Option<Category>,
        cleaned: CleanedCategoryInput,
        _ctx: &MutationContext,
    ) -> Result<Category, CoreError> {
        let mut category = instance.unwrap_or(Category {
            id: CategoryId(0),
            name: String::new(),
            slug: String::new(),
            description: None,
            parent: None,
        });
        if let Some(name) = cleaned.name {
            category.name = name;
        }
        if let Some(slug) = cleaned.slug {
            category.slug = slug;
        }
        if let Some(description) = cleaned.description {
            category.description = description;
        }
        if let Some(parent) = cleaned.parent {
            category.parent = parent;
        }
        if category.id.0 == 0 {
            Ok(tx.insert(category)?)
        } else {
            tx.put(&category)?;
            Ok(category)
        }
    }

    fn before_delete(tx: &mut WriteTx, model: &Category, _ctx: &MutationContext) -> Result<(), CoreError> {
        for mut child in tx.filter::<Category>(|c| c.parent == Some(model.id))? {
            child.parent = None;
            tx.put(&child)?;
        }
        for mut entry in tx.filter::<Entry>(|e| e.category == Some(model.id))? {
            entry.category = None;
            tx.put(&entry)?;
        }
        Ok(())
    }
}

// =============================================================================
// CHANNEL
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct ChannelInput {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug)]
pub struct CleanedChannelInput {
    name: Option<String>,
    slug: Option<String>,
    is_active: Option<bool>,
}

pub struct ChannelMutation;

impl ModelMutation for ChannelMutation {
    type Model = Channel;
    type Input = ChannelInput;
    type Cleaned = CleanedChannelInput;

    fn clean_input(
        tx: &WriteTx,
        instance: Option<&Channel>,
        input: ChannelInput,
        _ctx: &MutationContext,
    ) -> Result<CleanedChannelInput, CoreError> {
        let creating = instance.is_none();
        let own_id = instance.map(|c| c.id);
        let channels = tx.list::<Channel>()?;
        let mut errors = Vec::new();

        let name = clean_name(&mut errors, "name", input.name, creating);
        let slug = clean_slug(
            &mut errors,
            input.slug,
            if creating { name.as_deref() } else { None },
            "channel",
            |candidate| channels.iter().any(|c| c.slug == candidate && Some(c.id) != own_id),
        );

        finish(errors, || CleanedChannelInput {
            name,
            slug,
            is_active: input.is_active,
        })
    }

    fn save(
        tx: &mut WriteTx,
        instance: Option<Channel>,
        cleaned: CleanedChannelInput,
        _ctx: &MutationContext,
    ) -> Result<Channel, CoreError> {
        match instance {
            Some(mut channel) => {
                if let Some(name) = cleaned.name {
                    channel.name = name;
                }
                if let Some(slug) = cleaned.slug {
                    channel.slug = slug;
                }
                if let Some(active) = cleaned.is_active {
                    channel.is_active = active;
                }
                tx.put(&channel)?;
                Ok(channel)
            }
            None => Ok(tx.insert(Channel {
                id: ChannelId(0),
                name: cleaned.name.unwrap_or_default(),
                slug: cleaned.slug.unwrap_or_default(),
                is_active: cleaned.is_active.unwrap_or(true),
            })?),
        }
    }

    fn before_delete(tx: &mut WriteTx, model: &Channel, _ctx: &MutationContext) -> Result<(), CoreError> {
        for mut entry in tx.filter::<Entry>(|e| e.channels.contains(&model.id))? {
            entry.channels.retain(|c| *c != model.id);
            tx.put(&entry)?;
        }
        Ok(())
    }
}

// =============================================================================
// ENTRY TYPE
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct EntryTypeInput {
    pub name: Option<String>,
    pub slug: Option<String>,
    /// Set on creation only.
    pub kind: Option<EntryKind>,
    pub entry_attributes: Option<Vec<AttributeId>>,
    pub document_attributes: Option<Vec<AttributeId>>,
}

#[derive(Debug)]
pub struct CleanedEntryTypeInput {
    name: Option<String>,
    slug: Option<String>,
    kind: Option<EntryKind>,
    entry_attributes: Option<Vec<AttributeId>>,
    document_attributes: Option<Vec<AttributeId>>,
}

fn clean_attribute_list(
    reader: &impl Reader,
    errors: &mut Vec<FieldError>,
    field: &str,
    target: AttributeTarget,
    ids: Option<Vec<AttributeId>>,
) -> Result<Option<Vec<AttributeId>>, CoreError> {
    let Some(ids) = ids else {
        return Ok(None);
    };
    let mut cleaned = Vec::with_capacity(ids.len());
    let mut missing = Vec::new();
    let mut wrong_target = Vec::new();
    let mut duplicated = Vec::new();
    for id in ids {
        if cleaned.contains(&id) {
            duplicated.push(id);
            continue;
        }
        match reader.get::<Attribute>(id.0)? {
            None => missing.push(id),
            Some(attribute) if attribute.target != target => wrong_target.push(id),
            Some(_) => cleaned.push(id),
        }
    }
    if !missing.is_empty() {
        errors.push(FieldError::new(field, ErrorCode::NotFound, "Attribute not found.").with_attributes(missing));
    }
    if !wrong_target.is_empty() {
        errors.push(
            FieldError::new(field, ErrorCode::Invalid, "Attribute targets a different model.")
                .with_attributes(wrong_target),
        );
    }
    if !duplicated.is_empty() {
        errors.push(
            FieldError::new(field, ErrorCode::DuplicatedInputItem, "Duplicated attribute.").with_attributes(duplicated),
        );
    }
    Ok(Some(cleaned))
}

pub struct EntryTypeMutation;

impl ModelMutation for EntryTypeMutation {
    type Model = EntryType;
    type Input = EntryTypeInput;
    type Cleaned = CleanedEntryTypeInput;

    fn clean_input(
        tx: &WriteTx,
        instance: Option<&EntryType>,
        input: EntryTypeInput,
        _ctx: &MutationContext,
    ) -> Result<CleanedEntryTypeInput, CoreError> {
        let creating = instance.is_none();
        let own_id = instance.map(|t| t.id);
        let types = tx.list::<EntryType>()?;
        let mut errors = Vec::new();

        let name = clean_name(&mut errors, "name", input.name, creating);
        let slug = clean_slug(
            &mut errors,
            input.slug,
            if creating { name.as_deref() } else { None },
            "entry-type",
            |candidate| types.iter().any(|t| t.slug == candidate && Some(t.id) != own_id),
        );

        match (instance, input.kind) {
            (None, None) => errors.push(FieldError::required("kind")),
            (Some(current), Some(kind)) if current.kind != kind => {
                errors.push(FieldError::new("kind", ErrorCode::Invalid, "Entry type kind cannot be changed."));
            }
            _ => {}
        }

        let entry_attributes = clean_attribute_list(
            tx,
            &mut errors,
            "entry_attributes",
            AttributeTarget::Entry,
            input.entry_attributes,
        )?;
        let document_attributes = clean_attribute_list(
            tx,
            &mut errors,
            "document_attributes",
            AttributeTarget::Document,
            input.document_attributes,
        )?;

        finish(errors, || CleanedEntryTypeInput {
            name,
            slug,
            kind: input.kind,
            entry_attributes,
            document_attributes,
        })
    }

    fn save(
        tx: &mut WriteTx,
        instance: Option<EntryType>,
        cleaned: CleanedEntryTypeInput,
        _ctx: &MutationContext,
    ) -> Result<EntryType, CoreError> {
        match instance {
            Some(mut entry_type) => {
                if let Some(name) = cleaned.name {
                    entry_type.name = name;
                }
                if let Some(slug) = cleaned.slug {
                    entry_type.slug = slug;
                }
                if let Some(attributes) = cleaned.entry_attributes {
                    entry_type.entry_attributes = attributes;
                }
                if let Some(attributes) = cleaned.document_attributes {
                    entry_type.document_attributes = attributes;
                }
                tx.put(&entry_type)?;
                Ok(entry_type)
            }
            None => Ok(tx.insert(EntryType {
                id: EntryTypeId(0),
                name: cleaned.name.unwrap_or_default(),
                slug: cleaned.slug.unwrap_or_default(),
                kind: cleaned.kind.unwrap_or(EntryKind::Provider),
                entry_attributes: cleaned.entry_attributes.unwrap_or_default(),
                document_attributes: cleaned.document_attributes.unwrap_or_default(),
            })?),
        }
    }

    fn before_delete(tx: &mut WriteTx, model: &EntryType, _ctx: &MutationContext) -> Result<(), CoreError> {
        if tx.find::<Entry>(|e| e.entry_type == model.id)?.is_some() {
            return Err(CoreError::Validation(vec![FieldError::new(
                "id",
                ErrorCode::Invalid,
                "Entry type still has entries and cannot be deleted.",
            )]));
        }
        for mut default in tx.filter::<DefaultDocument>(|d| d.entry_types.contains(&model.id))? {
            default.entry_types.retain(|t| *t != model.id);
            tx.put(&default)?;
        }
        Ok(())
    }
}

// =============================================================================
// ENTRY
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct EntryInput {
    /// Set on creation only.
    pub entry_type: Option<EntryTypeId>,
    pub name: Option<String>,
    pub slug: Option<String>,
    pub document_number: Option<String>,
    /// An empty string clears the address.
    pub email: Option<String>,
    /// `Some(None)` removes the category.
    pub category: Option<Option<CategoryId>>,
    pub channels: Option<Vec<ChannelId>>,
    pub is_published: Option<bool>,
    pub attributes: Option<Vec<AttributeAssignmentInput>>,
}

#[derive(Debug)]
pub struct CleanedEntryInput {
    entry_type: EntryTypeId,
    name: Option<String>,
    slug: Option<String>,
    document_number: Option<String>,
    email: Option<Option<String>>,
    category: Option<Option<CategoryId>>,
    channels: Option<Vec<ChannelId>>,
    is_published: Option<bool>,
    attributes: Vec<CleanedAttribute>,
}

pub struct EntryMutation;

impl ModelMutation for EntryMutation {
    type Model = Entry;
    type Input = EntryInput;
    type Cleaned = CleanedEntryInput;

    fn clean_input(
        tx: &WriteTx,
        instance: Option<&Entry>,
        input: EntryInput,
        _ctx: &MutationContext,
    ) -> Result<CleanedEntryInput, CoreError> {
        let creating = instance.is_none();
        let own_id = instance.map(|e| e.id);
        let mut errors = Vec::new();

        let type_id = match (instance, input.entry_type) {
            (Some(entry), Some(requested)) if requested != entry.entry_type => {
                errors.push(FieldError::new(
                    "entry_type",
                    ErrorCode::Invalid,
                    "Entry type cannot be changed.",
                ));
                entry.entry_type
            }
            (Some(entry), _) => entry.entry_type,
            (None, Some(requested)) => requested,
            (None, None) => {
                errors.push(FieldError::required("entry_type"));
                return Err(CoreError::Validation(errors));
            }
        };
        let Some(entry_type) = tx.get::<EntryType>(type_id.0)? else {
            errors.push(FieldError::new("entry_type", ErrorCode::NotFound, "Entry type not found."));
            return Err(CoreError::Validation(errors));
        };

        let entries = tx.list::<Entry>()?;
        let name = clean_name(&mut errors, "name", input.name, creating);
        let slug = clean_slug(
            &mut errors,
            input.slug,
            if creating { name.as_deref() } else { None },
            "entry",
            |candidate| entries.iter().any(|e| e.slug == candidate && Some(e.id) != own_id),
        );

        let document_number = match input.document_number {
            None if creating => {
                errors.push(FieldError::required("document_number"));
                None
            }
            None => None,
            Some(raw) => match entry_type.kind.normalize_document_number(&raw) {
                None => {
                    let message = match entry_type.kind {
                        EntryKind::Vehicle => "Invalid licence plate.",
                        EntryKind::Provider => "Invalid CPF or CNPJ.",
                    };
                    errors.push(FieldError::new("document_number", ErrorCode::Invalid, message));
                    None
                }
                Some(number) if entries.iter().any(|e| e.document_number == number && Some(e.id) != own_id) => {
                    errors.push(FieldError::new(
                        "document_number",
                        ErrorCode::Unique,
                        "An entry with this document number already exists.",
                    ));
                    None
                }
                Some(number) => Some(number),
            },
        };

        let email = match input.email.map(|e| e.trim().to_string()) {
            None => None,
            Some(e) if e.is_empty() => Some(None),
            Some(e) => match validate_email(&e) {
                Some(email) => Some(Some(email)),
                None => {
                    errors.push(FieldError::new("email", ErrorCode::Invalid, "Enter a valid email address."));
                    None
                }
            },
        };

        if let Some(Some(category)) = input.category {
            if !tx.exists::<Category>(category.0)? {
                errors.push(FieldError::new("category", ErrorCode::NotFound, "Category not found."));
            }
        }

        let channels = match input.channels {
            None => None,
            Some(ids) => {
                let mut unique = Vec::with_capacity(ids.len());
                for id in ids {
                    if unique.contains(&id) {
                        continue;
                    }
                    if tx.exists::<Channel>(id.0)? {
                        unique.push(id);
                    } else {
                        errors.push(FieldError::new("channels", ErrorCode::NotFound, format!("Channel {id} not found.")));
                    }
                }
                Some(unique)
            }
        };

        let attributes = match AttributeAssignment::clean_input(
            tx,
            &entry_type.entry_attributes,
            AttributeTarget::Entry,
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

        finish(errors, || CleanedEntryInput {
            entry_type: type_id,
            name,
            slug,
            document_number,
            email,
            category: input.category,
            channels,
            is_published: input.is_published,
            attributes,
        })
    }

    fn save(
        tx: &mut WriteTx,
        instance: Option<Entry>,
        cleaned: CleanedEntryInput,
        ctx: &MutationContext,
    ) -> Result<Entry, CoreError> {
        let creating = instance.is_none();
        let mut entry = match instance {
            Some(entry) => entry,
            None => tx.insert(Entry {
                id: EntryId(0),
                entry_type: cleaned.entry_type,
                name: String::new(),
                slug: String::new(),
                document_number: String::new(),
                email: None,
                category: None,
                channels: Vec::new(),
                is_published: false,
                attributes: Vec::new(),
                created_at: ctx.now,
                updated_at: ctx.now,
            })?,
        };

        if let Some(name) = cleaned.name {
            entry.name = name;
        }
        if let Some(slug) = cleaned.slug {
            entry.slug = slug;
        }
        if let Some(number) = cleaned.document_number {
            entry.document_number = number;
        }
        if let Some(email) = cleaned.email {
            entry.email = email;
        }
        if let Some(category) = cleaned.category {
            entry.category = category;
        }
        if let Some(channels) = cleaned.channels {
            entry.channels = channels;
        }
        if let Some(published) = cleaned.is_published {
            entry.is_published = published;
        }
        AttributeAssignment::save(tx, AttributeOwner::Entry(entry.id), &mut entry.attributes, cleaned.attributes)?;
        entry.updated_at = ctx.now;
        tx.put(&entry)?;

        if creating {
            let documents = instantiate_defaults(tx, &entry, ctx)?;
            tracing::debug!(entry = %entry.id, documents = documents.len(), "instantiated default documents");
        }
        Ok(entry)
    }

    fn before_delete(tx: &mut WriteTx, model: &Entry, ctx: &MutationContext) -> Result<(), CoreError> {
        delete_entry_documents(tx, model.id, ctx)?;
        delete_owner_values(tx, AttributeOwner::Entry(model.id))?;
        let references = tx.remove_where::<AttributeValue>(|v| v.reference == Some(model.id))?;
        for value in references {
            detach_everywhere(tx, None, Some(value.id))?;
        }
        Ok(())
    }

    fn events(model: &Entry, change: Change) -> Vec<EventDraft> {
        let kind = match change {
            Change::Created => EventKind::EntryCreated,
            Change::Updated => EventKind::EntryUpdated,
            Change::Deleted => EventKind::EntryDeleted,
        };
        vec![EventDraft::new(kind).entry(model.id).message(model.name.clone())]
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]

    use super::*;
    use crate::attribute::{AttributeInput, AttributeMutation, InputType};
    use crate::document::{DefaultDocumentInput, DefaultDocumentMutation, Document};
    use crate::event::Event;
    use crate::mutation::{self, Actor};
    use crate::{TenantDb, TenantId};

    fn setup() -> (tempfile::TempDir, TenantDb, MutationContext) {
        let dir = tempfile::tempdir().unwrap();
        let db = TenantDb::open(TenantId::new("acme").unwrap(), dir.path().join("a.redb")).unwrap();
        (dir, db, MutationContext::new(Actor::Staff("clerk".into())))
    }

    fn entry_type(db: &TenantDb, ctx: &MutationContext, kind: EntryKind, attributes: Vec<AttributeId>) -> EntryType {
        let input = EntryTypeInput {
            name: Some(format!("{kind:?}s")),
            kind: Some(kind),
            entry_attributes: Some(attributes),
            ..EntryTypeInput::default()
        };
        mutation::create::<EntryTypeMutation>(db, input, ctx).unwrap().model
    }

    fn provider(entry_type: EntryTypeId, name: &str, number: &str) -> EntryInput {
        EntryInput {
            entry_type: Some(entry_type),
            name: Some(name.into()),
            document_number: Some(number.into()),
            ..EntryInput::default()
        }
    }

    fn validation(err: CoreError) -> Vec<FieldError> {
        match err {
            CoreError::Validation(errors) => errors,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn provider_document_numbers_are_normalized_and_unique() {
        let (_dir, db, ctx) = setup();
        let providers = entry_type(&db, &ctx, EntryKind::Provider, vec![]);

        let created = mutation::create::<EntryMutation>(&db, provider(providers.id, "Transportes Ágil", "11.222.333/0001-81"), &ctx)
            .unwrap();
        assert_eq!(created.model.document_number, "11222333000181");
        assert_eq!(created.model.slug, "transportes-agil");
        assert_eq!(created.events[0].kind, EventKind::EntryCreated);
        assert_eq!(created.events[0].actor.as_deref(), Some("clerk"));

        let duplicate = mutation::create::<EntryMutation>(&db, provider(providers.id, "Other", "11222333000181"), &ctx)
            .unwrap_err();
        assert_eq!(validation(duplicate)[0].code, ErrorCode::Unique);

        let invalid = mutation::create::<EntryMutation>(&db, provider(providers.id, "Bad", "123"), &ctx).unwrap_err();
        assert_eq!(validation(invalid)[0].field.as_deref(), Some("document_number"));
    }

    #[test]
    fn vehicles_take_plates() {
        let (_dir, db, ctx) = setup();
        let vehicles = entry_type(&db, &ctx, EntryKind::Vehicle, vec![]);
        let bus = mutation::create::<EntryMutation>(&db, provider(vehicles.id, "Bus 12", "bra-2e19"), &ctx).unwrap();
        assert_eq!(bus.model.document_number, "BRA2E19");

        let cpf = mutation::create::<EntryMutation>(&db, provider(vehicles.id, "Bus 13", "529.982.247-25"), &ctx);
        assert!(cpf.is_err());
    }

    #[test]
    fn missing_required_fields_are_all_reported() {
        let (_dir, db, ctx) = setup();
        let providers = entry_type(&db, &ctx, EntryKind::Provider, vec![]);
        let input = EntryInput {
            entry_type: Some(providers.id),
            email: Some("nope".into()),
            ..EntryInput::default()
        };
        let fields: Vec<_> = validation(mutation::create::<EntryMutation>(&db, input, &ctx).unwrap_err())
            .into_iter()
            .filter_map(|e| e.field)
            .collect();
        assert_eq!(fields, vec!["name", "document_number", "email"]);
    }

    #[test]
    fn entry_attributes_must_belong_to_type() {
        let (_dir, db, ctx) = setup();
        let seats = mutation::create::<AttributeMutation>(
            &db,
            AttributeInput {
                name: Some("Seats".into()),
                target: Some(AttributeTarget::Entry),
                input_type: Some(InputType::Numeric),
                value_required: Some(true),
                ..AttributeInput::default()
            },
            &ctx,
        )
        .unwrap()
        .model;
        let vehicles = entry_type(&db, &ctx, EntryKind::Vehicle, vec![seats.id]);

        let missing = mutation::create::<EntryMutation>(&db, provider(vehicles.id, "Van", "ABC1234"), &ctx).unwrap_err();
        let errors = validation(missing);
        assert_eq!(errors[0].field.as_deref(), Some("attributes"));
        assert_eq!(errors[0].attributes, vec![seats.id]);

        let mut input = provider(vehicles.id, "Van", "ABC1234");
        input.attributes = Some(vec![AttributeAssignmentInput {
            id: seats.id,
            values: vec!["15".into()],
            ..AttributeAssignmentInput::default()
        }]);
        let van = mutation::create::<EntryMutation>(&db, input, &ctx).unwrap().model;
        assert_eq!(van.attributes.len(), 1);
    }

    #[test]
    fn creating_entry_instantiates_default_documents() {
        let (_dir, db, ctx) = setup();
        let providers = entry_type(&db, &ctx, EntryKind::Provider, vec![]);
        mutation::create::<DefaultDocumentMutation>(
            &db,
            DefaultDocumentInput {
                name: Some("CND Federal".into()),
                entry_types: Some(vec![providers.id]),
                expires: Some(true),
                ..DefaultDocumentInput::default()
            },
            &ctx,
        )
        .unwrap();

        let entry = mutation::create::<EntryMutation>(&db, provider(providers.id, "Acme", "52998224725"), &ctx)
            .unwrap()
            .model;
        let documents = db.read(|tx| Ok(tx.filter::<Document>(|d| d.entry == entry.id)?)).unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].name, "CND Federal");
        assert!(documents[0].expires);

        mutation::delete::<EntryMutation>(&db, entry.id.0, &ctx).unwrap();
        let remaining = db.read(|tx| Ok(tx.list::<Document>()?)).unwrap();
        assert!(remaining.is_empty());
        let events = db.read(|tx| Ok(tx.list::<Event>()?)).unwrap();
        assert!(events.iter().any(|e| e.kind == EventKind::EntryDeleted));
    }

    #[test]
    fn entry_type_with_entries_cannot_be_deleted() {
        let (_dir, db, ctx) = setup();
        let providers = entry_type(&db, &ctx, EntryKind::Provider, vec![]);
        mutation::create::<EntryMutation>(&db, provider(providers.id, "Acme", "52998224725"), &ctx).unwrap();
        let err = mutation::delete::<EntryTypeMutation>(&db, providers.id.0, &ctx).unwrap_err();
        assert!(err.is_validation());
        assert!(db.read(|tx| Ok(tx.exists::<EntryType>(providers.id.0)?)).unwrap());
    }

    #[test]
    fn entry_type_attributes_must_match_target() {
        let (_dir, db, ctx) = setup();
        let doc_attr = mutation::create::<AttributeMutation>(
            &db,
            AttributeInput {
                name: Some("Issuer".into()),
                target: Some(AttributeTarget::Document),
                input_type: Some(InputType::PlainText),
                ..AttributeInput::default()
            },
            &ctx,
        )
        .unwrap()
        .model;
        let input = EntryTypeInput {
            name: Some("Buses".into()),
            kind: Some(EntryKind::Vehicle),
            entry_attributes: Some(vec![doc_attr.id, AttributeId(77)]),
            ..EntryTypeInput::default()
        };
        let errors = validation(mutation::create::<EntryTypeMutation>(&db, input, &ctx).unwrap_err());
        let codes: Vec<_> = errors.iter().map(|e| e.code).collect();
        assert_eq!(codes, vec![ErrorCode::NotFound, ErrorCode::Invalid]);
    }

    #[test]
    fn category_cycles_are_rejected_and_delete_reparents() {
        let (_dir, db, ctx) = setup();
        let create = |name: &str, parent: Option<CategoryId>| {
            mutation::create::<CategoryMutation>(
                &db,
                CategoryInput {
                    name: Some(name.into()),
                    parent: Some(parent),
                    ..CategoryInput::default()
                },
                &ctx,
            )
            .unwrap()
            .model
        };
        let root = create("Transporte", None);
        let child = create("Escolar", Some(root.id));
        let grandchild = create("Rural", Some(child.id));

        let cycle = CategoryInput {
            parent: Some(Some(grandchild.id)),
            ..CategoryInput::default()
        };
        assert!(mutation::update::<CategoryMutation>(&db, root.id.0, cycle, &ctx).is_err());

        mutation::delete::<CategoryMutation>(&db, child.id.0, &ctx).unwrap();
        let orphan = db.read(|tx| tx.require::<Category>(grandchild.id.0)).unwrap();
        assert_eq!(orphan.parent, None);
        assert_eq!(db.read(|tx| child_categories(tx, None)).unwrap().len(), 2);
    }

    #[test]
    fn channel_delete_detaches_entries_and_filters_work() {
        let (_dir, db, ctx) = setup();
        let providers = entry_type(&db, &ctx, EntryKind::Provider, vec![]);
        let site = mutation::create::<ChannelMutation>(
            &db,
            ChannelInput {
                name: Some("Site".into()),
                ..ChannelInput::default()
            },
            &ctx,
        )
        .unwrap()
        .model;
        let mut input = provider(providers.id, "Acme", "52998224725");
        input.channels = Some(vec![site.id, site.id]);
        input.is_published = Some(true);
        let acme = mutation::create::<EntryMutation>(&db, input, &ctx).unwrap().model;
        assert_eq!(acme.channels, vec![site.id]);
        mutation::create::<EntryMutation>(&db, provider(providers.id, "Hidden", "11222333000181"), &ctx).unwrap();

        let filter = EntryFilter {
            published_only: true,
            ..EntryFilter::default()
        };
        assert_eq!(db.read(|tx| list_entries(tx, &filter)).unwrap().len(), 1);
        let search = EntryFilter {
            search: Some("529982".into()),
            kind: Some(EntryKind::Provider),
            ..EntryFilter::default()
        };
        assert_eq!(db.read(|tx| list_entries(tx, &search)).unwrap()[0].id, acme.id);

        mutation::delete::<ChannelMutation>(&db, site.id.0, &ctx).unwrap();
        let acme = db.read(|tx| tx.require::<Entry>(acme.id.0)).unwrap();
        assert!(acme.channels.is_empty());
    }
}
