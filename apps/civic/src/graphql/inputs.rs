//! Input objects and their conversion into core inputs.
//!
//! Conversion only decodes global ids; every other rule is enforced by the
//! core mutations. Bad ids are collected so a payload reports all of them.

use super::ids::{self, from_global_id, from_global_ids};
use super::types::{AttributeTargetEnum, DocumentStatusEnum, EntryKindEnum, EventKindEnum, InputTypeEnum};
use async_graphql::{ID, InputObject, MaybeUndefined};
use chrono::NaiveDate;
use civic_core::{
    AttributeId, CategoryId, ChannelId, DocumentId, EntryId, EntryTypeId, FieldError, InvestmentItem,
};

/// Conversion of a GraphQL input into its core counterpart.
pub trait IntoCore {
    type Output;

    fn into_core(self, errors: &mut Vec<FieldError>) -> Self::Output;
}

fn decode(field: &str, id: &ID, kind: &str, errors: &mut Vec<FieldError>) -> Option<u64> {
    from_global_id(field, id, kind).map_err(|e| errors.push(e)).ok()
}

fn decode_opt(field: &str, id: Option<&ID>, kind: &str, errors: &mut Vec<FieldError>) -> Option<u64> {
    id.and_then(|id| decode(field, id, kind, errors))
}

fn decode_list(field: &str, ids: Option<Vec<ID>>, kind: &str, errors: &mut Vec<FieldError>) -> Option<Vec<u64>> {
    ids.map(|ids| from_global_ids(field, &ids, kind, errors))
}

/// `undefined` keeps, `null` clears, a value sets.
fn decode_nullable<T: From<u64>>(
    field: &str,
    id: MaybeUndefined<ID>,
    kind: &str,
    errors: &mut Vec<FieldError>,
) -> Option<Option<T>> {
    match id {
        MaybeUndefined::Undefined => None,
        MaybeUndefined::Null => Some(None),
        MaybeUndefined::Value(id) => decode(field, &id, kind, errors).map(|pk| Some(T::from(pk))),
    }
}

// =============================================================================
// CATALOG
// =============================================================================

#[derive(InputObject, Default)]
pub struct CategoryInput {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
    /// `null` moves the category to the top level.
    pub parent: MaybeUndefined<ID>,
}

impl IntoCore for CategoryInput {
    type Output = civic_core::entry::CategoryInput;

    fn into_core(self, errors: &mut Vec<FieldError>) -> Self::Output {
        civic_core::entry::CategoryInput {
            name: self.name,
            slug: self.slug,
            description: self.description,
            parent: decode_nullable::<CategoryId>("parent", self.parent, ids::CATEGORY, errors),
        }
    }
}

#[derive(InputObject, Default)]
pub struct ChannelInput {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub is_active: Option<bool>,
}

impl IntoCore for ChannelInput {
    type Output = civic_core::entry::ChannelInput;

    fn into_core(self, _errors: &mut Vec<FieldError>) -> Self::Output {
        civic_core::entry::ChannelInput {
            name: self.name,
            slug: self.slug,
            is_active: self.is_active,
        }
    }
}

// =============================================================================
// ATTRIBUTES
// =============================================================================

#[derive(InputObject, Default)]
pub struct AttributeInput {
    pub name: Option<String>,
    pub slug: Option<String>,
    /// Fixed once created.
    pub target: Option<AttributeTargetEnum>,
    /// Fixed once created.
    pub input_type: Option<InputTypeEnum>,
    pub value_required: Option<bool>,
    pub visible_in_website: Option<bool>,
    pub filterable: Option<bool>,
    /// Initial choices for dropdown and multiselect attributes.
    pub values: Option<Vec<String>>,
}

impl IntoCore for AttributeInput {
    type Output = civic_core::attribute::AttributeInput;

    fn into_core(self, _errors: &mut Vec<FieldError>) -> Self::Output {
        civic_core::attribute::AttributeInput {
            name: self.name,
            slug: self.slug,
            target: self.target.map(Into::into),
            input_type: self.input_type.map(Into::into),
            value_required: self.value_required,
            visible_in_website: self.visible_in_website,
            filterable: self.filterable,
            values: self.values.unwrap_or_default(),
        }
    }
}

#[derive(InputObject, Default)]
pub struct AttributeValueInput {
    /// Required when creating.
    pub attribute: Option<ID>,
    pub name: Option<String>,
    pub slug: Option<String>,
    pub sort_order: Option<u32>,
}

impl IntoCore for AttributeValueInput {
    type Output = civic_core::attribute::AttributeValueInput;

    fn into_core(self, errors: &mut Vec<FieldError>) -> Self::Output {
        civic_core::attribute::AttributeValueInput {
            attribute: decode_opt("attribute", self.attribute.as_ref(), ids::ATTRIBUTE, errors).map(AttributeId),
            name: self.name,
            slug: self.slug,
            sort_order: self.sort_order,
        }
    }
}

/// Values for one attribute of an entry or document. Which fields apply
/// depends on the attribute's input type.
#[derive(InputObject, Default)]
pub struct AttributeAssignmentInput {
    pub id: ID,
    /// Choice names, or the number for numeric attributes.
    pub values: Option<Vec<String>>,
    pub boolean: Option<bool>,
    pub date: Option<NaiveDate>,
    pub plain_text: Option<String>,
    pub file_url: Option<String>,
    pub content_type: Option<String>,
    /// Referenced entries.
    pub references: Option<Vec<ID>>,
}

impl IntoCore for AttributeAssignmentInput {
    type Output = Option<civic_core::AttributeAssignmentInput>;

    fn into_core(self, errors: &mut Vec<FieldError>) -> Self::Output {
        let id = decode("attributes", &self.id, ids::ATTRIBUTE, errors);
        let references = decode_list("attributes", self.references, ids::ENTRY, errors).unwrap_or_default();
        Some(civic_core::AttributeAssignmentInput {
            id: AttributeId(id?),
            values: self.values.unwrap_or_default(),
            boolean: self.boolean,
            date: self.date,
            plain_text: self.plain_text,
            file_url: self.file_url,
            content_type: self.content_type,
            references: references.into_iter().map(EntryId).collect(),
        })
    }
}

fn assignments(
    inputs: Option<Vec<AttributeAssignmentInput>>,
    errors: &mut Vec<FieldError>,
) -> Option<Vec<civic_core::AttributeAssignmentInput>> {
    inputs.map(|inputs| inputs.into_iter().filter_map(|input| input.into_core(errors)).collect())
}

// =============================================================================
// ENTRIES
// =============================================================================

#[derive(InputObject, Default)]
pub struct EntryTypeInput {
    pub name: Option<String>,
    pub slug: Option<String>,
    /// Fixed once created.
    pub kind: Option<EntryKindEnum>,
    pub entry_attributes: Option<Vec<ID>>,
    pub document_attributes: Option<Vec<ID>>,
}

impl IntoCore for EntryTypeInput {
    type Output = civic_core::entry::EntryTypeInput;

    fn into_core(self, errors: &mut Vec<FieldError>) -> Self::Output {
        let entry_attributes = decode_list("entry_attributes", self.entry_attributes, ids::ATTRIBUTE, errors);
        let document_attributes =
            decode_list("document_attributes", self.document_attributes, ids::ATTRIBUTE, errors);
        civic_core::entry::EntryTypeInput {
            name: self.name,
            slug: self.slug,
            kind: self.kind.map(Into::into),
            entry_attributes: entry_attributes.map(|ids| ids.into_iter().map(AttributeId).collect()),
            document_attributes: document_attributes.map(|ids| ids.into_iter().map(AttributeId).collect()),
        }
    }
}

#[derive(InputObject, Default)]
pub struct EntryInput {
    /// Required when creating, fixed afterwards.
    pub entry_type: Option<ID>,
    pub name: Option<String>,
    pub slug: Option<String>,
    /// Licence plate for vehicles, CPF or CNPJ for providers.
    pub document_number: Option<String>,
    pub email: Option<String>,
    pub category: MaybeUndefined<ID>,
    pub channels: Option<Vec<ID>>,
    pub is_published: Option<bool>,
    pub attributes: Option<Vec<AttributeAssignmentInput>>,
}

impl IntoCore for EntryInput {
    type Output = civic_core::entry::EntryInput;

    fn into_core(self, errors: &mut Vec<FieldError>) -> Self::Output {
        let entry_type = decode_opt("entry_type", self.entry_type.as_ref(), ids::ENTRY_TYPE, errors);
        let category = decode_nullable::<CategoryId>("category", self.category, ids::CATEGORY, errors);
        let channels = decode_list("channels", self.channels, ids::CHANNEL, errors);
        civic_core::entry::EntryInput {
            entry_type: entry_type.map(EntryTypeId),
            name: self.name,
            slug: self.slug,
            document_number: self.document_number,
            email: self.email,
            category,
            channels: channels.map(|ids| ids.into_iter().map(ChannelId).collect()),
            is_published: self.is_published,
            attributes: assignments(self.attributes, errors),
        }
    }
}

// =============================================================================
// DOCUMENTS
// =============================================================================

#[derive(InputObject, Default)]
pub struct DocumentInput {
    /// Required when creating, fixed afterwards.
    pub entry: Option<ID>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_published: Option<bool>,
    pub expires: Option<bool>,
    /// `manual` or a load type offered by a plugin.
    pub load_type: Option<String>,
    pub attributes: Option<Vec<AttributeAssignmentInput>>,
}

impl IntoCore for DocumentInput {
    type Output = civic_core::document::DocumentInput;

    fn into_core(self, errors: &mut Vec<FieldError>) -> Self::Output {
        let entry = decode_opt("entry", self.entry.as_ref(), ids::ENTRY, errors);
        civic_core::document::DocumentInput {
            entry: entry.map(EntryId),
            name: self.name,
            description: self.description,
            is_published: self.is_published,
            expires: self.expires,
            load_type: self.load_type,
            attributes: assignments(self.attributes, errors),
        }
    }
}

#[derive(InputObject, Default)]
pub struct DefaultDocumentInput {
    pub name: Option<String>,
    pub description: Option<String>,
    /// Entry types whose new entries receive this document.
    pub entry_types: Option<Vec<ID>>,
    pub expires: Option<bool>,
    pub load_type: Option<String>,
}

impl IntoCore for DefaultDocumentInput {
    type Output = civic_core::document::DefaultDocumentInput;

    fn into_core(self, errors: &mut Vec<FieldError>) -> Self::Output {
        let entry_types = decode_list("entry_types", self.entry_types, ids::ENTRY_TYPE, errors);
        civic_core::document::DefaultDocumentInput {
            name: self.name,
            description: self.description,
            entry_types: entry_types.map(|ids| ids.into_iter().map(EntryTypeId).collect()),
            expires: self.expires,
            load_type: self.load_type,
        }
    }
}

#[derive(InputObject)]
pub struct DocumentFileInput {
    pub document: ID,
    pub file_url: String,
    pub begin_date: Option<NaiveDate>,
    /// Required for documents that expire.
    pub expiration_date: Option<NaiveDate>,
}

impl IntoCore for DocumentFileInput {
    type Output = Option<(DocumentId, civic_core::document::FileInput)>;

    fn into_core(self, errors: &mut Vec<FieldError>) -> Self::Output {
        let document = decode("document", &self.document, ids::DOCUMENT, errors)?;
        Some((
            DocumentId(document),
            civic_core::document::FileInput {
                file_url: self.file_url,
                begin_date: self.begin_date,
                expiration_date: self.expiration_date,
            },
        ))
    }
}

// =============================================================================
// INVESTMENTS
// =============================================================================

#[derive(InputObject)]
pub struct InvestmentItemInput {
    pub name: String,
    pub value_cents: i64,
}

#[derive(InputObject, Default)]
pub struct InvestmentInput {
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub is_published: Option<bool>,
    /// Replaces every item.
    pub items: Option<Vec<InvestmentItemInput>>,
}

impl IntoCore for InvestmentInput {
    type Output = civic_core::investment::InvestmentInput;

    fn into_core(self, _errors: &mut Vec<FieldError>) -> Self::Output {
        civic_core::investment::InvestmentInput {
            year: self.year,
            month: self.month,
            is_published: self.is_published,
            items: self.items.map(|items| {
                items
                    .into_iter()
                    .map(|item| InvestmentItem {
                        name: item.name,
                        value_cents: item.value_cents,
                    })
                    .collect()
            }),
        }
    }
}

// =============================================================================
// PLUGINS
// =============================================================================

#[derive(InputObject)]
pub struct PluginConfigValueInput {
    pub key: String,
    /// The mask keeps a stored secret; an empty string clears the key.
    pub value: String,
}

#[derive(InputObject)]
pub struct PluginConfigurationInput {
    pub active: Option<bool>,
    #[graphql(default)]
    pub values: Vec<PluginConfigValueInput>,
}

// =============================================================================
// FILTERS
// =============================================================================

#[derive(InputObject, Default)]
pub struct EntryFilterInput {
    pub entry_type: Option<ID>,
    pub kind: Option<EntryKindEnum>,
    pub category: Option<ID>,
    pub channel: Option<ID>,
    /// Case-insensitive match on name or document number.
    pub search: Option<String>,
}

impl IntoCore for EntryFilterInput {
    type Output = civic_core::entry::EntryFilter;

    fn into_core(self, errors: &mut Vec<FieldError>) -> Self::Output {
        civic_core::entry::EntryFilter {
            entry_type: decode_opt("entry_type", self.entry_type.as_ref(), ids::ENTRY_TYPE, errors).map(EntryTypeId),
            kind: self.kind.map(Into::into),
            category: decode_opt("category", self.category.as_ref(), ids::CATEGORY, errors).map(CategoryId),
            channel: decode_opt("channel", self.channel.as_ref(), ids::CHANNEL, errors).map(ChannelId),
            search: self.search,
            published_only: false,
        }
    }
}

#[derive(InputObject, Default)]
pub struct DocumentFilterInput {
    pub entry: Option<ID>,
    pub status: Option<DocumentStatusEnum>,
}

impl IntoCore for DocumentFilterInput {
    type Output = civic_core::document::DocumentFilter;

    fn into_core(self, errors: &mut Vec<FieldError>) -> Self::Output {
        civic_core::document::DocumentFilter {
            entry: decode_opt("entry", self.entry.as_ref(), ids::ENTRY, errors).map(EntryId),
            status: self.status.map(Into::into),
            published_only: false,
        }
    }
}

#[derive(InputObject, Default)]
pub struct EventFilterInput {
    pub entry: Option<ID>,
    pub document: Option<ID>,
    #[graphql(default)]
    pub kinds: Vec<EventKindEnum>,
}

impl IntoCore for EventFilterInput {
    type Output = civic_core::event::EventFilter;

    fn into_core(self, errors: &mut Vec<FieldError>) -> Self::Output {
        civic_core::event::EventFilter {
            entry: decode_opt("entry", self.entry.as_ref(), ids::ENTRY, errors).map(EntryId),
            document: decode_opt("document", self.document.as_ref(), ids::DOCUMENT, errors).map(DocumentId),
            kinds: self.kinds.into_iter().map(Into::into).collect(),
        }
    }
}
