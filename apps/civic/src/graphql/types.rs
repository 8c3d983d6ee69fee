//! Output types of the schema.
//!
//! Nodes wrap core models; relations are resolved lazily against the
//! request's tenant database.

use super::ids::{self, to_global_id};
use super::{RequestContext, request_context};
use crate::plugins::{Capability, Plugin, PluginsManager};
use async_graphql::{Context, Enum, ID, Object, Result, SimpleObject};
use chrono::{DateTime, NaiveDate, Utc};
use civic_core::assignment::resolve_assignments;
use civic_core::attribute::values_of;
use civic_core::document::{DocumentFilter, document_status, files_of, list_documents};
use civic_core::system::compliance_summary;
use civic_core::{
    AssignedAttribute, Attribute, AttributeValue, Category, Channel, ComplianceSummary, DefaultDocument, Document,
    DocumentFile, Entry, EntryType, Event, FieldError, FileStatus, Investment, PluginConfiguration, Reader, Tenant,
};

// =============================================================================
// ENUMS
// =============================================================================

#[derive(Enum, Debug, Copy, Clone, Eq, PartialEq)]
#[graphql(name = "EntryKind", remote = "civic_core::EntryKind")]
pub enum EntryKindEnum {
    Vehicle,
    Provider,
}

#[derive(Enum, Debug, Copy, Clone, Eq, PartialEq)]
#[graphql(name = "AttributeTarget", remote = "civic_core::AttributeTarget")]
pub enum AttributeTargetEnum {
    Entry,
    Document,
}

#[derive(Enum, Debug, Copy, Clone, Eq, PartialEq)]
#[graphql(name = "AttributeInputType", remote = "civic_core::InputType")]
pub enum InputTypeEnum {
    Dropdown,
    Multiselect,
    PlainText,
    Boolean,
    Date,
    File,
    Reference,
    Numeric,
}

#[derive(Enum, Debug, Copy, Clone, Eq, PartialEq)]
#[graphql(name = "DocumentStatus", remote = "civic_core::DocumentStatus")]
pub enum DocumentStatusEnum {
    Missing,
    Waiting,
    Approved,
    Expiring,
    Expired,
    Refused,
}

#[derive(Enum, Debug, Copy, Clone, Eq, PartialEq)]
#[graphql(name = "DocumentFileStatus", remote = "civic_core::FileStatus")]
pub enum FileStatusEnum {
    Waiting,
    Approved,
    Refused,
}

#[derive(Enum, Debug, Copy, Clone, Eq, PartialEq)]
#[graphql(name = "EventKind", remote = "civic_core::EventKind")]
pub enum EventKindEnum {
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

#[derive(Enum, Debug, Copy, Clone, Eq, PartialEq)]
#[graphql(name = "ErrorCode", remote = "civic_core::ErrorCode")]
pub enum ErrorCodeEnum {
    Required,
    Invalid,
    NotFound,
    Unique,
    DuplicatedInputItem,
    InvalidStatus,
    PermissionDenied,
    GraphqlError,
    PluginError,
}

#[derive(Enum, Debug, Copy, Clone, Eq, PartialEq)]
#[graphql(name = "PluginCapability", remote = "crate::plugins::Capability")]
pub enum CapabilityEnum {
    Notifications,
    DocumentLoading,
}

// =============================================================================
// ERRORS
// =============================================================================

/// A problem with the submitted input.
#[derive(SimpleObject, Debug, Clone)]
#[graphql(name = "Error")]
pub struct ErrorNode {
    /// Input field at fault; `null` when the whole input is.
    pub field: Option<String>,
    pub code: ErrorCodeEnum,
    pub message: String,
    /// Offending attributes, for attribute assignment errors.
    pub attributes: Vec<ID>,
}

impl From<FieldError> for ErrorNode {
    fn from(error: FieldError) -> Self {
        Self {
            field: error.field,
            code: error.code.into(),
            message: error.message,
            attributes: error
                .attributes
                .into_iter()
                .map(|id| to_global_id(ids::ATTRIBUTE, id.0))
                .collect(),
        }
    }
}

// =============================================================================
// TENANT
// =============================================================================

#[derive(SimpleObject)]
#[graphql(name = "Tenant")]
pub struct TenantNode {
    pub id: String,
    pub name: String,
    pub domains: Vec<String>,
}

impl From<&Tenant> for TenantNode {
    fn from(tenant: &Tenant) -> Self {
        Self {
            id: tenant.id.to_string(),
            name: tenant.name.clone(),
            domains: tenant.domains.clone(),
        }
    }
}

// =============================================================================
// CATALOG
// =============================================================================

pub struct CategoryNode(pub Category);

#[Object(name = "Category")]
impl CategoryNode {
    async fn id(&self) -> ID {
        to_global_id(ids::CATEGORY, self.0.id.0)
    }

    async fn name(&self) -> &str {
        &self.0.name
    }

    async fn slug(&self) -> &str {
        &self.0.slug
    }

    async fn description(&self) -> Option<&str> {
        self.0.description.as_deref()
    }

    async fn parent(&self, ctx: &Context<'_>) -> Result<Option<CategoryNode>> {
        let Some(parent) = self.0.parent else {
            return Ok(None);
        };
        let rc = request_context(ctx)?;
        Ok(rc.read(|tx| Ok(tx.get::<Category>(parent.0)?))?.map(CategoryNode))
    }

    async fn children(&self, ctx: &Context<'_>) -> Result<Vec<CategoryNode>> {
        let rc = request_context(ctx)?;
        let id = self.0.id;
        let children = rc.read(|tx| civic_core::entry::child_categories(tx, Some(id)))?;
        Ok(children.into_iter().map(CategoryNode).collect())
    }
}

pub struct ChannelNode(pub Channel);

#[Object(name = "Channel")]
impl ChannelNode {
    async fn id(&self) -> ID {
        to_global_id(ids::CHANNEL, self.0.id.0)
    }

    async fn name(&self) -> &str {
        &self.0.name
    }

    async fn slug(&self) -> &str {
        &self.0.slug
    }

    async fn is_active(&self) -> bool {
        self.0.is_active
    }
}

// =============================================================================
// ATTRIBUTES
// =============================================================================

pub struct AttributeNode(pub Attribute);

#[Object(name = "Attribute")]
impl AttributeNode {
    async fn id(&self) -> ID {
        to_global_id(ids::ATTRIBUTE, self.0.id.0)
    }

    async fn name(&self) -> &str {
        &self.0.name
    }

    async fn slug(&self) -> &str {
        &self.0.slug
    }

    async fn target(&self) -> AttributeTargetEnum {
        self.0.target.into()
    }

    async fn input_type(&self) -> InputTypeEnum {
        self.0.input_type.into()
    }

    async fn value_required(&self) -> bool {
        self.0.value_required
    }

    async fn visible_in_website(&self) -> bool {
        self.0.visible_in_website
    }

    async fn filterable(&self) -> bool {
        self.0.filterable
    }

    /// Selectable values. Empty for free-form input types.
    async fn choices(&self, ctx: &Context<'_>) -> Result<Vec<AttributeValueNode>> {
        if !self.0.input_type.has_choices() {
            return Ok(Vec::new());
        }
        let rc = request_context(ctx)?;
        let id = self.0.id;
        let values = rc.read(|tx| values_of(tx, id))?;
        Ok(values.into_iter().map(AttributeValueNode).collect())
    }
}

pub struct AttributeValueNode(pub AttributeValue);

#[Object(name = "AttributeValue")]
impl AttributeValueNode {
    async fn id(&self) -> ID {
        to_global_id(ids::ATTRIBUTE_VALUE, self.0.id.0)
    }

    async fn name(&self) -> &str {
        &self.0.name
    }

    async fn slug(&self) -> &str {
        &self.0.slug
    }

    async fn boolean(&self) -> Option<bool> {
        self.0.boolean
    }

    async fn date(&self) -> Option<NaiveDate> {
        self.0.date
    }

    async fn plain_text(&self) -> Option<&str> {
        self.0.plain_text.as_deref()
    }

    async fn file_url(&self) -> Option<&str> {
        self.0.file_url.as_deref()
    }

    async fn content_type(&self) -> Option<&str> {
        self.0.content_type.as_deref()
    }

    /// Referenced entry, for reference attributes.
    async fn reference(&self) -> Option<ID> {
        self.0.reference.map(|id| to_global_id(ids::ENTRY, id.0))
    }

    async fn sort_order(&self) -> u32 {
        self.0.sort_order
    }
}

/// An attribute with the values assigned to one entry or document.
#[derive(SimpleObject)]
#[graphql(name = "AssignedAttribute")]
pub struct AssignedAttributeNode {
    pub attribute: AttributeNode,
    pub values: Vec<AttributeValueNode>,
}

/// Resolve assignments; anonymous callers only see website-visible ones,
/// without references to unpublished entries.
fn assigned(rc: &RequestContext, assignments: &[AssignedAttribute]) -> Result<Vec<AssignedAttributeNode>> {
    let staff = rc.is_staff();
    let resolved = rc.read(|tx| {
        let mut visible = Vec::new();
        for (attribute, values) in resolve_assignments(tx, assignments)? {
            if !staff && !attribute.visible_in_website {
                continue;
            }
            let mut kept = Vec::with_capacity(values.len());
            for value in values {
                let hidden = match value.reference {
                    Some(entry) if !staff => !tx.get::<Entry>(entry.0)?.is_some_and(|e| e.is_published),
                    _ => false,
                };
                if !hidden {
                    kept.push(value);
                }
            }
            visible.push((attribute, kept));
        }
        Ok(visible)
    })?;
    Ok(resolved
        .into_iter()
        .map(|(attribute, values)| AssignedAttributeNode {
            attribute: AttributeNode(attribute),
            values: values.into_iter().map(AttributeValueNode).collect(),
        })
        .collect())
}

fn attributes_by_id(rc: &RequestContext, ids: &[civic_core::AttributeId]) -> Result<Vec<AttributeNode>> {
    let staff = rc.is_staff();
    let attributes = rc.read(|tx| {
        let mut found = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(attribute) = tx.get::<Attribute>(id.0)?
                && (staff || attribute.visible_in_website)
            {
                found.push(AttributeNode(attribute));
            }
        }
        Ok(found)
    })?;
    Ok(attributes)
}

// =============================================================================
// ENTRIES
// =============================================================================

pub struct EntryTypeNode(pub EntryType);

#[Object(name = "EntryType")]
impl EntryTypeNode {
    async fn id(&self) -> ID {
        to_global_id(ids::ENTRY_TYPE, self.0.id.0)
    }

    async fn name(&self) -> &str {
        &self.0.name
    }

    async fn slug(&self) -> &str {
        &self.0.slug
    }

    async fn kind(&self) -> EntryKindEnum {
        self.0.kind.into()
    }

    async fn entry_attributes(&self, ctx: &Context<'_>) -> Result<Vec<AttributeNode>> {
        attributes_by_id(request_context(ctx)?, &self.0.entry_attributes)
    }

    async fn document_attributes(&self, ctx: &Context<'_>) -> Result<Vec<AttributeNode>> {
        attributes_by_id(request_context(ctx)?, &self.0.document_attributes)
    }
}

pub struct EntryNode(pub Entry);

#[Object(name = "Entry")]
impl EntryNode {
    async fn id(&self) -> ID {
        to_global_id(ids::ENTRY, self.0.id.0)
    }

    async fn name(&self) -> &str {
        &self.0.name
    }

    async fn slug(&self) -> &str {
        &self.0.slug
    }

    /// Licence plate or CPF/CNPJ, normalized.
    async fn document_number(&self) -> &str {
        &self.0.document_number
    }

    /// Staff only.
    async fn email(&self, ctx: &Context<'_>) -> Result<Option<&str>> {
        let rc = request_context(ctx)?;
        Ok(if rc.is_staff() { self.0.email.as_deref() } else { None })
    }

    async fn is_published(&self) -> bool {
        self.0.is_published
    }

    async fn created_at(&self) -> DateTime<Utc> {
        self.0.created_at
    }

    async fn updated_at(&self) -> DateTime<Utc> {
        self.0.updated_at
    }

    async fn entry_type(&self, ctx: &Context<'_>) -> Result<Option<EntryTypeNode>> {
        let rc = request_context(ctx)?;
        let id = self.0.entry_type;
        Ok(rc.read(|tx| Ok(tx.get::<EntryType>(id.0)?))?.map(EntryTypeNode))
    }

    async fn category(&self, ctx: &Context<'_>) -> Result<Option<CategoryNode>> {
        let Some(id) = self.0.category else {
            return Ok(None);
        };
        let rc = request_context(ctx)?;
        Ok(rc.read(|tx| Ok(tx.get::<Category>(id.0)?))?.map(CategoryNode))
    }

    async fn channels(&self, ctx: &Context<'_>) -> Result<Vec<ChannelNode>> {
        let rc = request_context(ctx)?;
        let channels = rc.read(|tx| Ok(tx.filter::<Channel>(|c| self.0.channels.contains(&c.id))?))?;
        Ok(channels.into_iter().map(ChannelNode).collect())
    }

    async fn attributes(&self, ctx: &Context<'_>) -> Result<Vec<AssignedAttributeNode>> {
        assigned(request_context(ctx)?, &self.0.attributes)
    }

    /// Documents of the entry; anonymous callers only get published ones.
    async fn documents(&self, ctx: &Context<'_>) -> Result<Vec<DocumentNode>> {
        let rc = request_context(ctx)?;
        let filter = DocumentFilter {
            entry: Some(self.0.id),
            status: None,
            published_only: !rc.is_staff(),
        };
        let documents = rc.read(|tx| list_documents(tx, &filter, rc.today, rc.warn_days))?;
        Ok(documents.into_iter().map(DocumentNode).collect())
    }

    async fn compliance(&self, ctx: &Context<'_>) -> Result<ComplianceSummaryNode> {
        let rc = request_context(ctx)?;
        let id = self.0.id;
        let summary = rc.read(|tx| compliance_summary(tx, Some(id), rc.today, rc.warn_days, !rc.is_staff()))?;
        Ok(ComplianceSummaryNode(summary))
    }
}

// =============================================================================
// DOCUMENTS
// =============================================================================

pub struct DefaultDocumentNode(pub DefaultDocument);

#[Object(name = "DefaultDocument")]
impl DefaultDocumentNode {
    async fn id(&self) -> ID {
        to_global_id(ids::DEFAULT_DOCUMENT, self.0.id.0)
    }

    async fn name(&self) -> &str {
        &self.0.name
    }

    async fn description(&self) -> Option<&str> {
        self.0.description.as_deref()
    }

    async fn expires(&self) -> bool {
        self.0.expires
    }

    async fn load_type(&self) -> &str {
        &self.0.load_type
    }

    async fn entry_types(&self, ctx: &Context<'_>) -> Result<Vec<EntryTypeNode>> {
        let rc = request_context(ctx)?;
        let types = rc.read(|tx| Ok(tx.filter::<EntryType>(|t| self.0.entry_types.contains(&t.id))?))?;
        Ok(types.into_iter().map(EntryTypeNode).collect())
    }
}

pub struct DocumentNode(pub Document);

#[Object(name = "Document")]
impl DocumentNode {
    async fn id(&self) -> ID {
        to_global_id(ids::DOCUMENT, self.0.id.0)
    }

    async fn name(&self) -> &str {
        &self.0.name
    }

    async fn description(&self) -> Option<&str> {
        self.0.description.as_deref()
    }

    async fn is_published(&self) -> bool {
        self.0.is_published
    }

    async fn expires(&self) -> bool {
        self.0.expires
    }

    async fn load_type(&self) -> &str {
        &self.0.load_type
    }

    async fn created_at(&self) -> DateTime<Utc> {
        self.0.created_at
    }

    async fn updated_at(&self) -> DateTime<Utc> {
        self.0.updated_at
    }

    async fn status(&self, ctx: &Context<'_>) -> Result<DocumentStatusEnum> {
        let rc = request_context(ctx)?;
        let status = rc.read(|tx| document_status(tx, &self.0, rc.today, rc.warn_days))?;
        Ok(status.into())
    }

    async fn entry(&self, ctx: &Context<'_>) -> Result<Option<EntryNode>> {
        let rc = request_context(ctx)?;
        let id = self.0.entry;
        let entry = rc.read(|tx| Ok(tx.get::<Entry>(id.0)?))?;
        Ok(entry.filter(|e| rc.is_staff() || e.is_published).map(EntryNode))
    }

    async fn default_document(&self, ctx: &Context<'_>) -> Result<Option<DefaultDocumentNode>> {
        let Some(id) = self.0.default_document else {
            return Ok(None);
        };
        let rc = request_context(ctx)?;
        Ok(rc.read(|tx| Ok(tx.get::<DefaultDocument>(id.0)?))?.map(DefaultDocumentNode))
    }

    async fn attributes(&self, ctx: &Context<'_>) -> Result<Vec<AssignedAttributeNode>> {
        assigned(request_context(ctx)?, &self.0.attributes)
    }

    async fn active_file(&self, ctx: &Context<'_>) -> Result<Option<DocumentFileNode>> {
        let Some(id) = self.0.active_file else {
            return Ok(None);
        };
        let rc = request_context(ctx)?;
        Ok(rc.read(|tx| Ok(tx.get::<DocumentFile>(id.0)?))?.map(DocumentFileNode))
    }

    /// Upload history, newest first. Anonymous callers only see approved files.
    async fn files(&self, ctx: &Context<'_>) -> Result<Vec<DocumentFileNode>> {
        let rc = request_context(ctx)?;
        let mut files = rc.read(|tx| files_of(tx, self.0.id))?;
        if !rc.is_staff() {
            files.retain(|f| f.status == FileStatus::Approved);
        }
        files.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(files.into_iter().map(DocumentFileNode).collect())
    }
}

pub struct DocumentFileNode(pub DocumentFile);

#[Object(name = "DocumentFile")]
impl DocumentFileNode {
    async fn id(&self) -> ID {
        to_global_id(ids::DOCUMENT_FILE, self.0.id.0)
    }

    async fn document(&self) -> ID {
        to_global_id(ids::DOCUMENT, self.0.document.0)
    }

    async fn file_url(&self) -> &str {
        &self.0.file_url
    }

    async fn begin_date(&self) -> Option<NaiveDate> {
        self.0.begin_date
    }

    async fn expiration_date(&self) -> Option<NaiveDate> {
        self.0.expiration_date
    }

    async fn status(&self) -> FileStatusEnum {
        self.0.status.into()
    }

    async fn refusal_reason(&self) -> Option<&str> {
        self.0.refusal_reason.as_deref()
    }

    async fn created_at(&self) -> DateTime<Utc> {
        self.0.created_at
    }

    async fn decided_at(&self) -> Option<DateTime<Utc>> {
        self.0.decided_at
    }
}

pub struct ComplianceSummaryNode(pub ComplianceSummary);

#[Object(name = "ComplianceSummary")]
impl ComplianceSummaryNode {
    async fn entries(&self) -> usize {
        self.0.entries
    }

    async fn documents(&self) -> usize {
        self.0.documents
    }

    async fn missing(&self) -> usize {
        self.0.missing
    }

    async fn waiting(&self) -> usize {
        self.0.waiting
    }

    async fn approved(&self) -> usize {
        self.0.approved
    }

    async fn expiring(&self) -> usize {
        self.0.expiring
    }

    async fn expired(&self) -> usize {
        self.0.expired
    }

    async fn refused(&self) -> usize {
        self.0.refused
    }

    async fn compliant(&self) -> usize {
        self.0.compliant()
    }

    async fn compliance_percent(&self) -> u8 {
        self.0.compliance_percent()
    }
}

// =============================================================================
// INVESTMENTS & EVENTS
// =============================================================================

#[derive(SimpleObject)]
#[graphql(name = "InvestmentItem")]
pub struct InvestmentItemNode {
    pub name: String,
    pub value_cents: i64,
}

pub struct InvestmentNode(pub Investment);

#[Object(name = "Investment")]
impl InvestmentNode {
    async fn id(&self) -> ID {
        to_global_id(ids::INVESTMENT, self.0.id.0)
    }

    async fn year(&self) -> i32 {
        self.0.year
    }

    async fn month(&self) -> u32 {
        self.0.month
    }

    async fn is_published(&self) -> bool {
        self.0.is_published
    }

    async fn items(&self) -> Vec<InvestmentItemNode> {
        self.0
            .items
            .iter()
            .map(|item| InvestmentItemNode {
                name: item.name.clone(),
                value_cents: item.value_cents,
            })
            .collect()
    }

    async fn total_cents(&self) -> i64 {
        self.0.total_cents()
    }
}

pub struct EventNode(pub Event);

#[Object(name = "Event")]
impl EventNode {
    async fn id(&self) -> ID {
        to_global_id(ids::EVENT, self.0.id.0)
    }

    async fn date(&self) -> DateTime<Utc> {
        self.0.date
    }

    async fn kind(&self) -> EventKindEnum {
        self.0.kind.into()
    }

    /// API key label or plugin that caused the event; `null` for the system.
    async fn actor(&self) -> Option<&str> {
        self.0.actor.as_deref()
    }

    async fn entry(&self) -> Option<ID> {
        self.0.entry.map(|id| to_global_id(ids::ENTRY, id.0))
    }

    async fn document(&self) -> Option<ID> {
        self.0.document.map(|id| to_global_id(ids::DOCUMENT, id.0))
    }

    async fn file(&self) -> Option<ID> {
        self.0.file.map(|id| to_global_id(ids::DOCUMENT_FILE, id.0))
    }

    async fn message(&self) -> Option<&str> {
        self.0.message.as_deref()
    }
}

// =============================================================================
// PLUGINS
// =============================================================================

#[derive(SimpleObject)]
#[graphql(name = "PluginConfigValue")]
pub struct ConfigValueNode {
    pub key: String,
    pub label: String,
    pub required: bool,
    pub secret: bool,
    /// Masked for secrets.
    pub value: Option<String>,
}

#[derive(SimpleObject)]
#[graphql(name = "Plugin")]
pub struct PluginNode {
    pub identifier: String,
    pub name: String,
    pub description: String,
    pub capabilities: Vec<CapabilityEnum>,
    pub active: bool,
    pub load_types: Vec<String>,
    pub configuration: Vec<ConfigValueNode>,
}

impl PluginNode {
    /// Describe a plugin with its (masked) configuration for one tenant.
    #[must_use]
    pub fn build(manager: &PluginsManager, plugin: &dyn Plugin, config: &PluginConfiguration) -> Self {
        let meta = plugin.meta();
        let masked = manager.masked_values(meta.identifier, config);
        Self {
            identifier: meta.identifier.to_string(),
            name: meta.name.to_string(),
            description: meta.description.to_string(),
            capabilities: meta.capabilities.iter().map(|c: &Capability| (*c).into()).collect(),
            active: config.active,
            load_types: plugin.load_types().into_iter().map(str::to_string).collect(),
            configuration: plugin
                .config_fields()
                .into_iter()
                .map(|field| ConfigValueNode {
                    key: field.key.to_string(),
                    label: field.label.to_string(),
                    required: field.required,
                    secret: field.secret,
                    value: masked.get(field.key).cloned(),
                })
                .collect(),
        }
    }
}
