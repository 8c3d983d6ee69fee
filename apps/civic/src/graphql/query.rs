//! Query root.
//!
//! Anonymous callers only see published entries, documents and investments;
//! asking for an unpublished object by id yields `null`.

use super::ids::{self, from_global_id};
use super::inputs::{DocumentFilterInput, EntryFilterInput, EventFilterInput, IntoCore};
use super::types::{
    AttributeNode, AttributeTargetEnum, CategoryNode, ChannelNode, ComplianceSummaryNode, DefaultDocumentNode,
    DocumentNode, EntryKindEnum, EntryNode, EntryTypeNode, EventNode, InvestmentNode, PluginNode, TenantNode,
};
use super::{request_context, require_staff};
use async_graphql::{Context, ID, MaybeUndefined, Object, OutputType, Result, SimpleObject};
use civic_core::document::list_documents;
use civic_core::entry::{child_categories, list_entries};
use civic_core::event::list_events;
use civic_core::investment::list_investments;
use civic_core::primitives::{MANUAL_LOAD_TYPE, page_size};
use civic_core::system::compliance_summary;
use civic_core::{
    Attribute, AttributeTarget, Category, CategoryId, Channel, DefaultDocument, Document, Entry, EntryId,
    EntryKind, EntryType, FieldError, Investment, Reader,
};

/// A slice of a longer listing.
#[derive(SimpleObject)]
#[graphql(concrete(name = "EntryPage", params(EntryNode)))]
#[graphql(concrete(name = "DocumentPage", params(DocumentNode)))]
pub struct Page<T: OutputType> {
    /// Matches before slicing.
    pub total_count: usize,
    pub items: Vec<T>,
}

impl<T: OutputType> Page<T> {
    fn slice<M>(all: Vec<M>, first: Option<usize>, offset: Option<usize>, wrap: impl Fn(M) -> T) -> Self {
        let total_count = all.len();
        let items = all
            .into_iter()
            .skip(offset.unwrap_or(0))
            .take(page_size(first))
            .map(wrap)
            .collect();
        Self { total_count, items }
    }
}

/// Decode an id argument; a malformed id is a request error.
fn id_arg(id: &ID, kind: &str) -> Result<u64> {
    from_global_id("id", id, kind).map_err(|e| async_graphql::Error::new(e.message))
}

fn filter_arg<T>(convert: impl FnOnce(&mut Vec<FieldError>) -> T) -> Result<T> {
    let mut errors = Vec::new();
    let value = convert(&mut errors);
    match errors.into_iter().next() {
        Some(error) => Err(async_graphql::Error::new(error.to_string())),
        None => Ok(value),
    }
}

pub struct QueryRoot;

#[Object]
impl QueryRoot {
    /// The tenant served at the requested address.
    async fn tenant(&self, ctx: &Context<'_>) -> Result<TenantNode> {
        Ok(TenantNode::from(&request_context(ctx)?.tenant))
    }

    // -------------------------------------------------------------------------
    // Catalog
    // -------------------------------------------------------------------------

    async fn category(&self, ctx: &Context<'_>, id: ID) -> Result<Option<CategoryNode>> {
        let pk = id_arg(&id, ids::CATEGORY)?;
        let rc = request_context(ctx)?;
        Ok(rc.read(|tx| Ok(tx.get::<Category>(pk)?))?.map(CategoryNode))
    }

    /// Every category when `parent` is omitted, the top level when it is
    /// `null`, otherwise the children of `parent`.
    async fn categories(&self, ctx: &Context<'_>, parent: MaybeUndefined<ID>) -> Result<Vec<CategoryNode>> {
        let rc = request_context(ctx)?;
        let categories = match parent {
            MaybeUndefined::Undefined => rc.read(|tx| Ok(tx.list::<Category>()?))?,
            MaybeUndefined::Null => rc.read(|tx| child_categories(tx, None))?,
            MaybeUndefined::Value(id) => {
                let pk = id_arg(&id, ids::CATEGORY)?;
                rc.read(|tx| child_categories(tx, Some(CategoryId(pk))))?
            }
        };
        Ok(categories.into_iter().map(CategoryNode).collect())
    }

    async fn channel(&self, ctx: &Context<'_>, id: ID) -> Result<Option<ChannelNode>> {
        let pk = id_arg(&id, ids::CHANNEL)?;
        let rc = request_context(ctx)?;
        Ok(rc.read(|tx| Ok(tx.get::<Channel>(pk)?))?.map(ChannelNode))
    }

    async fn channels(&self, ctx: &Context<'_>) -> Result<Vec<ChannelNode>> {
        let rc = request_context(ctx)?;
        let channels = rc.read(|tx| Ok(tx.list::<Channel>()?))?;
        Ok(channels.into_iter().map(ChannelNode).collect())
    }

    async fn attribute(&self, ctx: &Context<'_>, id: ID) -> Result<Option<AttributeNode>> {
        let pk = id_arg(&id, ids::ATTRIBUTE)?;
        let rc = request_context(ctx)?;
        let attribute = rc.read(|tx| Ok(tx.get::<Attribute>(pk)?))?;
        Ok(attribute.filter(|a| rc.is_staff() || a.visible_in_website).map(AttributeNode))
    }

    async fn attributes(&self, ctx: &Context<'_>, target: Option<AttributeTargetEnum>) -> Result<Vec<AttributeNode>> {
        let rc = request_context(ctx)?;
        let target = target.map(AttributeTarget::from);
        let attributes = rc.read(|tx| {
            Ok(tx.filter::<Attribute>(|a| {
                target.is_none_or(|t| a.target == t) && (rc.is_staff() || a.visible_in_website)
            })?)
        })?;
        Ok(attributes.into_iter().map(AttributeNode).collect())
    }

    async fn entry_type(&self, ctx: &Context<'_>, id: ID) -> Result<Option<EntryTypeNode>> {
        let pk = id_arg(&id, ids::ENTRY_TYPE)?;
        let rc = request_context(ctx)?;
        Ok(rc.read(|tx| Ok(tx.get::<EntryType>(pk)?))?.map(EntryTypeNode))
    }

    async fn entry_types(&self, ctx: &Context<'_>, kind: Option<EntryKindEnum>) -> Result<Vec<EntryTypeNode>> {
        let rc = request_context(ctx)?;
        let kind = kind.map(EntryKind::from);
        let types = rc.read(|tx| Ok(tx.filter::<EntryType>(|t| kind.is_none_or(|k| t.kind == k))?))?;
        Ok(types.into_iter().map(EntryTypeNode).collect())
    }

    // -------------------------------------------------------------------------
    // Entries & documents
    // -------------------------------------------------------------------------

    /// Look an entry up by id or slug.
    async fn entry(&self, ctx: &Context<'_>, id: Option<ID>, slug: Option<String>) -> Result<Option<EntryNode>> {
        let rc = request_context(ctx)?;
        let entry = match (id, slug) {
            (Some(id), None) => {
                let pk = id_arg(&id, ids::ENTRY)?;
                rc.read(|tx| Ok(tx.get::<Entry>(pk)?))?
            }
            (None, Some(slug)) => rc.read(|tx| Ok(tx.find::<Entry>(|e| e.slug == slug)?))?,
            _ => return Err(async_graphql::Error::new("Provide exactly one of id or slug.")),
        };
        Ok(entry.filter(|e| rc.is_staff() || e.is_published).map(EntryNode))
    }

    async fn entries(
        &self,
        ctx: &Context<'_>,
        filter: Option<EntryFilterInput>,
        first: Option<usize>,
        offset: Option<usize>,
    ) -> Result<Page<EntryNode>> {
        let rc = request_context(ctx)?;
        let mut filter = filter_arg(|errors| filter.unwrap_or_default().into_core(errors))?;
        filter.published_only = !rc.is_staff();
        let entries = rc.read(|tx| list_entries(tx, &filter))?;
        Ok(Page::slice(entries, first, offset, EntryNode))
    }

    async fn document(&self, ctx: &Context<'_>, id: ID) -> Result<Option<DocumentNode>> {
        let pk = id_arg(&id, ids::DOCUMENT)?;
        let rc = request_context(ctx)?;
        let document = rc.read(|tx| {
            let Some(document) = tx.get::<Document>(pk)? else {
                return Ok(None);
            };
            let visible = rc.is_staff()
                || (document.is_published && tx.get::<Entry>(document.entry.0)?.is_some_and(|e| e.is_published));
            Ok(visible.then_some(document))
        })?;
        Ok(document.map(DocumentNode))
    }

    async fn documents(
        &self,
        ctx: &Context<'_>,
        filter: Option<DocumentFilterInput>,
        first: Option<usize>,
        offset: Option<usize>,
    ) -> Result<Page<DocumentNode>> {
        let rc = request_context(ctx)?;
        let mut filter = filter_arg(|errors| filter.unwrap_or_default().into_core(errors))?;
        filter.published_only = !rc.is_staff();
        let documents = rc.read(|tx| {
            let mut documents = list_documents(tx, &filter, rc.today, rc.warn_days)?;
            if filter.published_only {
                let published: Vec<EntryId> = tx.filter::<Entry>(|e| e.is_published)?.into_iter().map(|e| e.id).collect();
                documents.retain(|d| published.contains(&d.entry));
            }
            Ok(documents)
        })?;
        Ok(Page::slice(documents, first, offset, DocumentNode))
    }

    async fn default_documents(&self, ctx: &Context<'_>) -> Result<Vec<DefaultDocumentNode>> {
        let rc = request_context(ctx)?;
        let defaults = rc.read(|tx| Ok(tx.list::<DefaultDocument>()?))?;
        Ok(defaults.into_iter().map(DefaultDocumentNode).collect())
    }

    /// Document counts by status, for one entry or the whole tenant.
    async fn compliance_summary(&self, ctx: &Context<'_>, entry: Option<ID>) -> Result<ComplianceSummaryNode> {
        let rc = request_context(ctx)?;
        let entry = entry.map(|id| id_arg(&id, ids::ENTRY)).transpose()?.map(EntryId);
        let summary = rc.read(|tx| compliance_summary(tx, entry, rc.today, rc.warn_days, !rc.is_staff()))?;
        Ok(ComplianceSummaryNode(summary))
    }

    /// Load types a document can use: `manual` plus those offered by plugins.
    async fn load_types(&self, ctx: &Context<'_>) -> Result<Vec<String>> {
        let rc = request_context(ctx)?;
        let mut types = vec![MANUAL_LOAD_TYPE.to_string()];
        types.extend(rc.plugins.load_types().into_iter().map(str::to_string));
        Ok(types)
    }

    // -------------------------------------------------------------------------
    // Investments
    // -------------------------------------------------------------------------

    async fn investment(&self, ctx: &Context<'_>, id: ID) -> Result<Option<InvestmentNode>> {
        let pk = id_arg(&id, ids::INVESTMENT)?;
        let rc = request_context(ctx)?;
        let investment = rc.read(|tx| Ok(tx.get::<Investment>(pk)?))?;
        Ok(investment.filter(|i| rc.is_staff() || i.is_published).map(InvestmentNode))
    }

    /// Newest period first.
    async fn investments(&self, ctx: &Context<'_>, year: Option<i32>) -> Result<Vec<InvestmentNode>> {
        let rc = request_context(ctx)?;
        let investments = rc.read(|tx| list_investments(tx, year, !rc.is_staff()))?;
        Ok(investments.into_iter().map(InvestmentNode).collect())
    }

    // -------------------------------------------------------------------------
    // Staff only
    // -------------------------------------------------------------------------

    /// Audit trail, newest first.
    async fn events(
        &self,
        ctx: &Context<'_>,
        filter: Option<EventFilterInput>,
        first: Option<usize>,
    ) -> Result<Vec<EventNode>> {
        let rc = request_context(ctx)?;
        require_staff(rc)?;
        let filter = filter_arg(|errors| filter.unwrap_or_default().into_core(errors))?;
        let events = rc.read(|tx| Ok(list_events(tx, &filter, page_size(first))?))?;
        Ok(events.into_iter().map(EventNode).collect())
    }

    /// Installed plugins and this tenant's configuration of each.
    async fn plugins(&self, ctx: &Context<'_>) -> Result<Vec<PluginNode>> {
        let rc = request_context(ctx)?;
        require_staff(rc)?;
        let mut nodes = Vec::with_capacity(rc.plugins.plugins().len());
        for plugin in rc.plugins.plugins() {
            let config = rc
                .plugins
                .configuration(&rc.db, plugin.meta().identifier)
                .map_err(|err| {
                    tracing::error!(error = %err, "failed to read plugin configuration");
                    async_graphql::Error::new("Internal server error.")
                })?;
            nodes.push(PluginNode::build(&rc.plugins, plugin.as_ref(), &config));
        }
        Ok(nodes)
    }
}
