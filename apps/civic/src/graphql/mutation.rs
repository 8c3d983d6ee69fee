//! Mutation root.
//!
//! Every mutation returns a payload with an `errors` list and the affected
//! node. Anonymous callers get a `PERMISSION_DENIED` error and nothing is
//! written. Events recorded by a successful change are handed to the
//! notification plugins once the transaction has committed.

use super::ids::{self, from_global_id};
use super::inputs::{
    AttributeInput, AttributeValueInput, CategoryInput, ChannelInput, DefaultDocumentInput, DocumentFileInput,
    DocumentInput, EntryInput, EntryTypeInput, IntoCore, InvestmentInput, PluginConfigurationInput,
};
use super::types::{
    AttributeNode, AttributeValueNode, CategoryNode, ChannelNode, DefaultDocumentNode, DocumentFileNode,
    DocumentNode, EntryNode, EntryTypeNode, ErrorNode, InvestmentNode, PluginNode,
};
use super::{RequestContext, internal, plugin_errors, request_context};
use crate::services::{self, LoadOutcome};
use async_graphql::{Context, Enum, ID, Object, OutputType, Result, SimpleObject};
use civic_core::attribute::{AttributeMutation, AttributeValueMutation};
use civic_core::document::{DefaultDocumentMutation, DocumentMutation, add_file, approve_file, refuse_file};
use civic_core::entry::{CategoryMutation, ChannelMutation, EntryMutation, EntryTypeMutation};
use civic_core::investment::InvestmentMutation;
use civic_core::mutation::{self, ModelMutation};
use civic_core::{
    CoreError, DocumentFileId, DocumentId, ErrorCode, FieldError, MutationContext, MutationOutcome, TenantDb,
};
use std::collections::BTreeMap;

// =============================================================================
// PAYLOADS
// =============================================================================

/// Result of a mutation: the affected node, or the reasons it was refused.
pub trait MutationPayload {
    type Node: OutputType;

    fn from_node(node: Self::Node) -> Self;

    fn from_errors(errors: Vec<FieldError>) -> Self;
}

macro_rules! payload {
    ($(#[$meta:meta])* $name:ident { $field:ident: $node:ty }) => {
        $(#[$meta])*
        #[derive(SimpleObject)]
        pub struct $name {
            pub errors: Vec<ErrorNode>,
            pub $field: Option<$node>,
        }

        impl MutationPayload for $name {
            type Node = $node;

            fn from_node(node: $node) -> Self {
                Self {
                    errors: Vec::new(),
                    $field: Some(node),
                }
            }

            fn from_errors(errors: Vec<FieldError>) -> Self {
                Self {
                    errors: errors.into_iter().map(ErrorNode::from).collect(),
                    $field: None,
                }
            }
        }
    };
}

payload!(CategoryPayload { category: CategoryNode });
payload!(ChannelPayload { channel: ChannelNode });
payload!(AttributePayload { attribute: AttributeNode });
payload!(AttributeValuePayload { attribute_value: AttributeValueNode });
payload!(EntryTypePayload { entry_type: EntryTypeNode });
payload!(EntryPayload { entry: EntryNode });
payload!(DocumentPayload { document: DocumentNode });
payload!(DefaultDocumentPayload { default_document: DefaultDocumentNode });
payload!(InvestmentPayload { investment: InvestmentNode });
payload!(
    /// An uploaded file and the decision taken on it.
    DocumentFilePayload { document_file: DocumentFileNode }
);
payload!(PluginPayload { plugin: PluginNode });

#[derive(Enum, Debug, Copy, Clone, Eq, PartialEq)]
pub enum LoadStatus {
    /// A plugin returned a file; it is now the active one.
    Loaded,
    /// The plugin failed; the document is unchanged.
    Failed,
    /// No active plugin serves the document's load type.
    NoLoader,
    /// The document is uploaded by hand.
    Manual,
}

#[derive(SimpleObject)]
pub struct DocumentLoadPayload {
    pub errors: Vec<ErrorNode>,
    pub status: Option<LoadStatus>,
    /// Plugin that handled the request.
    pub plugin: Option<String>,
    pub document_file: Option<DocumentFileNode>,
}

impl DocumentLoadPayload {
    fn refused(errors: Vec<FieldError>, status: Option<LoadStatus>) -> Self {
        Self {
            errors: errors.into_iter().map(ErrorNode::from).collect(),
            status,
            plugin: None,
            document_file: None,
        }
    }
}

// =============================================================================
// DRIVERS
// =============================================================================

/// Run `op` for a staff caller, notify plugins of its events and wrap the
/// model. Input errors collected before the call short-circuit it.
async fn commit<T, P>(
    rc: &RequestContext,
    errors: Vec<FieldError>,
    op: impl FnOnce(&TenantDb, &MutationContext) -> Result<MutationOutcome<T>, CoreError>,
    wrap: impl FnOnce(T) -> P::Node,
) -> Result<P>
where
    P: MutationPayload,
{
    let mctx = match rc.mutation_context() {
        Ok(mctx) => mctx,
        Err(err) => return Ok(P::from_errors(err.field_errors())),
    };
    if !errors.is_empty() {
        return Ok(P::from_errors(errors));
    }
    match op(&rc.db, &mctx) {
        Ok(outcome) => {
            services::notify_events(&rc.plugins, &rc.tenant, &rc.db, &outcome.events).await;
            Ok(P::from_node(wrap(outcome.model)))
        }
        Err(err) if err.is_validation() => Ok(P::from_errors(err.field_errors())),
        Err(err) => Err(internal(err)),
    }
}

fn decode_id(id: &ID, kind: &str, errors: &mut Vec<FieldError>) -> u64 {
    from_global_id("id", id, kind).map_err(|e| errors.push(e)).unwrap_or_default()
}

async fn create<M, I, P>(ctx: &Context<'_>, input: I, wrap: impl FnOnce(M::Model) -> P::Node) -> Result<P>
where
    M: ModelMutation,
    I: IntoCore<Output = M::Input>,
    P: MutationPayload,
{
    let rc = request_context(ctx)?;
    let mut errors = Vec::new();
    let input = input.into_core(&mut errors);
    commit(rc, errors, |db, mctx| mutation::create::<M>(db, input, mctx), wrap).await
}

async fn update<M, I, P>(
    ctx: &Context<'_>,
    id: ID,
    kind: &str,
    input: I,
    wrap: impl FnOnce(M::Model) -> P::Node,
) -> Result<P>
where
    M: ModelMutation,
    I: IntoCore<Output = M::Input>,
    P: MutationPayload,
{
    let rc = request_context(ctx)?;
    let mut errors = Vec::new();
    let pk = decode_id(&id, kind, &mut errors);
    let input = input.into_core(&mut errors);
    commit(rc, errors, |db, mctx| mutation::update::<M>(db, pk, input, mctx), wrap).await
}

async fn delete<M, P>(ctx: &Context<'_>, id: ID, kind: &str, wrap: impl FnOnce(M::Model) -> P::Node) -> Result<P>
where
    M: ModelMutation,
    P: MutationPayload,
{
    let rc = request_context(ctx)?;
    let mut errors = Vec::new();
    let pk = decode_id(&id, kind, &mut errors);
    commit(rc, errors, |db, mctx| mutation::delete::<M>(db, pk, mctx), wrap).await
}

// =============================================================================
// ROOT
// =============================================================================

pub struct MutationRoot;

#[Object]
impl MutationRoot {
    async fn category_create(&self, ctx: &Context<'_>, input: CategoryInput) -> Result<CategoryPayload> {
        create::<CategoryMutation, _, _>(ctx, input, CategoryNode).await
    }

    async fn category_update(&self, ctx: &Context<'_>, id: ID, input: CategoryInput) -> Result<CategoryPayload> {
        update::<CategoryMutation, _, _>(ctx, id, ids::CATEGORY, input, CategoryNode).await
    }

    /// Children become top-level categories.
    async fn category_delete(&self, ctx: &Context<'_>, id: ID) -> Result<CategoryPayload> {
        delete::<CategoryMutation, _>(ctx, id, ids::CATEGORY, CategoryNode).await
    }

    async fn channel_create(&self, ctx: &Context<'_>, input: ChannelInput) -> Result<ChannelPayload> {
        create::<ChannelMutation, _, _>(ctx, input, ChannelNode).await
    }

    async fn channel_update(&self, ctx: &Context<'_>, id: ID, input: ChannelInput) -> Result<ChannelPayload> {
        update::<ChannelMutation, _, _>(ctx, id, ids::CHANNEL, input, ChannelNode).await
    }

    async fn channel_delete(&self, ctx: &Context<'_>, id: ID) -> Result<ChannelPayload> {
        delete::<ChannelMutation, _>(ctx, id, ids::CHANNEL, ChannelNode).await
    }

    async fn attribute_create(&self, ctx: &Context<'_>, input: AttributeInput) -> Result<AttributePayload> {
        create::<AttributeMutation, _, _>(ctx, input, AttributeNode).await
    }

    async fn attribute_update(&self, ctx: &Context<'_>, id: ID, input: AttributeInput) -> Result<AttributePayload> {
        update::<AttributeMutation, _, _>(ctx, id, ids::ATTRIBUTE, input, AttributeNode).await
    }

    async fn attribute_delete(&self, ctx: &Context<'_>, id: ID) -> Result<AttributePayload> {
        delete::<AttributeMutation, _>(ctx, id, ids::ATTRIBUTE, AttributeNode).await
    }

    async fn attribute_value_create(
        &self,
        ctx: &Context<'_>,
        input: AttributeValueInput,
    ) -> Result<AttributeValuePayload> {
        create::<AttributeValueMutation, _, _>(ctx, input, AttributeValueNode).await
    }

    async fn attribute_value_update(
        &self,
        ctx: &Context<'_>,
        id: ID,
        input: AttributeValueInput,
    ) -> Result<AttributeValuePayload> {
        update::<AttributeValueMutation, _, _>(ctx, id, ids::ATTRIBUTE_VALUE, input, AttributeValueNode).await
    }

    async fn attribute_value_delete(&self, ctx: &Context<'_>, id: ID) -> Result<AttributeValuePayload> {
        delete::<AttributeValueMutation, _>(ctx, id, ids::ATTRIBUTE_VALUE, AttributeValueNode).await
    }

    async fn entry_type_create(&self, ctx: &Context<'_>, input: EntryTypeInput) -> Result<EntryTypePayload> {
        create::<EntryTypeMutation, _, _>(ctx, input, EntryTypeNode).await
    }

    async fn entry_type_update(&self, ctx: &Context<'_>, id: ID, input: EntryTypeInput) -> Result<EntryTypePayload> {
        update::<EntryTypeMutation, _, _>(ctx, id, ids::ENTRY_TYPE, input, EntryTypeNode).await
    }

    /// Refused while entries of the type exist.
    async fn entry_type_delete(&self, ctx: &Context<'_>, id: ID) -> Result<EntryTypePayload> {
        delete::<EntryTypeMutation, _>(ctx, id, ids::ENTRY_TYPE, EntryTypeNode).await
    }

    /// Creates the entry and a document for every default document of its type.
    async fn entry_create(&self, ctx: &Context<'_>, input: EntryInput) -> Result<EntryPayload> {
        create::<EntryMutation, _, _>(ctx, input, EntryNode).await
    }

    async fn entry_update(&self, ctx: &Context<'_>, id: ID, input: EntryInput) -> Result<EntryPayload> {
        update::<EntryMutation, _, _>(ctx, id, ids::ENTRY, input, EntryNode).await
    }

    /// Deletes the entry with its documents, files and attribute values.
    async fn entry_delete(&self, ctx: &Context<'_>, id: ID) -> Result<EntryPayload> {
        delete::<EntryMutation, _>(ctx, id, ids::ENTRY, EntryNode).await
    }

    async fn document_create(&self, ctx: &Context<'_>, input: DocumentInput) -> Result<DocumentPayload> {
        create::<DocumentMutation, _, _>(ctx, input, DocumentNode).await
    }

    async fn document_update(&self, ctx: &Context<'_>, id: ID, input: DocumentInput) -> Result<DocumentPayload> {
        update::<DocumentMutation, _, _>(ctx, id, ids::DOCUMENT, input, DocumentNode).await
    }

    async fn document_delete(&self, ctx: &Context<'_>, id: ID) -> Result<DocumentPayload> {
        delete::<DocumentMutation, _>(ctx, id, ids::DOCUMENT, DocumentNode).await
    }

    async fn default_document_create(
        &self,
        ctx: &Context<'_>,
        input: DefaultDocumentInput,
    ) -> Result<DefaultDocumentPayload> {
        create::<DefaultDocumentMutation, _, _>(ctx, input, DefaultDocumentNode).await
    }

    async fn default_document_update(
        &self,
        ctx: &Context<'_>,
        id: ID,
        input: DefaultDocumentInput,
    ) -> Result<DefaultDocumentPayload> {
        update::<DefaultDocumentMutation, _, _>(ctx, id, ids::DEFAULT_DOCUMENT, input, DefaultDocumentNode).await
    }

    async fn default_document_delete(&self, ctx: &Context<'_>, id: ID) -> Result<DefaultDocumentPayload> {
        delete::<DefaultDocumentMutation, _>(ctx, id, ids::DEFAULT_DOCUMENT, DefaultDocumentNode).await
    }

    async fn investment_create(&self, ctx: &Context<'_>, input: InvestmentInput) -> Result<InvestmentPayload> {
        create::<InvestmentMutation, _, _>(ctx, input, InvestmentNode).await
    }

    async fn investment_update(
        &self,
        ctx: &Context<'_>,
        id: ID,
        input: InvestmentInput,
    ) -> Result<InvestmentPayload> {
        update::<InvestmentMutation, _, _>(ctx, id, ids::INVESTMENT, input, InvestmentNode).await
    }

    async fn investment_delete(&self, ctx: &Context<'_>, id: ID) -> Result<InvestmentPayload> {
        delete::<InvestmentMutation, _>(ctx, id, ids::INVESTMENT, InvestmentNode).await
    }

    // -------------------------------------------------------------------------
    // File workflow
    // -------------------------------------------------------------------------

    /// Upload a file; it waits for approval.
    async fn document_file_create(&self, ctx: &Context<'_>, input: DocumentFileInput) -> Result<DocumentFilePayload> {
        let rc = request_context(ctx)?;
        let mut errors = Vec::new();
        let converted = input.into_core(&mut errors);
        commit(
            rc,
            errors,
            |db, mctx| match converted {
                Some((document, file)) => db.write(|tx| add_file(tx, document, file, mctx)),
                None => Err(CoreError::invalid("document", ErrorCode::Invalid, "Invalid document id.")),
            },
            DocumentFileNode,
        )
        .await
    }

    /// Approve a waiting file; it becomes the document's active file.
    async fn document_file_approve(&self, ctx: &Context<'_>, id: ID) -> Result<DocumentFilePayload> {
        let rc = request_context(ctx)?;
        let mut errors = Vec::new();
        let pk = decode_id(&id, ids::DOCUMENT_FILE, &mut errors);
        commit(
            rc,
            errors,
            |db, mctx| db.write(|tx| approve_file(tx, DocumentFileId(pk), mctx)),
            DocumentFileNode,
        )
        .await
    }

    async fn document_file_refuse(&self, ctx: &Context<'_>, id: ID, reason: String) -> Result<DocumentFilePayload> {
        let rc = request_context(ctx)?;
        let mut errors = Vec::new();
        let pk = decode_id(&id, ids::DOCUMENT_FILE, &mut errors);
        commit(
            rc,
            errors,
            |db, mctx| db.write(|tx| refuse_file(tx, DocumentFileId(pk), &reason, mctx)),
            DocumentFileNode,
        )
        .await
    }

    /// Fetch a fresh copy of a document through the plugin serving its load type.
    async fn document_load(&self, ctx: &Context<'_>, id: ID) -> Result<DocumentLoadPayload> {
        let rc = request_context(ctx)?;
        if let Err(err) = rc.mutation_context() {
            return Ok(DocumentLoadPayload::refused(err.field_errors(), None));
        }
        let mut errors = Vec::new();
        let pk = decode_id(&id, ids::DOCUMENT, &mut errors);
        if !errors.is_empty() {
            return Ok(DocumentLoadPayload::refused(errors, None));
        }

        let outcome = match services::load_document(&rc.plugins, &rc.tenant, &rc.db, DocumentId(pk)).await {
            Ok(outcome) => outcome,
            Err(err) => {
                let errors = plugin_errors(err).map_err(internal)?;
                return Ok(DocumentLoadPayload::refused(errors, None));
            }
        };
        Ok(match outcome {
            LoadOutcome::Loaded { plugin, file } => DocumentLoadPayload {
                errors: Vec::new(),
                status: Some(LoadStatus::Loaded),
                plugin: Some(plugin),
                document_file: Some(DocumentFileNode(file)),
            },
            LoadOutcome::Failed { plugin, message } => DocumentLoadPayload {
                errors: vec![ErrorNode::from(FieldError::general(ErrorCode::PluginError, message))],
                status: Some(LoadStatus::Failed),
                plugin: Some(plugin),
                document_file: None,
            },
            LoadOutcome::NoLoader => DocumentLoadPayload::refused(
                vec![FieldError::new(
                    "load_type",
                    ErrorCode::Invalid,
                    "No active plugin loads documents of this type.",
                )],
                Some(LoadStatus::NoLoader),
            ),
            LoadOutcome::Manual => DocumentLoadPayload::refused(
                vec![FieldError::new(
                    "load_type",
                    ErrorCode::InvalidStatus,
                    "This document is uploaded manually.",
                )],
                Some(LoadStatus::Manual),
            ),
        })
    }

    // -------------------------------------------------------------------------
    // Plugins
    // -------------------------------------------------------------------------

    /// Activate, deactivate or reconfigure a plugin for this tenant.
    async fn plugin_update(
        &self,
        ctx: &Context<'_>,
        identifier: String,
        input: PluginConfigurationInput,
    ) -> Result<PluginPayload> {
        let rc = request_context(ctx)?;
        if let Err(err) = rc.mutation_context() {
            return Ok(PluginPayload::from_errors(err.field_errors()));
        }
        let values: BTreeMap<String, String> = input.values.into_iter().map(|v| (v.key, v.value)).collect();
        match rc.plugins.save_configuration(&rc.db, &identifier, input.active, values) {
            Ok(config) => {
                let Some(plugin) = rc.plugins.get(&identifier) else {
                    return Err(async_graphql::Error::new("Internal server error."));
                };
                Ok(PluginPayload::from_node(PluginNode::build(&rc.plugins, plugin.as_ref(), &config)))
            }
            Err(err) => {
                let errors = plugin_errors(err).map_err(internal)?;
                Ok(PluginPayload::from_errors(errors))
            }
        }
    }
}
