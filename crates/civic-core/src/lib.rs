//! # Civic Core
//!
//! The tenant-scoped compliance engine behind the Civic portal.
//!
//! ## Layout
//!
//! - [`tenant`] and [`storage`]: one redb database per tenant, routed by id or host
//! - [`entry`], [`document`], [`investment`]: the catalog that tenants publish
//! - [`attribute`] and [`assignment`]: dynamically configured fields
//! - [`mutation`]: validated create/update/delete plumbing shared by every model
//! - [`event`]: the audit trail written alongside every change
//! - [`formats`]: tenant snapshots for export and import
//! - [`system`]: compliance summaries
//!
//! This crate performs no I/O beyond its own database files and never talks to
//! the network. Plugins and the GraphQL surface live in `apps/civic`.

pub mod assignment;
pub mod attribute;
pub mod cache;
pub mod document;
pub mod entry;
pub mod error;
pub mod event;
pub mod formats;
pub mod investment;
pub mod mutation;
pub mod plugin_config;
pub mod primitives;
pub mod slug;
pub mod storage;
pub mod system;
pub mod tenant;
pub mod validation;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use assignment::{AssignedAttribute, AttributeAssignment, AttributeAssignmentInput, AttributeOwner};
pub use attribute::{Attribute, AttributeTarget, AttributeValue, InputType};
pub use document::{DefaultDocument, Document, DocumentFile, DocumentStatus, FileStatus};
pub use entry::{Category, Channel, Entry, EntryKind, EntryType};
pub use error::{CoreError, ErrorCode, FieldError, StoreError};
pub use event::{Event, EventKind};
pub use investment::{Investment, InvestmentItem};
pub use mutation::{Actor, ModelMutation, MutationContext, MutationOutcome};
pub use plugin_config::PluginConfiguration;
pub use storage::{Reader, Record, TenantDb, TenantPool, WriteTx};
pub use system::ComplianceSummary;
pub use tenant::{Tenant, TenantId};

// =============================================================================
// IDENTIFIERS
// =============================================================================

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
        )]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }
    };
}

define_id!(
    /// Primary key of a [`Category`].
    CategoryId
);
define_id!(
    /// Primary key of a [`Channel`].
    ChannelId
);
define_id!(
    /// Primary key of an [`EntryType`].
    EntryTypeId
);
define_id!(
    /// Primary key of an [`Entry`].
    EntryId
);
define_id!(
    /// Primary key of an [`Attribute`].
    AttributeId
);
define_id!(
    /// Primary key of an [`AttributeValue`].
    AttributeValueId
);
define_id!(
    /// Primary key of a [`Document`].
    DocumentId
);
define_id!(
    /// Primary key of a [`DefaultDocument`].
    DefaultDocumentId
);
define_id!(
    /// Primary key of a [`DocumentFile`].
    DocumentFileId
);
define_id!(
    /// Primary key of an [`Investment`].
    InvestmentId
);
define_id!(
    /// Primary key of an [`Event`].
    EventId
);
define_id!(
    /// Primary key of a [`PluginConfiguration`].
    PluginConfigId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_display_as_plain_numbers() {
        assert_eq!(EntryId(42).to_string(), "42");
        assert_eq!(DocumentFileId::from(7), DocumentFileId(7));
    }

    #[test]
    fn ids_order_numerically() {
        let mut ids = vec![EntryId(3), EntryId(1), EntryId(2)];
        ids.sort();
        assert_eq!(ids, vec![EntryId(1), EntryId(2), EntryId(3)]);
    }
}
