//! Snapshot capture, restore and encoding.

use crate::attribute::{Attribute, AttributeValue};
use crate::document::{DefaultDocument, Document, DocumentFile};
use crate::entry::{Category, Channel, Entry, EntryType};
use crate::error::CoreError;
use crate::event::Event;
use crate::investment::Investment;
use crate::plugin_config::PluginConfiguration;
use crate::storage::{Reader, Record, WriteTx};
use serde::{Deserialize, Serialize};

/// Header of the canonical binary format.
pub const SNAPSHOT_MAGIC: &[u8; 8] = b"CIVICSN\x01";

/// Bumped whenever a stored model changes shape.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Every record of one tenant, in primary key order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantSnapshot {
    pub version: u32,
    pub tenant: String,
    pub categories: Vec<Category>,
    pub channels: Vec<Channel>,
    pub attributes: Vec<Attribute>,
    pub attribute_values: Vec<AttributeValue>,
    pub entry_types: Vec<EntryType>,
    pub entries: Vec<Entry>,
    pub default_documents: Vec<DefaultDocument>,
    pub documents: Vec<Document>,
    pub document_files: Vec<DocumentFile>,
    pub investments: Vec<Investment>,
    pub events: Vec<Event>,
    pub plugin_configurations: Vec<PluginConfiguration>,
}

impl TenantSnapshot {
    /// Number of records across all tables.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.categories.len()
            + self.channels.len()
            + self.attributes.len()
            + self.attribute_values.len()
            + self.entry_types.len()
            + self.entries.len()
            + self.default_documents.len()
            + self.documents.len()
            + self.document_files.len()
            + self.investments.len()
            + self.events.len()
            + self.plugin_configurations.len()
    }
}

/// Capture every record visible to `reader`.
pub fn take_snapshot(reader: &impl Reader, tenant: &str) -> Result<TenantSnapshot, CoreError> {
    Ok(TenantSnapshot {
        version: SNAPSHOT_VERSION,
        tenant: tenant.to_string(),
        categories: reader.list()?,
        channels: reader.list()?,
        attributes: reader.list()?,
        attribute_values: reader.list()?,
        entry_types: reader.list()?,
        entries: reader.list()?,
        default_documents: reader.list()?,
        documents: reader.list()?,
        document_files: reader.list()?,
        investments: reader.list()?,
        events: reader.list()?,
        plugin_configurations: reader.list()?,
    })
}

fn restore_all<R: Record>(tx: &mut WriteTx, records: &[R]) -> Result<(), CoreError> {
    for record in records {
        tx.restore(record)?;
    }
    Ok(())
}

/// Write a snapshot into an empty tenant database, keeping record ids.
pub fn restore_snapshot(tx: &mut WriteTx, snapshot: &TenantSnapshot) -> Result<usize, CoreError> {
    if snapshot.version != SNAPSHOT_VERSION {
        return Err(CoreError::Snapshot(format!(
            "unsupported snapshot version {} (expected {SNAPSHOT_VERSION})",
            snapshot.version
        )));
    }
    let existing = take_snapshot(&*tx, &snapshot.tenant)?;
    if existing.record_count() > 0 {
        return Err(CoreError::Snapshot(format!(
            "target database already holds {} records",
            existing.record_count()
        )));
    }

    restore_all(tx, &snapshot.categories)?;
    restore_all(tx, &snapshot.channels)?;
    restore_all(tx, &snapshot.attributes)?;
    restore_all(tx, &snapshot.attribute_values)?;
    restore_all(tx, &snapshot.entry_types)?;
    restore_all(tx, &snapshot.entries)?;
    restore_all(tx, &snapshot.default_documents)?;
    restore_all(tx, &snapshot.documents)?;
    restore_all(tx, &snapshot.document_files)?;
    restore_all(tx, &snapshot.investments)?;
    restore_all(tx, &snapshot.events)?;
    restore_all(tx, &snapshot.plugin_configurations)?;

    tracing::info!(tenant = %snapshot.tenant, records = snapshot.record_count(), "snapshot restored");
    Ok(snapshot.record_count())
}

// =============================================================================
// ENCODING
// =============================================================================

/// Canonical binary encoding: magic header followed by postcard.
/// Identical snapshots always encode to identical bytes.
pub fn encode_canonical(snapshot: &TenantSnapshot) -> Result<Vec<u8>, CoreError> {
    let payload = postcard::to_allocvec(snapshot).map_err(|e| CoreError::Snapshot(e.to_string()))?;
    let mut bytes = Vec::with_capacity(SNAPSHOT_MAGIC.len() + payload.len());
    bytes.extend_from_slice(SNAPSHOT_MAGIC);
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

pub fn decode_canonical(bytes: &[u8]) -> Result<TenantSnapshot, CoreError> {
    let payload = bytes
        .strip_prefix(SNAPSHOT_MAGIC.as_slice())
        .ok_or_else(|| CoreError::Snapshot("missing snapshot header".to_string()))?;
    postcard::from_bytes(payload).map_err(|e| CoreError::Snapshot(e.to_string()))
}

pub fn encode_json(snapshot: &TenantSnapshot) -> Result<String, CoreError> {
    serde_json::to_string_pretty(snapshot).map_err(|e| CoreError::Snapshot(e.to_string()))
}

pub fn decode_json(text: &str) -> Result<TenantSnapshot, CoreError> {
    serde_json::from_str(text).map_err(|e| CoreError::Snapshot(e.to_string()))
}

/// Decode either format, sniffing the header.
pub fn decode_any(bytes: &[u8]) -> Result<TenantSnapshot, CoreError> {
    if bytes.starts_with(SNAPSHOT_MAGIC) {
        return decode_canonical(bytes);
    }
    let text = std::str::from_utf8(bytes).map_err(|e| CoreError::Snapshot(format!("not a snapshot: {e}")))?;
    decode_json(text)
}

/// BLAKE3 digest of an encoded snapshot, hex encoded.
#[cfg(feature = "crypto-hash")]
#[must_use]
pub fn snapshot_digest(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}
