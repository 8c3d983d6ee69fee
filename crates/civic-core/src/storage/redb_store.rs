//! Typed transactional access to one tenant database.

use crate::error::{CoreError, StoreError};
use crate::tenant::TenantId;
use crate::{
    Attribute, AttributeValue, Category, Channel, DefaultDocument, Document, DocumentFile, Entry,
    EntryType, Event, Investment, PluginConfiguration,
};
use redb::{
    Database, ReadTransaction, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

/// Per-kind id sequences: kind -> last assigned key.
const SEQUENCES: TableDefinition<'static, &'static str, u64> = TableDefinition::new("sequences");

// =============================================================================
// RECORD TRAIT
// =============================================================================

/// A model persisted in its own table, keyed by a `u64` primary key.
pub trait Record: Serialize + DeserializeOwned + Clone {
    /// Short lowercase name, used for sequences and error messages.
    const KIND: &'static str;

    /// Table holding postcard-encoded records.
    const TABLE: TableDefinition<'static, u64, &'static [u8]>;

    fn key(&self) -> u64;

    fn assign_key(&mut self, key: u64);
}

fn decode<R: Record>(bytes: &[u8]) -> Result<R, StoreError> {
    Ok(postcard::from_bytes(bytes)?)
}

fn read_one<R: Record>(
    table: &impl ReadableTable<u64, &'static [u8]>,
    key: u64,
) -> Result<Option<R>, StoreError> {
    match table.get(key)? {
        Some(guard) => Ok(Some(decode(guard.value())?)),
        None => Ok(None),
    }
}

fn read_all<R: Record>(
    table: &impl ReadableTable<u64, &'static [u8]>,
) -> Result<Vec<R>, StoreError> {
    let mut records = Vec::new();
    for item in table.iter()? {
        let (_, value) = item?;
        records.push(decode(value.value())?);
    }
    Ok(records)
}

// =============================================================================
// READER TRAIT
// =============================================================================

/// Read operations shared by read and write transactions.
///
/// Listings come back in primary key order.
pub trait Reader {
    fn get<R: Record>(&self, key: u64) -> Result<Option<R>, StoreError>;

    fn list<R: Record>(&self) -> Result<Vec<R>, StoreError>;

    fn filter<R: Record>(&self, mut predicate: impl FnMut(&R) -> bool) -> Result<Vec<R>, StoreError> {
        Ok(self
            .list::<R>()?
            .into_iter()
            .filter(|record| predicate(record))
            .collect())
    }

    fn find<R: Record>(&self, mut predicate: impl FnMut(&R) -> bool) -> Result<Option<R>, StoreError> {
        Ok(self
            .list::<R>()?
            .into_iter()
            .find(|record| predicate(record)))
    }

    fn exists<R: Record>(&self, key: u64) -> Result<bool, StoreError> {
        Ok(self.get::<R>(key)?.is_some())
    }

    /// Fetch a record or fail with [`CoreError::NotFound`].
    fn require<R: Record>(&self, key: u64) -> Result<R, CoreError> {
        self.get::<R>(key)?
            .ok_or(CoreError::NotFound { kind: R::KIND, id: key })
    }
}

/// Snapshot view of a tenant database.
pub struct ReadTx {
    txn: ReadTransaction,
}

impl Reader for ReadTx {
    fn get<R: Record>(&self, key: u64) -> Result<Option<R>, StoreError> {
        let table = self.txn.open_table(R::TABLE)?;
        read_one(&table, key)
    }

    fn list<R: Record>(&self) -> Result<Vec<R>, StoreError> {
        let table = self.txn.open_table(R::TABLE)?;
        read_all(&table)
    }
}

/// Open write transaction. Committed by [`TenantDb::write`] when the
/// closure succeeds, aborted otherwise.
pub struct WriteTx {
    txn: WriteTransaction,
}

impl Reader for WriteTx {
    fn get<R: Record>(&self, key: u64) -> Result<Option<R>, StoreError> {
        let table = self.txn.open_table(R::TABLE)?;
        read_one(&table, key)
    }

    fn list<R: Record>(&self) -> Result<Vec<R>, StoreError> {
        let table = self.txn.open_table(R::TABLE)?;
        read_all(&table)
    }
}

impl WriteTx {
    /// Assign the next key of the record's kind and store it.
    pub fn insert<R: Record>(&mut self, mut record: R) -> Result<R, StoreError> {
        let key = self.next_key(R::KIND)?;
        record.assign_key(key);
        self.put(&record)?;
        Ok(record)
    }

    /// Store a record under its current key, replacing any previous version.
    pub fn put<R: Record>(&mut self, record: &R) -> Result<(), StoreError> {
        let bytes = postcard::to_allocvec(record)?;
        let mut table = self.txn.open_table(R::TABLE)?;
        table.insert(record.key(), bytes.as_slice())?;
        Ok(())
    }

    /// Store a record with a key coming from elsewhere (snapshot import) and
    /// keep the sequence ahead of it.
    pub fn restore<R: Record>(&mut self, record: &R) -> Result<(), StoreError> {
        self.put(record)?;
        let mut sequences = self.txn.open_table(SEQUENCES)?;
        let current = sequences.get(R::KIND)?.map(|guard| guard.value()).unwrap_or(0);
        if record.key() > current {
            sequences.insert(R::KIND, record.key())?;
        }
        Ok(())
    }

    /// Remove a record. Returns whether it existed.
    pub fn remove<R: Record>(&mut self, key: u64) -> Result<bool, StoreError> {
        let mut table = self.txn.open_table(R::TABLE)?;
        let existed = table.remove(key)?.is_some();
        Ok(existed)
    }

    /// Remove every record of a kind matching the predicate. Returns the removed records.
    pub fn remove_where<R: Record>(
        &mut self,
        predicate: impl FnMut(&R) -> bool,
    ) -> Result<Vec<R>, StoreError> {
        let doomed = self.filter::<R>(predicate)?;
        for record in &doomed {
            self.remove::<R>(record.key())?;
        }
        Ok(doomed)
    }

    fn next_key(&mut self, kind: &'static str) -> Result<u64, StoreError> {
        let mut sequences = self.txn.open_table(SEQUENCES)?;
        let current = sequences.get(kind)?.map(|guard| guard.value()).unwrap_or(0);
        let next = current.saturating_add(1);
        sequences.insert(kind, next)?;
        Ok(next)
    }
}

// =============================================================================
// TENANT DATABASE
// =============================================================================

/// The database of a single tenant.
pub struct TenantDb {
    tenant: TenantId,
    path: PathBuf,
    db: Database,
}

impl std::fmt::Debug for TenantDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantDb")
            .field("tenant", &self.tenant)
            .field("path", &self.path)
            .finish()
    }
}

impl TenantDb {
    /// Open (or create) the database file and make sure every table exists.
    pub fn open(tenant: TenantId, path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let db = Database::create(&path)?;
        let store = Self { tenant, path, db };
        store.ensure_tables()?;
        Ok(store)
    }

    #[must_use]
    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` against a consistent snapshot.
    pub fn read<T>(&self, f: impl FnOnce(&ReadTx) -> Result<T, CoreError>) -> Result<T, CoreError> {
        let txn = self.db.begin_read().map_err(StoreError::from)?;
        f(&ReadTx { txn })
    }

    /// Run `f` inside a write transaction. Nothing is committed if `f` fails.
    pub fn write<T>(
        &self,
        f: impl FnOnce(&mut WriteTx) -> Result<T, CoreError>,
    ) -> Result<T, CoreError> {
        let txn = self.db.begin_write().map_err(StoreError::from)?;
        let mut tx = WriteTx { txn };
        match f(&mut tx) {
            Ok(value) => {
                tx.txn.commit().map_err(StoreError::from)?;
                Ok(value)
            }
            Err(err) => {
                if let Err(abort) = tx.txn.abort() {
                    tracing::warn!(tenant = %self.tenant, error = %abort, "failed to abort transaction");
                }
                Err(err)
            }
        }
    }

    fn ensure_tables(&self) -> Result<(), StoreError> {
        let txn = self.db.begin_write()?;
        txn.open_table(SEQUENCES)?;
        txn.open_table(Category::TABLE)?;
        txn.open_table(Channel::TABLE)?;
        txn.open_table(EntryType::TABLE)?;
        txn.open_table(Entry::TABLE)?;
        txn.open_table(Attribute::TABLE)?;
        txn.open_table(AttributeValue::TABLE)?;
        txn.open_table(Document::TABLE)?;
        txn.open_table(DefaultDocument::TABLE)?;
        txn.open_table(DocumentFile::TABLE)?;
        txn.open_table(Investment::TABLE)?;
        txn.open_table(Event::TABLE)?;
        txn.open_table(PluginConfiguration::TABLE)?;
        txn.commit()?;
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::{Channel, ChannelId};
    use tempfile::TempDir;

    fn open_db() -> (TempDir, TenantDb) {
        let dir = tempfile::tempdir().unwrap();
        let tenant = TenantId::new("acme").unwrap();
        let db = TenantDb::open(tenant, dir.path().join("acme.redb")).unwrap();
        (dir, db)
    }

    fn channel(name: &str) -> Channel {
        Channel {
            id: ChannelId(0),
            name: name.to_string(),
            slug: name.to_lowercase(),
            is_active: true,
        }
    }

    #[test]
    fn insert_assigns_sequential_keys() {
        let (_dir, db) = open_db();
        let (a, b) = db
            .write(|tx| Ok((tx.insert(channel("A"))?, tx.insert(channel("B"))?)))
            .unwrap();
        assert_eq!(a.id, ChannelId(1));
        assert_eq!(b.id, ChannelId(2));

        let listed = db.read(|tx| Ok(tx.list::<Channel>()?)).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].name, "A");
    }

    #[test]
    fn failed_write_is_not_committed() {
        let (_dir, db) = open_db();
        let result: Result<(), CoreError> = db.write(|tx| {
            tx.insert(channel("Lost"))?;
            Err(CoreError::Tenant("boom".into()))
        });
        assert!(result.is_err());

        let listed = db.read(|tx| Ok(tx.list::<Channel>()?)).unwrap();
        assert!(listed.is_empty());
    }

    #[test]
    fn remove_and_require() {
        let (_dir, db) = open_db();
        let created = db.write(|tx| Ok(tx.insert(channel("A"))?)).unwrap();
        let removed = db.write(|tx| Ok(tx.remove::<Channel>(created.id.0)?)).unwrap();
        assert!(removed);

        let missing = db.read(|tx| tx.require::<Channel>(created.id.0));
        assert!(matches!(missing, Err(CoreError::NotFound { kind: "channel", .. })));
    }

    #[test]
    fn restore_keeps_sequence_ahead() {
        let (_dir, db) = open_db();
        let mut imported = channel("Imported");
        imported.id = ChannelId(10);
        db.write(|tx| Ok(tx.restore(&imported)?)).unwrap();

        let next = db.write(|tx| Ok(tx.insert(channel("Next"))?)).unwrap();
        assert_eq!(next.id, ChannelId(11));
    }

    #[test]
    fn reopen_preserves_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.redb");
        {
            let db = TenantDb::open(TenantId::new("town").unwrap(), &path).unwrap();
            db.write(|tx| Ok(tx.insert(channel("Kept"))?)).unwrap();
        }
        let db = TenantDb::open(TenantId::new("town").unwrap(), &path).unwrap();
        let listed = db.read(|tx| Ok(tx.list::<Channel>()?)).unwrap();
        assert_eq!(listed.len(), 1);
    }
}
