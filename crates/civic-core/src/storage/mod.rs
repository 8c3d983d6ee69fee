//! # Storage Module
//!
//! Tenant-isolated persistence using redb.
//!
//! Every tenant owns a dedicated redb file (its "schema"); a separate
//! `public.redb` holds the tenant registry. redb gives us:
//! - ACID transactions
//! - Crash safety (copy-on-write B-trees)
//! - MVCC (concurrent readers, single writer)
//!
//! Records are postcard-encoded and keyed by a per-kind `u64` sequence.

mod pool;
mod redb_store;
mod registry;

pub use pool::TenantPool;
pub use redb_store::{ReadTx, Reader, Record, TenantDb, WriteTx};
pub use registry::Registry;

/// Implement [`Record`] for a model whose primary key is an id newtype field.
macro_rules! record {
    ($ty:ty, $field:ident, $kind:literal, $table:literal) => {
        impl $crate::storage::Record for $ty {
            const KIND: &'static str = $kind;
            const TABLE: redb::TableDefinition<'static, u64, &'static [u8]> =
                redb::TableDefinition::new($table);

            fn key(&self) -> u64 {
                self.$field.0
            }

            fn assign_key(&mut self, key: u64) {
                self.$field = key.into();
            }
        }
    };
}

pub(crate) use record;
