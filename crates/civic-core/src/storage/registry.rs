//! The tenant registry, stored in the shared `public` database.

use crate::error::{CoreError, ErrorCode, FieldError, StoreError};
use crate::tenant::{Tenant, TenantId};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use std::path::Path;

const TENANTS: TableDefinition<'static, &'static str, &'static [u8]> =
    TableDefinition::new("tenants");

/// Registry of tenants and the domains routed to them.
pub struct Registry {
    db: Database,
}

impl Registry {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = Database::create(path.as_ref())?;
        let txn = db.begin_write()?;
        txn.open_table(TENANTS)?;
        txn.commit()?;
        Ok(Self { db })
    }

    /// Register a tenant. Ids and domains are unique across the registry.
    pub fn create(&self, tenant: &Tenant) -> Result<(), CoreError> {
        let txn = self.db.begin_write().map_err(StoreError::from)?;
        {
            let mut table = txn.open_table(TENANTS).map_err(StoreError::from)?;

            let mut errors = Vec::new();
            if table.get(tenant.id.as_str())?.is_some() {
                errors.push(FieldError::new(
                    "id",
                    ErrorCode::Unique,
                    format!("Tenant '{}' already exists.", tenant.id),
                ));
            }
            for item in table.iter()? {
                let (_, value) = item?;
                let existing: Tenant = postcard::from_bytes(value.value()).map_err(StoreError::from)?;
                for domain in &tenant.domains {
                    if existing.domains.contains(domain) {
                        errors.push(FieldError::new(
                            "domains",
                            ErrorCode::Unique,
                            format!("Domain '{}' already belongs to tenant '{}'.", domain, existing.id),
                        ));
                    }
                }
            }
            if !errors.is_empty() {
                return Err(CoreError::Validation(errors));
            }

            let bytes = postcard::to_allocvec(tenant).map_err(StoreError::from)?;
            table.insert(tenant.id.as_str(), bytes.as_slice())?;
        }
        txn.commit().map_err(StoreError::from)?;
        Ok(())
    }

    pub fn get(&self, id: &TenantId) -> Result<Option<Tenant>, CoreError> {
        let txn = self.db.begin_read().map_err(StoreError::from)?;
        let table = txn.open_table(TENANTS).map_err(StoreError::from)?;
        match table.get(id.as_str())? {
            Some(guard) => Ok(Some(
                postcard::from_bytes(guard.value()).map_err(StoreError::from)?,
            )),
            None => Ok(None),
        }
    }

    /// All tenants ordered by id.
    pub fn list(&self) -> Result<Vec<Tenant>, CoreError> {
        let txn = self.db.begin_read().map_err(StoreError::from)?;
        let table = txn.open_table(TENANTS).map_err(StoreError::from)?;
        let mut tenants = Vec::new();
        for item in table.iter()? {
            let (_, value) = item?;
            tenants.push(postcard::from_bytes(value.value()).map_err(StoreError::from)?);
        }
        Ok(tenants)
    }

    /// Remove a tenant. Returns whether it existed.
    pub fn delete(&self, id: &TenantId) -> Result<bool, CoreError> {
        let txn = self.db.begin_write().map_err(StoreError::from)?;
        let existed = {
            let mut table = txn.open_table(TENANTS).map_err(StoreError::from)?;
            let removed = table.remove(id.as_str())?.is_some();
            removed
        };
        txn.commit().map_err(StoreError::from)?;
        Ok(existed)
    }

    /// Tenant owning an already normalized host name.
    pub fn find_by_domain(&self, host: &str) -> Result<Option<Tenant>, CoreError> {
        Ok(self
            .list()?
            .into_iter()
            .find(|tenant| tenant.domains.iter().any(|domain| domain == host)))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]

    use super::*;
    use chrono::Utc;

    fn tenant(id: &str, domains: &[&str]) -> Tenant {
        Tenant::new(TenantId::new(id).unwrap(), id.to_uppercase(), domains.iter().copied(), Utc::now())
            .unwrap()
    }

    #[test]
    fn create_get_list_delete() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::open(dir.path().join("public.redb")).unwrap();

        registry.create(&tenant("beta", &["beta.gov"])).unwrap();
        registry.create(&tenant("alpha", &["alpha.gov"])).unwrap();

        let ids: Vec<_> = registry
            .list()
            .unwrap()
            .into_iter()
            .map(|t| t.id.to_string())
            .collect();
        assert_eq!(ids, vec!["alpha", "beta"]);

        let alpha = TenantId::new("alpha").unwrap();
        assert!(registry.get(&alpha).unwrap().is_some());
        assert!(registry.delete(&alpha).unwrap());
        assert!(!registry.delete(&alpha).unwrap());
        assert!(registry.get(&alpha).unwrap().is_none());
    }

    #[test]
    fn duplicate_id_and_domain_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::open(dir.path().join("public.redb")).unwrap();
        registry.create(&tenant("alpha", &["shared.gov"])).unwrap();

        let err = registry.create(&tenant("alpha", &[])).unwrap_err();
        assert!(matches!(err, CoreError::Validation(ref e) if e[0].code == ErrorCode::Unique));

        let err = registry.create(&tenant("gamma", &["shared.gov"])).unwrap_err();
        match err {
            CoreError::Validation(errors) => {
                assert_eq!(errors[0].field.as_deref(), Some("domains"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn find_by_domain() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::open(dir.path().join("public.redb")).unwrap();
        registry.create(&tenant("alpha", &["alpha.gov", "www.alpha.gov"])).unwrap();

        let found = registry.find_by_domain("www.alpha.gov").unwrap();
        assert_eq!(found.map(|t| t.id.to_string()).as_deref(), Some("alpha"));
        assert!(registry.find_by_domain("nobody.gov").unwrap().is_none());
    }
}
