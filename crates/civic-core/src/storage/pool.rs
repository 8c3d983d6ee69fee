//! Routing from tenant ids and host names to open tenant databases.

use super::redb_store::TenantDb;
use super::registry::Registry;
use crate::cache::{CacheStats, HostCache};
use crate::error::{CoreError, StoreError};
use crate::tenant::{Tenant, TenantId, normalize_host};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

const REGISTRY_FILE: &str = "public.redb";
const TENANTS_DIR: &str = "tenants";

/// Owns the registry and every open tenant database under a data directory.
///
/// ```text
/// <data_dir>/public.redb            registry
/// <data_dir>/tenants/<tenant>.redb  one file per tenant
/// ```
///
/// redb holds an exclusive lock per file, so each tenant database is opened
/// once and shared through `Arc`.
pub struct TenantPool {
    root: PathBuf,
    registry: Registry,
    open: RwLock<BTreeMap<TenantId, Arc<TenantDb>>>,
    hosts: Mutex<HostCache>,
}

impl TenantPool {
    pub fn open(root: impl AsRef<Path>) -> Result<Self, CoreError> {
        Self::with_cache_size(root, crate::cache::DEFAULT_CACHE_SIZE)
    }

    pub fn with_cache_size(root: impl AsRef<Path>, cache_size: usize) -> Result<Self, CoreError> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(root.join(TENANTS_DIR)).map_err(StoreError::from)?;
        let registry = Registry::open(root.join(REGISTRY_FILE))?;
        Ok(Self {
            root,
            registry,
            open: RwLock::new(BTreeMap::new()),
            hosts: Mutex::new(HostCache::new(cache_size)),
        })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn tenant_path(&self, id: &TenantId) -> PathBuf {
        self.root.join(TENANTS_DIR).join(format!("{id}.redb"))
    }

    /// Register a tenant and create its database with every table.
    pub fn create_tenant(&self, tenant: Tenant) -> Result<Arc<TenantDb>, CoreError> {
        self.registry.create(&tenant)?;
        let db = Arc::new(TenantDb::open(tenant.id.clone(), self.tenant_path(&tenant.id))?);
        self.open
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(tenant.id.clone(), Arc::clone(&db));
        self.invalidate_hosts();
        tracing::info!(tenant = %tenant.id, domains = ?tenant.domains, "tenant created");
        Ok(db)
    }

    /// Unregister a tenant and delete its database file.
    ///
    /// Handles already given out keep working against the unlinked file
    /// until dropped; their writes are lost with it. The pool stops handing
    /// out the tenant at once.
    pub fn delete_tenant(&self, id: &TenantId) -> Result<bool, CoreError> {
        let existed = self.registry.delete(id)?;
        let dropped = self
            .open
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
        self.invalidate_hosts();
        if let Some(db) = dropped {
            let in_flight = Arc::strong_count(&db) - 1;
            if in_flight > 0 {
                tracing::warn!(tenant = %id, in_flight, "deleting tenant with open database handles");
            }
        }

        let path = self.tenant_path(id);
        if path.exists() {
            std::fs::remove_file(&path).map_err(StoreError::from)?;
        }
        if existed {
            tracing::info!(tenant = %id, "tenant deleted");
        }
        Ok(existed)
    }

    pub fn tenant(&self, id: &TenantId) -> Result<Option<Tenant>, CoreError> {
        self.registry.get(id)
    }

    pub fn tenants(&self) -> Result<Vec<Tenant>, CoreError> {
        self.registry.list()
    }

    /// Database of a registered tenant, opened on first use.
    pub fn database(&self, id: &TenantId) -> Result<Arc<TenantDb>, CoreError> {
        if let Some(db) = self
            .open
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
        {
            return Ok(Arc::clone(db));
        }

        if self.registry.get(id)?.is_none() {
            return Err(CoreError::Tenant(format!("unknown tenant '{id}'")));
        }

        let mut open = self.open.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(db) = open.get(id) {
            return Ok(Arc::clone(db));
        }
        let db = Arc::new(TenantDb::open(id.clone(), self.tenant_path(id))?);
        open.insert(id.clone(), Arc::clone(&db));
        tracing::debug!(tenant = %id, "tenant database opened");
        Ok(db)
    }

    /// Map a `Host` header to a tenant id.
    pub fn resolve_host(&self, raw_host: &str) -> Result<Option<TenantId>, CoreError> {
        let Some(host) = normalize_host(raw_host) else {
            return Ok(None);
        };

        if let Some(cached) = self
            .hosts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&host)
        {
            return Ok(cached);
        }

        let resolved = self.registry.find_by_domain(&host)?.map(|tenant| tenant.id);
        self.hosts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(host, resolved.clone());
        Ok(resolved)
    }

    #[must_use]
    pub fn host_cache_stats(&self) -> CacheStats {
        self.hosts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .stats()
    }

    fn invalidate_hosts(&self) {
        self.hosts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
