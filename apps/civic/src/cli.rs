//! # CLI Commands
//!
//! One function per subcommand. Commands return data and leave printing to
//! [`run`], so they can be exercised directly from tests.

use crate::api;
use crate::config::{Cli, Command, ServeArgs, ServerConfig, TenantCommand};
use crate::error::CliError;
use crate::jobs::{self, SweepReport};
use crate::plugins::PluginsManager;
use chrono::Utc;
use civic_core::formats::{decode_any, encode_canonical, encode_json, restore_snapshot, snapshot_digest, take_snapshot};
use civic_core::primitives::MAX_EXPIRY_WARNING_DAYS;
use civic_core::{Tenant, TenantId, TenantPool};
use std::path::Path;
use std::sync::Arc;

/// Snapshot encodings accepted by `export`.
pub const EXPORT_FORMATS: &[&str] = &["canonical", "json"];

// =============================================================================
// TENANTS
// =============================================================================

pub fn cmd_tenant_create(data_dir: &Path, id: &str, name: &str, domains: &[String]) -> Result<Tenant, CliError> {
    let pool = TenantPool::open(data_dir)?;
    let tenant = Tenant::new(TenantId::new(id)?, name, domains, Utc::now())?;
    pool.create_tenant(tenant.clone())?;
    tracing::info!(tenant = %tenant.id, "tenant created");
    Ok(tenant)
}

pub fn cmd_tenant_list(data_dir: &Path) -> Result<Vec<Tenant>, CliError> {
    Ok(TenantPool::open(data_dir)?.tenants()?)
}

/// Returns whether the tenant existed.
pub fn cmd_tenant_delete(data_dir: &Path, id: &str) -> Result<bool, CliError> {
    let pool = TenantPool::open(data_dir)?;
    let existed = pool.delete_tenant(&TenantId::new(id)?)?;
    if existed {
        tracing::info!(tenant = id, "tenant deleted");
    }
    Ok(existed)
}

fn existing_tenant(pool: &TenantPool, id: &str) -> Result<TenantId, CliError> {
    let id = TenantId::new(id)?;
    if pool.tenant(&id)?.is_none() {
        return Err(CliError::Usage(format!("unknown tenant '{id}'")));
    }
    Ok(id)
}

// =============================================================================
// SNAPSHOTS
// =============================================================================

/// What `export` wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub records: usize,
    pub bytes: usize,
    /// BLAKE3 digest of the written file.
    pub digest: String,
}

pub fn cmd_export(data_dir: &Path, tenant: &str, output: &Path, format: &str) -> Result<ExportSummary, CliError> {
    if !EXPORT_FORMATS.contains(&format) {
        return Err(CliError::Usage(format!(
            "unknown format '{format}' (expected one of: {})",
            EXPORT_FORMATS.join(", ")
        )));
    }
    let pool = TenantPool::open(data_dir)?;
    let id = existing_tenant(&pool, tenant)?;
    let db = pool.database(&id)?;
    let snapshot = db.read(|tx| take_snapshot(tx, id.as_str()))?;
    let bytes = match format {
        "json" => encode_json(&snapshot)?.into_bytes(),
        _ => encode_canonical(&snapshot)?,
    };
    std::fs::write(output, &bytes)?;
    tracing::info!(tenant = %id, records = snapshot.record_count(), path = %output.display(), "snapshot exported");
    Ok(ExportSummary {
        records: snapshot.record_count(),
        bytes: bytes.len(),
        digest: snapshot_digest(&bytes),
    })
}

/// Restore a snapshot of either format into an empty tenant. Returns the
/// number of records written.
pub fn cmd_import(data_dir: &Path, tenant: &str, input: &Path) -> Result<usize, CliError> {
    let pool = TenantPool::open(data_dir)?;
    let id = existing_tenant(&pool, tenant)?;
    let snapshot = decode_any(&std::fs::read(input)?)?;
    let db = pool.database(&id)?;
    Ok(db.write(|tx| restore_snapshot(tx, &snapshot))?)
}

// =============================================================================
// JOBS & PLUGINS
// =============================================================================

pub async fn cmd_sweep(data_dir: &Path, warn_days: i64) -> Result<SweepReport, CliError> {
    if !(0..=MAX_EXPIRY_WARNING_DAYS).contains(&warn_days) {
        return Err(CliError::Usage(format!(
            "expiry warning days must be between 0 and {MAX_EXPIRY_WARNING_DAYS}"
        )));
    }
    let pool = TenantPool::open(data_dir)?;
    let plugins = PluginsManager::builtin();
    Ok(jobs::run_sweep(&pool, &plugins, Utc::now().date_naive(), warn_days).await)
}

/// A plugin as listed by `plugins`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginListing {
    pub identifier: String,
    pub name: String,
    /// `None` when no tenant was given.
    pub active: Option<bool>,
    pub load_types: Vec<String>,
}

pub fn cmd_plugins(data_dir: &Path, tenant: Option<&str>) -> Result<Vec<PluginListing>, CliError> {
    let plugins = PluginsManager::builtin();
    let db = match tenant {
        Some(tenant) => {
            let pool = TenantPool::open(data_dir)?;
            let id = existing_tenant(&pool, tenant)?;
            Some(pool.database(&id)?)
        }
        None => None,
    };

    let mut listings = Vec::new();
    for plugin in plugins.plugins() {
        let meta = plugin.meta();
        let active = match &db {
            Some(db) => Some(plugins.configuration(db, meta.identifier)?.active),
            None => None,
        };
        listings.push(PluginListing {
            identifier: meta.identifier.to_string(),
            name: meta.name.to_string(),
            active,
            load_types: plugin.load_types().into_iter().map(str::to_string).collect(),
        });
    }
    Ok(listings)
}

pub async fn cmd_serve(data_dir: &Path, args: &ServeArgs) -> Result<(), CliError> {
    let config = ServerConfig::try_from(args).map_err(CliError::Usage)?;
    let pool = Arc::new(TenantPool::open(data_dir)?);
    let plugins = Arc::new(PluginsManager::builtin());
    api::serve(pool, plugins, config).await
}

// =============================================================================
// DISPATCH
// =============================================================================

/// Run a parsed command line, printing results to stdout.
pub async fn run(cli: Cli) -> Result<(), CliError> {
    let data_dir = cli.data_dir.as_path();
    match cli.command {
        Command::Serve(args) => cmd_serve(data_dir, &args).await?,
        Command::Tenant { command } => match command {
            TenantCommand::Create { id, name, domains } => {
                let tenant = cmd_tenant_create(data_dir, &id, &name, &domains)?;
                println!("Created tenant {} ({})", tenant.id, tenant.name);
            }
            TenantCommand::List => {
                let tenants = cmd_tenant_list(data_dir)?;
                if tenants.is_empty() {
                    println!("No tenants.");
                }
                for tenant in tenants {
                    println!("{}\t{}\t{}", tenant.id, tenant.name, tenant.domains.join(","));
                }
            }
            TenantCommand::Delete { id } => {
                if cmd_tenant_delete(data_dir, &id)? {
                    println!("Deleted tenant {id}");
                } else {
                    return Err(CliError::Usage(format!("unknown tenant '{id}'")));
                }
            }
        },
        Command::Export { tenant, output, format } => {
            let summary = cmd_export(data_dir, &tenant, &output, &format)?;
            println!(
                "Exported {} records ({} bytes) to {}\nblake3: {}",
                summary.records,
                summary.bytes,
                output.display(),
                summary.digest
            );
        }
        Command::Import { tenant, input } => {
            let records = cmd_import(data_dir, &tenant, &input)?;
            println!("Imported {records} records into {tenant}");
        }
        Command::Sweep { expiry_warning_days } => {
            let report = cmd_sweep(data_dir, expiry_warning_days).await?;
            println!(
                "Swept {} tenants: {} expiring, {} expired, {} notifications, {} reloaded, {} failed",
                report.tenants, report.expiring, report.expired, report.notified, report.reloaded, report.failed_tenants
            );
        }
        Command::Plugins { tenant } => {
            for listing in cmd_plugins(data_dir, tenant.as_deref())? {
                let state = match listing.active {
                    Some(true) => "active",
                    Some(false) => "inactive",
                    None => "-",
                };
                println!(
                    "{}\t{}\t{}\t{}",
                    listing.identifier,
                    listing.name,
                    state,
                    listing.load_types.join(",")
                );
            }
        }
    }
    Ok(())
}
