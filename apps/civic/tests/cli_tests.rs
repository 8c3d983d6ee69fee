//! Integration tests for civic CLI commands.
//!
//! Uses tempfile for testing file-based operations.

// Allow unwrap and panic in tests - these are standard for test code
#![allow(clippy::unwrap_used, clippy::panic)]

use civic::cli::{
    cmd_export, cmd_import, cmd_plugins, cmd_sweep, cmd_tenant_create, cmd_tenant_delete, cmd_tenant_list,
};
use civic::error::CliError;
use civic_core::entry::{ChannelInput, ChannelMutation};
use civic_core::{Actor, Channel, MutationContext, Reader, TenantId, TenantPool, mutation};
use tempfile::TempDir;

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Create a temporary directory for tests.
fn create_temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// Create a tenant holding two channels.
fn create_populated_tenant(dir: &TempDir, id: &str) {
    cmd_tenant_create(dir.path(), id, "Acme City", &["acme.example.org".to_string()]).unwrap();
    let pool = TenantPool::open(dir.path()).unwrap();
    let db = pool.database(&TenantId::new(id).unwrap()).unwrap();
    let ctx = MutationContext::new(Actor::Staff("ana".into()));
    for name in ["Portal", "Ouvidoria"] {
        let input = ChannelInput {
            name: Some(name.into()),
            ..ChannelInput::default()
        };
        mutation::create::<ChannelMutation>(&db, input, &ctx).unwrap();
    }
}

fn channel_names(dir: &TempDir, id: &str) -> Vec<String> {
    let pool = TenantPool::open(dir.path()).unwrap();
    let db = pool.database(&TenantId::new(id).unwrap()).unwrap();
    let mut names: Vec<String> = db
        .read(|tx| Ok(tx.list::<Channel>()?))
        .unwrap()
        .into_iter()
        .map(|c| c.name)
        .collect();
    names.sort();
    names
}

// =============================================================================
// TENANT COMMAND TESTS
// =============================================================================

#[test]
fn test_tenant_create_and_list() {
    let temp = create_temp_dir();

    let tenant = cmd_tenant_create(temp.path(), "acme", "Acme City", &["Acme.Example.org".to_string()]).unwrap();
    assert_eq!(tenant.id.as_str(), "acme");
    assert_eq!(tenant.domains, vec!["acme.example.org".to_string()]);

    cmd_tenant_create(temp.path(), "zeta", "Zeta Town", &[]).unwrap();

    let tenants = cmd_tenant_list(temp.path()).unwrap();
    let ids: Vec<&str> = tenants.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["acme", "zeta"]);
}

#[test]
fn test_tenant_create_rejects_duplicates() {
    let temp = create_temp_dir();
    cmd_tenant_create(temp.path(), "acme", "Acme City", &[]).unwrap();

    let result = cmd_tenant_create(temp.path(), "acme", "Acme Again", &[]);
    assert!(matches!(result, Err(CliError::Core(_))));
}

#[test]
fn test_tenant_create_rejects_bad_identifier() {
    let temp = create_temp_dir();

    let result = cmd_tenant_create(temp.path(), "Not A Schema!", "Acme", &[]);
    assert!(result.is_err());
    assert!(cmd_tenant_list(temp.path()).unwrap().is_empty());
}

#[test]
fn test_tenant_delete() {
    let temp = create_temp_dir();
    cmd_tenant_create(temp.path(), "acme", "Acme City", &[]).unwrap();

    assert!(cmd_tenant_delete(temp.path(), "acme").unwrap());
    assert!(!cmd_tenant_delete(temp.path(), "acme").unwrap());
    assert!(cmd_tenant_list(temp.path()).unwrap().is_empty());
}

// =============================================================================
// EXPORT / IMPORT COMMAND TESTS
// =============================================================================

#[test]
fn test_export_import_canonical() {
    let temp = create_temp_dir();
    create_populated_tenant(&temp, "acme");
    let path = temp.path().join("acme.snapshot");

    let summary = cmd_export(temp.path(), "acme", &path, "canonical").unwrap();
    assert_eq!(summary.records, 2);
    assert_eq!(summary.bytes, std::fs::metadata(&path).unwrap().len() as usize);
    assert_eq!(summary.digest.len(), 64);

    cmd_tenant_create(temp.path(), "copy", "Copy", &[]).unwrap();
    let restored = cmd_import(temp.path(), "copy", &path).unwrap();

    assert_eq!(restored, 2);
    assert_eq!(channel_names(&temp, "copy"), vec!["Ouvidoria", "Portal"]);
}

#[test]
fn test_export_import_json() {
    let temp = create_temp_dir();
    create_populated_tenant(&temp, "acme");
    let path = temp.path().join("acme.json");

    cmd_export(temp.path(), "acme", &path, "json").unwrap();
    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.contains("\"Portal\""));

    cmd_tenant_create(temp.path(), "copy", "Copy", &[]).unwrap();
    assert_eq!(cmd_import(temp.path(), "copy", &path).unwrap(), 2);
}

#[test]
fn test_export_is_deterministic() {
    let temp = create_temp_dir();
    create_populated_tenant(&temp, "acme");

    let first = cmd_export(temp.path(), "acme", &temp.path().join("a.bin"), "canonical").unwrap();
    let second = cmd_export(temp.path(), "acme", &temp.path().join("b.bin"), "canonical").unwrap();

    assert_eq!(first.digest, second.digest);
}

#[test]
fn test_export_unknown_format() {
    let temp = create_temp_dir();
    create_populated_tenant(&temp, "acme");

    let result = cmd_export(temp.path(), "acme", &temp.path().join("out"), "xml");
    assert!(matches!(result, Err(CliError::Usage(message)) if message.contains("xml")));
}

#[test]
fn test_export_unknown_tenant() {
    let temp = create_temp_dir();

    let result = cmd_export(temp.path(), "ghost", &temp.path().join("out"), "json");
    assert!(matches!(result, Err(CliError::Usage(_))));
}

#[test]
fn test_import_refuses_populated_tenant() {
    let temp = create_temp_dir();
    create_populated_tenant(&temp, "acme");
    let path = temp.path().join("acme.snapshot");
    cmd_export(temp.path(), "acme", &path, "canonical").unwrap();

    let result = cmd_import(temp.path(), "acme", &path);
    assert!(matches!(result, Err(CliError::Core(_))));
    assert_eq!(channel_names(&temp, "acme").len(), 2);
}

#[test]
fn test_import_garbage_fails() {
    let temp = create_temp_dir();
    cmd_tenant_create(temp.path(), "acme", "Acme City", &[]).unwrap();
    let path = temp.path().join("garbage");
    std::fs::write(&path, b"definitely not a snapshot").unwrap();

    assert!(cmd_import(temp.path(), "acme", &path).is_err());
}

// =============================================================================
// PLUGINS & SWEEP COMMAND TESTS
// =============================================================================

#[test]
fn test_plugins_without_tenant() {
    let temp = create_temp_dir();

    let listings = cmd_plugins(temp.path(), None).unwrap();
    assert_eq!(listings.len(), 3);
    assert!(listings.iter().all(|l| l.active.is_none()));

    let certificates = listings
        .iter()
        .find(|l| l.identifier == "civic.verification.certificates")
        .unwrap();
    assert!(certificates.load_types.contains(&"cndt".to_string()));
}

#[test]
fn test_plugins_for_tenant_are_inactive_by_default() {
    let temp = create_temp_dir();
    cmd_tenant_create(temp.path(), "acme", "Acme City", &[]).unwrap();

    let listings = cmd_plugins(temp.path(), Some("acme")).unwrap();
    assert!(listings.iter().all(|l| l.active == Some(false)));
}

#[tokio::test]
async fn test_sweep_over_empty_tenants() {
    let temp = create_temp_dir();
    create_populated_tenant(&temp, "acme");
    cmd_tenant_create(temp.path(), "zeta", "Zeta Town", &[]).unwrap();

    let report = cmd_sweep(temp.path(), 30).await.unwrap();

    assert_eq!(report.tenants, 2);
    assert_eq!(report.expiring, 0);
    assert_eq!(report.expired, 0);
    assert_eq!(report.failed_tenants, 0);
}

#[tokio::test]
async fn test_sweep_rejects_negative_window() {
    let temp = create_temp_dir();

    let result = cmd_sweep(temp.path(), -1).await;
    assert!(matches!(result, Err(CliError::Usage(_))));
}

#[tokio::test]
async fn test_sweep_rejects_oversized_window() {
    let temp = create_temp_dir();

    let result = cmd_sweep(temp.path(), i64::MAX).await;
    assert!(matches!(result, Err(CliError::Usage(message)) if message.contains("3650")));
}
