//! # Formats Module
//!
//! Tenant snapshots for backup, migration between data directories and
//! inspection.
//!
//! This module contains:
//! - Canonical binary format (magic header + postcard)
//! - JSON format for humans and external tooling
//!
//! File I/O stays in the app layer (apps/civic). This module only converts
//! between a tenant database and bytes.

mod snapshot;

pub use snapshot::*;
