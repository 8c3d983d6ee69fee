//! # System Module
//!
//! Tenant-wide compliance figures.
//!
//! The summary is derived on demand from documents and their files; nothing
//! here is stored. It feeds the `complianceSummary` query and the CLI.

mod compliance;

pub use compliance::*;
