//! # Civic Library
//!
//! The Civic server as a library: GraphQL schema, HTTP API, plugins,
//! background jobs and CLI commands.
//!
//! The `civic` binary is a thin wrapper around [`cli::run`]; integration
//! tests drive the same modules directly.

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod graphql;
pub mod jobs;
pub mod plugins;
pub mod services;

// Re-export civic_core for convenience
pub use civic_core;
