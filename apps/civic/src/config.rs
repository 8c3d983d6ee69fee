//! # Configuration
//!
//! Command line and environment configuration. Every server setting can be
//! given as a flag or through its `CIVIC_*` environment variable.

use clap::{Args, Parser, Subcommand};
use civic_core::primitives::{DEFAULT_EXPIRY_WARNING_DAYS, MAX_EXPIRY_WARNING_DAYS};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "civic", version, about = "Multi-tenant transparency portal server")]
pub struct Cli {
    /// Directory holding the tenant registry and one database per tenant.
    #[arg(long, env = "CIVIC_DATA_DIR", default_value = "./data", global = true)]
    pub data_dir: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP/GraphQL server.
    Serve(ServeArgs),

    /// Manage tenants.
    Tenant {
        #[command(subcommand)]
        command: TenantCommand,
    },

    /// Write a tenant snapshot to a file.
    Export {
        #[arg(long)]
        tenant: String,
        #[arg(long, short)]
        output: PathBuf,
        /// `canonical` (binary) or `json`.
        #[arg(long, default_value = "canonical")]
        format: String,
    },

    /// Restore a snapshot into an empty tenant.
    Import {
        #[arg(long)]
        tenant: String,
        #[arg(long, short)]
        input: PathBuf,
    },

    /// Run the expiry sweep once over every tenant.
    Sweep {
        #[arg(long, env = "CIVIC_EXPIRY_WARNING_DAYS", default_value_t = DEFAULT_EXPIRY_WARNING_DAYS)]
        expiry_warning_days: i64,
    },

    /// List plugins, with a tenant's configuration when given.
    Plugins {
        #[arg(long)]
        tenant: Option<String>,
    },
}

#[derive(Debug, Subcommand)]
pub enum TenantCommand {
    Create {
        id: String,
        #[arg(long)]
        name: String,
        /// Host names routed to the tenant (repeatable).
        #[arg(long = "domain")]
        domains: Vec<String>,
    },
    List,
    Delete {
        id: String,
    },
}

#[derive(Debug, Clone, Args)]
pub struct ServeArgs {
    #[arg(long, env = "CIVIC_BIND", default_value = "127.0.0.1:8000")]
    pub bind: SocketAddr,

    /// Comma separated `label=key` pairs. Without keys every caller is staff.
    #[arg(long, env = "CIVIC_API_KEYS", value_delimiter = ',')]
    pub api_keys: Vec<String>,

    /// Requests per second accepted across all clients; 0 disables limiting.
    #[arg(long, env = "CIVIC_RATE_LIMIT", default_value_t = 100)]
    pub rate_limit: u32,

    /// Seconds between expiry sweeps; 0 disables the sweeper.
    #[arg(long, env = "CIVIC_SWEEP_INTERVAL_SECS", default_value_t = 3600)]
    pub sweep_interval_secs: u64,

    #[arg(long, env = "CIVIC_EXPIRY_WARNING_DAYS", default_value_t = DEFAULT_EXPIRY_WARNING_DAYS)]
    pub expiry_warning_days: i64,
}

/// A staff API key and the label recorded as the actor of its changes.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey {
    pub label: String,
    pub key: String,
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKey").field("label", &self.label).finish()
    }
}

/// Settings of a running server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub api_keys: Vec<ApiKey>,
    pub rate_limit: u32,
    pub sweep_interval: Option<Duration>,
    pub expiry_warning_days: i64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8000)),
            api_keys: Vec::new(),
            rate_limit: 100,
            sweep_interval: Some(Duration::from_secs(3600)),
            expiry_warning_days: DEFAULT_EXPIRY_WARNING_DAYS,
        }
    }
}

impl TryFrom<&ServeArgs> for ServerConfig {
    type Error = String;

    fn try_from(args: &ServeArgs) -> Result<Self, Self::Error> {
        if !(0..=MAX_EXPIRY_WARNING_DAYS).contains(&args.expiry_warning_days) {
            return Err(format!("expiry warning days must be between 0 and {MAX_EXPIRY_WARNING_DAYS}"));
        }
        Ok(Self {
            bind: args.bind,
            api_keys: parse_api_keys(&args.api_keys)?,
            rate_limit: args.rate_limit,
            sweep_interval: (args.sweep_interval_secs > 0).then(|| Duration::from_secs(args.sweep_interval_secs)),
            expiry_warning_days: args.expiry_warning_days,
        })
    }
}

/// Parse `label=key` pairs. Labels and keys must be non-empty and labels
/// unique.
pub fn parse_api_keys(raw: &[String]) -> Result<Vec<ApiKey>, String> {
    let mut keys: Vec<ApiKey> = Vec::new();
    for item in raw.iter().map(|s| s.trim()).filter(|s| !s.is_empty()) {
        let (label, key) = item
            .split_once('=')
            .ok_or_else(|| format!("API key entry must look like label=key, got '{}'", mask(item)))?;
        let (label, key) = (label.trim(), key.trim());
        if label.is_empty() || key.is_empty() {
            return Err(format!("API key entry '{}' has an empty label or key", mask(item)));
        }
        if keys.iter().any(|k| k.label == label) {
            return Err(format!("duplicate API key label '{label}'"));
        }
        keys.push(ApiKey {
            label: label.to_string(),
            key: key.to_string(),
        });
    }
    Ok(keys)
}

fn mask(item: &str) -> String {
    match item.split_once('=') {
        Some((label, _)) => format!("{label}=***"),
        None => "***".to_string(),
    }
}
