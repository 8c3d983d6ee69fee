//! Civic server binary.

use civic::cli;
use civic::config::Cli;
use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("civic=info,tower_http=info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(err) = cli::run(Cli::parse()).await {
        tracing::error!(error = %err, "command failed");
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}
