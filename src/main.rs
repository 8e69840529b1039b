//! # sync-on-change
//!
//! Entry point for the sync-on-change utility. Sets up logging, parses the
//! command line and maps fatal errors to the process exit status.

use clap::Parser;
use colored::*;
use sync_on_change::cli::{self, Cli};
use sync_on_change::error::SyncToolError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // Help and version go to stdout and succeed; usage errors exit 1.
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_filter().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = cli::run(&cli).await {
        let code = e
            .downcast_ref::<SyncToolError>()
            .map(SyncToolError::exit_code)
            .unwrap_or(1);
        eprintln!("{} {}", "Error:".red().bold(), e.to_string().red());
        std::process::exit(code);
    }
}
