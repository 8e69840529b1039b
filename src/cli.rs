//! # Command Line Interface
//!
//! Argument parsing and the startup sequence for `sync-on-change`.
//!
//! ```text
//! sync-on-change [OPTIONS] <TARGET>
//! ```
//!
//! Startup validates the target, resolves the configuration, probes the SSH
//! connection, creates the remote directory and then hands control to the
//! monitor loop until a signal or a fatal error ends it.

use anyhow::Result;
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use tracing::{error, info};

use crate::checksum::SyncTarget;
use crate::config::Config;
use crate::monitor::{spawn_signal_listener, MonitorLoop, SpinnerProgress};
use crate::transfer::SyncExecutor;

/// Command-line interface for sync-on-change.
#[derive(Parser, Debug)]
#[command(name = "sync-on-change")]
#[command(about = "Watch a file or directory and sync changes to a remote host via SSH")]
#[command(
    long_about = "Watches a file or directory and syncs changes to a remote host via SSH.\n\
                  Uses rsync for directories and scp for files."
)]
#[command(version)]
#[command(
    after_help = "EXAMPLES:\n  sync-on-change script.sh\n  \
                  sync-on-change -c custom.conf /path/to/directory"
)]
pub struct Cli {
    /// File or directory to watch
    pub target: PathBuf,

    /// Explicit config file path
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Do not show the monitoring spinner
    #[arg(long)]
    pub no_progress: bool,
}

impl Cli {
    /// Default tracing filter for this invocation.
    pub fn log_filter(&self) -> &'static str {
        if self.verbose {
            "sync_on_change=debug"
        } else {
            "sync_on_change=info"
        }
    }
}

/// Run the tool until interrupted or a fatal error occurs.
pub async fn run(cli: &Cli) -> Result<()> {
    let target = SyncTarget::detect(&cli.target).map_err(|e| {
        error!("{}", e);
        e
    })?;

    let config = Config::resolve(&target.path, cli.config.as_deref());
    info!("Configuration loaded from: {}", config.loaded_from);
    info!("Watching {}: {}", target.kind, target.path.display());
    info!("Remote: {}:{}", config.remote(), config.remote_path);
    info!(
        "Interval: {}s | Max failures: {}",
        config.interval_secs, config.max_failures
    );

    let shutdown = spawn_signal_listener();

    let executor = SyncExecutor::system();
    executor.probe_connection(&config).await;
    executor.ensure_remote_dir(&config).await?;

    let monitor = MonitorLoop::new(&target, &config, executor, shutdown);
    if cli.no_progress || !std::io::stderr().is_terminal() {
        monitor.run().await?;
    } else {
        monitor.with_progress(SpinnerProgress::new()).run().await?;
    }

    Ok(())
}
