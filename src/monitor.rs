//! # Change Monitor
//!
//! The polling loop that keeps the remote copy current:
//!
//! 1. Digest the target and run a mandatory initial sync. A failure here is
//!    fatal straight away.
//! 2. Every interval, digest again and compare with the baseline recorded at
//!    the last successful sync. On a mismatch, sync.
//! 3. A successful sync replaces the baseline and resets the failure
//!    counter. A failed one increments it; reaching `max_failures` ends the
//!    loop with [`SyncToolError::ThresholdExceeded`].
//!
//! A digest that cannot be computed (the target was briefly unreadable, for
//! example) skips the cycle without touching the counter.
//!
//! Shutdown is acted on between steps, never during one: an external command
//! that has already started always runs to completion. A transfer that fails
//! after shutdown was requested ends the loop cleanly instead of counting
//! towards the failure threshold.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::checksum::{Digest, SyncTarget};
use crate::config::Config;
use crate::error::{Result, SyncToolError};
use crate::transfer::Syncer;

/// Granularity of the sleep between cycles, used only for progress output.
pub const TICK: Duration = Duration::from_millis(200);

/// Receives one notification per sleep tick. Has no influence on the loop.
pub trait ProgressSink: Send {
    fn tick(&mut self, tick: u64, total: u64);

    /// Called before log output that should not share a line with progress.
    fn clear(&mut self) {}
}

/// Discards progress notifications.
#[derive(Debug, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn tick(&mut self, _tick: u64, _total: u64) {}
}

/// Terminal spinner shown while waiting for the next check.
pub struct SpinnerProgress {
    bar: ProgressBar,
}

impl SpinnerProgress {
    pub fn new() -> Self {
        Self { bar: Self::make_bar() }
    }

    fn make_bar() -> ProgressBar {
        let style = ProgressStyle::with_template("[{elapsed_precise}] [{spinner}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["|", "/", "-", "\\", " "]);

        let bar = ProgressBar::new_spinner();
        bar.set_style(style);
        bar.set_message("Monitoring changes...");
        bar
    }
}

impl Default for SpinnerProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for SpinnerProgress {
    fn tick(&mut self, _tick: u64, _total: u64) {
        self.bar.tick();
    }

    fn clear(&mut self) {
        self.bar.finish_and_clear();
        self.bar = Self::make_bar();
    }
}

/// What a single check-and-maybe-sync cycle did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Content matches the baseline.
    Unchanged,
    /// The digest could not be computed; nothing else happened.
    Skipped,
    /// A change was pushed and became the new baseline.
    Synced,
    /// A change was detected but the sync failed.
    SyncFailed { failures: u32 },
    /// The sync failed after shutdown was requested; not counted.
    Interrupted,
}

/// Drives change detection and sync for one target.
pub struct MonitorLoop<'a, S> {
    target: &'a SyncTarget,
    config: &'a Config,
    syncer: S,
    progress: Box<dyn ProgressSink + 'a>,
    shutdown: watch::Receiver<bool>,
    listening: bool,
    baseline: Option<Digest>,
    failures: u32,
}

impl<'a, S: Syncer> MonitorLoop<'a, S> {
    pub fn new(
        target: &'a SyncTarget,
        config: &'a Config,
        syncer: S,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            target,
            config,
            syncer,
            progress: Box::new(NoProgress),
            shutdown,
            listening: true,
            baseline: None,
            failures: 0,
        }
    }

    pub fn with_progress(mut self, progress: impl ProgressSink + 'a) -> Self {
        self.progress = Box::new(progress);
        self
    }

    /// Digest recorded at the last successful sync, if known.
    pub fn baseline(&self) -> Option<Digest> {
        self.baseline
    }

    /// Consecutive failed sync attempts.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn syncer(&self) -> &S {
        &self.syncer
    }

    /// Run until shutdown is requested or a fatal error occurs.
    pub async fn run(mut self) -> Result<()> {
        if self.shutdown_requested() {
            return Ok(());
        }
        self.initial_sync().await?;

        loop {
            if self.shutdown_requested() {
                break;
            }
            if self.run_cycle().await? == CycleOutcome::Interrupted {
                break;
            }
            if self.sleep_interval().await {
                break;
            }
        }

        info!("Monitoring stopped");
        Ok(())
    }

    /// Record the baseline and push the target once, unconditionally.
    pub async fn initial_sync(&mut self) -> Result<()> {
        info!("Performing initial sync...");

        self.baseline = match self.target.digest().await {
            Ok(digest) => Some(digest),
            Err(e) => {
                warn!("Could not compute initial checksum: {}", e);
                None
            }
        };

        if !self.syncer.sync(self.target, self.config).await {
            if self.shutdown_requested() {
                info!("Initial sync interrupted by shutdown");
                return Ok(());
            }
            error!("Initial sync failed. Exiting.");
            return Err(SyncToolError::InitialSync);
        }

        self.failures = 0;
        Ok(())
    }

    /// One check: digest, compare, and sync on change.
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome> {
        let current = match self.target.digest().await {
            Ok(digest) => digest,
            Err(e) => {
                warn!("Failed to calculate checksum: {}", e);
                return Ok(CycleOutcome::Skipped);
            }
        };

        if self.baseline == Some(current) {
            return Ok(CycleOutcome::Unchanged);
        }

        self.progress.clear();
        info!("Change detected. Syncing...");
        debug!("New checksum: {}", current);

        if self.syncer.sync(self.target, self.config).await {
            self.baseline = Some(current);
            self.failures = 0;
            return Ok(CycleOutcome::Synced);
        }

        if self.shutdown_requested() {
            info!("Sync interrupted by shutdown");
            return Ok(CycleOutcome::Interrupted);
        }

        self.failures += 1;
        warn!(
            "Sync failed (failures: {}/{})",
            self.failures, self.config.max_failures
        );

        if self.failures >= self.config.max_failures {
            error!("Too many consecutive failures. Exiting.");
            return Err(SyncToolError::ThresholdExceeded {
                failures: self.failures,
                max: self.config.max_failures,
            });
        }

        Ok(CycleOutcome::SyncFailed {
            failures: self.failures,
        })
    }

    /// Sleep for the configured interval. Returns `true` if shutdown was
    /// requested meanwhile.
    pub async fn sleep_interval(&mut self) -> bool {
        let total = ticks_per_interval(self.config.interval());

        for tick in 1..=total {
            let sleep = tokio::time::sleep(TICK);
            tokio::pin!(sleep);

            loop {
                tokio::select! {
                    _ = &mut sleep => break,
                    changed = self.shutdown.changed(), if self.listening => {
                        if changed.is_err() {
                            // Sender gone: no further signals can arrive.
                            self.listening = false;
                        }
                        if *self.shutdown.borrow() {
                            self.progress.clear();
                            return true;
                        }
                    }
                }
            }

            self.progress.tick(tick, total);
        }

        false
    }

    fn shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }
}

fn ticks_per_interval(interval: Duration) -> u64 {
    let ticks = interval.as_millis() / TICK.as_millis();
    (ticks as u64).max(1)
}

/// Resolves on SIGINT, or SIGTERM on Unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Spawn the signal listener and return the receiver the loop watches.
pub fn spawn_signal_listener() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);

    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Exiting.");
        let _ = tx.send(true);
    });

    rx
}
