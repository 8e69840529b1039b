//! # Remote Transfer Module
//!
//! Pushes the watched target to the remote host using the standard OpenSSH
//! tool set, which is assumed to be installed and already trusted:
//!
//! - **Directories** are mirrored with `rsync --delete`, so files removed
//!   locally disappear remotely as well
//! - **Files** are copied with `scp`
//! - After a successful transfer shell scripts are marked executable
//!   remotely; a failure there is logged and does not fail the sync
//!
//! The same module owns the startup collaborators: a short connectivity
//! probe and creation of the remote directory.
//!
//! Commands are spawned directly, without a local shell, and run to
//! completion with no timeout. Everything goes through the
//! [`CommandRunner`] trait so tests can script the outcomes.

use async_trait::async_trait;
use std::ffi::OsString;
use std::fmt;
use std::io;
use std::process::Stdio;
use tracing::{debug, info, warn};

use crate::checksum::{SyncTarget, TargetKind};
use crate::config::Config;
use crate::error::SyncToolError;

/// Connect timeout, in seconds, for the startup connectivity probe.
pub const PROBE_CONNECT_TIMEOUT_SECS: u32 = 5;

/// An external command line. Arguments stay `OsString` so local paths
/// reach the program byte for byte.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<OsString>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Captured result of a finished command.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            stderr: stderr.into(),
            ..Default::default()
        }
    }
}

/// Runs external commands. `Err` means the program could not be started.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, invocation: &Invocation) -> io::Result<CommandOutput>;
}

/// Spawns real processes and waits for them to exit.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, invocation: &Invocation) -> io::Result<CommandOutput> {
        let output = tokio::process::Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .output()
            .await?;

        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Anything that can push the target to the remote side.
#[async_trait]
pub trait Syncer: Send + Sync {
    /// Returns `true` when the primary transfer succeeded.
    async fn sync(&self, target: &SyncTarget, config: &Config) -> bool;
}

/// Drives rsync/scp/ssh through a [`CommandRunner`].
pub struct SyncExecutor<R = SystemRunner> {
    runner: R,
}

impl SyncExecutor<SystemRunner> {
    pub fn system() -> Self {
        Self::new(SystemRunner)
    }
}

impl<R: CommandRunner> SyncExecutor<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    /// Check that key-based SSH login works.
    ///
    /// A failed probe is not fatal; the operator gets a hint on how to
    /// install a key and startup continues.
    pub async fn probe_connection(&self, config: &Config) -> bool {
        info!("Checking SSH connection...");
        let remote = config.remote();
        let probe = Invocation::new("ssh")
            .arg("-o")
            .arg("BatchMode=yes")
            .arg("-o")
            .arg(format!("ConnectTimeout={}", PROBE_CONNECT_TIMEOUT_SECS))
            .arg(&remote)
            .arg("echo ok");

        debug!("Running: {}", probe);
        let reachable = match self.runner.run(&probe).await {
            Ok(output) => output.success && output.stdout.contains("ok"),
            Err(e) => {
                warn!("Could not start ssh: {}", e);
                false
            }
        };

        if reachable {
            info!("SSH key authentication is already set up.");
        } else {
            warn!("SSH key authentication may not be set up for {}.", remote);
            info!("Set it up with: ssh-copy-id {}", remote);
        }

        reachable
    }

    /// Create the remote base directory.
    pub async fn ensure_remote_dir(&self, config: &Config) -> Result<(), SyncToolError> {
        info!("Ensuring remote directory exists: {}", config.remote_path);
        let mkdir = Invocation::new("ssh")
            .arg(config.remote())
            .arg(format!("mkdir -p {}", config.remote_path));

        if self.execute(&mkdir).await {
            Ok(())
        } else {
            Err(SyncToolError::RemoteSetup(format!(
                "could not create {} on {}",
                config.remote_path,
                config.remote()
            )))
        }
    }

    async fn sync_directory(&self, target: &SyncTarget, config: &Config) -> bool {
        let remote = config.remote();
        // Trailing slash: copy the directory's contents, not the directory.
        let source = target.path.join("").into_os_string();
        let rsync = Invocation::new("rsync")
            .arg("-avz")
            .arg("--delete")
            .arg(source)
            .arg(format!("{}:{}", remote, config.remote_dir()));

        if !self.execute(&rsync).await {
            // TODO: archive the tree, scp it over and unpack it remotely when rsync is unavailable
            warn!("rsync failed; archive fallback is not implemented");
            return false;
        }
        info!("Directory synced successfully (rsync)");

        let chmod = Invocation::new("ssh").arg(&remote).arg(format!(
            "find {} -name '*.sh' -exec chmod +x {{}} +",
            config.remote_path
        ));
        if self.execute(&chmod).await {
            info!("Remote executable permissions set for shell scripts");
        } else {
            warn!("Failed to set remote executable permissions");
        }

        true
    }

    async fn sync_file(&self, target: &SyncTarget, config: &Config) -> bool {
        let remote = config.remote();
        let scp = Invocation::new("scp")
            .arg(target.path.as_os_str())
            .arg(format!("{}:{}", remote, config.remote_path));

        if !self.execute(&scp).await {
            return false;
        }
        info!("File synced successfully");

        let Some(name) = target.file_name() else {
            warn!("Cannot derive a remote file name from {}", target.path.display());
            return true;
        };
        let mut command = OsString::from(format!("chmod +x {}", config.remote_dir()));
        command.push(name);
        let chmod = Invocation::new("ssh").arg(&remote).arg(command);
        if self.execute(&chmod).await {
            info!("Remote executable permission set successfully");
        } else {
            warn!("Failed to set remote executable permission");
        }

        true
    }

    /// Run one command, logging failures. Spawn errors count as failure.
    async fn execute(&self, invocation: &Invocation) -> bool {
        debug!("Running: {}", invocation);
        match self.runner.run(invocation).await {
            Ok(output) if output.success => true,
            Ok(output) => {
                warn!("Command failed: {}", invocation);
                let stderr = output.stderr.trim();
                if !stderr.is_empty() {
                    warn!("{}", stderr);
                }
                false
            }
            Err(e) => {
                warn!("Could not start {}: {}", invocation.program, e);
                false
            }
        }
    }
}

#[async_trait]
impl<R: CommandRunner> Syncer for SyncExecutor<R> {
    async fn sync(&self, target: &SyncTarget, config: &Config) -> bool {
        match target.kind {
            TargetKind::Directory => self.sync_directory(target, config).await,
            TargetKind::File => self.sync_file(target, config).await,
        }
    }
}
