//! # Error Types
//!
//! Fatal conditions raised by the sync tool. Transient problems inside a
//! monitoring cycle (an unreadable target, a failed transfer below the
//! failure threshold) never surface here; they are logged and the loop
//! carries on.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias for fallible sync-tool operations.
pub type Result<T> = std::result::Result<T, SyncToolError>;

/// Errors that terminate the process.
#[derive(Error, Debug)]
pub enum SyncToolError {
    #[error("Target not found: {}", .0.display())]
    TargetNotFound(PathBuf),

    #[error("Remote setup failed: {0}")]
    RemoteSetup(String),

    #[error("Initial sync failed")]
    InitialSync,

    #[error("Too many consecutive failures ({failures}/{max})")]
    ThresholdExceeded { failures: u32, max: u32 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncToolError {
    /// Process exit status for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            SyncToolError::TargetNotFound(_)
            | SyncToolError::RemoteSetup(_)
            | SyncToolError::InitialSync
            | SyncToolError::ThresholdExceeded { .. }
            | SyncToolError::Io(_) => 1,
        }
    }
}
