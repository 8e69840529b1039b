//! # sync-on-change
//!
//! Watches a single file or directory tree and mirrors it to a remote host
//! over SSH whenever its content changes.
//!
//! Changes are detected by SHA-256 content digests rather than modification
//! times. Consecutive transfer failures are counted, and the tool gives up
//! once a configurable threshold is reached instead of retrying forever.
//!
//! ## Core Modules
//!
//! - [`config`] - Layered `key=value` configuration discovery
//! - [`checksum`] - File and directory-tree content digests
//! - [`transfer`] - rsync/scp/ssh invocation
//! - [`monitor`] - The poll, compare and sync loop with its failure threshold
//! - [`cli`] - Command-line surface and startup sequence
//! - [`error`] - Fatal error kinds and their exit statuses
//!
//! ## Quick Start
//!
//! ```bash
//! # Watch a single script
//! sync-on-change deploy.sh
//!
//! # Mirror a directory using an explicit config file
//! sync-on-change -c custom.conf /path/to/directory
//! ```

pub mod checksum;
pub mod cli;
pub mod config;
pub mod error;
pub mod monitor;
pub mod transfer;

pub use checksum::{Digest, SyncTarget, TargetKind};
pub use config::Config;
pub use error::SyncToolError;
pub use monitor::MonitorLoop;
pub use transfer::{SyncExecutor, Syncer};
