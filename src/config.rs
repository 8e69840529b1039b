//! # Configuration Management
//!
//! This module resolves the settings that drive the sync loop:
//! - `key=value` configuration files with `#` comments
//! - A fixed search order for discovering those files
//! - Hard-coded defaults when nothing is found
//!
//! Resolution happens once at startup. The resulting [`Config`] is never
//! mutated afterwards and is passed by reference to every component.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// File name looked up in every search location.
pub const CONFIG_FILE_NAME: &str = "sync_on_change.conf";

/// System-wide configuration location (not consulted on Windows).
pub const SYSTEM_CONFIG_PATH: &str = "/etc/sync_on_change/sync_on_change.conf";

pub const DEFAULT_REMOTE_USER: &str = "username";
pub const DEFAULT_REMOTE_HOST: &str = "xxx.xxx.xxx.xxx";
pub const DEFAULT_REMOTE_PATH: &str = "~/scripts/";
pub const DEFAULT_INTERVAL_SECS: u64 = 3;
pub const DEFAULT_MAX_FAILURES: u32 = 10;

/// Where a resolved configuration came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigSource {
    Defaults,
    File(PathBuf),
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSource::Defaults => write!(f, "built-in defaults"),
            ConfigSource::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Settings for a sync session.
///
/// `interval_secs` and `max_failures` are always at least 1: values below
/// that are rejected while parsing and the previous value is kept.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub remote_user: String,
    pub remote_host: String,
    pub remote_path: String,
    pub interval_secs: u64,
    pub max_failures: u32,
    pub loaded_from: ConfigSource,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            remote_user: DEFAULT_REMOTE_USER.to_string(),
            remote_host: DEFAULT_REMOTE_HOST.to_string(),
            remote_path: DEFAULT_REMOTE_PATH.to_string(),
            interval_secs: DEFAULT_INTERVAL_SECS,
            max_failures: DEFAULT_MAX_FAILURES,
            loaded_from: ConfigSource::Defaults,
        }
    }
}

impl Config {
    /// Resolve the configuration for `target`.
    ///
    /// An explicit path is the only candidate when given. Otherwise the
    /// locations from [`candidate_paths`] are tried in order and the first
    /// existing, readable file wins. Falls back to defaults in both cases.
    pub fn resolve(target: &Path, explicit: Option<&Path>) -> Self {
        let candidates = candidate_paths(target, explicit);
        Self::resolve_from(&candidates)
    }

    /// Resolve against an explicit list of candidate files.
    pub fn resolve_from(candidates: &[PathBuf]) -> Self {
        for path in candidates {
            if !path.is_file() {
                debug!("No configuration at {}", path.display());
                continue;
            }

            info!("Loading configuration from: {}", path.display());
            match Self::load_file(path) {
                Ok(config) => return config,
                Err(e) => warn!("Could not read {}: {}", path.display(), e),
            }
        }

        Self::default()
    }

    /// Parse a single configuration file on top of the defaults.
    ///
    /// Bytes that are not valid UTF-8 are replaced rather than rejected, so
    /// only real I/O errors make a file unusable.
    pub fn load_file(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let mut config = parse_config_str(&String::from_utf8_lossy(&bytes));
        config.loaded_from = ConfigSource::File(path.to_path_buf());
        Ok(config)
    }

    /// `user@host`, as used by ssh, scp and rsync.
    pub fn remote(&self) -> String {
        format!("{}@{}", self.remote_user, self.remote_host)
    }

    /// The remote path with a trailing separator enforced.
    pub fn remote_dir(&self) -> String {
        if self.remote_path.ends_with('/') {
            self.remote_path.clone()
        } else {
            format!("{}/", self.remote_path)
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Candidate configuration files, in lookup order.
pub fn candidate_paths(target: &Path, explicit: Option<&Path>) -> Vec<PathBuf> {
    if let Some(path) = explicit {
        return vec![path.to_path_buf()];
    }

    let mut paths = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        paths.push(cwd.join(CONFIG_FILE_NAME));
    }

    if let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        paths.push(exe_dir.join(CONFIG_FILE_NAME));
    }

    if let Some(target_dir) = target_directory(target) {
        paths.push(target_dir.join(CONFIG_FILE_NAME));
    }

    if !cfg!(windows) {
        paths.push(PathBuf::from(SYSTEM_CONFIG_PATH));
    }

    paths
}

/// The target itself when it is a directory, otherwise its parent.
fn target_directory(target: &Path) -> Option<PathBuf> {
    let metadata = std::fs::metadata(target).ok()?;
    if metadata.is_dir() {
        return Some(target.to_path_buf());
    }

    match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => Some(parent.to_path_buf()),
        _ => Some(PathBuf::from(".")),
    }
}

/// Parse configuration text, starting from the defaults.
///
/// Unknown keys and lines without `=` are ignored. Integer keys that do not
/// parse, or parse to a value below 1, keep their previous value.
pub fn parse_config_str(content: &str) -> Config {
    let mut config = Config::default();

    for raw in content.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            debug!("Skipping malformed configuration line: {}", line);
            continue;
        };
        let key = key.trim();
        let value = strip_quotes(value.trim());

        match key {
            "remote_user" => config.remote_user = value.to_string(),
            "remote_host" => config.remote_host = value.to_string(),
            "remote_path" => config.remote_path = value.to_string(),
            "interval" => {
                if let Some(secs) = parse_positive::<u64>(key, value) {
                    config.interval_secs = secs;
                }
            }
            "max_failures" => {
                if let Some(max) = parse_positive::<u32>(key, value) {
                    config.max_failures = max;
                }
            }
            _ => debug!("Ignoring unknown configuration key: {}", key),
        }
    }

    config
}

/// Removes one pair of enclosing double quotes, if present.
fn strip_quotes(value: &str) -> &str {
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        &value[1..value.len() - 1]
    } else {
        value
    }
}

fn parse_positive<T>(key: &str, value: &str) -> Option<T>
where
    T: std::str::FromStr + PartialOrd + From<u8>,
{
    match value.parse::<T>() {
        Ok(n) if n >= T::from(1) => Some(n),
        _ => {
            warn!("Ignoring invalid value for {}: {:?}", key, value);
            None
        }
    }
}
