//! # Content Checksums
//!
//! SHA-256 digests of a watched file or directory tree. The sync loop
//! compares these instead of modification times, so touching a file
//! without changing its bytes never triggers a transfer.
//!
//! A directory digest is built by hashing every regular file on its own and
//! feeding each 32-byte result, in traversal order, into one running hash.
//! Traversal visits entries sorted by file name at every level, so the
//! digest does not depend on the order the filesystem lists them in.
//! Symlinks, devices and empty directories contribute nothing.

use crate::error::SyncToolError;
use sha2::{Digest as _, Sha256};
use std::ffi::OsStr;
use std::fmt;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

/// A 256-bit content digest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Digest([u8; 32]);

impl Digest {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Whether the watched path is a single file or a directory tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetKind {
    File,
    Directory,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetKind::File => write!(f, "file"),
            TargetKind::Directory => write!(f, "directory"),
        }
    }
}

/// The watched path and its kind, fixed at startup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncTarget {
    pub path: PathBuf,
    pub kind: TargetKind,
}

impl SyncTarget {
    /// Inspect `path` once and record its kind.
    pub fn detect(path: impl Into<PathBuf>) -> Result<Self, SyncToolError> {
        let path = path.into();
        let metadata = std::fs::metadata(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => SyncToolError::TargetNotFound(path.clone()),
            _ => SyncToolError::Io(e),
        })?;

        let kind = if metadata.is_dir() {
            TargetKind::Directory
        } else {
            TargetKind::File
        };

        Ok(Self { path, kind })
    }

    /// Final path component, used to address the remote copy of a file.
    pub fn file_name(&self) -> Option<&OsStr> {
        self.path.file_name()
    }

    /// Digest the target off the async runtime's worker threads.
    pub async fn digest(&self) -> io::Result<Digest> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || digest(&path))
            .await
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
    }
}

/// Digest a file or directory tree.
pub fn digest(path: &Path) -> io::Result<Digest> {
    if std::fs::metadata(path)?.is_dir() {
        digest_tree(path)
    } else {
        digest_file(path)
    }
}

/// SHA-256 of a file's full content.
pub fn digest_file(path: &Path) -> io::Result<Digest> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(Digest(hasher.finalize().into()))
}

/// Combined digest of every regular file under `root`.
pub fn digest_tree(root: &Path) -> io::Result<Digest> {
    let mut hasher = Sha256::new();
    visit_files(root, &mut |file| {
        let file_digest = digest_file(file)?;
        hasher.update(file_digest.as_bytes());
        Ok(())
    })?;
    Ok(Digest(hasher.finalize().into()))
}

fn visit_files(dir: &Path, visit: &mut dyn FnMut(&Path) -> io::Result<()>) -> io::Result<()> {
    let mut entries = std::fs::read_dir(dir)?.collect::<io::Result<Vec<_>>>()?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let file_type = entry.file_type()?;
        let path = entry.path();

        if file_type.is_dir() {
            visit_files(&path, visit)?;
        } else if file_type.is_file() {
            visit(&path)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use sha2::Digest as _;
    use tempfile::TempDir;

    #[test]
    fn test_file_digest_matches_sha256() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("test.txt");
        std::fs::write(&file, "Hello, World!").unwrap();

        let digest = digest(&file).unwrap();
        assert_eq!(
            digest.to_hex(),
            "dffd6021bb2bd5b0af676290809ec3a53191dd81c7f70a4b28688a362182986f"
        );
    }

    #[test]
    fn test_file_digest_idempotent_and_sensitive() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("test.txt");
        std::fs::write(&file, "Hello, World!").unwrap();

        let first = digest(&file).unwrap();
        let second = digest(&file).unwrap();
        assert_eq!(first, second);

        std::fs::write(&file, "Modified content").unwrap();
        let third = digest(&file).unwrap();
        assert_ne!(first, third);
    }

    #[test]
    fn test_tree_digest_is_hash_of_file_digests() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("b.txt"), "bravo").unwrap();
        std::fs::create_dir(temp_dir.path().join("a")).unwrap();
        std::fs::write(temp_dir.path().join("a").join("inner.txt"), "alpha").unwrap();

        let mut hasher = Sha256::new();
        hasher.update(Sha256::digest(b"alpha"));
        hasher.update(Sha256::digest(b"bravo"));
        let expected: [u8; 32] = hasher.finalize().into();

        assert_eq!(digest(temp_dir.path()).unwrap().as_bytes(), &expected);
    }

    #[test]
    fn test_tree_digest_detects_nested_change() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("deep").join("er");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("run.sh"), "#!/bin/sh\necho one\n").unwrap();

        let before = digest(temp_dir.path()).unwrap();
        assert_eq!(before, digest(temp_dir.path()).unwrap());

        std::fs::write(nested.join("run.sh"), "#!/bin/sh\necho two\n").unwrap();
        assert_ne!(before, digest(temp_dir.path()).unwrap());
    }

    #[test]
    fn test_empty_directories_do_not_contribute() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("file.txt"), "content").unwrap();
        let before = digest(temp_dir.path()).unwrap();

        std::fs::create_dir(temp_dir.path().join("empty")).unwrap();
        assert_eq!(before, digest(temp_dir.path()).unwrap());
    }

    #[test]
    fn test_identical_trees_share_a_digest() {
        let left = TempDir::new().unwrap();
        let right = TempDir::new().unwrap();

        // Created in opposite orders; the sorted walk hides the difference.
        for name in ["one", "two", "three"] {
            std::fs::write(left.path().join(name), name).unwrap();
        }
        for name in ["three", "two", "one"] {
            std::fs::write(right.path().join(name), name).unwrap();
        }

        assert_eq!(digest(left.path()).unwrap(), digest(right.path()).unwrap());
    }

    #[test]
    fn test_missing_path_is_io_error() {
        let temp_dir = TempDir::new().unwrap();
        let err = digest(&temp_dir.path().join("gone")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_are_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let real = temp_dir.path().join("real.txt");
        std::fs::write(&real, "data").unwrap();
        let before = digest(temp_dir.path()).unwrap();

        std::os::unix::fs::symlink(&real, temp_dir.path().join("link.txt")).unwrap();
        assert_eq!(before, digest(temp_dir.path()).unwrap());
    }

    #[test]
    fn test_detect_target_kind() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("deploy.sh");
        std::fs::write(&file, "echo").unwrap();

        let target = SyncTarget::detect(&file).unwrap();
        assert_eq!(target.kind, TargetKind::File);
        assert_eq!(target.file_name(), Some(OsStr::new("deploy.sh")));

        let target = SyncTarget::detect(temp_dir.path()).unwrap();
        assert_eq!(target.kind, TargetKind::Directory);

        let missing = SyncTarget::detect(temp_dir.path().join("missing"));
        assert!(matches!(missing, Err(SyncToolError::TargetNotFound(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_detect_reports_other_errors_as_io() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("deploy.sh");
        std::fs::write(&file, "echo").unwrap();

        // A regular file cannot have children; this is not a missing target.
        let result = SyncTarget::detect(file.join("child"));
        assert!(matches!(result, Err(SyncToolError::Io(_))));
    }

    #[tokio::test]
    async fn test_async_digest_matches_sync() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("x"), "x").unwrap();
        let target = SyncTarget::detect(temp_dir.path()).unwrap();

        assert_eq!(target.digest().await.unwrap(), digest(temp_dir.path()).unwrap());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_distinct_content_distinct_digest(
            a in proptest::collection::vec(any::<u8>(), 0..256),
            b in proptest::collection::vec(any::<u8>(), 0..256),
        ) {
            prop_assume!(a != b);
            let temp_dir = TempDir::new().unwrap();
            let file = temp_dir.path().join("f");

            std::fs::write(&file, &a).unwrap();
            let da = digest(&file).unwrap();
            prop_assert_eq!(da, digest(&file).unwrap());

            std::fs::write(&file, &b).unwrap();
            prop_assert_ne!(da, digest(&file).unwrap());
        }
    }
}
