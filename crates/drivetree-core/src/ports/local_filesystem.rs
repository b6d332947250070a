//! Local filesystem port (driven/secondary port)
//!
//! This module defines the interface for interacting with the local
//! filesystem: recursive enumeration, streamed reads, atomic streamed
//! writes, directory management and checksum computation.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because filesystem errors are adapter-specific.
//! - `write_file` must replace the target atomically. A crashed or cancelled
//!   write may leave a temporary sibling whose name ends in
//!   [`PARTIAL_SUFFIX`], never a truncated file under the real name.
//! - `scan` must skip those temporary files, including the staging
//!   siblings from [`staging_path`].

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::domain::newtypes::Checksum;
use crate::ports::transport::ByteStream;

/// Suffix carried by in-progress download targets
pub const PARTIAL_SUFFIX: &str = ".partial";

/// Returns true if `name` is an in-progress download target
pub fn is_partial_name(name: &str) -> bool {
    name.starts_with('.') && name.ends_with(PARTIAL_SUFFIX)
}

/// Hidden sibling that a download is staged in before it replaces `target`
pub fn staging_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{name}.staged{PARTIAL_SUFFIX}"))
}

// ============================================================================
// LocalEntry
// ============================================================================

/// One item found by a local scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalEntry {
    /// Path segments below the scanned root, never empty
    pub relative_path: Vec<String>,
    /// Whether this is a directory
    pub is_folder: bool,
    /// Content checksum (files only, when computed)
    pub checksum: Option<Checksum>,
    /// Size in bytes (0 for directories)
    pub size: u64,
    /// Last modification time
    pub modified: Option<DateTime<Utc>>,
}

impl LocalEntry {
    /// Directory observation at `relative_path`
    pub fn folder<S: AsRef<str>>(relative_path: &[S]) -> Self {
        Self {
            relative_path: relative_path.iter().map(|s| s.as_ref().to_string()).collect(),
            is_folder: true,
            checksum: None,
            size: 0,
            modified: None,
        }
    }

    /// File observation at `relative_path`
    pub fn file<S: AsRef<str>>(relative_path: &[S], checksum: Option<Checksum>) -> Self {
        Self {
            is_folder: false,
            checksum,
            ..Self::folder(relative_path)
        }
    }

    /// Final path segment
    pub fn name(&self) -> Option<&str> {
        self.relative_path.last().map(String::as_str)
    }

    /// Segments of the containing directory
    pub fn parent_segments(&self) -> &[String] {
        match self.relative_path.split_last() {
            Some((_, parent)) => parent,
            None => &[],
        }
    }
}

// ============================================================================
// ILocalFileSystem trait
// ============================================================================

/// Port trait for local filesystem operations
///
/// All paths are absolute; the resource tree derives them from the sync
/// root and node names.
#[async_trait::async_trait]
pub trait ILocalFileSystem: Send + Sync {
    /// Enumerate everything below `root`, parents before children
    async fn scan(&self, root: &Path) -> anyhow::Result<Vec<LocalEntry>>;

    /// Open a file as a chunk stream
    async fn open_read(&self, path: &Path) -> anyhow::Result<ByteStream>;

    /// Atomically replace `path` with the streamed content
    ///
    /// Parent directories are created when missing. Returns the number of
    /// bytes written. On error nothing is left at `path` that was not there
    /// before the call.
    async fn write_file(&self, path: &Path, body: ByteStream) -> anyhow::Result<u64>;

    /// Create a directory (and any missing parents)
    async fn create_dir(&self, path: &Path) -> anyhow::Result<()>;

    /// Remove a file or a directory tree; a missing path is not an error
    async fn remove(&self, path: &Path) -> anyhow::Result<()>;

    /// Rename within the same filesystem
    async fn rename(&self, from: &Path, to: &Path) -> anyhow::Result<()>;

    /// Compute the content checksum of a file
    async fn checksum(&self, path: &Path) -> anyhow::Result<Checksum>;

    /// Returns true if anything exists at `path`
    async fn exists(&self, path: &Path) -> anyhow::Result<bool>;
}
