//! Local filesystem adapter (secondary/driven adapter)
//!
//! Implements [`ILocalFileSystem`] using `tokio::fs` for async file operations.
//!
//! ## Design Decisions
//!
//! - **Atomic writes**: content is streamed into a hidden
//!   `.<name>.<tag>.partial` sibling and renamed over the target once
//!   complete. The temporary file is removed if the stream or a write fails;
//!   a write abandoned mid-way leaves only the `.partial` file, which
//!   [`scan`](ILocalFileSystem::scan) skips.
//! - **Checksums**: MD5, streamed in fixed-size chunks, rendered as lowercase
//!   hex to match the remote feed's `md5Checksum`.
//! - **Scan order**: entries of a directory are sorted by name and every
//!   directory is reported before its contents.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use md5::{Digest, Md5};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use drivetree_core::domain::newtypes::Checksum;
use drivetree_core::ports::local_filesystem::{
    is_partial_name, ILocalFileSystem, LocalEntry, PARTIAL_SUFFIX,
};
use drivetree_core::ports::transport::ByteStream;

/// Read buffer size for checksum computation
const HASH_CHUNK_SIZE: usize = 64 * 1024;

/// Adapter that bridges the [`ILocalFileSystem`] port to the real filesystem.
///
/// This is a zero-sized struct because all operations derive their context
/// from the path arguments. The sync root lives in the resource tree.
#[derive(Debug, Clone, Default)]
pub struct LocalFileSystemAdapter;

impl LocalFileSystemAdapter {
    /// Create a new `LocalFileSystemAdapter`.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

/// Temporary sibling used while `target` is being written
fn partial_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tag = Uuid::new_v4().simple().to_string();
    target.with_file_name(format!(".{name}.{}{PARTIAL_SUFFIX}", &tag[..8]))
}

fn modified_time(metadata: &std::fs::Metadata) -> Option<DateTime<Utc>> {
    metadata.modified().ok().map(DateTime::<Utc>::from)
}

#[async_trait::async_trait]
impl ILocalFileSystem for LocalFileSystemAdapter {
    #[instrument(skip(self), fields(root = %root.display()))]
    async fn scan(&self, root: &Path) -> anyhow::Result<Vec<LocalEntry>> {
        let mut entries = Vec::new();
        let mut pending: Vec<(PathBuf, Vec<String>)> = vec![(root.to_path_buf(), Vec::new())];

        while let Some((dir, segments)) = pending.pop() {
            let mut listing = Vec::new();
            let mut read_dir = tokio::fs::read_dir(&dir)
                .await
                .with_context(|| format!("cannot list {}", dir.display()))?;
            while let Some(child) = read_dir.next_entry().await? {
                listing.push(child);
            }
            listing.sort_by_key(|child| child.file_name());

            let mut subdirs = Vec::new();
            for child in listing {
                let Ok(name) = child.file_name().into_string() else {
                    warn!(path = %child.path().display(), "Skipping non UTF-8 name");
                    continue;
                };
                if is_partial_name(&name) {
                    debug!(name = %name, "Skipping in-progress download");
                    continue;
                }

                let file_type = child.file_type().await?;
                if file_type.is_symlink() {
                    debug!(name = %name, "Skipping symlink");
                    continue;
                }

                let path = child.path();
                let metadata = child.metadata().await?;
                let mut relative_path = segments.clone();
                relative_path.push(name);

                if file_type.is_dir() {
                    let mut entry = LocalEntry::folder(relative_path.as_slice());
                    entry.modified = modified_time(&metadata);
                    entries.push(entry);
                    subdirs.push((path, relative_path));
                } else {
                    let checksum = self.checksum(&path).await?;
                    let mut entry = LocalEntry::file(relative_path.as_slice(), Some(checksum));
                    entry.size = metadata.len();
                    entry.modified = modified_time(&metadata);
                    entries.push(entry);
                }
            }

            // Reverse so the stack pops subdirectories in name order.
            pending.extend(subdirs.into_iter().rev());
        }

        debug!(entries = entries.len(), "Scan complete");
        Ok(entries)
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    async fn open_read(&self, path: &Path) -> anyhow::Result<ByteStream> {
        let file = tokio::fs::File::open(path)
            .await
            .with_context(|| format!("cannot open {}", path.display()))?;
        Ok(ReaderStream::new(file).boxed())
    }

    #[instrument(skip(self, body), fields(path = %path.display()))]
    async fn write_file(&self, path: &Path, mut body: ByteStream) -> anyhow::Result<u64> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp_path = partial_path(path);
        debug!(tmp = %tmp_path.display(), "writing to temporary file");

        let written = async {
            let mut file = tokio::fs::File::create(&tmp_path).await?;
            let mut written = 0u64;
            while let Some(chunk) = body.next().await {
                let chunk = chunk?;
                file.write_all(&chunk).await?;
                written += chunk.len() as u64;
            }
            file.flush().await?;
            file.sync_all().await?;
            Ok::<u64, std::io::Error>(written)
        }
        .await;

        let written = match written {
            Ok(written) => written,
            Err(e) => {
                if let Err(cleanup) = tokio::fs::remove_file(&tmp_path).await {
                    warn!(tmp = %tmp_path.display(), error = %cleanup, "Could not remove temporary file");
                }
                return Err(e).with_context(|| format!("writing {} failed", path.display()));
            }
        };

        tokio::fs::rename(&tmp_path, path)
            .await
            .with_context(|| format!("cannot move temporary file onto {}", path.display()))?;

        debug!(bytes = written, "write complete");
        Ok(written)
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    async fn create_dir(&self, path: &Path) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(path).await?;
        debug!("directory created");
        Ok(())
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    async fn remove(&self, path: &Path) -> anyhow::Result<()> {
        let metadata = match tokio::fs::symlink_metadata(path).await {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("already gone");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        if metadata.is_dir() {
            debug!("removing directory recursively");
            tokio::fs::remove_dir_all(path).await?;
        } else {
            debug!("removing file");
            tokio::fs::remove_file(path).await?;
        }
        Ok(())
    }

    #[instrument(skip(self), fields(from = %from.display(), to = %to.display()))]
    async fn rename(&self, from: &Path, to: &Path) -> anyhow::Result<()> {
        tokio::fs::rename(from, to).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    async fn checksum(&self, path: &Path) -> anyhow::Result<Checksum> {
        let mut file = tokio::fs::File::open(path)
            .await
            .with_context(|| format!("cannot open {}", path.display()))?;
        let mut hasher = Md5::new();
        let mut buf = vec![0u8; HASH_CHUNK_SIZE];
        loop {
            let read = file.read(&mut buf).await?;
            if read == 0 {
                break;
            }
            hasher.update(&buf[..read]);
        }
        Ok(Checksum::new(format!("{:x}", hasher.finalize()))?)
    }

    async fn exists(&self, path: &Path) -> anyhow::Result<bool> {
        Ok(tokio::fs::try_exists(path).await?)
    }
}
