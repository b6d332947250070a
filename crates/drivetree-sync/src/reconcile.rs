//! Reconciliation engine
//!
//! The [`Reconciler`] brings one node at a time into agreement:
//!
//! - [`update`](Reconciler::update) acts on the node's [`State`]: remote
//!   creation, local creation, content transfer in either direction or
//!   conflict resolution.
//! - [`delete`](Reconciler::delete) removes a leaf on one side and detaches it.
//! - [`reconcile`](Reconciler::reconcile) walks the whole tree: creations
//!   and transfers in pre-order (a folder exists before anything is created
//!   inside it), deletions in post-order.
//!
//! ## Failure model
//!
//! Every mutation of a node happens after the I/O it depends on has
//! completed. A failed or cancelled operation therefore leaves the node in
//! its prior state and the next pass retries it. Content uploaded for a
//! file whose metadata request then fails is deleted again.
//!
//! ## Remote conventions
//!
//! - Folder creation: `POST {parent}/children` with encoded metadata
//! - File creation: `POST {parent}/uploads` with the content, then
//!   `POST {parent}/children` with metadata naming the returned content link
//! - Content update: `PUT {content_link}`
//! - Deletion: `DELETE {self_link}`. Files carry `If-Match` with the
//!   revision last agreed on, so a remote edit made since then turns the
//!   delete into a 412. Folders send `If-Match: *`, since their revision
//!   moves as children go.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use drivetree_conflict::{ConflictNamer, PolicyEngine};
use drivetree_core::config::Config;
use drivetree_core::domain::conflict::Resolution;
use drivetree_core::domain::entry::{Entry, EntryKind};
use drivetree_core::domain::newtypes::Href;
use drivetree_core::ports::feed::{IRemoteFeed, NewEntry};
use drivetree_core::ports::local_filesystem::{staging_path, ILocalFileSystem};
use drivetree_core::ports::transport::{AuthHeaders, ITransport, Method, RequestBody};

use crate::error::{ResourceError, TreeError};
use crate::remote;
use crate::resource::{LocalSnapshot, Resource};
use crate::state::State;
use crate::tree::{NodeId, ResourceTree};

/// Media type of uploaded file content
const CONTENT_TYPE_OCTET_STREAM: &str = "application/octet-stream";

/// `If-Match` value that matches any revision
const ANY_REVISION: &str = "*";

/// Walk rounds per pass; the second picks up conflict copies made in the first
const MAX_ROUNDS: usize = 2;

/// What [`Reconciler::update`] did to a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Already in sync; nothing was sent
    Unchanged,
    /// A folder was created remotely
    CreatedRemote,
    /// A folder was created locally
    CreatedLocal,
    /// Local content was sent to the remote
    Uploaded,
    /// Remote content was written locally
    Downloaded,
    /// The local version was moved aside to `copy` and the remote one downloaded
    KeptBoth { copy: NodeId },
    /// Conflict left for the user
    Deferred,
    /// Waits for the deletion walk
    PendingDelete,
}

/// Side a deletion is applied to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteSide {
    Remote,
    Local,
}

/// Summary of a reconciliation walk
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    /// Folders created remotely
    pub created_remote: u32,
    /// Folders created locally
    pub created_local: u32,
    /// Files uploaded (new or changed)
    pub uploaded: u32,
    /// Files downloaded (new or changed)
    pub downloaded: u32,
    /// Nodes deleted on either side
    pub deleted: u32,
    /// Conflicts left for the user
    pub deferred: u32,
    /// Conflicts resolved by keeping both versions
    pub conflicts_kept: u32,
    /// Per-node failures (non-fatal)
    pub errors: Vec<String>,
    /// Wall-clock duration of the walk in milliseconds
    pub duration_ms: u64,
}

impl SyncReport {
    fn record(&mut self, outcome: UpdateOutcome) {
        match outcome {
            UpdateOutcome::CreatedRemote => self.created_remote += 1,
            UpdateOutcome::CreatedLocal => self.created_local += 1,
            UpdateOutcome::Uploaded => self.uploaded += 1,
            UpdateOutcome::Downloaded => self.downloaded += 1,
            UpdateOutcome::KeptBoth { .. } => {
                self.conflicts_kept += 1;
                self.downloaded += 1;
            }
            UpdateOutcome::Deferred => self.deferred += 1,
            UpdateOutcome::Unchanged | UpdateOutcome::PendingDelete => {}
        }
    }

    /// Returns true if no node failed
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

// ============================================================================
// Reconciler
// ============================================================================

/// Executes per-node reconciliation through the transport, feed and
/// local filesystem ports
pub struct Reconciler {
    transport: Arc<dyn ITransport>,
    feed: Arc<dyn IRemoteFeed>,
    local_fs: Arc<dyn ILocalFileSystem>,
    policy: PolicyEngine,
}

impl Reconciler {
    pub fn new(
        transport: Arc<dyn ITransport>,
        feed: Arc<dyn IRemoteFeed>,
        local_fs: Arc<dyn ILocalFileSystem>,
        policy: PolicyEngine,
    ) -> Self {
        Self {
            transport,
            feed,
            local_fs,
            policy,
        }
    }

    /// Creates a reconciler whose conflict policy comes from `config.conflicts`
    pub fn from_config(
        transport: Arc<dyn ITransport>,
        feed: Arc<dyn IRemoteFeed>,
        local_fs: Arc<dyn ILocalFileSystem>,
        config: &Config,
    ) -> Self {
        Self::new(transport, feed, local_fs, PolicyEngine::from_config(&config.conflicts))
    }

    pub fn policy(&self) -> &PolicyEngine {
        &self.policy
    }

    // ========================================================================
    // Update
    // ========================================================================

    /// Brings one node into agreement according to its state
    ///
    /// # Errors
    /// Transport, status and I/O errors leave the node untouched. Structural
    /// faults (`ResourceError::Tree`) indicate a corrupt tree.
    #[instrument(skip(self, tree, auth), fields(node = %id))]
    pub async fn update(
        &self,
        tree: &mut ResourceTree,
        id: NodeId,
        auth: &AuthHeaders,
    ) -> Result<UpdateOutcome, ResourceError> {
        let state = tree.state(id)?;
        debug!(state = %state, path = %tree.relative_path(id)?, "Updating node");

        match state {
            State::Sync => Ok(UpdateOutcome::Unchanged),
            State::NewLocal => self.create_remote(tree, id, auth).await,
            State::NewRemote => self.create_local(tree, id, auth).await,
            State::LocalChanged => {
                self.push_content(tree, id, auth).await?;
                Ok(UpdateOutcome::Uploaded)
            }
            State::RemoteChanged => {
                self.pull_content(tree, id, auth).await?;
                Ok(UpdateOutcome::Downloaded)
            }
            State::BothChanged => self.resolve_conflict(tree, id, auth).await,
            State::LocalDeleted | State::RemoteDeleted => Ok(UpdateOutcome::PendingDelete),
        }
    }

    /// Creates a local-only node remotely under its parent's self-link
    async fn create_remote(
        &self,
        tree: &mut ResourceTree,
        id: NodeId,
        auth: &AuthHeaders,
    ) -> Result<UpdateOutcome, ResourceError> {
        let parent = tree.parent(id)?.ok_or(TreeError::RootImmutable)?;
        let parent_link = tree
            .get(parent)?
            .self_link()
            .cloned()
            .ok_or(TreeError::ParentNotRemote(id))?;
        let resource = tree.get(id)?;
        let name = resource.name().to_string();

        let (entry, outcome) = match resource.entry().kind() {
            EntryKind::Folder => {
                let entry = self.create_entry(&parent_link, &name, true, None, auth).await?;
                (entry, UpdateOutcome::CreatedRemote)
            }
            EntryKind::File { .. } => {
                let path = tree.path(id)?;
                let uploads = parent_link.join("uploads");
                let receipt = self.upload(Method::Post, uploads.as_str(), &path, auth).await?;
                let content_link = self
                    .feed
                    .parse_content_link(&receipt)
                    .map_err(ResourceError::Feed)?;
                let entry = match self
                    .create_entry(&parent_link, &name, false, Some(&content_link), auth)
                    .await
                {
                    Ok(entry) => entry,
                    Err(e) => {
                        self.discard_upload(&content_link, auth).await;
                        return Err(e);
                    }
                };
                (entry, UpdateOutcome::Uploaded)
            }
        };

        tree.adopt_remote(id, entry)?;
        info!(node = %id, name = %name, "Created remotely");
        Ok(outcome)
    }

    /// `POST {parent}/children` with encoded metadata; returns the created entry
    async fn create_entry(
        &self,
        parent_link: &Href,
        name: &str,
        is_folder: bool,
        content_link: Option<&Href>,
        auth: &AuthHeaders,
    ) -> Result<Entry, ResourceError> {
        let metadata = self
            .feed
            .encode_entry(&NewEntry {
                name,
                is_folder,
                parent_link,
                content_link,
            })
            .map_err(ResourceError::Feed)?;
        let body = RequestBody::from_bytes(self.feed.content_type().to_string(), metadata);
        let children = parent_link.join("children");
        let response =
            remote::send(self.transport.as_ref(), Method::Post, children.as_str(), auth, Some(body)).await?;
        self.feed.parse_entry(&response).map_err(ResourceError::Feed)
    }

    /// Best-effort removal of content that never got its metadata
    async fn discard_upload(&self, content_link: &Href, auth: &AuthHeaders) {
        match self.delete_remote(content_link.as_str(), ANY_REVISION, auth).await {
            Ok(()) => debug!(url = %content_link, "Discarded orphaned upload"),
            Err(e) => warn!(url = %content_link, error = %e, "Could not discard orphaned upload"),
        }
    }

    /// Creates a remote-only node locally
    async fn create_local(
        &self,
        tree: &mut ResourceTree,
        id: NodeId,
        auth: &AuthHeaders,
    ) -> Result<UpdateOutcome, ResourceError> {
        if tree.get(id)?.is_folder() {
            let path = tree.path(id)?;
            self.local_fs
                .create_dir(&path)
                .await
                .map_err(|e| ResourceError::io(&path, e))?;
            tree.mark_synced(id, LocalSnapshot::folder())?;
            info!(node = %id, path = %path.display(), "Created locally");
            Ok(UpdateOutcome::CreatedLocal)
        } else {
            self.pull_content(tree, id, auth).await?;
            Ok(UpdateOutcome::Downloaded)
        }
    }

    /// Downloads the remote content over the local copy
    async fn pull_content(
        &self,
        tree: &mut ResourceTree,
        id: NodeId,
        auth: &AuthHeaders,
    ) -> Result<(), ResourceError> {
        let path = tree.path(id)?;
        let snapshot = self.fetch_into(tree.get(id)?, id, &path, auth).await?;
        tree.mark_synced(id, snapshot)?;
        Ok(())
    }

    /// Downloads `resource`'s content to `path` and describes the result
    async fn fetch_into(
        &self,
        resource: &Resource,
        id: NodeId,
        path: &Path,
        auth: &AuthHeaders,
    ) -> Result<LocalSnapshot, ResourceError> {
        let content_link = resource
            .entry()
            .content_link()
            .cloned()
            .ok_or(TreeError::MissingRemoteLink(id))?;
        let remote_checksum = resource.entry().checksum().cloned();

        self.download(&content_link, path, auth).await?;

        let checksum = match remote_checksum {
            Some(checksum) => checksum,
            None => self
                .local_fs
                .checksum(path)
                .await
                .map_err(|e| ResourceError::io(path, e))?,
        };
        Ok(LocalSnapshot::file(Some(checksum)))
    }

    /// Sends the local content to the node's content link
    async fn push_content(
        &self,
        tree: &mut ResourceTree,
        id: NodeId,
        auth: &AuthHeaders,
    ) -> Result<(), ResourceError> {
        let content_link = tree
            .get(id)?
            .entry()
            .content_link()
            .cloned()
            .ok_or(TreeError::MissingRemoteLink(id))?;
        let path = tree.path(id)?;

        let response = self.upload(Method::Put, content_link.as_str(), &path, auth).await?;
        let entry = self.feed.parse_entry(&response).map_err(ResourceError::Feed)?;

        tree.adopt_remote(id, entry)?;
        info!(node = %id, path = %path.display(), "Uploaded local changes");
        Ok(())
    }

    // ========================================================================
    // Conflicts
    // ========================================================================

    async fn resolve_conflict(
        &self,
        tree: &mut ResourceTree,
        id: NodeId,
        auth: &AuthHeaders,
    ) -> Result<UpdateOutcome, ResourceError> {
        let relative_path = tree.relative_path(id)?;
        let resolution = self.policy.evaluate(&relative_path);
        info!(path = %relative_path, resolution = %resolution, "Resolving conflict");

        match resolution {
            Resolution::KeepRemote => {
                self.pull_content(tree, id, auth).await?;
                Ok(UpdateOutcome::Downloaded)
            }
            Resolution::KeepLocal => {
                self.push_content(tree, id, auth).await?;
                Ok(UpdateOutcome::Uploaded)
            }
            Resolution::KeepBoth => self.keep_both(tree, id, auth).await,
            Resolution::Manual => {
                warn!(path = %relative_path, "Conflict left for manual resolution");
                Ok(UpdateOutcome::Deferred)
            }
        }
    }

    /// Keeps the remote version under the node's name and the local one
    /// under a conflict name, as a new local node
    ///
    /// The remote content is staged in a hidden sibling first. Nothing on
    /// disk is renamed until the download is complete, and the swap itself
    /// runs as its own task so dropping this future cannot stop it half way.
    async fn keep_both(
        &self,
        tree: &mut ResourceTree,
        id: NodeId,
        auth: &AuthHeaders,
    ) -> Result<UpdateOutcome, ResourceError> {
        let parent = tree.parent(id)?.ok_or(TreeError::RootImmutable)?;
        let path = tree.path(id)?;
        let name = tree.name(id)?.to_string();
        let copy_name = ConflictNamer::generate_unique(&name, |candidate| {
            tree.find_child(parent, candidate).is_some()
        });
        let copy_path = path.with_file_name(&copy_name);
        let staged = staging_path(&path);
        let local_checksum = tree
            .get(id)?
            .local()
            .and_then(|local| local.checksum.clone());

        let snapshot = match self.fetch_into(tree.get(id)?, id, &staged, auth).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.discard_staged(&staged).await;
                return Err(e);
            }
        };

        let swap = tokio::spawn(swap_in(
            self.local_fs.clone(),
            staged.clone(),
            path.clone(),
            copy_path.clone(),
        ));
        let swapped = swap
            .await
            .map_err(|e| ResourceError::io(&path, anyhow::Error::new(e)))
            .and_then(|result| result);
        if let Err(e) = swapped {
            self.discard_staged(&staged).await;
            return Err(e);
        }

        let copy_entry = Entry::local_file(copy_name, local_checksum.clone())?;
        let copy = tree.add_child(
            parent,
            Resource::from_local(copy_entry, LocalSnapshot::file(local_checksum)),
        )?;
        tree.mark_synced(id, snapshot)?;

        info!(node = %id, copy = %copy, copy_path = %copy_path.display(), "Kept both versions");
        Ok(UpdateOutcome::KeptBoth { copy })
    }

    async fn discard_staged(&self, staged: &Path) {
        if let Err(e) = self.local_fs.remove(staged).await {
            warn!(path = %staged.display(), error = %e, "Could not remove staged download");
        }
    }

    // ========================================================================
    // Delete
    // ========================================================================

    /// Deletes a leaf node on one side and detaches it from the tree
    ///
    /// A remote 404 counts as success, as does a missing local path.
    ///
    /// # Errors
    /// [`TreeError::HasChildren`] if the node is not a leaf.
    #[instrument(skip(self, tree, auth), fields(node = %id, side = ?side))]
    pub async fn delete(
        &self,
        tree: &mut ResourceTree,
        id: NodeId,
        side: DeleteSide,
        auth: &AuthHeaders,
    ) -> Result<Resource, ResourceError> {
        if id == tree.root() {
            return Err(TreeError::RootImmutable.into());
        }
        let resource = tree.get(id)?;
        if !resource.children().is_empty() {
            return Err(TreeError::HasChildren(id).into());
        }

        match side {
            DeleteSide::Remote => match resource.self_link() {
                Some(link) => {
                    let agreed = match resource.entry().kind() {
                        EntryKind::File { .. } => resource.baseline().and_then(|b| b.revision.as_deref()),
                        EntryKind::Folder => None,
                    };
                    self.delete_remote(link.as_str(), agreed.unwrap_or(ANY_REVISION), auth)
                        .await?
                }
                None => debug!("Never created remotely, nothing to delete"),
            },
            DeleteSide::Local => {
                let path = tree.path(id)?;
                self.local_fs
                    .remove(&path)
                    .await
                    .map_err(|e| ResourceError::io(&path, e))?;
            }
        }

        let removed = tree.detach(id)?;
        info!(name = %removed.name(), "Deleted");
        Ok(removed)
    }

    async fn delete_remote(&self, url: &str, if_match: &str, auth: &AuthHeaders) -> Result<(), ResourceError> {
        let headers = auth.clone().with("If-Match", if_match);
        let response = self
            .transport
            .request(Method::Delete, url, &headers, None)
            .await
            .map_err(|source| ResourceError::Transport {
                method: Method::Delete,
                url: url.to_string(),
                source,
            })?;

        match response.status {
            404 => {
                debug!(url = %url, "Already gone remotely");
                Ok(())
            }
            _ if response.is_success() => Ok(()),
            status => Err(ResourceError::Status {
                method: Method::Delete,
                url: url.to_string(),
                status,
            }),
        }
    }

    /// Deletes `id` and everything below it, children first
    ///
    /// Returns the number of nodes deleted.
    pub async fn delete_subtree(
        &self,
        tree: &mut ResourceTree,
        id: NodeId,
        side: DeleteSide,
        auth: &AuthHeaders,
    ) -> Result<usize, ResourceError> {
        let order = tree.post_order(id);
        for node in &order {
            self.delete(tree, *node, side, auth).await?;
        }
        Ok(order.len())
    }

    // ========================================================================
    // Transfers
    // ========================================================================

    /// Streams the content at `content_link` into `path`, atomically
    ///
    /// Returns the number of bytes written.
    #[instrument(skip(self, auth), fields(url = %content_link, path = %path.display()))]
    pub async fn download(
        &self,
        content_link: &Href,
        path: &Path,
        auth: &AuthHeaders,
    ) -> Result<u64, ResourceError> {
        let url = content_link.as_str();
        let response = self
            .transport
            .request(Method::Get, url, auth, None)
            .await
            .map_err(|source| ResourceError::Transport {
                method: Method::Get,
                url: url.to_string(),
                source,
            })?;
        if !response.is_success() {
            return Err(ResourceError::Status {
                method: Method::Get,
                url: url.to_string(),
                status: response.status,
            });
        }

        let written = self
            .local_fs
            .write_file(path, response.body)
            .await
            .map_err(|e| ResourceError::io(path, e))?;
        debug!(bytes = written, "Download complete");
        Ok(written)
    }

    /// Streams the file at `path` as the body of `method url`
    ///
    /// Returns the response body. Only a 2xx status with a fully received
    /// body counts as success.
    #[instrument(skip(self, auth), fields(method = %method, url = %url, path = %path.display()))]
    pub async fn upload(
        &self,
        method: Method,
        url: &str,
        path: &Path,
        auth: &AuthHeaders,
    ) -> Result<Bytes, ResourceError> {
        let stream = self
            .local_fs
            .open_read(path)
            .await
            .map_err(|e| ResourceError::io(path, e))?;
        let body = RequestBody::from_stream(CONTENT_TYPE_OCTET_STREAM, stream);
        remote::send(self.transport.as_ref(), method, url, auth, Some(body)).await
    }

    // ========================================================================
    // Walk
    // ========================================================================

    /// Reconciles the whole tree
    ///
    /// 1. Pre-order: every node that needs an update gets one. Failures are
    ///    recorded and the failed node's descendants are skipped. A second
    ///    round handles nodes created during the first (conflict copies).
    /// 2. Post-order: pending deletions are applied.
    ///
    /// # Errors
    /// - [`ResourceError::Cancelled`] when `cancel` fires; the node in
    ///   flight keeps its prior state
    /// - structural faults, which abort the walk
    #[instrument(skip(self, tree, auth, cancel))]
    pub async fn reconcile(
        &self,
        tree: &mut ResourceTree,
        auth: &AuthHeaders,
        cancel: &CancellationToken,
    ) -> Result<SyncReport, ResourceError> {
        let start = Instant::now();
        let mut report = SyncReport::default();
        let mut visited: HashSet<NodeId> = HashSet::new();
        let mut failed: HashSet<NodeId> = HashSet::new();

        info!(nodes = tree.len(), "Starting reconciliation");

        for round in 0..MAX_ROUNDS {
            let mut created = false;
            for id in tree.pre_order(tree.root()) {
                if cancel.is_cancelled() {
                    return Err(ResourceError::Cancelled);
                }
                if !visited.insert(id) || !tree.contains(id) {
                    continue;
                }
                if let Some(parent) = tree.parent(id)? {
                    if failed.contains(&parent) {
                        debug!(node = %id, "Skipped: parent failed");
                        failed.insert(id);
                        continue;
                    }
                }
                if !tree.state(id)?.needs_update() {
                    continue;
                }

                let result = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(ResourceError::Cancelled),
                    result = self.update(tree, id, auth) => result,
                };

                match result {
                    Ok(outcome) => {
                        created |= matches!(outcome, UpdateOutcome::KeptBoth { .. });
                        report.record(outcome);
                    }
                    Err(e) if e.is_structural() => return Err(e),
                    Err(e) => {
                        let path = tree.relative_path(id)?;
                        warn!(node = %id, path = %path, error = %e, "Update failed");
                        report.errors.push(format!("{path}: {e}"));
                        failed.insert(id);
                    }
                }
            }

            debug!(round, "Update round complete");
            if !created {
                break;
            }
        }

        for id in tree.post_order(tree.root()) {
            if cancel.is_cancelled() {
                return Err(ResourceError::Cancelled);
            }
            let Ok(resource) = tree.get(id) else { continue };
            let side = match resource.state() {
                State::LocalDeleted => DeleteSide::Remote,
                State::RemoteDeleted => DeleteSide::Local,
                _ => continue,
            };
            if !resource.children().is_empty() {
                debug!(node = %id, "Kept: children remain");
                continue;
            }
            let path = tree.relative_path(id)?;

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ResourceError::Cancelled),
                result = self.delete(tree, id, side, auth) => result,
            };

            match result {
                Ok(_) => report.deleted += 1,
                Err(e) if e.is_structural() => return Err(e),
                Err(e) => {
                    warn!(node = %id, path = %path, error = %e, "Delete failed");
                    report.errors.push(format!("{path}: {e}"));
                }
            }
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            created_remote = report.created_remote,
            created_local = report.created_local,
            uploaded = report.uploaded,
            downloaded = report.downloaded,
            deleted = report.deleted,
            deferred = report.deferred,
            errors = report.errors.len(),
            duration_ms = report.duration_ms,
            "Reconciliation complete"
        );
        Ok(report)
    }
}

/// Moves the local version to `copy_path`, then the staged download onto
/// `path`. The local version is put back if the second step fails.
async fn swap_in(
    local_fs: Arc<dyn ILocalFileSystem>,
    staged: PathBuf,
    path: PathBuf,
    copy_path: PathBuf,
) -> Result<(), ResourceError> {
    local_fs
        .rename(&path, &copy_path)
        .await
        .map_err(|e| ResourceError::io(&path, e))?;
    if let Err(e) = local_fs.rename(&staged, &path).await {
        if let Err(restore) = local_fs.rename(&copy_path, &path).await {
            warn!(path = %path.display(), error = %restore, "Could not restore local version");
        }
        return Err(ResourceError::io(&path, e));
    }
    Ok(())
}
