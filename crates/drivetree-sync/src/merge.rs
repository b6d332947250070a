//! Tree construction from remote listings and local scans
//!
//! [`TreeBuilder`] folds two kinds of observations into a
//! [`ResourceTree`]:
//!
//! - remote [`Entry`] values, placed under the node whose self-link matches
//!   their parent link. Entries listed before their parent are buffered
//!   until the parent arrives.
//! - local [`LocalEntry`] observations, placed by walking their path
//!   segments from the root.
//!
//! An observation that names an existing node updates it; a remote entry
//! whose name matches a local-only node adopts that node. Everything else
//! becomes a new node.

use std::collections::HashMap;

use tracing::{debug, trace};

use drivetree_core::domain::entry::Entry;
use drivetree_core::domain::errors::DomainError;
use drivetree_core::domain::newtypes::Href;
use drivetree_core::ports::local_filesystem::LocalEntry;

use crate::error::{ResourceError, TreeError};
use crate::resource::{LocalSnapshot, Resource};
use crate::tree::{NodeId, ResourceTree};

/// Merges remote entries and local observations into a tree
pub struct TreeBuilder<'t> {
    tree: &'t mut ResourceTree,
    /// Entries waiting for their parent, keyed by parent link
    pending: HashMap<Href, Vec<Entry>>,
}

impl<'t> TreeBuilder<'t> {
    pub fn new(tree: &'t mut ResourceTree) -> Self {
        Self {
            tree,
            pending: HashMap::new(),
        }
    }

    /// Number of entries still waiting for their parent
    pub fn pending_len(&self) -> usize {
        self.pending.values().map(Vec::len).sum()
    }

    // ========================================================================
    // Remote side
    // ========================================================================

    /// Places one remote entry in the tree
    ///
    /// Returns the node the entry landed on, or `None` if it was buffered
    /// because its parent is not in the tree yet.
    ///
    /// # Errors
    /// - [`DomainError`] if the entry has no self-link
    /// - [`TreeError::DuplicateName`] if a different remote object already
    ///   holds the name under the same parent
    /// - [`TreeError::KindMismatch`] if a same-named local node is of the
    ///   other kind
    pub fn apply_remote(&mut self, entry: Entry) -> Result<Option<NodeId>, ResourceError> {
        let Some(self_link) = entry.self_link().cloned() else {
            return Err(DomainError::ValidationFailed(format!(
                "remote entry '{}' has no self link",
                entry.name()
            ))
            .into());
        };

        let Some(parent) = self.resolve_parent(&entry) else {
            self.defer(entry);
            return Ok(None);
        };

        let existing = self.tree.find_by_link(&self_link).or_else(|| {
            entry
                .resource_id()
                .and_then(|rid| self.tree.find_by_resource_id(&rid))
        });

        let id = match existing {
            Some(id) if self.tree.parent(id)? != Some(parent) => {
                self.tree.move_remote(id, parent, entry)?;
                id
            }
            Some(id) => {
                self.tree.from_remote(id, entry)?;
                id
            }
            None => match self.tree.find_child(parent, entry.name()) {
                Some(twin) if self.tree.get(twin)?.is_remote() => {
                    return Err(TreeError::DuplicateName {
                        parent,
                        name: entry.name().to_string(),
                    }
                    .into());
                }
                Some(twin) => {
                    trace!(node = %twin, name = %entry.name(), "Remote entry matched local node");
                    self.tree.from_remote(twin, entry)?;
                    twin
                }
                None => self.tree.add_child(parent, Resource::from_remote(entry))?,
            },
        };

        self.drain(id)?;
        Ok(Some(id))
    }

    /// Places every entry, then fails if any is still waiting for its parent
    ///
    /// Returns the number of entries consumed.
    pub fn apply_remote_all(
        &mut self,
        entries: impl IntoIterator<Item = Entry>,
    ) -> Result<usize, ResourceError> {
        let mut count = 0;
        for entry in entries {
            self.apply_remote(entry)?;
            count += 1;
        }

        let orphan = self
            .pending
            .iter()
            .min_by(|a, b| a.0.as_str().cmp(b.0.as_str()))
            .and_then(|(link, entries)| entries.first().map(|e| (link, e)));
        if let Some((parent_link, entry)) = orphan {
            return Err(TreeError::UnresolvedParent {
                name: entry.name().to_string(),
                parent_link: parent_link.clone(),
            }
            .into());
        }

        debug!(entries = count, nodes = self.tree.len(), "Remote listing merged");
        Ok(count)
    }

    fn resolve_parent(&self, entry: &Entry) -> Option<NodeId> {
        let root = self.tree.root();
        match entry.parent_link() {
            None => Some(root),
            Some(link) => self.tree.find_by_link(link),
        }
    }

    fn defer(&mut self, entry: Entry) {
        if let Some(parent_link) = entry.parent_link().cloned() {
            trace!(name = %entry.name(), parent = %parent_link, "Parent not seen yet, buffering");
            self.pending.entry(parent_link).or_default().push(entry);
        }
    }

    /// Applies entries that were waiting for `id`
    fn drain(&mut self, id: NodeId) -> Result<(), ResourceError> {
        let Some(link) = self.tree.get(id)?.self_link().cloned() else {
            return Ok(());
        };
        if let Some(waiting) = self.pending.remove(&link) {
            for entry in waiting {
                self.apply_remote(entry)?;
            }
        }
        Ok(())
    }

    // ========================================================================
    // Local side
    // ========================================================================

    /// Places one local observation in the tree
    ///
    /// Missing intermediate folders are created as local-only folders.
    ///
    /// # Errors
    /// - [`TreeError::KindMismatch`] if a path segment is a file in the tree
    ///   but a folder on disk, or the reverse
    pub fn apply_local(&mut self, local: &LocalEntry) -> Result<NodeId, ResourceError> {
        let Some(name) = local.name() else {
            return Err(DomainError::ValidationFailed("local entry has an empty path".into()).into());
        };

        let mut current = self.tree.root();
        for (depth, segment) in local.parent_segments().iter().enumerate() {
            current = match self.tree.find_child(current, segment) {
                Some(child) if !self.tree.get(child)?.is_folder() => {
                    return Err(kind_mismatch(&local.relative_path[..=depth]).into());
                }
                Some(child) => {
                    self.tree.record_local(child, LocalSnapshot::folder())?;
                    child
                }
                None => self.tree.add_child(
                    current,
                    Resource::from_local(Entry::local_folder(segment.clone())?, LocalSnapshot::folder()),
                )?,
            };
        }

        let snapshot = LocalSnapshot::from(local);
        let id = match self.tree.find_child(current, name) {
            Some(node) if self.tree.get(node)?.is_folder() != local.is_folder => {
                return Err(kind_mismatch(&local.relative_path).into());
            }
            Some(node) => {
                self.tree.record_local(node, snapshot)?;
                node
            }
            None => {
                let entry = if local.is_folder {
                    Entry::local_folder(name)?
                } else {
                    Entry::local_file(name, local.checksum.clone())?
                };
                self.tree.add_child(current, Resource::from_local(entry, snapshot))?
            }
        };

        trace!(node = %id, path = %local.relative_path.join("/"), state = %self.tree.state(id)?, "Local entry applied");
        Ok(id)
    }

    /// Places every local observation; returns how many were applied
    pub fn apply_local_all<'e>(
        &mut self,
        entries: impl IntoIterator<Item = &'e LocalEntry>,
    ) -> Result<usize, ResourceError> {
        let mut count = 0;
        for entry in entries {
            self.apply_local(entry)?;
            count += 1;
        }
        debug!(entries = count, nodes = self.tree.len(), "Local scan merged");
        Ok(count)
    }
}

fn kind_mismatch(segments: &[String]) -> TreeError {
    TreeError::KindMismatch {
        path: segments.join("/"),
    }
}
