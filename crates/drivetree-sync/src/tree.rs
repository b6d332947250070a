//! ResourceTree - arena of resources with stable node ids
//!
//! Nodes live in a `Vec<Option<Resource>>`; a [`NodeId`] is an index into
//! it and stays valid until the node is detached, after which its slot is a
//! tombstone. Every node except the root has exactly one parent, and a
//! child's `parent` and its parent's `children` are always updated
//! together.
//!
//! Two indexes map remote identity to nodes: resource ids and self-links.
//! Both are kept in step with every entry replacement and detach.
//!
//! ## Passes
//!
//! A pass is `begin_pass`, merging of remote and local observations,
//! `finish_pass`, then reconciliation. `finish_pass` turns nodes that one
//! side stopped confirming into deletion candidates.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use tracing::debug;

use drivetree_core::config::SyncConfig;
use drivetree_core::domain::entry::{Entry, EntryKind};
use drivetree_core::domain::errors::DomainError;
use drivetree_core::domain::newtypes::{Href, ResourceId};

use crate::error::TreeError;
use crate::resource::{LocalSnapshot, Resource};
use crate::state::State;

/// Name given to the root when the sync root has no final component
const ROOT_NAME: &str = "root";

/// Stable index of a node in a [`ResourceTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    #[cfg(test)]
    pub(crate) fn from_index(index: usize) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Arena-backed tree of resources rooted at the sync root
#[derive(Debug)]
pub struct ResourceTree {
    nodes: Vec<Option<Resource>>,
    root: NodeId,
    root_dir: PathBuf,
    by_id: HashMap<ResourceId, NodeId>,
    by_link: HashMap<Href, NodeId>,
}

impl ResourceTree {
    /// Creates a tree holding only the root folder
    ///
    /// `root_link` is the remote self-link of the sync root, if known.
    ///
    /// # Errors
    /// Returns an error if the root directory name is not a valid entry name
    pub fn new(root_dir: impl Into<PathBuf>, root_link: Option<Href>) -> Result<Self, DomainError> {
        let root_dir = root_dir.into();
        let name = root_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| ROOT_NAME.to_string());

        let entry = match root_link {
            Some(link) => Entry::remote(name, EntryKind::Folder, link, None)?,
            None => Entry::local_folder(name)?,
        };

        let mut tree = Self {
            nodes: vec![Some(Resource::root(entry))],
            root: NodeId(0),
            root_dir,
            by_id: HashMap::new(),
            by_link: HashMap::new(),
        };
        tree.index(tree.root);
        Ok(tree)
    }

    /// Creates a tree from the `sync` configuration section
    ///
    /// # Errors
    /// Returns an error if `remote_root` is not a valid link
    pub fn from_config(config: &SyncConfig) -> Result<Self, DomainError> {
        let link = Href::new(config.remote_root.clone())?;
        Self::new(config.root.clone(), Some(link))
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Number of live nodes, root included
    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|slot| slot.is_some()).count()
    }

    /// Always false: the root cannot be removed
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: NodeId) -> bool {
        matches!(self.nodes.get(id.0), Some(Some(_)))
    }

    pub fn get(&self, id: NodeId) -> Result<&Resource, TreeError> {
        self.nodes
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or(TreeError::NotFound(id))
    }

    pub fn get_mut(&mut self, id: NodeId) -> Result<&mut Resource, TreeError> {
        self.nodes
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or(TreeError::NotFound(id))
    }

    pub fn parent(&self, id: NodeId) -> Result<Option<NodeId>, TreeError> {
        Ok(self.get(id)?.parent)
    }

    pub fn children(&self, id: NodeId) -> Result<&[NodeId], TreeError> {
        Ok(&self.get(id)?.children)
    }

    pub fn name(&self, id: NodeId) -> Result<&str, TreeError> {
        Ok(self.get(id)?.name())
    }

    pub fn state(&self, id: NodeId) -> Result<State, TreeError> {
        Ok(self.get(id)?.state())
    }

    // ========================================================================
    // Linkage
    // ========================================================================

    /// Attaches `resource` as a new child of `parent`
    ///
    /// # Errors
    /// - [`TreeError::NotFound`] / [`TreeError::NotAFolder`] for a bad parent
    /// - [`TreeError::DuplicateName`] if a live child has the same name
    /// - [`TreeError::DuplicateResourceId`] if the remote identity is taken
    pub fn add_child(&mut self, parent: NodeId, mut resource: Resource) -> Result<NodeId, TreeError> {
        self.ensure_folder(parent)?;
        self.ensure_name_free(parent, resource.name(), None)?;
        if let Some(rid) = resource.resource_id() {
            if self.by_id.contains_key(&rid) {
                return Err(TreeError::DuplicateResourceId(rid));
            }
        }

        let id = NodeId(self.nodes.len());
        resource.parent = Some(parent);
        resource.children.clear();
        self.nodes.push(Some(resource));
        self.get_mut(parent)?.children.push(id);
        self.index(id);

        debug!(node = %id, parent = %parent, "Child attached");
        Ok(id)
    }

    /// Moves `id` under `new_parent`, keeping its name
    ///
    /// Moving a node under its current parent is a no-op.
    ///
    /// # Errors
    /// - [`TreeError::RootImmutable`] for the root
    /// - [`TreeError::Cycle`] if `new_parent` is `id` or one of its descendants
    /// - [`TreeError::DuplicateName`] if the name is taken under `new_parent`
    pub fn reparent(&mut self, id: NodeId, new_parent: NodeId) -> Result<(), TreeError> {
        let name = self.get(id)?.name().to_string();
        self.move_under(id, new_parent, &name)
    }

    /// Relinks `id` under `new_parent`, checking collisions against `name`
    fn move_under(&mut self, id: NodeId, new_parent: NodeId, name: &str) -> Result<(), TreeError> {
        if id == self.root {
            return Err(TreeError::RootImmutable);
        }
        self.ensure_folder(new_parent)?;
        if self.is_ancestor_or_self(id, new_parent)? {
            return Err(TreeError::Cycle(id));
        }
        self.ensure_name_free(new_parent, name, Some(id))?;

        let old_parent = self.get(id)?.parent;
        if old_parent == Some(new_parent) {
            return Ok(());
        }
        if let Some(old) = old_parent {
            self.get_mut(old)?.children.retain(|&child| child != id);
        }
        self.get_mut(new_parent)?.children.push(id);
        self.get_mut(id)?.parent = Some(new_parent);

        debug!(node = %id, from = ?old_parent, to = %new_parent, "Node moved");
        Ok(())
    }

    /// Removes a leaf node and returns it
    ///
    /// # Errors
    /// - [`TreeError::RootImmutable`] for the root
    /// - [`TreeError::HasChildren`] if the node still has live children
    pub fn detach(&mut self, id: NodeId) -> Result<Resource, TreeError> {
        if id == self.root {
            return Err(TreeError::RootImmutable);
        }
        if !self.get(id)?.children.is_empty() {
            return Err(TreeError::HasChildren(id));
        }

        self.unindex(id);
        let mut resource = self.nodes[id.0].take().ok_or(TreeError::NotFound(id))?;
        if let Some(parent) = resource.parent.take() {
            if let Ok(parent) = self.get_mut(parent) {
                parent.children.retain(|&child| child != id);
            }
        }

        debug!(node = %id, name = %resource.name(), "Node detached");
        Ok(resource)
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    /// Finds the live child of `parent` named exactly `name`
    pub fn find_child(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        let parent = self.get(parent).ok()?;
        parent
            .children
            .iter()
            .copied()
            .find(|&child| self.get(child).is_ok_and(|c| c.name() == name))
    }

    pub fn find_by_resource_id(&self, id: &ResourceId) -> Option<NodeId> {
        self.by_id.get(id).copied()
    }

    pub fn find_by_link(&self, link: &Href) -> Option<NodeId> {
        self.by_link.get(link).copied()
    }

    // ========================================================================
    // Paths
    // ========================================================================

    /// Local path of a node: the sync root joined with the names below it
    pub fn path(&self, id: NodeId) -> Result<PathBuf, TreeError> {
        let mut path = self.root_dir.clone();
        for name in self.names_below_root(id)? {
            path.push(name);
        }
        Ok(path)
    }

    /// `/`-joined names below the root; empty for the root itself
    pub fn relative_path(&self, id: NodeId) -> Result<String, TreeError> {
        Ok(self.names_below_root(id)?.join("/"))
    }

    /// Returns true if the parent walk from `id` ends at the root
    ///
    /// # Errors
    /// Returns [`TreeError::Cycle`] if the walk does not terminate
    pub fn is_in_root_tree(&self, id: NodeId) -> Result<bool, TreeError> {
        let mut current = id;
        for _ in 0..=self.nodes.len() {
            if current == self.root {
                return Ok(true);
            }
            match self.nodes.get(current.0).and_then(Option::as_ref) {
                Some(resource) => match resource.parent {
                    Some(parent) => current = parent,
                    None => return Ok(false),
                },
                None => return Ok(false),
            }
        }
        Err(TreeError::Cycle(id))
    }

    fn names_below_root(&self, id: NodeId) -> Result<Vec<&str>, TreeError> {
        let mut names = Vec::new();
        let mut current = id;
        for _ in 0..=self.nodes.len() {
            if current == self.root {
                names.reverse();
                return Ok(names);
            }
            let resource = self.get(current)?;
            names.push(resource.name());
            current = resource.parent.ok_or(TreeError::NotFound(current))?;
        }
        Err(TreeError::Cycle(id))
    }

    fn is_ancestor_or_self(&self, ancestor: NodeId, id: NodeId) -> Result<bool, TreeError> {
        let mut current = Some(id);
        for _ in 0..=self.nodes.len() {
            match current {
                Some(node) if node == ancestor => return Ok(true),
                Some(node) => current = self.get(node)?.parent,
                None => return Ok(false),
            }
        }
        Err(TreeError::Cycle(id))
    }

    // ========================================================================
    // Traversal
    // ========================================================================

    /// Nodes below and including `start`, parents before children
    pub fn pre_order(&self, start: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            let Ok(resource) = self.get(id) else { continue };
            order.push(id);
            stack.extend(resource.children.iter().rev());
        }
        order
    }

    /// Nodes below and including `start`, children before parents
    pub fn post_order(&self, start: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            let Ok(resource) = self.get(id) else { continue };
            order.push(id);
            stack.extend(resource.children.iter());
        }
        order.reverse();
        order
    }

    // ========================================================================
    // Entry updates
    // ========================================================================

    /// Replaces a node's entry with a fresher remote snapshot
    ///
    /// Re-indexes the node, marks it confirmed by the remote side and
    /// re-derives its state.
    ///
    /// # Errors
    /// - [`TreeError::KindMismatch`] if the entry changes file/folder kind
    /// - [`TreeError::DuplicateName`] if a rename collides with a sibling
    /// - [`TreeError::DuplicateResourceId`] if another node holds the identity
    pub fn from_remote(&mut self, id: NodeId, entry: Entry) -> Result<(), TreeError> {
        self.replace_entry(id, entry)?;
        let resource = self.get_mut(id)?;
        resource.mark_remote_seen();
        resource.rederive();
        debug!(node = %id, state = %resource.state(), "Remote entry applied");
        Ok(())
    }

    /// Replaces a node's entry with the one returned by a successful
    /// creation or upload and marks both sides as agreed
    pub fn adopt_remote(&mut self, id: NodeId, entry: Entry) -> Result<(), TreeError> {
        self.replace_entry(id, entry)?;
        self.get_mut(id)?.mark_synced();
        Ok(())
    }

    /// Records a local observation and re-derives the state
    pub(crate) fn record_local(&mut self, id: NodeId, local: LocalSnapshot) -> Result<(), TreeError> {
        let resource = self.get_mut(id)?;
        resource.record_local(local);
        resource.rederive();
        Ok(())
    }

    /// Records the local copy produced by a download or directory creation
    /// and marks both sides as agreed
    pub(crate) fn mark_synced(&mut self, id: NodeId, local: LocalSnapshot) -> Result<(), TreeError> {
        let resource = self.get_mut(id)?;
        resource.record_local(local);
        resource.mark_synced();
        Ok(())
    }

    /// Applies a remote move: relinks under `new_parent`, then replaces the entry
    pub(crate) fn move_remote(&mut self, id: NodeId, new_parent: NodeId, entry: Entry) -> Result<(), TreeError> {
        self.move_under(id, new_parent, entry.name())?;
        self.from_remote(id, entry)
    }

    fn replace_entry(&mut self, id: NodeId, entry: Entry) -> Result<(), TreeError> {
        let current = self.get(id)?;
        if current.is_folder() != entry.is_folder() {
            return Err(TreeError::KindMismatch {
                path: self.relative_path(id)?,
            });
        }
        if current.name() != entry.name() {
            if id == self.root {
                return Err(TreeError::RootImmutable);
            }
            if let Some(parent) = current.parent {
                self.ensure_name_free(parent, entry.name(), Some(id))?;
            }
        }
        if let Some(rid) = entry.resource_id() {
            match self.by_id.get(&rid) {
                Some(&holder) if holder != id => return Err(TreeError::DuplicateResourceId(rid)),
                _ => {}
            }
        }

        self.unindex(id);
        self.get_mut(id)?.replace_entry(entry);
        self.index(id);
        Ok(())
    }

    // ========================================================================
    // Pass bookkeeping
    // ========================================================================

    /// Starts a new pass: every node must be confirmed again
    pub fn begin_pass(&mut self) {
        let root = self.root;
        for (index, slot) in self.nodes.iter_mut().enumerate() {
            if let Some(resource) = slot {
                if index != root.0 {
                    resource.clear_seen();
                }
            }
        }
    }

    /// Ends the merge phase of a pass and returns the deletion candidates
    ///
    /// - Synced before and unconfirmed locally: [`State::LocalDeleted`]
    /// - Synced before and unconfirmed remotely: [`State::RemoteDeleted`]
    /// - Synced before and gone from both sides: detached
    /// - Never synced and gone from the only side it was on: detached
    ///
    /// A deletion never wins over a change on the other side. When the
    /// surviving copy differs from the baseline, or a child survives, the
    /// node is re-seeded from that side instead (`NewRemote` or `NewLocal`).
    ///
    /// Candidates are returned in post-order.
    pub fn finish_pass(&mut self) -> Vec<NodeId> {
        let mut candidates = Vec::new();
        for id in self.post_order(self.root) {
            if id == self.root {
                continue;
            }
            let Ok(resource) = self.get(id) else { continue };
            let seen_local = resource.seen_local();
            let seen_remote = resource.seen_remote();
            if resource.baseline().is_some() {
                match (seen_local, seen_remote) {
                    (true, true) => {}
                    (false, false) => self.detach_if_leaf(id),
                    (false, true) => {
                        if resource.remote_drifted() || self.has_survivor(id, State::LocalDeleted) {
                            debug!(node = %id, "Changed remotely since removed locally, restoring");
                            if let Ok(resource) = self.get_mut(id) {
                                resource.forget_local();
                                resource.rederive();
                            }
                        } else if let Ok(resource) = self.get_mut(id) {
                            resource.set_state(State::LocalDeleted);
                            candidates.push(id);
                        }
                    }
                    (true, false) => {
                        if resource.local_drifted() || self.has_survivor(id, State::RemoteDeleted) {
                            debug!(node = %id, "Changed locally since removed remotely, restoring");
                            if let Err(e) = self.demote_to_local(id) {
                                debug!(node = %id, error = %e, "Could not demote node");
                            }
                        } else if let Ok(resource) = self.get_mut(id) {
                            resource.set_state(State::RemoteDeleted);
                            candidates.push(id);
                        }
                    }
                }
                continue;
            }

            let Ok(resource) = self.get_mut(id) else { continue };
            let remote_known = resource.is_remote();
            let has_local = resource.local().is_some();
            if remote_known && !seen_remote {
                // The remote vanished before anything was agreed. If a local
                // copy remains, it is local-only again.
                if seen_local {
                    if let Err(e) = self.demote_to_local(id) {
                        debug!(node = %id, error = %e, "Could not demote node");
                    }
                } else {
                    self.detach_if_leaf(id);
                }
            } else if has_local && !seen_local {
                if remote_known {
                    resource.forget_local();
                    resource.rederive();
                } else {
                    self.detach_if_leaf(id);
                }
            }
        }

        debug!(candidates = candidates.len(), "Pass finished");
        candidates
    }

    fn detach_if_leaf(&mut self, id: NodeId) {
        match self.detach(id) {
            Ok(resource) => debug!(node = %id, name = %resource.name(), "Folded away"),
            Err(e) => debug!(node = %id, error = %e, "Kept unconfirmed node"),
        }
    }

    /// Returns true if a child of `id` is not itself headed for `deleted`
    fn has_survivor(&self, id: NodeId, deleted: State) -> bool {
        self.children(id)
            .map(|children| {
                children
                    .iter()
                    .any(|&child| self.state(child).is_ok_and(|state| state != deleted))
            })
            .unwrap_or(false)
    }

    /// Drops a node's remote identity, leaving a local-only synthesis
    fn demote_to_local(&mut self, id: NodeId) -> Result<(), TreeError> {
        let resource = self.get(id)?;
        let name = resource.name().to_string();
        let entry = match resource.local() {
            Some(local) if !local.is_folder => Entry::local_file(name, local.checksum.clone()),
            _ => Entry::local_folder(name),
        }
        .map_err(|_| TreeError::MissingRemoteLink(id))?;

        self.unindex(id);
        let resource = self.get_mut(id)?;
        resource.replace_entry(entry);
        resource.rederive();
        Ok(())
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn ensure_folder(&self, id: NodeId) -> Result<(), TreeError> {
        if self.get(id)?.is_folder() {
            Ok(())
        } else {
            Err(TreeError::NotAFolder(id))
        }
    }

    fn ensure_name_free(&self, parent: NodeId, name: &str, except: Option<NodeId>) -> Result<(), TreeError> {
        match self.find_child(parent, name) {
            Some(existing) if Some(existing) != except => Err(TreeError::DuplicateName {
                parent,
                name: name.to_string(),
            }),
            _ => Ok(()),
        }
    }

    fn index(&mut self, id: NodeId) {
        let Some(resource) = self.nodes.get(id.0).and_then(Option::as_ref) else {
            return;
        };
        if let Some(rid) = resource.resource_id() {
            self.by_id.insert(rid, id);
        }
        if let Some(link) = resource.self_link() {
            self.by_link.insert(link.clone(), id);
        }
    }

    fn unindex(&mut self, id: NodeId) {
        self.by_id.retain(|_, node| *node != id);
        self.by_link.retain(|_, node| *node != id);
    }
}
