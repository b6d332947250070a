//! Resource - one node of the resource tree
//!
//! A [`Resource`] pairs the current [`Entry`] with tree linkage and the
//! bookkeeping needed to derive its [`State`]: the latest local observation,
//! the baseline agreed at the last successful reconciliation and the
//! per-pass confirmation flags.
//!
//! Resources are move-only. Linkage (`parent`, `children`) is maintained by
//! [`ResourceTree`](crate::tree::ResourceTree) and cannot be changed from
//! outside this crate.

use chrono::{DateTime, Utc};

use drivetree_core::domain::entry::Entry;
use drivetree_core::domain::newtypes::{Checksum, Href, ResourceId};
use drivetree_core::ports::local_filesystem::LocalEntry;

use crate::state::{self, State};
use crate::tree::NodeId;

/// Latest local observation of a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalSnapshot {
    pub is_folder: bool,
    /// Content checksum (files only)
    pub checksum: Option<Checksum>,
    pub modified: Option<DateTime<Utc>>,
}

impl LocalSnapshot {
    pub fn folder() -> Self {
        Self {
            is_folder: true,
            checksum: None,
            modified: None,
        }
    }

    pub fn file(checksum: Option<Checksum>) -> Self {
        Self {
            is_folder: false,
            checksum,
            modified: None,
        }
    }
}

impl From<&LocalEntry> for LocalSnapshot {
    fn from(entry: &LocalEntry) -> Self {
        Self {
            is_folder: entry.is_folder,
            checksum: entry.checksum.clone(),
            modified: entry.modified,
        }
    }
}

/// Content identity agreed by both sides at the last successful reconciliation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Baseline {
    pub checksum: Option<Checksum>,
    pub revision: Option<String>,
}

impl Baseline {
    /// Baseline for a node whose remote entry and local copy now agree
    ///
    /// The remote checksum is preferred; the local one fills in when the
    /// remote did not report any.
    pub fn agreed(entry: &Entry, local: Option<&LocalSnapshot>) -> Self {
        Self {
            checksum: entry
                .checksum()
                .or_else(|| local.and_then(|l| l.checksum.as_ref()))
                .cloned(),
            revision: entry.revision().map(str::to_string),
        }
    }
}

/// A node of the resource tree
#[derive(Debug)]
pub struct Resource {
    entry: Entry,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    state: State,
    local: Option<LocalSnapshot>,
    baseline: Option<Baseline>,
    seen_local: bool,
    seen_remote: bool,
}

impl Resource {
    /// A node for an entry just read from the remote listing
    pub fn from_remote(entry: Entry) -> Self {
        let mut resource = Self::bare(entry);
        resource.seen_remote = true;
        resource.rederive();
        resource
    }

    /// A node for something observed locally only
    pub fn from_local(entry: Entry, local: LocalSnapshot) -> Self {
        let mut resource = Self::bare(entry);
        resource.local = Some(local);
        resource.seen_local = true;
        resource.rederive();
        resource
    }

    /// The sync root: present on both sides by definition
    pub(crate) fn root(entry: Entry) -> Self {
        let mut resource = Self::bare(entry);
        resource.local = Some(LocalSnapshot::folder());
        resource.seen_local = true;
        resource.seen_remote = true;
        resource.state = State::Sync;
        resource
    }

    fn bare(entry: Entry) -> Self {
        Self {
            entry,
            parent: None,
            children: Vec::new(),
            state: State::NewLocal,
            local: None,
            baseline: None,
            seen_local: false,
            seen_remote: false,
        }
    }

    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    pub fn name(&self) -> &str {
        self.entry.name()
    }

    pub fn is_folder(&self) -> bool {
        self.entry.is_folder()
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn local(&self) -> Option<&LocalSnapshot> {
        self.local.as_ref()
    }

    pub fn baseline(&self) -> Option<&Baseline> {
        self.baseline.as_ref()
    }

    pub fn self_link(&self) -> Option<&Href> {
        self.entry.self_link()
    }

    /// Remote identity, stable once the node is remote-known
    pub fn resource_id(&self) -> Option<ResourceId> {
        self.entry.resource_id()
    }

    pub fn is_remote(&self) -> bool {
        self.entry.is_remote()
    }

    pub fn seen_local(&self) -> bool {
        self.seen_local
    }

    pub fn seen_remote(&self) -> bool {
        self.seen_remote
    }

    // ------------------------------------------------------------------
    // Mutation, driven by the tree
    // ------------------------------------------------------------------

    /// Swaps in a fresher remote entry
    pub(crate) fn replace_entry(&mut self, entry: Entry) -> Entry {
        std::mem::replace(&mut self.entry, entry)
    }

    pub(crate) fn set_state(&mut self, state: State) {
        self.state = state;
    }

    pub(crate) fn mark_remote_seen(&mut self) {
        self.seen_remote = true;
    }

    pub(crate) fn record_local(&mut self, local: LocalSnapshot) {
        self.local = Some(local);
        self.seen_local = true;
    }

    pub(crate) fn forget_local(&mut self) {
        self.local = None;
    }

    /// Both sides now hold the same content
    pub(crate) fn mark_synced(&mut self) {
        self.baseline = Some(Baseline::agreed(&self.entry, self.local.as_ref()));
        self.seen_local = true;
        self.seen_remote = true;
        self.state = State::Sync;
    }

    /// A file whose remote entry differs from the baseline
    pub(crate) fn remote_drifted(&self) -> bool {
        !self.is_folder()
            && self
                .baseline
                .as_ref()
                .is_some_and(|baseline| state::remote_changed(&self.entry, baseline))
    }

    /// A file whose local copy differs from the baseline
    pub(crate) fn local_drifted(&self) -> bool {
        match (&self.local, &self.baseline) {
            (Some(local), Some(baseline)) if !self.is_folder() => state::local_changed(local, baseline),
            _ => false,
        }
    }

    pub(crate) fn clear_seen(&mut self) {
        self.seen_local = false;
        self.seen_remote = false;
    }

    /// Recomputes the state from the entry, local snapshot and baseline
    ///
    /// Agreement observed without an explicit transfer still counts as a
    /// baseline, so later deletions on one side are recognized.
    pub(crate) fn rederive(&mut self) {
        self.state = state::derive(&self.entry, self.local.as_ref(), self.baseline.as_ref());
        if self.state == State::Sync {
            self.baseline = Some(Baseline::agreed(&self.entry, self.local.as_ref()));
        }
    }
}
