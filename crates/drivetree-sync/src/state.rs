//! Node states and state derivation
//!
//! A node's [`State`] says what reconciliation has to do with it. It is
//! derived from three inputs: the remote entry, the latest local
//! observation and the baseline agreed at the last successful
//! reconciliation.

use std::fmt;

use drivetree_core::domain::entry::{Entry, EntryKind};

use crate::resource::{Baseline, LocalSnapshot};

/// Reconciliation state of one node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    /// Both sides agree; nothing to do
    Sync,
    /// Exists locally only; must be created remotely
    NewLocal,
    /// Exists remotely only; must be created locally
    NewRemote,
    /// Local content differs from the baseline, remote does not
    LocalChanged,
    /// Remote content differs from the baseline, local does not
    RemoteChanged,
    /// Both sides differ; resolved by the conflict policy
    BothChanged,
    /// Synced before, now gone locally; the remote copy must be deleted
    LocalDeleted,
    /// Synced before, now gone remotely; the local copy must be deleted
    RemoteDeleted,
}

impl State {
    /// snake_case name, as used in logs
    pub fn name(&self) -> &'static str {
        match self {
            State::Sync => "sync",
            State::NewLocal => "new_local",
            State::NewRemote => "new_remote",
            State::LocalChanged => "local_changed",
            State::RemoteChanged => "remote_changed",
            State::BothChanged => "both_changed",
            State::LocalDeleted => "local_deleted",
            State::RemoteDeleted => "remote_deleted",
        }
    }

    /// Returns true if the pre-order update walk has work for this state
    pub fn needs_update(&self) -> bool {
        !matches!(self, State::Sync) && !self.is_pending_delete()
    }

    /// Returns true if the node waits for the post-order deletion walk
    pub fn is_pending_delete(&self) -> bool {
        matches!(self, State::LocalDeleted | State::RemoteDeleted)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Derives the state of a node from its remote entry, local observation
/// and baseline
///
/// Deletion states are never derived here; they are assigned when a pass
/// finishes without confirmation from one side.
pub(crate) fn derive(
    entry: &Entry,
    local: Option<&LocalSnapshot>,
    baseline: Option<&Baseline>,
) -> State {
    let local = match (entry.is_remote(), local) {
        (false, _) => return State::NewLocal,
        (true, None) => return State::NewRemote,
        (true, Some(local)) => local,
    };

    let remote_checksum = match (entry.kind(), local.is_folder) {
        (EntryKind::Folder, true) => return State::Sync,
        (EntryKind::File { checksum, .. }, false) => checksum.as_ref(),
        // Kind mismatches are rejected while merging.
        _ => return State::BothChanged,
    };

    if remote_checksum.is_some() && remote_checksum == local.checksum.as_ref() {
        return State::Sync;
    }

    let Some(baseline) = baseline else {
        return State::BothChanged;
    };

    match (local_changed(local, baseline), remote_changed(entry, baseline)) {
        (false, false) => State::Sync,
        (true, false) => State::LocalChanged,
        (false, true) => State::RemoteChanged,
        (true, true) => State::BothChanged,
    }
}

/// Whether the remote file moved away from the baseline
///
/// The revision decides when both sides carry one, the checksum otherwise.
pub(crate) fn remote_changed(entry: &Entry, baseline: &Baseline) -> bool {
    match (entry.revision(), baseline.revision.as_deref()) {
        (Some(current), Some(agreed)) => current != agreed,
        _ => entry.checksum() != baseline.checksum.as_ref(),
    }
}

/// Whether the local file moved away from the baseline
pub(crate) fn local_changed(local: &LocalSnapshot, baseline: &Baseline) -> bool {
    local.checksum != baseline.checksum
}
