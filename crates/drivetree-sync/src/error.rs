//! Error types for the resource tree and the reconciler
//!
//! [`TreeError`] covers structural faults: broken linkage, collisions,
//! operations the tree shape does not allow. These indicate a bug or a
//! corrupt listing and abort a reconciliation walk.
//!
//! [`ResourceError`] is the single error type returned by every resource
//! operation. Transport and local I/O failures are recorded per node and
//! the walk carries on; structural faults are wrapped as
//! [`ResourceError::Tree`].

use std::path::PathBuf;

use thiserror::Error;

use drivetree_core::domain::errors::DomainError;
use drivetree_core::domain::newtypes::{Href, ResourceId};
use drivetree_core::ports::transport::Method;

use crate::tree::NodeId;

/// Structural faults in the resource tree
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TreeError {
    /// The node id does not refer to a live node
    #[error("Node {0} not found")]
    NotFound(NodeId),

    /// Children can only be added under folders
    #[error("Node {0} is not a folder")]
    NotAFolder(NodeId),

    /// A live child with the same name already exists
    #[error("Node {parent} already has a child named '{name}'")]
    DuplicateName { parent: NodeId, name: String },

    /// Another node already carries this remote identity
    #[error("Resource ID {0} is already in the tree")]
    DuplicateResourceId(ResourceId),

    /// A listed entry's parent never appeared in the listing
    #[error("Parent {parent_link} of '{name}' is not in the listing")]
    UnresolvedParent { name: String, parent_link: Href },

    /// Walking the ancestry did not terminate
    #[error("Cycle detected at node {0}")]
    Cycle(NodeId),

    /// Only leaves can be detached
    #[error("Node {0} still has children")]
    HasChildren(NodeId),

    /// The root cannot be moved, renamed or removed
    #[error("The root node cannot be moved or removed")]
    RootImmutable,

    /// A file was observed where a folder is known, or the reverse
    #[error("Kind mismatch at '{path}'")]
    KindMismatch { path: String },

    /// Remote creation needs the parent's self-link
    #[error("Parent of node {0} does not exist remotely yet")]
    ParentNotRemote(NodeId),

    /// The node lacks the remote link the operation needs
    #[error("Node {0} has no remote link")]
    MissingRemoteLink(NodeId),
}

/// Errors returned by resource operations
#[derive(Debug, Error)]
pub enum ResourceError {
    /// The request never produced a status (connection, TLS, timeout, truncated body)
    #[error("{method} {url} failed: {source:#}")]
    Transport {
        method: Method,
        url: String,
        source: anyhow::Error,
    },

    /// The remote answered with a non-success status
    #[error("{method} {url} returned status {status}")]
    Status {
        method: Method,
        url: String,
        status: u16,
    },

    /// Structural fault in the tree
    #[error("Tree error: {0}")]
    Tree(#[from] TreeError),

    /// Local filesystem failure
    #[error("Local I/O failed at {}: {source:#}", path.display())]
    Io { path: PathBuf, source: anyhow::Error },

    /// The remote returned a document the feed codec could not handle
    #[error("Malformed remote data: {0:#}")]
    Feed(#[source] anyhow::Error),

    /// Invalid domain value (name, link, checksum)
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// The operation was cancelled before it completed
    #[error("Operation cancelled")]
    Cancelled,
}

impl ResourceError {
    /// Wraps a local filesystem error with the path it concerns
    pub fn io(path: impl Into<PathBuf>, source: anyhow::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns true for structural faults, which abort a reconciliation walk
    pub fn is_structural(&self) -> bool {
        matches!(self, ResourceError::Tree(_))
    }

    /// Returns true for failures that may succeed on a later attempt
    ///
    /// Transport failures, local I/O failures, rate limiting (429) and
    /// server errors (5xx) are retryable. Other statuses, malformed data and
    /// structural faults are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            ResourceError::Transport { .. } | ResourceError::Io { .. } => true,
            ResourceError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
