//! drivetree Sync - Resource tree and reconciliation engine
//!
//! Provides:
//! - An arena-backed tree of remote/local resources with stable node ids
//! - Merging of remote listings and local scans into that tree
//! - Per-node state derivation and the Update/Delete reconciliation steps
//! - An ordered reconciliation walk with cancellation
//!
//! ## Modules
//!
//! - [`tree`] - [`ResourceTree`](tree::ResourceTree) arena, paths, indexes, pass bookkeeping
//! - [`resource`] - The tree node and its local/baseline snapshots
//! - [`state`] - Node states and how they are derived
//! - [`merge`] - [`TreeBuilder`](merge::TreeBuilder) for remote entries and local observations
//! - [`reconcile`] - [`Reconciler`](reconcile::Reconciler): update, delete, download, upload
//! - [`remote`] - Paged remote listings
//! - [`filesystem`] - Local filesystem adapter (atomic streamed writes, MD5 checksums)

pub mod error;
pub mod filesystem;
pub mod merge;
pub mod reconcile;
pub mod remote;
pub mod resource;
pub mod state;
pub mod tree;

pub use error::{ResourceError, TreeError};
pub use filesystem::LocalFileSystemAdapter;
pub use merge::TreeBuilder;
pub use reconcile::{DeleteSide, Reconciler, SyncReport, UpdateOutcome};
pub use resource::{Baseline, LocalSnapshot, Resource};
pub use state::State;
pub use tree::{NodeId, ResourceTree};
