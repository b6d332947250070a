//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. The resource tree and reconciliation engine
//! depend on these traits; implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`ITransport`] - Authenticated request/response exchange with the remote store
//! - [`IRemoteFeed`] - Wire codec for listings and single entries
//! - [`ILocalFileSystem`] - Local enumeration, streamed I/O and checksums

pub mod feed;
pub mod local_filesystem;
pub mod transport;

pub use feed::{FeedPage, IRemoteFeed, NewEntry};
pub use local_filesystem::{is_partial_name, ILocalFileSystem, LocalEntry, PARTIAL_SUFFIX};
pub use transport::{
    bytes_stream, AuthHeaders, ByteStream, ITransport, Method, RequestBody, TransportResponse,
};
