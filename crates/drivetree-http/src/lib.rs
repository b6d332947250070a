//! drivetree HTTP - wire adapters for the transport and feed ports
//!
//! Provides:
//! - [`HttpTransport`], a reqwest-backed [`ITransport`] with streamed bodies
//! - [`JsonFeed`], a JSON codec implementing [`IRemoteFeed`]
//!
//! ## Modules
//!
//! - [`client`] - HTTP transport adapter
//! - [`feed`] - JSON listing/entry codec
//!
//! [`ITransport`]: drivetree_core::ports::ITransport
//! [`IRemoteFeed`]: drivetree_core::ports::IRemoteFeed

pub mod client;
pub mod feed;

pub use client::HttpTransport;
pub use feed::JsonFeed;

use thiserror::Error;

/// Errors raised by the HTTP adapters
#[derive(Debug, Error)]
pub enum HttpError {
    /// A network-level error occurred, or the client could not be built
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// A link could not be turned into an absolute URL
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The response document could not be parsed or was malformed
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}
