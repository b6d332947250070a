//! Transport port (driven/secondary port)
//!
//! The reconciliation engine talks to the remote store exclusively through
//! [`ITransport::request`]: a method, an absolute URL, an opaque header map
//! and an optional streamed body in; a status code and a streamed body out.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because network errors are adapter-specific.
//!   A returned `Ok` only means a status line was received; callers decide
//!   what a non-success status means.
//! - [`AuthHeaders`] is produced outside this workspace (token issuance and
//!   refresh are not handled here) and is forwarded unmodified.
//! - Bodies are [`ByteStream`]s so large files never need to be buffered.

use std::fmt;

use bytes::{Bytes, BytesMut};
use futures_util::stream::{self, BoxStream, StreamExt};

/// A boxed stream of body chunks
pub type ByteStream = BoxStream<'static, std::io::Result<Bytes>>;

/// Wrap an in-memory buffer as a single-chunk [`ByteStream`]
pub fn bytes_stream(bytes: impl Into<Bytes>) -> ByteStream {
    let bytes = bytes.into();
    stream::iter(std::iter::once(Ok(bytes))).boxed()
}

// ============================================================================
// Method
// ============================================================================

/// Request methods used by the reconciliation engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    /// Upper-case wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// AuthHeaders
// ============================================================================

/// Opaque credential headers attached to every request
///
/// Header names are matched case-insensitively; insertion order is kept.
/// The `Debug` output lists header names only so credentials never reach
/// the logs.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct AuthHeaders {
    headers: Vec<(String, String)>,
}

impl AuthHeaders {
    /// An empty header map
    pub fn new() -> Self {
        Self::default()
    }

    /// A map holding a single `Authorization: Bearer <token>` header
    pub fn bearer(token: &str) -> Self {
        let mut headers = Self::new();
        headers.insert("Authorization", format!("Bearer {token}"));
        headers
    }

    /// Insert or replace a header
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .headers
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
        {
            Some(slot) => slot.1 = value,
            None => self.headers.push((name, value)),
        }
    }

    /// Builder-style [`insert`](Self::insert)
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    /// Look up a header value
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Iterate over `(name, value)` pairs in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}

impl fmt::Debug for AuthHeaders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.headers.iter().map(|(name, _)| name))
            .finish()
    }
}

// ============================================================================
// Request / response bodies
// ============================================================================

/// A streamed request body with its media type
pub struct RequestBody {
    /// Value for the `Content-Type` header
    pub content_type: String,
    /// Body chunks
    pub stream: ByteStream,
}

impl RequestBody {
    /// Body backed by a stream (file uploads)
    pub fn from_stream(content_type: impl Into<String>, stream: ByteStream) -> Self {
        Self {
            content_type: content_type.into(),
            stream,
        }
    }

    /// Body backed by an in-memory buffer (metadata requests)
    pub fn from_bytes(content_type: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self::from_stream(content_type, bytes_stream(bytes))
    }
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestBody")
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// Status code and streamed body of a completed request
pub struct TransportResponse {
    /// HTTP-style status code
    pub status: u16,
    /// Response body chunks
    pub body: ByteStream,
}

impl TransportResponse {
    pub fn new(status: u16, body: ByteStream) -> Self {
        Self { status, body }
    }

    /// Response with an in-memory body
    pub fn from_bytes(status: u16, bytes: impl Into<Bytes>) -> Self {
        Self::new(status, bytes_stream(bytes))
    }

    /// Returns true for 2xx statuses
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Drain the body into one buffer
    ///
    /// # Errors
    /// Returns the first chunk error; a truncated body is never returned as
    /// if it were complete.
    pub async fn bytes(self) -> std::io::Result<Bytes> {
        let mut body = self.body;
        let mut buf = BytesMut::new();
        while let Some(chunk) = body.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf.freeze())
    }
}

impl fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// ITransport trait
// ============================================================================

/// Port trait for authenticated request/response exchanges
///
/// ## Implementation Notes
///
/// - `headers` must be sent exactly as given.
/// - Implementations must be safe to share between tasks.
/// - A body stream error while sending must surface as `Err`, never as a
///   successful status.
#[async_trait::async_trait]
pub trait ITransport: Send + Sync {
    /// Issue one request and return its status and body stream
    async fn request(
        &self,
        method: Method,
        url: &str,
        headers: &AuthHeaders,
        body: Option<RequestBody>,
    ) -> anyhow::Result<TransportResponse>;
}
