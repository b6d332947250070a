//! HTTP transport adapter
//!
//! [`HttpTransport`] implements the [`ITransport`] port on top of
//! `reqwest::Client`. Headers are forwarded exactly as the caller provides
//! them, request bodies are streamed with `Body::wrap_stream` and response
//! bodies are handed back as chunk streams, so downloads never need to be
//! buffered in memory.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use drivetree_core::ports::{AuthHeaders, ITransport, Method};
//! use drivetree_http::client::HttpTransport;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let transport = HttpTransport::with_base_url("https://drive.example.com")?;
//! let auth = AuthHeaders::bearer("access-token");
//! let response = transport.request(Method::Get, "/files/root/children", &auth, None).await?;
//! println!("status {}", response.status);
//! # Ok(())
//! # }
//! ```

use std::io;
use std::pin::Pin;
use std::sync::Mutex;
use std::task::{Context as TaskContext, Poll};
use std::time::Duration;

use anyhow::Context;
use bytes::Bytes;
use futures_util::stream::{Stream, StreamExt};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Url};
use tracing::{debug, instrument};

use drivetree_core::config::TransportConfig;
use drivetree_core::ports::transport::{
    AuthHeaders, ByteStream, ITransport, Method, RequestBody, TransportResponse,
};

use crate::HttpError;

// ============================================================================
// HttpTransport
// ============================================================================

/// reqwest-backed implementation of [`ITransport`]
///
/// Links produced by the remote feed are normally absolute. Relative links
/// are resolved against the optional base URL, which is also how tests
/// point the transport at a mock server.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    /// The underlying HTTP client
    client: Client,
    /// Base URL for relative links
    base_url: Option<Url>,
}

impl HttpTransport {
    /// Creates a transport with a default client and no base URL
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            base_url: None,
        }
    }

    /// Creates a transport that resolves relative links against `base_url`
    ///
    /// # Errors
    /// Returns [`HttpError::InvalidUrl`] if `base_url` is not an absolute URL
    pub fn with_base_url(base_url: &str) -> Result<Self, HttpError> {
        Ok(Self {
            client: Client::new(),
            base_url: Some(parse_base(base_url)?),
        })
    }

    /// Creates a transport from the `transport` configuration section
    ///
    /// # Errors
    /// Returns an error if the base URL is malformed or the client cannot be built
    pub fn from_config(config: &TransportConfig) -> Result<Self, HttpError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;

        let base_url = config.base_url.as_deref().map(parse_base).transpose()?;

        debug!(
            base_url = ?base_url.as_ref().map(Url::as_str),
            timeout_secs = config.timeout_secs,
            "HttpTransport configured"
        );

        Ok(Self { client, base_url })
    }

    /// Returns the base URL, if configured
    pub fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref()
    }

    /// Turns a link into an absolute URL
    ///
    /// # Errors
    /// Returns [`HttpError::InvalidUrl`] for relative links without a base
    /// URL and for unparsable links.
    pub fn resolve(&self, link: &str) -> Result<Url, HttpError> {
        match Url::parse(link) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let base = self.base_url.as_ref().ok_or_else(|| HttpError::InvalidUrl {
                    url: link.to_string(),
                    reason: "relative link and no base URL configured".to_string(),
                })?;
                join_relative(base, link)
            }
            Err(e) => Err(HttpError::InvalidUrl {
                url: link.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

/// Parses a base URL, making sure it ends in `/` so joins keep its path
fn parse_base(base_url: &str) -> Result<Url, HttpError> {
    let normalized = if base_url.ends_with('/') {
        base_url.to_string()
    } else {
        format!("{base_url}/")
    };
    Url::parse(&normalized).map_err(|e| HttpError::InvalidUrl {
        url: base_url.to_string(),
        reason: e.to_string(),
    })
}

/// Appends `link` below the base path; a leading `/` does not reset it
fn join_relative(base: &Url, link: &str) -> Result<Url, HttpError> {
    base.join(link.trim_start_matches('/'))
        .map_err(|e| HttpError::InvalidUrl {
            url: link.to_string(),
            reason: e.to_string(),
        })
}

fn to_reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Delete => reqwest::Method::DELETE,
    }
}

// ============================================================================
// ITransport implementation
// ============================================================================

#[async_trait::async_trait]
impl ITransport for HttpTransport {
    #[instrument(skip(self, headers, body), fields(method = %method, url = %url))]
    async fn request(
        &self,
        method: Method,
        url: &str,
        headers: &AuthHeaders,
        body: Option<RequestBody>,
    ) -> anyhow::Result<TransportResponse> {
        let target = self.resolve(url)?;

        let mut builder = self.client.request(to_reqwest_method(method), target.clone());
        for (name, value) in headers.iter() {
            builder = builder.header(name, value);
        }
        if let Some(body) = body {
            builder = builder
                .header(CONTENT_TYPE, body.content_type)
                .body(reqwest::Body::wrap_stream(SyncStream::new(body.stream)));
        }

        let response = builder
            .send()
            .await
            .with_context(|| format!("{method} {target} failed"))?;

        let status = response.status().as_u16();
        debug!(status, "response received");

        let stream: ByteStream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(io::Error::other))
            .boxed();

        Ok(TransportResponse::new(status, stream))
    }
}

// ============================================================================
// SyncStream - Sync adapter for request bodies
// ============================================================================

/// Gives a `Send`-only [`ByteStream`] the `Sync` bound reqwest bodies need
///
/// The mutex is only ever accessed through `&mut self`, so it never locks.
struct SyncStream(Mutex<ByteStream>);

impl SyncStream {
    fn new(stream: ByteStream) -> Self {
        Self(Mutex::new(stream))
    }
}

impl Stream for SyncStream {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        match self.get_mut().0.get_mut() {
            Ok(inner) => inner.poll_next_unpin(cx),
            Err(_) => Poll::Ready(Some(Err(io::Error::other("request body stream poisoned")))),
        }
    }
}
