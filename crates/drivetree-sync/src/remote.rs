//! Remote requests shared by the listing fetcher and the reconciler

use std::collections::HashSet;

use bytes::Bytes;
use tracing::{debug, instrument};

use drivetree_core::domain::entry::Entry;
use drivetree_core::domain::newtypes::Href;
use drivetree_core::ports::feed::IRemoteFeed;
use drivetree_core::ports::transport::{AuthHeaders, ITransport, Method, RequestBody};

use crate::error::ResourceError;

/// Issues a request and returns the fully received body of a 2xx response
///
/// A non-success status becomes [`ResourceError::Status`]; a body that
/// fails mid-stream becomes [`ResourceError::Transport`], never a success.
pub(crate) async fn send(
    transport: &dyn ITransport,
    method: Method,
    url: &str,
    headers: &AuthHeaders,
    body: Option<RequestBody>,
) -> Result<Bytes, ResourceError> {
    let transport_error = |source: anyhow::Error| ResourceError::Transport {
        method,
        url: url.to_string(),
        source,
    };

    let response = transport
        .request(method, url, headers, body)
        .await
        .map_err(transport_error)?;

    if !response.is_success() {
        return Err(ResourceError::Status {
            method,
            url: url.to_string(),
            status: response.status,
        });
    }

    response
        .bytes()
        .await
        .map_err(|e| transport_error(anyhow::Error::new(e).context("response body truncated")))
}

/// Fetches a complete remote listing, following `next_link` pages
///
/// # Errors
/// Returns the first transport, status or feed error. A page that links
/// back to one already fetched is reported as a feed error.
#[instrument(skip(transport, feed, auth), fields(url = %url))]
pub async fn fetch_listing(
    transport: &dyn ITransport,
    feed: &dyn IRemoteFeed,
    url: &Href,
    auth: &AuthHeaders,
) -> Result<Vec<Entry>, ResourceError> {
    let mut entries = Vec::new();
    let mut visited = HashSet::new();
    let mut next = Some(url.clone());

    while let Some(page_url) = next.take() {
        if !visited.insert(page_url.clone()) {
            return Err(ResourceError::Feed(anyhow::anyhow!(
                "listing pages loop back to {page_url}"
            )));
        }

        let body = send(transport, Method::Get, page_url.as_str(), auth, None).await?;
        let page = feed.parse_page(&body).map_err(ResourceError::Feed)?;
        debug!(page = visited.len(), entries = page.entries.len(), "Listing page fetched");

        entries.extend(page.entries);
        next = page.next_link;
    }

    Ok(entries)
}
