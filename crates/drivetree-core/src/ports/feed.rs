//! Remote feed port
//!
//! The feed codec translates between the remote store's wire documents and
//! [`Entry`] values. The reconciliation engine never inspects wire bytes
//! itself: listings, creation responses and upload receipts all go through
//! an [`IRemoteFeed`] implementation.

use crate::domain::entry::Entry;
use crate::domain::newtypes::Href;

/// One page of a remote listing
#[derive(Debug, Clone, Default)]
pub struct FeedPage {
    /// Entries in feed order
    pub entries: Vec<Entry>,
    /// Locator of the following page, absent on the last page
    pub next_link: Option<Href>,
}

/// Metadata for an object the engine is about to create remotely
#[derive(Debug, Clone, Copy)]
pub struct NewEntry<'a> {
    pub name: &'a str,
    pub is_folder: bool,
    /// Self-link of the folder that will contain the new object
    pub parent_link: &'a Href,
    /// Where the already-uploaded content lives (files only)
    pub content_link: Option<&'a Href>,
}

/// Port trait for the remote metadata codec
///
/// Parsing is synchronous: bodies are fully received before they are handed
/// to the codec.
pub trait IRemoteFeed: Send + Sync {
    /// Media type of documents produced by [`encode_entry`](Self::encode_entry)
    fn content_type(&self) -> &str;

    /// Parse a listing page
    fn parse_page(&self, body: &[u8]) -> anyhow::Result<FeedPage>;

    /// Parse a single-entry document (creation or update response)
    fn parse_entry(&self, body: &[u8]) -> anyhow::Result<Entry>;

    /// Parse the receipt returned by a content upload
    fn parse_content_link(&self, body: &[u8]) -> anyhow::Result<Href>;

    /// Encode creation metadata
    fn encode_entry(&self, entry: &NewEntry<'_>) -> anyhow::Result<Vec<u8>>;
}
