//! JSON feed codec
//!
//! [`JsonFeed`] implements the [`IRemoteFeed`] port for a Drive-style JSON
//! document format.
//!
//! ## Document shapes
//!
//! Listing page:
//!
//! ```json
//! {
//!   "items": [
//!     {
//!       "title": "report.txt",
//!       "mimeType": "text/plain",
//!       "selfLink": "https://drive.example.com/files/f1",
//!       "parents": [{ "selfLink": "https://drive.example.com/files/id1" }],
//!       "downloadUrl": "https://drive.example.com/content/f1",
//!       "md5Checksum": "5d41402abc4b2a76b9719d911017c592",
//!       "etag": "\"v3\"",
//!       "modifiedDate": "2026-01-15T10:00:00Z"
//!     }
//!   ],
//!   "nextLink": "https://drive.example.com/files?pageToken=2"
//! }
//! ```
//!
//! Folders carry the mime type [`FOLDER_MIME_TYPE`]. Items whose
//! `labels.trashed` flag is set are dropped from listings. Upload receipts
//! are `{"downloadUrl": "..."}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use drivetree_core::domain::entry::{Entry, EntryKind};
use drivetree_core::domain::newtypes::{Checksum, Href};
use drivetree_core::ports::feed::{FeedPage, IRemoteFeed, NewEntry};

use crate::HttpError;

/// Mime type that marks an item as a folder
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// Mime type sent when creating file metadata
const FILE_MIME_TYPE: &str = "application/octet-stream";

// ============================================================================
// Wire types (JSON deserialization)
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonPage {
    #[serde(default)]
    items: Vec<JsonItem>,
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonItem {
    title: String,
    mime_type: String,
    self_link: String,
    #[serde(default)]
    parents: Vec<JsonParent>,
    download_url: Option<String>,
    md5_checksum: Option<String>,
    etag: Option<String>,
    modified_date: Option<DateTime<Utc>>,
    labels: Option<JsonLabels>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonParent {
    self_link: String,
}

#[derive(Debug, Deserialize)]
struct JsonLabels {
    #[serde(default)]
    trashed: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonUploadReceipt {
    download_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonNewItem<'a> {
    title: &'a str,
    mime_type: &'a str,
    parents: [JsonParentRef<'a>; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    download_url: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonParentRef<'a> {
    self_link: &'a str,
}

impl JsonItem {
    fn is_trashed(&self) -> bool {
        self.labels.as_ref().is_some_and(|l| l.trashed)
    }

    /// Converts the wire item into a domain [`Entry`]
    fn into_entry(self) -> Result<Entry, HttpError> {
        let invalid = |e: drivetree_core::domain::DomainError| {
            HttpError::InvalidResponse(format!("item '{}': {e}", self.title))
        };

        let self_link = Href::new(self.self_link.clone()).map_err(invalid)?;
        let parent_link = self
            .parents
            .first()
            .map(|p| Href::new(p.self_link.clone()))
            .transpose()
            .map_err(invalid)?;

        let kind = if self.mime_type == FOLDER_MIME_TYPE {
            EntryKind::Folder
        } else {
            EntryKind::File {
                content_link: self
                    .download_url
                    .clone()
                    .map(Href::new)
                    .transpose()
                    .map_err(invalid)?,
                checksum: self
                    .md5_checksum
                    .clone()
                    .map(Checksum::new)
                    .transpose()
                    .map_err(invalid)?,
            }
        };

        let mut entry =
            Entry::remote(self.title.clone(), kind, self_link, parent_link).map_err(invalid)?;
        if let Some(etag) = self.etag {
            entry = entry.with_revision(etag);
        }
        if let Some(modified) = self.modified_date {
            entry = entry.with_modified(modified);
        }
        Ok(entry)
    }
}

// ============================================================================
// JsonFeed
// ============================================================================

/// JSON implementation of [`IRemoteFeed`]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFeed;

impl JsonFeed {
    pub fn new() -> Self {
        Self
    }
}

fn decode<'de, T: Deserialize<'de>>(body: &'de [u8], what: &str) -> Result<T, HttpError> {
    serde_json::from_slice(body)
        .map_err(|e| HttpError::InvalidResponse(format!("malformed {what}: {e}")))
}

impl IRemoteFeed for JsonFeed {
    fn content_type(&self) -> &str {
        "application/json"
    }

    fn parse_page(&self, body: &[u8]) -> anyhow::Result<FeedPage> {
        let page: JsonPage = decode(body, "listing page")?;

        let mut entries = Vec::with_capacity(page.items.len());
        for item in page.items {
            if item.is_trashed() {
                debug!(title = %item.title, "Skipping trashed item");
                continue;
            }
            entries.push(item.into_entry()?);
        }

        let next_link = page.next_link.map(Href::new).transpose()?;

        debug!(
            entries = entries.len(),
            has_next = next_link.is_some(),
            "Parsed listing page"
        );

        Ok(FeedPage { entries, next_link })
    }

    fn parse_entry(&self, body: &[u8]) -> anyhow::Result<Entry> {
        let item: JsonItem = decode(body, "entry")?;
        Ok(item.into_entry()?)
    }

    fn parse_content_link(&self, body: &[u8]) -> anyhow::Result<Href> {
        let receipt: JsonUploadReceipt = decode(body, "upload receipt")?;
        Ok(Href::new(receipt.download_url)?)
    }

    fn encode_entry(&self, entry: &NewEntry<'_>) -> anyhow::Result<Vec<u8>> {
        let item = JsonNewItem {
            title: entry.name,
            mime_type: if entry.is_folder {
                FOLDER_MIME_TYPE
            } else {
                FILE_MIME_TYPE
            },
            parents: [JsonParentRef {
                self_link: entry.parent_link.as_str(),
            }],
            download_url: entry.content_link.map(Href::as_str),
        };
        Ok(serde_json::to_vec(&item)?)
    }
}
