//! Entry - metadata snapshot of one remote or local item
//!
//! An [`Entry`] is produced either by the remote feed parser or synthesized
//! from a local filesystem observation. Entries never change in place: a
//! fresher remote snapshot replaces the whole value.
//!
//! ## Kind
//!
//! The file/folder distinction is a tagged variant. Only files carry a
//! content link and a checksum, so code that needs them must match on
//! [`EntryKind::File`] and handle the folder case explicitly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::{Checksum, Href, ResourceId};

/// Kind of an entry together with its kind-specific fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntryKind {
    /// A folder; its children live in the resource tree
    Folder,
    /// A regular file
    File {
        /// Download/upload endpoint. Absent until the content exists remotely.
        content_link: Option<Href>,
        /// Content digest, if the source provided or computed one
        checksum: Option<Checksum>,
    },
}

impl EntryKind {
    /// Returns true for [`EntryKind::Folder`]
    pub fn is_folder(&self) -> bool {
        matches!(self, EntryKind::Folder)
    }

    /// Returns the kind name (`folder` / `file`)
    pub fn name(&self) -> &'static str {
        match self {
            EntryKind::Folder => "folder",
            EntryKind::File { .. } => "file",
        }
    }
}

/// Immutable snapshot of one item's name, kind and links
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    name: String,
    kind: EntryKind,
    self_link: Option<Href>,
    parent_link: Option<Href>,
    revision: Option<String>,
    modified: Option<DateTime<Utc>>,
}

impl Entry {
    /// Build an entry from remote feed data
    ///
    /// # Errors
    /// Returns [`DomainError::InvalidName`] if `name` is not a single path segment
    pub fn remote(
        name: impl Into<String>,
        kind: EntryKind,
        self_link: Href,
        parent_link: Option<Href>,
    ) -> Result<Self, DomainError> {
        let name = validate_name(name.into())?;
        Ok(Self {
            name,
            kind,
            self_link: Some(self_link),
            parent_link,
            revision: None,
            modified: None,
        })
    }

    /// Synthesize a folder entry from a local observation
    ///
    /// # Errors
    /// Returns [`DomainError::InvalidName`] if `name` is not a single path segment
    pub fn local_folder(name: impl Into<String>) -> Result<Self, DomainError> {
        Self::local(name.into(), EntryKind::Folder)
    }

    /// Synthesize a file entry from a local observation
    ///
    /// # Errors
    /// Returns [`DomainError::InvalidName`] if `name` is not a single path segment
    pub fn local_file(
        name: impl Into<String>,
        checksum: Option<Checksum>,
    ) -> Result<Self, DomainError> {
        Self::local(
            name.into(),
            EntryKind::File {
                content_link: None,
                checksum,
            },
        )
    }

    fn local(name: String, kind: EntryKind) -> Result<Self, DomainError> {
        Ok(Self {
            name: validate_name(name)?,
            kind,
            self_link: None,
            parent_link: None,
            revision: None,
            modified: None,
        })
    }

    /// Attach a revision marker (etag or similar)
    #[must_use]
    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = Some(revision.into());
        self
    }

    /// Attach a modification timestamp
    #[must_use]
    pub fn with_modified(mut self, modified: DateTime<Utc>) -> Self {
        self.modified = Some(modified);
        self
    }

    /// Same entry under a different name
    ///
    /// # Errors
    /// Returns [`DomainError::InvalidName`] if `name` is not a single path segment
    pub fn renamed(mut self, name: impl Into<String>) -> Result<Self, DomainError> {
        self.name = validate_name(name.into())?;
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &EntryKind {
        &self.kind
    }

    pub fn is_folder(&self) -> bool {
        self.kind.is_folder()
    }

    pub fn self_link(&self) -> Option<&Href> {
        self.self_link.as_ref()
    }

    pub fn parent_link(&self) -> Option<&Href> {
        self.parent_link.as_ref()
    }

    /// Content link; always `None` for folders
    pub fn content_link(&self) -> Option<&Href> {
        match &self.kind {
            EntryKind::File { content_link, .. } => content_link.as_ref(),
            EntryKind::Folder => None,
        }
    }

    /// Content checksum; always `None` for folders
    pub fn checksum(&self) -> Option<&Checksum> {
        match &self.kind {
            EntryKind::File { checksum, .. } => checksum.as_ref(),
            EntryKind::Folder => None,
        }
    }

    pub fn revision(&self) -> Option<&str> {
        self.revision.as_deref()
    }

    pub fn modified(&self) -> Option<DateTime<Utc>> {
        self.modified
    }

    /// Returns true once the entry carries a remote self-link
    pub fn is_remote(&self) -> bool {
        self.self_link.is_some()
    }

    /// Identity derived from the self-link, if any
    pub fn resource_id(&self) -> Option<ResourceId> {
        self.self_link
            .as_ref()
            .and_then(|link| link.resource_id().ok())
    }
}

/// Validate that `name` is a single, non-special path segment
pub fn validate_name(name: String) -> Result<String, DomainError> {
    if name.is_empty() || name == "." || name == ".." {
        return Err(DomainError::InvalidName(name));
    }
    if name.contains('/') || name.contains('\0') {
        return Err(DomainError::InvalidName(name));
    }
    Ok(name)
}
