//! Domain newtypes with validation
//!
//! This module provides strongly-typed wrappers for remote locators,
//! identifiers and content checksums. Each newtype ensures data validity at
//! construction time.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

// ============================================================================
// Href - remote locator
// ============================================================================

/// A remote locator (self-link, parent-link or content-link)
///
/// Hrefs are opaque to the tree: they are compared for equality and handed
/// to the transport unchanged. The only requirements are that they are
/// non-empty and contain no whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Href(String);

impl Href {
    /// Create a new Href
    ///
    /// # Errors
    /// Returns error if the link is empty or contains whitespace
    pub fn new(link: String) -> Result<Self, DomainError> {
        if link.is_empty() {
            return Err(DomainError::InvalidHref("Link cannot be empty".to_string()));
        }

        if link.chars().any(char::is_whitespace) {
            return Err(DomainError::InvalidHref(format!(
                "Link contains whitespace: {link}"
            )));
        }

        Ok(Self(link))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Derive the resource identifier carried by this link
    ///
    /// The identifier is the last non-empty `/`-separated segment, with any
    /// query string or fragment removed. `https://host/files/abc?alt=json`
    /// yields `abc`; a bare `id1` yields `id1`.
    ///
    /// # Errors
    /// Returns error if no non-empty segment remains
    pub fn resource_id(&self) -> Result<ResourceId, DomainError> {
        let without_query = self
            .0
            .split(['?', '#'])
            .next()
            .unwrap_or_default();

        let segment = without_query
            .rsplit('/')
            .find(|s| !s.is_empty())
            .ok_or_else(|| {
                DomainError::InvalidResourceId(format!("no identifier in link: {}", self.0))
            })?;

        ResourceId::new(segment.to_string())
    }

    /// Append a path segment, inserting exactly one `/`
    #[must_use]
    pub fn join(&self, segment: &str) -> Href {
        let base = self.0.trim_end_matches('/');
        let segment = segment.trim_start_matches('/');
        Href(format!("{base}/{segment}"))
    }
}

impl Display for Href {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Href {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for Href {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<Href> for String {
    fn from(href: Href) -> Self {
        href.0
    }
}

// ============================================================================
// ResourceId
// ============================================================================

/// Identity of a remote-known resource, derived from its self-link
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceId(String);

impl ResourceId {
    /// Create a new ResourceId
    ///
    /// # Errors
    /// Returns error if the ID is empty or contains a path separator
    pub fn new(id: String) -> Result<Self, DomainError> {
        if id.is_empty() {
            return Err(DomainError::InvalidResourceId(
                "Resource ID cannot be empty".to_string(),
            ));
        }

        if id.contains('/') || id.chars().any(char::is_whitespace) {
            return Err(DomainError::InvalidResourceId(format!(
                "Resource ID contains invalid characters: {id}"
            )));
        }

        Ok(Self(id))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ResourceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ResourceId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for ResourceId {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<ResourceId> for String {
    fn from(id: ResourceId) -> Self {
        id.0
    }
}

// ============================================================================
// Checksum
// ============================================================================

/// MD5 content checksum in lowercase hexadecimal
///
/// Remote feeds publish this digest for every file; the local filesystem
/// adapter computes the same digest so both sides can be compared without
/// transferring content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Checksum(String);

impl Checksum {
    /// Length of an MD5 digest rendered as hex
    const HEX_LEN: usize = 32;

    /// Create a new Checksum, normalizing to lowercase
    ///
    /// # Errors
    /// Returns error if the value is not 32 hexadecimal characters
    pub fn new(hex: String) -> Result<Self, DomainError> {
        if hex.len() != Self::HEX_LEN {
            return Err(DomainError::InvalidChecksum(format!(
                "expected {} hex characters, got {}",
                Self::HEX_LEN,
                hex.len()
            )));
        }

        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(DomainError::InvalidChecksum(format!(
                "not hexadecimal: {hex}"
            )));
        }

        Ok(Self(hex.to_ascii_lowercase()))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Checksum {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Checksum {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for Checksum {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<Checksum> for String {
    fn from(sum: Checksum) -> Self {
        sum.0
    }
}
