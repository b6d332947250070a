//! Domain error types
//!
//! This module defines error types raised while constructing domain values:
//! malformed names, remote locators, identifiers and checksums.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Entry name is not a usable single path segment
    #[error("Invalid name: {0}")]
    InvalidName(String),

    /// Remote locator is empty or malformed
    #[error("Invalid link: {0}")]
    InvalidHref(String),

    /// Resource identifier could not be derived or is malformed
    #[error("Invalid resource ID: {0}")]
    InvalidResourceId(String),

    /// Invalid checksum format (expected hex MD5)
    #[error("Invalid checksum format: {0}")]
    InvalidChecksum(String),

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}
