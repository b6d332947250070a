//! Domain entities and value types
//!
//! This module contains the core domain types for drivetree:
//! - Newtypes for validated remote locators, identifiers and checksums
//! - The `Entry` snapshot describing one remote or local item
//! - Conflict resolution strategies
//! - Domain-specific error types

pub mod conflict;
pub mod entry;
pub mod errors;
pub mod newtypes;

// Re-export commonly used types
pub use conflict::Resolution;
pub use entry::{Entry, EntryKind};
pub use errors::DomainError;
pub use newtypes::*;
