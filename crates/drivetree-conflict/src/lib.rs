//! drivetree Conflict - resolution policy for files changed on both sides
//!
//! Provides:
//! - Glob-rule policy evaluation, first match wins
//! - Unique conflict-copy names for keep-both resolution
//!
//! ## Modules
//!
//! - [`policy`] - [`PolicyEngine`] mapping relative paths to a [`Resolution`]
//! - [`namer`] - [`ConflictNamer`] producing `name (conflicted copy ...)` names
//!
//! [`Resolution`]: drivetree_core::domain::Resolution

pub mod error;
pub mod namer;
pub mod policy;

pub use error::ConflictError;
pub use namer::ConflictNamer;
pub use policy::PolicyEngine;
