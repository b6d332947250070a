//! Error types for the conflict policy

use thiserror::Error;

/// Errors raised while validating conflict rules
#[derive(Debug, Error)]
pub enum ConflictError {
    /// Invalid glob pattern or strategy in a conflict rule
    #[error("invalid glob pattern: {pattern}: {reason}")]
    InvalidPattern { pattern: String, reason: String },
}
