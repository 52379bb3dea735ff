//! Identifier parsing errors.

use thiserror::Error;

/// Failure to parse one of the strongly-typed identifiers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    /// The text was not a valid UUID.
    #[error("invalid {kind}: {reason}")]
    Malformed { kind: &'static str, reason: String },

    /// The text was not a positive sequence number.
    #[error("invalid {kind}: expected a positive integer, got {value:?}")]
    NotASequence { kind: &'static str, value: String },
}
