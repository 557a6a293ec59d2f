//! Backing Store Error Types

use derive_more::{Display, Error};

/// A backing store error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for backing store operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Operation attempted before `initialize()`.
    #[display("store not initialized: {_0}")]
    NotInitialized(#[error(not(source))] String),
    /// No entry exists for the identifier.
    #[display("entry not found: {_0}")]
    NotFound(#[error(not(source))] String),
    /// An entry already exists for the identifier.
    #[display("entry already exists: {_0}")]
    AlreadyExists(#[error(not(source))] String),
    /// The item has no identifier value to store it under.
    #[display("item has no identifier")]
    MissingId,
    #[display("database error")]
    Database,
    #[display("database migration error")]
    Migration,
    /// Network-related error (remote stores).
    #[display("network error: {_0}")]
    Network(#[error(not(source))] String),
    /// Stored data could not be decoded back into an item.
    #[display("invalid stored data: {_0}")]
    InvalidData(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Database | Self::Network(_))
    }
}
