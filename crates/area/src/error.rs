//! Cache Area Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A cache area error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for cache area operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The backing store has not been initialized; call `initialize()`.
    #[display("cache area not initialized: {_0}")]
    NotInitialized(#[error(not(source))] String),
    /// The backing store failed. The store's own error is the child.
    #[display("backing store error")]
    Store,
    /// The mapper could not produce a cached item from a source item.
    #[display("mapping error")]
    Mapping,
    /// A mapped cached item has no identifier value.
    #[display("cached item has no identifier")]
    MissingId,
    /// Reading from the source failed.
    #[display("source error")]
    Source,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store | Self::Source)
    }
}
