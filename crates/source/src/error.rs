//! Source Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A source error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for source operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Reading the underlying data failed.
    #[display("I/O error: {}", _0.display())]
    Io(#[error(not(source))] PathBuf),
    /// An item failed validation (see the child error for the reason).
    #[display("invalid source item")]
    InvalidItem,
    /// Items in one source disagree about which attribute is the key.
    #[display("source items use different key attributes: {_0} and {_1}")]
    KeyMismatch(#[error(not(source))] String, #[error(not(source))] String),
    /// A delimited file has no readable header row.
    #[display("unreadable header row in {}", _0.display())]
    InvalidHeader(#[error(not(source))] PathBuf),
    /// A line of input could not be parsed into an item.
    #[display("unparseable entry on line {_0}")]
    InvalidLine(#[error(not(source))] usize),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}
