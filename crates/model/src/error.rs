//! Item Model Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// An item model error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for item model operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The source item has no attribute named after its key.
    #[display("missing key attribute: {_0}")]
    MissingKey(#[error(not(source))] String),
    /// The source item's key attribute holds an empty value.
    #[display("empty key attribute: {_0}")]
    EmptyKey(#[error(not(source))] String),
    /// The attribute is not declared by the schema.
    #[display("unknown attribute: {_0}")]
    UnknownAttribute(#[error(not(source))] String),
    /// The attribute was declared more than once.
    #[display("duplicate attribute: {_0}")]
    DuplicateAttribute(#[error(not(source))] String),
    /// A stored value could not be decoded into the attribute's kind.
    #[display("invalid value for attribute: {_0}")]
    InvalidValue(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        // Malformed items stay malformed.
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_display() {
        assert_eq!(ErrorKind::MissingKey("id".to_string()).to_string(), "missing key attribute: id");
        assert_eq!(ErrorKind::EmptyKey("id".to_string()).to_string(), "empty key attribute: id");
        assert!(!ErrorKind::UnknownAttribute("name".to_string()).is_retryable());
    }
}
