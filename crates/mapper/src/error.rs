//! Mapper Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A mapper error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for mapper operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// A required attribute could not be resolved from the source item, or
    /// a cached attribute has no mapping at all.
    #[display("unable to map attribute: {_0}")]
    MappingFailure(#[error(not(source))] String),
    /// A managed attribute transform rejected the raw value.
    #[display("managed attribute transform failed for: {_0}")]
    Transform(#[error(not(source))] String),
    /// The value is not in any of the supported date/time layouts.
    #[display("unsupported date/time format: {_0}")]
    InvalidDateTime(#[error(not(source))] String),
    /// None of the candidate mappers accepted the source's first item.
    #[display("no compatible mapper for source")]
    NoCompatibleMapper,
    /// The source has no items to try mappers against.
    #[display("source has no items")]
    EmptySource,
    /// A managed attribute transform produces values of a different kind
    /// than the field it is mapped onto.
    #[display("managed attribute does not produce values of the field's kind: {_0}")]
    KindMismatch(#[error(not(source))] String),
    /// Reading from the source failed.
    Source,
    /// The mapper's schema is invalid.
    Schema,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Source)
    }

    /// Returns `true` if the error means the item is incompatible with the
    /// mapper, as opposed to the item being broken in some other way.
    pub fn is_mapping_failure(&self) -> bool {
        matches!(self, Self::MappingFailure(_))
    }
}
