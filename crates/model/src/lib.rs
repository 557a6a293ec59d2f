//! Item model for cache reconciliation.
//!
//! Two kinds of item flow through a cache area:
//! - **Source items**: raw attribute maps read from some external source,
//!   along with the name of the attribute holding their unique identifier.
//! - **Cached items**: typed attribute values laid out by a [`Schema`]. Two
//!   cached items are equal when every *checked* attribute of the schema
//!   holds an equal value, and that equality is the only signal used to
//!   decide whether a cache entry is dirty.
//!
//! An [`AgeableItem`] adds a birth and an expiration to a cached item.

mod ageable;
mod cached;
pub mod error;
mod normalize;
mod schema;
mod source;
mod value;

pub use crate::ageable::{AgeableItem, BIRTH, Clock, EXPIRATION, Lifetime, NEVER, SystemClock};
pub use crate::cached::CachedItem;
pub use crate::normalize::normalize_name;
pub use crate::schema::{Field, FieldKind, RESERVED_PREFIX, Schema, SchemaBuilder, SchemaRegistry};
pub use crate::source::SourceItem;
pub use crate::value::{DATETIME_FORMAT, Value};
