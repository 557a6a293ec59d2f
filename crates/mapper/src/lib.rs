//! Attribute mapping from source items to cached items.
//!
//! A [`Mapper`] turns a [`SourceItem`] into a [`CachedItem`]: it renames
//! attributes, coerces raw values into the kinds declared by the cached
//! item's [`Schema`](recon_model::Schema), and hands values of *managed*
//! attributes to a [`ManagedAttribute`] transform (e.g. date parsing).
//!
//! # Coercion
//! | Field kind    | Raw value handling                                         |
//! |---------------|------------------------------------------------------------|
//! | managed       | empty → unset, otherwise whatever the transform returns    |
//! | `Integer`     | parsed as an integer, unset when parsing fails             |
//! | `Text`        | bytes decoded as UTF-8 (lossy), empty → unset              |
//! | `Raw`/`DateTime` | passed through unchanged                                |

mod coerce;
mod datetime;
pub mod error;
mod managed;
mod schema;
mod select;
mod simple;

pub use crate::datetime::{NormalizedDateTime, parse_datetime};
pub use crate::managed::{AttributeKey, ManagedAttribute, managed_attribute};
pub use crate::schema::SchemaMapper;
pub use crate::select::{select, select_for};
pub use crate::simple::SimpleMapper;
use crate::error::Result;
use recon_model::{CachedItem, SourceItem};
use std::sync::Arc;

pub type MapperHandle = Arc<dyn Mapper>;

/// Maps source items onto cached items of one schema.
pub trait Mapper: Send + Sync {
    /// Name of the identity attribute on produced cached items.
    fn key(&self) -> &str;

    /// A fresh cached item with every attribute unset.
    fn factory(&self) -> CachedItem;

    /// Map a source item onto a new cached item.
    ///
    /// Fails with [`MappingFailure`](error::ErrorKind::MappingFailure) when
    /// a required source attribute is absent.
    fn get(&self, item: &SourceItem) -> Result<CachedItem>;

    /// Returns `true` if [`get`](Self::get) would succeed for `item`.
    ///
    /// Never fails: any error from the attempted mapping is logged and
    /// reported as incompatibility.
    fn check(&self, item: &SourceItem) -> bool {
        match self.get(item) {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(error = ?e, mapping_failure = e.is_mapping_failure(), "Source item failed mapper check");
                false
            },
        }
    }
}
