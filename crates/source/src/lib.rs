//! Sources of cachable items.
//!
//! A [`Source`] produces a finite sequence of [`SourceItem`]s. Every call to
//! [`items()`](Source::items) starts a fresh traversal, so a source can be
//! imported into a cache area any number of times.

mod delimited;
pub mod error;
mod files;
mod iterable;
mod jsonl;

pub use crate::delimited::CsvSource;
pub use crate::iterable::IterableSource;
pub use crate::jsonl::JsonLinesSource;
use crate::error::Result;
use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use recon_model::{SourceItem, Value};
use std::pin::Pin;
use std::sync::Arc;

pub type ItemStream<'a> = Pin<Box<dyn Stream<Item = Result<SourceItem>> + Send + 'a>>;
pub type SourceHandle = Arc<dyn Source>;

/// A finite, restartable collection of source items.
///
/// # Examples
///
/// ```
/// use futures::TryStreamExt;
/// use recon_model::SourceItem;
/// use recon_source::{IterableSource, Source};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> recon_source::error::Result<()> {
/// let source = IterableSource::new([
///     SourceItem::new("id", [("id", "1"), ("name", "Pooh")]),
///     SourceItem::new("id", [("id", "2"), ("name", "Piglet")]),
/// ])?;
/// let items: Vec<_> = source.items().try_collect().await?;
/// assert_eq!(items.len(), 2);
/// assert!(source.get_by_id("2").await?.is_some());
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait Source: Send + Sync {
    /// Name of the attribute that uniquely identifies each item.
    fn key(&self) -> &str;

    /// Stream every item in the source's natural order, starting over on
    /// each call.
    fn items(&self) -> ItemStream<'_>;

    /// Find the item whose identifier matches `id`.
    ///
    /// Default implementation walks [`items()`](Self::items) until a match
    /// is found.
    async fn get_by_id(&self, id: &str) -> Result<Option<SourceItem>> {
        let mut items = self.items();
        while let Some(item) = items.try_next().await? {
            if item.id().and_then(Value::as_id).as_deref() == Some(id) {
                return Ok(Some(item));
            }
        }
        Ok(None)
    }

    /// The first item of a fresh traversal, if any.
    async fn first(&self) -> Result<Option<SourceItem>> {
        self.items().try_next().await
    }
}
