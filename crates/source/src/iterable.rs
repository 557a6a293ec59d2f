//! In-memory source backed by a finite sequence of items.

use crate::error::{ErrorKind, Result};
use crate::{ItemStream, Source};
use async_trait::async_trait;
use exn::ResultExt;
use recon_model::{SourceItem, Value};
use std::collections::HashMap;

/// A source over items already held in memory.
///
/// This is also how a bare sequence of items is turned into a [`Source`]
/// wherever one is required. Items are validated on construction and indexed
/// by identifier; when an identifier repeats, lookups resolve to its last
/// occurrence while [`items()`](Source::items) still yields every entry.
#[derive(Debug, Clone, Default)]
pub struct IterableSource {
    key: String,
    items: Vec<SourceItem>,
    index: HashMap<String, usize>,
}

impl IterableSource {
    /// Build a source from items, taking the key attribute from the first.
    ///
    /// Fails if any item is invalid or uses a different key attribute.
    pub fn new(items: impl IntoIterator<Item = SourceItem>) -> Result<Self> {
        let mut source = Self::default();
        for item in items {
            item.validate().or_raise(|| ErrorKind::InvalidItem)?;
            if source.items.is_empty() {
                source.key = item.key().to_string();
            } else if source.key != item.key() {
                exn::bail!(ErrorKind::KeyMismatch(source.key, item.key().to_string()));
            }
            if let Some(id) = item.id().and_then(Value::as_id) {
                source.index.insert(id, source.items.len());
            }
            source.items.push(item);
        }
        Ok(source)
    }

    /// An empty source whose items would be keyed by `key`.
    pub fn empty(key: impl Into<String>) -> Self {
        Self { key: key.into(), ..Self::default() }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[async_trait]
impl Source for IterableSource {
    fn key(&self) -> &str {
        &self.key
    }

    fn items(&self) -> ItemStream<'_> {
        Box::pin(futures::stream::iter(self.items.iter().cloned().map(Ok)))
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<SourceItem>> {
        Ok(self.index.get(id).map(|position| self.items[*position].clone()))
    }

    async fn first(&self) -> Result<Option<SourceItem>> {
        Ok(self.items.first().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    fn item(id: &str, name: &str) -> SourceItem {
        SourceItem::new("id", [("id", id), ("name", name)])
    }

    #[tokio::test]
    async fn test_items_restart() {
        let source = IterableSource::new([item("1", "a"), item("2", "b")]).unwrap();
        let first: Vec<_> = source.items().try_collect().await.unwrap();
        let second: Vec<_> = source.items().try_collect().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
        assert_eq!(source.key(), "id");
    }

    #[tokio::test]
    async fn test_get_by_id_and_first() {
        let source = IterableSource::new([item("1", "a"), item("2", "b")]).unwrap();
        assert_eq!(source.get_by_id("2").await.unwrap(), Some(item("2", "b")));
        assert_eq!(source.get_by_id("3").await.unwrap(), None);
        assert_eq!(source.first().await.unwrap(), Some(item("1", "a")));
    }

    #[tokio::test]
    async fn test_repeated_id_resolves_to_last() {
        let source = IterableSource::new([item("1", "a"), item("1", "b")]).unwrap();
        assert_eq!(source.len(), 2);
        assert_eq!(source.get_by_id("1").await.unwrap(), Some(item("1", "b")));
    }

    #[tokio::test]
    async fn test_empty() {
        let source = IterableSource::empty("id");
        assert!(source.is_empty());
        assert_eq!(source.key(), "id");
        assert_eq!(source.first().await.unwrap(), None);
    }

    #[test]
    fn test_invalid_item_rejected() {
        let err = IterableSource::new([SourceItem::new("id", [("name", "a")])]).unwrap_err();
        assert_eq!(*err, ErrorKind::InvalidItem);
    }

    #[test]
    fn test_key_mismatch_rejected() {
        let other = SourceItem::new("uuid", [("uuid", "2")]);
        let err = IterableSource::new([item("1", "a"), other]).unwrap_err();
        assert_eq!(*err, ErrorKind::KeyMismatch("id".to_string(), "uuid".to_string()));
    }
}
