use crate::error::{ErrorKind, Result};
use crate::event::{Event, EventKind, Notifier};
use crate::store::StoreHandle;
use crate::store::error::{Error as StoreError, ErrorKind as StoreErrorKind};
use exn::{OptionExt, ResultExt};
use futures::TryStreamExt;
use recon_mapper::MapperHandle;
use recon_model::{CachedItem, SourceItem};
use recon_source::{IterableSource, Source};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::instrument;

/// Outcome of a [`CacheArea::cache`] call that wrote something.
#[derive(Debug, Clone, PartialEq)]
pub enum Cached {
    Created(CachedItem),
    Modified(CachedItem),
}

impl Cached {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Created(_) => EventKind::Created,
            Self::Modified(_) => EventKind::Modified,
        }
    }

    pub fn item(&self) -> &CachedItem {
        match self {
            Self::Created(item) | Self::Modified(item) => item,
        }
    }

    pub fn into_item(self) -> CachedItem {
        match self {
            Self::Created(item) | Self::Modified(item) => item,
        }
    }
}

/// Counts reported by [`CacheArea::trim`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Trim {
    /// Items created or modified by the import pass.
    pub updated: u64,
    /// Stale entries deleted afterwards.
    pub deleted: u64,
}

/// An area where cached items are stored persistently.
///
/// The area holds no state of its own beyond its collaborators: every
/// operation reads and writes the backing store directly. Dirty detection
/// and the following write are not atomic as a pair, so callers caching the
/// same identifier from several tasks must serialize those calls.
pub struct CacheArea {
    name: String,
    mapper: MapperHandle,
    store: StoreHandle,
    notifier: Option<Arc<dyn Notifier>>,
}

impl CacheArea {
    pub fn new(name: impl Into<String>, mapper: MapperHandle, store: StoreHandle) -> Self {
        Self {
            name: name.into(),
            mapper,
            store,
            notifier: None,
        }
    }

    pub fn with_notifier(mut self, notifier: impl Notifier + 'static) -> Self {
        self.notifier = Some(Arc::new(notifier));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mapper(&self) -> &MapperHandle {
        &self.mapper
    }

    pub fn store(&self) -> &StoreHandle {
        &self.store
    }

    fn raise_store(&self, err: StoreError) -> crate::error::Error {
        let kind = match &*err {
            StoreErrorKind::NotInitialized(_) => ErrorKind::NotInitialized(self.name.clone()),
            _ => ErrorKind::Store,
        };
        err.raise(kind)
    }

    fn map(&self, item: &SourceItem) -> Result<(CachedItem, String)> {
        let cached = self.mapper.get(item).or_raise(|| ErrorKind::Mapping)?;
        let id = cached.id().ok_or_raise(|| ErrorKind::MissingId)?;
        Ok((cached, id))
    }

    /// The freshly mapped item, its identifier, and the stored copy.
    async fn lookup(&self, item: &SourceItem) -> Result<(CachedItem, String, Option<CachedItem>)> {
        let (fresh, id) = self.map(item)?;
        let stored = self.store.get(&id).await.map_err(|e| self.raise_store(e))?;
        Ok((fresh, id, stored))
    }

    /// The stored cached item for a source item, or `None` if it has not
    /// been cached.
    #[instrument(skip_all, fields(area = %self.name))]
    pub async fn get(&self, item: &SourceItem) -> Result<Option<CachedItem>> {
        let (_, _, stored) = self.lookup(item).await?;
        Ok(stored)
    }

    /// `true` if the source item is not cached, or its cached copy differs
    /// from what the mapper produces now.
    #[instrument(skip_all, fields(area = %self.name))]
    pub async fn is_dirty(&self, item: &SourceItem) -> Result<bool> {
        let (fresh, _, stored) = self.lookup(item).await?;
        Ok(stored.is_none_or(|stored| stored != fresh))
    }

    /// Bring the store in line with a single source item.
    ///
    /// Returns `None` when the stored copy was already up to date; nothing
    /// is written and no event is emitted in that case.
    #[instrument(skip_all, fields(area = %self.name))]
    pub async fn cache(&self, item: &SourceItem) -> Result<Option<Cached>> {
        let (_, cached) = self.cache_item(item).await?;
        Ok(cached)
    }

    async fn cache_item(&self, item: &SourceItem) -> Result<(String, Option<Cached>)> {
        let (fresh, id, stored) = self.lookup(item).await?;
        let cached = match stored {
            None => {
                self.store.insert(&fresh).await.map_err(|e| self.raise_store(e))?;
                tracing::debug!(id = %id, "Cached new item");
                Cached::Created(fresh)
            },
            Some(stored) if stored == fresh => return Ok((id, None)),
            Some(_) => {
                self.store.update(&fresh).await.map_err(|e| self.raise_store(e))?;
                tracing::debug!(id = %id, "Cached modified item");
                Cached::Modified(fresh)
            },
        };
        if let Some(notifier) = &self.notifier {
            notifier.notify(&Event {
                kind: cached.kind(),
                item: cached.item(),
                area: self,
            });
        }
        Ok((id, Some(cached)))
    }

    /// Cache every item of the source, in order, returning how many were
    /// created or modified.
    #[instrument(skip_all, fields(area = %self.name))]
    pub async fn import_source<S>(&self, source: &S) -> Result<u64>
    where
        S: Source + ?Sized,
    {
        self.import(source, None).await
    }

    async fn import<S>(&self, source: &S, mut seen: Option<&mut HashSet<String>>) -> Result<u64>
    where
        S: Source + ?Sized,
    {
        let mut count = 0;
        let mut items = source.items();
        while let Some(item) = items.try_next().await.or_raise(|| ErrorKind::Source)? {
            let (id, cached) = self.cache_item(&item).await?;
            if let Some(seen) = seen.as_deref_mut() {
                seen.insert(id);
            }
            if cached.is_some() {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Import the source, then delete every stored entry the import did not
    /// see.
    ///
    /// Stale entries are deleted one at a time in identifier order. The
    /// first failed deletion aborts the rest and is returned; entries
    /// deleted before it stay deleted.
    #[instrument(skip_all, fields(area = %self.name))]
    pub async fn trim<S>(&self, source: &S) -> Result<Trim>
    where
        S: Source + ?Sized,
    {
        let mut seen = HashSet::new();
        let updated = self.import(source, Some(&mut seen)).await?;
        let stored = self.store.ids().await.map_err(|e| self.raise_store(e))?;
        let mut stale: Vec<&String> = stored.difference(&seen).collect();
        stale.sort();
        for id in &stale {
            self.store.delete(id).await.map_err(|e| self.raise_store(e))?;
            tracing::debug!(id = %id, "Deleted stale item");
        }
        let deleted = stale.len() as u64;
        tracing::info!(updated, deleted, "Trimmed cache area");
        Ok(Trim { updated, deleted })
    }

    /// [`trim`](Self::trim) against a bare sequence of source items.
    pub async fn trim_items(&self, items: impl IntoIterator<Item = SourceItem>) -> Result<Trim> {
        let source = IterableSource::new(items).or_raise(|| ErrorKind::Source)?;
        self.trim(&source).await
    }

    /// Delete every entry, then initialize again. Safe on an empty or
    /// uninitialized area.
    #[instrument(skip_all, fields(area = %self.name))]
    pub async fn reset(&self) -> Result<()> {
        self.store.clear().await.map_err(|e| self.raise_store(e))?;
        tracing::info!("Cleared cache area");
        self.initialize().await
    }

    /// Idempotent setup of the backing store.
    pub async fn initialize(&self) -> Result<()> {
        self.store.initialize().await.map_err(|e| self.raise_store(e))
    }

    pub async fn commit(&self) -> Result<()> {
        self.store.commit().await.map_err(|e| self.raise_store(e))
    }

    pub async fn rollback(&self) -> Result<()> {
        self.store.rollback().await.map_err(|e| self.raise_store(e))
    }
}

impl fmt::Debug for CacheArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheArea")
            .field("name", &self.name)
            .field("store", &self.store.name())
            .field("key", &self.mapper.key())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;
    use crate::store::error::Result as StoreResult;
    use crate::store::{MemoryStore, ReadOnlyStore, SqliteStore, Store};
    use async_trait::async_trait;
    use recon_mapper::{AttributeKey, NormalizedDateTime, SchemaMapper};
    use recon_model::{FieldKind, Schema, Value};
    use std::sync::Mutex;

    fn schema() -> Arc<Schema> {
        Arc::new(
            Schema::builder("person", "id")
                .field("id", FieldKind::Text)
                .field("name", FieldKind::Text)
                .build()
                .unwrap(),
        )
    }

    fn mapper() -> MapperHandle {
        Arc::new(SchemaMapper::identity(schema()))
    }

    fn item(id: &str, name: &str) -> SourceItem {
        SourceItem::new("id", [("id", id), ("name", name)])
    }

    async fn area_with(store: StoreHandle) -> CacheArea {
        let area = CacheArea::new("people", mapper(), store);
        area.initialize().await.unwrap();
        area
    }

    async fn area() -> CacheArea {
        area_with(Arc::new(MemoryStore::new("people"))).await
    }

    /// Wraps a memory store, failing inserts and deletions of chosen
    /// identifiers.
    struct Failing {
        inner: MemoryStore,
        insert: Option<&'static str>,
        delete: Option<&'static str>,
        deletions: Mutex<Vec<String>>,
    }

    impl Failing {
        fn new(insert: Option<&'static str>, delete: Option<&'static str>) -> Self {
            Self {
                inner: MemoryStore::new("people"),
                insert,
                delete,
                deletions: Mutex::default(),
            }
        }
    }

    #[async_trait]
    impl Store for Failing {
        fn name(&self) -> &str {
            self.inner.name()
        }
        async fn initialize(&self) -> StoreResult<()> {
            self.inner.initialize().await
        }
        async fn get(&self, id: &str) -> StoreResult<Option<CachedItem>> {
            self.inner.get(id).await
        }
        async fn insert(&self, item: &CachedItem) -> StoreResult<()> {
            if item.id().as_deref() == self.insert {
                exn::bail!(StoreErrorKind::Network(format!("refused to insert {:?}", item.id())));
            }
            self.inner.insert(item).await
        }
        async fn update(&self, item: &CachedItem) -> StoreResult<()> {
            self.inner.update(item).await
        }
        async fn delete(&self, id: &str) -> StoreResult<()> {
            self.deletions.lock().unwrap().push(id.to_string());
            if Some(id) == self.delete {
                exn::bail!(StoreErrorKind::Network(format!("refused to delete {id}")));
            }
            self.inner.delete(id).await
        }
        async fn ids(&self) -> StoreResult<HashSet<String>> {
            self.inner.ids().await
        }
        async fn clear(&self) -> StoreResult<()> {
            self.inner.clear().await
        }
    }

    #[tokio::test]
    async fn test_create_noop_modify_scenario() {
        let area = area().await;
        let first = area.cache(&item("123", "a name")).await.unwrap().unwrap();
        assert_eq!(first.kind(), EventKind::Created);
        assert!(area.cache(&item("123", "a name")).await.unwrap().is_none());

        let second = area.cache(&item("123", "another name")).await.unwrap().unwrap();
        assert_eq!(second.kind(), EventKind::Modified);
        assert_eq!(second.item().id().as_deref(), Some("123"));
        assert_ne!(second.item(), first.item());
        assert_eq!(second.item().get("name"), Some(&Value::from("another name")));
    }

    #[tokio::test]
    async fn test_get_returns_stored_copy() {
        let area = area().await;
        assert!(area.get(&item("1", "a")).await.unwrap().is_none());
        area.cache(&item("1", "a")).await.unwrap();
        let stored = area.get(&item("1", "b")).await.unwrap().unwrap();
        assert_eq!(stored.get("name"), Some(&Value::from("a")));
    }

    #[tokio::test]
    async fn test_is_dirty() {
        let area = area().await;
        assert!(area.is_dirty(&item("1", "a")).await.unwrap());
        area.cache(&item("1", "a")).await.unwrap();
        assert!(!area.is_dirty(&item("1", "a")).await.unwrap());
        assert!(area.is_dirty(&item("1", "b")).await.unwrap());
    }

    #[tokio::test]
    async fn test_import_source_counts_new_and_changed() {
        let area = area().await;
        area.cache(&item("1", "a")).await.unwrap();
        area.cache(&item("2", "b")).await.unwrap();
        let source = IterableSource::new([item("1", "a"), item("2", "changed"), item("3", "c"), item("4", "d")]).unwrap();
        assert_eq!(area.import_source(&source).await.unwrap(), 3);
        assert_eq!(area.import_source(&source).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_import_source_repeated_id_later_wins() {
        let area = area().await;
        let source = IterableSource::new([item("1", "a"), item("1", "b")]).unwrap();
        assert_eq!(area.import_source(&source).await.unwrap(), 2);
        let stored = area.get(&item("1", "")).await.unwrap().unwrap();
        assert_eq!(stored.get("name"), Some(&Value::from("b")));
    }

    #[tokio::test]
    async fn test_trim() {
        let area = area().await;
        for (id, name) in [("a", "1"), ("b", "2"), ("c", "3")] {
            area.cache(&item(id, name)).await.unwrap();
        }
        let trim = area
            .trim_items([item("b", "2"), item("c", "changed"), item("d", "4")])
            .await
            .unwrap();
        assert_eq!(trim, Trim { updated: 2, deleted: 1 });
        assert!(area.is_dirty(&item("a", "1")).await.unwrap());
        assert!(area.get(&item("a", "1")).await.unwrap().is_none());
        let ids = area.store().ids().await.unwrap();
        assert_eq!(ids, HashSet::from(["b".to_string(), "c".to_string(), "d".to_string()]));
    }

    #[tokio::test]
    async fn test_trim_with_source() {
        let area = area().await;
        area.cache(&item("a", "1")).await.unwrap();
        let trim = area.trim(&IterableSource::empty("id")).await.unwrap();
        assert_eq!(trim, Trim { updated: 0, deleted: 1 });
    }

    #[tokio::test]
    async fn test_trim_stops_at_first_failed_delete() {
        let store = Arc::new(Failing::new(None, Some("b")));
        let area = area_with(store.clone()).await;
        for id in ["a", "b", "c", "d"] {
            area.cache(&item(id, id)).await.unwrap();
        }
        let err = area.trim_items([]).await.unwrap_err();
        assert_eq!(*err, ErrorKind::Store);
        // "a" sorts before the failure and is gone; everything after remains.
        let ids = store.ids().await.unwrap();
        assert_eq!(ids, HashSet::from(["b".to_string(), "c".to_string(), "d".to_string()]));
    }

    #[tokio::test]
    async fn test_import_source_stops_at_first_failed_write() {
        let store = Arc::new(Failing::new(Some("b"), None));
        let area = area_with(store.clone()).await;
        let source = IterableSource::new([item("a", "1"), item("b", "2"), item("c", "3")]).unwrap();
        let err = area.import_source(&source).await.unwrap_err();
        assert_eq!(*err, ErrorKind::Store);
        assert_eq!(store.ids().await.unwrap(), HashSet::from(["a".to_string()]));
    }

    #[tokio::test]
    async fn test_trim_write_failure_skips_deletions() {
        let store = Arc::new(Failing::new(Some("b"), None));
        let area = area_with(store.clone()).await;
        area.cache(&item("stale", "0")).await.unwrap();
        let err = area
            .trim_items([item("a", "1"), item("b", "2"), item("c", "3")])
            .await
            .unwrap_err();
        assert_eq!(*err, ErrorKind::Store);
        assert!(store.deletions.lock().unwrap().is_empty());
        let ids = store.ids().await.unwrap();
        assert_eq!(ids, HashSet::from(["stale".to_string(), "a".to_string()]));
    }

    #[tokio::test]
    async fn test_not_initialized() {
        let area = CacheArea::new("people", mapper(), Arc::new(MemoryStore::new("people")));
        let err = area.cache(&item("1", "a")).await.unwrap_err();
        assert_eq!(*err, ErrorKind::NotInitialized("people".to_string()));
        let err = area.trim_items([item("1", "a")]).await.unwrap_err();
        assert_eq!(*err, ErrorKind::NotInitialized("people".to_string()));
    }

    #[tokio::test]
    async fn test_reset() {
        let area = CacheArea::new("people", mapper(), Arc::new(MemoryStore::new("people")));
        area.reset().await.unwrap();
        area.cache(&item("1", "a")).await.unwrap();
        area.reset().await.unwrap();
        assert!(area.store().ids().await.unwrap().is_empty());
        assert!(area.is_dirty(&item("1", "a")).await.unwrap());
    }

    #[tokio::test]
    async fn test_events() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let area = CacheArea::new("people", mapper(), Arc::new(MemoryStore::new("people"))).with_notifier(
            move |event: &Event<'_>| {
                sink.lock().unwrap().push((event.kind, event.item.id(), event.area.name().to_string()));
            },
        );
        area.initialize().await.unwrap();
        area.cache(&item("1", "a")).await.unwrap();
        area.cache(&item("1", "a")).await.unwrap();
        area.cache(&item("1", "b")).await.unwrap();
        let events = events.lock().unwrap();
        assert_eq!(
            *events,
            [
                (EventKind::Created, Some("1".to_string()), "people".to_string()),
                (EventKind::Modified, Some("1".to_string()), "people".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_mapping_failure() {
        let area = area().await;
        let incompatible = SourceItem::new("id", [("id", "1")]);
        assert!(!area.mapper().check(&incompatible));
        let err = area.cache(&incompatible).await.unwrap_err();
        assert_eq!(*err, ErrorKind::Mapping);
    }

    #[tokio::test]
    async fn test_managed_attribute_change_is_dirty() {
        let schema = Arc::new(
            Schema::builder("post", "id")
                .field("id", FieldKind::Text)
                .field("posted", FieldKind::DateTime)
                .build()
                .unwrap(),
        );
        let mapper = SchemaMapper::new(
            schema,
            [("id", AttributeKey::from("id")), ("posted", AttributeKey::managed("date", NormalizedDateTime))],
        )
        .unwrap();
        let area = CacheArea::new("posts", Arc::new(mapper), Arc::new(MemoryStore::new("posts")));
        area.initialize().await.unwrap();
        let post = |date: &str| SourceItem::new("id", [("id", "p1"), ("date", date)]);
        area.cache(&post("11/05/2014")).await.unwrap();
        assert!(!area.is_dirty(&post("2014/11/05 00:00")).await.unwrap());
        assert!(area.is_dirty(&post("2014/11/06")).await.unwrap());
    }

    #[tokio::test]
    async fn test_read_only_store_reports_without_writing() {
        let inner = Arc::new(MemoryStore::new("people"));
        inner.initialize().await.unwrap();
        let area = area_with(Arc::new(ReadOnlyStore::new(inner.clone()))).await;
        let cached = area.cache(&item("1", "a")).await.unwrap();
        assert_eq!(cached.map(|c| c.kind()), Some(EventKind::Created));
        assert!(inner.ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sqlite_dates_read_back_unchanged() {
        let schema = Arc::new(
            Schema::builder("post", "id")
                .field("id", FieldKind::Text)
                .field("posted", FieldKind::DateTime)
                .field("edited", FieldKind::DateTime)
                .build()
                .unwrap(),
        );
        let mapper = SchemaMapper::new(
            schema.clone(),
            [
                ("id", AttributeKey::from("id")),
                ("posted", AttributeKey::managed("posted", NormalizedDateTime)),
                ("edited", AttributeKey::from("edited")),
            ],
        )
        .unwrap();
        let db = Database::connect_in_memory().await.unwrap();
        let area = CacheArea::new("posts", Arc::new(mapper), Arc::new(SqliteStore::new(db, "posts", schema)));
        area.initialize().await.unwrap();

        let post = SourceItem::new("id", [("id", "p1"), ("posted", "11/5/2014 16:28"), ("edited", "2014/11/05")]);
        assert_eq!(area.cache(&post).await.unwrap().map(|c| c.kind()), Some(EventKind::Created));
        assert!(area.cache(&post).await.unwrap().is_none());
        assert!(!area.is_dirty(&post).await.unwrap());
        let stored = area.get(&post).await.unwrap().unwrap();
        assert!(matches!(stored.get("edited"), Some(Value::DateTime(_))));
    }

    #[tokio::test]
    async fn test_sqlite_commit_and_rollback() {
        let db = Database::connect_in_memory().await.unwrap();
        let area = area_with(Arc::new(SqliteStore::new(db, "people", schema()))).await;
        area.commit().await.unwrap();

        assert_eq!(area.trim_items([item("1", "a"), item("2", "b")]).await.unwrap().updated, 2);
        area.commit().await.unwrap();
        assert!(area.cache(&item("1", "a")).await.unwrap().is_none());

        area.trim_items([item("1", "changed")]).await.unwrap();
        area.rollback().await.unwrap();
        let stored = area.get(&item("1", "a")).await.unwrap().unwrap();
        assert_eq!(stored.get("name"), Some(&Value::from("a")));
        assert_eq!(area.store().ids().await.unwrap().len(), 2);
    }
}
