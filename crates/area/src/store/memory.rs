//! In-memory backing store.

use super::error::{ErrorKind, Result};
use super::{Store, item_id};
use async_trait::async_trait;
use exn::OptionExt;
use recon_model::CachedItem;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

type Entries = HashMap<String, CachedItem>;

/// Backing store holding items in a `HashMap` behind a [`RwLock`], so all
/// trait methods can operate on `&self` without external synchronisation.
///
/// Nothing is persisted; the store starts uninitialized and
/// [`clear`](Store::clear) returns it to that state.
pub struct MemoryStore {
    name: String,
    entries: RwLock<Option<Entries>>,
}

impl MemoryStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: RwLock::new(None),
        }
    }

    fn not_initialized(&self) -> ErrorKind {
        ErrorKind::NotInitialized(self.name.clone())
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn initialize(&self) -> Result<()> {
        let mut guard = self.entries.write().await;
        if guard.is_none() {
            tracing::debug!(store = %self.name, "Initialized in-memory store");
            *guard = Some(HashMap::new());
        }
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<CachedItem>> {
        let guard = self.entries.read().await;
        let entries = guard.as_ref().ok_or_raise(|| self.not_initialized())?;
        Ok(entries.get(id).cloned())
    }

    async fn insert(&self, item: &CachedItem) -> Result<()> {
        let id = item_id(item)?;
        let mut guard = self.entries.write().await;
        let entries = guard.as_mut().ok_or_raise(|| self.not_initialized())?;
        if entries.contains_key(&id) {
            exn::bail!(ErrorKind::AlreadyExists(id));
        }
        entries.insert(id, item.clone());
        Ok(())
    }

    async fn update(&self, item: &CachedItem) -> Result<()> {
        let id = item_id(item)?;
        let mut guard = self.entries.write().await;
        let entries = guard.as_mut().ok_or_raise(|| self.not_initialized())?;
        let entry = entries.get_mut(&id).ok_or_raise(|| ErrorKind::NotFound(id.clone()))?;
        *entry = item.clone();
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut guard = self.entries.write().await;
        let entries = guard.as_mut().ok_or_raise(|| self.not_initialized())?;
        entries.remove(id).map(|_| ()).ok_or_raise(|| ErrorKind::NotFound(id.to_string()))
    }

    async fn ids(&self) -> Result<HashSet<String>> {
        let guard = self.entries.read().await;
        let entries = guard.as_ref().ok_or_raise(|| self.not_initialized())?;
        Ok(entries.keys().cloned().collect())
    }

    async fn clear(&self) -> Result<()> {
        self.entries.write().await.take();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recon_model::{FieldKind, Schema};
    use std::sync::Arc;

    fn item(id: &str, name: &str) -> CachedItem {
        let schema = Schema::builder("person", "id")
            .field("id", FieldKind::Text)
            .field("name", FieldKind::Text)
            .build()
            .unwrap();
        CachedItem::new(Arc::new(schema)).with("id", id).unwrap().with("name", name).unwrap()
    }

    #[tokio::test]
    async fn test_not_initialized() {
        let store = MemoryStore::new("people");
        let err = store.get("1").await.unwrap_err();
        assert_eq!(*err, ErrorKind::NotInitialized("people".to_string()));
        let err = store.insert(&item("1", "a")).await.unwrap_err();
        assert_eq!(*err, ErrorKind::NotInitialized("people".to_string()));
        store.clear().await.unwrap();
    }

    #[tokio::test]
    async fn test_crud() {
        let store = MemoryStore::new("people");
        store.initialize().await.unwrap();
        store.insert(&item("1", "a")).await.unwrap();
        assert_eq!(*store.insert(&item("1", "a")).await.unwrap_err(), ErrorKind::AlreadyExists("1".to_string()));
        store.update(&item("1", "b")).await.unwrap();
        assert_eq!(store.get("1").await.unwrap(), Some(item("1", "b")));
        assert_eq!(*store.update(&item("2", "b")).await.unwrap_err(), ErrorKind::NotFound("2".to_string()));
        assert_eq!(store.ids().await.unwrap(), HashSet::from(["1".to_string()]));
        store.delete("1").await.unwrap();
        assert_eq!(store.get("1").await.unwrap(), None);
        assert_eq!(*store.delete("1").await.unwrap_err(), ErrorKind::NotFound("1".to_string()));
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent_and_clear_resets() {
        let store = MemoryStore::new("people");
        store.initialize().await.unwrap();
        store.insert(&item("1", "a")).await.unwrap();
        store.initialize().await.unwrap();
        assert_eq!(store.ids().await.unwrap().len(), 1);
        store.clear().await.unwrap();
        assert!(store.ids().await.is_err());
        store.initialize().await.unwrap();
        assert!(store.ids().await.unwrap().is_empty());
    }
}
