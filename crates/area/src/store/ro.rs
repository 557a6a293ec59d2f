//! Read-only backing store.
//!
//! Wraps another store and prevents write operations from executing, while
//! still indicating success on return.

use super::error::Result;
use super::{Store, StoreHandle};
use async_trait::async_trait;
use recon_model::CachedItem;
use std::collections::HashSet;

/// Read-only backing store.
///
/// Delegates reads and silently drops all writes, logging an
/// [`info event`](tracing::Event) for each. Lifecycle calls that change
/// state (`initialize`, `clear`, `commit`, `rollback`) are dropped too.
#[derive(Clone)]
pub struct ReadOnlyStore {
    inner: StoreHandle,
}

impl ReadOnlyStore {
    pub fn new(inner: StoreHandle) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Store for ReadOnlyStore {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn initialize(&self) -> Result<()> {
        tracing::info!(store = self.inner.name(), "Skipping initialize during read-only mode");
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<CachedItem>> {
        self.inner.get(id).await
    }

    async fn insert(&self, item: &CachedItem) -> Result<()> {
        tracing::info!(store = self.inner.name(), id = ?item.id(), "Skipping insert during read-only mode");
        Ok(())
    }

    async fn update(&self, item: &CachedItem) -> Result<()> {
        tracing::info!(store = self.inner.name(), id = ?item.id(), "Skipping update during read-only mode");
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        tracing::info!(store = self.inner.name(), id, "Skipping delete during read-only mode");
        Ok(())
    }

    async fn ids(&self) -> Result<HashSet<String>> {
        self.inner.ids().await
    }

    async fn clear(&self) -> Result<()> {
        tracing::info!(store = self.inner.name(), "Skipping clear during read-only mode");
        Ok(())
    }
}
