//! Backing store trait and implementations.
//!
//! A backing store is conceptually a map from identifier to
//! [`CachedItem`], plus lifecycle hooks. Stores move through two states:
//! *uninitialized* and *ready*. [`initialize`](Store::initialize) moves a
//! store to ready (and is a no-op when it already is), while
//! [`clear`](Store::clear) drops every entry and returns it to
//! uninitialized. Every other operation on an uninitialized store fails
//! with [`ErrorKind::NotInitialized`](error::ErrorKind::NotInitialized);
//! stores never initialize themselves implicitly.

pub mod error;
#[cfg(feature = "kv")]
mod kv;
mod memory;
mod ro;
mod sqlite;

#[cfg(feature = "kv")]
pub use self::kv::{KvConnection, KvStore};
pub use self::memory::MemoryStore;
pub use self::ro::ReadOnlyStore;
pub use self::sqlite::SqliteStore;
use self::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::OptionExt;
use recon_model::CachedItem;
use std::collections::HashSet;
use std::sync::Arc;

pub type StoreHandle = Arc<dyn Store>;

/// Unified interface for backing stores.
///
/// # Examples
///
/// ```
/// use recon_area::store::{MemoryStore, Store};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> recon_area::store::error::Result<()> {
/// let store = MemoryStore::new("people");
/// store.initialize().await?;
/// assert!(store.get("123").await?.is_none());
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait Store: Send + Sync {
    /// Name of the store, used in logs and errors.
    fn name(&self) -> &str;

    /// Idempotent setup of the backing structure.
    async fn initialize(&self) -> Result<()>;

    /// The stored item for `id`, or `None` if there is no entry.
    async fn get(&self, id: &str) -> Result<Option<CachedItem>>;

    /// Write a new entry. Fails if one already exists for the item's id.
    async fn insert(&self, item: &CachedItem) -> Result<()>;

    /// Overwrite an existing entry. Fails if there is none for the item's id.
    async fn update(&self, item: &CachedItem) -> Result<()>;

    async fn delete(&self, id: &str) -> Result<()>;

    /// Identifiers of every stored entry.
    async fn ids(&self) -> Result<HashSet<String>>;

    /// Delete every entry and tear down the backing structure. Safe to call
    /// in any state.
    async fn clear(&self) -> Result<()>;

    /// Make buffered writes visible. No-op for non-transactional stores.
    async fn commit(&self) -> Result<()> {
        Ok(())
    }

    /// Discard buffered writes. No-op for non-transactional stores.
    async fn rollback(&self) -> Result<()> {
        Ok(())
    }
}

/// Identifier an item is stored under.
pub(crate) fn item_id(item: &CachedItem) -> Result<String> {
    item.id().ok_or_raise(|| ErrorKind::MissingId)
}
