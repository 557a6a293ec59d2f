//! Cache areas: reconciling a source against a backing store.
//!
//! A [`CacheArea`] ties together a [`Mapper`](recon_mapper::Mapper), which
//! turns source items into cached items, and a [`Store`](store::Store),
//! which persists cached items by identifier. It decides which source items
//! are new, which changed and which are stale, and performs the minimal
//! writes to bring the store in line with the source.
//!
//! # Data flow
//! `Source::items()` → `Mapper::get(item)` → `Store::get(id)` → equality
//! check → `Store::insert` / `Store::update` → [`Notifier`].
//!
//! Operations run strictly one after the other: each backend call is
//! awaited before the next begins, and nothing is spawned.

mod area;
mod db;
pub mod error;
mod event;
pub mod store;

pub use crate::area::{CacheArea, Cached, Trim};
pub use crate::db::{AreaRecord, Database};
pub use crate::event::{Event, EventKind, Notifier};
