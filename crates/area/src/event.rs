use crate::CacheArea;
use derive_more::Display;
use recon_model::CachedItem;

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Created,
    Modified,
}

/// Emitted exactly once per successful insert ([`EventKind::Created`]) or
/// update ([`EventKind::Modified`]). No-op caching emits nothing.
#[derive(Debug, Clone, Copy)]
pub struct Event<'a> {
    pub kind: EventKind,
    pub item: &'a CachedItem,
    pub area: &'a CacheArea,
}

/// Receives cache area events. Delivery is fire-and-forget: a notifier
/// cannot fail the write that triggered it.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: &Event<'_>);
}

impl<F> Notifier for F
where
    F: Fn(&Event<'_>) + Send + Sync,
{
    fn notify(&self, event: &Event<'_>) {
        self(event)
    }
}
