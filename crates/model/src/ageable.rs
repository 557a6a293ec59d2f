//! Cached items with a lifetime.
//!
//! An [`AgeableItem`] wraps a [`CachedItem`] with the moment it was born and
//! the moment it expires. Both are kept in the reserved [`BIRTH`] and
//! [`EXPIRATION`] attributes when the item's schema declares them (as
//! [`FieldKind::DateTime`](crate::FieldKind::DateTime) fields), so a lifetime
//! survives any store and never takes part in item equality.
//!
//! Times are UTC. Reading the current time goes through a [`Clock`], which
//! tests replace with a fixed one.

use crate::cached::CachedItem;
use crate::error::Result;
use crate::value::Value;
use time::macros::datetime;
use time::{Duration, OffsetDateTime, PrimitiveDateTime, UtcOffset};

/// Reserved attribute holding the item's birth.
pub const BIRTH: &str = "_birth";
/// Reserved attribute holding the item's expiration.
pub const EXPIRATION: &str = "_expiration";

/// Expiration of items that were never given one.
pub const NEVER: OffsetDateTime = datetime!(9999-12-31 0:00 UTC);

pub trait Clock {
    fn now(&self) -> OffsetDateTime;
}

/// The system's wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

impl<F> Clock for F
where
    F: Fn() -> OffsetDateTime,
{
    fn now(&self) -> OffsetDateTime {
        self()
    }
}

/// Birth and expiration of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lifetime {
    birth: OffsetDateTime,
    expiration: OffsetDateTime,
}

impl Lifetime {
    /// Born at `birth`, never expiring.
    pub fn new(birth: OffsetDateTime) -> Self {
        Self {
            birth,
            expiration: NEVER,
        }
    }

    pub fn expiring_at(mut self, expiration: OffsetDateTime) -> Self {
        self.expiration = expiration;
        self
    }

    /// Expire once the item is `age` old.
    pub fn expiring_after(mut self, age: Duration) -> Self {
        self.expiration = self.birth.checked_add(age).unwrap_or(NEVER);
        self
    }

    pub fn birth(&self) -> OffsetDateTime {
        self.birth
    }

    pub fn expiration(&self) -> OffsetDateTime {
        self.expiration
    }

    /// Age at which the item expires.
    pub fn expiration_age(&self) -> Duration {
        self.expiration - self.birth
    }

    pub fn age_at(&self, now: OffsetDateTime) -> Duration {
        now - self.birth
    }

    pub fn expired_at(&self, now: OffsetDateTime) -> bool {
        now > self.expiration
    }
}

fn read(item: &CachedItem, name: &str) -> Option<OffsetDateTime> {
    match item.get(name) {
        Some(Value::DateTime(datetime)) => Some(datetime.assume_utc()),
        _ => None,
    }
}

fn utc(at: OffsetDateTime) -> PrimitiveDateTime {
    let at = at.to_offset(UtcOffset::UTC);
    PrimitiveDateTime::new(at.date(), at.time())
}

/// A [`CachedItem`] that knows how old it is.
///
/// # Examples
///
/// ```
/// use recon_model::{AgeableItem, CachedItem, FieldKind, Schema};
/// use std::sync::Arc;
/// use time::Duration;
/// use time::macros::datetime;
///
/// let schema = Schema::builder("post", "id")
///     .field("id", FieldKind::Text)
///     .field("_birth", FieldKind::DateTime)
///     .build()
///     .unwrap();
/// let now = || datetime!(2024-03-01 12:00 UTC);
/// let item = AgeableItem::with_clock(CachedItem::new(Arc::new(schema)), now).expiring_after(Duration::hours(1));
/// assert_eq!(item.birth(), datetime!(2024-03-01 12:00 UTC));
/// assert!(!item.expired());
/// ```
#[derive(Debug, Clone)]
pub struct AgeableItem<C = SystemClock> {
    item: CachedItem,
    lifetime: Lifetime,
    clock: C,
}

impl AgeableItem {
    pub fn new(item: CachedItem) -> Self {
        Self::with_clock(item, SystemClock)
    }
}

impl<C: Clock> AgeableItem<C> {
    /// Wrap `item`, taking its lifetime from the reserved attributes.
    ///
    /// An unset birth is the clock's current time and an unset expiration
    /// is [`NEVER`].
    pub fn with_clock(item: CachedItem, clock: C) -> Self {
        let birth = read(&item, BIRTH).unwrap_or_else(|| clock.now());
        let lifetime = Lifetime::new(birth);
        let lifetime = match read(&item, EXPIRATION) {
            Some(expiration) => lifetime.expiring_at(expiration),
            None => lifetime,
        };
        Self { item, lifetime, clock }
    }

    pub fn expiring_at(mut self, expiration: OffsetDateTime) -> Self {
        self.lifetime = self.lifetime.expiring_at(expiration);
        self
    }

    pub fn expiring_after(mut self, age: Duration) -> Self {
        self.lifetime = self.lifetime.expiring_after(age);
        self
    }

    pub fn item(&self) -> &CachedItem {
        &self.item
    }

    pub fn lifetime(&self) -> Lifetime {
        self.lifetime
    }

    pub fn birth(&self) -> OffsetDateTime {
        self.lifetime.birth()
    }

    pub fn age(&self) -> Duration {
        self.lifetime.age_at(self.clock.now())
    }

    pub fn expiration(&self) -> OffsetDateTime {
        self.lifetime.expiration()
    }

    pub fn expiration_age(&self) -> Duration {
        self.lifetime.expiration_age()
    }

    pub fn expired(&self) -> bool {
        self.lifetime.expired_at(self.clock.now())
    }

    /// The wrapped item, with its lifetime written to whichever reserved
    /// attributes the schema declares.
    pub fn into_item(self) -> Result<CachedItem> {
        let mut item = self.item;
        for (name, at) in [(BIRTH, self.lifetime.birth), (EXPIRATION, self.lifetime.expiration)] {
            if item.schema().field(name).is_some() {
                item.set(name, utc(at))?;
            }
        }
        Ok(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldKind, Schema};
    use std::cell::Cell;
    use std::sync::Arc;

    fn schema(reserved: &[&str]) -> Arc<Schema> {
        let builder = Schema::builder("post", "id")
            .field("id", FieldKind::Text)
            .field("title", FieldKind::Text);
        let builder = reserved.iter().fold(builder, |builder, name| builder.field(*name, FieldKind::DateTime));
        Arc::new(builder.build().unwrap())
    }

    fn post(reserved: &[&str]) -> CachedItem {
        CachedItem::new(schema(reserved)).with("id", "1").unwrap().with("title", "Hello").unwrap()
    }

    #[test]
    fn test_defaults() {
        let now = || datetime!(2024-03-01 12:00 UTC);
        let item = AgeableItem::with_clock(post(&[]), now);
        assert_eq!(item.birth(), now());
        assert_eq!(item.age(), Duration::ZERO);
        assert_eq!(item.expiration(), NEVER);
        assert_eq!(item.expiration_age(), NEVER - now());
        assert!(!item.expired());
    }

    #[test]
    fn test_ages_with_the_clock() {
        let now = Cell::new(datetime!(2024-03-01 12:00 UTC));
        let item = AgeableItem::with_clock(post(&[]), || now.get()).expiring_after(Duration::minutes(30));
        assert_eq!(item.expiration(), datetime!(2024-03-01 12:30 UTC));
        assert_eq!(item.expiration_age(), Duration::minutes(30));

        now.set(datetime!(2024-03-01 12:30 UTC));
        assert_eq!(item.age(), Duration::minutes(30));
        assert!(!item.expired());

        now.set(datetime!(2024-03-01 12:30:01 UTC));
        assert!(item.expired());
    }

    #[test]
    fn test_expiring_at_sets_expiration_age() {
        let now = || datetime!(2024-03-01 12:00 +02:00);
        let item = AgeableItem::with_clock(post(&[]), now).expiring_at(datetime!(2024-03-02 10:00 UTC));
        assert_eq!(item.expiration_age(), Duration::days(1));
    }

    #[test]
    fn test_expiring_after_saturates() {
        let lifetime = Lifetime::new(datetime!(2024-03-01 12:00 UTC)).expiring_after(Duration::MAX);
        assert_eq!(lifetime.expiration(), NEVER);
    }

    #[test]
    fn test_lifetime_kept_in_reserved_attributes() {
        let now = || datetime!(2024-03-01 12:00 +01:00);
        let item = AgeableItem::with_clock(post(&[BIRTH, EXPIRATION]), now)
            .expiring_after(Duration::hours(2))
            .into_item()
            .unwrap();
        assert_eq!(item.get(BIRTH), Some(&Value::from(datetime!(2024-03-01 11:00))));
        assert_eq!(item.get(EXPIRATION), Some(&Value::from(datetime!(2024-03-01 13:00))));
        assert_eq!(item, post(&[BIRTH, EXPIRATION]));

        let later = || datetime!(2024-03-01 14:00 UTC);
        let restored = AgeableItem::with_clock(item, later);
        assert_eq!(restored.birth(), datetime!(2024-03-01 11:00 UTC));
        assert_eq!(restored.age(), Duration::hours(3));
        assert!(restored.expired());
    }

    #[test]
    fn test_undeclared_reserved_attributes_are_skipped() {
        let now = || datetime!(2024-03-01 12:00 UTC);
        let item = AgeableItem::with_clock(post(&[BIRTH]), now).into_item().unwrap();
        assert_eq!(item.get(BIRTH), Some(&Value::from(datetime!(2024-03-01 12:00))));
        assert_eq!(item.get(EXPIRATION), None);
    }
}
