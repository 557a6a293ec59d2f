use crate::error::{ErrorKind, Result};
use crate::schema::Schema;
use crate::value::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// A typed, schema-shaped item as produced by a mapper and persisted by a
/// backing store.
///
/// # Equality
/// Two cached items are equal when every attribute in the *checked* set of
/// this item's schema holds an equal value in both. The identity attribute
/// and reserved attributes are excluded unless the schema declares them as
/// checked explicitly. If the other item's schema does not declare one of
/// the checked attributes, the items are not equal.
#[derive(Debug, Clone)]
pub struct CachedItem {
    schema: Arc<Schema>,
    values: HashMap<String, Value>,
}

impl CachedItem {
    /// Create an item with every field unset.
    pub fn new(schema: Arc<Schema>) -> Self {
        let values = schema.fields().iter().map(|field| (field.name.clone(), Value::Unset)).collect();
        Self { schema, values }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Name of the identity attribute.
    pub fn key(&self) -> &str {
        self.schema.key()
    }

    /// Identifier of this item, or `None` while the identity attribute is
    /// unset.
    pub fn id(&self) -> Option<String> {
        self.get(self.schema.key()).and_then(Value::as_id)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Assign an attribute declared by the schema.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let Some(slot) = self.values.get_mut(name) else {
            exn::bail!(ErrorKind::UnknownAttribute(name.to_string()));
        };
        *slot = value.into();
        Ok(())
    }

    /// Builder-style variant of [`set`](Self::set).
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Result<Self> {
        self.set(name, value)?;
        Ok(self)
    }

    /// Attribute names and values, in schema field order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.schema
            .fields()
            .iter()
            .filter_map(|field| self.values.get(&field.name).map(|value| (field.name.as_str(), value)))
    }
}

impl PartialEq for CachedItem {
    fn eq(&self, other: &Self) -> bool {
        self.schema.checked().iter().all(|name| match (self.values.get(name), other.values.get(name)) {
            (Some(ours), Some(theirs)) => ours == theirs,
            _ => false,
        })
    }
}
