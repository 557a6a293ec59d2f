use crate::error::{ErrorKind, Result};
use crate::normalize::normalize_name;
use crate::value::Value;
use std::collections::HashMap;

/// An item read from a source, before any mapping takes place.
///
/// Holds the raw attribute values and the name of the attribute carrying the
/// item's unique identifier. Items are immutable once constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceItem {
    key: String,
    attributes: HashMap<String, Value>,
}

impl SourceItem {
    /// Create an item without validating it; see [`validate`](Self::validate).
    pub fn new<K, V>(key: impl Into<String>, attributes: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        Self {
            key: key.into(),
            attributes: attributes.into_iter().map(|(name, value)| (name.into(), value.into())).collect(),
        }
    }

    /// Create an item whose key and attribute names are normalized with
    /// [`normalize_name`], so that `"Entry #"` and `"ENTRY#"` address the
    /// same attribute.
    pub fn normalized<K, V>(key: &str, attributes: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: Into<Value>,
    {
        Self {
            key: normalize_name(key),
            attributes: attributes
                .into_iter()
                .map(|(name, value)| (normalize_name(name.as_ref()), value.into()))
                .collect(),
        }
    }

    /// Create an item and validate it in one go.
    pub fn try_new<K, V>(key: impl Into<String>, attributes: impl IntoIterator<Item = (K, V)>) -> Result<Self>
    where
        K: Into<String>,
        V: Into<Value>,
    {
        let item = Self::new(key, attributes);
        item.validate()?;
        Ok(item)
    }

    /// Name of the attribute holding the unique identifier.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn attributes(&self) -> &HashMap<String, Value> {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Value of the key attribute, if present.
    pub fn id(&self) -> Option<&Value> {
        self.attributes.get(&self.key)
    }

    /// Check that the key attribute is present and non-empty.
    pub fn validate(&self) -> Result<()> {
        let Some(id) = self.id() else {
            exn::bail!(ErrorKind::MissingKey(self.key.clone()));
        };
        if id.is_empty() {
            exn::bail!(ErrorKind::EmptyKey(self.key.clone()));
        }
        tracing::trace!(id = %id, "Source item passed validation");
        Ok(())
    }
}
