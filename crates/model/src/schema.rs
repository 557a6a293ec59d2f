use crate::error::{ErrorKind, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

/// Attribute names starting with this prefix are internal bookkeeping and
/// are never part of the default checked attribute set.
pub const RESERVED_PREFIX: char = '_';

/// How a cached attribute's value is produced from a raw source value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// Parsed as an integer; unparseable input becomes unset.
    Integer,
    /// Byte sequences are decoded as UTF-8 (lossy); empty input becomes unset.
    Text,
    /// Passed through untouched.
    Raw,
    /// Expected to be produced by a managed attribute transform.
    DateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub kind: FieldKind,
}

/// Descriptor of a cached item layout: an ordered list of typed fields, the
/// identity field, and the attributes compared when checking equality.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    name: String,
    key: String,
    fields: Vec<Field>,
    checked: Vec<String>,
}

impl Schema {
    pub fn builder(name: impl Into<String>, key: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            name: name.into(),
            key: key.into(),
            fields: Vec::new(),
            checked: None,
        }
    }

    /// Schema name, unique within a [`SchemaRegistry`].
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the identity field.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Attribute names compared by cached item equality.
    pub fn checked(&self) -> &[String] {
        &self.checked
    }
}

pub struct SchemaBuilder {
    name: String,
    key: String,
    fields: Vec<Field>,
    checked: Option<Vec<String>>,
}

impl SchemaBuilder {
    pub fn field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(Field { name: name.into(), kind });
        self
    }

    /// Declare the attributes compared by equality explicitly.
    ///
    /// Without this, every field except the identity field and reserved
    /// (`_`-prefixed) fields is checked.
    pub fn checked<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.checked = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn build(self) -> Result<Schema> {
        let mut seen = HashSet::new();
        for field in &self.fields {
            if !seen.insert(field.name.as_str()) {
                exn::bail!(ErrorKind::DuplicateAttribute(field.name.clone()));
            }
        }
        if !seen.contains(self.key.as_str()) {
            exn::bail!(ErrorKind::UnknownAttribute(self.key));
        }
        let checked = match self.checked {
            Some(checked) => {
                if let Some(unknown) = checked.iter().find(|name| !seen.contains(name.as_str())) {
                    exn::bail!(ErrorKind::UnknownAttribute(unknown.clone()));
                }
                checked
            },
            None => self
                .fields
                .iter()
                .filter(|field| field.name != self.key && !field.name.starts_with(RESERVED_PREFIX))
                .map(|field| field.name.clone())
                .collect(),
        };
        Ok(Schema {
            name: self.name,
            key: self.key,
            fields: self.fields,
            checked,
        })
    }
}

/// Memoizes schemas by name.
///
/// Whoever builds cache areas owns one of these; the first registration of
/// a name wins and every later lookup shares the same [`Arc<Schema>`].
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    schemas: Mutex<HashMap<String, Arc<Schema>>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Arc<Schema>> {
        self.schemas.lock().unwrap_or_else(PoisonError::into_inner).get(name).cloned()
    }

    /// Register a schema, returning the previously registered schema of the
    /// same name if there is one.
    pub fn register(&self, schema: Schema) -> Arc<Schema> {
        let mut schemas = self.schemas.lock().unwrap_or_else(PoisonError::into_inner);
        schemas.entry(schema.name.clone()).or_insert_with(|| Arc::new(schema)).clone()
    }

    /// Look up a schema by name, building and registering it on first use.
    pub fn get_or_try_register(&self, name: &str, build: impl FnOnce() -> Result<Schema>) -> Result<Arc<Schema>> {
        if let Some(schema) = self.get(name) {
            return Ok(schema);
        }
        let schema = build()?;
        tracing::debug!(schema = name, fields = schema.fields.len(), "Registered cached item schema");
        Ok(self.register(schema))
    }

    pub fn len(&self) -> usize {
        self.schemas.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
