use crate::Mapper;
use crate::coerce::coerce;
use crate::error::{ErrorKind, Result};
use crate::managed::AttributeKey;
use exn::{OptionExt, ResultExt};
use recon_model::{CachedItem, Schema, SourceItem};
use std::collections::HashMap;
use std::sync::Arc;

/// Maps source attributes onto the fields of a [`Schema`] through an
/// explicit cached-name → source-name map.
#[derive(Debug, Clone)]
pub struct SchemaMapper {
    schema: Arc<Schema>,
    map: HashMap<String, AttributeKey>,
}

impl SchemaMapper {
    /// Fails with [`UnknownAttribute`](recon_model::error::ErrorKind::UnknownAttribute)
    /// (raised as [`ErrorKind::Schema`]) when the map names a cached
    /// attribute the schema does not declare, and with
    /// [`ErrorKind::KindMismatch`] when a managed attribute is mapped onto a
    /// field of a different kind than the transform produces.
    pub fn new<K, V>(schema: Arc<Schema>, map: impl IntoIterator<Item = (K, V)>) -> Result<Self>
    where
        K: Into<String>,
        V: Into<AttributeKey>,
    {
        let map: HashMap<String, AttributeKey> = map.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        if let Some(unknown) = map.keys().find(|name| schema.field(name).is_none()) {
            let err = exn::Exn::from(recon_model::error::ErrorKind::UnknownAttribute(unknown.clone()));
            return Err(err.raise(ErrorKind::Schema));
        }
        let mismatched = map.iter().find(|(name, key)| {
            key.transform()
                .is_some_and(|transform| schema.field(name).map(|field| field.kind) != Some(transform.kind()))
        });
        if let Some((name, _)) = mismatched {
            exn::bail!(ErrorKind::KindMismatch(name.clone()));
        }
        Ok(Self { schema, map })
    }

    /// Every schema field read from the source attribute of the same name.
    pub fn identity(schema: Arc<Schema>) -> Self {
        let map = schema
            .fields()
            .iter()
            .map(|field| (field.name.clone(), AttributeKey::Plain(field.name.clone())))
            .collect();
        Self { schema, map }
    }

    /// Normalize every source attribute name with
    /// [`normalize_name`](recon_model::normalize_name), for use with
    /// sources that normalize the names they read.
    pub fn normalized(mut self) -> Self {
        self.map = self.map.into_iter().map(|(name, key)| (name, key.normalized())).collect();
        self
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn map(&self) -> &HashMap<String, AttributeKey> {
        &self.map
    }
}

impl Mapper for SchemaMapper {
    fn key(&self) -> &str {
        self.schema.key()
    }

    fn factory(&self) -> CachedItem {
        CachedItem::new(self.schema.clone())
    }

    fn get(&self, item: &SourceItem) -> Result<CachedItem> {
        let mut cached = self.factory();
        for field in self.schema.fields() {
            let key = self
                .map
                .get(&field.name)
                .ok_or_raise(|| ErrorKind::MappingFailure(field.name.clone()))?;
            let raw = item
                .attribute(key.name())
                .ok_or_raise(|| ErrorKind::MappingFailure(key.name().to_string()))?;
            let value = coerce(&field.name, field.kind, key, raw)?;
            cached
                .set(&field.name, value)
                .or_raise(|| ErrorKind::MappingFailure(field.name.clone()))?;
        }
        Ok(cached)
    }
}
