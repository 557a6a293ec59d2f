use crate::Mapper;
use crate::error::{ErrorKind, Result};
use exn::{OptionExt, ResultExt};
use recon_model::{CachedItem, FieldKind, Schema, SchemaRegistry, SourceItem, Value};
use std::fmt;
use std::sync::Arc;

type Filter = Arc<dyn Fn(&str, &Value) -> Value + Send + Sync>;

/// Maps every attribute of a sample source item one-to-one onto a cached
/// item of the same shape, passing values through untouched.
///
/// The schema is derived from the sample's attribute names and memoized in
/// the given registry, so mappers built from samples of the same shape
/// share one schema.
#[derive(Clone)]
pub struct SimpleMapper {
    schema: Arc<Schema>,
    filter: Option<Filter>,
}

impl SimpleMapper {
    pub fn new(key: &str, sample: &SourceItem, registry: &SchemaRegistry) -> Result<Self> {
        let mut names: Vec<&str> = sample.attributes().keys().map(String::as_str).collect();
        names.sort_unstable();
        let name = format!("simple:{key}:{}", names.join(","));
        let schema = registry
            .get_or_try_register(&name, || {
                names
                    .iter()
                    .fold(Schema::builder(name.as_str(), key), |builder, field| builder.field(*field, FieldKind::Raw))
                    .build()
            })
            .or_raise(|| ErrorKind::Schema)?;
        Ok(Self { schema, filter: None })
    }

    /// Apply `filter(attribute, value)` to every value on [`get`](Mapper::get).
    pub fn with_filter(mut self, filter: impl Fn(&str, &Value) -> Value + Send + Sync + 'static) -> Self {
        self.filter = Some(Arc::new(filter));
        self
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }
}

impl fmt::Debug for SimpleMapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimpleMapper")
            .field("schema", &self.schema.name())
            .field("filtered", &self.filter.is_some())
            .finish()
    }
}

impl Mapper for SimpleMapper {
    fn key(&self) -> &str {
        self.schema.key()
    }

    fn factory(&self) -> CachedItem {
        CachedItem::new(self.schema.clone())
    }

    fn get(&self, item: &SourceItem) -> Result<CachedItem> {
        let mut cached = self.factory();
        for field in self.schema.fields() {
            let raw = item
                .attribute(&field.name)
                .ok_or_raise(|| ErrorKind::MappingFailure(field.name.clone()))?;
            let value = match &self.filter {
                Some(filter) => filter(&field.name, raw),
                None => raw.clone(),
            };
            cached
                .set(&field.name, value)
                .or_raise(|| ErrorKind::MappingFailure(field.name.clone()))?;
        }
        Ok(cached)
    }
}
