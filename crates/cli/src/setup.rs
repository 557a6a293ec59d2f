//! Building cache areas from configuration.

use crate::error::{ErrorKind, Result};
use exn::{OptionExt, ResultExt};
use recon_area::store::{MemoryStore, ReadOnlyStore, SqliteStore, StoreHandle};
use recon_area::{CacheArea, Database, Event};
use recon_config::{AreaConfig, Config, FieldConfig, SourceFormat, StoreKind};
use recon_mapper::{AttributeKey, MapperHandle, SchemaMapper, SimpleMapper, managed_attribute};
use recon_model::{Schema, SchemaRegistry};
use recon_source::{CsvSource, JsonLinesSource, Source, SourceHandle};
use std::path::Path;
use std::sync::Arc;

/// Source attribute holding the identifier: the key field's source name
/// when fields are declared, the key itself otherwise.
fn source_key(area: &AreaConfig) -> &str {
    area.fields
        .iter()
        .find(|field| field.name == area.key)
        .map(FieldConfig::source)
        .unwrap_or(&area.key)
}

pub fn source(area: &AreaConfig, path: &Path) -> SourceHandle {
    let key = source_key(area);
    match area.format {
        SourceFormat::Jsonl => Arc::new(JsonLinesSource::new(path, key).normalized(area.normalize)),
        SourceFormat::Csv => Arc::new(CsvSource::new(path, key).normalized(area.normalize)),
    }
}

fn schema(name: &str, area: &AreaConfig) -> recon_model::error::Result<Schema> {
    let builder = area
        .fields
        .iter()
        .fold(Schema::builder(format!("area:{name}"), &area.key), |builder, field| {
            builder.field(&field.name, field.kind())
        });
    match &area.checked {
        Some(checked) => builder.checked(checked.iter().cloned()).build(),
        None => builder.build(),
    }
}

/// Declared fields get a [`SchemaMapper`]; otherwise every attribute of
/// the source's first item is mapped as-is.
async fn mapper(
    name: &str,
    area: &AreaConfig,
    registry: &SchemaRegistry,
    source: Option<&dyn Source>,
) -> Result<MapperHandle> {
    let setup = || ErrorKind::Setup(name.to_string());
    if area.fields.is_empty() {
        let source = source.ok_or_raise(|| {
            ErrorKind::Unsupported(format!("area {name} declares no fields; give a source to infer them from"))
        })?;
        let sample = source
            .first()
            .await
            .or_raise(|| ErrorKind::Source)?
            .ok_or_raise(|| ErrorKind::Unsupported(format!("source for area {name} is empty")))?;
        let mapper = SimpleMapper::new(source.key(), &sample, registry).or_raise(setup)?;
        return Ok(Arc::new(mapper));
    }

    let schema = registry
        .get_or_try_register(&format!("area:{name}"), || schema(name, area))
        .or_raise(setup)?;
    let mut map = Vec::with_capacity(area.fields.len());
    for field in &area.fields {
        let key = match &field.managed {
            None => AttributeKey::from(field.source()),
            Some(managed) => AttributeKey::Managed {
                name: field.source().to_string(),
                transform: managed_attribute(managed)
                    .ok_or_raise(|| ErrorKind::Unsupported(format!("unknown managed attribute {managed}")))?,
            },
        };
        map.push((field.name.clone(), key));
    }
    let mapper = SchemaMapper::new(schema, map).or_raise(setup)?;
    Ok(Arc::new(if area.normalize { mapper.normalized() } else { mapper }))
}

async fn store(name: &str, config: &Config, area: &AreaConfig, schema: Arc<Schema>) -> Result<StoreHandle> {
    let setup = || ErrorKind::Setup(name.to_string());
    let store: StoreHandle = match area.store {
        StoreKind::Memory => Arc::new(MemoryStore::new(name)),
        StoreKind::Sqlite => {
            if let Some(parent) = config.database.parent().filter(|parent| !parent.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await.or_raise(setup)?;
            }
            let db = Database::connect(&config.database).await.or_raise(setup)?;
            Arc::new(SqliteStore::new(db, name, schema))
        },
        StoreKind::Kv => kv_store(name, area, schema)?,
    };
    if area.dry_run {
        tracing::info!(area = name, "Dry run: no changes will be written");
        return Ok(Arc::new(ReadOnlyStore::new(store)));
    }
    Ok(store)
}

#[cfg(feature = "kv")]
fn kv_store(name: &str, area: &AreaConfig, schema: Arc<Schema>) -> Result<StoreHandle> {
    use recon_area::store::{KvConnection, KvStore};

    let setup = || ErrorKind::Setup(name.to_string());
    let kv = area.kv.as_ref().ok_or_raise(setup)?;
    let connection = KvConnection {
        base_url: kv.base_url.clone(),
        collection: kv.collection.clone().unwrap_or_else(|| name.to_string()),
        timeout: kv.timeout(),
    };
    Ok(Arc::new(KvStore::new(name, connection, schema).or_raise(setup)?))
}

#[cfg(not(feature = "kv"))]
fn kv_store(_name: &str, _area: &AreaConfig, _schema: Arc<Schema>) -> Result<StoreHandle> {
    exn::bail!(ErrorKind::Unsupported("built without kv store support".to_string()))
}

fn log_event(event: &Event<'_>) {
    tracing::info!(area = event.area.name(), kind = %event.kind, id = ?event.item.id(), "Cache area updated");
}

/// Build the named area, and the source to read if a path was given.
pub async fn area(
    config: &Config,
    name: &str,
    path: Option<&Path>,
    registry: &SchemaRegistry,
) -> Result<(CacheArea, Option<SourceHandle>)> {
    let area = config.area(name).or_raise(|| ErrorKind::Config)?;
    let source = path.map(|path| source(area, path));
    let mapper = mapper(name, area, registry, source.as_deref()).await?;
    let schema = mapper.factory().schema().clone();
    let store = store(name, config, area, schema).await?;
    let cache_area = CacheArea::new(name, mapper, store).with_notifier(log_event);
    Ok((cache_area, source))
}

#[cfg(test)]
mod tests {
    use super::*;
    use recon_model::{FieldKind, Value};
    use std::collections::BTreeMap;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    fn lines(lines: &[&str]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
        file
    }

    fn field(name: &str, kind: FieldKind, source: &str, managed: Option<&str>) -> FieldConfig {
        FieldConfig {
            name: name.to_string(),
            kind: Some(kind),
            source: Some(source.to_string()),
            managed: managed.map(str::to_string),
        }
    }

    fn config(area: AreaConfig, database: &Path) -> Config {
        Config {
            database: database.to_path_buf(),
            areas: BTreeMap::from([("people".to_string(), area)]),
            ..Config::default()
        }
    }

    fn declared(store: StoreKind) -> AreaConfig {
        AreaConfig {
            key: "id".to_string(),
            store,
            format: SourceFormat::Jsonl,
            fields: vec![
                field("id", FieldKind::Text, "Entry #", None),
                field("age", FieldKind::Integer, "Age", None),
                field("joined", FieldKind::DateTime, "Date Joined", Some("datetime")),
            ],
            checked: None,
            normalize: true,
            dry_run: false,
            kv: None,
        }
    }

    fn inferred() -> AreaConfig {
        AreaConfig {
            fields: vec![],
            normalize: false,
            ..declared(StoreKind::Memory)
        }
    }

    #[tokio::test]
    async fn test_declared_fields_with_normalized_source() {
        let dir = TempDir::new().unwrap();
        let config = config(declared(StoreKind::Memory), &dir.path().join("db.sqlite"));
        let file = lines(&[
            r#"{"ENTRY #": "1", "age": "41", "Date-Joined": "11/5/2014"}"#,
            r#"{"Entry #": "2", "Age": "n/a", "date joined": "2014/11/06 10:00"}"#,
        ]);
        let registry = SchemaRegistry::new();
        let (area, source) = area(&config, "people", Some(file.path()), &registry).await.unwrap();
        let source = source.unwrap();
        assert_eq!(source.key(), "entry#");
        area.initialize().await.unwrap();
        assert_eq!(area.import_source(source.as_ref()).await.unwrap(), 2);
        let first = source.first().await.unwrap().unwrap();
        let stored = area.get(&first).await.unwrap().unwrap();
        assert_eq!(stored.get("age"), Some(&Value::Int(41)));
        assert!(matches!(stored.get("joined"), Some(Value::DateTime(_))));
    }

    #[tokio::test]
    async fn test_inferred_fields() {
        let dir = TempDir::new().unwrap();
        let config = config(inferred(), &dir.path().join("db.sqlite"));
        let file = lines(&[r#"{"id": "1", "name": "Pooh"}"#, r#"{"id": "2", "name": "Eeyore"}"#]);
        let registry = SchemaRegistry::new();
        let (area, source) = area(&config, "people", Some(file.path()), &registry).await.unwrap();
        area.initialize().await.unwrap();
        let trim = area.trim(source.unwrap().as_ref()).await.unwrap();
        assert_eq!((trim.updated, trim.deleted), (2, 0));
    }

    #[tokio::test]
    async fn test_csv_source() {
        let dir = TempDir::new().unwrap();
        let people = AreaConfig {
            format: SourceFormat::Csv,
            ..declared(StoreKind::Memory)
        };
        let config = config(people, &dir.path().join("db.sqlite"));
        let file = dir.path().join("people.csv");
        std::fs::write(&file, "Entry #,Age,Date Joined\n1,41,11/5/2014\n,7,\n2,n/a,2014/11/06 10:00\n").unwrap();
        let registry = SchemaRegistry::new();
        let (area, source) = area(&config, "people", Some(&file), &registry).await.unwrap();
        let source = source.unwrap();
        area.initialize().await.unwrap();
        assert_eq!(area.import_source(source.as_ref()).await.unwrap(), 2);
        let stored = area.get(&source.first().await.unwrap().unwrap()).await.unwrap().unwrap();
        assert_eq!(stored.get("age"), Some(&Value::Int(41)));
        assert!(matches!(stored.get("joined"), Some(Value::DateTime(_))));
    }

    #[tokio::test]
    async fn test_inferred_fields_need_a_source() {
        let dir = TempDir::new().unwrap();
        let config = config(inferred(), &dir.path().join("db.sqlite"));
        let err = area(&config, "people", None, &SchemaRegistry::new()).await.err().expect("expected an error");
        assert!(matches!(&*err, ErrorKind::Unsupported(_)));
    }

    #[tokio::test]
    async fn test_sqlite_store_creates_database() {
        let dir = TempDir::new().unwrap();
        let database = dir.path().join("nested").join("db.sqlite");
        let config = config(declared(StoreKind::Sqlite), &database);
        let (area, _) = area(&config, "people", None, &SchemaRegistry::new()).await.unwrap();
        area.reset().await.unwrap();
        area.commit().await.unwrap();
        assert!(database.exists());
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let database = dir.path().join("db.sqlite");
        let file = lines(&[r#"{"Entry #": "1", "Age": "3", "Date Joined": "2014/11/05"}"#]);

        let writable = config(declared(StoreKind::Sqlite), &database);
        let (live, _) = area(&writable, "people", None, &SchemaRegistry::new()).await.unwrap();
        live.reset().await.unwrap();
        live.commit().await.unwrap();

        let dry = config(AreaConfig { dry_run: true, ..declared(StoreKind::Sqlite) }, &database);
        let (dry, source) = area(&dry, "people", Some(file.path()), &SchemaRegistry::new()).await.unwrap();
        let source = source.unwrap();
        dry.initialize().await.unwrap();
        assert_eq!(dry.import_source(source.as_ref()).await.unwrap(), 1);
        dry.commit().await.unwrap();

        let item = source.first().await.unwrap().unwrap();
        assert_eq!(live.get(&item).await.unwrap(), None);
    }

    #[cfg(not(feature = "kv"))]
    #[tokio::test]
    async fn test_kv_requires_feature() {
        let dir = TempDir::new().unwrap();
        let config = config(declared(StoreKind::Kv), &dir.path().join("db.sqlite"));
        let err = area(&config, "people", None, &SchemaRegistry::new()).await.err().expect("expected an error");
        assert!(matches!(&*err, ErrorKind::Unsupported(_)));
    }

    #[tokio::test]
    async fn test_unknown_area() {
        let dir = TempDir::new().unwrap();
        let config = config(inferred(), &dir.path().join("db.sqlite"));
        let err = area(&config, "nobody", None, &SchemaRegistry::new()).await.err().expect("expected an error");
        assert_eq!(*err, ErrorKind::Config);
    }
}
