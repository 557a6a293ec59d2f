//! SQLite backing store.
//!
//! Each area gets its own table: an identifier column plus one untyped
//! column per schema field, so values keep the storage class they were
//! written with (integers, text, blobs). Date/times are written as text in
//! [`DATETIME_FORMAT`]. Initialized areas are recorded in the migrated
//! `recon_areas` table; see [`Database`].
//!
//! Whether the area is initialized is remembered after the first check. If
//! another store on the same database clears the area, the next failing
//! statement re-checks and reports [`NotInitialized`](ErrorKind::NotInitialized).
//!
//! Writes open a transaction lazily; they become visible to other
//! connections on [`commit`](Store::commit) and are discarded by
//! [`rollback`](Store::rollback). Reads issued while a transaction is open
//! go through it, so the store always sees its own writes.

use super::error::{Error, ErrorKind, Result};
use super::{Store, item_id};
use crate::db::{self, AreaRecord, Database};
use async_trait::async_trait;
use exn::{Exn, ResultExt};
use recon_model::{CachedItem, DATETIME_FORMAT, Field, FieldKind, Schema, Value};
use sqlx::pool::PoolConnection;
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Row, Sqlite, SqliteConnection, Transaction, TypeInfo, ValueRef};
use std::collections::HashSet;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use time::PrimitiveDateTime;
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};
use tracing::instrument;

const ID_COLUMN: &str = "_recon_id";
const TABLE_PREFIX: &str = "recon_area_";

type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

fn table_name(area: &str) -> String {
    let sanitized: String = area
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    format!("{TABLE_PREFIX}{sanitized}")
}

enum Connection<'a> {
    Transaction(MappedMutexGuard<'a, Transaction<'static, Sqlite>>),
    Pool(PoolConnection<Sqlite>),
}

impl Deref for Connection<'_> {
    type Target = SqliteConnection;

    fn deref(&self) -> &SqliteConnection {
        match self {
            Self::Transaction(tx) => &***tx,
            Self::Pool(conn) => &**conn,
        }
    }
}

impl DerefMut for Connection<'_> {
    fn deref_mut(&mut self) -> &mut SqliteConnection {
        match self {
            Self::Transaction(tx) => &mut ***tx,
            Self::Pool(conn) => &mut **conn,
        }
    }
}

pub struct SqliteStore {
    name: String,
    table: String,
    schema: Arc<Schema>,
    db: Database,
    ready: AtomicBool,
    transaction: Mutex<Option<Transaction<'static, Sqlite>>>,
}

impl SqliteStore {
    pub fn new(db: Database, name: impl Into<String>, schema: Arc<Schema>) -> Self {
        let name = name.into();
        Self {
            table: table_name(&name),
            name,
            schema,
            db,
            ready: AtomicBool::new(false),
            transaction: Mutex::new(None),
        }
    }

    /// Name of the table holding this area's entries.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// The open transaction if there is one, beginning one first when
    /// `write` is set; otherwise a plain pooled connection.
    async fn connection(&self, write: bool) -> Result<Connection<'_>> {
        let mut guard = self.transaction.lock().await;
        if write && guard.is_none() {
            tracing::debug!(table = %self.table, "Beginning transaction");
            *guard = Some(self.db.pool().begin().await.or_raise(|| ErrorKind::Database)?);
        }
        let guard = match MutexGuard::try_map(guard, Option::as_mut) {
            Ok(tx) => return Ok(Connection::Transaction(tx)),
            Err(guard) => guard,
        };
        drop(guard);
        let conn = self.db.pool().acquire().await.or_raise(|| ErrorKind::Database)?;
        Ok(Connection::Pool(conn))
    }

    async fn ensure_ready(&self, conn: &mut SqliteConnection) -> Result<()> {
        if self.ready.load(Ordering::Acquire) {
            return Ok(());
        }
        if db::recorded(conn, &self.name).await?.is_none() {
            exn::bail!(ErrorKind::NotInitialized(self.name.clone()));
        }
        self.ready.store(true, Ordering::Release);
        Ok(())
    }

    /// Raise a failed statement, as [`ErrorKind::NotInitialized`] if the
    /// area has been cleared since it was last checked.
    async fn raise(&self, conn: &mut SqliteConnection, err: sqlx::Error) -> Error {
        self.ready.store(false, Ordering::Release);
        let kind = match self.ensure_ready(conn).await {
            Err(e) if matches!(&*e, ErrorKind::NotInitialized(_)) => ErrorKind::NotInitialized(self.name.clone()),
            _ => ErrorKind::Database,
        };
        Exn::from(err).raise(kind)
    }

    fn columns(&self) -> Vec<String> {
        self.schema.fields().iter().map(|field| quote(&field.name)).collect()
    }

    fn decode(&self, row: &SqliteRow) -> Result<CachedItem> {
        let mut item = CachedItem::new(self.schema.clone());
        for (index, field) in self.schema.fields().iter().enumerate() {
            let value = decode_value(row, index, field)?;
            item.set(&field.name, value).or_raise(|| ErrorKind::InvalidData(field.name.clone()))?;
        }
        Ok(item)
    }

    fn bind_fields<'q>(&self, mut query: SqliteQuery<'q>, item: &CachedItem) -> Result<SqliteQuery<'q>> {
        for field in self.schema.fields() {
            query = bind(query, &field.name, item.get(&field.name).unwrap_or(&Value::Unset))?;
        }
        Ok(query)
    }
}

fn bind<'q>(query: SqliteQuery<'q>, field: &str, value: &Value) -> Result<SqliteQuery<'q>> {
    Ok(match value {
        Value::Unset => query.bind(None::<String>),
        Value::Int(int) => query.bind(*int),
        Value::Text(text) => query.bind(text.clone()),
        Value::Bytes(bytes) => query.bind(bytes.clone()),
        Value::DateTime(datetime) => query.bind(
            datetime
                .format(DATETIME_FORMAT)
                .or_raise(|| ErrorKind::InvalidData(field.to_string()))?,
        ),
    })
}

fn decode_value(row: &SqliteRow, index: usize, field: &Field) -> Result<Value> {
    let invalid = || ErrorKind::InvalidData(field.name.clone());
    let raw = row.try_get_raw(index).or_raise(invalid)?;
    if raw.is_null() {
        return Ok(Value::Unset);
    }
    let storage = raw.type_info().name().to_string();
    Ok(match storage.as_str() {
        "INTEGER" => Value::Int(row.try_get(index).or_raise(invalid)?),
        "BLOB" => Value::Bytes(row.try_get(index).or_raise(invalid)?),
        "REAL" => Value::Text(row.try_get::<f64, _>(index).or_raise(invalid)?.to_string()),
        _ => {
            let text: String = row.try_get(index).or_raise(invalid)?;
            match field.kind {
                FieldKind::DateTime => Value::DateTime(PrimitiveDateTime::parse(&text, DATETIME_FORMAT).or_raise(invalid)?),
                _ => Value::Text(text),
            }
        },
    })
}

#[async_trait]
impl Store for SqliteStore {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self), fields(area = %self.name, table = %self.table))]
    async fn initialize(&self) -> Result<()> {
        let mut conn = self.connection(true).await?;
        let columns: String = self.columns().iter().map(|column| format!(", {column}")).collect();
        let create = format!(
            "CREATE TABLE IF NOT EXISTS {} ({} TEXT PRIMARY KEY NOT NULL{columns})",
            quote(&self.table),
            quote(ID_COLUMN),
        );
        sqlx::query(&create).execute(&mut *conn).await.or_raise(|| ErrorKind::Database)?;

        let fields = self.schema.fields().iter().map(|field| field.name.as_str()).collect::<Vec<_>>().join(",");
        match db::recorded(&mut conn, &self.name).await? {
            Some(recorded) if recorded.fields != fields => {
                let recorded = recorded.fields;
                tracing::warn!(%recorded, %fields, "Area table was created for different fields; reset the area to rebuild it");
            },
            Some(_) => {},
            None => {
                let record = AreaRecord {
                    name: self.name.clone(),
                    table_name: self.table.clone(),
                    schema_name: self.schema.name().to_string(),
                    fields,
                };
                db::record(&mut conn, &record).await?;
                tracing::info!("Initialized cache area table");
            },
        }
        self.ready.store(true, Ordering::Release);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<CachedItem>> {
        let mut conn = self.connection(false).await?;
        self.ensure_ready(&mut conn).await?;
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = ?",
            self.columns().join(", "),
            quote(&self.table),
            quote(ID_COLUMN)
        );
        let row = match sqlx::query(&sql).bind(id).fetch_optional(&mut *conn).await {
            Ok(row) => row,
            Err(e) => return Err(self.raise(&mut conn, e).await),
        };
        row.map(|row| self.decode(&row)).transpose()
    }

    async fn insert(&self, item: &CachedItem) -> Result<()> {
        let id = item_id(item)?;
        let mut conn = self.connection(true).await?;
        self.ensure_ready(&mut conn).await?;
        let columns = self.columns();
        let sql = format!(
            "INSERT INTO {} ({}, {}) VALUES (?{})",
            quote(&self.table),
            quote(ID_COLUMN),
            columns.join(", "),
            ", ?".repeat(columns.len())
        );
        let query = self.bind_fields(sqlx::query(&sql).bind(id.clone()), item)?;
        if let Err(e) = query.execute(&mut *conn).await {
            if e.as_database_error().is_some_and(|e| e.is_unique_violation()) {
                exn::bail!(ErrorKind::AlreadyExists(id));
            }
            return Err(self.raise(&mut conn, e).await);
        }
        Ok(())
    }

    async fn update(&self, item: &CachedItem) -> Result<()> {
        let id = item_id(item)?;
        let mut conn = self.connection(true).await?;
        self.ensure_ready(&mut conn).await?;
        let assignments = self.columns().iter().map(|column| format!("{column} = ?")).collect::<Vec<_>>();
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?",
            quote(&self.table),
            assignments.join(", "),
            quote(ID_COLUMN)
        );
        let query = self.bind_fields(sqlx::query(&sql), item)?.bind(id.clone());
        let result = match query.execute(&mut *conn).await {
            Ok(result) => result,
            Err(e) => return Err(self.raise(&mut conn, e).await),
        };
        if result.rows_affected() == 0 {
            exn::bail!(ErrorKind::NotFound(id));
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut conn = self.connection(true).await?;
        self.ensure_ready(&mut conn).await?;
        let sql = format!("DELETE FROM {} WHERE {} = ?", quote(&self.table), quote(ID_COLUMN));
        let result = match sqlx::query(&sql).bind(id).execute(&mut *conn).await {
            Ok(result) => result,
            Err(e) => return Err(self.raise(&mut conn, e).await),
        };
        if result.rows_affected() == 0 {
            exn::bail!(ErrorKind::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn ids(&self) -> Result<HashSet<String>> {
        let mut conn = self.connection(false).await?;
        self.ensure_ready(&mut conn).await?;
        let sql = format!("SELECT {} FROM {}", quote(ID_COLUMN), quote(&self.table));
        match sqlx::query_scalar::<_, String>(&sql).fetch_all(&mut *conn).await {
            Ok(ids) => Ok(ids.into_iter().collect()),
            Err(e) => Err(self.raise(&mut conn, e).await),
        }
    }

    #[instrument(skip(self), fields(area = %self.name, table = %self.table))]
    async fn clear(&self) -> Result<()> {
        let mut conn = self.connection(true).await?;
        let drop = format!("DROP TABLE IF EXISTS {}", quote(&self.table));
        sqlx::query(&drop).execute(&mut *conn).await.or_raise(|| ErrorKind::Database)?;
        db::forget(&mut conn, &self.name).await?;
        self.ready.store(false, Ordering::Release);
        tracing::info!("Dropped cache area table");
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        let transaction = self.transaction.lock().await.take();
        if let Some(tx) = transaction {
            tx.commit().await.or_raise(|| ErrorKind::Database)?;
            tracing::debug!(table = %self.table, "Committed transaction");
        }
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        let transaction = self.transaction.lock().await.take();
        if let Some(tx) = transaction {
            tx.rollback().await.or_raise(|| ErrorKind::Database)?;
            // The rolled back writes may have included initialize or clear.
            self.ready.store(false, Ordering::Release);
            tracing::debug!(table = %self.table, "Rolled back transaction");
        }
        Ok(())
    }
}
