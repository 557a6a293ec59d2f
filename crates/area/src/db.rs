//! The SQLite database behind [`SqliteStore`](crate::store::SqliteStore).
//!
//! One database file holds any number of cache areas. Every area gets its
//! own entry table, created by `initialize` and dropped by `clear`; the
//! migrated `recon_areas` table records which areas currently exist, what
//! their table is called and which fields it was created with. An area is
//! initialized exactly when it has a row there, so that row is what stores
//! consult before touching an entry table.

use crate::store::error::{ErrorKind, Result};
use exn::ResultExt;
use sqlx::pool::PoolConnectionMetadata;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{FromRow, SqliteConnection};
use std::path::Path;
use std::time::Duration;
use tracing::instrument;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
const MAX_CONNECTIONS: u32 = 5;
/// A long import holds the write lock for its whole transaction.
const BUSY_TIMEOUT: Duration = Duration::from_millis(1500);

/// A row of `recon_areas`: an initialized area and the table holding its
/// entries.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct AreaRecord {
    pub name: String,
    pub table_name: String,
    pub schema_name: String,
    /// Comma separated field names the table was created with.
    pub fields: String,
}

/// Pool over one cache database, shared by every area stored in it.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    async fn new(options: SqliteConnectOptions, max: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .after_connect(|conn, meta| Box::pin(async move { Self::tune(conn, meta).await }))
            .max_connections(max)
            .connect_with(options)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Open (creating if needed) the cache database at `path` and bring the
    /// bookkeeping table up to date.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let options = Self::options().filename(path.as_ref()).create_if_missing(true);
        Self::new(options, MAX_CONNECTIONS).await
    }

    /// A private in-memory cache database.
    ///
    /// The pool holds a single connection, since every connection to
    /// `:memory:` would otherwise see its own empty database.
    pub async fn connect_in_memory() -> Result<Self> {
        Self::new(Self::options().filename(":memory:"), 1).await
    }

    fn options() -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(BUSY_TIMEOUT)
    }

    async fn tune(conn: &mut SqliteConnection, _meta: PoolConnectionMetadata) -> sqlx::Result<()> {
        sqlx::query("PRAGMA cache_size = -8192; PRAGMA temp_store = MEMORY;")
            .execute(conn)
            .await?;
        Ok(())
    }

    #[instrument("migrating cache database", skip(self))]
    async fn migrate(&self) -> Result<()> {
        MIGRATOR.run(&self.pool).await.or_raise(|| ErrorKind::Migration)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Every initialized area, by name.
    pub async fn areas(&self) -> Result<Vec<AreaRecord>> {
        sqlx::query_as("SELECT name, table_name, schema_name, fields FROM recon_areas ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)
    }

    /// Wait for every connection to be returned, then close the pool.
    pub async fn close(&self) {
        _ = sqlx::query("PRAGMA optimize").execute(&self.pool).await;
        self.pool.close().await;
    }
}

/// The bookkeeping row for `area`, if it is initialized.
pub(crate) async fn recorded(conn: &mut SqliteConnection, area: &str) -> Result<Option<AreaRecord>> {
    sqlx::query_as("SELECT name, table_name, schema_name, fields FROM recon_areas WHERE name = ?")
        .bind(area)
        .fetch_optional(conn)
        .await
        .or_raise(|| ErrorKind::Database)
}

pub(crate) async fn record(conn: &mut SqliteConnection, area: &AreaRecord) -> Result<()> {
    sqlx::query("INSERT INTO recon_areas (name, table_name, schema_name, fields) VALUES (?, ?, ?, ?)")
        .bind(&area.name)
        .bind(&area.table_name)
        .bind(&area.schema_name)
        .bind(&area.fields)
        .execute(conn)
        .await
        .or_raise(|| ErrorKind::Database)?;
    Ok(())
}

pub(crate) async fn forget(conn: &mut SqliteConnection, area: &str) -> Result<()> {
    sqlx::query("DELETE FROM recon_areas WHERE name = ?")
        .bind(area)
        .execute(conn)
        .await
        .or_raise(|| ErrorKind::Database)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn posts() -> AreaRecord {
        AreaRecord {
            name: "posts".to_string(),
            table_name: "recon_area_posts".to_string(),
            schema_name: "post".to_string(),
            fields: "id,title".to_string(),
        }
    }

    #[tokio::test]
    async fn test_bookkeeping() {
        let db = Database::connect_in_memory().await.unwrap();
        assert!(db.areas().await.unwrap().is_empty());

        let mut conn = db.pool().acquire().await.unwrap();
        assert_eq!(recorded(&mut conn, "posts").await.unwrap(), None);
        record(&mut conn, &posts()).await.unwrap();
        assert_eq!(recorded(&mut conn, "posts").await.unwrap(), Some(posts()));
        assert!(record(&mut conn, &posts()).await.is_err());
        drop(conn);
        assert_eq!(db.areas().await.unwrap(), [posts()]);

        let mut conn = db.pool().acquire().await.unwrap();
        forget(&mut conn, "posts").await.unwrap();
        forget(&mut conn, "posts").await.unwrap();
        drop(conn);
        assert!(db.areas().await.unwrap().is_empty());
        db.close().await;
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let db = Database::connect_in_memory().await.unwrap();
        db.migrate().await.unwrap();
        assert!(db.areas().await.unwrap().is_empty());
        db.close().await;
    }

    #[tokio::test]
    async fn test_connect_creates_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("cache.sqlite");
        let db = Database::connect(&path).await.unwrap();
        assert!(path.exists());
        let (mode,): (String,) = sqlx::query_as("PRAGMA journal_mode").fetch_one(db.pool()).await.unwrap();
        assert_eq!(mode, "wal");
        db.close().await;
    }
}
