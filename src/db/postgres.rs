use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use std::time::Duration;
use tracing::{info, instrument};

use super::{EntryStore, StorageError};
use crate::model::Entry;

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS guestbook (
    id BIGSERIAL PRIMARY KEY,
    name VARCHAR(100) NOT NULL,
    message TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)";

const CREATE_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS guestbook_created_at_idx ON guestbook (created_at DESC, id DESC)";

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(
        host: &str,
        port: u16,
        database: &str,
        user: &str,
        password: &str,
    ) -> Result<Self, StorageError> {
        let options = PgConnectOptions::new()
            .host(host)
            .port(port)
            .database(database)
            .username(user)
            .password(password);
        let pool = pool_options()
            .connect_with(options)
            .await
            .map_err(StorageError::during("connect to postgres"))?;
        info!(host, port, database, "connected to postgres");
        Ok(Self::from_pool(pool))
    }

    pub async fn connect_url(url: &str) -> Result<Self, StorageError> {
        let pool = pool_options()
            .connect(url)
            .await
            .map_err(StorageError::during("connect to postgres"))?;
        Ok(Self::from_pool(pool))
    }
}

fn pool_options() -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(10))
}

/// Two instances racing on `CREATE TABLE IF NOT EXISTS` can still collide on
/// the catalog; the loser sees one of these codes.
fn is_concurrent_create(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => is_concurrent_create_code(db.code().as_deref()),
        _ => false,
    }
}

/// `42P07` duplicate_table, `23505` unique_violation on `pg_type`.
fn is_concurrent_create_code(code: Option<&str>) -> bool {
    matches!(code, Some("42P07") | Some("23505"))
}

async fn execute_ddl(pool: &PgPool, sql: &str) -> Result<(), StorageError> {
    match sqlx::query(sql).execute(pool).await {
        Ok(_) => Ok(()),
        Err(err) if is_concurrent_create(&err) => {
            info!("schema object created concurrently by another instance");
            Ok(())
        }
        Err(err) => Err(StorageError::during("create guestbook table")(err)),
    }
}

#[async_trait]
impl EntryStore for PgStore {
    #[instrument(skip_all)]
    async fn ensure_schema(&self) -> Result<(), StorageError> {
        execute_ddl(&self.pool, CREATE_TABLE).await?;
        execute_ddl(&self.pool, CREATE_INDEX).await?;
        info!("database initialized");
        Ok(())
    }

    #[instrument(skip_all)]
    async fn insert(&self, name: &str, message: &str) -> Result<Entry, StorageError> {
        sqlx::query_as::<_, Entry>(
            "INSERT INTO guestbook (name, message) VALUES ($1, $2) RETURNING id, name, message, created_at",
        )
        .bind(name)
        .bind(message)
        .fetch_one(&self.pool)
        .await
        .map_err(StorageError::during("insert entry"))
    }

    #[instrument(skip_all)]
    async fn list_all(&self) -> Result<Vec<Entry>, StorageError> {
        sqlx::query_as::<_, Entry>(
            "SELECT id, name, message, created_at FROM guestbook ORDER BY created_at DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::during("list entries"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_database_errors_are_not_races() {
        assert!(!is_concurrent_create(&sqlx::Error::RowNotFound));
        assert!(!is_concurrent_create(&sqlx::Error::PoolTimedOut));
    }

    #[test]
    fn duplicate_object_codes_count_as_created() {
        assert!(is_concurrent_create_code(Some("42P07")));
        assert!(is_concurrent_create_code(Some("23505")));
    }

    #[test]
    fn other_database_codes_still_fail() {
        assert!(!is_concurrent_create_code(Some("42501")));
        assert!(!is_concurrent_create_code(Some("08006")));
        assert!(!is_concurrent_create_code(None));
    }
}
