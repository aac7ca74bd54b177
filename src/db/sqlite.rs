use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::{info, instrument};

use super::{EntryStore, StorageError};
use crate::model::Entry;

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS guestbook (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL CHECK (length(name) <= 100),
    message TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
)";

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let in_memory = is_memory_url(database_url);
        let normalized = prepare_sqlite_url(database_url);
        let mut options = SqliteConnectOptions::from_str(&normalized)
            .map_err(StorageError::during("parse sqlite url"))?
            .create_if_missing(true);
        if !in_memory {
            options = options
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Full);
        }
        let pool = pool_options(in_memory)
            .connect_with(options)
            .await
            .map_err(StorageError::during("open sqlite database"))?;
        Ok(Self::from_pool(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Every connection to `:memory:` is its own database, so an in-memory pool
/// holds exactly one connection and never recycles it.
fn pool_options(in_memory: bool) -> SqlitePoolOptions {
    if in_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(5)
    }
}

fn is_memory_url(url: &str) -> bool {
    url.starts_with("sqlite::memory") || url.contains("mode=memory")
}

/// For file-backed URLs, expand a leading `~/` and ensure the parent directory
/// exists. In-memory URLs pass through untouched.
fn prepare_sqlite_url(url: &str) -> String {
    let Some(rest) = url.strip_prefix("sqlite:") else {
        return url.to_string();
    };
    if is_memory_url(url) {
        return url.to_string();
    }
    let rest = rest.strip_prefix("//").unwrap_or(rest);
    let (path, query) = match rest.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (rest, None),
    };
    if path.is_empty() {
        return url.to_string();
    }

    let path = match (path.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(tail), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), tail),
        _ => path.to_string(),
    };
    if let Some(parent) = std::path::Path::new(&path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    match query {
        Some(q) => format!("sqlite://{path}?{q}"),
        None => format!("sqlite://{path}"),
    }
}

#[async_trait]
impl EntryStore for SqliteStore {
    #[instrument(skip_all)]
    async fn ensure_schema(&self) -> Result<(), StorageError> {
        sqlx::query(CREATE_TABLE)
            .execute(&self.pool)
            .await
            .map_err(StorageError::during("create guestbook table"))?;
        info!("database initialized");
        Ok(())
    }

    #[instrument(skip_all)]
    async fn insert(&self, name: &str, message: &str) -> Result<Entry, StorageError> {
        sqlx::query_as::<_, Entry>(
            "INSERT INTO guestbook (name, message) VALUES (?, ?) RETURNING id, name, message, created_at",
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
