//! Durable, append-only storage of guestbook entries.
//!
//! - `postgres`: the production backend.
//! - `sqlite`: file or in-memory backend for local runs and tests.
//!
//! Callers work against `EntryStore` and never retry internally.

pub mod postgres;
pub mod sqlite;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::config::DatabaseTarget;
use crate::model::Entry;

pub use postgres::PgStore;
pub use sqlite::SqliteStore;

pub const TABLE: &str = "guestbook";

/// Transport or backend failure, wrapping the underlying driver error.
#[derive(Debug, Error)]
#[error("{op} failed: {source}")]
pub struct StorageError {
    pub op: &'static str,
    #[source]
    pub source: sqlx::Error,
}

impl StorageError {
    pub(crate) fn during(op: &'static str) -> impl FnOnce(sqlx::Error) -> Self {
        move |source| Self { op, source }
    }
}

#[async_trait]
pub trait EntryStore: Send + Sync {
    /// Create the table if absent. Safe to call from several instances at once.
    async fn ensure_schema(&self) -> Result<(), StorageError>;

    /// Durably write one entry and return the stored row, including the
    /// server-assigned `id` and `created_at`.
    async fn insert(&self, name: &str, message: &str) -> Result<Entry, StorageError>;

    /// All entries, newest first. Ties on `created_at` fall back to `id`.
    async fn list_all(&self) -> Result<Vec<Entry>, StorageError>;
}

/// Open the store described by `target` and make sure its table exists.
pub async fn connect(target: &DatabaseTarget) -> Result<Arc<dyn EntryStore>, StorageError> {
    let store: Arc<dyn EntryStore> = match target {
        DatabaseTarget::Url(url) if url.starts_with("sqlite:") => {
            Arc::new(SqliteStore::connect(url).await?)
        }
        DatabaseTarget::Url(url) => Arc::new(PgStore::connect_url(url).await?),
        DatabaseTarget::Postgres {
            host,
            port,
            name,
            user,
            password,
        } => Arc::new(PgStore::connect(host, *port, name, user, password).await?),
    };
    store.ensure_schema().await?;
    Ok(store)
}
