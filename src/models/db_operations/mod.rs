use chrono::{DateTime, SecondsFormat, Utc};
use r2d2_sqlite::SqliteConnectionManager;
use redb::{CommitError, StorageError, TableError, TransactionError};
use std::path::Path;
use thiserror::Error;

pub mod blog_db_operations;
pub mod catalog_db_operations;
pub mod submissions_db_operations;
pub mod users_db_operations;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Rusqlite error: {0}")]
    Rusqlite(#[from] rusqlite::Error),
    #[error("R2D2 pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("Redb storage error: {0}")]
    RedbStorage(#[from] StorageError),
    #[error("Redb transaction error: {0}")]
    RedbTransaction(#[from] TransactionError),
    #[error("Redb table error: {0}")]
    RedbTable(#[from] TableError),
    #[error("Redb commit error: {0}")]
    RedbCommit(#[from] CommitError),
    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("UUID parse error: {0}")]
    Uuid(#[from] uuid::Error),
    #[error("Item not found in database: {0}")]
    NotFound(String),
}

/// Connection manager for the content database. Foreign keys are enforced on
/// every pooled connection.
pub fn connection_manager(path: &Path) -> SqliteConnectionManager {
    SqliteConnectionManager::file(path).with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"))
}

/// Fixed-width RFC 3339 so that text ordering in SQLite is chronological.
pub(crate) fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(column: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e)))
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::setup::db_setup;
    use crate::DbPool;
    use r2d2::Pool;
    use r2d2_sqlite::SqliteConnectionManager;

    /// Single-connection in-memory pool with the content schema applied.
    pub fn content_pool() -> DbPool {
        let manager = SqliteConnectionManager::memory()
            .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
        let pool = Pool::builder().max_size(1).build(manager).unwrap();
        {
            let mut conn = pool.get().unwrap();
            db_setup::setup_content_db(&mut conn).unwrap();
        }
        pool
    }
}
