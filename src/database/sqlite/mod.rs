mod models;
#[cfg(test)]
mod tests;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use tracing::debug;

pub use models::QueryRecord;

use crate::{RagError, Result};

const SCHEMA: &str = "\
CREATE TABLE IF NOT EXISTS query_log (
    id TEXT PRIMARY KEY,
    query_text TEXT NOT NULL,
    mode TEXT NOT NULL,
    response_time_ms INTEGER NOT NULL,
    chunk_count INTEGER NOT NULL,
    error TEXT,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_query_log_created_at ON query_log (created_at);
";

/// Append-only log of answered queries, kept in a local SQLite file.
///
/// Logging is best-effort at every call site: a failure here must never
/// fail the query that was being recorded.
#[derive(Debug, Clone)]
pub struct QueryLog {
    pool: SqlitePool,
}

impl QueryLog {
    /// Open (creating if needed) the log database at `path`.
    #[inline]
    pub async fn connect(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| RagError::Database(format!("Failed to open query log: {}", e)))?;

        let log = Self { pool };
        log.init_schema().await?;
        Ok(log)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| RagError::Database(format!("Failed to initialize schema: {}", e)))?;
        Ok(())
    }

    /// Record one completed (or failed) query.
    #[inline]
    pub async fn record(&self, entry: &QueryRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO query_log \
             (id, query_text, mode, response_time_ms, chunk_count, error, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.id)
        .bind(&entry.query_text)
        .bind(&entry.mode)
        .bind(entry.response_time_ms)
        .bind(entry.chunk_count)
        .bind(&entry.error)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| RagError::Database(format!("Failed to record query: {}", e)))?;

        debug!("Logged query {} ({})", entry.id, entry.mode);
        Ok(())
    }

    /// Most recent queries, newest first.
    #[inline]
    pub async fn recent(&self, limit: u32) -> Result<Vec<QueryRecord>> {
        sqlx::query_as::<_, QueryRecord>(
            "SELECT id, query_text, mode, response_time_ms, chunk_count, error, created_at \
             FROM query_log ORDER BY created_at DESC, id LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RagError::Database(format!("Failed to list queries: {}", e)))
    }

    /// Total number of logged queries.
    #[inline]
    pub async fn count(&self) -> Result<u64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM query_log")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| RagError::Database(format!("Failed to count queries: {}", e)))?;
        Ok(u64::try_from(row.0).unwrap_or(0))
    }
}
