use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::orchestrator::QueryMode;

/// One row of the query log.
#[derive(Debug, Clone, FromRow, PartialEq, Eq)]
pub struct QueryRecord {
    pub id: String,
    pub query_text: String,
    pub mode: String,
    pub response_time_ms: i64,
    pub chunk_count: i64,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl QueryRecord {
    #[inline]
    pub fn new(
        query_text: impl Into<String>,
        mode: QueryMode,
        response_time_ms: i64,
        chunk_count: i64,
        error: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            query_text: query_text.into(),
            mode: mode.as_str().to_string(),
            response_time_ms,
            chunk_count,
            error,
            created_at: Utc::now(),
        }
    }
}
