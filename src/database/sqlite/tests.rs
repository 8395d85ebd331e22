use super::*;
use crate::orchestrator::QueryMode;
use tempfile::TempDir;

async fn open_log(dir: &TempDir) -> QueryLog {
    QueryLog::connect(&dir.path().join("queries.db"))
        .await
        .expect("open query log")
}

#[tokio::test]
async fn connect_creates_the_database_file() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("queries.db");
    let _log = QueryLog::connect(&path).await.expect("connect");
    assert!(path.exists());
}

#[tokio::test]
async fn recorded_queries_round_trip() {
    let dir = TempDir::new().expect("temp dir");
    let log = open_log(&dir).await;

    let entry = QueryRecord::new(
        "What is inverse kinematics?",
        QueryMode::Global,
        152,
        5,
        None,
    );
    log.record(&entry).await.expect("record");

    let rows = log.recent(10).await.expect("recent");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, entry.id);
    assert_eq!(rows[0].query_text, "What is inverse kinematics?");
    assert_eq!(rows[0].mode, "global");
    assert_eq!(rows[0].response_time_ms, 152);
    assert_eq!(rows[0].chunk_count, 5);
    assert!(rows[0].error.is_none());
}

#[tokio::test]
async fn recent_returns_newest_first_and_respects_limit() {
    let dir = TempDir::new().expect("temp dir");
    let log = open_log(&dir).await;

    for i in 0..5 {
        let mut entry = QueryRecord::new(
            format!("question {}", i),
            QueryMode::Global,
            100 + i,
            3,
            None,
        );
        // Distinct timestamps so ordering is deterministic.
        entry.created_at += chrono::Duration::seconds(i);
        log.record(&entry).await.expect("record");
    }

    let rows = log.recent(3).await.expect("recent");
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].query_text, "question 4");
    assert_eq!(rows[1].query_text, "question 3");
    assert_eq!(rows[2].query_text, "question 2");
}

#[tokio::test]
async fn failed_queries_keep_their_error_text() {
    let dir = TempDir::new().expect("temp dir");
    let log = open_log(&dir).await;

    let entry = QueryRecord::new(
        "What color is chapter nine?",
        QueryMode::SelectedText,
        47,
        0,
        Some("Generation service error: timed out".to_string()),
    );
    log.record(&entry).await.expect("record");

    let rows = log.recent(1).await.expect("recent");
    assert_eq!(rows[0].mode, "selected-text");
    assert_eq!(
        rows[0].error.as_deref(),
        Some("Generation service error: timed out")
    );
}

#[tokio::test]
async fn count_tracks_inserts() {
    let dir = TempDir::new().expect("temp dir");
    let log = open_log(&dir).await;

    assert_eq!(log.count().await.expect("count"), 0);
    for _ in 0..3 {
        let entry = QueryRecord::new("q", QueryMode::Global, 10, 1, None);
        log.record(&entry).await.expect("record");
    }
    assert_eq!(log.count().await.expect("count"), 3);
}

#[tokio::test]
async fn schema_creation_is_idempotent() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("queries.db");

    let first = QueryLog::connect(&path).await.expect("first connect");
    let entry = QueryRecord::new("persisted", QueryMode::Global, 10, 1, None);
    first.record(&entry).await.expect("record");
    drop(first);

    let second = QueryLog::connect(&path).await.expect("second connect");
    let rows = second.recent(10).await.expect("recent");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].query_text, "persisted");
}
