//! # Database Layer
//!
//! SQLite access for the recording store: pool construction, ordered
//! migrations, allowlist-validated dynamic column updates, and a busy-retry
//! wrapper for `database is locked` contention.

pub mod migrations;

use crate::config::DatabaseConfig;
use crate::constants::DocumentKind;
use crate::error::{Result, ScribeError};
use crate::models::{NewRecording, Recording};
use crate::resilience::{retry_api_call, RetryPolicy};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Columns that dynamic update statements may reference. Anything else is
/// rejected before SQL is constructed, closing the injection path through
/// field names.
pub const UPDATABLE_FIELDS: &[&str] = &[
    "transcript",
    "soap_note",
    "referral",
    "letter",
    "processing_status",
    "patient_name",
    "error_message",
];

/// Validate a dynamic column reference against the allowlist.
pub fn validate_field(field: &str) -> Result<()> {
    if UPDATABLE_FIELDS.contains(&field) {
        Ok(())
    } else {
        Err(ScribeError::Validation(format!(
            "Field '{field}' is not an updatable recording column"
        )))
    }
}

/// Open the SQLite pool, creating the database file if needed.
pub async fn connect(config: &DatabaseConfig, database_path: &Path) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(database_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(options)
        .await?;

    info!(
        path = %database_path.display(),
        max_connections = config.max_connections,
        "💾 Database pool opened"
    );

    Ok(pool)
}

/// Retry a database write through the short-backoff policy when SQLite
/// reports lock contention. Other failures propagate immediately.
pub async fn with_busy_retry<F, T, Fut>(operation_name: &str, operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    retry_api_call(
        &RetryPolicy::for_database_writes(),
        operation_name,
        None,
        operation,
    )
    .await
}

/// Repository over the `recordings` table
#[derive(Debug, Clone)]
pub struct RecordingStore {
    pool: SqlitePool,
}

#[async_trait::async_trait]
impl crate::queue::RecordingLookup for RecordingStore {
    async fn find(&self, recording_id: i64) -> Result<Recording> {
        self.find_by_id(recording_id).await
    }
}

impl RecordingStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert a new recording with `pending` status. Returns the row id.
    pub async fn create(&self, new_recording: &NewRecording) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO recordings (filename, timestamp, processing_status, patient_name, duration_seconds)
            VALUES (?1, ?2, 'pending', ?3, ?4)
            "#,
        )
        .bind(&new_recording.filename)
        .bind(chrono::Utc::now())
        .bind(&new_recording.patient_name)
        .bind(new_recording.duration_seconds)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        debug!(recording_id = id, filename = %new_recording.filename, "Recording created");
        Ok(id)
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Recording> {
        let recording = sqlx::query_as::<_, Recording>(
            r#"
            SELECT id, filename, transcript, soap_note, referral, letter,
                   timestamp, processing_status, patient_name, duration_seconds,
                   provider, error_message
            FROM recordings
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        recording.ok_or_else(|| ScribeError::Database(format!("Recording {id} not found")))
    }

    /// Recent recordings, newest first.
    pub async fn list_recent(&self, limit: i64) -> Result<Vec<Recording>> {
        let recordings = sqlx::query_as::<_, Recording>(
            r#"
            SELECT id, filename, transcript, soap_note, referral, letter,
                   timestamp, processing_status, patient_name, duration_seconds,
                   provider, error_message
            FROM recordings
            ORDER BY timestamp DESC
            LIMIT ?1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(recordings)
    }

    /// Update a single column by name. The field is validated against the
    /// allowlist before being interpolated into the statement.
    pub async fn update_field(&self, id: i64, field: &str, value: Option<&str>) -> Result<()> {
        validate_field(field)?;

        let sql = format!("UPDATE recordings SET {field} = ?1 WHERE id = ?2");
        let result = with_busy_retry("update_recording_field", || async {
            let rows = sqlx::query(&sql)
                .bind(value)
                .bind(id)
                .execute(&self.pool)
                .await?;
            Ok(rows.rows_affected())
        })
        .await?;

        if result == 0 {
            return Err(ScribeError::Database(format!("Recording {id} not found")));
        }

        debug!(recording_id = id, field = field, "Recording field updated");
        Ok(())
    }

    pub async fn update_transcript(&self, id: i64, transcript: &str) -> Result<()> {
        self.update_field(id, "transcript", Some(transcript)).await
    }

    pub async fn update_document(&self, id: i64, kind: DocumentKind, text: &str) -> Result<()> {
        self.update_field(id, kind.column(), Some(text)).await
    }

    pub async fn set_processing_status(&self, id: i64, status: &str) -> Result<()> {
        self.update_field(id, "processing_status", Some(status))
            .await
    }

    pub async fn set_error_message(&self, id: i64, message: Option<&str>) -> Result<()> {
        self.update_field(id, "error_message", message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::migrations::run_migrations;

    async fn test_store() -> RecordingStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        run_migrations(&pool).await.unwrap();
        RecordingStore::new(pool)
    }

    fn sample_recording() -> NewRecording {
        NewRecording {
            filename: "visit_001.wav".to_string(),
            patient_name: Some("Doe, Jane".to_string()),
            duration_seconds: Some(31.2),
        }
    }

    #[tokio::test]
    async fn test_create_and_fetch_recording() {
        let store = test_store().await;

        let id = store.create(&sample_recording()).await.unwrap();
        let recording = store.find_by_id(id).await.unwrap();

        assert_eq!(recording.filename, "visit_001.wav");
        assert_eq!(recording.processing_status, "pending");
        assert!(recording.transcript.is_none());
    }

    #[tokio::test]
    async fn test_update_document_columns() {
        let store = test_store().await;
        let id = store.create(&sample_recording()).await.unwrap();

        store.update_transcript(id, "patient presents with").await.unwrap();
        store
            .update_document(id, DocumentKind::SoapNote, "S: cough\nO: clear")
            .await
            .unwrap();

        let recording = store.find_by_id(id).await.unwrap();
        assert!(recording.has_transcript());
        assert!(recording.has_document(DocumentKind::SoapNote));
        assert!(!recording.has_document(DocumentKind::Referral));
    }

    #[tokio::test]
    async fn test_unknown_field_rejected() {
        let store = test_store().await;
        let id = store.create(&sample_recording()).await.unwrap();

        let result = store
            .update_field(id, "id; DROP TABLE recordings; --", Some("x"))
            .await;
        assert!(matches!(result, Err(ScribeError::Validation(_))));

        // Table is intact afterwards.
        assert!(store.find_by_id(id).await.is_ok());
    }

    #[tokio::test]
    async fn test_update_missing_recording_errors() {
        let store = test_store().await;
        let result = store.set_processing_status(9999, "completed").await;
        assert!(matches!(result, Err(ScribeError::Database(_))));
    }

    #[tokio::test]
    async fn test_list_recent_orders_newest_first() {
        let store = test_store().await;
        let _first = store.create(&sample_recording()).await.unwrap();
        let second = store
            .create(&NewRecording {
                filename: "visit_002.wav".to_string(),
                patient_name: None,
                duration_seconds: None,
            })
            .await
            .unwrap();

        let recent = store.list_recent(10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].id, second);
    }
}
