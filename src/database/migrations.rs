//! # Migration Runner
//!
//! Ordered, run-once SQL migrations tracked in a `schema_migrations` table.
//! The daemon applies pending migrations at startup before any worker runs;
//! re-running is a no-op.

use crate::error::Result;
use sqlx::sqlite::SqlitePool;
use tracing::{debug, info};

/// Ordered list of (name, sql) migrations. Names must be unique and are
/// recorded in `schema_migrations` once applied.
const MIGRATIONS: &[(&str, &str)] = &[
    (
        "0001_create_recordings",
        r#"
        CREATE TABLE IF NOT EXISTS recordings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            filename TEXT NOT NULL,
            transcript TEXT,
            soap_note TEXT,
            referral TEXT,
            letter TEXT,
            timestamp TEXT NOT NULL,
            processing_status TEXT NOT NULL DEFAULT 'pending',
            patient_name TEXT,
            duration_seconds REAL,
            provider TEXT,
            error_message TEXT
        )
        "#,
    ),
    (
        "0002_index_recordings_timestamp",
        "CREATE INDEX IF NOT EXISTS idx_recordings_timestamp ON recordings (timestamp DESC)",
    ),
    (
        "0003_index_recordings_status",
        "CREATE INDEX IF NOT EXISTS idx_recordings_status ON recordings (processing_status)",
    ),
];

/// Apply all pending migrations in order.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            name TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    let mut applied = 0usize;

    for (name, sql) in MIGRATIONS {
        let already_applied: Option<(String,)> =
            sqlx::query_as("SELECT name FROM schema_migrations WHERE name = ?1")
                .bind(name)
                .fetch_optional(pool)
                .await?;

        if already_applied.is_some() {
            debug!(migration = name, "Migration already applied");
            continue;
        }

        let mut tx = pool.begin().await?;
        sqlx::query(sql).execute(&mut *tx).await?;
        sqlx::query("INSERT INTO schema_migrations (name, applied_at) VALUES (?1, ?2)")
            .bind(name)
            .bind(chrono::Utc::now().to_rfc3339())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!(migration = name, "💾 Migration applied");
        applied += 1;
    }

    if applied > 0 {
        info!(applied = applied, total = MIGRATIONS.len(), "Migrations complete");
    }

    Ok(())
}
