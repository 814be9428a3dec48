//! Local database for leadflow-intake
//!
//! Holds the call log only; CRM leads live in the CRM store (see [`crate::crm`]).

pub mod call_log;

use leadflow_common::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Open (creating if needed) the local SQLite database and its tables
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // mode=rwc: read, write, create
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;
    init_tables(&pool).await?;

    Ok(pool)
}

/// Create the call log table if it does not exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS voice_recordings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            call_sid TEXT,
            recording_sid TEXT NOT NULL UNIQUE,
            recording_url TEXT,
            transcript TEXT,
            from_number TEXT,
            to_number TEXT,
            duration INTEGER,
            status TEXT NOT NULL DEFAULT 'received',
            customer_data TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_voice_recordings_created ON voice_recordings(created_at)")
        .execute(pool)
        .await?;

    tracing::info!("Database tables initialized (voice_recordings)");

    Ok(())
}
