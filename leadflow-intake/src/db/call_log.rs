//! Call log: one row per recording
//!
//! Telephony providers retry webhooks, so writes are keyed on `recording_sid`.

use chrono::Utc;
use leadflow_common::phone::normalize_phone;
use leadflow_common::{Error, Result};
use serde::Serialize;
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

/// Row to record for an incoming recording
#[derive(Debug, Clone, Default)]
pub struct NewCallLog {
    pub call_sid: Option<String>,
    pub recording_sid: String,
    pub recording_url: Option<String>,
    pub transcript: Option<String>,
    pub from_number: Option<String>,
    pub to_number: Option<String>,
    pub duration: Option<i64>,
    pub status: String,
    pub customer_data: Option<Value>,
}

/// Stored call log row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallLogEntry {
    pub id: i64,
    pub call_sid: Option<String>,
    pub recording_sid: String,
    pub recording_url: Option<String>,
    pub transcript: Option<String>,
    pub from_number: Option<String>,
    pub to_number: Option<String>,
    pub duration: Option<i64>,
    pub status: String,
    pub customer_data: Option<Value>,
    pub created_at: String,
}

/// Canonical form when the number parses, trimmed original otherwise
fn normalize_number(raw: Option<&str>) -> Option<String> {
    let raw = raw.map(str::trim).filter(|r| !r.is_empty())?;
    Some(normalize_phone(raw).unwrap_or_else(|_| raw.to_string()))
}

/// Insert or refresh the row for `entry.recording_sid`; returns the row id
pub async fn upsert(pool: &SqlitePool, entry: &NewCallLog) -> Result<i64> {
    let customer_data = entry
        .customer_data
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| Error::Internal(format!("Failed to serialize customer data: {}", e)))?;
    let created_at = Utc::now().to_rfc3339();

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO voice_recordings (
            call_sid, recording_sid, recording_url, transcript,
            from_number, to_number, duration, status, customer_data, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(recording_sid) DO UPDATE SET
            call_sid = COALESCE(excluded.call_sid, call_sid),
            recording_url = COALESCE(excluded.recording_url, recording_url),
            transcript = COALESCE(excluded.transcript, transcript),
            from_number = COALESCE(excluded.from_number, from_number),
            to_number = COALESCE(excluded.to_number, to_number),
            duration = COALESCE(excluded.duration, duration),
            status = excluded.status,
            customer_data = COALESCE(excluded.customer_data, customer_data)
        RETURNING id
        "#,
    )
    .bind(&entry.call_sid)
    .bind(&entry.recording_sid)
    .bind(&entry.recording_url)
    .bind(&entry.transcript)
    .bind(normalize_number(entry.from_number.as_deref()))
    .bind(normalize_number(entry.to_number.as_deref()))
    .bind(entry.duration)
    .bind(&entry.status)
    .bind(customer_data)
    .bind(created_at)
    .fetch_one(pool)
    .await?;

    Ok(id)
}

fn entry_from_row(row: &SqliteRow) -> Result<CallLogEntry> {
    let customer_data: Option<String> = row.try_get("customer_data")?;
    let customer_data = customer_data
        .map(|raw| serde_json::from_str(&raw))
        .transpose()
        .map_err(|e| Error::Internal(format!("Failed to parse customer data: {}", e)))?;

    Ok(CallLogEntry {
        id: row.try_get("id")?,
        call_sid: row.try_get("call_sid")?,
        recording_sid: row.try_get("recording_sid")?,
        recording_url: row.try_get("recording_url")?,
        transcript: row.try_get("transcript")?,
        from_number: row.try_get("from_number")?,
        to_number: row.try_get("to_number")?,
        duration: row.try_get("duration")?,
        status: row.try_get("status")?,
        customer_data,
        created_at: row.try_get("created_at")?,
    })
}

/// Newest rows first
pub async fn list(pool: &SqlitePool, limit: i64, offset: i64) -> Result<Vec<CallLogEntry>> {
    let rows = sqlx::query(
        r#"
        SELECT id, call_sid, recording_sid, recording_url, transcript, from_number,
               to_number, duration, status, customer_data, created_at
        FROM voice_recordings
        ORDER BY id DESC
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    rows.iter().map(entry_from_row).collect()
}

pub async fn get_by_recording_sid(pool: &SqlitePool, recording_sid: &str) -> Result<Option<CallLogEntry>> {
    let row = sqlx::query(
        r#"
        SELECT id, call_sid, recording_sid, recording_url, transcript, from_number,
               to_number, duration, status, customer_data, created_at
        FROM voice_recordings
        WHERE recording_sid = ?
        "#,
    )
    .bind(recording_sid)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(entry_from_row).transpose()
}

pub async fn count(pool: &SqlitePool) -> Result<i64> {
    Ok(sqlx::query_scalar("SELECT COUNT(*) FROM voice_recordings")
        .fetch_one(pool)
        .await?)
}
