//! Telephony endpoints: recording callback and call log listing

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::db::call_log::{self, CallLogEntry};
use crate::error::{ApiError, ApiResult};
use crate::services::{CallIngestionResponse, RecordingWebhook};
use crate::AppState;

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 200;

/// POST /voice/recording
pub async fn recording_callback(
    State(state): State<AppState>,
    Form(webhook): Form<RecordingWebhook>,
) -> ApiResult<Json<CallIngestionResponse>> {
    let response = state.ingestion.process_recording(webhook).await?;
    Ok(Json(response))
}

#[derive(Debug, Default, Deserialize)]
pub struct RecordingsQuery {
    pub token: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct RecordingsResponse {
    pub recordings: Vec<CallLogEntry>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Listing is open when no token is configured
fn check_token(state: &AppState, supplied: Option<&str>) -> ApiResult<()> {
    match state.config.voice.recordings_token() {
        Some(expected) if supplied != Some(expected) => {
            debug!("Recordings request with missing or wrong token");
            Err(ApiError::Forbidden)
        }
        _ => Ok(()),
    }
}

/// GET /voice/recordings
pub async fn list_recordings(
    State(state): State<AppState>,
    Query(query): Query<RecordingsQuery>,
) -> ApiResult<Json<RecordingsResponse>> {
    check_token(&state, query.token.as_deref())?;

    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let offset = query.offset.unwrap_or(0).max(0);

    let recordings = call_log::list(&state.db, limit, offset).await?;
    let total = call_log::count(&state.db).await?;

    Ok(Json(RecordingsResponse {
        recordings,
        total,
        limit,
        offset,
    }))
}

/// GET /voice/recordings/:recording_sid
pub async fn get_recording(
    State(state): State<AppState>,
    Path(recording_sid): Path<String>,
    Query(query): Query<RecordingsQuery>,
) -> ApiResult<Json<CallLogEntry>> {
    check_token(&state, query.token.as_deref())?;

    call_log::get_by_recording_sid(&state.db, &recording_sid)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("recording {}", recording_sid)))
}

pub fn voice_routes() -> Router<AppState> {
    Router::new()
        .route("/voice/recording", post(recording_callback))
        .route("/voice/recordings", get(list_recordings))
        .route("/voice/recordings/:recording_sid", get(get_recording))
}
