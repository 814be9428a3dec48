//! Conversational-intelligence webhook

use axum::{body::Bytes, extract::State, routing::post, Json, Router};
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{ApiError, ApiResult};
use crate::services::ci_payload::to_recording_webhook;
use crate::services::CallIngestionResponse;
use crate::AppState;

/// POST /voice/ci
///
/// Body is read raw so malformed JSON maps to 400.
pub async fn ci_callback(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<CallIngestionResponse>> {
    let json: Value = serde_json::from_slice(&body).map_err(|e| {
        warn!(error = %e, bytes = body.len(), "CI webhook with invalid JSON");
        ApiError::BadRequest("Invalid JSON".to_string())
    })?;

    if !json.is_object() {
        return Err(ApiError::BadRequest("Invalid JSON".to_string()));
    }

    let webhook = to_recording_webhook(&json);
    info!(
        has_transcript = webhook.transcription_text.is_some(),
        has_insights = !webhook.insights.is_empty(),
        "CI webhook received"
    );

    let response = state.ingestion.process_recording(webhook).await?;
    Ok(Json(response))
}

pub fn ci_routes() -> Router<AppState> {
    Router::new().route("/voice/ci", post(ci_callback))
}
