//! Call ingestion: recording webhook → extraction → validation → call log → lead
//!
//! Only a missing recording id is an error. Call log and CRM failures are
//! logged and recorded as the service's last error; the provider still gets a
//! success response so it does not retry a call we already have.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::ci_payload::CiInsights;
use super::record_last_error;
use crate::crm::{LeadRequest, LeadWriter};
use crate::db::call_log::{self, NewCallLog};
use crate::extraction::ExtractionChain;
use crate::fields::ValidatedFields;
use crate::validation::validate;

/// Telephony recording callback (form fields use the provider's casing)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordingWebhook {
    #[serde(rename = "RecordingSid", default)]
    pub recording_sid: Option<String>,
    #[serde(rename = "CallSid", default)]
    pub call_sid: Option<String>,
    #[serde(rename = "RecordingUrl", default)]
    pub recording_url: Option<String>,
    #[serde(rename = "RecordingDuration", default)]
    pub recording_duration: Option<String>,
    #[serde(rename = "From", default)]
    pub from: Option<String>,
    #[serde(rename = "To", default)]
    pub to: Option<String>,
    #[serde(rename = "TranscriptionText", default)]
    pub transcription_text: Option<String>,
    /// Present only for conversational-intelligence payloads
    #[serde(skip)]
    pub insights: CiInsights,
}

fn present(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Response returned to the webhook caller
#[derive(Debug, Clone, Serialize)]
pub struct CallIngestionResponse {
    pub success: bool,
    pub log_id: Option<i64>,
    pub crm_lead_id: Option<i64>,
    pub customer_data: ValidatedFields,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IngestError {
    #[error("Missing RecordingSid")]
    MissingRecordingSid,
}

/// Orchestrates one recording through the pipeline
#[derive(Clone)]
pub struct CallIngestion {
    db: SqlitePool,
    extraction: ExtractionChain,
    writer: Arc<LeadWriter>,
    last_error: Arc<RwLock<Option<String>>>,
}

impl CallIngestion {
    pub fn new(
        db: SqlitePool,
        extraction: ExtractionChain,
        writer: Arc<LeadWriter>,
        last_error: Arc<RwLock<Option<String>>>,
    ) -> Self {
        Self {
            db,
            extraction,
            writer,
            last_error,
        }
    }

    pub async fn process_recording(
        &self,
        webhook: RecordingWebhook,
    ) -> Result<CallIngestionResponse, IngestError> {
        let ingest_id = Uuid::new_v4();
        self.process_inner(webhook)
            .instrument(info_span!("ingest", %ingest_id))
            .await
    }

    async fn process_inner(&self, webhook: RecordingWebhook) -> Result<CallIngestionResponse, IngestError> {
        let recording_sid = present(&webhook.recording_sid).ok_or(IngestError::MissingRecordingSid)?;
        let transcript = present(&webhook.transcription_text);
        let recording_url = present(&webhook.recording_url);

        info!(
            recording_sid = %recording_sid,
            has_transcript = transcript.is_some(),
            "Recording received"
        );

        let fields = match &transcript {
            Some(text) => {
                let outcome = self.extraction.extract(text).await;
                let validated = validate(&outcome.fields);
                debug!(
                    source = outcome.source,
                    extracted = outcome.fields.len(),
                    validated = validated.len(),
                    "Transcript analyzed"
                );
                validated
            }
            None => ValidatedFields::default(),
        };

        let log_id = self
            .log_call(&webhook, &recording_sid, &recording_url, &transcript, &fields)
            .await;

        let mut crm_lead_id = None;
        if !fields.is_empty() {
            let request = LeadRequest {
                fields: fields.clone(),
                recording_url,
                transcript,
                bypass_dedupe: false,
            };
            let outcome = self.writer.create_lead(request).await;
            crm_lead_id = outcome.lead_id();

            if let Some(error) = outcome.error() {
                warn!(recording_sid = %recording_sid, outcome = outcome.kind(), error = %error, "Lead not persisted");
                record_last_error(&self.last_error, format!("lead write for {}: {}", recording_sid, error)).await;
            } else {
                info!(recording_sid = %recording_sid, lead_id = ?crm_lead_id, outcome = outcome.kind(), "Lead recorded");
            }
        }

        Ok(CallIngestionResponse {
            success: true,
            log_id,
            crm_lead_id,
            customer_data: fields,
        })
    }

    /// Best-effort call log write
    async fn log_call(
        &self,
        webhook: &RecordingWebhook,
        recording_sid: &str,
        recording_url: &Option<String>,
        transcript: &Option<String>,
        fields: &ValidatedFields,
    ) -> Option<i64> {
        let mut customer_data = serde_json::to_value(fields).unwrap_or_else(|_| Value::Object(Default::default()));
        if !webhook.insights.is_empty() {
            if let (Some(map), Ok(insights)) = (customer_data.as_object_mut(), serde_json::to_value(&webhook.insights)) {
                map.insert("insights".to_string(), insights);
            }
        }

        let entry = NewCallLog {
            call_sid: present(&webhook.call_sid),
            recording_sid: recording_sid.to_string(),
            recording_url: recording_url.clone(),
            transcript: transcript.clone(),
            from_number: present(&webhook.from),
            to_number: present(&webhook.to),
            duration: webhook
                .recording_duration
                .as_deref()
                .and_then(|d| d.trim().parse().ok()),
            status: "completed".to_string(),
            customer_data: Some(customer_data),
        };

        match call_log::upsert(&self.db, &entry).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(recording_sid = %recording_sid, error = %e, "Call log write failed");
                record_last_error(&self.last_error, format!("call log: {}", e)).await;
                None
            }
        }
    }
}
