//! Request-level services for leadflow-intake

pub mod call_ingestion;
pub mod ci_payload;
pub mod quote_intake;

pub use call_ingestion::{CallIngestion, CallIngestionResponse, IngestError, RecordingWebhook};
pub use quote_intake::{QuoteAcknowledgement, QuoteIntake};

use std::sync::Arc;
use tokio::sync::RwLock;

/// Remember the most recent failure for the health endpoint
pub async fn record_last_error(slot: &Arc<RwLock<Option<String>>>, message: String) {
    *slot.write().await = Some(message);
}
