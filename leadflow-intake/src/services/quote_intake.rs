//! Website quote form → CRM lead

use chrono::{Datelike, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::record_last_error;
use crate::crm::{LeadRequest, LeadWriter};
use crate::validation::{validate, validate_quote_form, FormValidationError, QuoteForm};
use leadflow_common::format_phone_display;

/// Acknowledgement shown to the submitter
///
/// Identical whether or not the CRM write succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuoteAcknowledgement {
    pub success: bool,
    pub message: String,
    pub phone: String,
}

#[derive(Clone)]
pub struct QuoteIntake {
    writer: Arc<LeadWriter>,
    last_error: Arc<RwLock<Option<String>>>,
}

impl QuoteIntake {
    pub fn new(writer: Arc<LeadWriter>, last_error: Arc<RwLock<Option<String>>>) -> Self {
        Self { writer, last_error }
    }

    pub async fn submit(&self, form: &QuoteForm) -> Result<QuoteAcknowledgement, FormValidationError> {
        let submission = validate_quote_form(form, Utc::now().year())?;
        let phone = format_phone_display(&submission.phone);

        let fields = validate(&submission.to_fields());
        let outcome = self.writer.create_lead(LeadRequest::new(fields)).await;

        match outcome.error() {
            Some(error) => {
                warn!(outcome = outcome.kind(), error = %error, "Quote lead not persisted");
                record_last_error(&self.last_error, format!("quote lead: {}", error)).await;
            }
            None => info!(lead_id = ?outcome.lead_id(), outcome = outcome.kind(), "Quote lead recorded"),
        }

        Ok(QuoteAcknowledgement {
            success: true,
            message: format!(
                "Quote submitted successfully! We will contact you at {} soon with your estimate.",
                phone
            ),
            phone,
        })
    }
}
