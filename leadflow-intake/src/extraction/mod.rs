//! Transcript field extraction
//!
//! Two strategies sit behind the [`Extractor`] trait: the language-model
//! [`ai::AiExtractor`] and the deterministic [`pattern::PatternExtractor`].
//! [`ExtractionChain`] tries the preferred one when it is configured and falls
//! back to patterns on any failure or empty result.

pub mod ai;
pub mod pattern;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::fields::ExtractedFields;
use ai::AiExtractor;
use leadflow_common::config::OpenAiConfig;
use pattern::PatternExtractor;

/// Extraction failure
///
/// Never leaves the extraction chain; it only selects the fallback.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Extractor lacks credentials or endpoint
    #[error("Extractor not available: {0}")]
    NotAvailable(String),

    /// Network communication error (includes timeouts)
    #[error("Network error: {0}")]
    Network(String),

    /// Extraction service answered with an error status
    #[error("API error: {0}")]
    Api(String),

    /// Response envelope or model output could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Transcript → fields strategy
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Source name recorded in logs and ingest responses
    fn source_id(&self) -> &'static str;

    /// Whether this extractor can run at all
    fn is_configured(&self) -> bool {
        true
    }

    async fn extract(&self, transcript: &str) -> Result<ExtractedFields, ExtractionError>;
}

/// Result of running the chain
#[derive(Debug, Clone)]
pub struct ExtractionOutcome {
    pub fields: ExtractedFields,
    /// `source_id` of the extractor that produced `fields`
    pub source: &'static str,
}

/// Preferred extractor with unconditional pattern fallback
#[derive(Clone)]
pub struct ExtractionChain {
    preferred: Option<Arc<dyn Extractor>>,
    fallback: PatternExtractor,
}

impl ExtractionChain {
    pub fn new(preferred: Option<Arc<dyn Extractor>>) -> Self {
        Self {
            preferred,
            fallback: PatternExtractor::new(),
        }
    }

    /// Pattern extraction only
    pub fn pattern_only() -> Self {
        Self::new(None)
    }

    /// Use the language model when an API key is configured
    pub fn from_config(config: &OpenAiConfig) -> Result<Self, ExtractionError> {
        if !config.is_configured() {
            debug!("Language-model extraction disabled (no API key)");
            return Ok(Self::pattern_only());
        }
        let ai: Arc<dyn Extractor> = Arc::new(AiExtractor::new(config)?);
        Ok(Self::new(Some(ai)))
    }

    /// Extract fields; never fails
    pub async fn extract(&self, transcript: &str) -> ExtractionOutcome {
        if let Some(preferred) = self.preferred.as_ref().filter(|e| e.is_configured()) {
            match preferred.extract(transcript).await {
                Ok(fields) if !fields.is_empty() => {
                    debug!(source = preferred.source_id(), count = fields.len(), "Extraction complete");
                    return ExtractionOutcome {
                        fields,
                        source: preferred.source_id(),
                    };
                }
                Ok(_) => {
                    warn!(source = preferred.source_id(), "Extractor returned no fields, falling back to patterns");
                }
                Err(e) => {
                    warn!(source = preferred.source_id(), error = %e, "Extractor failed, falling back to patterns");
                }
            }
        }

        let fields = self.fallback.extract_fields(transcript);
        debug!(source = self.fallback.source_id(), count = fields.len(), "Extraction complete");
        ExtractionOutcome {
            fields,
            source: self.fallback.source_id(),
        }
    }
}
