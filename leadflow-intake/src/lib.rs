//! leadflow-intake library interface
//!
//! Voice and web-form intake: transcripts and form posts become validated
//! lead fields, which are written to the CRM.

pub mod api;
pub mod crm;
pub mod db;
pub mod error;
pub mod extraction;
pub mod fields;
pub mod services;
pub mod validation;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

use crate::crm::LeadWriter;
use crate::extraction::ExtractionChain;
use crate::services::{CallIngestion, QuoteIntake};
use leadflow_common::config::IntakeConfig;
use leadflow_common::{Error, Result};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Local call log database
    pub db: SqlitePool,
    /// Configuration loaded at startup
    pub config: Arc<IntakeConfig>,
    /// Recording webhook pipeline
    pub ingestion: CallIngestion,
    /// Quote form pipeline
    pub quotes: QuoteIntake,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        config: Arc<IntakeConfig>,
        writer: Arc<LeadWriter>,
        extraction: ExtractionChain,
    ) -> Self {
        let last_error = Arc::new(RwLock::new(None));
        Self {
            ingestion: CallIngestion::new(db.clone(), extraction, writer.clone(), last_error.clone()),
            quotes: QuoteIntake::new(writer, last_error.clone()),
            db,
            config,
            startup_time: Utc::now(),
            last_error,
        }
    }

    /// Wire the lead writer and extraction chain from configuration
    pub fn from_config(db: SqlitePool, config: Arc<IntakeConfig>) -> Result<Self> {
        let writer = Arc::new(LeadWriter::from_config(&config.crm, &config.crm_database)?);
        let extraction = ExtractionChain::from_config(&config.openai)
            .map_err(|e| Error::Config(format!("extraction setup failed: {}", e)))?;
        Ok(Self::new(db, config, writer, extraction))
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::voice_routes())
        .merge(api::ci_routes())
        .merge(api::quote_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
