//! CRM lead persistence
//!
//! [`writer::LeadWriter`] drives a lead through
//! authenticate → REST insert → (fallback) dedup check → update or insert.
//! REST lives in [`rest`], the relational fallback behind the [`store::LeadStore`]
//! seam with SQLite and MySQL implementations.

pub mod field_map;
pub mod mysql_store;
pub mod rest;
pub mod sqlite_store;
pub mod store;
pub mod writer;

pub use field_map::{FieldId, FieldMap};
pub use store::{connect_store, LeadStore, TableName};
pub use writer::LeadWriter;

use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::fields::ValidatedFields;

/// Lookback for treating a repeat phone number as the same lead
pub const DEDUP_WINDOW_SECS: i64 = 3600;

/// Lead to be written
#[derive(Debug, Clone, Default)]
pub struct LeadRequest {
    pub fields: ValidatedFields,
    /// Used for synthesized notes
    pub recording_url: Option<String>,
    /// Used for synthesized notes
    pub transcript: Option<String>,
    /// Skip the duplicate-phone check and always insert
    pub bypass_dedupe: bool,
}

impl LeadRequest {
    pub fn new(fields: ValidatedFields) -> Self {
        Self {
            fields,
            ..Default::default()
        }
    }
}

// ============================================================================
// REST path
// ============================================================================

/// Why the REST insert did not succeed
#[derive(Debug, Clone, Error)]
pub enum RestFailure {
    /// No REST endpoint configured
    #[error("CRM REST endpoint not configured")]
    NotConfigured,

    /// Connection failure or timeout
    #[error("CRM transport error: {0}")]
    Transport(String),

    /// 5xx response
    #[error("CRM server error {status}: {body}")]
    Server { status: u16, body: String },

    /// 4xx response
    #[error("CRM rejected request with {status}: {body}")]
    Rejected { status: u16, body: String },

    /// 2xx response that is not JSON or reports an error status
    #[error("CRM response unusable: {0}")]
    UnusableBody(String),
}

impl RestFailure {
    /// Whether the direct database insert should be attempted
    pub fn falls_back(&self) -> bool {
        !matches!(self, RestFailure::Rejected { .. })
    }
}

// ============================================================================
// Database path
// ============================================================================

/// Category of a database fallback failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DbWriteErrorKind {
    /// Missing database URL or entity id
    Config,
    /// Pool could not connect
    Connect,
    /// Column metadata query failed
    Introspect,
    /// Duplicate lookup or current-value read failed
    Query,
    /// Insert or update failed
    Execute,
    /// Table or column name failed the identifier check
    InvalidIdentifier,
}

impl DbWriteErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DbWriteErrorKind::Config => "config",
            DbWriteErrorKind::Connect => "connect",
            DbWriteErrorKind::Introspect => "introspect",
            DbWriteErrorKind::Query => "query",
            DbWriteErrorKind::Execute => "execute",
            DbWriteErrorKind::InvalidIdentifier => "invalid_identifier",
        }
    }
}

impl fmt::Display for DbWriteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured database fallback failure
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{kind}: {detail}")]
pub struct DbWriteError {
    pub kind: DbWriteErrorKind,
    pub detail: String,
}

impl DbWriteError {
    pub fn new(kind: DbWriteErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    /// Map an sqlx error, classifying pool/connection failures as `connect`
    pub fn from_sqlx(kind: DbWriteErrorKind, err: sqlx::Error) -> Self {
        let kind = match &err {
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_) => DbWriteErrorKind::Connect,
            _ => kind,
        };
        Self::new(kind, err.to_string())
    }
}

/// Successful database fallback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbWrite {
    Inserted { id: i64 },
    /// Existing lead within the dedup window; `updated` is false when no empty
    /// column could be filled
    DuplicateUpdated { id: i64, updated: bool },
}

impl DbWrite {
    pub fn id(&self) -> i64 {
        match self {
            DbWrite::Inserted { id } | DbWrite::DuplicateUpdated { id, .. } => *id,
        }
    }
}

/// Final result of one lead write
#[derive(Debug, Clone)]
pub enum LeadWriteOutcome {
    /// REST insert accepted; no database write performed
    RestSuccess { lead_id: Option<i64> },
    /// REST insert refused with a client error; no fallback
    RestRejected { failure: RestFailure },
    /// REST failed and the database fallback ran
    RestFailedFallbackAttempted {
        rest_failure: RestFailure,
        db: Result<DbWrite, DbWriteError>,
    },
}

impl LeadWriteOutcome {
    /// Id of the created or updated lead, when known
    pub fn lead_id(&self) -> Option<i64> {
        match self {
            LeadWriteOutcome::RestSuccess { lead_id } => *lead_id,
            LeadWriteOutcome::RestRejected { .. } => None,
            LeadWriteOutcome::RestFailedFallbackAttempted { db, .. } => {
                db.as_ref().ok().map(DbWrite::id)
            }
        }
    }

    /// Short outcome label for logs and responses
    pub fn kind(&self) -> &'static str {
        match self {
            LeadWriteOutcome::RestSuccess { .. } => "rest_success",
            LeadWriteOutcome::RestRejected { .. } => "rest_rejected",
            LeadWriteOutcome::RestFailedFallbackAttempted { db, .. } => match db {
                Ok(DbWrite::Inserted { .. }) => "inserted",
                Ok(DbWrite::DuplicateUpdated { .. }) => "duplicate_updated",
                Err(_) => "failed",
            },
        }
    }

    pub fn is_success(&self) -> bool {
        match self {
            LeadWriteOutcome::RestSuccess { .. } => true,
            LeadWriteOutcome::RestRejected { .. } => false,
            LeadWriteOutcome::RestFailedFallbackAttempted { db, .. } => db.is_ok(),
        }
    }

    /// Failure description when the lead was not persisted
    pub fn error(&self) -> Option<String> {
        match self {
            LeadWriteOutcome::RestSuccess { .. } => None,
            LeadWriteOutcome::RestRejected { failure } => Some(failure.to_string()),
            LeadWriteOutcome::RestFailedFallbackAttempted { rest_failure, db } => db
                .as_ref()
                .err()
                .map(|e| format!("{}; database fallback {}", rest_failure, e)),
        }
    }
}
