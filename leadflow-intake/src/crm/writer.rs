//! Lead writer
//!
//! REST insert first; on transport, server or body failure the lead goes
//! straight into the entity table, merging into a recent lead with the same
//! phone number when one exists.

use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::rest::CrmRestClient;
use super::store::{connect_store, LeadStore, SqlValue, TableName};
use super::{
    DbWrite, DbWriteError, DbWriteErrorKind, FieldId, FieldMap, LeadRequest, LeadWriteOutcome,
    RestFailure, DEDUP_WINDOW_SECS,
};
use crate::fields::FieldKey;
use leadflow_common::config::{CrmConfig, CrmDatabaseConfig};
use leadflow_common::phone::strip_to_dial_chars;
use leadflow_common::{Error, Result};

/// Mapped CRM payload, one value per column
pub type MappedPayload = Vec<(FieldId, String)>;

pub struct LeadWriter {
    field_map: FieldMap,
    rest: Option<CrmRestClient>,
    store: Option<Arc<dyn LeadStore>>,
    table: Option<TableName>,
    created_by: i64,
}

impl LeadWriter {
    pub fn new(
        field_map: FieldMap,
        rest: Option<CrmRestClient>,
        store: Option<Arc<dyn LeadStore>>,
        entity_id: u32,
        created_by: i64,
    ) -> Self {
        Self {
            field_map,
            rest,
            store,
            table: (entity_id > 0).then(|| TableName::for_entity(entity_id)),
            created_by,
        }
    }

    /// Build the REST client, field map and CRM store from configuration
    pub fn from_config(crm: &CrmConfig, database: &CrmDatabaseConfig) -> Result<Self> {
        let field_map = FieldMap::from_entries(crm.field_map.iter().map(|(k, v)| (k.as_str(), *v)))?;

        let rest = match crm.api_url() {
            Some(_) => Some(CrmRestClient::new(crm)?),
            None => None,
        };

        let store = match database.url() {
            Some(_) => Some(connect_store(database).map_err(|e| Error::Config(e.to_string()))?),
            None => None,
        };

        info!(
            mapped_fields = field_map.len(),
            rest = rest.is_some(),
            store = store.as_ref().map(|s| s.backend()).unwrap_or("none"),
            "Lead writer configured"
        );

        Ok(Self::new(
            field_map,
            rest,
            store,
            crm.leads_entity_id,
            crm.created_by_user_id,
        ))
    }

    pub fn field_map(&self) -> &FieldMap {
        &self.field_map
    }

    /// Persist one lead, never failing past this call
    pub async fn create_lead(&self, request: LeadRequest) -> LeadWriteOutcome {
        let fields = self.complete_fields(&request);
        let payload = self.mapped_payload(&fields);

        let rest_failure = match &self.rest {
            Some(rest) => {
                let auth = rest.authenticate().await;
                match rest.insert(&auth, &payload).await {
                    Ok(lead_id) => {
                        info!(lead_id = ?lead_id, outcome = "rest_success", "Lead created via CRM REST");
                        return LeadWriteOutcome::RestSuccess { lead_id };
                    }
                    Err(failure) if !failure.falls_back() => {
                        warn!(error = %failure, outcome = "rest_rejected", "CRM rejected lead");
                        return LeadWriteOutcome::RestRejected { failure };
                    }
                    Err(failure) => failure,
                }
            }
            None => RestFailure::NotConfigured,
        };

        warn!(error = %rest_failure, "CRM REST insert failed, falling back to database");

        let phone = fields
            .get(&FieldKey::Phone)
            .map(|p| strip_to_dial_chars(p))
            .filter(|p| !p.is_empty());
        let db = self
            .write_to_database(&payload, phone.as_deref(), request.bypass_dedupe)
            .await;

        let outcome = LeadWriteOutcome::RestFailedFallbackAttempted { rest_failure, db };
        match &outcome {
            LeadWriteOutcome::RestFailedFallbackAttempted { db: Err(e), .. } => {
                error!(kind = %e.kind, detail = %e.detail, "Database fallback failed")
            }
            _ => info!(
                lead_id = ?outcome.lead_id(),
                outcome = outcome.kind(),
                "Lead written via database fallback"
            ),
        }

        outcome
    }

    /// Validated fields plus synthesized `name`, `engine_size` and `notes`
    fn complete_fields(&self, request: &LeadRequest) -> BTreeMap<FieldKey, String> {
        let mut fields = request.fields.to_map();

        if !fields.contains_key(&FieldKey::Name) {
            let full = [FieldKey::FirstName, FieldKey::LastName]
                .iter()
                .filter_map(|k| fields.get(k).map(String::as_str))
                .collect::<Vec<_>>()
                .join(" ");
            if !full.is_empty() {
                fields.insert(FieldKey::Name, full);
            }
        }

        if !fields.contains_key(&FieldKey::EngineSize) {
            if let Some(engine) = fields.get(&FieldKey::Engine).cloned() {
                fields.insert(FieldKey::EngineSize, engine);
            }
        }

        if self.field_map.resolve(FieldKey::Notes).is_some() && !fields.contains_key(&FieldKey::Notes) {
            let mut lines = Vec::new();
            if let Some(url) = request.recording_url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
                lines.push(format!("Recording: {}", url));
            }
            if let Some(text) = request.transcript.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
                lines.push(format!("Transcript: {}", text));
            }
            if !lines.is_empty() {
                fields.insert(FieldKey::Notes, lines.join("\n"));
            }
        }

        fields
    }

    /// Resolve fields to CRM columns; the first key mapped to a column wins
    pub fn mapped_payload(&self, fields: &BTreeMap<FieldKey, String>) -> MappedPayload {
        let mut payload: MappedPayload = Vec::new();

        for key in FieldKey::ALL {
            let Some(field_id) = self.field_map.resolve(key) else {
                continue;
            };
            let Some(value) = fields.get(&key).map(|v| v.trim()).filter(|v| !v.is_empty()) else {
                continue;
            };
            if payload.iter().any(|(id, _)| *id == field_id) {
                debug!(field = %key, column = %field_id.column(), "Column already set by an earlier field");
                continue;
            }
            payload.push((field_id, value.to_string()));
        }

        payload
    }

    async fn write_to_database(
        &self,
        payload: &[(FieldId, String)],
        phone: Option<&str>,
        bypass_dedupe: bool,
    ) -> std::result::Result<DbWrite, DbWriteError> {
        let store = self
            .store
            .as_ref()
            .ok_or_else(|| DbWriteError::new(DbWriteErrorKind::Config, "crm_database.url is not set"))?;
        let table = self
            .table
            .as_ref()
            .ok_or_else(|| DbWriteError::new(DbWriteErrorKind::Config, "crm.leads_entity_id is not set"))?;
        let now = Utc::now().timestamp();

        if !bypass_dedupe {
            if let (Some(phone_id), Some(phone)) = (self.field_map.resolve(FieldKey::Phone), phone) {
                let since = now - DEDUP_WINDOW_SECS;
                if let Some(id) = store.find_recent(table, &phone_id.column(), phone, since).await? {
                    debug!(lead_id = id, "Recent lead with same phone found");
                    if let Some(updated) = self.fill_empty_columns(store.as_ref(), table, id, payload, now).await? {
                        return Ok(DbWrite::DuplicateUpdated { id, updated });
                    }
                }
            }
        }

        let id = self.insert_lead(store.as_ref(), table, payload, now).await?;
        Ok(DbWrite::Inserted { id })
    }

    /// Fill columns of an existing lead that are NULL, empty or `0`
    ///
    /// Returns `None` when the row disappeared between lookup and read.
    async fn fill_empty_columns(
        &self,
        store: &dyn LeadStore,
        table: &TableName,
        id: i64,
        payload: &[(FieldId, String)],
        now: i64,
    ) -> std::result::Result<Option<bool>, DbWriteError> {
        let columns: Vec<String> = payload.iter().map(|(field_id, _)| field_id.column()).collect();
        let Some(current) = store.fetch_values(table, id, &columns).await? else {
            return Ok(None);
        };

        let mut assignments: Vec<(String, SqlValue)> = payload
            .iter()
            .filter(|(field_id, _)| {
                match current.get(&field_id.column()) {
                    Some(Some(existing)) => matches!(existing.trim(), "" | "0"),
                    _ => true,
                }
            })
            .map(|(field_id, value)| (field_id.column(), SqlValue::Text(value.clone())))
            .collect();

        if assignments.is_empty() {
            return Ok(Some(false));
        }

        let has_date_updated = store
            .describe_columns(table)
            .await?
            .iter()
            .any(|c| c.name == "date_updated");
        if has_date_updated {
            assignments.push(("date_updated".to_string(), SqlValue::Int(now)));
        }

        let affected = store.update_row(table, id, &assignments).await?;
        Ok(Some(affected > 0))
    }

    async fn insert_lead(
        &self,
        store: &dyn LeadStore,
        table: &TableName,
        payload: &[(FieldId, String)],
        now: i64,
    ) -> std::result::Result<i64, DbWriteError> {
        let mut row: Vec<(String, SqlValue)> = vec![
            ("created_by".to_string(), SqlValue::Int(self.created_by)),
            ("date_added".to_string(), SqlValue::Int(now)),
            ("parent_item_id".to_string(), SqlValue::Int(0)),
            ("sort_order".to_string(), SqlValue::Int(0)),
        ];
        row.extend(
            payload
                .iter()
                .map(|(field_id, value)| (field_id.column(), SqlValue::Text(value.clone()))),
        );

        for column in store.describe_columns(table).await? {
            if column.requires_value() && !row.iter().any(|(name, _)| *name == column.name) {
                debug!(column = %column.name, "Filling required column");
                row.push((column.name.clone(), column.filler_value()));
            }
        }

        store.insert_row(table, &row).await
    }
}
