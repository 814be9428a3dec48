//! Relational access to the CRM entity table
//!
//! The writer only sees the [`LeadStore`] trait. Identifiers reaching SQL come
//! from configuration or introspection and must pass [`quote_identifier`];
//! every value is a bound parameter.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::mysql_store::MySqlLeadStore;
use super::sqlite_store::SqliteLeadStore;
use super::{DbWriteError, DbWriteErrorKind};
use leadflow_common::config::CrmDatabaseConfig;

/// Bound value for inserts and updates
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlValue {
    Int(i64),
    Text(String),
}

/// Column metadata from introspection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    /// Declared type, lowercased
    pub sql_type: String,
    pub not_null: bool,
    pub has_default: bool,
    pub primary_key: bool,
    pub auto_increment: bool,
}

impl ColumnInfo {
    /// Integer and fixed/floating point types receive `0` as filler
    pub fn is_numeric(&self) -> bool {
        ["int", "decimal", "numeric", "float", "double", "real"]
            .iter()
            .any(|t| self.sql_type.contains(t))
    }

    /// NOT NULL, no default, not generated by the database
    pub fn requires_value(&self) -> bool {
        self.not_null && !self.has_default && !self.primary_key && !self.auto_increment
    }

    /// Safe filler for a required column the insert would otherwise omit
    pub fn filler_value(&self) -> SqlValue {
        if self.is_numeric() {
            SqlValue::Int(0)
        } else {
            SqlValue::Text(String::new())
        }
    }
}

/// Entity table name (`app_entity_<id>`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableName(String);

impl TableName {
    pub fn for_entity(entity_id: u32) -> Self {
        Self(format!("app_entity_{}", entity_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Backtick-quote a trusted identifier after checking its characters
pub fn quote_identifier(name: &str) -> Result<String, DbWriteError> {
    let valid = !name.is_empty()
        && name.len() <= 64
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');

    if !valid {
        return Err(DbWriteError::new(
            DbWriteErrorKind::InvalidIdentifier,
            format!("refusing identifier {:?}", name),
        ));
    }
    Ok(format!("`{}`", name))
}

/// Quote a list of identifiers, failing on the first bad one
pub fn quote_identifiers<'a, I>(names: I) -> Result<Vec<String>, DbWriteError>
where
    I: IntoIterator<Item = &'a str>,
{
    names.into_iter().map(quote_identifier).collect()
}

/// Current values of selected columns, `None` for SQL NULL
pub type RowValues = HashMap<String, Option<String>>;

/// Persistence operations the lead writer needs
#[async_trait]
pub trait LeadStore: Send + Sync {
    /// Backend name for logs
    fn backend(&self) -> &'static str;

    /// Newest row id where `column = value` and `date_added > since`
    async fn find_recent(
        &self,
        table: &TableName,
        column: &str,
        value: &str,
        since: i64,
    ) -> Result<Option<i64>, DbWriteError>;

    /// Text rendering of `columns` for row `id`; `None` if the row is gone
    async fn fetch_values(
        &self,
        table: &TableName,
        id: i64,
        columns: &[String],
    ) -> Result<Option<RowValues>, DbWriteError>;

    /// Column metadata in table order
    async fn describe_columns(&self, table: &TableName) -> Result<Vec<ColumnInfo>, DbWriteError>;

    /// Apply assignments to row `id`; returns affected row count
    async fn update_row(
        &self,
        table: &TableName,
        id: i64,
        assignments: &[(String, SqlValue)],
    ) -> Result<u64, DbWriteError>;

    /// Insert one row; returns the generated id
    async fn insert_row(
        &self,
        table: &TableName,
        row: &[(String, SqlValue)],
    ) -> Result<i64, DbWriteError>;
}

// ============================================================================
// Shared SQL text
// ============================================================================

pub(crate) fn select_recent_sql(table: &TableName, column: &str, id_expr: &str) -> Result<String, DbWriteError> {
    Ok(format!(
        "SELECT {id_expr} AS id FROM {} WHERE {} = ? AND `date_added` > ? ORDER BY `id` DESC LIMIT 1",
        quote_identifier(table.as_str())?,
        quote_identifier(column)?,
    ))
}

pub(crate) fn select_values_sql(table: &TableName, columns: &[String]) -> Result<String, DbWriteError> {
    let selected = quote_identifiers(columns.iter().map(String::as_str))?
        .into_iter()
        .map(|c| format!("CAST({c} AS CHAR) AS {c}"))
        .collect::<Vec<_>>()
        .join(", ");
    Ok(format!(
        "SELECT {} FROM {} WHERE `id` = ? LIMIT 1",
        selected,
        quote_identifier(table.as_str())?
    ))
}

pub(crate) fn update_sql(table: &TableName, assignments: &[(String, SqlValue)]) -> Result<String, DbWriteError> {
    let sets = quote_identifiers(assignments.iter().map(|(c, _)| c.as_str()))?
        .into_iter()
        .map(|c| format!("{} = ?", c))
        .collect::<Vec<_>>()
        .join(", ");
    Ok(format!(
        "UPDATE {} SET {} WHERE `id` = ?",
        quote_identifier(table.as_str())?,
        sets
    ))
}

pub(crate) fn insert_sql(table: &TableName, row: &[(String, SqlValue)]) -> Result<String, DbWriteError> {
    let columns = quote_identifiers(row.iter().map(|(c, _)| c.as_str()))?;
    let placeholders = vec!["?"; columns.len()].join(", ");
    Ok(format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_identifier(table.as_str())?,
        columns.join(", "),
        placeholders
    ))
}

/// Open the CRM store named by the database URL
///
/// `mysql://` and `mariadb://` select MySQL, `sqlite:` selects SQLite. Pools are
/// created lazily, so an unreachable server surfaces as a `connect` error on
/// first use rather than at startup.
pub fn connect_store(config: &CrmDatabaseConfig) -> Result<Arc<dyn LeadStore>, DbWriteError> {
    let url = config
        .url()
        .ok_or_else(|| DbWriteError::new(DbWriteErrorKind::Config, "crm_database.url is not set"))?;
    let acquire_timeout = Duration::from_secs(config.acquire_timeout_secs);

    if url.starts_with("mysql:") || url.starts_with("mariadb:") {
        let url = url.replacen("mariadb:", "mysql:", 1);
        let store = MySqlLeadStore::connect_lazy(&url, config.max_connections, acquire_timeout)?;
        Ok(Arc::new(store))
    } else if url.starts_with("sqlite:") {
        let store = SqliteLeadStore::connect_lazy(url, config.max_connections, acquire_timeout)?;
        Ok(Arc::new(store))
    } else {
        Err(DbWriteError::new(
            DbWriteErrorKind::Config,
            "crm_database.url must start with mysql:// or sqlite:",
        ))
    }
}
