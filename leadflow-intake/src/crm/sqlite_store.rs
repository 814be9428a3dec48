//! SQLite lead store
//!
//! Used for local CRM replicas and tests.

use async_trait::async_trait;
use sqlx::sqlite::{SqliteArguments, SqlitePool, SqlitePoolOptions};
use sqlx::query::Query;
use sqlx::{Row, Sqlite};
use std::time::Duration;

use super::store::{
    insert_sql, quote_identifier, select_recent_sql, select_values_sql, update_sql, ColumnInfo,
    LeadStore, RowValues, SqlValue, TableName,
};
use super::{DbWriteError, DbWriteErrorKind};

pub struct SqliteLeadStore {
    pool: SqlitePool,
}

fn bind_value<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &SqlValue,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        SqlValue::Int(v) => query.bind(*v),
        SqlValue::Text(v) => query.bind(v.clone()),
    }
}

impl SqliteLeadStore {
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn connect_lazy(url: &str, max_connections: u32, acquire_timeout: Duration) -> Result<Self, DbWriteError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(acquire_timeout)
            .connect_lazy(url)
            .map_err(|e| DbWriteError::from_sqlx(DbWriteErrorKind::Connect, e))?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl LeadStore for SqliteLeadStore {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    async fn find_recent(
        &self,
        table: &TableName,
        column: &str,
        value: &str,
        since: i64,
    ) -> Result<Option<i64>, DbWriteError> {
        let sql = select_recent_sql(table, column, "`id`")?;
        let row = sqlx::query(&sql)
            .bind(value)
            .bind(since)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DbWriteError::from_sqlx(DbWriteErrorKind::Query, e))?;

        row.map(|r| r.try_get::<i64, _>("id"))
            .transpose()
            .map_err(|e| DbWriteError::from_sqlx(DbWriteErrorKind::Query, e))
    }

    async fn fetch_values(
        &self,
        table: &TableName,
        id: i64,
        columns: &[String],
    ) -> Result<Option<RowValues>, DbWriteError> {
        if columns.is_empty() {
            return Ok(Some(RowValues::new()));
        }

        let sql = select_values_sql(table, columns)?;
        let Some(row) = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DbWriteError::from_sqlx(DbWriteErrorKind::Query, e))?
        else {
            return Ok(None);
        };

        let mut values = RowValues::new();
        for column in columns {
            let value: Option<String> = row
                .try_get(column.as_str())
                .map_err(|e| DbWriteError::from_sqlx(DbWriteErrorKind::Query, e))?;
            values.insert(column.clone(), value);
        }
        Ok(Some(values))
    }

    async fn describe_columns(&self, table: &TableName) -> Result<Vec<ColumnInfo>, DbWriteError> {
        quote_identifier(table.as_str())?;
        let sql = format!("PRAGMA table_info('{}')", table.as_str());
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DbWriteError::from_sqlx(DbWriteErrorKind::Introspect, e))?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            let read = |e| DbWriteError::from_sqlx(DbWriteErrorKind::Introspect, e);
            let sql_type = row.try_get::<String, _>("type").map_err(read)?.to_lowercase();
            let primary_key = row.try_get::<i32, _>("pk").map_err(read)? != 0;
            columns.push(ColumnInfo {
                name: row.try_get("name").map_err(read)?,
                not_null: row.try_get::<i32, _>("notnull").map_err(read)? != 0,
                has_default: row.try_get::<Option<String>, _>("dflt_value").map_err(read)?.is_some(),
                // INTEGER PRIMARY KEY aliases the rowid
                auto_increment: primary_key && sql_type == "integer",
                primary_key,
                sql_type,
            });
        }

        if columns.is_empty() {
            return Err(DbWriteError::new(
                DbWriteErrorKind::Introspect,
                format!("table {} not found", table.as_str()),
            ));
        }
        Ok(columns)
    }

    async fn update_row(
        &self,
        table: &TableName,
        id: i64,
        assignments: &[(String, SqlValue)],
    ) -> Result<u64, DbWriteError> {
        if assignments.is_empty() {
            return Ok(0);
        }

        let sql = update_sql(table, assignments)?;
        let mut query = sqlx::query(&sql);
        for (_, value) in assignments {
            query = bind_value(query, value);
        }
        let result = query
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| DbWriteError::from_sqlx(DbWriteErrorKind::Execute, e))?;
        Ok(result.rows_affected())
    }

    async fn insert_row(&self, table: &TableName, row: &[(String, SqlValue)]) -> Result<i64, DbWriteError> {
        let sql = insert_sql(table, row)?;
        let mut query = sqlx::query(&sql);
        for (_, value) in row {
            query = bind_value(query, value);
        }
        let result = query
            .execute(&self.pool)
            .await
            .map_err(|e| DbWriteError::from_sqlx(DbWriteErrorKind::Execute, e))?;
        Ok(result.last_insert_rowid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> SqliteLeadStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::query(
            "CREATE TABLE app_entity_25 (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                date_added INTEGER NOT NULL,
                created_by INTEGER NOT NULL,
                field_7 TEXT,
                field_30 INT NOT NULL,
                field_31 TEXT NOT NULL DEFAULT ''
            )",
        )
        .execute(&pool)
        .await
        .unwrap();
        SqliteLeadStore::from_pool(pool)
    }

    #[tokio::test]
    async fn test_describe_columns() {
        let store = store().await;
        let columns = store.describe_columns(&TableName::for_entity(25)).await.unwrap();
        let required: Vec<&str> = columns
            .iter()
            .filter(|c| c.requires_value())
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(required, vec!["date_added", "created_by", "field_30"]);
        assert!(columns[0].auto_increment);
    }

    #[tokio::test]
    async fn test_missing_table_is_introspect_error() {
        let store = store().await;
        let err = store.describe_columns(&TableName::for_entity(99)).await.unwrap_err();
        assert_eq!(err.kind, DbWriteErrorKind::Introspect);
    }

    #[tokio::test]
    async fn test_insert_find_update() {
        let store = store().await;
        let table = TableName::for_entity(25);
        let row = vec![
            ("date_added".to_string(), SqlValue::Int(1_000)),
            ("created_by".to_string(), SqlValue::Int(1)),
            ("field_7".to_string(), SqlValue::Text("9045551234".into())),
            ("field_30".to_string(), SqlValue::Int(0)),
        ];
        let id = store.insert_row(&table, &row).await.unwrap();

        assert_eq!(store.find_recent(&table, "field_7", "9045551234", 999).await.unwrap(), Some(id));
        assert_eq!(store.find_recent(&table, "field_7", "9045551234", 1_000).await.unwrap(), None);

        let changed = store
            .update_row(&table, id, &[("field_31".to_string(), SqlValue::Text("Honda".into()))])
            .await
            .unwrap();
        assert_eq!(changed, 1);

        let values = store
            .fetch_values(&table, id, &["field_30".to_string(), "field_31".to_string()])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(values["field_30"].as_deref(), Some("0"));
        assert_eq!(values["field_31"].as_deref(), Some("Honda"));

        assert!(store.fetch_values(&table, id + 1, &["field_7".to_string()]).await.unwrap().is_none());
    }
}
