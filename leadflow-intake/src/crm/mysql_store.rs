//! MySQL/MariaDB lead store (production CRM database)

use async_trait::async_trait;
use sqlx::mysql::{MySqlArguments, MySqlPool, MySqlPoolOptions};
use sqlx::query::Query;
use sqlx::{MySql, Row};
use std::time::Duration;

use super::store::{
    insert_sql, select_recent_sql, select_values_sql, update_sql, ColumnInfo, LeadStore, RowValues,
    SqlValue, TableName,
};
use super::{DbWriteError, DbWriteErrorKind};

const DESCRIBE_SQL: &str = r#"
    SELECT CAST(COLUMN_NAME AS CHAR) AS name,
           CAST(COLUMN_TYPE AS CHAR) AS sql_type,
           CAST(IS_NULLABLE AS CHAR) AS is_nullable,
           CAST(COLUMN_DEFAULT AS CHAR) AS column_default,
           CAST(COLUMN_KEY AS CHAR) AS column_key,
           CAST(EXTRA AS CHAR) AS extra
    FROM information_schema.COLUMNS
    WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?
    ORDER BY ORDINAL_POSITION
"#;

pub struct MySqlLeadStore {
    pool: MySqlPool,
}

fn bind_value<'q>(
    query: Query<'q, MySql, MySqlArguments>,
    value: &SqlValue,
) -> Query<'q, MySql, MySqlArguments> {
    match value {
        SqlValue::Int(v) => query.bind(*v),
        SqlValue::Text(v) => query.bind(v.clone()),
    }
}

impl MySqlLeadStore {
    pub fn connect_lazy(url: &str, max_connections: u32, acquire_timeout: Duration) -> Result<Self, DbWriteError> {
        let pool = MySqlPoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(acquire_timeout)
            .connect_lazy(url)
            .map_err(|e| DbWriteError::from_sqlx(DbWriteErrorKind::Connect, e))?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl LeadStore for MySqlLeadStore {
    fn backend(&self) -> &'static str {
        "mysql"
    }

    async fn find_recent(
        &self,
        table: &TableName,
        column: &str,
        value: &str,
        since: i64,
    ) -> Result<Option<i64>, DbWriteError> {
        let sql = select_recent_sql(table, column, "CAST(`id` AS SIGNED)")?;
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
        let rows = sqlx::query(DESCRIBE_SQL)
            .bind(table.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DbWriteError::from_sqlx(DbWriteErrorKind::Introspect, e))?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            let read = |e| DbWriteError::from_sqlx(DbWriteErrorKind::Introspect, e);
            let extra = row
                .try_get::<Option<String>, _>("extra")
                .map_err(read)?
                .unwrap_or_default()
                .to_lowercase();
            columns.push(ColumnInfo {
                name: row.try_get("name").map_err(read)?,
                sql_type: row.try_get::<String, _>("sql_type").map_err(read)?.to_lowercase(),
                not_null: row.try_get::<String, _>("is_nullable").map_err(read)? == "NO",
                has_default: row.try_get::<Option<String>, _>("column_default").map_err(read)?.is_some(),
                primary_key: row.try_get::<Option<String>, _>("column_key").map_err(read)?.as_deref() == Some("PRI"),
                auto_increment: extra.contains("auto_increment"),
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

        i64::try_from(result.last_insert_id()).map_err(|_| {
            DbWriteError::new(DbWriteErrorKind::Execute, "generated id out of range")
        })
    }
}
