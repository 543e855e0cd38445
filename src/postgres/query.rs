use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;
use tokio_postgres::Client;
use tokio_postgres::types::Type;

use super::params::as_refs;
use crate::error::DbError;
use crate::results::{Columns, Row};
use crate::types::SqlValue;

/// Run a driver future under the per-command timeout.
async fn bounded<T, F>(limit: Duration, fut: F) -> Result<T, DbError>
where
    F: Future<Output = Result<T, tokio_postgres::Error>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(res) => res.map_err(DbError::from),
        Err(_) => Err(DbError::Timeout(limit)),
    }
}

pub(crate) async fn execute_batch(
    client: &Client,
    sql: &str,
    limit: Duration,
) -> Result<(), DbError> {
    bounded(limit, client.batch_execute(sql)).await
}

pub(crate) async fn execute(
    client: &Client,
    sql: &str,
    params: &[SqlValue],
    limit: Duration,
) -> Result<u64, DbError> {
    let refs = as_refs(params);
    bounded(limit, client.execute(sql, &refs)).await
}

pub(crate) async fn query(
    client: &Client,
    sql: &str,
    params: &[SqlValue],
    limit: Duration,
) -> Result<Vec<Row>, DbError> {
    let refs = as_refs(params);
    let rows = bounded(limit, client.query(sql, &refs)).await?;
    rows_to_results(&rows)
}

/// Append `RETURNING id` to an INSERT and read the generated key back.
pub(crate) async fn insert_returning_id(
    client: &Client,
    sql: &str,
    params: &[SqlValue],
    limit: Duration,
) -> Result<i64, DbError> {
    let statement = format!("{} RETURNING id", sql.trim().trim_end_matches(';'));
    let refs = as_refs(params);
    let row = bounded(limit, client.query_one(statement.as_str(), &refs)).await?;
    extract_value(&row, 0)?
        .as_int()
        .ok_or_else(|| DbError::ExecutionError("INSERT did not return an integer id".into()))
}

fn rows_to_results(rows: &[tokio_postgres::Row]) -> Result<Vec<Row>, DbError> {
    let Some(first) = rows.first() else {
        return Ok(Vec::new());
    };
    let columns = Columns::new(
        first
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect(),
    );
    rows.iter()
        .map(|row| {
            let values = (0..row.len())
                .map(|idx| extract_value(row, idx))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Row::new(columns.clone(), values))
        })
        .collect()
}

/// Read one column into a [`SqlValue`], choosing the Rust type from the column's wire type.
pub(crate) fn extract_value(row: &tokio_postgres::Row, idx: usize) -> Result<SqlValue, DbError> {
    let ty = row.columns()[idx].type_().clone();
    let value = match ty {
        Type::INT2 => row
            .try_get::<_, Option<i16>>(idx)?
            .map(|v| SqlValue::Int(i64::from(v))),
        Type::INT4 => row
            .try_get::<_, Option<i32>>(idx)?
            .map(|v| SqlValue::Int(i64::from(v))),
        Type::INT8 => row.try_get::<_, Option<i64>>(idx)?.map(SqlValue::Int),
        Type::FLOAT4 => row
            .try_get::<_, Option<f32>>(idx)?
            .map(|v| SqlValue::Float(f64::from(v))),
        Type::FLOAT8 => row.try_get::<_, Option<f64>>(idx)?.map(SqlValue::Float),
        Type::BOOL => row.try_get::<_, Option<bool>>(idx)?.map(SqlValue::Bool),
        Type::TIMESTAMP => row
            .try_get::<_, Option<NaiveDateTime>>(idx)?
            .map(SqlValue::Timestamp),
        Type::TIMESTAMPTZ => row
            .try_get::<_, Option<DateTime<Utc>>>(idx)?
            .map(|v| SqlValue::Timestamp(v.naive_utc())),
        Type::DATE => row
            .try_get::<_, Option<NaiveDate>>(idx)?
            .map(|v| SqlValue::Text(v.to_string())),
        Type::JSON | Type::JSONB => row.try_get::<_, Option<Value>>(idx)?.map(SqlValue::Json),
        Type::BYTEA => row.try_get::<_, Option<Vec<u8>>>(idx)?.map(SqlValue::Blob),
        _ => row.try_get::<_, Option<String>>(idx)?.map(SqlValue::Text),
    };
    Ok(value.unwrap_or(SqlValue::Null))
}
