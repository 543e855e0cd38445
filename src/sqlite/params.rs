use rusqlite::types::Value;

use crate::types::SqlValue;

/// Convert a parameter to the engine's storage class. Booleans become 0/1 and timestamps
/// use the same text layout as `CURRENT_TIMESTAMP`.
#[must_use]
pub(crate) fn to_sqlite_value(value: &SqlValue) -> Value {
    match value {
        SqlValue::Int(i) => Value::Integer(*i),
        SqlValue::Float(f) => Value::Real(*f),
        SqlValue::Text(s) => Value::Text(s.clone()),
        SqlValue::Bool(b) => Value::Integer(i64::from(*b)),
        SqlValue::Timestamp(dt) => Value::Text(dt.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
        SqlValue::Json(v) => Value::Text(v.to_string()),
        SqlValue::Blob(bytes) => Value::Blob(bytes.clone()),
        SqlValue::Null => Value::Null,
    }
}

pub(crate) fn convert(params: &[SqlValue]) -> Vec<Value> {
    params.iter().map(to_sqlite_value).collect()
}

/// Read a column value back into the backend-agnostic shape.
#[must_use]
pub(crate) fn from_sqlite_value(value: Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Integer(i) => SqlValue::Int(i),
        Value::Real(f) => SqlValue::Float(f),
        Value::Text(s) => SqlValue::Text(s),
        Value::Blob(b) => SqlValue::Blob(b),
    }
}
