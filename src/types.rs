use std::fmt;

use chrono::NaiveDateTime;
use clap::ValueEnum;
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::translate::Dialect;

/// Which of the two supported database engines is active for this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Single-file, in-process `SQLite` database (development).
    EmbeddedFile,
    /// Networked `PostgreSQL` server behind a bounded pool (production).
    NetworkedServer,
}

impl BackendKind {
    #[must_use]
    pub fn dialect(self) -> Dialect {
        match self {
            BackendKind::EmbeddedFile => Dialect::Sqlite,
            BackendKind::NetworkedServer => Dialect::Postgres,
        }
    }

    /// Whether the matching client library was compiled into this build.
    #[must_use]
    pub fn is_compiled_in(self) -> bool {
        match self {
            BackendKind::EmbeddedFile => cfg!(feature = "sqlite"),
            BackendKind::NetworkedServer => cfg!(feature = "postgres"),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::EmbeddedFile => f.write_str("sqlite"),
            BackendKind::NetworkedServer => f.write_str("postgresql"),
        }
    }
}

/// A value bound as a statement parameter or read back from a result column.
///
/// The same enum is used for both engines, so call sites never touch driver types:
/// ```rust
/// use maksum_db::SqlValue;
///
/// let params = [SqlValue::Int(7), SqlValue::Text("durov".into()), SqlValue::Bool(false)];
/// # let _ = params;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Int(i64),
    Float(f64),
    Text(String),
    Bool(bool),
    Timestamp(NaiveDateTime),
    Json(JsonValue),
    Blob(Vec<u8>),
    Null,
}

impl SqlValue {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            SqlValue::Int(v) => Some(*v),
            SqlValue::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let SqlValue::Text(v) = self {
            Some(v)
        } else {
            None
        }
    }

    /// `SQLite` stores booleans as 0/1 integers; both shapes read back as `bool`.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SqlValue::Bool(b) => Some(*b),
            SqlValue::Int(0) => Some(false),
            SqlValue::Int(1) => Some(true),
            _ => None,
        }
    }

    /// `SQLite` keeps timestamps as text; accept its `CURRENT_TIMESTAMP` layout too.
    #[must_use]
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            SqlValue::Timestamp(ts) => Some(*ts),
            SqlValue::Text(s) => ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok()),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            SqlValue::Float(v) => Some(*v),
            #[allow(clippy::cast_precision_loss)]
            SqlValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        if let SqlValue::Blob(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }

    /// Backend-agnostic JSON rendering used when rows are turned into mappings.
    #[must_use]
    pub fn to_json(&self) -> JsonValue {
        match self {
            SqlValue::Int(v) => JsonValue::from(*v),
            SqlValue::Float(v) => JsonValue::from(*v),
            SqlValue::Text(v) => JsonValue::from(v.as_str()),
            SqlValue::Bool(v) => JsonValue::from(*v),
            SqlValue::Timestamp(ts) => JsonValue::from(ts.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
            SqlValue::Json(v) => v.clone(),
            SqlValue::Blob(bytes) => JsonValue::from(bytes.clone()),
            SqlValue::Null => JsonValue::Null,
        }
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Int(i64::from(v))
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_owned())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(SqlValue::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlite_shaped_values_read_back_typed() {
        assert_eq!(SqlValue::Int(1).as_bool(), Some(true));
        assert_eq!(SqlValue::Int(0).as_bool(), Some(false));
        assert_eq!(SqlValue::Int(2).as_bool(), None);
        let ts = SqlValue::Text("2025-03-01 12:30:00".into()).as_timestamp();
        assert_eq!(
            ts.map(|t| t.format("%H:%M").to_string()).as_deref(),
            Some("12:30")
        );
    }

    #[test]
    fn option_maps_to_null() {
        let none: Option<&str> = None;
        assert!(SqlValue::from(none).is_null());
        assert_eq!(SqlValue::from(Some(5_i64)), SqlValue::Int(5));
    }

    #[test]
    fn backend_dialects() {
        assert_eq!(BackendKind::EmbeddedFile.dialect(), Dialect::Sqlite);
        assert_eq!(BackendKind::NetworkedServer.dialect(), Dialect::Postgres);
        assert_eq!(BackendKind::NetworkedServer.to_string(), "postgresql");
    }
}
