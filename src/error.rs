use thiserror::Error;

/// Every failure surfaced by the persistence layer.
#[derive(Debug, Error)]
pub enum DbError {
    #[cfg(feature = "postgres")]
    #[error(transparent)]
    PostgresError(#[from] tokio_postgres::Error),

    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    SqliteError(#[from] rusqlite::Error),

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Schema bootstrap failed at {step}: {source}")]
    SchemaBootstrap {
        step: String,
        #[source]
        source: Box<DbError>,
    },

    #[error("Connection pool exhausted: {0}")]
    PoolExhausted(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Command timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Parameter conversion error: {0}")]
    ParameterError(String),

    #[error("SQL execution error: {0}")]
    ExecutionError(String),

    #[error("Backend unavailable in this build: {0}")]
    Unavailable(String),
}

/// Coarse classification used by collaborators to pick a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// No usable backend or missing settings. Fatal at startup.
    Configuration,
    /// CREATE/ALTER/migration failure. Fatal at startup.
    SchemaBootstrap,
    /// A single statement failed; the request fails, the process carries on.
    TransientQuery,
    /// No pooled connection became free in time, or the backend is unreachable.
    ConnectionExhaustion,
}

impl DbError {
    pub(crate) fn bootstrap(step: impl Into<String>, source: DbError) -> Self {
        DbError::SchemaBootstrap {
            step: step.into(),
            source: Box::new(source),
        }
    }

    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            DbError::ConfigError(_) | DbError::Unavailable(_) => ErrorClass::Configuration,
            DbError::SchemaBootstrap { .. } => ErrorClass::SchemaBootstrap,
            DbError::PoolExhausted(_) | DbError::ConnectionError(_) | DbError::IoError(_) => {
                ErrorClass::ConnectionExhaustion
            }
            #[cfg(feature = "postgres")]
            DbError::PostgresError(e) if e.is_closed() => ErrorClass::ConnectionExhaustion,
            _ => ErrorClass::TransientQuery,
        }
    }

    /// Whether a collaborator should answer "service unavailable" rather than a
    /// request-specific failure.
    #[must_use]
    pub fn is_service_unavailable(&self) -> bool {
        !matches!(self.class(), ErrorClass::TransientQuery)
    }

    /// True for "object already exists" failures, the only class tolerated while
    /// creating schema objects.
    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        match self {
            #[cfg(feature = "postgres")]
            DbError::PostgresError(e) => e.code().is_some_and(|code| {
                use tokio_postgres::error::SqlState;
                *code == SqlState::DUPLICATE_TABLE
                    || *code == SqlState::DUPLICATE_COLUMN
                    || *code == SqlState::DUPLICATE_OBJECT
                    || *code == SqlState::DUPLICATE_FUNCTION
                    || *code == SqlState::DUPLICATE_SCHEMA
            }),
            #[cfg(feature = "sqlite")]
            DbError::SqliteError(e) => {
                let msg = e.to_string();
                msg.contains("already exists") || msg.contains("duplicate column name")
            }
            DbError::ExecutionError(msg) => msg.contains("already exists"),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_follows_taxonomy() {
        assert_eq!(
            DbError::ConfigError("missing".into()).class(),
            ErrorClass::Configuration
        );
        assert_eq!(
            DbError::PoolExhausted("busy".into()).class(),
            ErrorClass::ConnectionExhaustion
        );
        assert_eq!(
            DbError::ExecutionError("constraint".into()).class(),
            ErrorClass::TransientQuery
        );
        let wrapped = DbError::bootstrap("create users", DbError::ExecutionError("boom".into()));
        assert_eq!(wrapped.class(), ErrorClass::SchemaBootstrap);
        assert!(wrapped.is_service_unavailable());
        assert!(!DbError::ExecutionError("x".into()).is_service_unavailable());
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn sqlite_duplicate_column_counts_as_already_exists() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (a INTEGER)").unwrap();
        let err: DbError = conn
            .execute_batch("ALTER TABLE t ADD COLUMN a INTEGER")
            .unwrap_err()
            .into();
        assert!(err.is_already_exists());

        let err: DbError = conn
            .execute_batch("CREATE TABLE t (a INTEGER)")
            .unwrap_err()
            .into();
        assert!(err.is_already_exists());

        let err: DbError = conn.execute_batch("SELECT nope FROM t").unwrap_err().into();
        assert!(!err.is_already_exists());
    }
}
