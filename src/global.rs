//! Process-wide database access for code that has no [`Database`] handle to pass around.
//!
//! The context is built from the environment on first use. Concurrent first callers
//! wait on the same initialization, so only one pool is ever created.

use tokio::sync::OnceCell;

use crate::config::DatabaseSettings;
use crate::connection::ScopedConnection;
use crate::database::Database;
use crate::error::DbError;
use crate::schema::SchemaReport;
use crate::selector::process_selector;
use crate::types::BackendKind;

static DATABASE: OnceCell<Database> = OnceCell::const_new();

/// The shared context, created on first call.
///
/// # Errors
/// Returns the configuration or provider error; a later call retries.
pub async fn database() -> Result<&'static Database, DbError> {
    DATABASE
        .get_or_try_init(|| async {
            let settings = DatabaseSettings::from_env()?;
            Database::connect_with(settings, process_selector()).await
        })
        .await
}

/// # Errors
/// See [`Database::acquire`].
pub async fn acquire() -> Result<ScopedConnection, DbError> {
    database().await?.acquire().await
}

/// # Errors
/// See [`Database::ensure_schema`].
pub async fn ensure_schema() -> Result<SchemaReport, DbError> {
    database().await?.ensure_schema().await
}

/// The backend in use, deciding it from the environment if nothing has yet.
///
/// # Errors
/// Returns `DbError::ConfigError` when no backend is usable.
pub fn current_backend() -> Result<BackendKind, DbError> {
    match DATABASE.get() {
        Some(db) => Ok(db.current_backend()),
        None => crate::selector::resolve(),
    }
}

/// Close the shared pool if one was created.
pub fn shutdown() {
    if let Some(db) = DATABASE.get() {
        db.shutdown();
    }
}
