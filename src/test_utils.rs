//! Throwaway PostgreSQL server for networked-backend tests.

use postgresql_embedded::PostgreSQL;
use tracing::info;

use crate::config::DatabaseSettings;
use crate::error::DbError;

/// A running embedded server with one freshly created database.
pub struct EmbeddedPostgres {
    postgresql: PostgreSQL,
    settings: DatabaseSettings,
}

fn embedded_error(step: &str, e: &postgresql_embedded::Error) -> DbError {
    DbError::ConnectionError(format!("embedded postgresql {step}: {e}"))
}

impl EmbeddedPostgres {
    /// Install (bundled binaries), start the server and create `db_name`.
    ///
    /// # Errors
    /// Returns `DbError::ConnectionError` if any of those steps fails.
    pub async fn start(db_name: &str) -> Result<Self, DbError> {
        let mut postgresql = PostgreSQL::default();
        postgresql
            .setup()
            .await
            .map_err(|e| embedded_error("setup", &e))?;
        postgresql
            .start()
            .await
            .map_err(|e| embedded_error("start", &e))?;
        postgresql
            .create_database(db_name)
            .await
            .map_err(|e| embedded_error("create database", &e))?;

        let server = postgresql.settings();
        let settings = DatabaseSettings::builder()
            .postgres_host(server.host.clone())
            .postgres_port(server.port)
            .postgres_user(server.username.clone())
            .postgres_password(server.password.clone())
            .postgres_db(db_name)
            .finish();
        info!(port = server.port, db = db_name, "embedded postgresql started");
        Ok(Self {
            postgresql,
            settings,
        })
    }

    /// Settings pointing at the embedded database; adjust the pool before connecting.
    #[must_use]
    pub fn settings(&self) -> DatabaseSettings {
        self.settings.clone()
    }

    /// # Errors
    /// Returns `DbError::ConnectionError` if the server does not stop cleanly.
    pub async fn stop(self) -> Result<(), DbError> {
        self.postgresql
            .stop()
            .await
            .map_err(|e| embedded_error("stop", &e))
    }
}
