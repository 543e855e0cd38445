//! Application-scoped database context.

use std::sync::Arc;

use tracing::info;

use crate::config::DatabaseSettings;
use crate::connection::ScopedConnection;
use crate::error::DbError;
use crate::provider::{ConnectionProvider, ProviderStatus};
use crate::repository::Repository;
use crate::schema::{self, SchemaReport};
use crate::selector::BackendSelector;
use crate::types::BackendKind;

/// Owns the connection provider and the repository for the selected backend.
///
/// Cheap to clone; clones share the same pool or database file.
#[derive(Clone)]
pub struct Database {
    settings: Arc<DatabaseSettings>,
    provider: Arc<ConnectionProvider>,
    repository: Arc<dyn Repository>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("backend", &self.provider.backend())
            .field("target", &self.target())
            .finish_non_exhaustive()
    }
}

impl Database {
    /// Pick a backend for `settings` and set it up: the pool is created (connections
    /// open lazily) or the embedded file is created.
    ///
    /// # Errors
    /// Returns `DbError::ConfigError` when no backend is usable, or the provider error.
    pub async fn connect(settings: DatabaseSettings) -> Result<Self, DbError> {
        let backend = crate::selector::decide(&settings)?;
        Self::open(backend, settings).await
    }

    /// Like [`connect`](Self::connect), but the backend comes from `selector`, so every
    /// context built from the same selector agrees on it.
    ///
    /// # Errors
    /// Same as [`connect`](Self::connect).
    pub async fn connect_with(
        settings: DatabaseSettings,
        selector: &BackendSelector,
    ) -> Result<Self, DbError> {
        let backend = selector.resolve(&settings)?;
        Self::open(backend, settings).await
    }

    async fn open(backend: BackendKind, settings: DatabaseSettings) -> Result<Self, DbError> {
        let provider = Arc::new(ConnectionProvider::connect(backend, &settings).await?);
        let repository = repository_for(&provider)?;
        let db = Self {
            settings: Arc::new(settings),
            provider,
            repository,
        };
        info!(%backend, target_db = %db.target(), "database context ready");
        Ok(db)
    }

    /// Borrow a connection for one logical operation.
    ///
    /// # Errors
    /// See [`ConnectionProvider::acquire`].
    pub async fn acquire(&self) -> Result<ScopedConnection, DbError> {
        self.provider.acquire().await
    }

    /// Run the idempotent schema bootstrap on one connection.
    ///
    /// # Errors
    /// Returns `DbError::SchemaBootstrap` naming the failing step.
    pub async fn ensure_schema(&self) -> Result<SchemaReport, DbError> {
        let conn = self
            .provider
            .acquire()
            .await
            .map_err(|e| DbError::bootstrap("acquire connection", e))?;
        schema::ensure_schema(&conn).await
    }

    /// Where the data lives, safe to log: the file path, or the server URL with the
    /// password masked.
    #[must_use]
    pub fn target(&self) -> String {
        match self.provider.sqlite_path() {
            Some(path) => path.display().to_string(),
            None => self.settings.redacted_target(),
        }
    }

    #[must_use]
    pub fn current_backend(&self) -> BackendKind {
        self.provider.backend()
    }

    /// Close the pool. Acquisitions after this fail with `DbError::ConnectionError`.
    pub fn shutdown(&self) {
        self.provider.shutdown();
    }

    #[must_use]
    pub fn status(&self) -> ProviderStatus {
        self.provider.status()
    }

    /// Data access bound to the selected backend.
    #[must_use]
    pub fn repository(&self) -> Arc<dyn Repository> {
        Arc::clone(&self.repository)
    }

    #[must_use]
    pub fn settings(&self) -> &DatabaseSettings {
        &self.settings
    }

    #[must_use]
    pub fn provider(&self) -> &Arc<ConnectionProvider> {
        &self.provider
    }

    /// Ledger entries, in migration order.
    ///
    /// # Errors
    /// Returns the engine error if the ledger cannot be read.
    pub async fn applied_migrations(&self) -> Result<Vec<String>, DbError> {
        let conn = self.provider.acquire().await?;
        schema::applied_migrations(&conn).await
    }
}

fn repository_for(provider: &Arc<ConnectionProvider>) -> Result<Arc<dyn Repository>, DbError> {
    match provider.backend() {
        #[cfg(feature = "postgres")]
        BackendKind::NetworkedServer => Ok(Arc::new(
            crate::repository::PostgresRepository::new(Arc::clone(provider)),
        )),
        #[cfg(feature = "sqlite")]
        BackendKind::EmbeddedFile => Ok(Arc::new(crate::repository::SqliteRepository::new(
            Arc::clone(provider),
        ))),
        #[allow(unreachable_patterns)]
        other => Err(DbError::Unavailable(format!(
            "{other} support is not compiled in"
        ))),
    }
}
