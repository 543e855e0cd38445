//! Hands out [`ScopedConnection`]s for the selected backend.

use std::path::PathBuf;
#[cfg(feature = "postgres")]
use std::sync::{PoisonError, RwLock};
#[cfg(feature = "sqlite")]
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};
use std::time::Duration;

use serde::Serialize;
use tracing::info;

use crate::config::DatabaseSettings;
use crate::connection::{Handle, ScopedConnection};
use crate::error::DbError;
use crate::types::BackendKind;

#[cfg(feature = "postgres")]
use crate::postgres::{PgManager, PgPool};
#[cfg(feature = "sqlite")]
use crate::sqlite::{SqliteSession, prepare_file};

/// Connection counts reported by [`ConnectionProvider::status`].
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ProviderStatus {
    pub backend: BackendKind,
    /// Connections currently open (leased plus idle for the pool; live sessions otherwise).
    pub open_connections: usize,
    pub idle_connections: usize,
    pub shut_down: bool,
}

enum Source {
    #[cfg(feature = "postgres")]
    Pool {
        pool: RwLock<Option<PgPool>>,
        acquire_timeout: Duration,
    },
    #[cfg(feature = "sqlite")]
    File {
        path: PathBuf,
        open_sessions: Arc<AtomicUsize>,
    },
}

/// Process-lifetime owner of the pool (networked) or the database path (embedded).
pub struct ConnectionProvider {
    backend: BackendKind,
    source: Source,
    command_timeout: Duration,
}

impl std::fmt::Debug for ConnectionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionProvider")
            .field("backend", &self.backend)
            .finish_non_exhaustive()
    }
}

impl ConnectionProvider {
    /// Build the provider for `backend`: the bounded pool, or the prepared embedded file.
    ///
    /// # Errors
    /// Returns `DbError::Unavailable` if `backend` is not compiled in, `DbError::ConfigError`
    /// for an unusable networked target, or an I/O error creating the embedded file.
    pub async fn connect(backend: BackendKind, settings: &DatabaseSettings) -> Result<Self, DbError> {
        let source = match backend {
            BackendKind::NetworkedServer => Self::pool_source(settings)?,
            BackendKind::EmbeddedFile => Self::file_source(settings).await?,
        };
        Ok(Self {
            backend,
            source,
            command_timeout: settings.pool.command_timeout,
        })
    }

    #[cfg(feature = "postgres")]
    fn pool_source(settings: &DatabaseSettings) -> Result<Source, DbError> {
        let config = settings.postgres_config()?;
        let pool = PgManager::new(config).build_pool(&settings.pool);
        info!(
            target_db = %settings.redacted_target(),
            max_size = settings.pool.max_size,
            min_idle = settings.pool.min_idle,
            "postgresql pool created"
        );
        Ok(Source::Pool {
            pool: RwLock::new(Some(pool)),
            acquire_timeout: settings.pool.acquire_timeout,
        })
    }

    #[cfg(not(feature = "postgres"))]
    fn pool_source(_settings: &DatabaseSettings) -> Result<Source, DbError> {
        Err(DbError::Unavailable("postgresql support is not compiled in".into()))
    }

    #[cfg(feature = "sqlite")]
    async fn file_source(settings: &DatabaseSettings) -> Result<Source, DbError> {
        let path = prepare_file(settings.sqlite_path()).await?;
        Ok(Source::File {
            path,
            open_sessions: Arc::new(AtomicUsize::new(0)),
        })
    }

    #[cfg(not(feature = "sqlite"))]
    #[allow(clippy::unused_async)]
    async fn file_source(_settings: &DatabaseSettings) -> Result<Source, DbError> {
        Err(DbError::Unavailable("sqlite support is not compiled in".into()))
    }

    #[must_use]
    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    /// Location of the embedded database file, when that backend is active.
    #[must_use]
    pub fn sqlite_path(&self) -> Option<PathBuf> {
        match &self.source {
            #[cfg(feature = "sqlite")]
            Source::File { path, .. } => Some(path.clone()),
            #[cfg(feature = "postgres")]
            Source::Pool { .. } => None,
        }
    }

    /// Borrow a connection. With a full pool this waits up to the acquire timeout.
    ///
    /// # Errors
    /// Returns `DbError::PoolExhausted` when no pooled connection frees up in time,
    /// `DbError::ConnectionError` when the server cannot be reached or the pool was shut
    /// down, or the engine error opening an embedded session.
    pub async fn acquire(&self) -> Result<ScopedConnection, DbError> {
        let handle = match &self.source {
            #[cfg(feature = "postgres")]
            Source::Pool {
                pool,
                acquire_timeout,
            } => {
                let pool = pool
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone()
                    .ok_or_else(|| {
                        DbError::ConnectionError("postgresql pool has been shut down".into())
                    })?;
                let conn = pool.get_owned().await.map_err(|e| match e {
                    bb8::RunError::User(e) => {
                        DbError::ConnectionError(format!("postgres checkout error: {e}"))
                    }
                    bb8::RunError::TimedOut => DbError::PoolExhausted(format!(
                        "no connection became free within {acquire_timeout:?}"
                    )),
                })?;
                Handle::Postgres(conn)
            }
            #[cfg(feature = "sqlite")]
            Source::File {
                path,
                open_sessions,
            } => Handle::Sqlite(SqliteSession::open(path, Arc::clone(open_sessions)).await?),
        };
        Ok(ScopedConnection::new(handle, self.command_timeout))
    }

    /// Release the networked pool. Idle connections close now, leased ones as they return.
    /// Later acquisitions fail. Nothing to do for the embedded backend.
    pub fn shutdown(&self) {
        match &self.source {
            #[cfg(feature = "postgres")]
            Source::Pool { pool, .. } => {
                let taken = pool.write().unwrap_or_else(PoisonError::into_inner).take();
                if taken.is_some() {
                    info!("postgresql pool closed");
                }
            }
            #[cfg(feature = "sqlite")]
            Source::File { .. } => {}
        }
    }

    #[must_use]
    pub fn status(&self) -> ProviderStatus {
        match &self.source {
            #[cfg(feature = "postgres")]
            Source::Pool { pool, .. } => {
                let guard = pool.read().unwrap_or_else(PoisonError::into_inner);
                match guard.as_ref() {
                    Some(pool) => {
                        let state = pool.state();
                        ProviderStatus {
                            backend: self.backend,
                            open_connections: state.connections as usize,
                            idle_connections: state.idle_connections as usize,
                            shut_down: false,
                        }
                    }
                    None => ProviderStatus {
                        backend: self.backend,
                        open_connections: 0,
                        idle_connections: 0,
                        shut_down: true,
                    },
                }
            }
            #[cfg(feature = "sqlite")]
            Source::File { open_sessions, .. } => ProviderStatus {
                backend: self.backend,
                open_connections: open_sessions.load(Ordering::SeqCst),
                idle_connections: 0,
                shut_down: false,
            },
        }
    }
}
