use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use rusqlite::Connection;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::DbError;

pub(crate) type SharedSqliteConnection = Arc<Mutex<Connection>>;

/// How long a session waits on the engine's write lock before reporting `SQLITE_BUSY`.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Create the data directory and database file if needed. Returns the fixed path every
/// session opens.
pub(crate) async fn prepare_file(path: PathBuf) -> Result<PathBuf, DbError> {
    tokio::task::spawn_blocking(move || -> Result<PathBuf, DbError> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let conn = open_with_pragmas(&path)?;
        drop(conn);
        info!(path = %path.display(), "sqlite database ready");
        Ok(path)
    })
    .await
    .map_err(join_error)?
}

fn open_with_pragmas(path: &Path) -> Result<Connection, DbError> {
    let conn = Connection::open(path)?;
    // not persisted by the engine, so every new session has to ask again
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(conn)
}

fn join_error(e: tokio::task::JoinError) -> DbError {
    DbError::ExecutionError(format!("sqlite spawn_blocking join error: {e}"))
}

/// One short-lived session against the embedded file. The connection is closed when the
/// session is dropped.
pub struct SqliteSession {
    conn: SharedSqliteConnection,
    open_sessions: Arc<AtomicUsize>,
}

impl SqliteSession {
    pub(crate) async fn open(path: &Path, open_sessions: Arc<AtomicUsize>) -> Result<Self, DbError> {
        let path = path.to_path_buf();
        let conn = tokio::task::spawn_blocking(move || open_with_pragmas(&path))
            .await
            .map_err(join_error)??;
        open_sessions.fetch_add(1, Ordering::SeqCst);
        debug!("sqlite session opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            open_sessions,
        })
    }

    /// Run `func` against the raw connection on the blocking pool.
    ///
    /// # Errors
    /// Returns whatever `func` returns, or `DbError::ExecutionError` if the blocking task fails.
    pub async fn with_connection<F, R>(&self, func: F) -> Result<R, DbError>
    where
        F: FnOnce(&mut Connection) -> Result<R, DbError> + Send + 'static,
        R: Send + 'static,
    {
        run_blocking(Arc::clone(&self.conn), func).await
    }
}

impl Drop for SqliteSession {
    fn drop(&mut self) {
        self.open_sessions.fetch_sub(1, Ordering::SeqCst);
        debug!("sqlite session closed");
    }
}

impl fmt::Debug for SqliteSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteSession").finish_non_exhaustive()
    }
}

pub(crate) async fn run_blocking<F, R>(conn: SharedSqliteConnection, func: F) -> Result<R, DbError>
where
    F: FnOnce(&mut Connection) -> Result<R, DbError> + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut guard = conn.blocking_lock();
        func(&mut guard)
    })
    .await
    .map_err(join_error)?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn every_session_enforces_foreign_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = prepare_file(dir.path().join("nested").join("maksum.db"))
            .await
            .unwrap();
        assert!(path.exists());

        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..2 {
            let session = SqliteSession::open(&path, counter.clone()).await.unwrap();
            assert_eq!(counter.load(Ordering::SeqCst), 1);
            let fk: i64 = session
                .with_connection(|conn| {
                    Ok(conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0))?)
                })
                .await
                .unwrap();
            assert_eq!(fk, 1);
        }
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
