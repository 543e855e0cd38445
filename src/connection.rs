//! The per-call dispatch convention: one scoped connection, backend-agnostic calls.
//!
//! A [`ScopedConnection`] is released when it goes out of scope, whichever way the scope
//! is left. A pooled PostgreSQL lease goes back to the pool; an embedded session closes.
//!
//! Multi-statement work goes through [`ScopedConnection::begin`]. A [`Transaction`] that
//! is dropped before `commit` or `rollback` (an error path that forgot it, or a cancelled
//! future) leaves the connection marked: the next call on the same connection rolls back
//! first, and a PostgreSQL client released in that state is closed rather than pooled.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

#[cfg(feature = "postgres")]
use bb8::PooledConnection;

use crate::error::DbError;
use crate::placeholders::rewrite_placeholders;
use crate::results::Row;
use crate::translate::Dialect;
use crate::types::{BackendKind, SqlValue};

#[cfg(feature = "postgres")]
use crate::postgres::{PgManager, query as pg};
#[cfg(feature = "sqlite")]
use crate::sqlite::{SqliteSession, params as sqlite_params, query as sqlite_query};

pub(crate) enum Handle {
    #[cfg(feature = "postgres")]
    Postgres(PooledConnection<'static, PgManager>),
    #[cfg(feature = "sqlite")]
    Sqlite(SqliteSession),
}

/// A live connection borrowed for one logical database operation.
pub struct ScopedConnection {
    handle: Handle,
    command_timeout: Duration,
    abandoned_tx: AtomicBool,
}

impl std::fmt::Debug for ScopedConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedConnection")
            .field("backend", &self.backend())
            .finish_non_exhaustive()
    }
}

impl ScopedConnection {
    pub(crate) fn new(handle: Handle, command_timeout: Duration) -> Self {
        Self {
            handle,
            command_timeout,
            abandoned_tx: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn backend(&self) -> BackendKind {
        match &self.handle {
            #[cfg(feature = "postgres")]
            Handle::Postgres(_) => BackendKind::NetworkedServer,
            #[cfg(feature = "sqlite")]
            Handle::Sqlite(_) => BackendKind::EmbeddedFile,
        }
    }

    #[must_use]
    pub fn dialect(&self) -> Dialect {
        self.backend().dialect()
    }

    /// Run one or more `;`-separated statements without parameters.
    ///
    /// # Errors
    /// Returns the engine error, or `DbError::Timeout` on the networked backend.
    pub async fn execute_batch(&self, sql: &str) -> Result<(), DbError> {
        self.settle().await?;
        self.raw_batch(sql).await
    }

    /// Run a batch inside one transaction, rolling back if any statement fails.
    ///
    /// # Errors
    /// Returns the first failing statement's error after the rollback.
    pub async fn execute_batch_atomic(&self, sql: &str) -> Result<(), DbError> {
        let tx = self.begin().await?;
        let result = self.raw_batch(sql).await;
        tx.finish(result).await
    }

    /// Open a transaction on this connection.
    ///
    /// The embedded backend takes the write lock up front (`BEGIN IMMEDIATE`), so a
    /// read-then-write sequence inside the transaction cannot race another session.
    ///
    /// # Errors
    /// Returns the engine error if `BEGIN` fails.
    pub async fn begin(&self) -> Result<Transaction<'_>, DbError> {
        self.settle().await?;
        let statement = match self.backend() {
            BackendKind::NetworkedServer => "BEGIN",
            BackendKind::EmbeddedFile => "BEGIN IMMEDIATE",
        };
        // armed before BEGIN is sent: a cancelled or timed-out BEGIN may still have
        // started a transaction server-side, so the guard's drop cleans up either way
        let tx = Transaction {
            conn: self,
            open: true,
        };
        self.mark_transaction(true);
        self.raw_batch(statement).await?;
        Ok(tx)
    }

    /// Never hand this connection's session to anyone else. The pooled client is closed
    /// on release; an embedded session is closed on drop anyway.
    pub(crate) fn discard(&self) {
        #[cfg(feature = "postgres")]
        if let Handle::Postgres(client) = &self.handle {
            client.discard();
        }
    }

    fn mark_transaction(&self, open: bool) {
        #[cfg(feature = "postgres")]
        if let Handle::Postgres(client) = &self.handle {
            client.set_open_transaction(open);
        }
        #[cfg(not(feature = "postgres"))]
        let _ = open;
    }

    fn abandon_transaction(&self) {
        self.abandoned_tx.store(true, Ordering::SeqCst);
        tracing::warn!(backend = %self.backend(), "transaction dropped without commit or rollback");
    }

    /// Roll back a transaction left behind by a dropped [`Transaction`].
    async fn settle(&self) -> Result<(), DbError> {
        if !self.abandoned_tx.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        let rolled_back = match &self.handle {
            #[cfg(feature = "postgres")]
            Handle::Postgres(client) => {
                pg::execute_batch(client, "ROLLBACK", self.command_timeout).await
            }
            #[cfg(feature = "sqlite")]
            Handle::Sqlite(session) => {
                session
                    .with_connection(|conn| {
                        if !conn.is_autocommit() {
                            conn.execute_batch("ROLLBACK")?;
                        }
                        Ok(())
                    })
                    .await
            }
        };
        match rolled_back {
            Ok(()) => {
                tracing::debug!("abandoned transaction rolled back");
                self.mark_transaction(false);
                Ok(())
            }
            Err(e) => {
                self.abandoned_tx.store(true, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    async fn raw_batch(&self, sql: &str) -> Result<(), DbError> {
        match &self.handle {
            #[cfg(feature = "postgres")]
            Handle::Postgres(client) => pg::execute_batch(client, sql, self.command_timeout).await,
            #[cfg(feature = "sqlite")]
            Handle::Sqlite(session) => {
                let sql = sql.to_owned();
                session
                    .with_connection(move |conn| Ok(conn.execute_batch(&sql)?))
                    .await
            }
        }
    }

    /// Run a statement and return all rows. Placeholders may be `$N`, `?N` or `?`.
    ///
    /// # Errors
    /// Returns the engine error, or `DbError::Timeout` on the networked backend.
    pub async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, DbError> {
        self.settle().await?;
        let sql = rewrite_placeholders(sql, self.dialect().into());
        match &self.handle {
            #[cfg(feature = "postgres")]
            Handle::Postgres(client) => pg::query(client, &sql, params, self.command_timeout).await,
            #[cfg(feature = "sqlite")]
            Handle::Sqlite(session) => {
                let sql = sql.into_owned();
                let values = sqlite_params::convert(params);
                session
                    .with_connection(move |conn| sqlite_query::query_rows(conn, &sql, &values))
                    .await
            }
        }
    }

    /// Like [`query`](Self::query) but returns only the first row, if any.
    ///
    /// # Errors
    /// Returns the engine error, or `DbError::Timeout` on the networked backend.
    pub async fn query_opt(&self, sql: &str, params: &[SqlValue]) -> Result<Option<Row>, DbError> {
        Ok(self.query(sql, params).await?.into_iter().next())
    }

    /// Run a statement and return the number of affected rows.
    ///
    /// # Errors
    /// Returns the engine error, or `DbError::Timeout` on the networked backend.
    pub async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64, DbError> {
        self.settle().await?;
        let sql = rewrite_placeholders(sql, self.dialect().into());
        match &self.handle {
            #[cfg(feature = "postgres")]
            Handle::Postgres(client) => pg::execute(client, &sql, params, self.command_timeout).await,
            #[cfg(feature = "sqlite")]
            Handle::Sqlite(session) => {
                let sql = sql.into_owned();
                let values = sqlite_params::convert(params);
                session
                    .with_connection(move |conn| sqlite_query::execute(conn, &sql, &values))
                    .await
            }
        }
    }

    /// Run an INSERT into a table with an integer `id` key and return the generated id.
    ///
    /// Uses `RETURNING id` on PostgreSQL and the session's last rowid on `SQLite`; the
    /// statement must not carry its own `RETURNING` clause.
    ///
    /// # Errors
    /// Returns the engine error, or `DbError::Timeout` on the networked backend.
    pub async fn insert_returning_id(&self, sql: &str, params: &[SqlValue]) -> Result<i64, DbError> {
        self.settle().await?;
        let sql = rewrite_placeholders(sql, self.dialect().into());
        match &self.handle {
            #[cfg(feature = "postgres")]
            Handle::Postgres(client) => {
                pg::insert_returning_id(client, &sql, params, self.command_timeout).await
            }
            #[cfg(feature = "sqlite")]
            Handle::Sqlite(session) => {
                let sql = sql.into_owned();
                let values = sqlite_params::convert(params);
                session
                    .with_connection(move |conn| {
                        sqlite_query::insert_returning_id(conn, &sql, &values)
                    })
                    .await
            }
        }
    }

    /// Column names of `table` in declaration order; empty if the table is absent.
    ///
    /// # Errors
    /// Returns the engine error or `DbError::ParameterError` for an unsafe table name.
    pub async fn table_columns(&self, table: &str) -> Result<Vec<String>, DbError> {
        self.settle().await?;
        match &self.handle {
            #[cfg(feature = "postgres")]
            Handle::Postgres(client) => {
                let rows = pg::query(
                    client,
                    "SELECT column_name::text AS column_name FROM information_schema.columns \
                     WHERE table_schema = current_schema() AND table_name = $1 \
                     ORDER BY ordinal_position",
                    &[SqlValue::from(table)],
                    self.command_timeout,
                )
                .await?;
                Ok(rows
                    .iter()
                    .filter_map(|row| row.get_str("column_name").map(str::to_owned))
                    .collect())
            }
            #[cfg(feature = "sqlite")]
            Handle::Sqlite(session) => {
                let table = table.to_owned();
                session
                    .with_connection(move |conn| sqlite_query::table_columns(conn, &table))
                    .await
            }
        }
    }

    /// Run a closure against the raw embedded connection.
    ///
    /// # Errors
    /// Returns `DbError::Unavailable` on the networked backend, otherwise the closure's result.
    #[cfg(feature = "sqlite")]
    pub async fn with_sqlite<F, R>(&self, func: F) -> Result<R, DbError>
    where
        F: FnOnce(&mut rusqlite::Connection) -> Result<R, DbError> + Send + 'static,
        R: Send + 'static,
    {
        self.settle().await?;
        match &self.handle {
            Handle::Sqlite(session) => session.with_connection(func).await,
            #[cfg(feature = "postgres")]
            Handle::Postgres(_) => Err(DbError::Unavailable(
                "raw sqlite access on a postgresql connection".into(),
            )),
        }
    }

    /// The raw pooled client, when this is a networked connection.
    #[cfg(feature = "postgres")]
    #[must_use]
    pub fn postgres_client(&self) -> Option<&tokio_postgres::Client> {
        match &self.handle {
            Handle::Postgres(client) => Some(client.client()),
            #[cfg(feature = "sqlite")]
            Handle::Sqlite(_) => None,
        }
    }
}

/// An open transaction on a [`ScopedConnection`].
///
/// Finish it with [`commit`](Self::commit), [`rollback`](Self::rollback) or
/// [`finish`](Self::finish). Dropping it while still open does not block: the rollback
/// happens on the connection's next call, or by closing the session when the
/// connection is released first.
#[must_use = "a transaction rolls back unless it is committed"]
pub struct Transaction<'c> {
    conn: &'c ScopedConnection,
    open: bool,
}

impl std::fmt::Debug for Transaction<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("backend", &self.conn.backend())
            .field("open", &self.open)
            .finish()
    }
}

impl Transaction<'_> {
    /// # Errors
    /// Returns the engine error if `COMMIT` fails; the transaction is then rolled back
    /// on the connection's next call.
    pub async fn commit(mut self) -> Result<(), DbError> {
        self.conn.raw_batch("COMMIT").await?;
        self.close();
        Ok(())
    }

    /// # Errors
    /// Returns the engine error if `ROLLBACK` fails.
    pub async fn rollback(mut self) -> Result<(), DbError> {
        self.conn.raw_batch("ROLLBACK").await?;
        self.close();
        Ok(())
    }

    /// Commit when `result` is `Ok`, otherwise roll back and hand the error back.
    ///
    /// # Errors
    /// Returns `result`'s error, or the `COMMIT` error.
    pub async fn finish<T>(self, result: Result<T, DbError>) -> Result<T, DbError> {
        match result {
            Ok(value) => {
                self.commit().await?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = self.rollback().await {
                    tracing::debug!(error = %rollback, "rollback failed");
                }
                Err(e)
            }
        }
    }

    fn close(&mut self) {
        self.open = false;
        self.conn.mark_transaction(false);
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.open {
            self.conn.abandon_transaction();
        }
    }
}
