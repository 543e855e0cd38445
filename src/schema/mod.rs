//! Idempotent schema bootstrap: tables, indexes, additive columns, triggers and the
//! ledger-tracked one-time migrations. Safe to run on every startup.

mod columns;
mod migrations;
mod tables;

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::connection::ScopedConnection;
use crate::error::DbError;
use crate::translate::{Dialect, translate_statements};
use crate::types::{BackendKind, SqlValue};

pub use migrations::ADMIN_USERNAMES;

/// Session-level advisory lock key serializing concurrent bootstraps on one server.
pub const BOOTSTRAP_LOCK_KEY: i64 = 0x6d61_6b73_756d;

/// What a bootstrap run changed.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct SchemaReport {
    pub backend: Option<BackendKind>,
    pub tables: usize,
    pub columns_added: Vec<String>,
    pub migrations_applied: Vec<String>,
    /// Tag tables dropped and recreated because they predate `tag_id`.
    pub legacy_tag_tables_rebuilt: bool,
}

/// Names of every migration already recorded in the ledger, oldest first by list order.
///
/// # Errors
/// Returns the engine error if the ledger cannot be read.
pub async fn applied_migrations(conn: &ScopedConnection) -> Result<Vec<String>, DbError> {
    if conn.table_columns("applied_migrations").await?.is_empty() {
        return Ok(Vec::new());
    }
    let rows = conn
        .query("SELECT name FROM applied_migrations ORDER BY name", &[])
        .await?;
    let recorded: Vec<String> = rows
        .iter()
        .filter_map(|r| r.get_str("name").map(str::to_owned))
        .collect();
    let mut ordered: Vec<String> = migrations::MIGRATIONS
        .iter()
        .filter(|m| recorded.iter().any(|r| r == m.name))
        .map(|m| m.name.to_string())
        .collect();
    // names written by something other than this crate go last
    ordered.extend(
        recorded
            .into_iter()
            .filter(|r| !migrations::MIGRATIONS.iter().any(|m| m.name == r)),
    );
    Ok(ordered)
}

/// Bring the schema up to date using one connection for the whole sequence.
///
/// On PostgreSQL the run holds a session advisory lock, so replicas starting together
/// bootstrap one after another. On the embedded file each migration takes the write lock
/// before checking the ledger.
///
/// # Errors
/// Returns `DbError::SchemaBootstrap` for any failure other than "already exists".
pub async fn ensure_schema(conn: &ScopedConnection) -> Result<SchemaReport, DbError> {
    let dialect = conn.dialect();
    let lock = if dialect == Dialect::Postgres {
        Some(BootstrapLock::acquire(conn).await?)
    } else {
        None
    };

    let outcome = bootstrap(conn, dialect).await;

    if let Some(lock) = lock {
        lock.release().await;
    }

    let mut report = outcome?;
    report.backend = Some(conn.backend());
    info!(
        backend = %conn.backend(),
        tables = report.tables,
        columns_added = report.columns_added.len(),
        migrations_applied = report.migrations_applied.len(),
        "database schema ready"
    );
    Ok(report)
}

/// The session advisory lock held for one bootstrap run.
///
/// If the run is cancelled while the lock is held, or the unlock itself fails, the
/// connection is discarded so the server drops the lock with the session.
struct BootstrapLock<'c> {
    conn: &'c ScopedConnection,
    held: bool,
}

impl<'c> BootstrapLock<'c> {
    async fn acquire(conn: &'c ScopedConnection) -> Result<Self, DbError> {
        // armed first: a cancelled wait may still be granted the lock server-side
        let mut lock = Self { conn, held: true };
        if let Err(e) = conn
            .execute(
                "SELECT pg_advisory_lock($1)",
                &[SqlValue::Int(BOOTSTRAP_LOCK_KEY)],
            )
            .await
        {
            conn.discard();
            lock.held = false;
            return Err(DbError::bootstrap("acquire bootstrap lock", e));
        }
        debug!("bootstrap advisory lock held");
        Ok(lock)
    }

    async fn release(mut self) {
        if let Err(e) = self
            .conn
            .execute(
                "SELECT pg_advisory_unlock($1)",
                &[SqlValue::Int(BOOTSTRAP_LOCK_KEY)],
            )
            .await
        {
            warn!(error = %e, "failed to release bootstrap advisory lock; discarding connection");
            self.conn.discard();
        }
        self.held = false;
    }
}

impl Drop for BootstrapLock<'_> {
    fn drop(&mut self) {
        if self.held {
            warn!("bootstrap cancelled while holding the advisory lock; discarding connection");
            self.conn.discard();
        }
    }
}

async fn bootstrap(conn: &ScopedConnection, dialect: Dialect) -> Result<SchemaReport, DbError> {
    let mut report = SchemaReport::default();

    if dialect == Dialect::Sqlite {
        report.legacy_tag_tables_rebuilt = repair_legacy_tag_tables(conn).await?;
    }

    for table in tables::TABLES {
        for statement in translate_statements(table.ddl, dialect) {
            run_tolerant(conn, &format!("create {}", table.name), &statement).await?;
        }
        report.tables += 1;
    }

    report.columns_added = add_missing_columns(conn, dialect).await?;
    install_updated_at_triggers(conn, dialect).await?;

    run_tolerant(conn, "create applied_migrations", tables::LEDGER_DDL).await?;
    report.migrations_applied = apply_migrations(conn, dialect).await?;

    Ok(report)
}

/// Execute one schema statement, tolerating only "already exists".
async fn run_tolerant(conn: &ScopedConnection, step: &str, sql: &str) -> Result<(), DbError> {
    match conn.execute_batch(sql).await {
        Ok(()) => Ok(()),
        Err(e) if e.is_already_exists() => {
            debug!(step, error = %e, "schema object already exists");
            Ok(())
        }
        Err(e) => Err(DbError::bootstrap(step, e)),
    }
}

async fn columns_of(conn: &ScopedConnection, table: &str) -> Result<Vec<String>, DbError> {
    conn.table_columns(table)
        .await
        .map_err(|e| DbError::bootstrap(format!("inspect {table}"), e))
}

/// An early embedded layout had `post_tags` without `tag_id`; drop it and its sibling so
/// both are recreated with the current shape.
async fn repair_legacy_tag_tables(conn: &ScopedConnection) -> Result<bool, DbError> {
    let cols = columns_of(conn, "post_tags").await?;
    if cols.is_empty() || cols.iter().any(|c| c == "tag_id") {
        return Ok(false);
    }
    warn!("post_tags predates tag_id; recreating tag tables");
    run_tolerant(
        conn,
        "drop legacy tag tables",
        "DROP TABLE IF EXISTS post_tags; DROP TABLE IF EXISTS user_tag_subscriptions;",
    )
    .await?;
    Ok(true)
}

async fn add_missing_columns(
    conn: &ScopedConnection,
    dialect: Dialect,
) -> Result<Vec<String>, DbError> {
    let mut existing: HashMap<&str, Vec<String>> = HashMap::new();
    let mut added = Vec::new();
    for col in columns::ADDED_COLUMNS {
        if !existing.contains_key(col.table) {
            existing.insert(col.table, columns_of(conn, col.table).await?);
        }
        let present = existing
            .get(col.table)
            .is_some_and(|cols| cols.iter().any(|c| c == col.column));
        if present {
            continue;
        }
        let sql = columns::add_column_sql(col.table, col.column, col.definition, dialect);
        run_tolerant(conn, &format!("add column {}.{}", col.table, col.column), &sql).await?;
        info!(table = col.table, column = col.column, "column added");
        added.push(format!("{}.{}", col.table, col.column));
    }
    Ok(added)
}

async fn install_updated_at_triggers(
    conn: &ScopedConnection,
    dialect: Dialect,
) -> Result<(), DbError> {
    if dialect == Dialect::Postgres {
        run_tolerant(conn, "create updated_at function", tables::PG_UPDATED_AT_FUNCTION).await?;
    }
    for table in tables::UPDATED_AT_TABLES {
        let sql = match dialect {
            Dialect::Postgres => tables::pg_updated_at_trigger(table),
            Dialect::Sqlite => tables::sqlite_updated_at_trigger(table),
        };
        run_tolerant(conn, &format!("create {table} updated_at trigger"), &sql).await?;
    }
    Ok(())
}

/// Each migration runs in its own transaction and re-reads the ledger inside it. On the
/// embedded file that transaction holds the write lock, so two processes bootstrapping
/// the same file at once apply each migration exactly once.
async fn apply_migrations(conn: &ScopedConnection, dialect: Dialect) -> Result<Vec<String>, DbError> {
    let mut applied = Vec::new();
    for migration in migrations::MIGRATIONS {
        let step = format!("migration {}", migration.name);
        let tx = conn
            .begin()
            .await
            .map_err(|e| DbError::bootstrap(step.clone(), e))?;
        let ran = tx
            .finish(apply_migration(conn, dialect, migration).await)
            .await
            .map_err(|e| DbError::bootstrap(step, e))?;
        if ran {
            info!(migration = migration.name, "{}", migration.summary);
            applied.push(migration.name.to_string());
        }
    }
    Ok(applied)
}

/// Run one migration inside the caller's transaction; `false` if the ledger already has it.
async fn apply_migration(
    conn: &ScopedConnection,
    dialect: Dialect,
    migration: &migrations::Migration,
) -> Result<bool, DbError> {
    let done = conn
        .query_opt(
            "SELECT 1 AS applied FROM applied_migrations WHERE name = $1",
            &[SqlValue::from(migration.name)],
        )
        .await?
        .is_some();
    if done {
        debug!(migration = migration.name, "already recorded");
        return Ok(false);
    }

    let mut table_columns: HashMap<&str, Vec<String>> = HashMap::new();
    for table in migration.steps.iter().filter_map(|s| s.table()) {
        if !table_columns.contains_key(table) {
            table_columns.insert(table, conn.table_columns(table).await?);
        }
    }
    let batch = migrations::migration_batch(migration, dialect, |table| {
        table_columns.get(table).cloned().unwrap_or_default()
    });
    conn.execute_batch(&batch).await?;
    Ok(true)
}
