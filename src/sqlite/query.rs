use rusqlite::types::Value;
use rusqlite::{Connection, params_from_iter};

use super::params::from_sqlite_value;
use crate::error::DbError;
use crate::results::{Columns, Row};

/// Run a statement and collect every row it yields.
pub(crate) fn query_rows(
    conn: &Connection,
    sql: &str,
    params: &[Value],
) -> Result<Vec<Row>, DbError> {
    let mut stmt = conn.prepare(sql)?;
    let columns = Columns::new(
        stmt.column_names()
            .iter()
            .map(std::string::ToString::to_string)
            .collect(),
    );
    let width = stmt.column_count();

    let mut rows = stmt.query(params_from_iter(params.iter()))?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let values = (0..width)
            .map(|idx| row.get::<_, Value>(idx).map(from_sqlite_value))
            .collect::<Result<Vec<_>, _>>()?;
        out.push(Row::new(columns.clone(), values));
    }
    Ok(out)
}

pub(crate) fn execute(conn: &Connection, sql: &str, params: &[Value]) -> Result<u64, DbError> {
    let changed = conn.execute(sql, params_from_iter(params.iter()))?;
    Ok(changed as u64)
}

/// Insert and return the engine-assigned rowid.
pub(crate) fn insert_returning_id(
    conn: &Connection,
    sql: &str,
    params: &[Value],
) -> Result<i64, DbError> {
    conn.execute(sql, params_from_iter(params.iter()))?;
    Ok(conn.last_insert_rowid())
}

/// Column names of `table`, in declaration order. Empty when the table does not exist.
pub(crate) fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>, DbError> {
    if table.is_empty() || !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(DbError::ParameterError(format!(
            "invalid table name for introspection: {table:?}"
        )));
    }
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names)
}
