//! Rewrites MySQL-flavoured schema DDL into `PostgreSQL` or `SQLite` DDL.
//!
//! This is plain text substitution over a fixed statement corpus, not a SQL parser.
//! Keywords and type names are matched in upper case only, so lower-case identifiers
//! such as a column called `timestamp` are left alone. Rules run in a fixed order and
//! no rule matches text produced by an earlier one:
//!
//! 1. auto-increment integer keys (`SERIAL` / `INTEGER PRIMARY KEY AUTOINCREMENT`)
//! 2. absolute timestamp types (`DATETIME` → `TIMESTAMP` on `PostgreSQL`)
//! 3. current-timestamp function or keyword (`NOW()` vs `CURRENT_TIMESTAMP`)
//! 4. storage engine, charset and collation clauses are dropped
//! 5. `UNIQUE KEY name (..)` → `CONSTRAINT name UNIQUE (..)`
//! 6. inline `INDEX name (..)` → trailing `CREATE INDEX IF NOT EXISTS`
//! 7. `col ENUM('a','b')` → `col VARCHAR(n) CHECK (col IN ('a', 'b'))`
//!
//! New DDL added later must be checked against both engines by hand.

use std::sync::LazyLock;

use clap::ValueEnum;
use regex::{Captures, Regex};
use serde::Serialize;

use crate::placeholders::split_statements;

/// Target SQL dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Postgres,
    Sqlite,
}

const MIN_ENUM_WIDTH: usize = 50;

static AUTO_INCREMENT_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(BIGINT|INTEGER|INT)(?:\(\d+\))?(?:\s+UNSIGNED)?(\s+NOT\s+NULL)?\s+AUTO_INCREMENT(\s+PRIMARY\s+KEY)?",
    )
    .expect("auto-increment pattern")
});
static DATETIME_TYPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bDATETIME\b").expect("datetime pattern"));
static ON_UPDATE_NOW: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s+ON\s+UPDATE\s+(?:CURRENT_TIMESTAMP(?:\(\))?|NOW\(\))")
        .expect("on-update pattern")
});
static CURRENT_TIMESTAMP_KW: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bCURRENT_TIMESTAMP(?:\(\))?").expect("current timestamp pattern")
});
static NOW_FN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bNOW\(\)").expect("now() pattern"));
static TABLE_OPTIONS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\s*\b(?:ENGINE\s*=\s*\w+|AUTO_INCREMENT\s*=\s*\d+|(?:DEFAULT\s+)?(?:CHARSET|CHARACTER\s+SET)\s*=?\s*\w+|COLLATE\s*=?\s*\w+)",
    )
    .expect("table options pattern")
});
static NAMED_UNIQUE_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bUNIQUE\s+(?:KEY|INDEX)\s+(\w+)\s*\(").expect("named unique key pattern")
});
static ANON_UNIQUE_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bUNIQUE\s+(?:KEY|INDEX)\s*\(").expect("unique key pattern")
});
static INLINE_INDEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r",\s*(?:INDEX|KEY)\s+(\w+)\s*\(([^)]*)\)").expect("inline index pattern")
});
static TABLE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bCREATE\s+TABLE\s+(?:IF\s+NOT\s+EXISTS\s+)?(\w+)").expect("table name pattern")
});
static ENUM_COLUMN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\w+)\s+ENUM\s*\(((?:\s*'(?:[^']|'')*'\s*,?)+)\)").expect("enum column pattern")
});
static QUOTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"'((?:[^']|'')*)'").expect("quoted literal pattern"));

/// Translate a statement (or a `;`-separated script) for `target`.
///
/// Inline index clauses come back as extra `CREATE INDEX IF NOT EXISTS` statements
/// separated by `;\n`, so the result may need `execute_batch`.
#[must_use]
pub fn translate(statement: &str, target: Dialect) -> String {
    let mut joined = translate_statements(statement, target).join(";\n");
    if statement.trim_end().ends_with(';') {
        joined.push(';');
    }
    joined
}

/// Same rewrite as [`translate`], one entry per resulting statement, without
/// trailing semicolons.
///
/// The input is split at top-level semicolons first, so each inline index is
/// attached to the table whose body declared it.
#[must_use]
pub fn translate_statements(script: &str, target: Dialect) -> Vec<String> {
    split_statements(script)
        .into_iter()
        .flat_map(|statement| translate_one(statement, target))
        .collect()
}

fn translate_one(statement: &str, target: Dialect) -> Vec<String> {
    let sql = rewrite_auto_increment(statement, target);
    let sql = rewrite_timestamp_type(&sql, target);
    let sql = rewrite_current_timestamp(&sql, target);
    let sql = TABLE_OPTIONS.replace_all(&sql, "").into_owned();
    let sql = rewrite_unique_keys(&sql);
    let (sql, indexes) = extract_inline_indexes(&sql);
    let sql = rewrite_enums(&sql);

    let mut out = Vec::with_capacity(1 + indexes.len());
    out.push(sql.trim_end().to_string());
    out.extend(indexes);
    out
}

fn rewrite_auto_increment(sql: &str, target: Dialect) -> String {
    AUTO_INCREMENT_KEY
        .replace_all(sql, |caps: &Captures<'_>| {
            let not_null = caps.get(2).is_some();
            let primary = caps.get(3).is_some();
            match target {
                Dialect::Postgres => {
                    let mut out = String::from(if &caps[1] == "BIGINT" {
                        "BIGSERIAL"
                    } else {
                        "SERIAL"
                    });
                    if not_null {
                        out.push_str(" NOT NULL");
                    }
                    if primary {
                        out.push_str(" PRIMARY KEY");
                    }
                    out
                }
                // Only a rowid alias can autoincrement in SQLite.
                Dialect::Sqlite if primary => "INTEGER PRIMARY KEY AUTOINCREMENT".to_string(),
                Dialect::Sqlite if not_null => "INTEGER NOT NULL".to_string(),
                Dialect::Sqlite => "INTEGER".to_string(),
            }
        })
        .into_owned()
}

fn rewrite_timestamp_type(sql: &str, target: Dialect) -> String {
    match target {
        Dialect::Postgres => DATETIME_TYPE.replace_all(sql, "TIMESTAMP").into_owned(),
        Dialect::Sqlite => sql.to_string(),
    }
}

fn rewrite_current_timestamp(sql: &str, target: Dialect) -> String {
    let sql = ON_UPDATE_NOW.replace_all(sql, "");
    match target {
        Dialect::Postgres => CURRENT_TIMESTAMP_KW.replace_all(&sql, "NOW()").into_owned(),
        Dialect::Sqlite => {
            let sql = CURRENT_TIMESTAMP_KW.replace_all(&sql, "CURRENT_TIMESTAMP");
            NOW_FN.replace_all(&sql, "CURRENT_TIMESTAMP").into_owned()
        }
    }
}

fn rewrite_unique_keys(sql: &str) -> String {
    let sql = NAMED_UNIQUE_KEY.replace_all(sql, "CONSTRAINT $1 UNIQUE (");
    ANON_UNIQUE_KEY.replace_all(&sql, "UNIQUE (").into_owned()
}

fn extract_inline_indexes(sql: &str) -> (String, Vec<String>) {
    let Some(table) = TABLE_NAME.captures(sql).map(|c| c[1].to_string()) else {
        return (sql.to_string(), Vec::new());
    };
    let indexes = INLINE_INDEX
        .captures_iter(sql)
        .map(|caps| {
            format!(
                "CREATE INDEX IF NOT EXISTS {} ON {table} ({})",
                &caps[1],
                normalize_column_list(&caps[2])
            )
        })
        .collect::<Vec<_>>();
    if indexes.is_empty() {
        return (sql.to_string(), indexes);
    }
    (INLINE_INDEX.replace_all(sql, "").into_owned(), indexes)
}

fn normalize_column_list(cols: &str) -> String {
    cols.split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

fn rewrite_enums(sql: &str) -> String {
    ENUM_COLUMN
        .replace_all(sql, |caps: &Captures<'_>| {
            let column = &caps[1];
            let values: Vec<&str> = QUOTED
                .captures_iter(&caps[2])
                .filter_map(|c| c.get(1).map(|m| m.as_str()))
                .collect();
            let width = values
                .iter()
                .map(|v| v.replace("''", "'").chars().count())
                .max()
                .unwrap_or(0)
                .max(MIN_ENUM_WIDTH);
            let list = values
                .iter()
                .map(|v| format!("'{v}'"))
                .collect::<Vec<_>>()
                .join(", ");
            format!("{column} VARCHAR({width}) CHECK ({column} IN ({list}))")
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_increment_keys() {
        let sql = "id INT AUTO_INCREMENT PRIMARY KEY, seq BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY";
        assert_eq!(
            translate(sql, Dialect::Postgres),
            "id SERIAL PRIMARY KEY, seq BIGSERIAL NOT NULL PRIMARY KEY"
        );
        assert_eq!(
            translate(sql, Dialect::Sqlite),
            "id INTEGER PRIMARY KEY AUTOINCREMENT, seq INTEGER PRIMARY KEY AUTOINCREMENT"
        );
    }

    #[test]
    fn timestamps_and_defaults() {
        let sql = "created_at DATETIME DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP";
        assert_eq!(
            translate(sql, Dialect::Postgres),
            "created_at TIMESTAMP DEFAULT NOW()"
        );
        assert_eq!(
            translate(sql, Dialect::Sqlite),
            "created_at DATETIME DEFAULT CURRENT_TIMESTAMP"
        );
        assert_eq!(
            translate("seen_at DATETIME DEFAULT NOW()", Dialect::Sqlite),
            "seen_at DATETIME DEFAULT CURRENT_TIMESTAMP"
        );
    }

    #[test]
    fn lower_case_identifiers_survive() {
        let sql = "timestamp DATETIME DEFAULT CURRENT_TIMESTAMP";
        assert_eq!(
            translate(sql, Dialect::Postgres),
            "timestamp TIMESTAMP DEFAULT NOW()"
        );
    }

    #[test]
    fn table_options_dropped() {
        let sql = "CREATE TABLE t (id INT) ENGINE=InnoDB AUTO_INCREMENT=5 DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci;";
        assert_eq!(
            translate(sql, Dialect::Postgres),
            "CREATE TABLE t (id INT);"
        );
    }

    #[test]
    fn unique_keys_and_inline_indexes() {
        let sql = "CREATE TABLE IF NOT EXISTS likes (
    post_id INTEGER NOT NULL,
    user_id INTEGER NOT NULL,
    UNIQUE KEY uq_like (post_id, user_id),
    INDEX idx_likes_post (post_id),
    KEY idx_likes_user (user_id)
)";
        let out = translate_statements(sql, Dialect::Sqlite);
        assert_eq!(out.len(), 3);
        assert!(out[0].contains("CONSTRAINT uq_like UNIQUE (post_id, user_id)"));
        assert!(!out[0].contains("INDEX"));
        assert!(out[0].ends_with("CONSTRAINT uq_like UNIQUE (post_id, user_id)\n)"));
        assert_eq!(
            out[1],
            "CREATE INDEX IF NOT EXISTS idx_likes_post ON likes (post_id)"
        );
        assert_eq!(
            out[2],
            "CREATE INDEX IF NOT EXISTS idx_likes_user ON likes (user_id)"
        );
        assert_eq!(translate(sql, Dialect::Sqlite), out.join(";\n"));
    }

    #[test]
    fn indexes_follow_their_own_table_in_a_script() {
        let sql = "CREATE TABLE a (x INT, INDEX idx_a_x (x));
CREATE TABLE b (note TEXT DEFAULT ';', y INT, INDEX idx_b_y (y));";
        let out = translate_statements(sql, Dialect::Postgres);
        assert_eq!(
            out,
            [
                "CREATE TABLE a (x INT)",
                "CREATE INDEX IF NOT EXISTS idx_a_x ON a (x)",
                "CREATE TABLE b (note TEXT DEFAULT ';', y INT)",
                "CREATE INDEX IF NOT EXISTS idx_b_y ON b (y)",
            ]
        );
        assert!(translate(sql, Dialect::Sqlite).ends_with("idx_b_y ON b (y);"));
    }

    #[test]
    fn enum_becomes_check_constraint() {
        let sql = "status ENUM('pending','accepted') NOT NULL DEFAULT 'pending'";
        assert_eq!(
            translate(sql, Dialect::Postgres),
            "status VARCHAR(50) CHECK (status IN ('pending', 'accepted')) NOT NULL DEFAULT 'pending'"
        );
        assert_eq!(translate(sql, Dialect::Sqlite), translate(sql, Dialect::Postgres));
    }

    #[test]
    fn enum_width_grows_for_long_values() {
        let long = "x".repeat(64);
        let sql = format!("kind ENUM('a', '{long}')");
        assert!(translate(&sql, Dialect::Postgres).starts_with("kind VARCHAR(64) CHECK"));
    }

    #[test]
    fn string_literals_with_keywords_untouched_by_primary_key_rule() {
        let sql = "images TEXT DEFAULT '[]'";
        assert_eq!(translate(sql, Dialect::Postgres), sql);
    }

    #[test]
    fn deterministic() {
        let sql = "CREATE TABLE a (id BIGINT AUTO_INCREMENT PRIMARY KEY, s ENUM('x','y'), INDEX idx_s (s)) ENGINE=InnoDB";
        for dialect in [Dialect::Postgres, Dialect::Sqlite] {
            assert_eq!(translate(sql, dialect), translate(sql, dialect));
        }
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn translated_ddl_runs_on_sqlite() {
        let sql = "CREATE TABLE IF NOT EXISTS friendships (
    id INT AUTO_INCREMENT PRIMARY KEY,
    requester_id INT NOT NULL,
    addressee_id INT NOT NULL,
    status ENUM('pending','accepted') NOT NULL DEFAULT 'pending',
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    UNIQUE KEY uq_pair (requester_id, addressee_id),
    INDEX idx_friendships_status (status)
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4";
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch(&translate(sql, Dialect::Sqlite)).unwrap();
        conn.execute(
            "INSERT INTO friendships (requester_id, addressee_id) VALUES (1, 2)",
            [],
        )
        .unwrap();
        let bad = conn.execute(
            "INSERT INTO friendships (requester_id, addressee_id, status) VALUES (2, 3, 'blocked')",
            [],
        );
        assert!(bad.is_err());
        let dup = conn.execute(
            "INSERT INTO friendships (requester_id, addressee_id) VALUES (1, 2)",
            [],
        );
        assert!(dup.is_err());
    }
}
