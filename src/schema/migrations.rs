//! Named one-time migrations, applied in list order and recorded in `applied_migrations`.
//!
//! Names are stable identifiers. Never rename or reorder an entry; append new ones.

use super::columns::add_column_sql;
use crate::translate::Dialect;

/// Accounts that keep the admin flag after `reset_admins_durov_ilya`.
pub const ADMIN_USERNAMES: &[&str] = &["durov", "илья_новиков_65vsj"];

pub(crate) enum Step {
    /// Restrict `is_admin` to [`ADMIN_USERNAMES`].
    ResetAdmins,
    /// Widen a bounded string column to unbounded text. `SQLite` does not enforce
    /// `VARCHAR` lengths, so there it is a no-op.
    WidenToText {
        table: &'static str,
        column: &'static str,
    },
    /// Add a column unless it is already there.
    AddColumn {
        table: &'static str,
        column: &'static str,
        definition: &'static str,
    },
}

pub(crate) struct Migration {
    pub name: &'static str,
    pub summary: &'static str,
    pub steps: &'static [Step],
}

pub(crate) const MIGRATIONS: &[Migration] = &[
    Migration {
        name: "reset_admins_durov_ilya",
        summary: "admins restricted to durov and илья_новиков_65vsj",
        steps: &[Step::ResetAdmins],
    },
    Migration {
        name: "avatar_cover_to_text",
        summary: "avatar_url and cover_photo widened to TEXT",
        steps: &[
            Step::WidenToText {
                table: "users",
                column: "avatar_url",
            },
            Step::WidenToText {
                table: "users",
                column: "cover_photo",
            },
        ],
    },
    Migration {
        name: "privacy_hide_phone_email",
        summary: "hide_phone and hide_email preference columns added",
        steps: &[
            Step::AddColumn {
                table: "users",
                column: "hide_phone",
                definition: "BOOLEAN DEFAULT FALSE",
            },
            Step::AddColumn {
                table: "users",
                column: "hide_email",
                definition: "BOOLEAN DEFAULT FALSE",
            },
        ],
    },
];

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

impl Step {
    /// SQL for this step, or `None` when there is nothing to do. `existing_columns` is
    /// the current column list of the step's table.
    pub(crate) fn render(&self, dialect: Dialect, existing_columns: &[String]) -> Option<String> {
        match self {
            Step::ResetAdmins => {
                let names = ADMIN_USERNAMES
                    .iter()
                    .map(|n| quote_literal(n))
                    .collect::<Vec<_>>()
                    .join(", ");
                Some(format!(
                    "UPDATE users SET is_admin = FALSE WHERE username IS NULL OR username NOT IN ({names});\n\
                     UPDATE users SET is_admin = TRUE WHERE username IN ({names})"
                ))
            }
            Step::WidenToText { table, column } => match dialect {
                Dialect::Postgres => Some(format!(
                    "ALTER TABLE {table} ALTER COLUMN {column} TYPE TEXT"
                )),
                Dialect::Sqlite => None,
            },
            Step::AddColumn {
                table,
                column,
                definition,
            } => {
                if existing_columns.iter().any(|c| c == column) {
                    return None;
                }
                Some(add_column_sql(table, column, definition, dialect))
            }
        }
    }

    /// Table whose columns [`render`](Self::render) needs, if any.
    pub(crate) fn table(&self) -> Option<&'static str> {
        match self {
            Step::AddColumn { table, .. } => Some(*table),
            _ => None,
        }
    }
}

/// The full batch for one migration: its steps followed by the ledger insert.
pub(crate) fn migration_batch(
    migration: &Migration,
    dialect: Dialect,
    columns_of: impl Fn(&str) -> Vec<String>,
) -> String {
    let mut statements: Vec<String> = migration
        .steps
        .iter()
        .filter_map(|step| {
            let existing = step.table().map(&columns_of).unwrap_or_default();
            step.render(dialect, &existing)
        })
        .collect();
    statements.push(format!(
        "INSERT INTO applied_migrations (name) VALUES ({})",
        quote_literal(migration.name)
    ));
    statements.join(";\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_unique_and_ordered() {
        let names: Vec<_> = MIGRATIONS.iter().map(|m| m.name).collect();
        assert_eq!(
            names,
            vec![
                "reset_admins_durov_ilya",
                "avatar_cover_to_text",
                "privacy_hide_phone_email"
            ]
        );
    }

    #[test]
    fn widen_is_postgres_only_but_still_recorded() {
        let batch = migration_batch(&MIGRATIONS[1], Dialect::Sqlite, |_| Vec::new());
        assert_eq!(
            batch,
            "INSERT INTO applied_migrations (name) VALUES ('avatar_cover_to_text')"
        );
        let batch = migration_batch(&MIGRATIONS[1], Dialect::Postgres, |_| Vec::new());
        assert!(batch.starts_with("ALTER TABLE users ALTER COLUMN avatar_url TYPE TEXT;\n"));
    }

    #[test]
    fn existing_columns_are_skipped() {
        let batch = migration_batch(&MIGRATIONS[2], Dialect::Sqlite, |_| {
            vec!["id".to_string(), "hide_phone".to_string()]
        });
        assert!(!batch.contains("hide_phone BOOLEAN"));
        assert!(batch.contains("ALTER TABLE users ADD COLUMN hide_email BOOLEAN DEFAULT FALSE"));
    }

    #[test]
    fn admin_reset_quotes_names() {
        let sql = Step::ResetAdmins.render(Dialect::Postgres, &[]).unwrap();
        assert!(sql.contains("NOT IN ('durov', 'илья_новиков_65vsj')"));
    }
}
