use crate::translate::{Dialect, translate};

/// A column added to an existing table after the table's first release.
pub(crate) struct AddedColumn {
    pub table: &'static str,
    pub column: &'static str,
    /// Canonical (MySQL-flavoured) type and default.
    pub definition: &'static str,
}

const fn users(column: &'static str, definition: &'static str) -> AddedColumn {
    AddedColumn {
        table: "users",
        column,
        definition,
    }
}

pub(crate) const ADDED_COLUMNS: &[AddedColumn] = &[
    users("bio", "TEXT NULL"),
    users("location", "VARCHAR(255) NULL"),
    users("birth_date", "VARCHAR(50) NULL"),
    users("cover_photo", "VARCHAR(1024) NULL"),
    users("phone", "VARCHAR(50) NULL"),
    users("work_hours", "VARCHAR(255) NULL"),
    users("profile_accent", "VARCHAR(50) NULL"),
    users("community_name", "VARCHAR(255) NULL"),
    users("community_description", "TEXT NULL"),
    users("is_admin", "BOOLEAN DEFAULT FALSE"),
    users("is_banned", "BOOLEAN DEFAULT FALSE"),
    users("last_seen", "DATETIME NULL"),
    users("email_verified_at", "DATETIME NULL"),
    users("email_verification_token", "VARCHAR(255) NULL"),
    users("email_verification_sent_at", "DATETIME NULL"),
];

/// `ALTER TABLE .. ADD COLUMN` for `dialect`. `SQLite` has no `IF NOT EXISTS` form, so
/// callers there must check the column list first.
pub(crate) fn add_column_sql(
    table: &str,
    column: &str,
    definition: &str,
    dialect: Dialect,
) -> String {
    let guard = match dialect {
        Dialect::Postgres => "IF NOT EXISTS ",
        Dialect::Sqlite => "",
    };
    translate(
        &format!("ALTER TABLE {table} ADD COLUMN {guard}{column} {definition}"),
        dialect,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_column_per_dialect() {
        assert_eq!(
            add_column_sql("users", "last_seen", "DATETIME NULL", Dialect::Postgres),
            "ALTER TABLE users ADD COLUMN IF NOT EXISTS last_seen TIMESTAMP NULL"
        );
        assert_eq!(
            add_column_sql("users", "last_seen", "DATETIME NULL", Dialect::Sqlite),
            "ALTER TABLE users ADD COLUMN last_seen DATETIME NULL"
        );
    }
}
