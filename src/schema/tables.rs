//! Canonical table definitions, in foreign-key dependency order.
//!
//! Written once in MySQL-flavoured DDL and translated for the active engine.

pub(crate) struct TableDef {
    pub name: &'static str,
    pub ddl: &'static str,
}

pub(crate) const LEDGER_DDL: &str =
    "CREATE TABLE IF NOT EXISTS applied_migrations (name TEXT PRIMARY KEY)";

pub(crate) const TABLES: &[TableDef] = &[
    TableDef {
        name: "users",
        ddl: "CREATE TABLE IF NOT EXISTS users (
    id INT AUTO_INCREMENT PRIMARY KEY,
    username VARCHAR(255) UNIQUE NOT NULL,
    email VARCHAR(255) UNIQUE NOT NULL,
    password_hash VARCHAR(255) NOT NULL,
    avatar_url VARCHAR(1024) NULL,
    cover_photo VARCHAR(1024) NULL,
    theme_mode VARCHAR(20) DEFAULT 'light',
    theme_palette VARCHAR(50) DEFAULT 'blue',
    is_admin BOOLEAN DEFAULT FALSE,
    is_banned BOOLEAN DEFAULT FALSE,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    updated_at DATETIME DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP,
    INDEX idx_users_username (username),
    INDEX idx_users_email (email)
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci",
    },
    TableDef {
        name: "status_checks",
        ddl: "CREATE TABLE IF NOT EXISTS status_checks (
    id VARCHAR(36) PRIMARY KEY,
    client_name VARCHAR(255) NOT NULL,
    timestamp DATETIME DEFAULT CURRENT_TIMESTAMP,
    INDEX idx_status_checks_timestamp (timestamp)
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4",
    },
    TableDef {
        name: "friendships",
        ddl: "CREATE TABLE IF NOT EXISTS friendships (
    id INT AUTO_INCREMENT PRIMARY KEY,
    requester_id INT NOT NULL,
    addressee_id INT NOT NULL,
    status ENUM('pending','accepted') NOT NULL DEFAULT 'pending',
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    updated_at DATETIME DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP,
    UNIQUE KEY uq_friendships_pair (requester_id, addressee_id),
    FOREIGN KEY (requester_id) REFERENCES users(id) ON DELETE CASCADE,
    FOREIGN KEY (addressee_id) REFERENCES users(id) ON DELETE CASCADE,
    INDEX idx_friendships_status (status)
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4",
    },
    TableDef {
        name: "conversations",
        ddl: "CREATE TABLE IF NOT EXISTS conversations (
    id INT AUTO_INCREMENT PRIMARY KEY,
    is_group BOOLEAN NOT NULL DEFAULT FALSE,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP
) ENGINE=InnoDB",
    },
    TableDef {
        name: "conversation_participants",
        ddl: "CREATE TABLE IF NOT EXISTS conversation_participants (
    conversation_id INT NOT NULL,
    user_id INT NOT NULL,
    joined_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY (conversation_id, user_id),
    FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE,
    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
) ENGINE=InnoDB",
    },
    TableDef {
        name: "messages",
        ddl: "CREATE TABLE IF NOT EXISTS messages (
    id INT AUTO_INCREMENT PRIMARY KEY,
    conversation_id INT NOT NULL,
    sender_id INT NOT NULL,
    content TEXT NOT NULL,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE,
    FOREIGN KEY (sender_id) REFERENCES users(id) ON DELETE CASCADE,
    INDEX idx_messages_conv_created (conversation_id, created_at)
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4",
    },
    TableDef {
        name: "notifications",
        ddl: "CREATE TABLE IF NOT EXISTS notifications (
    id INT AUTO_INCREMENT PRIMARY KEY,
    user_id INT NOT NULL,
    type VARCHAR(50) NOT NULL,
    actor_id INT NULL,
    target_id INT NULL,
    target_type VARCHAR(50) NULL,
    content TEXT NULL,
    is_read BOOLEAN DEFAULT FALSE,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
    FOREIGN KEY (actor_id) REFERENCES users(id) ON DELETE CASCADE,
    INDEX idx_notifications_user_read (user_id, is_read),
    INDEX idx_notifications_created (created_at)
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4",
    },
    TableDef {
        name: "posts",
        ddl: "CREATE TABLE IF NOT EXISTS posts (
    id INT AUTO_INCREMENT PRIMARY KEY,
    author_id INT NOT NULL,
    content TEXT NOT NULL,
    images TEXT DEFAULT '[]',
    likes_count INT DEFAULT 0,
    comments_count INT DEFAULT 0,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (author_id) REFERENCES users(id) ON DELETE CASCADE,
    INDEX idx_posts_author (author_id),
    INDEX idx_posts_created (created_at)
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4",
    },
    TableDef {
        name: "post_likes",
        ddl: "CREATE TABLE IF NOT EXISTS post_likes (
    id INT AUTO_INCREMENT PRIMARY KEY,
    post_id INT NOT NULL,
    user_id INT NOT NULL,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    UNIQUE KEY uq_post_likes_pair (post_id, user_id),
    FOREIGN KEY (post_id) REFERENCES posts(id) ON DELETE CASCADE,
    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
    INDEX idx_post_likes_post (post_id),
    INDEX idx_post_likes_user (user_id)
) ENGINE=InnoDB",
    },
    TableDef {
        name: "post_comments",
        ddl: "CREATE TABLE IF NOT EXISTS post_comments (
    id INT AUTO_INCREMENT PRIMARY KEY,
    post_id INT NOT NULL,
    user_id INT NOT NULL,
    content TEXT NOT NULL,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (post_id) REFERENCES posts(id) ON DELETE CASCADE,
    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
    INDEX idx_post_comments_post (post_id)
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4",
    },
    TableDef {
        name: "user_devices",
        ddl: "CREATE TABLE IF NOT EXISTS user_devices (
    id INT AUTO_INCREMENT PRIMARY KEY,
    user_id INT NOT NULL,
    name VARCHAR(255) NOT NULL DEFAULT 'Device',
    user_agent TEXT NULL,
    last_used_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
    INDEX idx_user_devices_user (user_id)
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4",
    },
    TableDef {
        name: "tags",
        ddl: "CREATE TABLE IF NOT EXISTS tags (
    id INT AUTO_INCREMENT PRIMARY KEY,
    name VARCHAR(100) UNIQUE NOT NULL
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4",
    },
    TableDef {
        name: "post_tags",
        ddl: "CREATE TABLE IF NOT EXISTS post_tags (
    post_id INT NOT NULL,
    tag_id INT NOT NULL,
    PRIMARY KEY (post_id, tag_id),
    FOREIGN KEY (post_id) REFERENCES posts(id) ON DELETE CASCADE,
    FOREIGN KEY (tag_id) REFERENCES tags(id) ON DELETE CASCADE,
    INDEX idx_post_tags_post (post_id),
    INDEX idx_post_tags_tag (tag_id)
) ENGINE=InnoDB",
    },
    TableDef {
        name: "user_tag_subscriptions",
        ddl: "CREATE TABLE IF NOT EXISTS user_tag_subscriptions (
    user_id INT NOT NULL,
    tag_id INT NOT NULL,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY (user_id, tag_id),
    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
    FOREIGN KEY (tag_id) REFERENCES tags(id) ON DELETE CASCADE,
    INDEX idx_user_tag_subscriptions_user (user_id),
    INDEX idx_user_tag_subscriptions_tag (tag_id)
) ENGINE=InnoDB",
    },
];

/// Tables whose `updated_at` is maintained by a trigger.
pub(crate) const UPDATED_AT_TABLES: &[&str] = &["users", "friendships"];

pub(crate) const PG_UPDATED_AT_FUNCTION: &str = "CREATE OR REPLACE FUNCTION update_updated_at_column()
RETURNS TRIGGER AS $$
BEGIN
    NEW.updated_at = NOW();
    RETURN NEW;
END;
$$ LANGUAGE plpgsql";

pub(crate) fn pg_updated_at_trigger(table: &str) -> String {
    format!(
        "DROP TRIGGER IF EXISTS update_{table}_updated_at ON {table};
CREATE TRIGGER update_{table}_updated_at
BEFORE UPDATE ON {table}
FOR EACH ROW
EXECUTE FUNCTION update_updated_at_column()"
    )
}

/// Row-level `AFTER UPDATE` trigger; the `WHEN` guard stops it re-firing on its own update
/// and leaves explicit `updated_at` writes alone.
pub(crate) fn sqlite_updated_at_trigger(table: &str) -> String {
    format!(
        "CREATE TRIGGER IF NOT EXISTS update_{table}_updated_at
AFTER UPDATE ON {table}
FOR EACH ROW WHEN NEW.updated_at IS OLD.updated_at
BEGIN
    UPDATE {table} SET updated_at = CURRENT_TIMESTAMP WHERE id = NEW.id;
END"
    )
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::translate::{Dialect, translate_statements};

    #[test]
    fn referenced_tables_come_first() {
        let mut seen = HashSet::new();
        for table in TABLES {
            for (idx, _) in table.ddl.match_indices("REFERENCES ") {
                let rest = &table.ddl[idx + "REFERENCES ".len()..];
                let target: String = rest.chars().take_while(|c| *c != '(').collect();
                assert!(
                    seen.contains(target.as_str()),
                    "{} references {target} before it is created",
                    table.name
                );
            }
            seen.insert(table.name);
        }
    }

    #[test]
    fn translated_postgres_ddl_has_no_mysql_leftovers() {
        for table in TABLES {
            for stmt in translate_statements(table.ddl, Dialect::Postgres) {
                for leftover in ["AUTO_INCREMENT", "DATETIME", "ENGINE", "CHARSET", "ENUM(", "ON UPDATE"] {
                    assert!(!stmt.contains(leftover), "{leftover} left in {stmt}");
                }
            }
        }
    }

    #[test]
    fn every_index_is_extracted() {
        let statements: Vec<String> = TABLES
            .iter()
            .flat_map(|t| translate_statements(t.ddl, Dialect::Sqlite))
            .collect();
        let indexes = statements
            .iter()
            .filter(|s| s.starts_with("CREATE INDEX IF NOT EXISTS"))
            .count();
        assert_eq!(indexes, 17);
    }
}
