//! Backend-agnostic data access for route handlers.
//!
//! Each engine gets its own implementation with its own SQL; callers pick one once via
//! [`Database::repository`](crate::Database::repository) and never see placeholder
//! syntax or id-retrieval differences.

#[cfg(feature = "postgres")]
mod postgres;
#[cfg(feature = "sqlite")]
mod sqlite;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::Serialize;

use crate::error::DbError;
use crate::results::Row;

#[cfg(feature = "postgres")]
pub use postgres::PostgresRepository;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteRepository;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    pub is_admin: bool,
    pub is_banned: bool,
    pub hide_phone: bool,
    pub hide_email: bool,
    pub last_seen: Option<NaiveDateTime>,
    pub created_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FriendshipStatus {
    Pending,
    Accepted,
}

impl FriendshipStatus {
    fn parse(s: &str) -> Result<Self, DbError> {
        match s {
            "pending" => Ok(Self::Pending),
            "accepted" => Ok(Self::Accepted),
            other => Err(DbError::ExecutionError(format!(
                "unknown friendship status {other:?}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Friendship {
    pub id: i64,
    pub requester_id: i64,
    pub addressee_id: i64,
    pub status: FriendshipStatus,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Message {
    pub id: i64,
    pub conversation_id: i64,
    pub sender_id: i64,
    pub content: String,
    pub created_at: Option<NaiveDateTime>,
}

/// Data access used by the HTTP layer. Every call acquires and releases its own
/// connection.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Insert a user and return the generated id.
    async fn create_user(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<i64, DbError>;

    async fn user_by_id(&self, id: i64) -> Result<Option<User>, DbError>;

    /// Look a user up by username or email.
    async fn user_by_login(&self, login: &str) -> Result<Option<User>, DbError>;

    async fn touch_last_seen(&self, user_id: i64) -> Result<(), DbError>;

    /// Create a pending request, or accept the inverse one if `to` already asked `from`.
    /// Repeating a request returns the existing row.
    async fn send_friend_request(&self, from: i64, to: i64) -> Result<Friendship, DbError>;

    /// Accept a pending request addressed to `addressee_id`. False if there was none.
    async fn accept_friend_request(
        &self,
        friendship_id: i64,
        addressee_id: i64,
    ) -> Result<bool, DbError>;

    /// Users with an accepted friendship in either direction, ordered by username.
    async fn friends_of(&self, user_id: i64) -> Result<Vec<User>, DbError>;

    /// The one-to-one conversation between two users, created on first use.
    async fn open_direct_conversation(&self, a: i64, b: i64) -> Result<i64, DbError>;

    /// Post a message; the sender must be a participant.
    async fn send_message(
        &self,
        conversation_id: i64,
        sender_id: i64,
        content: &str,
    ) -> Result<Message, DbError>;

    /// Most recent `limit` messages, oldest first.
    async fn messages(&self, conversation_id: i64, limit: i64) -> Result<Vec<Message>, DbError>;

    /// Insert a post and attach tags, creating missing tags.
    async fn create_post(
        &self,
        author_id: i64,
        content: &str,
        tags: &[String],
    ) -> Result<i64, DbError>;

    /// Like a post once per user; returns the post's like count afterwards.
    async fn like_post(&self, post_id: i64, user_id: i64) -> Result<i64, DbError>;

    async fn applied_migrations(&self) -> Result<Vec<String>, DbError>;
}

pub(crate) const USER_COLUMNS: &str = "id, username, email, avatar_url, bio, is_admin, is_banned, \
     hide_phone, hide_email, last_seen, created_at";

fn required_i64(row: &Row, column: &str) -> Result<i64, DbError> {
    row.get_i64(column)
        .ok_or_else(|| DbError::ExecutionError(format!("column {column} missing or not an integer")))
}

fn required_str(row: &Row, column: &str) -> Result<String, DbError> {
    row.get_str(column)
        .map(str::to_owned)
        .ok_or_else(|| DbError::ExecutionError(format!("column {column} missing or not text")))
}

fn optional_str(row: &Row, column: &str) -> Option<String> {
    row.get_str(column).map(str::to_owned)
}

fn timestamp(row: &Row, column: &str) -> Option<NaiveDateTime> {
    row.get(column).and_then(crate::types::SqlValue::as_timestamp)
}

pub(crate) fn user_from_row(row: &Row) -> Result<User, DbError> {
    Ok(User {
        id: required_i64(row, "id")?,
        username: required_str(row, "username")?,
        email: required_str(row, "email")?,
        avatar_url: optional_str(row, "avatar_url"),
        bio: optional_str(row, "bio"),
        is_admin: row.get_bool("is_admin").unwrap_or(false),
        is_banned: row.get_bool("is_banned").unwrap_or(false),
        hide_phone: row.get_bool("hide_phone").unwrap_or(false),
        hide_email: row.get_bool("hide_email").unwrap_or(false),
        last_seen: timestamp(row, "last_seen"),
        created_at: timestamp(row, "created_at"),
    })
}

pub(crate) fn friendship_from_row(row: &Row) -> Result<Friendship, DbError> {
    Ok(Friendship {
        id: required_i64(row, "id")?,
        requester_id: required_i64(row, "requester_id")?,
        addressee_id: required_i64(row, "addressee_id")?,
        status: FriendshipStatus::parse(&required_str(row, "status")?)?,
    })
}

pub(crate) fn message_from_row(row: &Row) -> Result<Message, DbError> {
    Ok(Message {
        id: required_i64(row, "id")?,
        conversation_id: required_i64(row, "conversation_id")?,
        sender_id: required_i64(row, "sender_id")?,
        content: required_str(row, "content")?,
        created_at: timestamp(row, "created_at"),
    })
}

pub(crate) fn ensure_distinct(a: i64, b: i64, what: &str) -> Result<(), DbError> {
    if a == b {
        return Err(DbError::ParameterError(format!("{what} needs two different users")));
    }
    Ok(())
}

/// Trimmed, de-duplicated, non-empty tag names, lower-cased.
pub(crate) fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.trim().trim_start_matches('#').to_lowercase();
        if !tag.is_empty() && !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_normalized() {
        let tags = vec![
            " Rust ".to_string(),
            "#rust".to_string(),
            String::new(),
            "SQL".to_string(),
        ];
        assert_eq!(normalize_tags(&tags), vec!["rust", "sql"]);
    }

    #[test]
    fn same_user_twice_is_rejected() {
        assert!(matches!(
            ensure_distinct(4, 4, "friendship"),
            Err(DbError::ParameterError(_))
        ));
        assert!(ensure_distinct(4, 5, "friendship").is_ok());
    }
}
