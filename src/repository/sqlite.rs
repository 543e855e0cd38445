use std::sync::Arc;

use async_trait::async_trait;

use super::{
    Friendship, FriendshipStatus, Message, Repository, USER_COLUMNS, User, ensure_distinct,
    friendship_from_row, message_from_row, normalize_tags, user_from_row,
};
use crate::connection::ScopedConnection;
use crate::error::DbError;
use crate::provider::ConnectionProvider;
use crate::schema;

const FRIENDSHIP_COLUMNS: &str = "id, requester_id, addressee_id, status";

/// [`Repository`] over the embedded file: `?N` placeholders, rowid keys, 0/1 booleans.
#[derive(Debug, Clone)]
pub struct SqliteRepository {
    provider: Arc<ConnectionProvider>,
}

impl SqliteRepository {
    #[must_use]
    pub fn new(provider: Arc<ConnectionProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Repository for SqliteRepository {
    async fn create_user(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<i64, DbError> {
        let conn = self.provider.acquire().await?;
        conn.insert_returning_id(
            "INSERT INTO users (username, email, password_hash) VALUES (?1, ?2, ?3)",
            &[username.into(), email.into(), password_hash.into()],
        )
        .await
    }

    async fn user_by_id(&self, id: i64) -> Result<Option<User>, DbError> {
        let conn = self.provider.acquire().await?;
        conn.query_opt(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            &[id.into()],
        )
        .await?
        .as_ref()
        .map(user_from_row)
        .transpose()
    }

    async fn user_by_login(&self, login: &str) -> Result<Option<User>, DbError> {
        let conn = self.provider.acquire().await?;
        conn.query_opt(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1 OR email = ?1"),
            &[login.into()],
        )
        .await?
        .as_ref()
        .map(user_from_row)
        .transpose()
    }

    async fn touch_last_seen(&self, user_id: i64) -> Result<(), DbError> {
        let conn = self.provider.acquire().await?;
        conn.execute(
            "UPDATE users SET last_seen = CURRENT_TIMESTAMP WHERE id = ?1",
            &[user_id.into()],
        )
        .await?;
        Ok(())
    }

    async fn send_friend_request(&self, from: i64, to: i64) -> Result<Friendship, DbError> {
        ensure_distinct(from, to, "a friend request")?;
        let conn = self.provider.acquire().await?;
        let tx = conn.begin().await?;
        let result = friend_request_tx(&conn, from, to).await;
        tx.finish(result).await
    }

    async fn accept_friend_request(
        &self,
        friendship_id: i64,
        addressee_id: i64,
    ) -> Result<bool, DbError> {
        let conn = self.provider.acquire().await?;
        let changed = conn
            .execute(
                "UPDATE friendships SET status = 'accepted' \
                 WHERE id = ?1 AND addressee_id = ?2 AND status = 'pending'",
                &[friendship_id.into(), addressee_id.into()],
            )
            .await?;
        Ok(changed > 0)
    }

    async fn friends_of(&self, user_id: i64) -> Result<Vec<User>, DbError> {
        let conn = self.provider.acquire().await?;
        let rows = conn
            .query(
                &format!(
                    "SELECT {USER_COLUMNS} FROM users WHERE id IN (\
                     SELECT addressee_id FROM friendships WHERE requester_id = ?1 AND status = 'accepted' \
                     UNION SELECT requester_id FROM friendships WHERE addressee_id = ?1 AND status = 'accepted'\
                     ) ORDER BY username"
                ),
                &[user_id.into()],
            )
            .await?;
        rows.iter().map(user_from_row).collect()
    }

    async fn open_direct_conversation(&self, a: i64, b: i64) -> Result<i64, DbError> {
        ensure_distinct(a, b, "a direct conversation")?;
        let conn = self.provider.acquire().await?;
        let tx = conn.begin().await?;
        let result = direct_conversation_tx(&conn, a, b).await;
        tx.finish(result).await
    }

    async fn send_message(
        &self,
        conversation_id: i64,
        sender_id: i64,
        content: &str,
    ) -> Result<Message, DbError> {
        let conn = self.provider.acquire().await?;
        let member = conn
            .query_opt(
                "SELECT 1 AS member FROM conversation_participants WHERE conversation_id = ?1 AND user_id = ?2",
                &[conversation_id.into(), sender_id.into()],
            )
            .await?;
        if member.is_none() {
            return Err(DbError::ParameterError(format!(
                "user {sender_id} is not a participant of conversation {conversation_id}"
            )));
        }
        let id = conn
            .insert_returning_id(
                "INSERT INTO messages (conversation_id, sender_id, content) VALUES (?1, ?2, ?3)",
                &[conversation_id.into(), sender_id.into(), content.into()],
            )
            .await?;
        let row = conn
            .query_opt(
                "SELECT id, conversation_id, sender_id, content, created_at FROM messages WHERE id = ?1",
                &[id.into()],
            )
            .await?
            .ok_or_else(|| DbError::ExecutionError(format!("message {id} vanished after insert")))?;
        message_from_row(&row)
    }

    async fn messages(&self, conversation_id: i64, limit: i64) -> Result<Vec<Message>, DbError> {
        let conn = self.provider.acquire().await?;
        let rows = conn
            .query(
                "SELECT id, conversation_id, sender_id, content, created_at FROM (\
                 SELECT id, conversation_id, sender_id, content, created_at FROM messages \
                 WHERE conversation_id = ?1 ORDER BY created_at DESC, id DESC LIMIT ?2\
                 ) AS recent ORDER BY created_at, id",
                &[conversation_id.into(), limit.max(0).into()],
            )
            .await?;
        rows.iter().map(message_from_row).collect()
    }

    async fn create_post(
        &self,
        author_id: i64,
        content: &str,
        tags: &[String],
    ) -> Result<i64, DbError> {
        let tags = normalize_tags(tags);
        let conn = self.provider.acquire().await?;
        let tx = conn.begin().await?;
        let result = create_post_tx(&conn, author_id, content, &tags).await;
        tx.finish(result).await
    }

    async fn like_post(&self, post_id: i64, user_id: i64) -> Result<i64, DbError> {
        let conn = self.provider.acquire().await?;
        let tx = conn.begin().await?;
        let result = like_post_tx(&conn, post_id, user_id).await;
        tx.finish(result).await
    }

    async fn applied_migrations(&self) -> Result<Vec<String>, DbError> {
        let conn = self.provider.acquire().await?;
        schema::applied_migrations(&conn).await
    }
}

async fn friend_request_tx(
    conn: &ScopedConnection,
    from: i64,
    to: i64,
) -> Result<Friendship, DbError> {
    let lookup = format!(
        "SELECT {FRIENDSHIP_COLUMNS} FROM friendships WHERE requester_id = ?1 AND addressee_id = ?2"
    );
    if let Some(row) = conn.query_opt(&lookup, &[to.into(), from.into()]).await? {
        let mut inverse = friendship_from_row(&row)?;
        if inverse.status == FriendshipStatus::Pending {
            conn.execute(
                "UPDATE friendships SET status = 'accepted' WHERE id = ?1",
                &[inverse.id.into()],
            )
            .await?;
            inverse.status = FriendshipStatus::Accepted;
        }
        return Ok(inverse);
    }
    if let Some(row) = conn.query_opt(&lookup, &[from.into(), to.into()]).await? {
        return friendship_from_row(&row);
    }
    let id = conn
        .insert_returning_id(
            "INSERT INTO friendships (requester_id, addressee_id, status) VALUES (?1, ?2, 'pending')",
            &[from.into(), to.into()],
        )
        .await?;
    Ok(Friendship {
        id,
        requester_id: from,
        addressee_id: to,
        status: FriendshipStatus::Pending,
    })
}

async fn direct_conversation_tx(conn: &ScopedConnection, a: i64, b: i64) -> Result<i64, DbError> {
    let existing = conn
        .query_opt(
            "SELECT c.id AS id FROM conversations c \
             JOIN conversation_participants pa ON pa.conversation_id = c.id AND pa.user_id = ?1 \
             JOIN conversation_participants pb ON pb.conversation_id = c.id AND pb.user_id = ?2 \
             WHERE c.is_group = 0 ORDER BY c.id LIMIT 1",
            &[a.into(), b.into()],
        )
        .await?;
    if let Some(id) = existing.and_then(|row| row.get_i64("id")) {
        return Ok(id);
    }
    let id = conn
        .insert_returning_id("INSERT INTO conversations (is_group) VALUES (0)", &[])
        .await?;
    for user in [a, b] {
        conn.execute(
            "INSERT INTO conversation_participants (conversation_id, user_id) VALUES (?1, ?2)",
            &[id.into(), user.into()],
        )
        .await?;
    }
    Ok(id)
}

async fn create_post_tx(
    conn: &ScopedConnection,
    author_id: i64,
    content: &str,
    tags: &[String],
) -> Result<i64, DbError> {
    let post_id = conn
        .insert_returning_id(
            "INSERT INTO posts (author_id, content) VALUES (?1, ?2)",
            &[author_id.into(), content.into()],
        )
        .await?;
    for tag in tags {
        conn.execute(
            "INSERT OR IGNORE INTO tags (name) VALUES (?1)",
            &[tag.as_str().into()],
        )
        .await?;
        conn.execute(
            "INSERT OR IGNORE INTO post_tags (post_id, tag_id) SELECT ?1, id FROM tags WHERE name = ?2",
            &[post_id.into(), tag.as_str().into()],
        )
        .await?;
    }
    Ok(post_id)
}

async fn like_post_tx(conn: &ScopedConnection, post_id: i64, user_id: i64) -> Result<i64, DbError> {
    let inserted = conn
        .execute(
            "INSERT OR IGNORE INTO post_likes (post_id, user_id) VALUES (?1, ?2)",
            &[post_id.into(), user_id.into()],
        )
        .await?;
    if inserted > 0 {
        conn.execute(
            "UPDATE posts SET likes_count = likes_count + 1 WHERE id = ?1",
            &[post_id.into()],
        )
        .await?;
    }
    conn.query_opt("SELECT likes_count FROM posts WHERE id = ?1", &[post_id.into()])
        .await?
        .and_then(|row| row.get_i64("likes_count"))
        .ok_or_else(|| DbError::ExecutionError(format!("post {post_id} not found")))
}
