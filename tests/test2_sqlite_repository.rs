#![cfg(feature = "sqlite")]

use std::sync::Arc;

use maksum_db::{Database, DatabaseSettings, DbError, FriendshipStatus, Repository};

async fn ready(dir: &tempfile::TempDir) -> Result<(Database, Arc<dyn Repository>), DbError> {
    let settings = DatabaseSettings::builder().data_dir(dir.path()).finish();
    let db = Database::connect(settings).await?;
    db.ensure_schema().await?;
    let repo = db.repository();
    Ok((db, repo))
}

#[tokio::test]
async fn users_are_found_by_username_or_email() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let (_db, repo) = ready(&dir).await?;

    let id = repo.create_user("ann", "ann@example.com", "hash").await?;
    let by_id = repo.user_by_id(id).await?.ok_or("by id")?;
    assert_eq!(by_id.username, "ann");
    assert!(by_id.last_seen.is_none());
    assert!(by_id.created_at.is_some());
    assert_eq!(repo.user_by_login("ann@example.com").await?, Some(by_id));
    assert!(repo.user_by_login("nobody").await?.is_none());

    repo.touch_last_seen(id).await?;
    assert!(repo.user_by_id(id).await?.ok_or("by id")?.last_seen.is_some());

    let duplicate = repo.create_user("ann", "other@example.com", "hash").await;
    assert!(duplicate.is_err());
    Ok(())
}

#[tokio::test]
async fn inverse_request_accepts_friendship() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let (_db, repo) = ready(&dir).await?;
    let ann = repo.create_user("ann", "ann@example.com", "h").await?;
    let bob = repo.create_user("bob", "bob@example.com", "h").await?;
    let cat = repo.create_user("cat", "cat@example.com", "h").await?;

    let request = repo.send_friend_request(ann, bob).await?;
    assert_eq!(request.status, FriendshipStatus::Pending);
    let again = repo.send_friend_request(ann, bob).await?;
    assert_eq!(again.id, request.id);
    assert!(repo.friends_of(ann).await?.is_empty());

    let inverse = repo.send_friend_request(bob, ann).await?;
    assert_eq!(inverse.id, request.id);
    assert_eq!(inverse.status, FriendshipStatus::Accepted);

    let pending = repo.send_friend_request(cat, ann).await?;
    assert!(!repo.accept_friend_request(pending.id, bob).await?);
    assert!(repo.accept_friend_request(pending.id, ann).await?);
    assert!(!repo.accept_friend_request(pending.id, ann).await?);

    let names: Vec<String> = repo
        .friends_of(ann)
        .await?
        .into_iter()
        .map(|u| u.username)
        .collect();
    assert_eq!(names, ["bob", "cat"]);

    assert!(matches!(
        repo.send_friend_request(ann, ann).await,
        Err(DbError::ParameterError(_))
    ));
    Ok(())
}

#[tokio::test]
async fn direct_conversation_is_reused() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let (_db, repo) = ready(&dir).await?;
    let ann = repo.create_user("ann", "ann@example.com", "h").await?;
    let bob = repo.create_user("bob", "bob@example.com", "h").await?;
    let eve = repo.create_user("eve", "eve@example.com", "h").await?;

    let conversation = repo.open_direct_conversation(ann, bob).await?;
    assert_eq!(repo.open_direct_conversation(bob, ann).await?, conversation);

    for text in ["one", "two", "three"] {
        repo.send_message(conversation, ann, text).await?;
    }
    let reply = repo.send_message(conversation, bob, "four").await?;
    assert_eq!(reply.sender_id, bob);
    assert_eq!(reply.conversation_id, conversation);

    let recent: Vec<String> = repo
        .messages(conversation, 2)
        .await?
        .into_iter()
        .map(|m| m.content)
        .collect();
    assert_eq!(recent, ["three", "four"]);

    assert!(matches!(
        repo.send_message(conversation, eve, "let me in").await,
        Err(DbError::ParameterError(_))
    ));
    Ok(())
}

#[tokio::test]
async fn likes_are_counted_once_per_user() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let (db, repo) = ready(&dir).await?;
    let ann = repo.create_user("ann", "ann@example.com", "h").await?;
    let bob = repo.create_user("bob", "bob@example.com", "h").await?;

    let tags = vec!["Rust".to_string(), "#rust".to_string(), "sql".to_string()];
    let post = repo.create_post(ann, "hello", &tags).await?;

    assert_eq!(repo.like_post(post, bob).await?, 1);
    assert_eq!(repo.like_post(post, bob).await?, 1);
    assert_eq!(repo.like_post(post, ann).await?, 2);

    let conn = db.acquire().await?;
    let rows = conn
        .query(
            "SELECT t.name AS name FROM post_tags pt JOIN tags t ON t.id = pt.tag_id \
             WHERE pt.post_id = ?1 ORDER BY t.name",
            &[post.into()],
        )
        .await?;
    let names: Vec<&str> = rows.iter().filter_map(|r| r.get_str("name")).collect();
    assert_eq!(names, ["rust", "sql"]);

    assert!(repo.like_post(post + 100, ann).await.is_err());
    Ok(())
}

#[tokio::test]
async fn repository_reports_the_ledger() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let (_db, repo) = ready(&dir).await?;
    assert_eq!(repo.applied_migrations().await?.len(), 3);
    Ok(())
}
