// src/conversation.rs
use crate::models::{Message, StoredFile};
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

/// Most recent messages forwarded to the model per request.
pub const HISTORY_LIMIT: i64 = 20;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Appends one message to the log. The server assigns the timestamp, so
/// per-user ordering follows insertion order.
pub async fn append_message(
    pool: &PgPool,
    user_id: &str,
    role: &str,
    content: &str,
) -> Result<Message, StoreError> {
    let message = sqlx::query_as::<_, Message>(
        "INSERT INTO messages (user_id, role, content)
         VALUES ($1, $2, $3)
         RETURNING id, user_id, role, content, created_at",
    )
    .bind(user_id)
    .bind(role)
    .bind(content)
    .fetch_one(pool)
    .await?;

    Ok(message)
}

/// The most recent `HISTORY_LIMIT` messages for a user, oldest first.
pub async fn recent_history(pool: &PgPool, user_id: &str) -> Result<Vec<Message>, StoreError> {
    let rows = sqlx::query_as::<_, Message>(
        "SELECT id, user_id, role, content, created_at
         FROM messages
         WHERE user_id = $1
         ORDER BY created_at DESC, id DESC
         LIMIT $2",
    )
    .bind(user_id)
    .bind(HISTORY_LIMIT)
    .fetch_all(pool)
    .await?;

    Ok(into_chronological(rows))
}

// The query orders newest-first (ties broken by id) so the LIMIT keeps the
// latest rows; callers want them oldest-first.
fn into_chronological(mut rows: Vec<Message>) -> Vec<Message> {
    rows.reverse();
    rows
}

pub async fn store_file(
    pool: &PgPool,
    user_id: &str,
    filename: &str,
    mime_type: &str,
    data: &[u8],
) -> Result<Uuid, StoreError> {
    let id = Uuid::new_v4();

    sqlx::query(
        "INSERT INTO files (id, user_id, filename, mime_type, data)
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(id)
    .bind(user_id)
    .bind(filename)
    .bind(mime_type)
    .bind(data)
    .execute(pool)
    .await?;

    Ok(id)
}

pub async fn fetch_file(pool: &PgPool, id: Uuid) -> Result<Option<StoredFile>, StoreError> {
    let file = sqlx::query_as::<_, StoredFile>(
        "SELECT id, user_id, filename, mime_type, data, created_at
         FROM files
         WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(file)
}
