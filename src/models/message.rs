// src/models/message.rs
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One row of the append-only conversation log. Never mutated or deleted;
/// per-user ordering is `(created_at, id)`.
#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct Message {
    pub id: i64,
    pub user_id: String,
    /// `"user"` or `"assistant"`.
    pub role: String,
    pub content: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}
