// src/models/file.rs
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A rendered document blob, immutable once stored. There is no expiry policy
/// and no ownership check on retrieval; possession of the id is the only
/// access control.
#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct StoredFile {
    pub id: Uuid,
    pub user_id: String,
    pub filename: String,
    pub mime_type: String,
    pub data: Vec<u8>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}
