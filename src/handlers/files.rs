// src/handlers/files.rs
use crate::config::Capability;
use crate::conversation;
use crate::AppState;
use axum::{
    extract::{Extension, Path},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::sync::Arc;
use uuid::Uuid;

pub fn file_routes() -> Router {
    Router::new().route("/files/:id", get(download_file))
}

/// Serves a stored document by id. Possession of the id is the only access
/// control, and stored files never expire.
async fn download_file(
    Path(id): Path<String>,
    Extension(state): Extension<Arc<AppState>>,
) -> Response {
    let Ok(file_id) = id.parse::<Uuid>() else {
        return (StatusCode::NOT_FOUND, "file not found").into_response();
    };

    let pool = match &state.db {
        Capability::Ready(pool) => pool,
        Capability::Missing { reason } => {
            tracing::error!("file download requested but {}", reason);
            return (StatusCode::INTERNAL_SERVER_ERROR, "file store unavailable").into_response();
        }
    };

    match conversation::fetch_file(pool, file_id).await {
        Ok(Some(file)) => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, file.mime_type)
            .header(header::CONTENT_DISPOSITION, content_disposition(&file.filename))
            .body(axum::body::Body::from(file.data))
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()),
        Ok(None) => (StatusCode::NOT_FOUND, "file not found").into_response(),
        Err(e) => {
            tracing::error!("failed to load file {}: {}", file_id, e);
            (StatusCode::INTERNAL_SERVER_ERROR, "file store unavailable").into_response()
        }
    }
}

// RFC 5987 encoding; the stored filenames are usually Chinese.
fn content_disposition(filename: &str) -> String {
    format!(
        "attachment; filename*=UTF-8''{}",
        urlencoding::encode(filename)
    )
}
