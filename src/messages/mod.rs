mod create;
mod model;
pub mod store;
mod ws;

pub use create::create_message;
pub use model::{BLOCKED_EXTENSIONS, DEFAULT_TTL_SECONDS, Message, NewMessage, extension_allowed};

use axum::{
    Json, Router, debug_handler,
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{AppError, AppResult, AppState, files::FileStore};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/messages", get(list_messages).post(create::post_message))
        .route("/files/{file_id}", get(download_file))
        .route("/ws/chat", get(ws::chat_ws))
}

/// All live messages, oldest first. Expiry is the sweepers' job; a message
/// on the edge of its TTL may still appear here until the next sweep.
#[debug_handler(state = crate::AppState)]
async fn list_messages(State(db_pool): State<SqlitePool>) -> AppResult<Json<Vec<Message>>> {
    Ok(Json(store::find_live(&db_pool, Utc::now()).await?))
}

#[debug_handler(state = crate::AppState)]
async fn download_file(
    Path(file_id): Path<Uuid>,
    State(db_pool): State<SqlitePool>,
    State(files): State<FileStore>,
) -> AppResult<Response> {
    let message = store::find_by_file_id(&db_pool, file_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("file {file_id}")))?;
    let key = message
        .file_path
        .ok_or_else(|| AppError::NotFound(format!("file {file_id}")))?;

    let data = files.read(&key).await?;
    let download_name =
        sanitize_download_name(&message.file_name.unwrap_or_else(|| key.clone()));

    Ok((
        [
            (
                header::CONTENT_TYPE,
                "application/octet-stream".to_owned(),
            ),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{download_name}\""),
            ),
        ],
        data,
    )
        .into_response())
}

// The sender picks this name; quotes would escape the header's quoting and
// control characters make the whole value invalid.
fn sanitize_download_name(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_control())
        .map(|c| match c {
            '"' | '\\' => '_',
            other => other,
        })
        .collect()
}
