use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use tracing::{debug, info};

use crate::{
    error::AppError,
    message::{ChatRequest, ChatResponse},
    state::SharedState,
};

pub async fn chat_handler(
    State(state): State<SharedState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, AppError> {
    let Json(payload) = payload.map_err(|rejection| {
        debug!(reason = %rejection.body_text(), "chat body rejected");
        AppError::InvalidBody
    })?;

    // Ids are opaque: the trimmed form is only used for the blank check.
    let user_id = payload.user_id.as_str();
    if user_id.trim().is_empty() {
        return Err(AppError::BadRequest("userId must not be empty".to_string()));
    }
    if payload.message.trim().is_empty() {
        return Err(AppError::BadRequest("message must not be empty".to_string()));
    }

    let session = state.sessions.get_or_create(user_id).await?;

    // The registry lock is already released here.
    let reply = session.send_message(&payload.message).await?;
    info!(user_id, reply_len = reply.len(), "chat reply sent");
    debug!(user_id, %reply, "gemini reply");

    Ok(Json(ChatResponse { response: reply }))
}

pub async fn reset_session_handler(
    State(state): State<SharedState>,
    Path(user_id): Path<String>,
) -> Result<StatusCode, AppError> {
    if state.sessions.remove(&user_id).await {
        info!(user_id = %user_id, "session reset");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound("No session for user".to_string()))
    }
}
