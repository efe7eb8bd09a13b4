use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use agora_types::api::{SendGroupMessageRequest, SendPrivateMessageRequest};
use agora_types::models::{ChatMessage, PrivateHistory};

use crate::auth::AppState;
use crate::error::status_for;
use crate::middleware::AuthUser;

pub async fn send_private(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<SendPrivateMessageRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let message = state
        .fanout
        .send_private_message(user.user_id, req.recipient_id, req.content)
        .await
        .map_err(status_for)?;
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn private_history(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(other_id): Path<Uuid>,
) -> Result<Json<PrivateHistory>, StatusCode> {
    let me = user.user_id;
    let history = state
        .fanout
        .blocking(move |db| db.private_history(me, other_id))
        .await
        .map_err(status_for)?;
    Ok(Json(history))
}

/// Users with unread private messages for the caller.
pub async fn unread_senders(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<Uuid>>, StatusCode> {
    let me = user.user_id;
    let senders = state
        .fanout
        .blocking(move |db| db.unread_senders(me))
        .await
        .map_err(status_for)?;
    Ok(Json(senders))
}

pub async fn send_group(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(group_id): Path<Uuid>,
    Json(req): Json<SendGroupMessageRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let message = state
        .fanout
        .send_group_message(group_id, user.user_id, req.content)
        .await
        .map_err(status_for)?;
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn group_history(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(group_id): Path<Uuid>,
) -> Result<Json<Vec<ChatMessage>>, StatusCode> {
    state
        .fanout
        .require_member(group_id, user.user_id)
        .await
        .map_err(status_for)?;

    let history = state
        .fanout
        .blocking(move |db| db.group_history(group_id))
        .await
        .map_err(status_for)?;
    Ok(Json(history))
}
