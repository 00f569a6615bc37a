use axum::{extract::State, response::IntoResponse};
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::Result,
    extract::{AppJson, AppPath},
    middleware::AuthUser,
    response::ApiResponse,
    state::AppState,
};
use super::message_dto::EditMessageRequest;

/// Edit the content of one of your messages
#[utoipa::path(
    patch,
    path = "/api/messages/{id}",
    tag = "messages",
    params(
        ("id" = Uuid, Path, description = "Message ID")
    ),
    request_body = EditMessageRequest,
    responses(
        (status = 200, description = "Message updated", body = crate::message::MessageResponse),
        (status = 400, description = "Invalid input"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Not the sender"),
        (status = 404, description = "Message not found")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn edit_message(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    AppPath(message_id): AppPath<Uuid>,
    AppJson(payload): AppJson<EditMessageRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;

    let message = state
        .message_service
        .edit_message(message_id, user_id, payload.content)
        .await?;

    Ok(ApiResponse::ok(message))
}

/// Delete one of your messages; replies to it keep their content but lose the quote
#[utoipa::path(
    delete,
    path = "/api/messages/{id}",
    tag = "messages",
    params(
        ("id" = Uuid, Path, description = "Message ID")
    ),
    responses(
        (status = 200, description = "Message deleted"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Not the sender"),
        (status = 404, description = "Message not found")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn delete_message(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    AppPath(message_id): AppPath<Uuid>,
) -> Result<impl IntoResponse> {
    state
        .message_service
        .delete_message(message_id, user_id)
        .await?;

    Ok(ApiResponse::ok(json!({ "id": message_id })))
}

/// Mark a single message as read
#[utoipa::path(
    patch,
    path = "/api/messages/{id}/read",
    tag = "messages",
    params(
        ("id" = Uuid, Path, description = "Message ID to mark as read")
    ),
    responses(
        (status = 200, description = "Message marked as read"),
        (status = 400, description = "Own message"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Not a participant"),
        (status = 404, description = "Message not found")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn mark_message_read(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    AppPath(message_id): AppPath<Uuid>,
) -> Result<impl IntoResponse> {
    let changed = state
        .message_service
        .mark_message_read(message_id, user_id)
        .await?;

    Ok(ApiResponse::ok(json!({ "id": message_id, "changed": changed })))
}
