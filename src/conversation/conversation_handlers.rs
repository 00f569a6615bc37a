use axum::{extract::State, http::StatusCode, response::IntoResponse};
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::Result,
    extract::{AppJson, AppPath, AppQuery},
    message::SendMessageRequest,
    middleware::AuthUser,
    response::{ApiResponse, Page, PageQuery, PaginatedResponse},
    state::AppState,
};
use super::conversation_dto::CreateConversationRequest;

/// Open (or reopen) a conversation with the given users
#[utoipa::path(
    post,
    path = "/api/conversations",
    tag = "conversations",
    request_body = CreateConversationRequest,
    responses(
        (status = 201, description = "Conversation created", body = crate::conversation::ConversationView),
        (status = 200, description = "Existing conversation with the same participants", body = crate::conversation::ConversationView),
        (status = 400, description = "Invalid input"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "A participant does not exist")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn create_conversation(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    AppJson(payload): AppJson<CreateConversationRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;

    let (view, created) = state
        .message_service
        .get_or_create_conversation(user_id, payload.participant_ids)
        .await?;

    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok(ApiResponse::with_status(status, view))
}

/// List the authenticated user's conversations, most recently active first
#[utoipa::path(
    get,
    path = "/api/conversations",
    tag = "conversations",
    params(
        ("page" = Option<u32>, Query, description = "Page number (default: 1)"),
        ("limit" = Option<u32>, Query, description = "Items per page (default: 20, max: 100)")
    ),
    responses(
        (status = 200, description = "Paginated conversations", body = Vec<crate::conversation::ConversationView>),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn list_conversations(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    AppQuery(query): AppQuery<PageQuery>,
) -> Result<impl IntoResponse> {
    let page = Page::from(query);
    let (items, total) = state.message_service.list_conversations(user_id, page).await?;

    Ok(ApiResponse::ok(PaginatedResponse::new(items, total, page)))
}

/// Unread totals across all of the user's conversations
#[utoipa::path(
    get,
    path = "/api/conversations/unread",
    tag = "conversations",
    responses(
        (status = 200, description = "Unread summary", body = crate::conversation::UnreadSummary),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn unread_summary(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<impl IntoResponse> {
    let summary = state.message_service.unread_summary(user_id).await?;
    Ok(ApiResponse::ok(summary))
}

/// Get one conversation with participants, last message and unread count
#[utoipa::path(
    get,
    path = "/api/conversations/{id}",
    tag = "conversations",
    params(
        ("id" = Uuid, Path, description = "Conversation ID")
    ),
    responses(
        (status = 200, description = "Conversation", body = crate::conversation::ConversationView),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Not a participant"),
        (status = 404, description = "Conversation not found")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_conversation(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    AppPath(conversation_id): AppPath<Uuid>,
) -> Result<impl IntoResponse> {
    let view = state
        .message_service
        .get_conversation(conversation_id, user_id)
        .await?;

    Ok(ApiResponse::ok(view))
}

/// Post a message to a conversation
#[utoipa::path(
    post,
    path = "/api/conversations/{id}/messages",
    tag = "conversations",
    params(
        ("id" = Uuid, Path, description = "Conversation ID")
    ),
    request_body = SendMessageRequest,
    responses(
        (status = 201, description = "Message sent", body = crate::message::MessageResponse),
        (status = 400, description = "Invalid message"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Not a participant"),
        (status = 404, description = "Conversation not found")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn send_message(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    AppPath(conversation_id): AppPath<Uuid>,
    AppJson(payload): AppJson<SendMessageRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;

    let message = state
        .message_service
        .send_message(conversation_id, user_id, payload)
        .await?;

    Ok(ApiResponse::created(message))
}

/// Message history, newest first
#[utoipa::path(
    get,
    path = "/api/conversations/{id}/messages",
    tag = "conversations",
    params(
        ("id" = Uuid, Path, description = "Conversation ID"),
        ("page" = Option<u32>, Query, description = "Page number (default: 1)"),
        ("limit" = Option<u32>, Query, description = "Items per page (default: 20, max: 100)")
    ),
    responses(
        (status = 200, description = "Paginated messages", body = Vec<crate::message::MessageResponse>),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Not a participant"),
        (status = 404, description = "Conversation not found")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn list_messages(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    AppPath(conversation_id): AppPath<Uuid>,
    AppQuery(query): AppQuery<PageQuery>,
) -> Result<impl IntoResponse> {
    let page = Page::from(query);
    let (items, total) = state
        .message_service
        .list_messages(conversation_id, user_id, page)
        .await?;

    Ok(ApiResponse::ok(PaginatedResponse::new(items, total, page)))
}

/// Mark every message in the conversation as read
#[utoipa::path(
    patch,
    path = "/api/conversations/{id}/read",
    tag = "conversations",
    params(
        ("id" = Uuid, Path, description = "Conversation ID")
    ),
    responses(
        (status = 200, description = "Conversation marked as read", body = crate::conversation::ReadReceipt),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Not a participant"),
        (status = 404, description = "Conversation not found")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn mark_conversation_read(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    AppPath(conversation_id): AppPath<Uuid>,
) -> Result<impl IntoResponse> {
    let receipt = state
        .message_service
        .mark_conversation_read(conversation_id, user_id)
        .await?;

    Ok(ApiResponse::ok(receipt))
}
