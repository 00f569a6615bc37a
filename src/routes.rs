use crate::{
    conversation::{
        conversation_dto::CreateConversationRequest,
        conversation_handlers,
        conversation_models::{ConversationView, Participant, ReadReceipt, UnreadSummary},
    },
    message::{
        message_dto::{EditMessageRequest, SendMessageRequest},
        message_handlers,
        message_models::{MessageResponse, MessageType, ReplyPreview},
    },
    middleware::auth_middleware,
    state::{AppState, Config},
    user::UserProfile,
    websocket::types::{ConversationReadPayload, ErrorPayload, MessageEventPayload, WsMessage},
};
use axum::{
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware,
    routing::{get, patch},
    Json, Router,
};
use serde_json::json;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::conversation::conversation_handlers::create_conversation,
        crate::conversation::conversation_handlers::list_conversations,
        crate::conversation::conversation_handlers::unread_summary,
        crate::conversation::conversation_handlers::get_conversation,
        crate::conversation::conversation_handlers::send_message,
        crate::conversation::conversation_handlers::list_messages,
        crate::conversation::conversation_handlers::mark_conversation_read,
        crate::message::message_handlers::edit_message,
        crate::message::message_handlers::delete_message,
        crate::message::message_handlers::mark_message_read,
        crate::websocket::handler::ws_handler,
    ),
    components(
        schemas(
            CreateConversationRequest,
            ConversationView,
            Participant,
            ReadReceipt,
            UnreadSummary,
            SendMessageRequest,
            EditMessageRequest,
            MessageResponse,
            MessageType,
            ReplyPreview,
            UserProfile,
            WsMessage,
            MessageEventPayload,
            ConversationReadPayload,
            ErrorPayload,
        )
    ),
    tags(
        (name = "conversations", description = "Conversation and message history endpoints"),
        (name = "messages", description = "Single message endpoints"),
        (name = "realtime", description = "Chat event socket")
    ),
    modifiers(&SecurityAddon)
)]
struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                utoipa::openapi::security::SecurityScheme::Http(
                    utoipa::openapi::security::Http::new(
                        utoipa::openapi::security::HttpAuthScheme::Bearer,
                    ),
                ),
            )
        }
    }
}

/// Explicit origins allow credentials; without any configured origins the API
/// is open to every origin without credentials.
fn cors_layer(config: &Config) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE]);

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if origins.is_empty() {
        base.allow_origin(Any)
    } else {
        base.allow_origin(AllowOrigin::list(origins))
            .allow_credentials(true)
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);

    let conversation_routes = Router::new()
        .route(
            "/",
            get(conversation_handlers::list_conversations)
                .post(conversation_handlers::create_conversation),
        )
        .route("/unread", get(conversation_handlers::unread_summary))
        .route("/:id", get(conversation_handlers::get_conversation))
        .route(
            "/:id/messages",
            get(conversation_handlers::list_messages).post(conversation_handlers::send_message),
        )
        .route("/:id/read", patch(conversation_handlers::mark_conversation_read))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let message_routes = Router::new()
        .route(
            "/:id",
            patch(message_handlers::edit_message).delete(message_handlers::delete_message),
        )
        .route("/:id/read", patch(message_handlers::mark_message_read))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let ws_routes = Router::new()
        .route("/ws", get(crate::websocket::ws_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let api_routes = Router::new()
        .nest("/conversations", conversation_routes)
        .nest("/messages", message_routes)
        .merge(ws_routes);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(|| async { Json(json!({ "status": "ok" })) }))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
