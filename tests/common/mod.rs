#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use chat_backend::{
    auth::create_jwt,
    db::{create_pool, run_migrations, Database},
    message::{MessageResponse, MessageService, SendMessageRequest},
    routes::create_router,
    state::{AppState, Config},
    user::{UserProfile, UserRepository},
    websocket::{ConnectionManager, EventPublisher},
};
use serde_json::Value;
use std::{sync::Arc, time::Duration};
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

pub const JWT_SECRET: &str = "test-secret";

pub fn test_config() -> Config {
    Config {
        database_url: "sqlite::memory:".into(),
        jwt_secret: JWT_SECRET.into(),
        host: "127.0.0.1".into(),
        port: 0,
        request_timeout: Duration::from_secs(5),
        db_max_connections: 1,
        nats_url: None,
        cors_origins: Vec::new(),
    }
}

/// In-memory database with migrations applied.
pub async fn setup_test_db() -> Database {
    let pool = create_pool("sqlite::memory:", 1)
        .await
        .expect("Failed to create in-memory SQLite pool");
    run_migrations(&pool).await.expect("Failed to run migrations");
    Database::new(pool)
}

/// File-backed database so several pooled connections share one store.
/// Keep the returned directory alive for the duration of the test.
pub async fn setup_file_db(max_connections: u32) -> (Database, TempDir) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let url = format!("sqlite://{}", dir.path().join("chat.db").display());
    let pool = create_pool(&url, max_connections)
        .await
        .expect("Failed to create file-backed SQLite pool");
    run_migrations(&pool).await.expect("Failed to run migrations");
    (Database::new(pool), dir)
}

pub fn service_with_timeout(db: &Database, request_timeout: Duration) -> MessageService {
    let events = EventPublisher::local(ConnectionManager::new());
    MessageService::new(db.clone(), events, request_timeout)
}

pub async fn setup_state() -> AppState {
    let db = setup_test_db().await;
    AppState::new(db, Arc::new(test_config()), None)
}

pub async fn setup_service() -> (MessageService, Database) {
    let state = setup_state().await;
    (state.message_service.clone(), state.db.clone())
}

pub async fn create_test_user(db: &Database, username: &str) -> UserProfile {
    let users = UserRepository::new(db);
    let mut tx = db.begin().await.unwrap();
    let user = users
        .create(
            &mut tx,
            &username.to_uppercase(),
            username,
            &format!("{}@test.com", username),
            None,
        )
        .await
        .unwrap();
    tx.commit().await.unwrap();
    user
}

pub fn text(content: &str) -> SendMessageRequest {
    SendMessageRequest {
        content: content.to_string(),
        ..Default::default()
    }
}

/// Opens a conversation between `a` and `b` and returns its id.
pub async fn open_conversation(service: &MessageService, a: Uuid, b: Uuid) -> Uuid {
    service
        .get_or_create_conversation(a, vec![b])
        .await
        .unwrap()
        .0
        .id
}

pub async fn send_text(service: &MessageService, conversation_id: Uuid, sender: Uuid, content: &str) -> MessageResponse {
    service
        .send_message(conversation_id, sender, text(content))
        .await
        .unwrap()
}

pub fn token_for(user_id: Uuid) -> String {
    create_jwt(user_id, JWT_SECRET, 1).unwrap()
}

pub fn create_test_app(state: AppState) -> Router {
    create_router(state)
}

/// Sends one request through the router and returns status plus JSON body.
pub async fn call(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };

    (status, json)
}
