use crate::{auth::verify_jwt, error::AppError, state::AppState};
use axum::{
    async_trait,
    body::Body,
    extract::{FromRequestParts, State},
    http::{header::AUTHORIZATION, request::Parts, Request},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(&req)
        .ok_or_else(|| AppError::Unauthorized("Missing credentials".to_string()))?;

    let claims = verify_jwt(token, &state.config.jwt_secret)?;
    let user_id = claims.user_id()?;

    req.extensions_mut().insert(user_id);

    Ok(next.run(req).await)
}

/// `Authorization: Bearer <jwt>`, or a `token` query parameter for WebSocket
/// upgrades where browsers cannot set headers.
fn bearer_token(req: &Request<Body>) -> Option<&str> {
    if let Some(header) = req.headers().get(AUTHORIZATION) {
        return header.to_str().ok()?.strip_prefix("Bearer ");
    }

    req.uri()
        .query()?
        .split('&')
        .find_map(|pair| pair.strip_prefix("token="))
        .filter(|token| !token.is_empty())
}

// Extractor for getting user_id from request extensions
pub struct AuthUser(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Uuid>()
            .copied()
            .map(AuthUser)
            .ok_or(AppError::Unauthorized("Invalid credentials".to_string()))
    }
}
