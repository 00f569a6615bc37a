use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    Forbidden(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Raw storage failure tagged with the store operation that produced it.
    /// Only repositories create this; the service boundary translates it.
    #[error("{op} failed: {source}")]
    Store {
        op: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("Internal server error")]
    InternalError,
}

impl From<sqlx::Error> for AppError {
    fn from(source: sqlx::Error) -> Self {
        AppError::Store { op: "query", source }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

/// Attaches the store operation name to a sqlx result.
pub trait StoreContext<T> {
    fn context(self, op: &'static str) -> Result<T>;
}

impl<T> StoreContext<T> for std::result::Result<T, sqlx::Error> {
    fn context(self, op: &'static str) -> Result<T> {
        self.map_err(|source| AppError::Store { op, source })
    }
}

impl AppError {
    /// Translate store-level failures into the public taxonomy.
    pub fn at_boundary(self, operation: &'static str) -> Self {
        let (op, source) = match self {
            AppError::Store { op, source } => (op, source),
            other => return other,
        };

        match &source {
            sqlx::Error::RowNotFound => {
                tracing::debug!(operation, op, "row not found");
                AppError::NotFound(format!("{op}: record not found"))
            }
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                tracing::warn!(operation, op, error = %source, "unique constraint conflict");
                AppError::Conflict(format!("{op}: concurrent write conflict, retry the request"))
            }
            _ => {
                tracing::error!(operation, op, error = %source, "storage failure");
                AppError::Unavailable("storage is temporarily unavailable".to_string())
            }
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Conflict(_) | AppError::Unavailable(_))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::BadRequest(_) | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unavailable(_) | AppError::Store { .. } => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            AppError::Store { op, .. } => {
                tracing::error!(op, "untranslated storage error reached the http layer");
                "storage is temporarily unavailable".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "code": status.as_u16(),
            "status": "error",
            "message": message,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_not_found_becomes_not_found() {
        let err = AppError::Store {
            op: "messages.find_by_id",
            source: sqlx::Error::RowNotFound,
        };
        let translated = err.at_boundary("edit_message");
        assert!(matches!(translated, AppError::NotFound(_)));
        assert_eq!(translated.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn pool_failures_become_unavailable() {
        let err = AppError::Store {
            op: "begin",
            source: sqlx::Error::PoolTimedOut,
        };
        let translated = err.at_boundary("send_message");
        assert!(matches!(translated, AppError::Unavailable(_)));
        assert!(translated.is_retryable());
    }

    #[test]
    fn taxonomy_errors_pass_through_untouched() {
        let err = AppError::Forbidden("not yours".into()).at_boundary("delete_message");
        assert!(matches!(err, AppError::Forbidden(ref m) if m == "not yours"));
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
        assert!(!err.is_retryable());
    }
}
