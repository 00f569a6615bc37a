use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Display fields of a platform user, denormalised onto chat views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub username: String,
    pub email: String,
    pub photo_url: Option<String>,
}
