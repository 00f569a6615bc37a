use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Clone, Debug, Deserialize, Validate, ToSchema)]
pub struct CreateConversationRequest {
    /// Other participants; the caller is always included.
    #[validate(length(min = 1, max = 100))]
    pub participant_ids: Vec<Uuid>,
}
