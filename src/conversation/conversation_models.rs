use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::message::MessageResponse;

/// Namespace for participant-set keys.
const PARTICIPANT_KEY_NAMESPACE: Uuid = Uuid::from_u128(0x6c1f_4b0e_93d2_4a57_b8e1_2f0c_7d3a_9e45);

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Conversation {
    pub id: Uuid,
    #[serde(skip)]
    pub participant_key: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Row of the paged inbox query; `total_count` comes from a window over the
/// unpaged result.
#[derive(Debug, Clone, FromRow)]
pub struct ConversationPageRow {
    pub id: Uuid,
    pub participant_key: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub total_count: i64,
}

impl From<ConversationPageRow> for Conversation {
    fn from(row: ConversationPageRow) -> Self {
        Self {
            id: row.id,
            participant_key: row.participant_key,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Participant row joined with the user's display fields.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Participant {
    #[serde(skip)]
    pub conversation_id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub username: String,
    pub email: String,
    pub photo_url: Option<String>,
    pub last_read_at: Option<DateTime<Utc>>,
}

/// A conversation as seen by one viewer.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConversationView {
    pub id: Uuid,
    pub participants: Vec<Participant>,
    pub last_message: Option<MessageResponse>,
    pub unread_count: i64,
    pub has_unseen_activity: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ReadReceipt {
    pub conversation_id: Uuid,
    pub user_id: Uuid,
    pub messages_marked: u64,
    pub last_read_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UnreadSummary {
    pub unread_messages: i64,
    pub unread_conversations: i64,
}

/// Sorted, de-duplicated participant ids.
pub fn normalize_participants(ids: impl IntoIterator<Item = Uuid>) -> Vec<Uuid> {
    let mut ids: Vec<Uuid> = ids.into_iter().collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}

/// Deterministic identity of a participant set, independent of input order.
/// Expects the output of `normalize_participants`.
pub fn participant_key(sorted_ids: &[Uuid]) -> Uuid {
    let joined = sorted_ids
        .iter()
        .map(|id| id.simple().to_string())
        .collect::<Vec<_>>()
        .join(",");
    Uuid::new_v5(&PARTICIPANT_KEY_NAMESPACE, joined.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_sorts_and_dedups() {
        let a = Uuid::from_u128(2);
        let b = Uuid::from_u128(1);
        assert_eq!(normalize_participants([a, b, a]), vec![b, a]);
    }

    #[test]
    fn key_is_order_independent() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let ab = participant_key(&normalize_participants([a, b]));
        let ba = participant_key(&normalize_participants([b, a, b]));
        assert_eq!(ab, ba);
    }

    #[test]
    fn key_differs_for_superset() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        assert_ne!(
            participant_key(&normalize_participants([a, b])),
            participant_key(&normalize_participants([a, b, c]))
        );
    }
}
