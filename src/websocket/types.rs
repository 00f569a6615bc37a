use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Server-to-client frames. Chat events carry ids only; clients fetch the
/// content they need over REST.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    MessageCreated(MessageEventPayload),
    MessageUpdated(MessageEventPayload),
    MessageDeleted(MessageEventPayload),
    ConversationRead(ConversationReadPayload),
    Error(ErrorPayload),
    Ping,
    Pong,
}

impl WsMessage {
    pub fn conversation_id(&self) -> Option<Uuid> {
        match self {
            WsMessage::MessageCreated(p)
            | WsMessage::MessageUpdated(p)
            | WsMessage::MessageDeleted(p) => Some(p.conversation_id),
            WsMessage::ConversationRead(p) => Some(p.conversation_id),
            WsMessage::Error(_) | WsMessage::Ping | WsMessage::Pong => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MessageEventPayload {
    pub conversation_id: Uuid,
    pub message_id: Uuid,
    pub sender_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ConversationReadPayload {
    pub conversation_id: Uuid,
    pub user_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ErrorPayload {
    pub message: String,
}

// Client-to-server frames
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Ping,
    Pong,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn message_created_is_tagged_snake_case() {
        let conversation_id = Uuid::new_v4();
        let message_id = Uuid::new_v4();
        let sender_id = Uuid::new_v4();
        let frame = WsMessage::MessageCreated(MessageEventPayload {
            conversation_id,
            message_id,
            sender_id,
        });

        assert_eq!(
            serde_json::to_value(&frame).unwrap(),
            json!({
                "type": "message_created",
                "conversation_id": conversation_id,
                "message_id": message_id,
                "sender_id": sender_id,
            })
        );
        assert_eq!(frame.conversation_id(), Some(conversation_id));
    }

    #[test]
    fn client_ping_parses() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Ping));
    }
}
