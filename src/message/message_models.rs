use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::{fmt, str::FromStr};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{error::AppError, user::UserProfile};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    Image,
    Document,
    Audio,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::Image => "image",
            MessageType::Document => "document",
            MessageType::Audio => "audio",
        }
    }

    pub fn carries_attachment(&self) -> bool {
        !matches!(self, MessageType::Text)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(MessageType::Text),
            "image" => Ok(MessageType::Image),
            "document" | "file" => Ok(MessageType::Document),
            "audio" => Ok(MessageType::Audio),
            other => Err(AppError::BadRequest(format!(
                "Unknown message type '{}', expected one of text, image, document, audio",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub message_type: MessageType,
    pub content: String,
    pub file_path: Option<String>,
    pub file_name: Option<String>,
    pub file_size: Option<i64>,
    pub file_type: Option<String>,
    pub is_read: bool,
    pub reply_to_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Attachment {
    pub file_path: String,
    pub file_name: String,
    pub file_size: Option<i64>,
    pub file_type: Option<String>,
}

/// A validated message ready to be appended to a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub message_type: MessageType,
    pub content: String,
    pub attachment: Option<Attachment>,
    pub reply_to_id: Option<Uuid>,
}

/// Enough of the replied-to message to render a quote.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReplyPreview {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub message_type: MessageType,
    pub content: String,
}

impl From<&Message> for ReplyPreview {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id,
            sender_id: message.sender_id,
            message_type: message.message_type,
            content: message.content.clone(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub message_type: MessageType,
    pub content: String,
    pub file_path: Option<String>,
    pub file_name: Option<String>,
    pub file_size: Option<i64>,
    pub file_type: Option<String>,
    pub is_read: bool,
    pub reply_to_id: Option<Uuid>,
    pub reply_to: Option<ReplyPreview>,
    pub sender: Option<UserProfile>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MessageResponse {
    pub fn with_sender(mut self, sender: Option<UserProfile>) -> Self {
        self.sender = sender;
        self
    }

    pub fn with_reply(mut self, reply_to: Option<ReplyPreview>) -> Self {
        self.reply_to = reply_to;
        self
    }
}

impl From<Message> for MessageResponse {
    fn from(message: Message) -> Self {
        Self {
            id: message.id,
            conversation_id: message.conversation_id,
            sender_id: message.sender_id,
            message_type: message.message_type,
            content: message.content,
            file_path: message.file_path,
            file_name: message.file_name,
            file_size: message.file_size,
            file_type: message.file_type,
            is_read: message.is_read,
            reply_to_id: message.reply_to_id,
            reply_to: None,
            sender: None,
            created_at: message.created_at,
            updated_at: message.updated_at,
        }
    }
}
