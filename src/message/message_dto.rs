use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, Result};
use super::message_models::{Attachment, MessageType, NewMessage};

#[derive(Clone, Debug, Default, Deserialize, Validate, ToSchema)]
pub struct SendMessageRequest {
    /// `text` (default), `image`, `document` (or `file`), `audio`.
    pub message_type: Option<String>,
    /// Body for text messages, optional caption otherwise.
    #[serde(default)]
    #[validate(length(max = 10000))]
    pub content: String,
    pub file_path: Option<String>,
    pub file_name: Option<String>,
    #[validate(range(min = 0))]
    pub file_size: Option<i64>,
    pub file_type: Option<String>,
    pub reply_to_id: Option<Uuid>,
}

impl SendMessageRequest {
    /// Checks type/attachment coherence and produces the store input.
    pub fn into_new_message(self, conversation_id: Uuid, sender_id: Uuid) -> Result<NewMessage> {
        let message_type = match self.message_type.as_deref() {
            Some(raw) => raw.parse::<MessageType>()?,
            None => MessageType::Text,
        };

        let has_attachment_fields = self.file_path.is_some()
            || self.file_name.is_some()
            || self.file_size.is_some()
            || self.file_type.is_some();

        let attachment = if message_type.carries_attachment() {
            let file_path = non_blank(self.file_path).ok_or_else(|| {
                AppError::BadRequest(format!("{} messages require file_path", message_type))
            })?;
            let file_name = non_blank(self.file_name).ok_or_else(|| {
                AppError::BadRequest(format!("{} messages require file_name", message_type))
            })?;
            if matches!(self.file_size, Some(size) if size < 0) {
                return Err(AppError::BadRequest("file_size must not be negative".to_string()));
            }

            Some(Attachment {
                file_path,
                file_name,
                file_size: self.file_size,
                file_type: non_blank(self.file_type),
            })
        } else {
            if self.content.trim().is_empty() {
                return Err(AppError::BadRequest(
                    "Text messages require non-empty content".to_string(),
                ));
            }
            if has_attachment_fields {
                return Err(AppError::BadRequest(
                    "Text messages cannot carry attachment fields".to_string(),
                ));
            }
            None
        };

        Ok(NewMessage {
            conversation_id,
            sender_id,
            message_type,
            content: self.content,
            attachment,
            reply_to_id: self.reply_to_id,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[derive(Clone, Debug, Deserialize, Validate, ToSchema)]
pub struct EditMessageRequest {
    #[validate(length(min = 1, max = 10000))]
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> (Uuid, Uuid) {
        (Uuid::new_v4(), Uuid::new_v4())
    }

    #[test]
    fn defaults_to_text() {
        let (c, s) = ids();
        let msg = SendMessageRequest {
            content: "hi".into(),
            ..Default::default()
        }
        .into_new_message(c, s)
        .unwrap();

        assert_eq!(msg.message_type, MessageType::Text);
        assert_eq!(msg.attachment, None);
        assert_eq!(msg.conversation_id, c);
        assert_eq!(msg.sender_id, s);
    }

    #[test]
    fn blank_text_is_rejected() {
        let (c, s) = ids();
        let err = SendMessageRequest {
            content: "   ".into(),
            ..Default::default()
        }
        .into_new_message(c, s)
        .unwrap_err();

        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn text_with_attachment_fields_is_rejected() {
        let (c, s) = ids();
        let err = SendMessageRequest {
            content: "look".into(),
            file_path: Some("/uploads/a.png".into()),
            ..Default::default()
        }
        .into_new_message(c, s)
        .unwrap_err();

        assert!(matches!(err, AppError::BadRequest(ref m) if m.contains("attachment")));
    }

    #[test]
    fn image_requires_path_and_name() {
        let (c, s) = ids();
        let err = SendMessageRequest {
            message_type: Some("image".into()),
            file_name: Some("a.png".into()),
            ..Default::default()
        }
        .into_new_message(c, s)
        .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(ref m) if m.contains("file_path")));

        let err = SendMessageRequest {
            message_type: Some("image".into()),
            file_path: Some("/uploads/a.png".into()),
            file_name: Some("  ".into()),
            ..Default::default()
        }
        .into_new_message(c, s)
        .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(ref m) if m.contains("file_name")));
    }

    #[test]
    fn file_alias_builds_document_with_empty_caption() {
        let (c, s) = ids();
        let msg = SendMessageRequest {
            message_type: Some("file".into()),
            file_path: Some("/uploads/cv.pdf".into()),
            file_name: Some("cv.pdf".into()),
            file_size: Some(2048),
            file_type: Some("application/pdf".into()),
            ..Default::default()
        }
        .into_new_message(c, s)
        .unwrap();

        assert_eq!(msg.message_type, MessageType::Document);
        assert_eq!(msg.content, "");
        let attachment = msg.attachment.unwrap();
        assert_eq!(attachment.file_name, "cv.pdf");
        assert_eq!(attachment.file_size, Some(2048));
    }

    #[test]
    fn unknown_type_is_invalid_argument() {
        let (c, s) = ids();
        let err = SendMessageRequest {
            message_type: Some("sticker".into()),
            content: "x".into(),
            ..Default::default()
        }
        .into_new_message(c, s)
        .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
