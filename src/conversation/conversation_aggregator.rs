//! Inbox view assembly.
//!
//! A page of conversations is hydrated with a fixed number of grouped queries:
//! the page itself, all participants of the page, the latest message of each
//! conversation and the viewer's unread counts. The results are merged in
//! memory, so the cost of a page does not grow with its size.

use std::collections::HashMap;
use uuid::Uuid;

use crate::{
    db::Tx,
    error::{AppError, Result},
    message::{Message, MessageRepository, MessageResponse},
    read_state::has_unseen_activity,
};
use super::{
    conversation_models::{Conversation, ConversationView, Participant},
    conversation_repository::ConversationRepository,
};

#[derive(Clone)]
pub struct ConversationAggregator {
    conversations: ConversationRepository,
    messages: MessageRepository,
}

impl ConversationAggregator {
    pub fn new(conversations: ConversationRepository, messages: MessageRepository) -> Self {
        Self {
            conversations,
            messages,
        }
    }

    pub async fn list_for_user(
        &self,
        tx: &mut Tx,
        viewer_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<ConversationView>, i64)> {
        let (page, total) = self
            .conversations
            .find_by_user_id(tx, viewer_id, limit, offset)
            .await?;

        let views = self.hydrate(tx, viewer_id, page).await?;
        tracing::debug!(viewer = %viewer_id, returned = views.len(), total, "conversation page built");

        Ok((views, total))
    }

    pub async fn hydrate_one(
        &self,
        tx: &mut Tx,
        viewer_id: Uuid,
        conversation: Conversation,
    ) -> Result<ConversationView> {
        self.hydrate(tx, viewer_id, vec![conversation])
            .await?
            .pop()
            .ok_or(AppError::InternalError)
    }

    async fn hydrate(
        &self,
        tx: &mut Tx,
        viewer_id: Uuid,
        page: Vec<Conversation>,
    ) -> Result<Vec<ConversationView>> {
        if page.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = page.iter().map(|c| c.id).collect();
        let participants = self.conversations.find_participants(tx, &ids).await?;
        let latest = self.messages.find_latest_per_conversation(tx, &ids).await?;
        let unread = self
            .messages
            .count_unread_per_conversation(tx, &ids, viewer_id)
            .await?;

        Ok(merge(viewer_id, page, participants, latest, unread))
    }
}

/// Joins the batched lookups back onto the page, preserving page order.
fn merge(
    viewer_id: Uuid,
    page: Vec<Conversation>,
    mut participants: HashMap<Uuid, Vec<Participant>>,
    mut latest: HashMap<Uuid, Message>,
    unread: HashMap<Uuid, i64>,
) -> Vec<ConversationView> {
    page.into_iter()
        .map(|conversation| {
            let participants = participants.remove(&conversation.id).unwrap_or_default();
            let last_message = latest.remove(&conversation.id);
            let last_read_at = participants
                .iter()
                .find(|p| p.user_id == viewer_id)
                .and_then(|p| p.last_read_at);
            let has_unseen = has_unseen_activity(
                viewer_id,
                last_message.as_ref().map(|m| (m.sender_id, m.created_at)),
                last_read_at,
            );

            ConversationView {
                id: conversation.id,
                participants,
                last_message: last_message.map(MessageResponse::from),
                unread_count: unread.get(&conversation.id).copied().unwrap_or(0),
                has_unseen_activity: has_unseen,
                created_at: conversation.created_at,
                updated_at: conversation.updated_at,
            }
        })
        .collect()
}
