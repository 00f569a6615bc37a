use std::{collections::HashSet, future::Future, iter, time::Duration};
use uuid::Uuid;

use crate::{
    conversation::{
        normalize_participants, Conversation, ConversationAggregator, ConversationRepository,
        ConversationView, ReadReceipt, UnreadSummary,
    },
    db::{Database, Tx},
    error::{AppError, Result, StoreContext},
    read_state::ReadStateRepository,
    response::Page,
    user::UserRepository,
    websocket::{
        types::{ConversationReadPayload, MessageEventPayload, WsMessage},
        EventPublisher,
    },
};
use super::{
    message_dto::SendMessageRequest,
    message_models::{Message, MessageResponse, MessageType, ReplyPreview},
    message_repository::MessageRepository,
};

/// Attempts for operations that can lose a race on the participant-set key.
const MAX_ATTEMPTS: u32 = 3;
const RETRY_BACKOFF: Duration = Duration::from_millis(25);

/// Orchestrates chat operations. Each public call runs in one transaction under
/// the request deadline, translates store failures into the public error kinds
/// and publishes its event only after commit.
#[derive(Clone)]
pub struct MessageService {
    db: Database,
    conversations: ConversationRepository,
    messages: MessageRepository,
    read_state: ReadStateRepository,
    users: UserRepository,
    aggregator: ConversationAggregator,
    events: EventPublisher,
    request_timeout: Duration,
}

impl MessageService {
    pub fn new(db: Database, events: EventPublisher, request_timeout: Duration) -> Self {
        let conversations = ConversationRepository::new(&db);
        let messages = MessageRepository::new(&db);
        Self {
            read_state: ReadStateRepository::new(&db),
            users: UserRepository::new(&db),
            aggregator: ConversationAggregator::new(conversations.clone(), messages.clone()),
            conversations,
            messages,
            events,
            request_timeout,
            db,
        }
    }

    async fn bounded<T, F>(&self, operation: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.request_timeout, fut).await {
            Ok(result) => result.map_err(|e| e.at_boundary(operation)),
            Err(_) => {
                tracing::warn!(
                    operation,
                    timeout_ms = self.request_timeout.as_millis() as u64,
                    "deadline exceeded, transaction abandoned"
                );
                Err(AppError::Unavailable(format!("{} timed out", operation)))
            }
        }
    }

    /// Returns the conversation whose participants are exactly the requester plus
    /// `participant_ids`, creating it on first contact. The flag is true when
    /// this call created it.
    pub async fn get_or_create_conversation(
        &self,
        requester_id: Uuid,
        participant_ids: Vec<Uuid>,
    ) -> Result<(ConversationView, bool)> {
        const OPERATION: &str = "get_or_create_conversation";

        let ids = normalize_participants(participant_ids.into_iter().chain(iter::once(requester_id)));
        if ids.len() < 2 {
            return Err(AppError::BadRequest(
                "A conversation needs at least one other participant".to_string(),
            ));
        }

        self.bounded(OPERATION, async {
            let mut attempt = 1;
            loop {
                match self
                    .find_or_create(requester_id, &ids)
                    .await
                    .map_err(|e| e.at_boundary(OPERATION))
                {
                    Err(e) if e.is_retryable() && attempt < MAX_ATTEMPTS => {
                        tracing::warn!(attempt, error = %e, "retrying conversation lookup");
                        tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                        attempt += 1;
                    }
                    outcome => return outcome,
                }
            }
        })
        .await
    }

    async fn find_or_create(&self, requester_id: Uuid, ids: &[Uuid]) -> Result<(ConversationView, bool)> {
        let mut tx = self.db.begin().await?;

        let known = self.users.find_many(&mut tx, ids).await?;
        if let Some(missing) = ids.iter().find(|id| !known.contains_key(id)) {
            return Err(AppError::NotFound(format!("User {} not found", missing)));
        }

        let (conversation, created) = match self
            .conversations
            .find_by_exact_participants(&mut tx, ids)
            .await?
        {
            Some(existing) => (existing, false),
            None => (self.conversations.create(&mut tx, ids).await?, true),
        };

        let view = self.aggregator.hydrate_one(&mut tx, requester_id, conversation).await?;
        tx.commit().await.context("commit")?;

        if created {
            tracing::info!(conversation_id = %view.id, participants = ids.len(), "conversation started");
        }
        Ok((view, created))
    }

    pub async fn get_conversation(&self, conversation_id: Uuid, requester_id: Uuid) -> Result<ConversationView> {
        self.bounded("get_conversation", async {
            let mut tx = self.db.begin().await?;
            let conversation = self.require_conversation(&mut tx, conversation_id).await?;
            self.require_participant(&mut tx, conversation_id, requester_id).await?;

            let view = self.aggregator.hydrate_one(&mut tx, requester_id, conversation).await?;
            tx.commit().await.context("commit")?;
            Ok(view)
        })
        .await
    }

    pub async fn list_conversations(&self, user_id: Uuid, page: Page) -> Result<(Vec<ConversationView>, i64)> {
        self.bounded("list_conversations", async {
            let mut tx = self.db.begin().await?;
            let listed = self
                .aggregator
                .list_for_user(&mut tx, user_id, page.limit(), page.offset())
                .await?;
            tx.commit().await.context("commit")?;
            Ok(listed)
        })
        .await
    }

    pub async fn send_message(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        payload: SendMessageRequest,
    ) -> Result<MessageResponse> {
        let (response, recipients) = self
            .bounded("send_message", async {
                let mut tx = self.db.begin().await?;
                self.require_conversation(&mut tx, conversation_id).await?;
                let recipients = self.conversations.participant_ids(&mut tx, conversation_id).await?;
                if !recipients.contains(&sender_id) {
                    return Err(AppError::Forbidden(
                        "Only participants can post to this conversation".to_string(),
                    ));
                }

                let new_message = payload.into_new_message(conversation_id, sender_id)?;
                let reply_to = match new_message.reply_to_id {
                    Some(reply_to_id) => Some(self.reply_target(&mut tx, conversation_id, reply_to_id).await?),
                    None => None,
                };

                let message = self.messages.create(&mut tx, &new_message).await?;
                let sender = self.users.find_by_id(&mut tx, sender_id).await?;
                tx.commit().await.context("commit")?;

                let response = MessageResponse::from(message)
                    .with_sender(sender)
                    .with_reply(reply_to);
                Ok((response, recipients))
            })
            .await?;

        tracing::debug!(
            conversation_id = %conversation_id,
            message_id = %response.id,
            message_type = %response.message_type,
            "message sent"
        );
        self.events.publish(
            recipients,
            WsMessage::MessageCreated(MessageEventPayload {
                conversation_id,
                message_id: response.id,
                sender_id,
            }),
        );

        Ok(response)
    }

    async fn reply_target(&self, tx: &mut Tx, conversation_id: Uuid, reply_to_id: Uuid) -> Result<ReplyPreview> {
        let target = self
            .messages
            .find_by_id(tx, reply_to_id)
            .await?
            .ok_or_else(|| AppError::BadRequest(format!("Reply target {} does not exist", reply_to_id)))?;

        if target.conversation_id != conversation_id {
            return Err(AppError::BadRequest(
                "Reply target belongs to a different conversation".to_string(),
            ));
        }

        Ok(ReplyPreview::from(&target))
    }

    pub async fn list_messages(
        &self,
        conversation_id: Uuid,
        requester_id: Uuid,
        page: Page,
    ) -> Result<(Vec<MessageResponse>, i64)> {
        self.bounded("list_messages", async {
            let mut tx = self.db.begin().await?;
            self.require_conversation(&mut tx, conversation_id).await?;
            self.require_participant(&mut tx, conversation_id, requester_id).await?;

            let (messages, total) = self
                .messages
                .find_by_conversation_id(&mut tx, conversation_id, page.limit(), page.offset())
                .await?;

            let sender_ids: Vec<Uuid> = distinct(messages.iter().map(|m| m.sender_id));
            let reply_ids: Vec<Uuid> = distinct(messages.iter().filter_map(|m| m.reply_to_id));
            let senders = self.users.find_many(&mut tx, &sender_ids).await?;
            let replies = self.messages.find_many(&mut tx, &reply_ids).await?;
            tx.commit().await.context("commit")?;

            let items = messages
                .into_iter()
                .map(|message| {
                    let sender = senders.get(&message.sender_id).cloned();
                    let reply = message
                        .reply_to_id
                        .and_then(|id| replies.get(&id))
                        .map(ReplyPreview::from);
                    MessageResponse::from(message).with_sender(sender).with_reply(reply)
                })
                .collect();

            Ok((items, total))
        })
        .await
    }

    pub async fn edit_message(&self, message_id: Uuid, requester_id: Uuid, content: String) -> Result<MessageResponse> {
        let (response, recipients) = self
            .bounded("edit_message", async {
                let mut tx = self.db.begin().await?;
                let existing = self.require_own_message(&mut tx, message_id, requester_id).await?;
                if existing.message_type == MessageType::Text && content.trim().is_empty() {
                    return Err(AppError::BadRequest(
                        "Text messages require non-empty content".to_string(),
                    ));
                }

                let updated = self.messages.update(&mut tx, message_id, &content).await?;
                let recipients = self
                    .conversations
                    .participant_ids(&mut tx, updated.conversation_id)
                    .await?;
                let sender = self.users.find_by_id(&mut tx, requester_id).await?;
                tx.commit().await.context("commit")?;

                Ok((MessageResponse::from(updated).with_sender(sender), recipients))
            })
            .await?;

        self.events.publish(
            recipients,
            WsMessage::MessageUpdated(MessageEventPayload {
                conversation_id: response.conversation_id,
                message_id,
                sender_id: requester_id,
            }),
        );

        Ok(response)
    }

    pub async fn delete_message(&self, message_id: Uuid, requester_id: Uuid) -> Result<()> {
        let (conversation_id, recipients) = self
            .bounded("delete_message", async {
                let mut tx = self.db.begin().await?;
                let existing = self.require_own_message(&mut tx, message_id, requester_id).await?;
                let recipients = self
                    .conversations
                    .participant_ids(&mut tx, existing.conversation_id)
                    .await?;

                let detached = self.messages.delete(&mut tx, message_id).await?;
                tx.commit().await.context("commit")?;

                tracing::debug!(message_id = %message_id, detached, "message deleted");
                Ok((existing.conversation_id, recipients))
            })
            .await?;

        self.events.publish(
            recipients,
            WsMessage::MessageDeleted(MessageEventPayload {
                conversation_id,
                message_id,
                sender_id: requester_id,
            }),
        );

        Ok(())
    }

    /// Marks everything the other participants sent as read and moves the
    /// user's read marker to the store clock. Repeating it is harmless.
    pub async fn mark_conversation_read(&self, conversation_id: Uuid, user_id: Uuid) -> Result<ReadReceipt> {
        let (receipt, recipients) = self
            .bounded("mark_conversation_read", async {
                let mut tx = self.db.begin().await?;
                self.require_conversation(&mut tx, conversation_id).await?;
                let recipients = self.conversations.participant_ids(&mut tx, conversation_id).await?;
                if !recipients.contains(&user_id) {
                    return Err(AppError::Forbidden(
                        "You are not a participant of this conversation".to_string(),
                    ));
                }

                let messages_marked = self.messages.mark_all_read(&mut tx, conversation_id, user_id).await?;
                self.conversations
                    .update_participant_read_state(&mut tx, conversation_id, user_id, None)
                    .await?;
                let last_read_at = self.read_state.last_read_at(&mut tx, conversation_id, user_id).await?;
                tx.commit().await.context("commit")?;

                let receipt = ReadReceipt {
                    conversation_id,
                    user_id,
                    messages_marked,
                    last_read_at,
                };
                Ok((receipt, recipients))
            })
            .await?;

        self.events.publish(
            recipients,
            WsMessage::ConversationRead(ConversationReadPayload {
                conversation_id,
                user_id,
            }),
        );

        Ok(receipt)
    }

    /// Flags one message as read. Returns false when it already was.
    pub async fn mark_message_read(&self, message_id: Uuid, user_id: Uuid) -> Result<bool> {
        self.bounded("mark_message_read", async {
            let mut tx = self.db.begin().await?;
            let message = self
                .messages
                .find_by_id(&mut tx, message_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Message {} not found", message_id)))?;
            self.require_participant(&mut tx, message.conversation_id, user_id).await?;
            if message.sender_id == user_id {
                return Err(AppError::BadRequest(
                    "Senders cannot mark their own messages as read".to_string(),
                ));
            }

            let changed = self.messages.mark_read(&mut tx, message_id, user_id).await?;
            tx.commit().await.context("commit")?;
            Ok(changed)
        })
        .await
    }

    pub async fn unread_summary(&self, user_id: Uuid) -> Result<UnreadSummary> {
        self.bounded("unread_summary", async {
            let mut tx = self.db.begin().await?;
            let (unread_messages, unread_conversations) =
                self.messages.count_unread_for_user(&mut tx, user_id).await?;
            tx.commit().await.context("commit")?;

            Ok(UnreadSummary {
                unread_messages,
                unread_conversations,
            })
        })
        .await
    }

    async fn require_conversation(&self, tx: &mut Tx, conversation_id: Uuid) -> Result<Conversation> {
        self.conversations
            .find_by_id(tx, conversation_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Conversation {} not found", conversation_id)))
    }

    async fn require_participant(&self, tx: &mut Tx, conversation_id: Uuid, user_id: Uuid) -> Result<()> {
        if self.conversations.is_participant(tx, conversation_id, user_id).await? {
            Ok(())
        } else {
            Err(AppError::Forbidden(
                "You are not a participant of this conversation".to_string(),
            ))
        }
    }

    async fn require_own_message(&self, tx: &mut Tx, message_id: Uuid, requester_id: Uuid) -> Result<Message> {
        let message = self
            .messages
            .find_by_id(tx, message_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Message {} not found", message_id)))?;

        if message.sender_id != requester_id {
            return Err(AppError::Forbidden(
                "Only the sender can change this message".to_string(),
            ));
        }

        Ok(message)
    }
}

fn distinct(ids: impl Iterator<Item = Uuid>) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    ids.filter(|id| seen.insert(*id)).collect()
}
