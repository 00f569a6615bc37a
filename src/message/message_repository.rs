use crate::{
    db::{push_id_list, store_now, Database, QueryCounter, Tx},
    error::{AppError, Result, StoreContext},
    message::message_models::{Message, NewMessage},
};
use sqlx::{QueryBuilder, Sqlite};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Clone)]
pub struct MessageRepository {
    queries: QueryCounter,
}

impl MessageRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            queries: db.queries().clone(),
        }
    }

    /// Appends a message and advances the conversation's `updated_at` to the
    /// message's creation time. Attachment columns are only written for
    /// non-text messages.
    pub async fn create(&self, tx: &mut Tx, message: &NewMessage) -> Result<Message> {
        let attachment = message
            .attachment
            .as_ref()
            .filter(|_| message.message_type.carries_attachment());

        self.queries.record("messages.create");
        let created = sqlx::query_as::<_, Message>(concat!(
            "INSERT INTO messages (
                id, conversation_id, sender_id, message_type, content,
                file_path, file_name, file_size, file_type, reply_to_id,
                created_at, updated_at
             )
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ",
            store_now!(),
            ", ",
            store_now!(),
            ")
             RETURNING *"
        ))
        .bind(Uuid::now_v7())
        .bind(message.conversation_id)
        .bind(message.sender_id)
        .bind(message.message_type)
        .bind(message.content.as_str())
        .bind(attachment.map(|a| a.file_path.as_str()))
        .bind(attachment.map(|a| a.file_name.as_str()))
        .bind(attachment.and_then(|a| a.file_size))
        .bind(attachment.and_then(|a| a.file_type.as_deref()))
        .bind(message.reply_to_id)
        .fetch_one(&mut **tx)
        .await
        .context("messages.create")?;

        self.queries.record("messages.touch_conversation");
        sqlx::query(
            "UPDATE conversations
             SET updated_at = (SELECT created_at FROM messages WHERE id = ?)
             WHERE id = ?",
        )
        .bind(created.id)
        .bind(created.conversation_id)
        .execute(&mut **tx)
        .await
        .context("messages.touch_conversation")?;

        Ok(created)
    }

    /// History page, newest first. Ties on `created_at` break on the time-ordered id.
    pub async fn find_by_conversation_id(
        &self,
        tx: &mut Tx,
        conversation_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Message>, i64)> {
        self.queries.record("messages.find_by_conversation_id");
        let messages = sqlx::query_as::<_, Message>(
            "SELECT * FROM messages
             WHERE conversation_id = ? AND deleted_at IS NULL
             ORDER BY created_at DESC, id DESC
             LIMIT ? OFFSET ?",
        )
        .bind(conversation_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&mut **tx)
        .await
        .context("messages.find_by_conversation_id")?;

        self.queries.record("messages.count_by_conversation_id");
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM messages WHERE conversation_id = ? AND deleted_at IS NULL",
        )
        .bind(conversation_id)
        .fetch_one(&mut **tx)
        .await
        .context("messages.count_by_conversation_id")?;

        Ok((messages, total))
    }

    pub async fn find_by_id(&self, tx: &mut Tx, message_id: Uuid) -> Result<Option<Message>> {
        self.queries.record("messages.find_by_id");
        let message = sqlx::query_as::<_, Message>(
            "SELECT * FROM messages WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(message_id)
        .fetch_optional(&mut **tx)
        .await
        .context("messages.find_by_id")?;

        Ok(message)
    }

    pub async fn find_many(&self, tx: &mut Tx, message_ids: &[Uuid]) -> Result<HashMap<Uuid, Message>> {
        if message_ids.is_empty() {
            return Ok(HashMap::new());
        }

        self.queries.record("messages.find_many");
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM messages WHERE deleted_at IS NULL AND id IN ");
        push_id_list(&mut qb, message_ids);

        let messages = qb
            .build_query_as::<Message>()
            .fetch_all(&mut **tx)
            .await
            .context("messages.find_many")?;

        Ok(messages.into_iter().map(|m| (m.id, m)).collect())
    }

    /// Most recent message of each conversation, ranked within the conversation.
    pub async fn find_latest_per_conversation(
        &self,
        tx: &mut Tx,
        conversation_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, Message>> {
        if conversation_ids.is_empty() {
            return Ok(HashMap::new());
        }

        self.queries.record("messages.find_latest_per_conversation");
        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT * FROM (
                 SELECT m.*,
                        ROW_NUMBER() OVER (
                            PARTITION BY m.conversation_id
                            ORDER BY m.created_at DESC, m.id DESC
                        ) AS rn
                 FROM messages m
                 WHERE m.deleted_at IS NULL AND m.conversation_id IN ",
        );
        push_id_list(&mut qb, conversation_ids);
        qb.push(") ranked WHERE ranked.rn = 1");

        let latest = qb
            .build_query_as::<Message>()
            .fetch_all(&mut **tx)
            .await
            .context("messages.find_latest_per_conversation")?;

        Ok(latest.into_iter().map(|m| (m.conversation_id, m)).collect())
    }

    /// Content-only edit.
    pub async fn update(&self, tx: &mut Tx, message_id: Uuid, content: &str) -> Result<Message> {
        self.queries.record("messages.update");
        let message = sqlx::query_as::<_, Message>(concat!(
            "UPDATE messages
             SET content = ?, updated_at = ",
            store_now!(),
            "
             WHERE id = ? AND deleted_at IS NULL
             RETURNING *"
        ))
        .bind(content)
        .bind(message_id)
        .fetch_optional(&mut **tx)
        .await
        .context("messages.update")?
        .ok_or_else(|| AppError::NotFound(format!("Message {} not found", message_id)))?;

        Ok(message)
    }

    /// Hard-deletes one message. Replies pointing at it lose their `reply_to_id`
    /// first; the number of detached replies is returned.
    pub async fn delete(&self, tx: &mut Tx, message_id: Uuid) -> Result<u64> {
        self.queries.record("messages.detach_replies");
        let detached = sqlx::query("UPDATE messages SET reply_to_id = NULL WHERE reply_to_id = ?")
            .bind(message_id)
            .execute(&mut **tx)
            .await
            .context("messages.detach_replies")?
            .rows_affected();

        self.queries.record("messages.delete");
        let result = sqlx::query("DELETE FROM messages WHERE id = ?")
            .bind(message_id)
            .execute(&mut **tx)
            .await
            .context("messages.delete")?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Message {} not found", message_id)));
        }

        Ok(detached)
    }

    pub async fn count_unread(&self, tx: &mut Tx, conversation_id: Uuid, user_id: Uuid) -> Result<i64> {
        self.queries.record("messages.count_unread");
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM messages
             WHERE conversation_id = ? AND sender_id != ? AND is_read = 0 AND deleted_at IS NULL",
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_one(&mut **tx)
        .await
        .context("messages.count_unread")?;

        Ok(count)
    }

    /// Unread counts for `user_id` across many conversations in one grouped query.
    /// Conversations with nothing unread are absent from the map.
    pub async fn count_unread_per_conversation(
        &self,
        tx: &mut Tx,
        conversation_ids: &[Uuid],
        user_id: Uuid,
    ) -> Result<HashMap<Uuid, i64>> {
        if conversation_ids.is_empty() {
            return Ok(HashMap::new());
        }

        self.queries.record("messages.count_unread_per_conversation");
        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT conversation_id, COUNT(*) FROM messages WHERE sender_id != ",
        );
        qb.push_bind(user_id);
        qb.push(" AND is_read = 0 AND deleted_at IS NULL AND conversation_id IN ");
        push_id_list(&mut qb, conversation_ids);
        qb.push(" GROUP BY conversation_id");

        let counts = qb
            .build_query_as::<(Uuid, i64)>()
            .fetch_all(&mut **tx)
            .await
            .context("messages.count_unread_per_conversation")?;

        Ok(counts.into_iter().collect())
    }

    /// Total unread messages for the user and how many conversations they span.
    pub async fn count_unread_for_user(&self, tx: &mut Tx, user_id: Uuid) -> Result<(i64, i64)> {
        self.queries.record("messages.count_unread_for_user");
        let counts: (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COUNT(DISTINCT m.conversation_id)
             FROM messages m
             JOIN conversation_participants p
               ON p.conversation_id = m.conversation_id AND p.user_id = ?
             WHERE m.sender_id != ? AND m.is_read = 0 AND m.deleted_at IS NULL",
        )
        .bind(user_id)
        .bind(user_id)
        .fetch_one(&mut **tx)
        .await
        .context("messages.count_unread_for_user")?;

        Ok(counts)
    }

    /// Flags every message from the other participants as read.
    pub async fn mark_all_read(&self, tx: &mut Tx, conversation_id: Uuid, user_id: Uuid) -> Result<u64> {
        self.queries.record("messages.mark_all_read");
        let result = sqlx::query(
            "UPDATE messages SET is_read = 1
             WHERE conversation_id = ? AND sender_id != ? AND is_read = 0",
        )
        .bind(conversation_id)
        .bind(user_id)
        .execute(&mut **tx)
        .await
        .context("messages.mark_all_read")?;

        Ok(result.rows_affected())
    }

    /// Flags one message as read unless `user_id` sent it.
    pub async fn mark_read(&self, tx: &mut Tx, message_id: Uuid, user_id: Uuid) -> Result<bool> {
        self.queries.record("messages.mark_read");
        let result = sqlx::query(
            "UPDATE messages SET is_read = 1
             WHERE id = ? AND sender_id != ? AND is_read = 0",
        )
        .bind(message_id)
        .bind(user_id)
        .execute(&mut **tx)
        .await
        .context("messages.mark_read")?;

        Ok(result.rows_affected() > 0)
    }
}
