use crate::{
    db::{push_id_list, store_now, Database, QueryCounter, Tx},
    error::{Result, StoreContext},
    read_state::ReadStateRepository,
};
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite};
use std::collections::HashMap;
use uuid::Uuid;
use super::conversation_models::{participant_key, Conversation, ConversationPageRow, Participant};

#[derive(Clone)]
pub struct ConversationRepository {
    queries: QueryCounter,
    read_state: ReadStateRepository,
}

impl ConversationRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            queries: db.queries().clone(),
            read_state: ReadStateRepository::new(db),
        }
    }

    /// Inserts the conversation and one participant row per id. `participant_ids`
    /// must already be normalised. A concurrent insert of the same set fails on
    /// the unique `participant_key`.
    pub async fn create(&self, tx: &mut Tx, participant_ids: &[Uuid]) -> Result<Conversation> {
        self.queries.record("conversations.create");
        let conversation = sqlx::query_as::<_, Conversation>(concat!(
            "INSERT INTO conversations (id, participant_key, created_at, updated_at)
             VALUES (?, ?, ",
            store_now!(),
            ", ",
            store_now!(),
            ")
             RETURNING id, participant_key, created_at, updated_at"
        ))
        .bind(Uuid::now_v7())
        .bind(participant_key(participant_ids))
        .fetch_one(&mut **tx)
        .await
        .context("conversations.create")?;

        self.queries.record("conversations.add_participants");
        let mut qb = QueryBuilder::<Sqlite>::new(
            "INSERT INTO conversation_participants (conversation_id, user_id) ",
        );
        qb.push_values(participant_ids, |mut row, user_id| {
            row.push_bind(conversation.id).push_bind(*user_id);
        });
        qb.build()
            .execute(&mut **tx)
            .await
            .context("conversations.add_participants")?;

        tracing::debug!(
            conversation_id = %conversation.id,
            participants = participant_ids.len(),
            "conversation created"
        );

        Ok(conversation)
    }

    /// Finds the conversation whose participant set is exactly `participant_ids`
    /// (normalised). Conversations holding these users plus anyone else, or only
    /// some of them, never match.
    pub async fn find_by_exact_participants(
        &self,
        tx: &mut Tx,
        participant_ids: &[Uuid],
    ) -> Result<Option<Conversation>> {
        let Some(first) = participant_ids.first() else {
            return Ok(None);
        };
        let wanted = participant_ids.len() as i64;

        self.queries.record("conversations.find_by_exact_participants");
        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT c.id, c.participant_key, c.created_at, c.updated_at
             FROM conversations c
             JOIN (
                 SELECT conversation_id
                 FROM conversation_participants
                 WHERE conversation_id IN (
                     SELECT conversation_id FROM conversation_participants WHERE user_id = ",
        );
        qb.push_bind(*first);
        qb.push(
            ")
                 GROUP BY conversation_id
                 HAVING COUNT(*) = ",
        );
        qb.push_bind(wanted);
        qb.push(" AND SUM(CASE WHEN user_id IN ");
        push_id_list(&mut qb, participant_ids);
        qb.push(" THEN 1 ELSE 0 END) = ");
        qb.push_bind(wanted);
        qb.push(
            "
             ) matched ON matched.conversation_id = c.id
             ORDER BY c.created_at ASC, c.id ASC
             LIMIT 2",
        );

        let mut matches = qb
            .build_query_as::<Conversation>()
            .fetch_all(&mut **tx)
            .await
            .context("conversations.find_by_exact_participants")?;

        if matches.len() > 1 {
            tracing::warn!(
                first = %matches[0].id,
                second = %matches[1].id,
                "more than one conversation for the same participant set"
            );
        }

        Ok(if matches.is_empty() {
            None
        } else {
            Some(matches.swap_remove(0))
        })
    }

    pub async fn find_by_id(&self, tx: &mut Tx, conversation_id: Uuid) -> Result<Option<Conversation>> {
        self.queries.record("conversations.find_by_id");
        let conversation = sqlx::query_as::<_, Conversation>(
            "SELECT id, participant_key, created_at, updated_at FROM conversations WHERE id = ?",
        )
        .bind(conversation_id)
        .fetch_optional(&mut **tx)
        .await
        .context("conversations.find_by_id")?;

        Ok(conversation)
    }

    /// One page of the user's conversations, most recently active first, plus the
    /// total number of conversations the user is in.
    pub async fn find_by_user_id(
        &self,
        tx: &mut Tx,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Conversation>, i64)> {
        self.queries.record("conversations.find_by_user_id");
        let rows = sqlx::query_as::<_, ConversationPageRow>(
            "SELECT c.id, c.participant_key, c.created_at, c.updated_at,
                    COUNT(*) OVER () AS total_count
             FROM conversations c
             JOIN conversation_participants p ON p.conversation_id = c.id
             WHERE p.user_id = ?
             ORDER BY c.updated_at DESC, c.id DESC
             LIMIT ? OFFSET ?",
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&mut **tx)
        .await
        .context("conversations.find_by_user_id")?;

        // The window total is unavailable once the offset runs past the end.
        let total = match rows.first() {
            Some(row) => row.total_count,
            None if offset > 0 => self.count_for_user(tx, user_id).await?,
            None => 0,
        };

        Ok((rows.into_iter().map(Conversation::from).collect(), total))
    }

    pub async fn count_for_user(&self, tx: &mut Tx, user_id: Uuid) -> Result<i64> {
        self.queries.record("conversations.count_for_user");
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM conversation_participants WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_one(&mut **tx)
        .await
        .context("conversations.count_for_user")?;

        Ok(count)
    }

    /// Participants with display fields for every conversation in `conversation_ids`,
    /// grouped by conversation, in one round trip.
    pub async fn find_participants(
        &self,
        tx: &mut Tx,
        conversation_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, Vec<Participant>>> {
        if conversation_ids.is_empty() {
            return Ok(HashMap::new());
        }

        self.queries.record("conversations.find_participants");
        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT p.conversation_id, p.user_id, u.name, u.username, u.email, u.photo_url,
                    p.last_read_at
             FROM conversation_participants p
             JOIN users u ON u.id = p.user_id
             WHERE p.conversation_id IN ",
        );
        push_id_list(&mut qb, conversation_ids);
        qb.push(" ORDER BY p.conversation_id, p.joined_at ASC, u.username ASC");

        let rows = qb
            .build_query_as::<Participant>()
            .fetch_all(&mut **tx)
            .await
            .context("conversations.find_participants")?;

        let mut grouped: HashMap<Uuid, Vec<Participant>> = HashMap::new();
        for participant in rows {
            grouped
                .entry(participant.conversation_id)
                .or_default()
                .push(participant);
        }

        Ok(grouped)
    }

    pub async fn participant_ids(&self, tx: &mut Tx, conversation_id: Uuid) -> Result<Vec<Uuid>> {
        self.queries.record("conversations.participant_ids");
        let ids: Vec<Uuid> = sqlx::query_scalar(
            "SELECT user_id FROM conversation_participants WHERE conversation_id = ?",
        )
        .bind(conversation_id)
        .fetch_all(&mut **tx)
        .await
        .context("conversations.participant_ids")?;

        Ok(ids)
    }

    pub async fn is_participant(&self, tx: &mut Tx, conversation_id: Uuid, user_id: Uuid) -> Result<bool> {
        self.queries.record("conversations.is_participant");
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM conversation_participants
             WHERE conversation_id = ? AND user_id = ?",
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_one(&mut **tx)
        .await
        .context("conversations.is_participant")?;

        Ok(count > 0)
    }

    pub async fn update_participant_read_state(
        &self,
        tx: &mut Tx,
        conversation_id: Uuid,
        user_id: Uuid,
        at: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        self.read_state
            .set_last_read_at(tx, conversation_id, user_id, at)
            .await
    }
}
