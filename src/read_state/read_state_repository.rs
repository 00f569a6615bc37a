use crate::{
    db::{format_timestamp, store_now, Database, QueryCounter, Tx},
    error::{Result, StoreContext},
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Per-participant "read up to here" marker.
#[derive(Clone)]
pub struct ReadStateRepository {
    queries: QueryCounter,
}

impl ReadStateRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            queries: db.queries().clone(),
        }
    }

    /// Sets `last_read_at`; `None` stamps it with the store clock. Returns false
    /// when the user is not a participant of the conversation.
    pub async fn set_last_read_at(
        &self,
        tx: &mut Tx,
        conversation_id: Uuid,
        user_id: Uuid,
        at: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        self.queries.record("read_state.set_last_read_at");
        let result = sqlx::query(concat!(
            "UPDATE conversation_participants
             SET last_read_at = COALESCE(?, ",
            store_now!(),
            ")
             WHERE conversation_id = ? AND user_id = ?"
        ))
        .bind(at.map(format_timestamp))
        .bind(conversation_id)
        .bind(user_id)
        .execute(&mut **tx)
        .await
        .context("read_state.set_last_read_at")?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn last_read_at(
        &self,
        tx: &mut Tx,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<DateTime<Utc>>> {
        self.queries.record("read_state.last_read_at");
        let last_read_at: Option<Option<DateTime<Utc>>> = sqlx::query_scalar(
            "SELECT last_read_at FROM conversation_participants
             WHERE conversation_id = ? AND user_id = ?",
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_optional(&mut **tx)
        .await
        .context("read_state.last_read_at")?;

        Ok(last_read_at.flatten())
    }
}

/// True when someone other than the viewer posted after the viewer's read marker.
pub fn has_unseen_activity(
    viewer_id: Uuid,
    last_message: Option<(Uuid, DateTime<Utc>)>,
    last_read_at: Option<DateTime<Utc>>,
) -> bool {
    match (last_message, last_read_at) {
        (None, _) => false,
        (Some((sender_id, _)), _) if sender_id == viewer_id => false,
        (Some(_), None) => true,
        (Some((_, sent_at)), Some(read_at)) => sent_at > read_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn empty_conversation_has_nothing_unseen() {
        assert!(!has_unseen_activity(Uuid::new_v4(), None, None));
    }

    #[test]
    fn own_message_is_never_unseen() {
        let me = Uuid::new_v4();
        assert!(!has_unseen_activity(me, Some((me, Utc::now())), None));
    }

    #[test]
    fn other_message_after_marker_is_unseen() {
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();
        let read_at = Utc::now();
        assert!(has_unseen_activity(me, Some((other, read_at)), None));
        assert!(has_unseen_activity(
            me,
            Some((other, read_at + Duration::seconds(1))),
            Some(read_at)
        ));
        assert!(!has_unseen_activity(
            me,
            Some((other, read_at - Duration::seconds(1))),
            Some(read_at)
        ));
    }
}
