use futures::StreamExt;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{connection::ConnectionManager, types::WsMessage};

pub const SUBJECT_PREFIX: &str = "chat.conversations";

/// What goes over NATS: the event plus who should receive it, so every
/// instance can deliver to the sockets it holds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayEnvelope {
    pub recipients: Vec<Uuid>,
    pub event: WsMessage,
}

pub fn conversation_subject(conversation_id: Uuid) -> String {
    format!("{}.{}", SUBJECT_PREFIX, conversation_id)
}

/// Post-commit event fan-out. Delivery is best effort: failures are logged
/// and never reach the caller.
#[derive(Clone)]
pub struct EventPublisher {
    connections: ConnectionManager,
    nats: Option<async_nats::Client>,
}

impl EventPublisher {
    pub fn new(connections: ConnectionManager, nats: Option<async_nats::Client>) -> Self {
        Self { connections, nats }
    }

    pub fn local(connections: ConnectionManager) -> Self {
        Self::new(connections, None)
    }

    pub fn publish(&self, recipients: Vec<Uuid>, event: WsMessage) {
        let Some(nats) = self.nats.clone() else {
            let reached = self.connections.send_to_users(&recipients, &event);
            tracing::debug!(recipients = recipients.len(), reached, "event delivered locally");
            return;
        };

        let subject = match event.conversation_id() {
            Some(conversation_id) => conversation_subject(conversation_id),
            None => format!("{}.system", SUBJECT_PREFIX),
        };
        let payload = match serde_json::to_vec(&RelayEnvelope { recipients, event }) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode relay envelope");
                return;
            }
        };

        tokio::spawn(async move {
            if let Err(e) = nats.publish(subject.clone(), payload.into()).await {
                tracing::warn!(subject = %subject, error = %e, "relay publish failed");
            }
        });
    }
}

/// Forwards relayed events to the sockets held by this instance. Runs until
/// the subscription ends.
pub async fn run_relay(
    nats: async_nats::Client,
    connections: ConnectionManager,
) -> anyhow::Result<()> {
    let mut subscriber = nats.subscribe(format!("{}.>", SUBJECT_PREFIX)).await?;
    tracing::info!(subject = %format!("{}.>", SUBJECT_PREFIX), "relay subscribed");

    while let Some(msg) = subscriber.next().await {
        match serde_json::from_slice::<RelayEnvelope>(&msg.payload) {
            Ok(envelope) => {
                connections.send_to_users(&envelope.recipients, &envelope.event);
            }
            Err(e) => tracing::warn!(subject = %msg.subject, error = %e, "dropping malformed relay frame"),
        }
    }

    tracing::warn!("relay subscription closed");
    Ok(())
}
