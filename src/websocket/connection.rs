use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::types::WsMessage;

pub type WsSender = mpsc::UnboundedSender<WsMessage>;

/// Live sockets per user. A user may hold several connections (tabs, devices);
/// each is keyed by its own connection id.
#[derive(Clone, Default)]
pub struct ConnectionManager {
    connections: Arc<DashMap<Uuid, Vec<(Uuid, WsSender)>>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a socket and returns the id to remove it with.
    pub fn add_connection(&self, user_id: Uuid, sender: WsSender) -> Uuid {
        let connection_id = Uuid::new_v4();
        self.connections
            .entry(user_id)
            .or_default()
            .push((connection_id, sender));
        tracing::debug!(user = %user_id, connection = %connection_id, "socket registered");
        connection_id
    }

    pub fn remove_connection(&self, user_id: &Uuid, connection_id: Uuid) {
        let emptied = match self.connections.get_mut(user_id) {
            Some(mut senders) => {
                senders.retain(|(id, _)| *id != connection_id);
                senders.is_empty()
            }
            None => false,
        };

        if emptied {
            self.connections.remove_if(user_id, |_, senders| senders.is_empty());
        }
    }

    #[cfg(test)]
    pub fn is_online(&self, user_id: &Uuid) -> bool {
        self.connections
            .get(user_id)
            .map(|senders| !senders.is_empty())
            .unwrap_or(false)
    }

    /// Delivers to every live socket of the user, dropping sockets whose
    /// receiver has gone away. Returns the number of sockets reached.
    pub fn send_to_user(&self, user_id: &Uuid, message: WsMessage) -> usize {
        let Some(mut senders) = self.connections.get_mut(user_id) else {
            return 0;
        };

        senders.retain(|(_, sender)| sender.send(message.clone()).is_ok());
        senders.len()
    }

    pub fn send_to_users(&self, user_ids: &[Uuid], message: &WsMessage) -> usize {
        user_ids
            .iter()
            .map(|user_id| self.send_to_user(user_id, message.clone()))
            .sum()
    }
}
