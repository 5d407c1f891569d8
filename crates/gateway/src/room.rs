//! Room membership and fan-out
//!
//! Rooms are purely in-memory. Every session joins its personal user room
//! at registration and conversation rooms on demand; removing the last
//! member drops the room.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use parley_shared::{ConversationId, SessionId, UserId};

use crate::connection::Connection;
use crate::events::ServerEvent;

/// Broadcast scope: one room per user, one per conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoomId {
    User(UserId),
    Conversation(ConversationId),
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(id) => write!(f, "user:{id}"),
            Self::Conversation(id) => write!(f, "conversation:{id}"),
        }
    }
}

/// Tracks which sessions belong to which rooms
#[derive(Default)]
pub struct RoomManager {
    rooms: RwLock<HashMap<RoomId, Vec<Arc<Connection>>>>,
}

impl RoomManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a session to a room; re-joining is a no-op
    pub async fn join(&self, room_id: RoomId, connection: Arc<Connection>) {
        let mut rooms = self.rooms.write().await;
        let members = rooms.entry(room_id).or_default();
        if members
            .iter()
            .any(|member| member.session_id == connection.session_id)
        {
            return;
        }
        members.push(connection);
        debug!(room = %room_id, members = members.len(), "session joined room");
    }

    /// Remove a session from a room, dropping the room when it empties
    pub async fn leave(&self, room_id: RoomId, session_id: SessionId) {
        let mut rooms = self.rooms.write().await;
        if let Some(members) = rooms.get_mut(&room_id) {
            members.retain(|member| member.session_id != session_id);
            if members.is_empty() {
                rooms.remove(&room_id);
            }
        }
    }

    /// Send an event to every member of a room.
    ///
    /// Send failures are ignored here; a closed channel surfaces as a
    /// disconnect on the session's receive side.
    pub async fn broadcast(&self, room_id: RoomId, event: ServerEvent) {
        let rooms = self.rooms.read().await;
        if let Some(members) = rooms.get(&room_id) {
            for member in members {
                let _ = member.send(event.clone());
            }
        }
    }

    /// Sweep a departing session out of every room
    pub async fn remove_connection(&self, session_id: SessionId) {
        let mut rooms = self.rooms.write().await;
        rooms.retain(|_, members| {
            members.retain(|member| member.session_id != session_id);
            !members.is_empty()
        });
    }

    pub async fn room_size(&self, room_id: RoomId) -> usize {
        self.rooms.read().await.get(&room_id).map_or(0, Vec::len)
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn session(user_id: UserId) -> (Arc<Connection>, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Connection::new(user_id, tx)), rx)
    }

    fn ack() -> ServerEvent {
        ServerEvent::HeartbeatAck {
            timestamp: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_join_and_broadcast() {
        let rooms = RoomManager::new();
        let room = RoomId::Conversation(ConversationId::new());
        let (first, mut rx1) = session(UserId::new());
        let (second, mut rx2) = session(UserId::new());

        rooms.join(room, first).await;
        rooms.join(room, second).await;
        assert_eq!(rooms.room_size(room).await, 2);

        rooms.broadcast(room, ack()).await;
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_rejoin_is_noop() {
        let rooms = RoomManager::new();
        let room = RoomId::User(UserId::new());
        let (connection, _rx) = session(UserId::new());

        rooms.join(room, Arc::clone(&connection)).await;
        rooms.join(room, connection).await;
        assert_eq!(rooms.room_size(room).await, 1);
    }

    #[tokio::test]
    async fn test_leave_drops_empty_room() {
        let rooms = RoomManager::new();
        let room = RoomId::Conversation(ConversationId::new());
        let (connection, _rx) = session(UserId::new());
        let session_id = connection.session_id;

        rooms.join(room, connection).await;
        assert_eq!(rooms.room_count().await, 1);

        rooms.leave(room, session_id).await;
        assert_eq!(rooms.room_count().await, 0);
        assert_eq!(rooms.room_size(room).await, 0);
    }

    #[tokio::test]
    async fn test_remove_connection_sweeps_all_rooms() {
        let rooms = RoomManager::new();
        let user_id = UserId::new();
        let (connection, _rx) = session(user_id);
        let (other, mut other_rx) = session(UserId::new());
        let session_id = connection.session_id;

        let user_room = RoomId::User(user_id);
        let shared_room = RoomId::Conversation(ConversationId::new());
        rooms.join(user_room, Arc::clone(&connection)).await;
        rooms.join(shared_room, connection).await;
        rooms.join(shared_room, other).await;

        rooms.remove_connection(session_id).await;
        assert_eq!(rooms.room_size(user_room).await, 0);
        assert_eq!(rooms.room_size(shared_room).await, 1);

        rooms.broadcast(shared_room, ack()).await;
        assert!(other_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_broadcast_to_missing_room_is_noop() {
        let rooms = RoomManager::new();
        rooms
            .broadcast(RoomId::Conversation(ConversationId::new()), ack())
            .await;
        assert_eq!(rooms.room_count().await, 0);
    }
}
