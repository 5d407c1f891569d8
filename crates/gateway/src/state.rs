//! Connection registry shared across the gateway

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;

use parley_shared::{SessionId, UserId};

use crate::connection::Connection;
use crate::events::ServerEvent;
use crate::room::RoomManager;

/// Registry of live sessions plus the room index.
///
/// Cheap to clone; the transport and background tasks share one instance.
#[derive(Clone)]
pub struct GatewayState {
    connections: Arc<RwLock<HashMap<SessionId, Arc<Connection>>>>,
    pub rooms: Arc<RoomManager>,
}

/// Point-in-time gauge of gateway load
#[derive(Debug, Serialize)]
pub struct GatewayStats {
    pub active_connections: usize,
    pub active_rooms: usize,
}

impl GatewayState {
    pub fn new() -> Self {
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
            rooms: Arc::new(RoomManager::new()),
        }
    }

    /// Register a session and hand back the shared handle
    pub async fn add_connection(&self, connection: Connection) -> Arc<Connection> {
        let connection = Arc::new(connection);
        self.connections
            .write()
            .await
            .insert(connection.session_id, Arc::clone(&connection));
        connection
    }

    /// Drop a session from the registry and every room it joined
    pub async fn remove_connection(&self, session_id: SessionId) -> Option<Arc<Connection>> {
        let removed = self.connections.write().await.remove(&session_id);
        self.rooms.remove_connection(session_id).await;
        removed
    }

    pub async fn get_connection(&self, session_id: SessionId) -> Option<Arc<Connection>> {
        self.connections.read().await.get(&session_id).cloned()
    }

    /// Every live session belonging to a user
    pub async fn get_user_connections(&self, user_id: UserId) -> Vec<Arc<Connection>> {
        self.connections
            .read()
            .await
            .values()
            .filter(|connection| connection.user_id == user_id)
            .cloned()
            .collect()
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Send an event to every connected session
    pub async fn broadcast_all(&self, event: ServerEvent) {
        let connections = self.connections.read().await;
        for connection in connections.values() {
            let _ = connection.send(event.clone());
        }
    }

    pub async fn stats(&self) -> GatewayStats {
        GatewayStats {
            active_connections: self.connection_count().await,
            active_rooms: self.rooms.room_count().await,
        }
    }
}

impl Default for GatewayState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::room::RoomId;
    use parley_shared::ConversationId;
    use tokio::sync::mpsc;

    fn connection(user_id: UserId) -> (Connection, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Connection::new(user_id, tx), rx)
    }

    #[tokio::test]
    async fn test_add_get_remove() {
        let state = GatewayState::new();
        let (connection, _rx) = connection(UserId::new());

        let handle = state.add_connection(connection).await;
        let session_id = handle.session_id;
        assert_eq!(state.connection_count().await, 1);
        assert!(state.get_connection(session_id).await.is_some());

        let removed = state.remove_connection(session_id).await;
        assert_eq!(removed.unwrap().session_id, session_id);
        assert_eq!(state.connection_count().await, 0);
        assert!(state.get_connection(session_id).await.is_none());
    }

    #[tokio::test]
    async fn test_user_index_spans_sessions() {
        let state = GatewayState::new();
        let user_id = UserId::new();
        let (first, _rx1) = connection(user_id);
        let (second, _rx2) = connection(user_id);
        let (other, _rx3) = connection(UserId::new());

        state.add_connection(first).await;
        state.add_connection(second).await;
        state.add_connection(other).await;

        assert_eq!(state.get_user_connections(user_id).await.len(), 2);
        assert_eq!(state.connection_count().await, 3);
    }

    #[tokio::test]
    async fn test_remove_connection_clears_rooms() {
        let state = GatewayState::new();
        let (connection, _rx) = connection(UserId::new());
        let handle = state.add_connection(connection).await;

        let room = RoomId::Conversation(ConversationId::new());
        state.rooms.join(room, Arc::clone(&handle)).await;
        assert_eq!(state.rooms.room_count().await, 1);

        state.remove_connection(handle.session_id).await;
        assert_eq!(state.rooms.room_count().await, 0);
    }

    #[tokio::test]
    async fn test_broadcast_all_reaches_every_session() {
        let state = GatewayState::new();
        let (first, mut rx1) = connection(UserId::new());
        let (second, mut rx2) = connection(UserId::new());
        state.add_connection(first).await;
        state.add_connection(second).await;

        state
            .broadcast_all(ServerEvent::HeartbeatAck {
                timestamp: chrono::Utc::now(),
            })
            .await;
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_stats() {
        let state = GatewayState::new();
        let (connection, _rx) = connection(UserId::new());
        let handle = state.add_connection(connection).await;
        state
            .rooms
            .join(RoomId::User(handle.user_id), handle)
            .await;

        let stats = state.stats().await;
        assert_eq!(stats.active_connections, 1);
        assert_eq!(stats.active_rooms, 1);
    }
}
