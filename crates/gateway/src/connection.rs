//! A single client session
//!
//! One `Connection` per WebSocket. The transport task owns the socket;
//! everything else in the gateway talks to the session through its event
//! sender and never touches the socket directly.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};

use parley_shared::{SessionId, UserId};

use crate::events::ServerEvent;
use crate::room::RoomId;

/// A live WebSocket session for one authenticated user
#[derive(Debug)]
pub struct Connection {
    pub session_id: SessionId,
    pub user_id: UserId,
    /// Events queued here are serialized and written by the session's
    /// send task
    pub sender: mpsc::UnboundedSender<ServerEvent>,
    joined_rooms: Arc<RwLock<HashSet<RoomId>>>,
}

impl Connection {
    pub fn new(user_id: UserId, sender: mpsc::UnboundedSender<ServerEvent>) -> Self {
        Self {
            session_id: SessionId::new(),
            user_id,
            sender,
            joined_rooms: Arc::new(RwLock::new(HashSet::new())),
        }
    }

    /// Queue an event for delivery to this session
    #[allow(clippy::result_large_err)] // SendError carries the undelivered event
    pub fn send(&self, event: ServerEvent) -> Result<(), mpsc::error::SendError<ServerEvent>> {
        self.sender.send(event)
    }

    pub async fn join_room(&self, room_id: RoomId) {
        self.joined_rooms.write().await.insert(room_id);
    }

    pub async fn leave_room(&self, room_id: RoomId) {
        self.joined_rooms.write().await.remove(&room_id);
    }

    pub async fn is_in_room(&self, room_id: RoomId) -> bool {
        self.joined_rooms.read().await.contains(&room_id)
    }

    /// Rooms this session has joined
    pub async fn rooms(&self) -> Vec<RoomId> {
        self.joined_rooms.read().await.iter().copied().collect()
    }
}
