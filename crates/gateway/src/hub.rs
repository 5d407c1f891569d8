//! Session lifecycle and event dispatch
//!
//! The hub glues the transport to the coordination trackers: it
//! authenticates new sockets, fans events out through rooms, flushes the
//! offline queue on reconnect, and rebroadcasts presence transitions the
//! background sweeper produces.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use parley_realtime::collaborators::{
    AuthProvider, AuthenticatedUser, ConversationStore, MessageStore, ProfileDirectory,
};
use parley_realtime::{
    OfflineMessageQueue, PresenceListener, PresenceTracker, PresenceTransition, QueuedMessage,
    ReadReceiptTracker, RealtimeError, TypingTracker,
};
use parley_shared::{ConversationId, MessageId, PresenceStatus, UserId};

use crate::connection::Connection;
use crate::events::{ClientEvent, PresenceEntry, ServerEvent};
use crate::room::RoomId;
use crate::state::GatewayState;

/// Queued messages delivered per drain pass when a session registers
const OFFLINE_DELIVERY_BATCH: usize = 100;

/// Central coordinator between WebSocket sessions and the trackers
pub struct ConnectionHub {
    state: GatewayState,
    presence: Arc<PresenceTracker>,
    typing: Arc<TypingTracker>,
    receipts: Arc<ReadReceiptTracker>,
    queue: Arc<OfflineMessageQueue>,
    auth: Arc<dyn AuthProvider>,
    profiles: Arc<dyn ProfileDirectory>,
    messages: Arc<dyn MessageStore>,
    conversations: Arc<dyn ConversationStore>,
}

impl ConnectionHub {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        presence: Arc<PresenceTracker>,
        typing: Arc<TypingTracker>,
        receipts: Arc<ReadReceiptTracker>,
        queue: Arc<OfflineMessageQueue>,
        auth: Arc<dyn AuthProvider>,
        profiles: Arc<dyn ProfileDirectory>,
        messages: Arc<dyn MessageStore>,
        conversations: Arc<dyn ConversationStore>,
    ) -> Self {
        Self {
            state: GatewayState::new(),
            presence,
            typing,
            receipts,
            queue,
            auth,
            profiles,
            messages,
            conversations,
        }
    }

    pub fn state(&self) -> &GatewayState {
        &self.state
    }

    // ========================================================================
    // Session lifecycle
    // ========================================================================

    /// Resolve a bearer credential to an identity
    pub async fn authenticate(&self, credential: &str) -> Result<AuthenticatedUser, RealtimeError> {
        self.auth
            .authenticate(credential)
            .await?
            .ok_or_else(|| RealtimeError::Auth("invalid or expired credential".to_string()))
    }

    /// Authenticate a credential and register the session in one step
    pub async fn connect(
        &self,
        credential: &str,
        sender: mpsc::UnboundedSender<ServerEvent>,
    ) -> Result<Arc<Connection>, RealtimeError> {
        let user = self.authenticate(credential).await?;
        Ok(self.register(user.user_id, sender).await)
    }

    /// Register an authenticated session: join the personal room, mark the
    /// user online, acknowledge the connection, then flush queued messages
    pub async fn register(
        &self,
        user_id: UserId,
        sender: mpsc::UnboundedSender<ServerEvent>,
    ) -> Arc<Connection> {
        let connection = self
            .state
            .add_connection(Connection::new(user_id, sender))
            .await;

        let user_room = RoomId::User(user_id);
        connection.join_room(user_room).await;
        self.state
            .rooms
            .join(user_room, Arc::clone(&connection))
            .await;

        self.presence.set_online(user_id).await;

        let _ = connection.send(ServerEvent::Connected {
            user_id,
            timestamp: Utc::now(),
        });
        self.state
            .broadcast_all(ServerEvent::presence_single(user_id, PresenceStatus::Online))
            .await;

        self.flush_offline_queue(&connection).await;

        info!(
            user_id = %user_id,
            session_id = %connection.session_id,
            "session registered"
        );
        connection
    }

    /// Tear down a departing session.
    ///
    /// Presence and typing are only cleared when the user's last session
    /// goes away; a second tab keeps them online.
    pub async fn disconnect(&self, connection: &Connection) {
        self.state.remove_connection(connection.session_id).await;
        info!(
            user_id = %connection.user_id,
            session_id = %connection.session_id,
            "session closed"
        );

        if !self
            .state
            .get_user_connections(connection.user_id)
            .await
            .is_empty()
        {
            return;
        }

        self.presence.set_offline(connection.user_id).await;
        for conversation_id in self.typing.stop_all_for_user(connection.user_id).await {
            self.state
                .rooms
                .broadcast(
                    RoomId::Conversation(conversation_id),
                    ServerEvent::UserStoppedTyping {
                        user_id: connection.user_id,
                        conversation_id,
                        timestamp: Utc::now(),
                    },
                )
                .await;
        }
        self.state
            .broadcast_all(ServerEvent::presence_single(
                connection.user_id,
                PresenceStatus::Offline,
            ))
            .await;
    }

    // ========================================================================
    // Client event dispatch
    // ========================================================================

    /// Handle one frame from a connected client
    pub async fn handle_event(&self, connection: &Arc<Connection>, event: ClientEvent) {
        // Heartbeats refresh the record without counting as activity;
        // anything else can promote an away user back to online
        if !matches!(event, ClientEvent::Heartbeat) {
            if let Some(transition) = self.presence.touch(connection.user_id).await {
                self.state
                    .broadcast_all(ServerEvent::presence_single(
                        transition.user_id,
                        transition.status,
                    ))
                    .await;
            }
        }

        match event {
            ClientEvent::Heartbeat => {
                if let Some(transition) = self.presence.heartbeat(connection.user_id).await {
                    self.state
                        .broadcast_all(ServerEvent::presence_single(
                            transition.user_id,
                            transition.status,
                        ))
                        .await;
                }
                let _ = connection.send(ServerEvent::HeartbeatAck {
                    timestamp: Utc::now(),
                });
            }

            ClientEvent::JoinConversation { conversation_id } => {
                self.join_conversation(connection, conversation_id).await;
            }

            ClientEvent::LeaveConversation { conversation_id } => {
                let room = RoomId::Conversation(conversation_id);
                connection.leave_room(room).await;
                self.state.rooms.leave(room, connection.session_id).await;
                let _ = connection.send(ServerEvent::LeftConversation {
                    conversation_id,
                    timestamp: Utc::now(),
                });
            }

            ClientEvent::StartTyping { conversation_id } => {
                // Refresh-or-start: repeated frames keep the indicator alive
                // without resetting when the user began typing
                self.typing
                    .extend(connection.user_id, conversation_id)
                    .await;
                let display_name = self.display_name(connection.user_id).await;
                self.state
                    .rooms
                    .broadcast(
                        RoomId::Conversation(conversation_id),
                        ServerEvent::UserTyping {
                            user_id: connection.user_id,
                            conversation_id,
                            display_name,
                            timestamp: Utc::now(),
                        },
                    )
                    .await;
            }

            ClientEvent::StopTyping { conversation_id } => {
                self.typing.stop(connection.user_id, conversation_id).await;
                self.state
                    .rooms
                    .broadcast(
                        RoomId::Conversation(conversation_id),
                        ServerEvent::UserStoppedTyping {
                            user_id: connection.user_id,
                            conversation_id,
                            timestamp: Utc::now(),
                        },
                    )
                    .await;
            }

            ClientEvent::MarkAsRead {
                conversation_id,
                message_id,
            } => {
                self.mark_as_read(connection, conversation_id, message_id)
                    .await;
            }

            ClientEvent::GetPresence { user_ids } => {
                let records = self.presence.get_bulk(&user_ids).await;
                let presences = user_ids
                    .iter()
                    .map(|user_id| match records.get(user_id) {
                        Some(record) => PresenceEntry {
                            user_id: *user_id,
                            status: record.status,
                            last_seen: Some(record.last_seen),
                        },
                        None => PresenceEntry {
                            user_id: *user_id,
                            status: PresenceStatus::Offline,
                            last_seen: None,
                        },
                    })
                    .collect();
                let _ = connection.send(ServerEvent::presence_bulk(presences));
            }
        }
    }

    async fn join_conversation(
        &self,
        connection: &Arc<Connection>,
        conversation_id: ConversationId,
    ) {
        match self
            .messages
            .is_participant(conversation_id, connection.user_id)
            .await
        {
            Ok(true) => {
                let room = RoomId::Conversation(conversation_id);
                connection.join_room(room).await;
                self.state.rooms.join(room, Arc::clone(connection)).await;
                let _ = connection.send(ServerEvent::JoinedConversation {
                    conversation_id,
                    timestamp: Utc::now(),
                });
            }
            Ok(false) => {
                warn!(
                    user_id = %connection.user_id,
                    conversation_id = %conversation_id,
                    "join refused for non-participant"
                );
                let _ = connection.send(ServerEvent::Error {
                    message: "Access denied to conversation".to_string(),
                });
            }
            Err(error) => {
                error!(conversation_id = %conversation_id, %error, "participant lookup failed");
                let _ = connection.send(ServerEvent::Error {
                    message: "Failed to verify conversation access".to_string(),
                });
            }
        }
    }

    async fn mark_as_read(
        &self,
        connection: &Arc<Connection>,
        conversation_id: ConversationId,
        message_id: MessageId,
    ) {
        match self
            .receipts
            .mark_as_read(connection.user_id, conversation_id, message_id)
            .await
        {
            Ok(true) => {
                self.state
                    .rooms
                    .broadcast(
                        RoomId::Conversation(conversation_id),
                        ServerEvent::MessageRead {
                            user_id: connection.user_id,
                            conversation_id,
                            message_id,
                            timestamp: Utc::now(),
                        },
                    )
                    .await;
            }
            // Pointer already at or past this message
            Ok(false) => {}
            Err(error) => {
                warn!(
                    user_id = %connection.user_id,
                    message_id = %message_id,
                    %error,
                    "read receipt rejected"
                );
                let _ = connection.send(ServerEvent::Error {
                    message: error.to_string(),
                });
            }
        }
    }

    async fn display_name(&self, user_id: UserId) -> Option<String> {
        match self.profiles.display_name(user_id).await {
            Ok(name) => name,
            Err(error) => {
                warn!(user_id = %user_id, %error, "profile lookup failed; typing event goes out unnamed");
                None
            }
        }
    }

    // ========================================================================
    // Durable-layer entry points
    // ========================================================================

    /// Send an event to every member of a room
    pub async fn broadcast(&self, room_id: RoomId, event: ServerEvent) {
        self.state.rooms.broadcast(room_id, event).await;
    }

    /// Send an event to every session a user has open
    pub async fn send_to_user(&self, user_id: UserId, event: ServerEvent) {
        self.state.rooms.broadcast(RoomId::User(user_id), event).await;
    }

    /// Fan a freshly persisted message out to the conversation room and
    /// queue it for every recipient without a reachable presence.
    ///
    /// Called by the durable layer after the message is stored, so the
    /// enriched payload is passed in rather than fetched.
    pub async fn broadcast_message(
        &self,
        conversation_id: ConversationId,
        message_id: MessageId,
        sender_id: UserId,
        content: serde_json::Value,
    ) -> Result<(), RealtimeError> {
        self.state
            .rooms
            .broadcast(
                RoomId::Conversation(conversation_id),
                ServerEvent::NewMessage {
                    message: content.clone(),
                    timestamp: Utc::now(),
                },
            )
            .await;

        let participants = self.conversations.participants_of(conversation_id).await?;
        for participant in participants {
            if participant.user_id == sender_id {
                continue;
            }
            if self.is_reachable(participant.user_id).await {
                continue;
            }
            self.queue
                .enqueue(
                    participant.user_id,
                    QueuedMessage::new(message_id, conversation_id, sender_id, content.clone()),
                )
                .await;
        }
        Ok(())
    }

    /// Push a conversation metadata change to its room
    pub async fn broadcast_conversation_update(
        &self,
        conversation_id: ConversationId,
        patch: serde_json::Value,
    ) {
        self.state
            .rooms
            .broadcast(
                RoomId::Conversation(conversation_id),
                ServerEvent::ConversationUpdated {
                    conversation_id,
                    patch,
                    timestamp: Utc::now(),
                },
            )
            .await;
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// A user is reachable when they hold a live session here or their
    /// presence record says online or away
    async fn is_reachable(&self, user_id: UserId) -> bool {
        if !self.state.get_user_connections(user_id).await.is_empty() {
            return true;
        }
        self.presence.status(user_id).await.is_reachable()
    }

    /// Deliver queued messages to a freshly registered session.
    ///
    /// Each message is acknowledged only after it is handed to the send
    /// task, so a crash mid-flush redelivers instead of dropping.
    async fn flush_offline_queue(&self, connection: &Connection) {
        let mut delivered = 0usize;
        loop {
            let batch = self
                .queue
                .drain(connection.user_id, OFFLINE_DELIVERY_BATCH)
                .await;
            if batch.is_empty() {
                break;
            }
            let batch_len = batch.len();
            let mut acknowledged = 0usize;
            for queued in batch {
                let event = ServerEvent::NewMessage {
                    message: queued.content.clone(),
                    timestamp: queued.enqueued_at,
                };
                if connection.send(event).is_err() {
                    // Session died mid-flush; the rest stays queued
                    return;
                }
                delivered += 1;
                if self
                    .queue
                    .acknowledge(connection.user_id, queued.message_id)
                    .await
                {
                    acknowledged += 1;
                }
            }
            if acknowledged == 0 {
                // Drain is non-destructive; a pass that acknowledged nothing
                // would only resend the same head
                warn!(
                    user_id = %connection.user_id,
                    batch_len,
                    "offline flush acknowledged nothing, leaving the queue for a later session"
                );
                break;
            }
            if batch_len < OFFLINE_DELIVERY_BATCH {
                break;
            }
        }
        if delivered > 0 {
            info!(user_id = %connection.user_id, delivered, "flushed offline queue");
        }
    }
}

#[async_trait]
impl PresenceListener for ConnectionHub {
    /// Rebroadcast sweeper transitions so idle demotions reach clients
    async fn presence_changed(&self, transitions: Vec<PresenceTransition>) {
        for transition in transitions {
            self.state
                .broadcast_all(ServerEvent::presence_single(
                    transition.user_id,
                    transition.status,
                ))
                .await;
        }
    }
}
