//! WebSocket wire protocol
//!
//! Every frame is a JSON object tagged by `type`. Client frames are only
//! ever deserialized and server frames only ever serialized, so the two
//! enums stay separate. Payload fields ride in camelCase to match the
//! platform's public API surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use parley_shared::{ConversationId, MessageId, PresenceStatus, UserId};

// =============================================================================
// Client-to-Server Events
// =============================================================================

/// Frames a connected client may send
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    /// Keep-alive; refreshes the presence record without promoting status
    Heartbeat,

    /// Subscribe to a conversation's room
    JoinConversation { conversation_id: ConversationId },

    /// Unsubscribe from a conversation's room
    LeaveConversation { conversation_id: ConversationId },

    /// Start typing in a conversation
    StartTyping { conversation_id: ConversationId },

    /// Stop typing in a conversation
    StopTyping { conversation_id: ConversationId },

    /// Advance the read pointer to the given message
    MarkAsRead {
        conversation_id: ConversationId,
        message_id: MessageId,
    },

    /// Request a presence snapshot for a set of users
    GetPresence { user_ids: Vec<UserId> },
}

// =============================================================================
// Server-to-Client Events
// =============================================================================

/// Frames the server pushes to connected clients
#[derive(Debug, Serialize, Clone)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// Connection acknowledged, sent once per session
    Connected {
        user_id: UserId,
        timestamp: DateTime<Utc>,
    },

    /// Conversation room subscription confirmed
    JoinedConversation {
        conversation_id: ConversationId,
        timestamp: DateTime<Utc>,
    },

    LeftConversation {
        conversation_id: ConversationId,
        timestamp: DateTime<Utc>,
    },

    /// A newly persisted message; the enriched payload is flattened into
    /// the frame alongside the tag
    NewMessage {
        #[serde(flatten)]
        message: serde_json::Value,
        timestamp: DateTime<Utc>,
    },

    /// User started typing in a conversation
    UserTyping {
        user_id: UserId,
        conversation_id: ConversationId,
        #[serde(skip_serializing_if = "Option::is_none")]
        display_name: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// User stopped typing in a conversation
    UserStoppedTyping {
        user_id: UserId,
        conversation_id: ConversationId,
        timestamp: DateTime<Utc>,
    },

    /// A participant's read pointer advanced to a message
    MessageRead {
        user_id: UserId,
        conversation_id: ConversationId,
        message_id: MessageId,
        timestamp: DateTime<Utc>,
    },

    /// Presence change or snapshot. Single changes carry `userId` and
    /// `status`; snapshot replies carry `presences`.
    PresenceUpdate {
        #[serde(skip_serializing_if = "Option::is_none")]
        user_id: Option<UserId>,
        #[serde(skip_serializing_if = "Option::is_none")]
        status: Option<PresenceStatus>,
        #[serde(skip_serializing_if = "Option::is_none")]
        presences: Option<Vec<PresenceEntry>>,
        timestamp: DateTime<Utc>,
    },

    /// Heartbeat response
    HeartbeatAck { timestamp: DateTime<Utc> },

    /// Conversation metadata changed (assignment, status, subject)
    ConversationUpdated {
        conversation_id: ConversationId,
        patch: serde_json::Value,
        timestamp: DateTime<Utc>,
    },

    /// Error message
    Error { message: String },
}

// =============================================================================
// Event Data Structures
// =============================================================================

/// One user's presence as reported in a `presence_update` snapshot
#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PresenceEntry {
    pub user_id: UserId,
    pub status: PresenceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
}

impl ServerEvent {
    /// A `presence_update` frame for one user's status change
    pub fn presence_single(user_id: UserId, status: PresenceStatus) -> Self {
        Self::PresenceUpdate {
            user_id: Some(user_id),
            status: Some(status),
            presences: None,
            timestamp: Utc::now(),
        }
    }

    /// A `presence_update` snapshot answering a `get_presence` request
    pub fn presence_bulk(presences: Vec<PresenceEntry>) -> Self {
        Self::PresenceUpdate {
            user_id: None,
            status: None,
            presences: Some(presences),
            timestamp: Utc::now(),
        }
    }
}
