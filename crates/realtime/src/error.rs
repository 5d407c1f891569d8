//! Error types for the realtime coordination layer
//!
//! Store outages are deliberately absent here: trackers degrade to safe
//! defaults and logged no-ops instead of surfacing them (see each tracker).
//! Exhausted delivery attempts and empty agent availability are ordinary
//! outcomes, not errors.

use parley_shared::{ConversationId, MessageId, UserId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RealtimeError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Conversation not found: {0}")]
    ConversationNotFound(ConversationId),

    #[error("Message {0} not found in conversation {1}")]
    MessageNotFound(MessageId, ConversationId),

    #[error("User {user_id} is not a participant of conversation {conversation_id}")]
    NotParticipant {
        user_id: UserId,
        conversation_id: ConversationId,
    },

    #[error(transparent)]
    Collaborator(#[from] anyhow::Error),
}
