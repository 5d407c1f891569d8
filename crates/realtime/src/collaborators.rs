//! External collaborator interfaces
//!
//! The coordination layer never owns durable state or identity. Hosts wire
//! in implementations of these traits; everything here returns
//! `anyhow::Result` so implementors are free to carry their own error types.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use parley_shared::{AgentId, ConversationId, MessageId, UserId};

/// Identity resolved from a bearer credential
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
    /// Identity in the external system the credential was issued by
    pub external_id: String,
}

/// Conversation membership as the durable store records it
#[derive(Debug, Clone)]
pub struct Participant {
    pub user_id: UserId,
    pub joined_at: DateTime<Utc>,
}

/// The message fields the coordination layer needs for receipts and fan-out
#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub message_id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub sent_at: DateTime<Utc>,
}

/// Turns bearer credentials into identities
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Resolve a credential; `Ok(None)` means it is invalid or expired
    async fn authenticate(&self, credential: &str) -> anyhow::Result<Option<AuthenticatedUser>>;
}

/// Display-name lookup against the external profile system
#[async_trait]
pub trait ProfileDirectory: Send + Sync {
    async fn display_name(&self, user_id: UserId) -> anyhow::Result<Option<String>>;
}

/// Read access to durable message history
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn message_by_id(&self, message_id: MessageId) -> anyhow::Result<Option<StoredMessage>>;

    /// Newest non-deleted message of a conversation, if any
    async fn latest_message(
        &self,
        conversation_id: ConversationId,
    ) -> anyhow::Result<Option<StoredMessage>>;

    async fn is_participant(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
    ) -> anyhow::Result<bool>;

    /// Non-deleted messages sent strictly after `after`, excluding those
    /// sent by `exclude_sender`
    async fn count_messages_since(
        &self,
        conversation_id: ConversationId,
        exclude_sender: UserId,
        after: DateTime<Utc>,
    ) -> anyhow::Result<u64>;
}

/// Read access to durable conversation state
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn participants_of(
        &self,
        conversation_id: ConversationId,
    ) -> anyhow::Result<Vec<Participant>>;

    /// Every conversation the user currently participates in
    async fn conversations_of(&self, user_id: UserId) -> anyhow::Result<Vec<ConversationId>>;

    /// Open conversations currently assigned to an agent
    async fn assigned_open_conversations(
        &self,
        agent_id: AgentId,
    ) -> anyhow::Result<Vec<ConversationId>>;
}
