//! Read receipts
//!
//! Each (conversation, user) pair holds a single read pointer naming the
//! newest message the user has read. Whether a user has read some message is
//! derived by comparing sent timestamps against the pointer, so storage stays
//! constant per participant no matter how long the conversation runs.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use parley_shared::{ConversationId, EphemeralStore, MessageId, UserId};

use crate::collaborators::{ConversationStore, MessageStore, StoredMessage};
use crate::error::RealtimeError;

/// Per-(conversation, user) high-water mark
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadPointer {
    pub last_read_message_id: MessageId,
    pub last_read_at: DateTime<Utc>,
    /// Sent time of the pointed-at message. Any message sent at or before
    /// this instant counts as read.
    pub last_read_message_sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReceiptEntry {
    pub user_id: UserId,
    pub read_at: DateTime<Utc>,
}

/// Who has and has not read a message. The sender is in neither list.
#[derive(Debug, Clone, Serialize)]
pub struct ReadReceipts {
    pub message_id: MessageId,
    pub read_by: Vec<ReceiptEntry>,
    pub unread_by: Vec<UserId>,
}

pub struct ReadReceiptTracker {
    store: Arc<dyn EphemeralStore>,
    messages: Arc<dyn MessageStore>,
    conversations: Arc<dyn ConversationStore>,
}

fn read_key(conversation_id: ConversationId, user_id: UserId) -> String {
    format!("read:{conversation_id}:{user_id}")
}

impl ReadReceiptTracker {
    pub fn new(
        store: Arc<dyn EphemeralStore>,
        messages: Arc<dyn MessageStore>,
        conversations: Arc<dyn ConversationStore>,
    ) -> Self {
        Self {
            store,
            messages,
            conversations,
        }
    }

    /// Advance the user's read pointer to the given message.
    ///
    /// Returns whether the pointer moved: marking a message older than the
    /// current pointer, or the pointed-at message again, is an accepted
    /// no-op. The message must exist in the conversation and the user must
    /// be a participant.
    pub async fn mark_as_read(
        &self,
        user_id: UserId,
        conversation_id: ConversationId,
        message_id: MessageId,
    ) -> Result<bool, RealtimeError> {
        let message = self
            .messages
            .message_by_id(message_id)
            .await?
            .filter(|message| message.conversation_id == conversation_id)
            .ok_or(RealtimeError::MessageNotFound(message_id, conversation_id))?;
        if !self.messages.is_participant(conversation_id, user_id).await? {
            return Err(RealtimeError::NotParticipant {
                user_id,
                conversation_id,
            });
        }
        Ok(self.advance(user_id, &message).await)
    }

    /// Advance the user's pointer to the newest message in the conversation.
    ///
    /// Returns the message the pointer moved to, or `None` when the
    /// conversation is empty or everything was already read.
    pub async fn mark_all_as_read(
        &self,
        user_id: UserId,
        conversation_id: ConversationId,
    ) -> Result<Option<MessageId>, RealtimeError> {
        if !self.messages.is_participant(conversation_id, user_id).await? {
            return Err(RealtimeError::NotParticipant {
                user_id,
                conversation_id,
            });
        }
        let Some(latest) = self.messages.latest_message(conversation_id).await? else {
            return Ok(None);
        };
        Ok(self
            .advance(user_id, &latest)
            .await
            .then_some(latest.message_id))
    }

    /// The user's current read pointer, if any
    pub async fn pointer(
        &self,
        user_id: UserId,
        conversation_id: ConversationId,
    ) -> Option<ReadPointer> {
        match self.store.get(&read_key(conversation_id, user_id)).await {
            Ok(Some(payload)) => match serde_json::from_str(&payload) {
                Ok(pointer) => Some(pointer),
                Err(error) => {
                    warn!(user_id = %user_id, conversation_id = %conversation_id, %error,
                        "malformed read pointer, treating as unread");
                    None
                }
            },
            Ok(None) => None,
            Err(error) => {
                warn!(user_id = %user_id, conversation_id = %conversation_id, %error,
                    "read pointer fetch failed, treating as unread");
                None
            }
        }
    }

    /// Partition the other participants of a message's conversation into
    /// those whose pointer covers it and those still to read it
    pub async fn read_receipts(
        &self,
        conversation_id: ConversationId,
        message_id: MessageId,
    ) -> Result<ReadReceipts, RealtimeError> {
        let message = self
            .messages
            .message_by_id(message_id)
            .await?
            .filter(|message| message.conversation_id == conversation_id)
            .ok_or(RealtimeError::MessageNotFound(message_id, conversation_id))?;

        let recipients: Vec<UserId> = self
            .conversations
            .participants_of(conversation_id)
            .await?
            .into_iter()
            .map(|participant| participant.user_id)
            .filter(|participant| *participant != message.sender_id)
            .collect();

        let keys: Vec<String> = recipients
            .iter()
            .map(|user_id| read_key(conversation_id, *user_id))
            .collect();
        let pointers = match self.store.get_many(&keys).await {
            Ok(values) => values,
            Err(error) => {
                warn!(conversation_id = %conversation_id, %error,
                    "read pointer fetch failed, reporting everyone unread");
                vec![None; keys.len()]
            }
        };

        let mut receipts = ReadReceipts {
            message_id,
            read_by: Vec::new(),
            unread_by: Vec::new(),
        };
        for (user_id, payload) in recipients.into_iter().zip(pointers) {
            let pointer: Option<ReadPointer> =
                payload.as_deref().and_then(|p| serde_json::from_str(p).ok());
            match pointer {
                Some(pointer) if pointer.last_read_message_sent_at >= message.sent_at => {
                    receipts.read_by.push(ReceiptEntry {
                        user_id,
                        read_at: pointer.last_read_at,
                    });
                }
                _ => receipts.unread_by.push(user_id),
            }
        }
        Ok(receipts)
    }

    /// Messages from other senders the user has not read yet.
    ///
    /// Without a pointer the count starts from when the user joined, so a
    /// new participant is not greeted with the whole backlog as unread.
    pub async fn unread_count(
        &self,
        user_id: UserId,
        conversation_id: ConversationId,
    ) -> Result<u64, RealtimeError> {
        let after = match self.pointer(user_id, conversation_id).await {
            Some(pointer) => pointer.last_read_message_sent_at,
            None => self
                .conversations
                .participants_of(conversation_id)
                .await?
                .into_iter()
                .find(|participant| participant.user_id == user_id)
                .map(|participant| participant.joined_at)
                .ok_or(RealtimeError::NotParticipant {
                    user_id,
                    conversation_id,
                })?,
        };
        Ok(self
            .messages
            .count_messages_since(conversation_id, user_id, after)
            .await?)
    }

    /// Unread counts across every conversation the user belongs to
    pub async fn all_unread_counts(
        &self,
        user_id: UserId,
    ) -> Result<HashMap<ConversationId, u64>, RealtimeError> {
        let conversations = self.conversations.conversations_of(user_id).await?;
        let mut counts = HashMap::with_capacity(conversations.len());
        for conversation_id in conversations {
            let count = self.unread_count(user_id, conversation_id).await?;
            counts.insert(conversation_id, count);
        }
        Ok(counts)
    }

    async fn advance(&self, user_id: UserId, message: &StoredMessage) -> bool {
        let conversation_id = message.conversation_id;
        if let Some(current) = self.pointer(user_id, conversation_id).await {
            if current.last_read_message_id == message.message_id {
                return false;
            }
            if message.sent_at < current.last_read_message_sent_at {
                debug!(user_id = %user_id, conversation_id = %conversation_id,
                    "ignoring read pointer regression");
                return false;
            }
        }

        let pointer = ReadPointer {
            last_read_message_id: message.message_id,
            last_read_at: Utc::now(),
            last_read_message_sent_at: message.sent_at,
        };
        let payload = match serde_json::to_string(&pointer) {
            Ok(payload) => payload,
            Err(error) => {
                warn!(user_id = %user_id, %error, "read pointer serialization failed");
                return false;
            }
        };
        // Pointers are rewritten on every read, so they carry no TTL
        if let Err(error) = self
            .store
            .put(&read_key(conversation_id, user_id), &payload, None)
            .await
        {
            warn!(user_id = %user_id, conversation_id = %conversation_id, %error,
                "read pointer write failed, receipt dropped");
        }
        true
    }
}
