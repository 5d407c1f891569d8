//! In-crate test doubles

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use parley_shared::{AgentId, ConversationId, EphemeralStore, MessageId, StoreError, UserId};

use crate::collaborators::{ConversationStore, MessageStore, Participant, StoredMessage};

/// Store whose every operation fails, for degradation tests
pub(crate) struct DownStore;

fn down<T>() -> Result<T, StoreError> {
    Err(StoreError::Unavailable("down".into()))
}

#[async_trait]
impl EphemeralStore for DownStore {
    async fn put(&self, _: &str, _: &str, _: Option<Duration>) -> Result<(), StoreError> {
        down()
    }
    async fn get(&self, _: &str) -> Result<Option<String>, StoreError> {
        down()
    }
    async fn get_many(&self, _: &[String]) -> Result<Vec<Option<String>>, StoreError> {
        down()
    }
    async fn delete(&self, _: &str) -> Result<(), StoreError> {
        down()
    }
    async fn scan_keys(&self, _: &str) -> Result<Vec<String>, StoreError> {
        down()
    }
    async fn counter_incr(&self, _: &str, _: i64, _: Option<Duration>) -> Result<i64, StoreError> {
        down()
    }
    async fn ordered_add(
        &self,
        _: &str,
        _: &str,
        _: f64,
        _: Option<Duration>,
    ) -> Result<(), StoreError> {
        down()
    }
    async fn ordered_range(
        &self,
        _: &str,
        _: isize,
        _: isize,
    ) -> Result<Vec<(String, f64)>, StoreError> {
        down()
    }
    async fn ordered_remove(&self, _: &str, _: &str) -> Result<bool, StoreError> {
        down()
    }
    async fn ordered_remove_below(&self, _: &str, _: f64) -> Result<u64, StoreError> {
        down()
    }
    async fn set_add(&self, _: &str, _: &str) -> Result<(), StoreError> {
        down()
    }
    async fn set_remove(&self, _: &str, _: &str) -> Result<(), StoreError> {
        down()
    }
    async fn set_members(&self, _: &str) -> Result<Vec<String>, StoreError> {
        down()
    }
}

/// In-memory durable history standing in for the real message and
/// conversation stores
#[derive(Default)]
pub(crate) struct FakeHistory {
    pub messages: Mutex<Vec<StoredMessage>>,
    pub participants: Mutex<HashMap<ConversationId, Vec<Participant>>>,
    pub assigned: Mutex<HashMap<AgentId, Vec<ConversationId>>>,
}

impl FakeHistory {
    pub fn add_participant(&self, conversation_id: ConversationId, user_id: UserId) {
        self.add_participant_since(conversation_id, user_id, Utc::now());
    }

    pub fn add_participant_since(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
        joined_at: DateTime<Utc>,
    ) {
        self.participants
            .lock()
            .unwrap()
            .entry(conversation_id)
            .or_default()
            .push(Participant { user_id, joined_at });
    }

    pub fn add_message(
        &self,
        conversation_id: ConversationId,
        sender_id: UserId,
        sent_at: DateTime<Utc>,
    ) -> MessageId {
        let message_id = MessageId::new();
        self.messages.lock().unwrap().push(StoredMessage {
            message_id,
            conversation_id,
            sender_id,
            sent_at,
        });
        message_id
    }

    pub fn assign(&self, agent_id: AgentId, conversation_id: ConversationId) {
        self.assigned
            .lock()
            .unwrap()
            .entry(agent_id)
            .or_default()
            .push(conversation_id);
    }
}

#[async_trait]
impl MessageStore for FakeHistory {
    async fn message_by_id(&self, message_id: MessageId) -> anyhow::Result<Option<StoredMessage>> {
        Ok(self
            .messages
            .lock()
            .unwrap()
            .iter()
            .find(|message| message.message_id == message_id)
            .cloned())
    }

    async fn latest_message(
        &self,
        conversation_id: ConversationId,
    ) -> anyhow::Result<Option<StoredMessage>> {
        Ok(self
            .messages
            .lock()
            .unwrap()
            .iter()
            .filter(|message| message.conversation_id == conversation_id)
            .max_by_key(|message| message.sent_at)
            .cloned())
    }

    async fn is_participant(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
    ) -> anyhow::Result<bool> {
        Ok(self
            .participants
            .lock()
            .unwrap()
            .get(&conversation_id)
            .is_some_and(|members| members.iter().any(|p| p.user_id == user_id)))
    }

    async fn count_messages_since(
        &self,
        conversation_id: ConversationId,
        exclude_sender: UserId,
        after: DateTime<Utc>,
    ) -> anyhow::Result<u64> {
        Ok(self
            .messages
            .lock()
            .unwrap()
            .iter()
            .filter(|message| {
                message.conversation_id == conversation_id
                    && message.sender_id != exclude_sender
                    && message.sent_at > after
            })
            .count() as u64)
    }
}

#[async_trait]
impl ConversationStore for FakeHistory {
    async fn participants_of(
        &self,
        conversation_id: ConversationId,
    ) -> anyhow::Result<Vec<Participant>> {
        Ok(self
            .participants
            .lock()
            .unwrap()
            .get(&conversation_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn conversations_of(&self, user_id: UserId) -> anyhow::Result<Vec<ConversationId>> {
        Ok(self
            .participants
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, members)| members.iter().any(|p| p.user_id == user_id))
            .map(|(conversation_id, _)| *conversation_id)
            .collect())
    }

    async fn assigned_open_conversations(
        &self,
        agent_id: AgentId,
    ) -> anyhow::Result<Vec<ConversationId>> {
        Ok(self
            .assigned
            .lock()
            .unwrap()
            .get(&agent_id)
            .cloned()
            .unwrap_or_default())
    }
}
