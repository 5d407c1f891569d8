//! Shared fixtures for gateway integration tests
#![allow(dead_code)] // not every test binary uses every helper

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use parley_gateway::{ConnectionHub, ServerEvent};
use parley_realtime::collaborators::{
    AuthProvider, AuthenticatedUser, ConversationStore, MessageStore, Participant,
    ProfileDirectory, StoredMessage,
};
use parley_realtime::{
    OfflineMessageQueue, PresenceTracker, ReadReceiptTracker, RealtimeConfig, TypingTracker,
};
use parley_shared::{
    AgentId, ConversationId, EphemeralStore, MemoryStore, MessageId, StoreError, UserId,
};

pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// =============================================================================
// Collaborator fakes
// =============================================================================

/// Static token-to-user map standing in for the platform's auth service
#[derive(Default)]
pub struct TokenAuth {
    tokens: Mutex<HashMap<String, UserId>>,
}

impl TokenAuth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&self, token: &str, user_id: UserId) {
        self.tokens
            .lock()
            .unwrap()
            .insert(token.to_string(), user_id);
    }
}

#[async_trait]
impl AuthProvider for TokenAuth {
    async fn authenticate(&self, credential: &str) -> anyhow::Result<Option<AuthenticatedUser>> {
        Ok(self
            .tokens
            .lock()
            .unwrap()
            .get(credential)
            .map(|user_id| AuthenticatedUser {
                user_id: *user_id,
                external_id: format!("ext-{user_id}"),
            }))
    }
}

#[derive(Default)]
pub struct StaticProfiles {
    names: Mutex<HashMap<UserId, String>>,
}

impl StaticProfiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_name(&self, user_id: UserId, name: &str) {
        self.names.lock().unwrap().insert(user_id, name.to_string());
    }
}

#[async_trait]
impl ProfileDirectory for StaticProfiles {
    async fn display_name(&self, user_id: UserId) -> anyhow::Result<Option<String>> {
        Ok(self.names.lock().unwrap().get(&user_id).cloned())
    }
}

/// In-memory conversation and message history
#[derive(Default)]
pub struct SeededHistory {
    participants: Mutex<HashMap<ConversationId, Vec<Participant>>>,
    messages: Mutex<Vec<StoredMessage>>,
}

impl SeededHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_participant(&self, conversation_id: ConversationId, user_id: UserId) {
        self.participants
            .lock()
            .unwrap()
            .entry(conversation_id)
            .or_default()
            .push(Participant {
                user_id,
                joined_at: Utc::now() - chrono::Duration::days(1),
            });
    }

    pub fn add_message(&self, conversation_id: ConversationId, sender_id: UserId) -> MessageId {
        let message_id = MessageId::new();
        self.messages.lock().unwrap().push(StoredMessage {
            message_id,
            conversation_id,
            sender_id,
            sent_at: Utc::now(),
        });
        message_id
    }
}

#[async_trait]
impl MessageStore for SeededHistory {
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
            .is_some_and(|members| members.iter().any(|member| member.user_id == user_id)))
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
impl ConversationStore for SeededHistory {
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
            .filter(|(_, members)| members.iter().any(|member| member.user_id == user_id))
            .map(|(conversation_id, _)| *conversation_id)
            .collect())
    }

    async fn assigned_open_conversations(
        &self,
        _agent_id: AgentId,
    ) -> anyhow::Result<Vec<ConversationId>> {
        Ok(Vec::new())
    }
}

// =============================================================================
// Store doubles
// =============================================================================

/// Delegates to a [`MemoryStore`] but fails ordered-collection removals,
/// so drained queue entries can never be acknowledged
#[derive(Default)]
pub struct RemoveRejectingStore {
    inner: MemoryStore,
}

impl RemoveRejectingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EphemeralStore for RemoveRejectingStore {
    async fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        self.inner.put(key, value, ttl).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.get(key).await
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>, StoreError> {
        self.inner.get_many(keys).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.inner.delete(key).await
    }

    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        self.inner.scan_keys(pattern).await
    }

    async fn counter_incr(
        &self,
        key: &str,
        delta: i64,
        ttl: Option<Duration>,
    ) -> Result<i64, StoreError> {
        self.inner.counter_incr(key, delta, ttl).await
    }

    async fn ordered_add(
        &self,
        key: &str,
        member: &str,
        score: f64,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        self.inner.ordered_add(key, member, score, ttl).await
    }

    async fn ordered_range(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<(String, f64)>, StoreError> {
        self.inner.ordered_range(key, start, stop).await
    }

    async fn ordered_remove(&self, _key: &str, _member: &str) -> Result<bool, StoreError> {
        Err(StoreError::Unavailable("removals rejected".into()))
    }

    async fn ordered_remove_below(&self, _key: &str, _cutoff: f64) -> Result<u64, StoreError> {
        Err(StoreError::Unavailable("removals rejected".into()))
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<(), StoreError> {
        self.inner.set_add(key, member).await
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<(), StoreError> {
        self.inner.set_remove(key, member).await
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.inner.set_members(key).await
    }
}

// =============================================================================
// Harness
// =============================================================================

/// A fully wired hub over an in-memory store
pub struct Harness {
    pub hub: Arc<ConnectionHub>,
    pub presence: Arc<PresenceTracker>,
    pub typing: Arc<TypingTracker>,
    pub queue: Arc<OfflineMessageQueue>,
    pub auth: Arc<TokenAuth>,
    pub profiles: Arc<StaticProfiles>,
    pub history: Arc<SeededHistory>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(&RealtimeConfig::default())
    }

    pub fn with_config(config: &RealtimeConfig) -> Self {
        Self::build(Arc::new(MemoryStore::new()), config)
    }

    /// Wire the hub over a specific store implementation
    pub fn with_store(store: Arc<dyn EphemeralStore>) -> Self {
        Self::build(store, &RealtimeConfig::default())
    }

    fn build(store: Arc<dyn EphemeralStore>, config: &RealtimeConfig) -> Self {
        let presence = Arc::new(PresenceTracker::new(store.clone(), config));
        let typing = Arc::new(TypingTracker::new(store.clone(), config));
        let queue = Arc::new(OfflineMessageQueue::new(store.clone(), config));
        let history = Arc::new(SeededHistory::new());
        let receipts = Arc::new(ReadReceiptTracker::new(
            store,
            history.clone(),
            history.clone(),
        ));
        let auth = Arc::new(TokenAuth::new());
        let profiles = Arc::new(StaticProfiles::new());

        let hub = Arc::new(ConnectionHub::new(
            presence.clone(),
            typing.clone(),
            receipts,
            queue.clone(),
            auth.clone(),
            profiles.clone(),
            history.clone(),
            history.clone(),
        ));

        Self {
            hub,
            presence,
            typing,
            queue,
            auth,
            profiles,
            history,
        }
    }

    /// Connect a user with a fresh token, returning the session handle and
    /// its event stream
    pub async fn connect(
        &self,
        user_id: UserId,
    ) -> (
        Arc<parley_gateway::Connection>,
        mpsc::UnboundedReceiver<ServerEvent>,
    ) {
        let token = format!("token-{user_id}");
        self.auth.issue(&token, user_id);
        let (tx, rx) = mpsc::unbounded_channel();
        let connection = self.hub.connect(&token, tx).await.unwrap();
        (connection, rx)
    }
}

/// Pull every event currently buffered on a session channel
pub fn drain_events(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
