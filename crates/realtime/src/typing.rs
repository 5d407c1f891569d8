//! Typing indicators
//!
//! Self-expiring per-(conversation, user) flags. Expiry is enforced twice:
//! the store TTL drops the key, and `list_typing` lazily prunes anything the
//! TTL has not caught yet (or that was written malformed), with
//! `sweep_expired` as the periodic backstop.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use parley_shared::{ConversationId, EphemeralStore, UserId};

use crate::config::RealtimeConfig;

/// Stored typing flag
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypingIndicator {
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl TypingIndicator {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

pub struct TypingTracker {
    store: Arc<dyn EphemeralStore>,
    typing_timeout: Duration,
}

fn typing_key(conversation_id: ConversationId, user_id: UserId) -> String {
    format!("typing:{conversation_id}:{user_id}")
}

fn parse_key(key: &str) -> Option<(ConversationId, UserId)> {
    let rest = key.strip_prefix("typing:")?;
    let (conversation, user) = rest.split_once(':')?;
    Some((
        ConversationId(Uuid::parse_str(conversation).ok()?),
        UserId(Uuid::parse_str(user).ok()?),
    ))
}

impl TypingTracker {
    pub fn new(store: Arc<dyn EphemeralStore>, config: &RealtimeConfig) -> Self {
        Self {
            store,
            typing_timeout: config.typing_timeout,
        }
    }

    /// Create or replace the indicator, restarting its lifetime
    pub async fn start(&self, user_id: UserId, conversation_id: ConversationId) {
        let now = Utc::now();
        let indicator = TypingIndicator {
            started_at: now,
            expires_at: now + self.timeout_chrono(),
        };
        self.write(user_id, conversation_id, &indicator).await;
    }

    /// Remove the indicator immediately
    pub async fn stop(&self, user_id: UserId, conversation_id: ConversationId) {
        if let Err(error) = self.store.delete(&typing_key(conversation_id, user_id)).await {
            warn!(user_id = %user_id, conversation_id = %conversation_id, %error,
                "typing stop failed");
        }
    }

    /// Refresh the expiry of an existing indicator, preserving when typing
    /// began; behaves as `start` when none exists
    pub async fn extend(&self, user_id: UserId, conversation_id: ConversationId) {
        let now = Utc::now();
        match self.read(user_id, conversation_id).await {
            Some(mut indicator) if !indicator.is_expired(now) => {
                indicator.expires_at = now + self.timeout_chrono();
                self.write(user_id, conversation_id, &indicator).await;
            }
            _ => self.start(user_id, conversation_id).await,
        }
    }

    /// Users currently typing in a conversation. Expired and malformed
    /// entries are pruned on the way out.
    pub async fn list_typing(&self, conversation_id: ConversationId) -> Vec<UserId> {
        let pattern = format!("typing:{conversation_id}:*");
        let keys = match self.store.scan_keys(&pattern).await {
            Ok(keys) => keys,
            Err(error) => {
                warn!(conversation_id = %conversation_id, %error,
                    "typing scan failed, reporting nobody typing");
                return Vec::new();
            }
        };
        let values = match self.store.get_many(&keys).await {
            Ok(values) => values,
            Err(error) => {
                warn!(conversation_id = %conversation_id, %error,
                    "typing read failed, reporting nobody typing");
                return Vec::new();
            }
        };

        let now = Utc::now();
        let mut typing = Vec::new();
        for (key, value) in keys.iter().zip(values) {
            let Some((_, user_id)) = parse_key(key) else {
                self.prune(key, "unparseable typing key").await;
                continue;
            };
            let indicator: TypingIndicator = match value.as_deref().map(serde_json::from_str) {
                Some(Ok(indicator)) => indicator,
                Some(Err(_)) => {
                    self.prune(key, "malformed typing indicator").await;
                    continue;
                }
                // Expired between scan and read
                None => continue,
            };
            if indicator.is_expired(now) {
                self.prune(key, "expired typing indicator").await;
            } else {
                typing.push(user_id);
            }
        }
        typing.sort_by_key(|id| id.0);
        typing
    }

    /// Remove every indicator the user holds, across all conversations;
    /// returns the affected conversations so callers can broadcast the stop
    pub async fn stop_all_for_user(&self, user_id: UserId) -> Vec<ConversationId> {
        let pattern = format!("typing:*:{user_id}");
        let keys = match self.store.scan_keys(&pattern).await {
            Ok(keys) => keys,
            Err(error) => {
                warn!(user_id = %user_id, %error, "typing scan failed, nothing cleared");
                return Vec::new();
            }
        };
        let mut conversations = Vec::new();
        for key in keys {
            let Some((conversation_id, _)) = parse_key(&key) else {
                continue;
            };
            match self.store.delete(&key).await {
                Ok(()) => conversations.push(conversation_id),
                Err(error) => {
                    warn!(user_id = %user_id, conversation_id = %conversation_id, %error,
                        "typing clear failed");
                }
            }
        }
        debug!(user_id = %user_id, cleared = conversations.len(), "cleared typing indicators");
        conversations
    }

    /// Backstop removal of expired or malformed entries lazy pruning missed;
    /// returns how many were removed
    pub async fn sweep_expired(&self) -> usize {
        let keys = match self.store.scan_keys("typing:*").await {
            Ok(keys) => keys,
            Err(error) => {
                warn!(%error, "typing sweep scan failed");
                return 0;
            }
        };
        let values = match self.store.get_many(&keys).await {
            Ok(values) => values,
            Err(error) => {
                warn!(%error, "typing sweep read failed");
                return 0;
            }
        };

        let now = Utc::now();
        let mut removed = 0;
        for (key, value) in keys.iter().zip(values) {
            let expired = match value.as_deref().map(serde_json::from_str::<TypingIndicator>) {
                Some(Ok(indicator)) => indicator.is_expired(now),
                // Malformed entries count as expired
                Some(Err(_)) => true,
                None => continue,
            };
            if expired && self.store.delete(key).await.is_ok() {
                removed += 1;
            }
        }
        removed
    }

    fn timeout_chrono(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.typing_timeout)
            .unwrap_or_else(|_| chrono::Duration::seconds(5))
    }

    async fn read(
        &self,
        user_id: UserId,
        conversation_id: ConversationId,
    ) -> Option<TypingIndicator> {
        match self.store.get(&typing_key(conversation_id, user_id)).await {
            Ok(Some(payload)) => serde_json::from_str(&payload).ok(),
            Ok(None) => None,
            Err(error) => {
                warn!(user_id = %user_id, conversation_id = %conversation_id, %error,
                    "typing read failed");
                None
            }
        }
    }

    async fn write(
        &self,
        user_id: UserId,
        conversation_id: ConversationId,
        indicator: &TypingIndicator,
    ) {
        let payload = match serde_json::to_string(indicator) {
            Ok(payload) => payload,
            Err(error) => {
                warn!(user_id = %user_id, %error, "typing indicator serialization failed");
                return;
            }
        };
        if let Err(error) = self
            .store
            .put(
                &typing_key(conversation_id, user_id),
                &payload,
                Some(self.typing_timeout),
            )
            .await
        {
            warn!(user_id = %user_id, conversation_id = %conversation_id, %error,
                "typing write failed, dropping indicator");
        }
    }

    async fn prune(&self, key: &str, reason: &'static str) {
        debug!(key, reason, "pruning typing entry");
        if let Err(error) = self.store.delete(key).await {
            warn!(key, %error, "typing prune failed");
        }
    }
}
