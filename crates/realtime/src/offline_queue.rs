//! Offline message queue
//!
//! Per-recipient ordered buffer for messages that arrive while the user has
//! no reachable session. Entries are drained oldest-first on reconnect and
//! stay queued until acknowledged, evicted after repeated delivery failures,
//! or reaped past the retention window.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use parley_shared::{ConversationId, EphemeralStore, MessageId, UserId};

use crate::config::RealtimeConfig;

/// One buffered message awaiting delivery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedMessage {
    pub message_id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    /// Opaque message body as the durable layer rendered it
    pub content: serde_json::Value,
    pub enqueued_at: DateTime<Utc>,
    pub delivery_attempts: u32,
}

impl QueuedMessage {
    pub fn new(
        message_id: MessageId,
        conversation_id: ConversationId,
        sender_id: UserId,
        content: serde_json::Value,
    ) -> Self {
        Self {
            message_id,
            conversation_id,
            sender_id,
            content,
            enqueued_at: Utc::now(),
            delivery_attempts: 0,
        }
    }
}

pub struct OfflineMessageQueue {
    store: Arc<dyn EphemeralStore>,
    retention: Duration,
    max_delivery_attempts: u32,
}

fn queue_key(user_id: UserId) -> String {
    format!("message_queue:{user_id}")
}

fn score_of(entry: &QueuedMessage) -> f64 {
    entry.enqueued_at.timestamp_millis() as f64
}

impl OfflineMessageQueue {
    pub fn new(store: Arc<dyn EphemeralStore>, config: &RealtimeConfig) -> Self {
        Self {
            store,
            retention: config.queue_retention,
            max_delivery_attempts: config.max_delivery_attempts,
        }
    }

    /// Append a message to the recipient's queue. Each append refreshes the
    /// queue's retention TTL.
    pub async fn enqueue(&self, recipient: UserId, message: QueuedMessage) {
        let payload = match serde_json::to_string(&message) {
            Ok(payload) => payload,
            Err(error) => {
                warn!(recipient = %recipient, %error, "queued message serialization failed");
                return;
            }
        };
        match self
            .store
            .ordered_add(
                &queue_key(recipient),
                &payload,
                score_of(&message),
                Some(self.retention),
            )
            .await
        {
            Ok(()) => {
                debug!(recipient = %recipient, message_id = %message.message_id,
                    "message queued for offline delivery");
            }
            Err(error) => {
                warn!(recipient = %recipient, message_id = %message.message_id, %error,
                    "offline enqueue failed, message not buffered");
            }
        }
    }

    /// Up to `limit` queued messages, oldest first. Does not remove them;
    /// callers acknowledge each one once it has actually been delivered.
    pub async fn drain(&self, user_id: UserId, limit: usize) -> Vec<QueuedMessage> {
        if limit == 0 {
            return Vec::new();
        }
        let stop = (limit - 1) as isize;
        let members = match self.store.ordered_range(&queue_key(user_id), 0, stop).await {
            Ok(members) => members,
            Err(error) => {
                warn!(user_id = %user_id, %error, "queue read failed, draining nothing");
                return Vec::new();
            }
        };
        members
            .into_iter()
            .filter_map(|(payload, _)| match serde_json::from_str(&payload) {
                Ok(entry) => Some(entry),
                Err(error) => {
                    warn!(user_id = %user_id, %error, "skipping malformed queued message");
                    None
                }
            })
            .collect()
    }

    /// Remove a delivered message from the queue; `false` when it was not
    /// queued (already acknowledged, evicted, or reaped)
    pub async fn acknowledge(&self, user_id: UserId, message_id: MessageId) -> bool {
        let Some((payload, _)) = self.find(user_id, message_id).await else {
            return false;
        };
        match self.store.ordered_remove(&queue_key(user_id), &payload).await {
            Ok(removed) => {
                debug!(user_id = %user_id, message_id = %message_id, "queued message acknowledged");
                removed
            }
            Err(error) => {
                warn!(user_id = %user_id, message_id = %message_id, %error,
                    "queue acknowledge failed");
                false
            }
        }
    }

    /// Count one failed delivery attempt against a queued message.
    ///
    /// Returns whether the message is still queued for retry: once attempts
    /// reach the configured maximum the entry is evicted and `false` comes
    /// back, as it does for a message that is no longer queued at all.
    pub async fn record_delivery_failure(&self, user_id: UserId, message_id: MessageId) -> bool {
        let Some((payload, mut entry)) = self.find(user_id, message_id).await else {
            return false;
        };
        let key = queue_key(user_id);
        entry.delivery_attempts += 1;

        if entry.delivery_attempts >= self.max_delivery_attempts {
            if let Err(error) = self.store.ordered_remove(&key, &payload).await {
                warn!(user_id = %user_id, message_id = %message_id, %error,
                    "queue eviction failed");
            }
            warn!(user_id = %user_id, message_id = %message_id,
                attempts = entry.delivery_attempts,
                "message evicted after repeated delivery failures");
            return false;
        }

        // Rewrite the member in place at its original score so the queue
        // position is preserved
        let updated = match serde_json::to_string(&entry) {
            Ok(updated) => updated,
            Err(error) => {
                warn!(user_id = %user_id, %error, "queued message serialization failed");
                return true;
            }
        };
        if let Err(error) = self.store.ordered_remove(&key, &payload).await {
            warn!(user_id = %user_id, message_id = %message_id, %error,
                "queue update failed, attempt count not recorded");
            return true;
        }
        if let Err(error) = self
            .store
            .ordered_add(&key, &updated, score_of(&entry), None)
            .await
        {
            warn!(user_id = %user_id, message_id = %message_id, %error,
                "queue update failed, message dropped from queue");
        }
        true
    }

    /// Backstop removal of entries older than the retention window across all
    /// queues; returns how many were removed
    pub async fn reap_expired(&self) -> u64 {
        let retention = chrono::Duration::from_std(self.retention)
            .unwrap_or_else(|_| chrono::Duration::days(3));
        let cutoff = (Utc::now() - retention).timestamp_millis() as f64;
        let keys = match self.store.scan_keys("message_queue:*").await {
            Ok(keys) => keys,
            Err(error) => {
                warn!(%error, "queue reap scan failed");
                return 0;
            }
        };
        let mut removed = 0;
        for key in keys {
            match self.store.ordered_remove_below(&key, cutoff).await {
                Ok(count) => removed += count,
                Err(error) => warn!(key, %error, "queue reap failed"),
            }
        }
        removed
    }

    async fn find(&self, user_id: UserId, message_id: MessageId) -> Option<(String, QueuedMessage)> {
        let members = match self.store.ordered_range(&queue_key(user_id), 0, -1).await {
            Ok(members) => members,
            Err(error) => {
                warn!(user_id = %user_id, %error, "queue read failed");
                return None;
            }
        };
        members.into_iter().find_map(|(payload, _)| {
            let entry: QueuedMessage = serde_json::from_str(&payload).ok()?;
            (entry.message_id == message_id).then_some((payload, entry))
        })
    }
}
