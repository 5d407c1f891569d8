//! Presence tracking with TTL-based liveness
//!
//! Liveness and activity are tracked separately: `heartbeat` proves the
//! connection is alive and refreshes the record TTL, while `touch` records
//! user activity. The sweep demotes connected-but-idle users to AWAY and
//! users whose heartbeats stopped to OFFLINE. Offline records are kept for a
//! grace window so "last seen" stays queryable.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use parley_shared::{EphemeralStore, PresenceStatus, UserId};

use crate::config::RealtimeConfig;

/// Stored per-user presence state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub status: PresenceStatus,
    pub last_seen: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
}

/// One status change produced by a sweep or an activity promotion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenceTransition {
    pub user_id: UserId,
    pub status: PresenceStatus,
}

pub struct PresenceTracker {
    store: Arc<dyn EphemeralStore>,
    presence_ttl: Duration,
    offline_grace: Duration,
    heartbeat_timeout: Duration,
    away_timeout: Duration,
    retention: Duration,
}

fn presence_key(user_id: UserId) -> String {
    format!("presence:{user_id}")
}

fn user_from_key(key: &str) -> Option<UserId> {
    key.strip_prefix("presence:")
        .and_then(|raw| Uuid::parse_str(raw).ok())
        .map(UserId)
}

/// Wall-clock distance from `then` to `now`, zero if `then` is in the future
fn elapsed_since(now: DateTime<Utc>, then: DateTime<Utc>) -> Duration {
    (now - then).to_std().unwrap_or_default()
}

impl PresenceTracker {
    pub fn new(store: Arc<dyn EphemeralStore>, config: &RealtimeConfig) -> Self {
        Self {
            store,
            presence_ttl: config.presence_ttl,
            offline_grace: config.offline_grace,
            heartbeat_timeout: config.heartbeat_timeout,
            away_timeout: config.away_timeout,
            retention: config.presence_retention,
        }
    }

    /// Mark a user online, resetting both activity and liveness timestamps
    pub async fn set_online(&self, user_id: UserId) {
        let now = Utc::now();
        let record = PresenceRecord {
            status: PresenceStatus::Online,
            last_seen: now,
            last_heartbeat: now,
        };
        debug!(user_id = %user_id, "presence set online");
        self.write(user_id, &record, self.presence_ttl).await;
    }

    /// Mark a user offline, retaining the record for the grace window so
    /// "last seen" stays queryable
    pub async fn set_offline(&self, user_id: UserId) {
        let now = Utc::now();
        let last_seen = match self.get(user_id).await {
            Some(record) => record.last_seen,
            None => now,
        };
        let record = PresenceRecord {
            status: PresenceStatus::Offline,
            last_seen,
            last_heartbeat: now,
        };
        debug!(user_id = %user_id, "presence set offline");
        self.write(user_id, &record, self.offline_grace).await;
    }

    /// Refresh liveness. Does not count as activity, so an idle user keeps
    /// heartbeating toward AWAY. Behaves as `set_online` when no record
    /// exists or the user was marked offline, and reports that revival so
    /// callers can broadcast it.
    pub async fn heartbeat(&self, user_id: UserId) -> Option<PresenceTransition> {
        let now = Utc::now();
        let (record, revived) = match self.get(user_id).await {
            Some(mut record) => {
                record.last_heartbeat = now;
                let revived = record.status == PresenceStatus::Offline;
                if revived {
                    record.status = PresenceStatus::Online;
                    record.last_seen = now;
                }
                (record, revived)
            }
            None => (
                PresenceRecord {
                    status: PresenceStatus::Online,
                    last_seen: now,
                    last_heartbeat: now,
                },
                true,
            ),
        };
        self.write(user_id, &record, self.presence_ttl).await;
        revived.then_some(PresenceTransition {
            user_id,
            status: PresenceStatus::Online,
        })
    }

    /// Record user activity; promotes AWAY (or a lingering OFFLINE record)
    /// back to ONLINE and reports the transition when one happened
    pub async fn touch(&self, user_id: UserId) -> Option<PresenceTransition> {
        let now = Utc::now();
        let (record, promoted) = match self.get(user_id).await {
            Some(mut record) => {
                let promoted = record.status != PresenceStatus::Online;
                record.status = PresenceStatus::Online;
                record.last_seen = now;
                record.last_heartbeat = now;
                (record, promoted)
            }
            None => (
                PresenceRecord {
                    status: PresenceStatus::Online,
                    last_seen: now,
                    last_heartbeat: now,
                },
                true,
            ),
        };
        self.write(user_id, &record, self.presence_ttl).await;
        promoted.then_some(PresenceTransition {
            user_id,
            status: PresenceStatus::Online,
        })
    }

    /// Current record, `None` when unknown or the store is unreachable
    pub async fn get(&self, user_id: UserId) -> Option<PresenceRecord> {
        match self.store.get(&presence_key(user_id)).await {
            Ok(Some(payload)) => match serde_json::from_str(&payload) {
                Ok(record) => Some(record),
                Err(error) => {
                    warn!(user_id = %user_id, %error, "malformed presence record, treating as offline");
                    None
                }
            },
            Ok(None) => None,
            Err(error) => {
                warn!(user_id = %user_id, %error, "presence read failed, treating as offline");
                None
            }
        }
    }

    /// Status convenience over [`get`](Self::get); unknown users are OFFLINE
    pub async fn status(&self, user_id: UserId) -> PresenceStatus {
        match self.get(user_id).await {
            Some(record) => record.status,
            None => PresenceStatus::Offline,
        }
    }

    /// Records for many users in one store round trip. Users without a
    /// record are absent from the map.
    pub async fn get_bulk(&self, user_ids: &[UserId]) -> HashMap<UserId, PresenceRecord> {
        let keys: Vec<String> = user_ids.iter().map(|id| presence_key(*id)).collect();
        let values = match self.store.get_many(&keys).await {
            Ok(values) => values,
            Err(error) => {
                warn!(%error, "bulk presence read failed, treating all as offline");
                return HashMap::new();
            }
        };
        let mut records = HashMap::new();
        for (user_id, value) in user_ids.iter().zip(values) {
            if let Some(payload) = value {
                match serde_json::from_str(&payload) {
                    Ok(record) => {
                        records.insert(*user_id, record);
                    }
                    Err(error) => {
                        warn!(user_id = %user_id, %error, "malformed presence record skipped");
                    }
                }
            }
        }
        records
    }

    /// Number of users currently ONLINE (AWAY not included)
    pub async fn count_online(&self) -> usize {
        self.scan_records()
            .await
            .into_iter()
            .filter(|(_, record)| record.status == PresenceStatus::Online)
            .count()
    }

    /// Demote stale records: users whose heartbeats stopped go OFFLINE, and
    /// alive but idle users go AWAY. Returns the transitions so callers can
    /// broadcast them.
    pub async fn sweep_stale(&self) -> Vec<PresenceTransition> {
        let mut transitions = Vec::new();
        for (user_id, record) in self.scan_records().await {
            let now = Utc::now();
            match record.status {
                PresenceStatus::Online | PresenceStatus::Away
                    if elapsed_since(now, record.last_heartbeat) > self.heartbeat_timeout =>
                {
                    let demoted = PresenceRecord {
                        status: PresenceStatus::Offline,
                        ..record
                    };
                    self.write(user_id, &demoted, self.offline_grace).await;
                    transitions.push(PresenceTransition {
                        user_id,
                        status: PresenceStatus::Offline,
                    });
                }
                PresenceStatus::Online
                    if elapsed_since(now, record.last_seen) > self.away_timeout =>
                {
                    let demoted = PresenceRecord {
                        status: PresenceStatus::Away,
                        ..record
                    };
                    self.write(user_id, &demoted, self.presence_ttl).await;
                    transitions.push(PresenceTransition {
                        user_id,
                        status: PresenceStatus::Away,
                    });
                }
                _ => {}
            }
        }
        transitions
    }

    /// Delete records whose last activity predates the retention window;
    /// returns how many were deleted. TTLs make this a backstop for records
    /// written without one.
    pub async fn purge_stale(&self) -> usize {
        let now = Utc::now();
        let mut purged = 0;
        for (user_id, record) in self.scan_records().await {
            if elapsed_since(now, record.last_seen) > self.retention {
                if let Err(error) = self.store.delete(&presence_key(user_id)).await {
                    warn!(user_id = %user_id, %error, "presence purge failed");
                } else {
                    purged += 1;
                }
            }
        }
        purged
    }

    async fn scan_records(&self) -> Vec<(UserId, PresenceRecord)> {
        let keys = match self.store.scan_keys("presence:*").await {
            Ok(keys) => keys,
            Err(error) => {
                warn!(%error, "presence scan failed");
                return Vec::new();
            }
        };
        let values = match self.store.get_many(&keys).await {
            Ok(values) => values,
            Err(error) => {
                warn!(%error, "presence bulk read failed");
                return Vec::new();
            }
        };
        keys.iter()
            .zip(values)
            .filter_map(|(key, value)| {
                let user_id = user_from_key(key)?;
                let record = serde_json::from_str(&value?).ok()?;
                Some((user_id, record))
            })
            .collect()
    }

    async fn write(&self, user_id: UserId, record: &PresenceRecord, ttl: Duration) {
        let payload = match serde_json::to_string(record) {
            Ok(payload) => payload,
            Err(error) => {
                warn!(user_id = %user_id, %error, "presence record serialization failed");
                return;
            }
        };
        if let Err(error) = self
            .store
            .put(&presence_key(user_id), &payload, Some(ttl))
            .await
        {
            warn!(user_id = %user_id, %error, "presence write failed, dropping update");
        }
    }
}
