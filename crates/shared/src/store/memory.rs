//! In-memory store backend with TTL
//!
//! Mirrors the Redis-backed semantics in-process. Expiry is lazy: expired
//! entries are dropped when touched, with `purge_expired` available for
//! periodic cleanup.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::store::EphemeralStore;

#[derive(Clone)]
enum StoredValue {
    Text(String),
    Counter(i64),
    Ordered(HashMap<String, f64>),
    Set(HashSet<String>),
}

/// Entry with expiration
#[derive(Clone)]
struct StoreEntry {
    value: StoredValue,
    expires_at: Option<Instant>,
}

impl StoreEntry {
    fn new(value: StoredValue, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() > at)
    }
}

/// Thread-safe in-memory ephemeral store
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, StoreEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Drop expired entries (call periodically for memory management)
    pub async fn purge_expired(&self) {
        let mut entries = self.entries.write().await;
        entries.retain(|_, entry| !entry.is_expired());
    }

    /// Number of live entries
    pub async fn len(&self) -> usize {
        let entries = self.entries.read().await;
        entries.values().filter(|entry| !entry.is_expired()).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl EphemeralStore for MemoryStore {
    async fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            StoreEntry::new(StoredValue::Text(value.to_string()), ttl),
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(entry) if !entry.is_expired() => match &entry.value {
                StoredValue::Text(text) => Ok(Some(text.clone())),
                StoredValue::Counter(n) => Ok(Some(n.to_string())),
                _ => Err(StoreError::WrongType(key.to_string())),
            },
            _ => Ok(None),
        }
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>, StoreError> {
        let entries = self.entries.read().await;
        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            let value = match entries.get(key) {
                Some(entry) if !entry.is_expired() => match &entry.value {
                    StoredValue::Text(text) => Some(text.clone()),
                    StoredValue::Counter(n) => Some(n.to_string()),
                    _ => return Err(StoreError::WrongType(key.clone())),
                },
                _ => None,
            };
            values.push(value);
        }
        Ok(values)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        entries.remove(key);
        Ok(())
    }

    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|(_, entry)| !entry.is_expired())
            .map(|(key, _)| key)
            .filter(|key| glob_match(pattern, key))
            .cloned()
            .collect())
    }

    async fn counter_incr(
        &self,
        key: &str,
        delta: i64,
        ttl: Option<Duration>,
    ) -> Result<i64, StoreError> {
        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(StoreEntry::is_expired) {
            entries.remove(key);
        }
        let current = match entries.get(key) {
            Some(entry) => match &entry.value {
                StoredValue::Counter(n) => *n,
                StoredValue::Text(text) => text
                    .parse()
                    .map_err(|_| StoreError::WrongType(key.to_string()))?,
                _ => return Err(StoreError::WrongType(key.to_string())),
            },
            None => 0,
        };
        let next = current + delta;
        let expires_at = match ttl {
            Some(ttl) => Some(Instant::now() + ttl),
            None => entries.get(key).and_then(|entry| entry.expires_at),
        };
        entries.insert(
            key.to_string(),
            StoreEntry {
                value: StoredValue::Counter(next),
                expires_at,
            },
        );
        Ok(next)
    }

    async fn ordered_add(
        &self,
        key: &str,
        member: &str,
        score: f64,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(StoreEntry::is_expired) {
            entries.remove(key);
        }
        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| StoreEntry::new(StoredValue::Ordered(HashMap::new()), None));
        match &mut entry.value {
            StoredValue::Ordered(members) => {
                members.insert(member.to_string(), score);
            }
            _ => return Err(StoreError::WrongType(key.to_string())),
        }
        if let Some(ttl) = ttl {
            entry.expires_at = Some(Instant::now() + ttl);
        }
        Ok(())
    }

    async fn ordered_range(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<(String, f64)>, StoreError> {
        let entries = self.entries.read().await;
        let entry = match entries.get(key) {
            Some(entry) if !entry.is_expired() => entry,
            _ => return Ok(Vec::new()),
        };
        let members = match &entry.value {
            StoredValue::Ordered(members) => members,
            _ => return Err(StoreError::WrongType(key.to_string())),
        };
        let mut sorted: Vec<(String, f64)> = members
            .iter()
            .map(|(member, score)| (member.clone(), *score))
            .collect();
        sorted.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        match clamp_range(start, stop, sorted.len()) {
            Some((start, stop)) => Ok(sorted[start..=stop].to_vec()),
            None => Ok(Vec::new()),
        }
    }

    async fn ordered_remove(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(StoreEntry::is_expired) {
            entries.remove(key);
        }
        let (removed, now_empty) = match entries.get_mut(key) {
            Some(entry) => match &mut entry.value {
                StoredValue::Ordered(members) => {
                    let removed = members.remove(member).is_some();
                    (removed, members.is_empty())
                }
                _ => return Err(StoreError::WrongType(key.to_string())),
            },
            None => (false, false),
        };
        if now_empty {
            entries.remove(key);
        }
        Ok(removed)
    }

    async fn ordered_remove_below(&self, key: &str, cutoff: f64) -> Result<u64, StoreError> {
        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(StoreEntry::is_expired) {
            entries.remove(key);
        }
        let (removed, now_empty) = match entries.get_mut(key) {
            Some(entry) => match &mut entry.value {
                StoredValue::Ordered(members) => {
                    let before = members.len();
                    members.retain(|_, score| *score > cutoff);
                    ((before - members.len()) as u64, members.is_empty())
                }
                _ => return Err(StoreError::WrongType(key.to_string())),
            },
            None => (0, false),
        };
        if now_empty {
            entries.remove(key);
        }
        Ok(removed)
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(StoreEntry::is_expired) {
            entries.remove(key);
        }
        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| StoreEntry::new(StoredValue::Set(HashSet::new()), None));
        match &mut entry.value {
            StoredValue::Set(members) => {
                members.insert(member.to_string());
                Ok(())
            }
            _ => Err(StoreError::WrongType(key.to_string())),
        }
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(StoreEntry::is_expired) {
            entries.remove(key);
        }
        let now_empty = match entries.get_mut(key) {
            Some(entry) => match &mut entry.value {
                StoredValue::Set(members) => {
                    members.remove(member);
                    members.is_empty()
                }
                _ => return Err(StoreError::WrongType(key.to_string())),
            },
            None => false,
        };
        if now_empty {
            entries.remove(key);
        }
        Ok(())
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(entry) if !entry.is_expired() => match &entry.value {
                StoredValue::Set(members) => Ok(members.iter().cloned().collect()),
                _ => Err(StoreError::WrongType(key.to_string())),
            },
            _ => Ok(Vec::new()),
        }
    }
}

/// Normalize a Redis-style inclusive index range against `len`
fn clamp_range(start: isize, stop: isize, len: usize) -> Option<(usize, usize)> {
    if len == 0 {
        return None;
    }
    let len = len as isize;
    let mut start = if start < 0 { start + len } else { start };
    let mut stop = if stop < 0 { stop + len } else { stop };
    if start < 0 {
        start = 0;
    }
    if stop >= len {
        stop = len - 1;
    }
    if stop < 0 || start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize))
}

/// Match a key against a `*` glob pattern (the only wildcard the key
/// namespaces use)
fn glob_match(pattern: &str, text: &str) -> bool {
    let mut segments = pattern.split('*');
    let first = segments.next().unwrap_or(pattern);
    if !text.starts_with(first) {
        return false;
    }
    let mut rest: Vec<&str> = segments.collect();
    let last = match rest.pop() {
        Some(last) => last,
        // No '*' in the pattern: exact match only
        None => return text == first,
    };
    let mut pos = first.len();
    for segment in rest {
        if segment.is_empty() {
            continue;
        }
        match text[pos..].find(segment) {
            Some(found) => pos += found + segment.len(),
            None => return false,
        }
    }
    text.len() >= pos + last.len() && text[pos..].ends_with(last)
}
