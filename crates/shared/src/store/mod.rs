//! Ephemeral key-value store
//!
//! A small set of atomic primitives the coordination trackers are written
//! against: plain string values with optional TTL, atomic integer counters,
//! score-ordered member collections, and unordered sets. `RedisStore` maps
//! each operation onto a single Redis command; `MemoryStore` provides the
//! same semantics in-process for tests and single-node deployments.

mod memory;
mod redis;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreError;

/// Atomic ephemeral storage primitives
///
/// Every method is a single atomic operation at the backend. A `ttl` of
/// `None` on `put` stores the value without expiry; on `counter_incr` and
/// `ordered_add` it leaves any existing key expiry untouched, while `Some`
/// refreshes it.
#[async_trait]
pub trait EphemeralStore: Send + Sync {
    /// Store a string value, replacing any previous value and expiry
    async fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Fetch a string value, `None` if absent or expired
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Fetch many values in one round trip, position-aligned with `keys`
    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>, StoreError>;

    /// Remove a key of any kind
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// All live keys matching a `*` glob pattern
    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>, StoreError>;

    /// Atomically add `delta` (may be negative) to an integer counter,
    /// creating it at zero, and return the new value
    async fn counter_incr(
        &self,
        key: &str,
        delta: i64,
        ttl: Option<Duration>,
    ) -> Result<i64, StoreError>;

    /// Insert or rescore a member in a score-ordered collection
    async fn ordered_add(
        &self,
        key: &str,
        member: &str,
        score: f64,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError>;

    /// Members with scores, ascending by score, over the inclusive index
    /// range `start..=stop` (negative indices count from the end, `-1`
    /// being the last member)
    async fn ordered_range(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<(String, f64)>, StoreError>;

    /// Remove one member; returns whether it was present
    async fn ordered_remove(&self, key: &str, member: &str) -> Result<bool, StoreError>;

    /// Remove all members with score `<= cutoff`; returns how many
    async fn ordered_remove_below(&self, key: &str, cutoff: f64) -> Result<u64, StoreError>;

    /// Add a member to an unordered set
    async fn set_add(&self, key: &str, member: &str) -> Result<(), StoreError>;

    /// Remove a member from an unordered set
    async fn set_remove(&self, key: &str, member: &str) -> Result<(), StoreError>;

    /// All members of an unordered set
    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError>;
}
