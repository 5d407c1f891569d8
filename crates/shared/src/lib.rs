//! Parley Shared Types and Ephemeral Store
//!
//! This crate contains ID types, presence status, and the ephemeral store
//! shared across the Parley realtime platform.

pub mod error;
pub mod store;
pub mod types;

pub use error::*;
pub use store::{EphemeralStore, MemoryStore, RedisStore};
pub use types::*;
