//! Parley Realtime Coordination
//!
//! The ephemeral, time-bounded side of the chat platform: presence, typing
//! indicators, read receipts, offline delivery queues, and load-based agent
//! routing gated by business hours. Durable storage, authentication, and
//! profile lookup are reached through the collaborator traits in
//! [`collaborators`]; all tracker state lives in a
//! [`parley_shared::EphemeralStore`].

pub mod collaborators;
pub mod config;
pub mod error;
pub mod offline_queue;
pub mod presence;
pub mod receipts;
pub mod routing;
pub mod sweep;
pub mod typing;

#[cfg(test)]
pub(crate) mod testutil;

pub use config::{ConfigError, RealtimeConfig};
pub use error::RealtimeError;
pub use offline_queue::{OfflineMessageQueue, QueuedMessage};
pub use presence::{PresenceRecord, PresenceTracker, PresenceTransition};
pub use receipts::{ReadPointer, ReadReceiptTracker, ReadReceipts};
pub use routing::{AgentRouter, BusinessHoursGate};
pub use sweep::{PresenceListener, Sweeper, SweeperHandle};
pub use typing::TypingTracker;
