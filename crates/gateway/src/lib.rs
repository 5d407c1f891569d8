//! Parley WebSocket Gateway
//!
//! The transport edge of the realtime layer: an axum WebSocket endpoint,
//! per-session connection state, room-based fan-out, and the
//! [`ConnectionHub`] that dispatches client frames into the trackers in
//! `parley-realtime`. The durable layer calls back into the hub to push
//! persisted messages and conversation updates to connected clients.

pub mod connection;
pub mod events;
pub mod handler;
pub mod hub;
pub mod room;
pub mod state;

pub use connection::Connection;
pub use events::{ClientEvent, PresenceEntry, ServerEvent};
pub use handler::{router, ws_handler};
pub use hub::ConnectionHub;
pub use room::{RoomId, RoomManager};
pub use state::{GatewayState, GatewayStats};
