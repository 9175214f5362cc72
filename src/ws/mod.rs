//! Realtime websocket fabric.
//!
//! - [`connection`]: per-connection state, K/V store, rate limiter, emit.
//! - [`room`] / [`hub`]: membership indices and broadcast emitters.
//! - [`events`] / [`context`]: handler registry and per-event context.
//! - [`handler`]: upgrade path, middleware chain, read loop, keepalive.
//! - [`messages`]: the `{event, payload}` JSON wire frames.
//!
//! Event names are opaque here; the application registers handlers for them.

pub mod connection;
pub mod context;
pub mod errors;
pub mod events;
pub mod handler;
pub mod hub;
pub mod limiter;
pub mod messages;
mod pool;
pub mod room;

pub use connection::{ConnId, Connection};
pub use context::EventContext;
pub use errors::{BroadcastError, ConnError, ConnErrors};
pub use events::EventRegistry;
pub use handler::{UpgradeRequest, WsHandler};
pub use hub::Hub;
pub use room::{Room, RoomEmitter};
