//! Per-event context handed to handlers.
//!
//! Wraps the connection and the hub with room and emit helpers, plus typed
//! payload binding. Contexts are plain values constructed per dispatched
//! event; everything shared sits behind the contained `Arc`s.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use serde_json::value::RawValue;

use crate::ws::connection::{ConnId, Connection};
use crate::ws::errors::ConnError;
use crate::ws::hub::Hub;
use crate::ws::room::RoomEmitter;

pub struct EventContext {
    pub conn: Arc<Connection>,
    pub hub: Arc<Hub>,
    /// Raw JSON payload of the triggering frame, if any.
    pub payload: Option<Box<RawValue>>,
}

impl EventContext {
    // -----------------------------------------------------------------
    // Payload
    // -----------------------------------------------------------------

    /// Deserialize the payload into `T`. A missing payload binds as JSON
    /// `null`.
    pub fn bind<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        match &self.payload {
            Some(raw) => serde_json::from_str(raw.get()),
            None => serde_json::from_str("null"),
        }
    }

    // -----------------------------------------------------------------
    // Rooms
    // -----------------------------------------------------------------

    /// Join this connection to the named room.
    pub fn join(&self, room: &str) {
        self.hub.join_room(room, &self.conn);
    }

    /// Leave the named room.
    pub fn leave(&self, room: &str) {
        self.hub.leave_room(room, &self.conn);
    }

    /// Leave every joined room.
    pub fn leave_all(&self) {
        self.hub.leave_all_rooms(&self.conn);
    }

    /// Broadcast emitter over the named room.
    pub fn to_room(&self, room: &str) -> RoomEmitter {
        self.hub.to_room(room)
    }

    /// Broadcast emitter over the named room, excluding this connection.
    pub fn to_room_omit(&self, room: &str) -> RoomEmitter {
        self.hub.to_room_omit(room, &self.conn)
    }

    // -----------------------------------------------------------------
    // Emit / close
    // -----------------------------------------------------------------

    /// Send an event frame to this connection.
    pub async fn emit<P: Serialize>(&self, event: &str, payload: &P) -> Result<(), ConnError> {
        self.conn.emit(event, payload).await
    }

    /// Send a standard error event to this connection.
    pub async fn error(&self, message: &str) -> Result<(), ConnError> {
        self.emit("error", &serde_json::json!({ "message": message }))
            .await
    }

    /// Send an error event, then close the connection.
    pub async fn close_with_error(&self, message: &str) -> Result<(), ConnError> {
        self.error(message).await?;
        self.conn.close();
        Ok(())
    }

    /// Close the connection.
    pub fn close(&self) {
        self.conn.close();
    }

    // -----------------------------------------------------------------
    // Connection passthrough
    // -----------------------------------------------------------------

    pub fn id(&self) -> ConnId {
        self.conn.id()
    }

    pub fn set(&self, key: &str, value: Value) {
        self.conn.set(key, value);
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.conn.get(key)
    }

    pub fn get_or_set(&self, key: &str, value: Value) -> (Value, bool) {
        self.conn.get_or_set(key, value)
    }

    pub fn delete(&self, key: &str) {
        self.conn.delete(key);
    }
}
