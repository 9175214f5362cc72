//! Per-connection state: identity, outbound channel, K/V store, joined
//! rooms, rate limiter.
//!
//! Writing happens through a bounded outbound channel owned by the
//! connection's writer task; any task may therefore emit concurrently, and a
//! send on a closed channel is the "connection closed" error that triggers
//! room eviction.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{Notify, mpsc};
use tokio::time::Instant;
use uuid::Uuid;

use crate::ws::errors::ConnError;
use crate::ws::limiter::RateLimiter;
use crate::ws::messages;

/// Unique identifier of a connection.
pub type ConnId = Uuid;

/// Default token-bucket limits for inbound frames.
const DEFAULT_RATE: f64 = 5.0;
const DEFAULT_BURST: u32 = 10;

/// Frames queued for the connection's writer task.
#[derive(Debug)]
pub(crate) enum OutboundFrame {
    Text(String),
    Ping(Vec<u8>),
    Close,
}

pub struct Connection {
    id: ConnId,
    outbound: mpsc::Sender<OutboundFrame>,

    /// Connection-scoped key/value store for application data.
    store: RwLock<HashMap<String, Value>>,

    /// Names of rooms this connection is a member of; mirrors the hub's
    /// room→conns index.
    rooms: Mutex<HashSet<String>>,

    limiter: RateLimiter,

    closed: AtomicBool,
    closed_notify: Notify,

    last_pong: Mutex<Instant>,
}

impl Connection {
    pub(crate) fn new(id: ConnId, outbound: mpsc::Sender<OutboundFrame>) -> Arc<Self> {
        Arc::new(Connection {
            id,
            outbound,
            store: RwLock::new(HashMap::new()),
            rooms: Mutex::new(HashSet::new()),
            limiter: RateLimiter::new(DEFAULT_RATE, DEFAULT_BURST),
            closed: AtomicBool::new(false),
            closed_notify: Notify::new(),
            last_pong: Mutex::new(Instant::now()),
        })
    }

    #[inline]
    pub fn id(&self) -> ConnId {
        self.id
    }

    // -----------------------------------------------------------------
    // Emit
    // -----------------------------------------------------------------

    /// Serialize `{event, payload}` and queue it as one text frame.
    pub async fn emit<P: Serialize>(&self, event: &str, payload: &P) -> Result<(), ConnError> {
        let text = messages::encode(event, payload)
            .map_err(|e| ConnError::other(self.id, "encode", e.to_string()))?;
        self.send_text(text).await
    }

    pub(crate) async fn send_text(&self, text: String) -> Result<(), ConnError> {
        self.outbound
            .send(OutboundFrame::Text(text))
            .await
            .map_err(|_| ConnError::closed(self.id, "write"))
    }

    pub(crate) async fn send_ping(&self) -> Result<(), ConnError> {
        self.outbound
            .send(OutboundFrame::Ping(Vec::new()))
            .await
            .map_err(|_| ConnError::closed(self.id, "ping"))
    }

    // -----------------------------------------------------------------
    // Close
    // -----------------------------------------------------------------

    /// Mark the connection closed and wake the read loop. Queues a close
    /// frame best-effort.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.outbound.try_send(OutboundFrame::Close);
            self.closed_notify.notify_waiters();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Resolves once `close` has been called.
    pub(crate) async fn wait_closed(&self) {
        let notified = self.closed_notify.notified();
        if self.is_closed() {
            return;
        }
        notified.await;
    }

    // -----------------------------------------------------------------
    // K/V store
    // -----------------------------------------------------------------

    pub fn set(&self, key: &str, value: Value) {
        self.store
            .write()
            .expect("store lock")
            .insert(key.to_string(), value);
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.store.read().expect("store lock").get(key).cloned()
    }

    /// Return the existing value for `key`, or store and return `value`.
    /// The boolean is true when the value was already present.
    pub fn get_or_set(&self, key: &str, value: Value) -> (Value, bool) {
        let mut store = self.store.write().expect("store lock");
        match store.get(key) {
            Some(existing) => (existing.clone(), true),
            None => {
                store.insert(key.to_string(), value.clone());
                (value, false)
            }
        }
    }

    pub fn delete(&self, key: &str) {
        self.store.write().expect("store lock").remove(key);
    }

    /// Snapshot of all stored entries.
    pub fn entries(&self) -> Vec<(String, Value)> {
        self.store
            .read()
            .expect("store lock")
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    // -----------------------------------------------------------------
    // Room bookkeeping (maintained by the hub)
    // -----------------------------------------------------------------

    pub(crate) fn add_joined_room(&self, name: &str) {
        self.rooms
            .lock()
            .expect("rooms lock")
            .insert(name.to_string());
    }

    pub(crate) fn remove_joined_room(&self, name: &str) {
        self.rooms.lock().expect("rooms lock").remove(name);
    }

    pub fn is_in_room(&self, name: &str) -> bool {
        self.rooms.lock().expect("rooms lock").contains(name)
    }

    pub fn joined_rooms(&self) -> Vec<String> {
        self.rooms.lock().expect("rooms lock").iter().cloned().collect()
    }

    // -----------------------------------------------------------------
    // Rate limiting
    // -----------------------------------------------------------------

    /// Take one token from the inbound rate limiter.
    pub fn allow(&self) -> bool {
        self.limiter.allow()
    }

    pub fn set_limit(&self, rate: f64, burst: u32) {
        self.limiter.set_limit(rate, burst);
    }

    pub fn limit(&self) -> (f64, u32) {
        self.limiter.limit()
    }

    // -----------------------------------------------------------------
    // Keepalive bookkeeping
    // -----------------------------------------------------------------

    pub(crate) fn record_pong(&self) {
        *self.last_pong.lock().expect("pong lock") = Instant::now();
    }

    pub(crate) fn last_pong(&self) -> Instant {
        *self.last_pong.lock().expect("pong lock")
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}
