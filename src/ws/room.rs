//! Rooms and their broadcast emitters.
//!
//! A room is a set of connections keyed by id. Broadcasts snapshot the
//! membership under the room lock into a pooled buffer, release the lock,
//! then fan out with one task per recipient, so a slow or dead peer never
//! blocks the room. Write failures are collected into a multi-error;
//! closed connections are evicted from the room on the spot.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::Serialize;
use tokio::task::JoinSet;

use crate::ws::connection::{ConnId, Connection};
use crate::ws::errors::{BroadcastError, ConnErrors};
use crate::ws::messages;
use crate::ws::pool;

// ---------------------------------------------------------------------------
// Room
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct Room {
    conns: RwLock<HashMap<ConnId, Arc<Connection>>>,
}

impl Room {
    pub fn new() -> Arc<Self> {
        Arc::new(Room::default())
    }

    pub fn add(&self, conn: Arc<Connection>) {
        self.conns.write().expect("room lock").insert(conn.id(), conn);
    }

    pub fn remove(&self, id: ConnId) {
        self.conns.write().expect("room lock").remove(&id);
    }

    pub fn contains(&self, id: ConnId) -> bool {
        self.conns.read().expect("room lock").contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.conns.read().expect("room lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.conns.read().expect("room lock").is_empty()
    }

    /// Copy the membership into `buffer`, skipping `omit` if given.
    fn snapshot_into(&self, buffer: &mut Vec<Arc<Connection>>, omit: Option<ConnId>) {
        let conns = self.conns.read().expect("room lock");
        buffer.reserve(conns.len());
        for (id, conn) in conns.iter() {
            if Some(*id) != omit {
                buffer.push(Arc::clone(conn));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// RoomEmitter
// ---------------------------------------------------------------------------

/// Broadcast handle over a room's current membership, optionally excluding
/// one sender. A missing room yields a no-op emitter.
pub struct RoomEmitter {
    room: Option<Arc<Room>>,
    omit: Option<ConnId>,
}

impl RoomEmitter {
    pub(crate) fn new(room: Option<Arc<Room>>) -> Self {
        RoomEmitter { room, omit: None }
    }

    pub(crate) fn omitting(room: Option<Arc<Room>>, omit: ConnId) -> Self {
        RoomEmitter {
            room,
            omit: Some(omit),
        }
    }

    /// Serialize once and fan the frame out to every recipient
    /// concurrently. Returns all per-connection failures; a broadcast never
    /// aborts because one peer failed.
    pub async fn emit<P: Serialize>(&self, event: &str, payload: &P) -> Result<(), BroadcastError> {
        let Some(room) = &self.room else {
            return Ok(());
        };

        let text = messages::encode(event, payload)?;

        let mut snapshot = pool::acquire();
        room.snapshot_into(&mut snapshot, self.omit);

        let mut writes = JoinSet::new();
        for conn in snapshot.drain(..) {
            let text = text.clone();
            let room = Arc::clone(room);
            writes.spawn(async move {
                match conn.send_text(text).await {
                    Ok(()) => None,
                    Err(err) => {
                        if err.is_closed() {
                            // Dead peer: drop it from the room so later
                            // broadcasts skip it.
                            room.remove(conn.id());
                        }
                        Some(err)
                    }
                }
            });
        }
        pool::release(snapshot);

        let mut errs = ConnErrors::default();
        while let Some(joined) = writes.join_next().await {
            if let Ok(Some(err)) = joined {
                errs.push(err);
            }
        }

        if errs.is_empty() {
            Ok(())
        } else {
            tracing::warn!(%errs, "room broadcast completed with failures");
            Err(BroadcastError::Conns(errs))
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::connection::OutboundFrame;
    use serde_json::{Value, json};
    use tokio::sync::mpsc;
    use uuid::Uuid;

    fn conn_pair() -> (Arc<Connection>, mpsc::Receiver<OutboundFrame>) {
        let (tx, rx) = mpsc::channel(16);
        (Connection::new(Uuid::new_v4(), tx), rx)
    }

    async fn next_event(rx: &mut mpsc::Receiver<OutboundFrame>) -> Value {
        match rx.recv().await.expect("frame") {
            OutboundFrame::Text(text) => serde_json::from_str(&text).unwrap(),
            other => panic!("expected text, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn membership_tracking() {
        let room = Room::new();
        let (a, _rx_a) = conn_pair();
        assert!(room.is_empty());

        room.add(a.clone());
        assert_eq!(room.len(), 1);
        assert!(room.contains(a.id()));

        room.remove(a.id());
        assert!(room.is_empty());
    }

    #[tokio::test]
    async fn emit_reaches_all_members() {
        let room = Room::new();
        let (a, mut rx_a) = conn_pair();
        let (b, mut rx_b) = conn_pair();
        room.add(a);
        room.add(b);

        let emitter = RoomEmitter::new(Some(room));
        emitter.emit("news", &json!({"n": 7})).await.unwrap();

        for rx in [&mut rx_a, &mut rx_b] {
            let frame = next_event(rx).await;
            assert_eq!(frame["event"], "news");
            assert_eq!(frame["payload"]["n"], 7);
        }
    }

    #[tokio::test]
    async fn omit_skips_the_sender() {
        let room = Room::new();
        let (sender, mut rx_sender) = conn_pair();
        let (other, mut rx_other) = conn_pair();
        room.add(sender.clone());
        room.add(other);

        let emitter = RoomEmitter::omitting(Some(room), sender.id());
        emitter.emit("chat", &json!("hi")).await.unwrap();

        assert_eq!(next_event(&mut rx_other).await["event"], "chat");
        assert!(rx_sender.try_recv().is_err(), "sender must not receive");
    }

    #[tokio::test]
    async fn missing_room_is_noop() {
        let emitter = RoomEmitter::new(None);
        emitter.emit("anything", &json!(null)).await.unwrap();
    }

    #[tokio::test]
    async fn closed_peer_evicted_and_error_reported() {
        let room = Room::new();
        let (alive, mut rx_alive) = conn_pair();
        let (dead, rx_dead) = conn_pair();
        drop(rx_dead); // peer's writer is gone
        let dead_id = dead.id();
        room.add(alive);
        room.add(dead);

        let emitter = RoomEmitter::new(Some(room.clone()));
        let err = emitter.emit("tick", &json!(1)).await.unwrap_err();

        match err {
            BroadcastError::Conns(errs) => {
                assert_eq!(errs.len(), 1);
                assert_eq!(errs.0[0].conn_id, dead_id);
                assert!(errs.0[0].is_closed());
            }
            other => panic!("expected conn errors, got {other}"),
        }

        // The live peer still got the frame; the dead one left the room.
        assert_eq!(next_event(&mut rx_alive).await["event"], "tick");
        assert!(!room.contains(dead_id));
        assert_eq!(room.len(), 1);
    }
}
