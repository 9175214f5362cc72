//! Hub: the two indices of the realtime fabric.
//!
//! Connections by id and rooms by name live under independent read/write
//! locks. Rooms are created lazily on first join and deleted when their last
//! member leaves. The hub keeps the bidirectional invariant: a connection's
//! joined-rooms set always mirrors the room→conns index.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::ws::connection::{ConnId, Connection};
use crate::ws::room::{Room, RoomEmitter};

#[derive(Default)]
pub struct Hub {
    conns: RwLock<HashMap<ConnId, Arc<Connection>>>,
    rooms: RwLock<HashMap<String, Arc<Room>>>,
}

impl Hub {
    pub fn new() -> Arc<Self> {
        Arc::new(Hub::default())
    }

    // -----------------------------------------------------------------
    // Connection index
    // -----------------------------------------------------------------

    pub fn add_conn(&self, conn: Arc<Connection>) {
        self.conns.write().expect("conns lock").insert(conn.id(), conn);
    }

    /// Remove a connection, leaving all its rooms first.
    pub fn remove_conn(&self, conn: &Arc<Connection>) {
        self.leave_all_rooms(conn);
        self.conns.write().expect("conns lock").remove(&conn.id());
    }

    pub fn get_conn(&self, id: ConnId) -> Option<Arc<Connection>> {
        self.conns.read().expect("conns lock").get(&id).cloned()
    }

    pub fn conn_count(&self) -> usize {
        self.conns.read().expect("conns lock").len()
    }

    // -----------------------------------------------------------------
    // Room index
    // -----------------------------------------------------------------

    pub fn join_room(&self, name: &str, conn: &Arc<Connection>) {
        let mut rooms = self.rooms.write().expect("rooms lock");
        let room = rooms
            .entry(name.to_string())
            .or_insert_with(Room::new);
        room.add(Arc::clone(conn));
        conn.add_joined_room(name);
    }

    pub fn leave_room(&self, name: &str, conn: &Arc<Connection>) {
        let mut rooms = self.rooms.write().expect("rooms lock");
        if let Some(room) = rooms.get(name) {
            room.remove(conn.id());
            if room.is_empty() {
                rooms.remove(name);
            }
        }
        conn.remove_joined_room(name);
    }

    pub fn leave_all_rooms(&self, conn: &Arc<Connection>) {
        for name in conn.joined_rooms() {
            self.leave_room(&name, conn);
        }
    }

    pub fn room_size(&self, name: &str) -> usize {
        self.rooms
            .read()
            .expect("rooms lock")
            .get(name)
            .map_or(0, |room| room.len())
    }

    pub fn room_count(&self) -> usize {
        self.rooms.read().expect("rooms lock").len()
    }

    // -----------------------------------------------------------------
    // Emitters
    // -----------------------------------------------------------------

    /// Broadcast emitter over a room's current membership; a missing room
    /// yields a no-op emitter.
    pub fn to_room(&self, name: &str) -> RoomEmitter {
        let room = self.rooms.read().expect("rooms lock").get(name).cloned();
        RoomEmitter::new(room)
    }

    /// Like `to_room` but excluding one connection (typically the sender).
    pub fn to_room_omit(&self, name: &str, conn: &Arc<Connection>) -> RoomEmitter {
        let room = self.rooms.read().expect("rooms lock").get(name).cloned();
        RoomEmitter::omitting(room, conn.id())
    }
}
