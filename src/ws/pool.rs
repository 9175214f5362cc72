//! Pool for broadcast snapshot buffers.
//!
//! Every room broadcast copies the membership into a slice so the room lock
//! is released before fan-out; pooling those slices keeps the hot path free
//! of per-broadcast allocations. Buffers are cleared both on acquire and on
//! release so no connection handle outlives its broadcast.

use std::sync::{Arc, Mutex};

use crate::ws::connection::Connection;

/// Capacity for freshly allocated snapshot buffers.
const DEFAULT_SNAPSHOT_CAPACITY: usize = 16;
/// Retained buffers beyond this are dropped instead of pooled.
const MAX_POOLED: usize = 64;

pub(crate) struct SnapshotPool {
    buffers: Mutex<Vec<Vec<Arc<Connection>>>>,
}

static POOL: SnapshotPool = SnapshotPool {
    buffers: Mutex::new(Vec::new()),
};

pub(crate) fn acquire() -> Vec<Arc<Connection>> {
    let mut buffers = POOL.buffers.lock().expect("snapshot pool lock");
    match buffers.pop() {
        Some(mut buffer) => {
            buffer.clear();
            buffer
        }
        None => Vec::with_capacity(DEFAULT_SNAPSHOT_CAPACITY),
    }
}

pub(crate) fn release(mut buffer: Vec<Arc<Connection>>) {
    buffer.clear();
    let mut buffers = POOL.buffers.lock().expect("snapshot pool lock");
    if buffers.len() < MAX_POOLED {
        buffers.push(buffer);
    }
}
