//! Per-game event bus for spectators.
//!
//! Observers register for a bounded stream of `GameEvent`s. Publishing is
//! non-blocking: every publish stamps a monotonically increasing tick and
//! `try_send`s to each subscriber, so a slow spectator drops events instead
//! of stalling the game. Gaps are detectable from the tick sequence.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::engine::types::{Color, GameStatus, Move, Winner};

/// Buffered events per observer; laggards lose the oldest unread ticks.
const OBSERVER_BUFFER: usize = 5;

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GameEventType {
    GameStarted,
    GameStopped,
    MoveMade,
    TimeUpdated,
    GameEnded,
}

/// A snapshot pushed to spectators on every observable game transition.
#[derive(Clone, Debug)]
pub struct GameEvent {
    pub event_type: GameEventType,
    /// Monotonic publish counter for this game.
    pub tick: u64,

    pub mv: Option<Move>,
    pub move_color: Option<Color>,

    pub white_remaining: Duration,
    pub black_remaining: Duration,

    pub status: GameStatus,
    pub winner: Winner,

    pub timestamp: DateTime<Utc>,
}

impl GameEvent {
    pub fn new(event_type: GameEventType) -> Self {
        GameEvent {
            event_type,
            tick: 0,
            mv: None,
            move_color: None,
            white_remaining: Duration::ZERO,
            black_remaining: Duration::ZERO,
            status: GameStatus::Ongoing,
            winner: Winner::None,
            timestamp: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Observer registry
// ---------------------------------------------------------------------------

/// Registration handle; pass back to `unregister`.
pub type ObserverId = u64;

#[derive(Default)]
pub struct GameObserver {
    inner: Mutex<ObserverInner>,
}

#[derive(Default)]
struct ObserverInner {
    next_id: ObserverId,
    tick: u64,
    subscribers: HashMap<ObserverId, mpsc::Sender<GameEvent>>,
}

impl GameObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a spectator; returns the id (for unregistering) and the
    /// event stream.
    pub fn register(&self) -> (ObserverId, mpsc::Receiver<GameEvent>) {
        let mut inner = self.inner.lock().expect("observer lock");
        inner.next_id += 1;
        let id = inner.next_id;
        let (tx, rx) = mpsc::channel(OBSERVER_BUFFER);
        inner.subscribers.insert(id, tx);
        (id, rx)
    }

    /// Remove a spectator; the stream closes.
    pub fn unregister(&self, id: ObserverId) {
        let mut inner = self.inner.lock().expect("observer lock");
        inner.subscribers.remove(&id);
    }

    /// Stamp the next tick on `event` and fan it out. Full buffers drop the
    /// event for that observer; closed receivers are pruned.
    pub fn publish(&self, mut event: GameEvent) {
        let mut inner = self.inner.lock().expect("observer lock");
        inner.tick += 1;
        event.tick = inner.tick;

        inner.subscribers.retain(|_, tx| {
            match tx.try_send(event.clone()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => true, // laggard: drop
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            }
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().expect("observer lock").subscribers.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
