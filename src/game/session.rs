//! Authoritative game session: engine + clock + result + one-shot end
//! callback.
//!
//! All state transitions serialize on the session mutex. The clock's timeout
//! callback re-checks `status == Ongoing` under that mutex, so a timeout
//! racing a move in flight resolves to exactly one terminal transition, and
//! the end callback fires exactly once across every path (move→terminal,
//! timeout, resignation, forfeit, draw).

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::engine::board::STARTING_FEN;
use crate::engine::game::GameState;
use crate::engine::types::{ChessError, Color, GameStatus, Move, PieceType, Square, Winner};
use crate::game::clock::{Clock, TimeoutCallback};
use crate::game::modes::GameMode;
use crate::game::observer::{GameEvent, GameEventType, GameObserver, ObserverId};

/// A move arriving with less than this on the mover's clock is refused; the
/// armed timeout wins the race instead.
const MOVE_SAFETY_THRESHOLD: Duration = Duration::from_millis(30);

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Session-level failures; engine rule violations pass through unchanged.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Engine(#[from] ChessError),

    #[error("the game has not started")]
    GameNotStarted,

    #[error("the game is paused")]
    GamePaused,

    #[error("out of time")]
    Timeout,

    #[error("invalid game mode: {0}")]
    InvalidGameMode(String),
}

// ---------------------------------------------------------------------------
// GameResult
// ---------------------------------------------------------------------------

/// Final snapshot delivered to the end callback (and to anyone asking after
/// the game ended).
#[derive(Clone, Debug)]
pub struct GameResult {
    pub winner: Winner,
    pub result: GameStatus,

    pub duration: Duration,
    pub white_remaining: Duration,
    pub black_remaining: Duration,

    pub moves: Vec<Move>,
    pub start_fen: String,
    pub final_fen: String,
}

/// One-shot callback invoked when the session reaches a terminal status.
pub type EndCallback = Box<dyn FnOnce(GameResult) + Send + 'static>;

// ---------------------------------------------------------------------------
// GameSession
// ---------------------------------------------------------------------------

pub struct GameSession {
    inner: Mutex<SessionInner>,
    clock: Arc<Clock>,
    observer: GameObserver,
    created_at: DateTime<Utc>,
}

struct SessionInner {
    engine: GameState,
    status: GameStatus,
    winner: Winner,
    on_end: Option<EndCallback>,
}

impl std::fmt::Debug for GameSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameSession")
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

impl GameSession {
    // -----------------------------------------------------------------
    // Construction
    // -----------------------------------------------------------------

    /// New session from a FEN with `initial` time per side and a Fischer
    /// `increment`. The clock stays paused until [`GameSession::start`].
    pub fn new(
        fen: &str,
        initial: Duration,
        increment: Duration,
        on_end: Option<EndCallback>,
    ) -> Result<Arc<Self>, SessionError> {
        let engine = GameState::from_fen(fen)?;
        let first_to_move = engine.side_to_move();

        let session = Arc::new_cyclic(|weak: &Weak<GameSession>| {
            let weak = weak.clone();
            let on_timeout: TimeoutCallback = Arc::new(move |color| {
                if let Some(session) = weak.upgrade() {
                    session.handle_timeout(color);
                }
            });

            GameSession {
                inner: Mutex::new(SessionInner {
                    engine,
                    status: GameStatus::Ongoing,
                    winner: Winner::None,
                    on_end,
                }),
                clock: Clock::new(initial, increment, first_to_move, on_timeout),
                observer: GameObserver::new(),
                created_at: Utc::now(),
            }
        });

        Ok(session)
    }

    /// New session from the standard starting position using a named time
    /// control.
    pub fn with_mode(mode: &str, on_end: Option<EndCallback>) -> Result<Arc<Self>, SessionError> {
        let mode = GameMode::parse(mode)
            .ok_or_else(|| SessionError::InvalidGameMode(mode.to_string()))?;
        let (initial, increment) = mode.time_control();
        Self::new(STARTING_FEN, initial, increment, on_end)
    }

    // -----------------------------------------------------------------
    // Clock lifecycle
    // -----------------------------------------------------------------

    /// Start the clock for the first time. Returns false if already started.
    pub fn start(&self) -> bool {
        if self.clock.has_started() {
            return false;
        }
        if !self.clock.start() {
            return false;
        }
        self.publish_clock_event(GameEventType::GameStarted);
        true
    }

    /// Pause the clock. Returns false if it was not running.
    pub fn pause(&self) -> bool {
        if !self.clock.stop() {
            return false;
        }
        self.publish_clock_event(GameEventType::GameStopped);
        true
    }

    /// Resume a paused clock. Returns false if never started or already
    /// running.
    pub fn resume(&self) -> bool {
        if !self.clock.has_started() || self.clock.is_running() {
            return false;
        }
        if !self.clock.start() {
            return false;
        }
        self.publish_clock_event(GameEventType::GameStarted);
        true
    }

    pub fn has_started(&self) -> bool {
        self.clock.has_started()
    }

    pub fn is_running(&self) -> bool {
        self.clock.is_running()
    }

    // -----------------------------------------------------------------
    // Moves
    // -----------------------------------------------------------------

    /// Validate and play `side`'s move, then settle the clock.
    ///
    /// Ordering: terminal gate, clock gates, near-flag pre-check, engine
    /// move, then either terminal handling (stop clock, set winner, one-shot
    /// end) or `switch_turn` — whose failure means the flag fell during the
    /// debit, in which case the move is rolled back and `Timeout` returned.
    pub fn make_move(
        &self,
        side: Color,
        from: Square,
        to: Square,
        promo: Option<PieceType>,
    ) -> Result<GameStatus, SessionError> {
        let mut inner = self.inner.lock().expect("session lock");

        if inner.status.is_terminal() {
            return Err(ChessError::MatchEnd.into());
        }
        if !self.clock.is_running() {
            return Err(if self.clock.has_started() {
                SessionError::GamePaused
            } else {
                SessionError::GameNotStarted
            });
        }
        if self.clock.remaining(side) <= MOVE_SAFETY_THRESHOLD {
            return Err(SessionError::Timeout);
        }

        let result = inner.engine.make_move(side, from, to, promo)?;

        if result.is_terminal() {
            self.clock.stop();
            inner.status = result;
            inner.winner = if result == GameStatus::Checkmate {
                side.into()
            } else {
                Winner::Both
            };
            self.fire_end_locked(&mut inner);
        } else if !self.clock.switch_turn() {
            // Flag fell while debiting: the move never happened. The clock
            // dispatches the timeout callback, which ends the game.
            inner.engine.undo(1).expect("move was just pushed");
            return Err(SessionError::Timeout);
        }

        let mut event = GameEvent::new(GameEventType::MoveMade);
        event.mv = inner.engine.history().last().map(|e| e.mv);
        event.move_color = Some(side);
        event.white_remaining = self.clock.remaining(Color::White);
        event.black_remaining = self.clock.remaining(Color::Black);
        event.status = inner.status;
        event.winner = inner.winner;
        self.observer.publish(event);

        Ok(result)
    }

    // -----------------------------------------------------------------
    // Non-move endings
    // -----------------------------------------------------------------

    /// A player left mid-game. The opponent wins if they retain mating
    /// material, otherwise the game is drawn.
    pub fn end_by_leave_game(&self, leaver: Color) -> Result<(), SessionError> {
        self.end_with_walkover(leaver, GameStatus::Resignation)
    }

    /// A player forfeits (e.g. failed to reconnect). Same walkover rule.
    pub fn end_by_forfeit(&self, forfeiter: Color) -> Result<(), SessionError> {
        self.end_with_walkover(forfeiter, GameStatus::Forfeit)
    }

    fn end_with_walkover(&self, loser: Color, status: GameStatus) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().expect("session lock");
        if inner.status.is_terminal() {
            return Err(ChessError::MatchEnd.into());
        }

        self.clock.stop();
        let opponent = !loser;
        inner.winner = if inner.engine.can_force_checkmate(opponent) {
            opponent.into()
        } else {
            Winner::Both
        };
        inner.status = status;
        self.fire_end_locked(&mut inner);
        Ok(())
    }

    /// Draw by mutual agreement; counts as a 50-move draw when the halfmove
    /// clock already allows the claim.
    pub fn make_draw(&self) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().expect("session lock");
        if inner.status.is_terminal() {
            return Err(ChessError::MatchEnd.into());
        }

        self.clock.stop();
        inner.status = if inner.engine.can_draw_by_50_move() {
            GameStatus::DrawBy50Move
        } else {
            GameStatus::DrawByAgreement
        };
        inner.winner = Winner::Both;
        self.fire_end_locked(&mut inner);
        Ok(())
    }

    // -----------------------------------------------------------------
    // Timeout handling (clock callback)
    // -----------------------------------------------------------------

    /// Runs on the clock's timer task after the flag fell. May race a move
    /// in flight; the status re-check under the session mutex makes the
    /// first terminal transition win.
    fn handle_timeout(&self, timed_out: Color) {
        let mut inner = self.inner.lock().expect("session lock");
        if inner.status.is_terminal() {
            return;
        }

        let opponent = !timed_out;
        if inner.engine.can_force_checkmate(opponent) {
            inner.winner = opponent.into();
            inner.status = GameStatus::Timeout;
        } else {
            inner.winner = Winner::Both;
            inner.status = GameStatus::DrawByTimeClaim;
        }
        self.fire_end_locked(&mut inner);
    }

    // -----------------------------------------------------------------
    // End delivery
    // -----------------------------------------------------------------

    /// Publish the `GameEnded` event and schedule the one-shot end callback
    /// on a background task, with the session mutex free during user code.
    fn fire_end_locked(&self, inner: &mut SessionInner) {
        let result = GameResult {
            winner: inner.winner,
            result: inner.status,
            duration: self.clock.duration(),
            white_remaining: self.clock.remaining(Color::White),
            black_remaining: self.clock.remaining(Color::Black),
            moves: inner.engine.moves(),
            start_fen: inner.engine.starting_fen().to_string(),
            final_fen: inner.engine.to_fen(),
        };

        let mut event = GameEvent::new(GameEventType::GameEnded);
        event.white_remaining = result.white_remaining;
        event.black_remaining = result.black_remaining;
        event.status = inner.status;
        event.winner = inner.winner;
        self.observer.publish(event);

        if let Some(callback) = inner.on_end.take() {
            tokio::spawn(async move {
                callback(result);
            });
        }
    }

    fn publish_clock_event(&self, event_type: GameEventType) {
        let inner = self.inner.lock().expect("session lock");
        let mut event = GameEvent::new(event_type);
        event.white_remaining = self.clock.remaining(Color::White);
        event.black_remaining = self.clock.remaining(Color::Black);
        event.status = inner.status;
        event.winner = inner.winner;
        self.observer.publish(event);
    }

    // -----------------------------------------------------------------
    // Snapshots
    // -----------------------------------------------------------------

    pub fn status(&self) -> GameStatus {
        self.inner.lock().expect("session lock").status
    }

    pub fn winner(&self) -> Winner {
        self.inner.lock().expect("session lock").winner
    }

    pub fn fen(&self) -> String {
        self.inner.lock().expect("session lock").engine.to_fen()
    }

    pub fn side_to_move(&self) -> Color {
        self.inner.lock().expect("session lock").engine.side_to_move()
    }

    pub fn moves(&self) -> Vec<Move> {
        self.inner.lock().expect("session lock").engine.moves()
    }

    pub fn remaining(&self, color: Color) -> Duration {
        self.clock.remaining(color)
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Register a spectator on this game's event bus.
    pub fn observe(&self) -> (ObserverId, tokio::sync::mpsc::Receiver<GameEvent>) {
        self.observer.register()
    }

    pub fn unobserve(&self, id: ObserverId) {
        self.observer.unregister(id);
    }
}

// ---------------------------------------------------------------------------
// Tests (paused tokio time where the clock matters)
// ---------------------------------------------------------------------------
