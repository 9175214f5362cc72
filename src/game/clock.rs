//! Two-player Fischer chess clock.
//!
//! The clock debits the side whose turn it is and credits the increment on
//! `switch_turn`. A timeout task is armed for the running side's remaining
//! time plus a small grace window; the fire handler re-checks, under the
//! clock lock, that the deadline generation is still current and that the
//! clock really reached zero before invoking the timeout callback, so a
//! concurrent `stop`/`switch_turn` can never produce a stale timeout.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

use crate::engine::types::Color;

/// Invoked (exactly once) with the colour whose flag fell.
pub type TimeoutCallback = Arc<dyn Fn(Color) + Send + Sync>;

/// Slack added to the armed deadline so a move arriving just under the wire
/// wins the race against the timeout task.
const TIMEOUT_GRACE: Duration = Duration::from_millis(50);

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

pub struct Clock {
    inner: Mutex<ClockInner>,
    on_timeout: TimeoutCallback,
}

struct ClockInner {
    increment: Duration,
    white: Duration,
    black: Duration,
    /// Side whose clock is (or will be) running down.
    turn: Color,
    /// `None` while paused or not yet started.
    last_tick: Option<Instant>,
    started: bool,
    /// Accumulated run time across pauses.
    elapsed: Duration,
    timer: Option<tokio::task::JoinHandle<()>>,
    /// Bumped whenever the armed deadline becomes stale.
    generation: u64,
}

impl ClockInner {
    #[inline]
    fn stored(&self, color: Color) -> Duration {
        match color {
            Color::White => self.white,
            Color::Black => self.black,
        }
    }

    #[inline]
    fn stored_mut(&mut self, color: Color) -> &mut Duration {
        match color {
            Color::White => &mut self.white,
            Color::Black => &mut self.black,
        }
    }

    /// Debit the side on clock for the time since `last_tick`; clamps at 0.
    fn debit(&mut self, now: Instant) {
        let Some(last) = self.last_tick else { return };
        let elapsed = now.saturating_duration_since(last);
        let turn = self.turn;
        let stored = self.stored_mut(turn);
        *stored = stored.saturating_sub(elapsed);
        self.elapsed += elapsed;
    }

    fn cancel_timer(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        if let Some(handle) = self.timer.take() {
            handle.abort();
        }
    }
}

impl Clock {
    /// New paused clock with `initial` on both sides; call `start` to run it.
    pub fn new(
        initial: Duration,
        increment: Duration,
        turn: Color,
        on_timeout: TimeoutCallback,
    ) -> Arc<Self> {
        Arc::new(Clock {
            inner: Mutex::new(ClockInner {
                increment,
                white: initial,
                black: initial,
                turn,
                last_tick: None,
                started: false,
                elapsed: Duration::ZERO,
                timer: None,
                generation: 0,
            }),
            on_timeout,
        })
    }

    // -----------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------

    /// Start (or resume) the countdown for the side on clock. Returns false
    /// if the clock is already running.
    pub fn start(self: &Arc<Self>) -> bool {
        let mut inner = self.inner.lock().expect("clock lock");
        if inner.last_tick.is_some() {
            return false;
        }
        inner.last_tick = Some(Instant::now());
        inner.started = true;
        self.arm_locked(&mut inner);
        true
    }

    /// Pause: debit the side on clock and cancel the timeout task. Returns
    /// false if the clock was not running.
    pub fn stop(&self) -> bool {
        let mut inner = self.inner.lock().expect("clock lock");
        if inner.last_tick.is_none() {
            return false;
        }
        inner.debit(Instant::now());
        inner.cancel_timer();
        inner.last_tick = None;
        true
    }

    /// Debit the mover, credit their increment, flip the side on clock and
    /// re-arm the timeout.
    ///
    /// Returns false when the clock is not running or the debit emptied the
    /// mover's clock; in that case the clock stops and the timeout callback
    /// is dispatched on a background task, so the flag is handled through
    /// the same one-shot path as a timer expiry.
    pub fn switch_turn(self: &Arc<Self>) -> bool {
        let mut inner = self.inner.lock().expect("clock lock");
        if inner.last_tick.is_none() {
            return false;
        }
        let now = Instant::now();
        inner.debit(now);

        if inner.white.is_zero() || inner.black.is_zero() {
            // Flag fell during the debit.
            inner.cancel_timer();
            inner.last_tick = None;
            let flagged = if inner.white.is_zero() {
                Color::White
            } else {
                Color::Black
            };
            drop(inner);

            let clock = Arc::clone(self);
            tokio::spawn(async move {
                (clock.on_timeout)(flagged);
            });
            return false;
        }

        let mover = inner.turn;
        let increment = inner.increment;
        *inner.stored_mut(mover) += increment;
        inner.turn = !mover;
        inner.last_tick = Some(now);
        self.arm_locked(&mut inner);
        true
    }

    /// Arm the timeout task for the side on clock. Caller holds the lock.
    fn arm_locked(self: &Arc<Self>, inner: &mut ClockInner) {
        inner.cancel_timer();
        let generation = inner.generation;
        let deadline = Instant::now() + inner.stored(inner.turn) + TIMEOUT_GRACE;

        let clock = Arc::clone(self);
        inner.timer = Some(tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            clock.fire(generation);
        }));
    }

    /// Timeout task body: re-check that this deadline is still current and
    /// that the side on clock actually ran out.
    fn fire(self: &Arc<Self>, generation: u64) {
        let mut inner = self.inner.lock().expect("clock lock");
        if inner.generation != generation || inner.last_tick.is_none() {
            return; // superseded by stop/switch_turn
        }

        let now = Instant::now();
        let turn = inner.turn;
        let live = inner
            .stored(turn)
            .saturating_sub(now.saturating_duration_since(inner.last_tick.expect("running")));
        if !live.is_zero() {
            // Woke early (clock was adjusted); re-arm for the rest.
            self.arm_locked(&mut inner);
            return;
        }

        inner.debit(now);
        inner.cancel_timer();
        inner.last_tick = None;
        drop(inner);

        (self.on_timeout)(turn);
    }

    // -----------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------

    /// Remaining time for a colour, live-adjusted while running.
    pub fn remaining(&self, color: Color) -> Duration {
        let inner = self.inner.lock().expect("clock lock");
        let stored = inner.stored(color);
        match inner.last_tick {
            Some(last) if inner.turn == color => {
                stored.saturating_sub(Instant::now().saturating_duration_since(last))
            }
            _ => stored,
        }
    }

    /// Side whose clock runs down next.
    pub fn turn(&self) -> Color {
        self.inner.lock().expect("clock lock").turn
    }

    /// Has `start` ever been called?
    pub fn has_started(&self) -> bool {
        self.inner.lock().expect("clock lock").started
    }

    /// Is the countdown currently running?
    pub fn is_running(&self) -> bool {
        self.inner.lock().expect("clock lock").last_tick.is_some()
    }

    /// Total wall-clock time the game has been running.
    pub fn duration(&self) -> Duration {
        let inner = self.inner.lock().expect("clock lock");
        match inner.last_tick {
            Some(last) => inner.elapsed + Instant::now().saturating_duration_since(last),
            None => inner.elapsed,
        }
    }
}

impl Drop for Clock {
    fn drop(&mut self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.cancel_timer();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests (paused tokio time — deterministic)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::mpsc;

    fn counting_callback() -> (TimeoutCallback, Arc<AtomicU32>, mpsc::UnboundedReceiver<Color>) {
        let count = Arc::new(AtomicU32::new(0));
        let (tx, rx) = mpsc::unbounded_channel();
        let count2 = Arc::clone(&count);
        let cb: TimeoutCallback = Arc::new(move |color| {
            count2.fetch_add(1, Ordering::SeqCst);
            let _ = tx.send(color);
        });
        (cb, count, rx)
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_fires_once_for_the_running_side() {
        let (cb, count, mut rx) = counting_callback();
        let clock = Clock::new(Duration::from_secs(1), Duration::ZERO, Color::White, cb);

        assert!(clock.start());
        tokio::time::sleep(Duration::from_millis(1100)).await;

        let flagged = rx.recv().await.expect("timeout delivered");
        assert_eq!(flagged, Color::White);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(clock.remaining(Color::White), Duration::ZERO);
        assert!(!clock.is_running());

        // No second firing.
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn start_is_idempotent_while_running() {
        let (cb, _, _rx) = counting_callback();
        let clock = Clock::new(Duration::from_secs(60), Duration::ZERO, Color::White, cb);
        assert!(clock.start());
        assert!(!clock.start());
        assert!(clock.is_running());
        assert!(clock.has_started());
    }

    #[tokio::test(start_paused = true)]
    async fn remaining_ticks_down_only_for_side_on_clock() {
        let (cb, _, _rx) = counting_callback();
        let clock = Clock::new(Duration::from_secs(60), Duration::ZERO, Color::White, cb);
        clock.start();

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(clock.remaining(Color::White), Duration::from_secs(57));
        assert_eq!(clock.remaining(Color::Black), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_freezes_both_clocks() {
        let (cb, count, _rx) = counting_callback();
        let clock = Clock::new(Duration::from_secs(10), Duration::ZERO, Color::White, cb);
        clock.start();

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(clock.stop());
        assert!(!clock.is_running());
        assert!(clock.has_started());

        let frozen = clock.remaining(Color::White);
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(clock.remaining(Color::White), frozen);
        // Pausing cancelled the armed timeout.
        assert_eq!(count.load(Ordering::SeqCst), 0);

        assert!(!clock.stop(), "second stop is a no-op");
    }

    #[tokio::test(start_paused = true)]
    async fn switch_turn_debits_credits_and_flips() {
        let (cb, _, _rx) = counting_callback();
        let clock = Clock::new(Duration::from_secs(60), Duration::from_secs(2), Color::White, cb);
        clock.start();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(clock.switch_turn());

        // White spent 5s and got the 2s increment back.
        assert_eq!(clock.remaining(Color::White), Duration::from_secs(57));
        assert_eq!(clock.turn(), Color::Black);
        assert_eq!(clock.remaining(Color::Black), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn switch_turn_reports_flag_fall() {
        let (cb, count, mut rx) = counting_callback();
        let clock = Clock::new(Duration::from_secs(1), Duration::ZERO, Color::White, cb);
        clock.start();

        // Burn past White's whole clock without moving, inside the grace
        // window the timer has not used up yet.
        tokio::time::sleep(Duration::from_millis(1020)).await;
        assert!(!clock.switch_turn());
        assert!(!clock.is_running());

        let flagged = rx.recv().await.expect("flag dispatched via callback");
        assert_eq!(flagged, Color::White);
        // Only one delivery: the armed timer was cancelled by switch_turn.
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn switch_turn_on_paused_clock_fails() {
        let (cb, _, _rx) = counting_callback();
        let clock = Clock::new(Duration::from_secs(60), Duration::ZERO, Color::White, cb);
        assert!(!clock.switch_turn());
        clock.start();
        clock.stop();
        assert!(!clock.switch_turn());
    }

    #[tokio::test(start_paused = true)]
    async fn resume_rearms_the_timeout() {
        let (cb, count, mut rx) = counting_callback();
        let clock = Clock::new(Duration::from_secs(2), Duration::ZERO, Color::White, cb);
        clock.start();
        tokio::time::sleep(Duration::from_secs(1)).await;
        clock.stop();

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        clock.start(); // resume with 1s left
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(rx.recv().await, Some(Color::White));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn duration_accumulates_across_pauses() {
        let (cb, _, _rx) = counting_callback();
        let clock = Clock::new(Duration::from_secs(60), Duration::ZERO, Color::White, cb);
        clock.start();
        tokio::time::sleep(Duration::from_secs(3)).await;
        clock.stop();
        tokio::time::sleep(Duration::from_secs(10)).await; // paused, not counted
        clock.start();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(clock.duration(), Duration::from_secs(5));
    }
}
