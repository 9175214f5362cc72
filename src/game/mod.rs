//! Game session layer: clock, session driver, spectator bus, time controls.

pub mod clock;
pub mod modes;
pub mod observer;
pub mod session;

pub use clock::Clock;
pub use modes::GameMode;
pub use observer::{GameEvent, GameEventType, GameObserver};
pub use session::{EndCallback, GameResult, GameSession, SessionError};
