//! Shared application state: hub, event registry, websocket handler, and
//! the live game store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::RwLock;

use crate::api::handlers;
use crate::config::AppConfig;
use crate::engine::types::Color;
use crate::game::session::GameSession;
use crate::ws::connection::ConnId;
use crate::ws::events::EventRegistry;
use crate::ws::handler::WsHandler;
use crate::ws::hub::Hub;

// ---------------------------------------------------------------------------
// Game store
// ---------------------------------------------------------------------------

/// Seat assignments for one game.
#[derive(Debug, Default)]
pub struct Seats {
    pub white: Option<ConnId>,
    pub black: Option<ConnId>,
}

/// A live game plus its table state (seats, pending draw offer).
pub struct GameEntry {
    pub session: Arc<GameSession>,
    seats: Mutex<Seats>,
    draw_offer: Mutex<Option<Color>>,
}

impl GameEntry {
    pub fn new(session: Arc<GameSession>) -> Arc<Self> {
        Arc::new(GameEntry {
            session,
            seats: Mutex::new(Seats::default()),
            draw_offer: Mutex::new(None),
        })
    }

    /// Claim a seat. Returns whether both seats are now taken, or an error
    /// message when the seat belongs to someone else.
    pub fn claim_seat(&self, color: Color, conn: ConnId) -> Result<bool, &'static str> {
        let mut seats = self.seats.lock().expect("seats lock");
        let seat = match color {
            Color::White => &mut seats.white,
            Color::Black => &mut seats.black,
        };
        match seat {
            Some(owner) if *owner != conn => Err("seat already taken"),
            _ => {
                *seat = Some(conn);
                Ok(seats.white.is_some() && seats.black.is_some())
            }
        }
    }

    /// Which seat (if any) does this connection hold?
    pub fn seat_of(&self, conn: ConnId) -> Option<Color> {
        let seats = self.seats.lock().expect("seats lock");
        if seats.white == Some(conn) {
            Some(Color::White)
        } else if seats.black == Some(conn) {
            Some(Color::Black)
        } else {
            None
        }
    }

    /// Record a draw offer. Returns true when the offer completes an
    /// agreement (the opponent had already offered).
    pub fn offer_draw(&self, by: Color) -> bool {
        let mut offer = self.draw_offer.lock().expect("draw offer lock");
        match *offer {
            Some(previous) if previous != by => {
                *offer = None;
                true
            }
            _ => {
                *offer = Some(by);
                false
            }
        }
    }

    /// Any successful move invalidates a pending offer.
    pub fn clear_draw_offer(&self) {
        *self.draw_offer.lock().expect("draw offer lock") = None;
    }
}

/// Live games by id.
pub type GameStore = RwLock<HashMap<String, Arc<GameEntry>>>;

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

pub struct AppState {
    pub hub: Arc<Hub>,
    pub events: Arc<EventRegistry>,
    pub ws: Arc<WsHandler>,
    pub games: Arc<GameStore>,
    pub config: AppConfig,
    pub start_time: std::time::Instant,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(config: AppConfig) -> SharedState {
        let hub = Hub::new();
        let events = Arc::new(EventRegistry::new());
        let games: Arc<GameStore> = Arc::new(RwLock::new(HashMap::new()));

        handlers::register_events(&events, &hub, &games);

        let disconnect_games = Arc::clone(&games);
        let ws = WsHandler::new(Arc::clone(&hub), Arc::clone(&events))
            .with_origin_patterns(config.ws_origins.clone())
            .with_event_semaphore(config.ws_event_semaphore)
            .with_keepalive_interval(Duration::from_secs(config.ws_keepalive_secs))
            .with_on_disconnect(move |ctx| {
                let games = Arc::clone(&disconnect_games);
                async move {
                    handlers::forfeit_seated_games(&ctx, &games).await;
                }
            });

        Arc::new(AppState {
            hub,
            events,
            ws: Arc::new(ws),
            games,
            config,
            start_time: std::time::Instant::now(),
        })
    }
}
