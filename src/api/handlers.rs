//! Game event handlers wired into the websocket event registry, plus the
//! HTTP endpoints (health, upgrade).
//!
//! The flow for a move: client frame → read loop → `make_move` handler →
//! session validates and mutates → the room receives `move_made`; when the
//! game reaches a terminal status the session's end callback broadcasts
//! `game_over` and retires the game from the store.

use std::sync::Arc;

use axum::Json;
use axum::extract::{State, WebSocketUpgrade};
use axum::http::{HeaderMap, Uri};
use axum::response::Response;
use serde_json::json;
use uuid::Uuid;

use crate::api::models::{
    CreateGamePayload, DrawOfferedPayload, GameCreatedPayload, GameOverPayload, GameRefPayload,
    GameStatePayload, GameTickPayload, HealthResponse, JoinGamePayload, JoinedPayload,
    MoveMadePayload, MovePayload,
};
use crate::api::state::{GameEntry, GameStore, SharedState};
use crate::engine::board::STARTING_FEN;
use crate::engine::types::{Color, PieceType, Square};
use crate::game::modes::GameMode;
use crate::game::session::{EndCallback, GameSession};
use crate::ws::context::EventContext;
use crate::ws::events::EventRegistry;
use crate::ws::hub::Hub;

/// Mode applied when `create_game` does not name one.
const DEFAULT_MODE: &str = "rd_10m_0s";

// ---------------------------------------------------------------------------
// HTTP endpoints
// ---------------------------------------------------------------------------

/// GET /health
pub async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: state.start_time.elapsed().as_secs(),
        connections: state.hub.conn_count(),
        games: state.games.read().await.len(),
    })
}

/// GET /ws — upgrade to the realtime protocol.
pub async fn ws_upgrade(
    State(state): State<SharedState>,
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    uri: Uri,
) -> Response {
    state.ws.handle(ws, headers, uri)
}

// ---------------------------------------------------------------------------
// Event registration
// ---------------------------------------------------------------------------

/// Register every game event on the shared registry.
pub fn register_events(events: &EventRegistry, hub: &Arc<Hub>, games: &Arc<GameStore>) {
    {
        let hub = Arc::clone(hub);
        let games = Arc::clone(games);
        events.register("create_game", move |ctx| {
            let hub = Arc::clone(&hub);
            let games = Arc::clone(&games);
            async move { create_game(ctx, hub, games).await }
        });
    }
    {
        let games = Arc::clone(games);
        events.register("join_game", move |ctx| {
            let games = Arc::clone(&games);
            async move { join_game(ctx, games).await }
        });
    }
    {
        let games = Arc::clone(games);
        events.register("make_move", move |ctx| {
            let games = Arc::clone(&games);
            async move { make_move(ctx, games).await }
        });
    }
    {
        let games = Arc::clone(games);
        events.register("resign", move |ctx| {
            let games = Arc::clone(&games);
            async move { resign(ctx, games).await }
        });
    }
    {
        let games = Arc::clone(games);
        events.register("offer_draw", move |ctx| {
            let games = Arc::clone(&games);
            async move { offer_draw(ctx, games).await }
        });
    }
    {
        let games = Arc::clone(games);
        events.register("leave_game", move |ctx| {
            let games = Arc::clone(&games);
            async move { leave_game(ctx, games).await }
        });
    }
    {
        let games = Arc::clone(games);
        events.register("spectate", move |ctx| {
            let games = Arc::clone(&games);
            async move { spectate(ctx, games).await }
        });
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn create_game(ctx: EventContext, hub: Arc<Hub>, games: Arc<GameStore>) {
    let payload: CreateGamePayload = match ctx.bind() {
        Ok(payload) => payload,
        Err(_) => {
            let _ = ctx.error("invalid create_game payload").await;
            return;
        }
    };

    let mode = payload.mode.unwrap_or_else(|| DEFAULT_MODE.to_string());
    let Some(game_mode) = GameMode::parse(&mode) else {
        let _ = ctx.error(&format!("invalid game mode: {mode}")).await;
        return;
    };
    let fen = payload.fen.unwrap_or_else(|| STARTING_FEN.to_string());
    let (initial, increment) = game_mode.time_control();

    let game_id = Uuid::new_v4().to_string();
    let on_end = end_broadcaster(hub, Arc::clone(&games), game_id.clone());
    let session = match GameSession::new(&fen, initial, increment, Some(on_end)) {
        Ok(session) => session,
        Err(err) => {
            let _ = ctx.error(&err.to_string()).await;
            return;
        }
    };

    games
        .write()
        .await
        .insert(game_id.clone(), GameEntry::new(session));
    ctx.join(&game_room(&game_id));

    tracing::debug!(%game_id, %mode, "game created");
    let _ = ctx
        .emit("game_created", &GameCreatedPayload { game_id, mode, fen })
        .await;
}

async fn join_game(ctx: EventContext, games: Arc<GameStore>) {
    let payload: JoinGamePayload = match ctx.bind() {
        Ok(payload) => payload,
        Err(_) => {
            let _ = ctx.error("invalid join_game payload").await;
            return;
        }
    };
    let Some(entry) = lookup(&games, &payload.game_id).await else {
        let _ = ctx.error("game not found").await;
        return;
    };
    let Some(color) = parse_color(&payload.color) else {
        let _ = ctx.error("invalid color: expected white or black").await;
        return;
    };

    let both_seated = match entry.claim_seat(color, ctx.id()) {
        Ok(both) => both,
        Err(reason) => {
            let _ = ctx.error(reason).await;
            return;
        }
    };

    let room = game_room(&payload.game_id);
    ctx.join(&room);
    ctx.set(&seat_key(&payload.game_id), json!(color.to_string()));
    let _ = ctx
        .emit(
            "joined",
            &JoinedPayload {
                game_id: payload.game_id.clone(),
                color: color.to_string(),
            },
        )
        .await;

    // The clock starts when the second seat is taken.
    if both_seated && entry.session.start() {
        let snapshot = GameStatePayload::snapshot(&payload.game_id, &entry.session);
        let _ = ctx.to_room(&room).emit("game_started", &snapshot).await;
    }
}

async fn make_move(ctx: EventContext, games: Arc<GameStore>) {
    let payload: MovePayload = match ctx.bind() {
        Ok(payload) => payload,
        Err(_) => {
            let _ = ctx.error("invalid make_move payload").await;
            return;
        }
    };
    let Some(entry) = lookup(&games, &payload.game_id).await else {
        let _ = ctx.error("game not found").await;
        return;
    };
    let Some(color) = entry.seat_of(ctx.id()) else {
        let _ = ctx.error("not seated in this game").await;
        return;
    };
    let (Some(from), Some(to)) = (
        Square::from_algebraic(&payload.from),
        Square::from_algebraic(&payload.to),
    ) else {
        let _ = ctx.error("invalid square").await;
        return;
    };
    let promo = match payload.promo.as_deref() {
        None => None,
        Some(text) => match parse_promo(text) {
            Some(piece) => Some(piece),
            None => {
                let _ = ctx.error("invalid promotion piece").await;
                return;
            }
        },
    };

    match entry.session.make_move(color, from, to, promo) {
        Ok(_) => {
            entry.clear_draw_offer();
            let event = MoveMadePayload {
                game_id: payload.game_id.clone(),
                from: payload.from,
                to: payload.to,
                promo: payload.promo,
                player: color.to_string(),
                fen: entry.session.fen(),
                status: entry.session.status().as_str().to_string(),
                white_remaining_ms: entry.session.remaining(Color::White).as_millis() as u64,
                black_remaining_ms: entry.session.remaining(Color::Black).as_millis() as u64,
            };
            let _ = ctx
                .to_room(&game_room(&payload.game_id))
                .emit("move_made", &event)
                .await;
        }
        Err(err) => {
            let _ = ctx.error(&err.to_string()).await;
        }
    }
}

async fn resign(ctx: EventContext, games: Arc<GameStore>) {
    let Some((entry, color)) = seated_entry(&ctx, &games).await else {
        return;
    };
    if let Err(err) = entry.session.end_by_leave_game(color) {
        let _ = ctx.error(&err.to_string()).await;
    }
}

async fn offer_draw(ctx: EventContext, games: Arc<GameStore>) {
    let payload: GameRefPayload = match ctx.bind() {
        Ok(payload) => payload,
        Err(_) => {
            let _ = ctx.error("invalid offer_draw payload").await;
            return;
        }
    };
    let Some(entry) = lookup(&games, &payload.game_id).await else {
        let _ = ctx.error("game not found").await;
        return;
    };
    let Some(color) = entry.seat_of(ctx.id()) else {
        let _ = ctx.error("not seated in this game").await;
        return;
    };

    if entry.offer_draw(color) {
        // Both sides agreed.
        if let Err(err) = entry.session.make_draw() {
            let _ = ctx.error(&err.to_string()).await;
        }
        return;
    }

    let event = DrawOfferedPayload {
        game_id: payload.game_id.clone(),
        by: color.to_string(),
    };
    let _ = ctx
        .to_room_omit(&game_room(&payload.game_id))
        .emit("draw_offered", &event)
        .await;
}

async fn leave_game(ctx: EventContext, games: Arc<GameStore>) {
    let payload: GameRefPayload = match ctx.bind() {
        Ok(payload) => payload,
        Err(_) => {
            let _ = ctx.error("invalid leave_game payload").await;
            return;
        }
    };
    if let Some(entry) = lookup(&games, &payload.game_id).await
        && let Some(color) = entry.seat_of(ctx.id())
    {
        // Walking away forfeits; already-finished games are left untouched.
        let _ = entry.session.end_by_forfeit(color);
    }
    ctx.delete(&seat_key(&payload.game_id));
    ctx.leave(&game_room(&payload.game_id));
}

async fn spectate(ctx: EventContext, games: Arc<GameStore>) {
    let payload: GameRefPayload = match ctx.bind() {
        Ok(payload) => payload,
        Err(_) => {
            let _ = ctx.error("invalid spectate payload").await;
            return;
        }
    };
    let Some(entry) = lookup(&games, &payload.game_id).await else {
        let _ = ctx.error("game not found").await;
        return;
    };

    ctx.join(&game_room(&payload.game_id));
    let snapshot = GameStatePayload::snapshot(&payload.game_id, &entry.session);
    let _ = ctx.emit("game_state", &snapshot).await;

    // Bridge the session's tick bus onto this connection until either side
    // goes away.
    let (observer_id, mut ticks) = entry.session.observe();
    let conn = Arc::clone(&ctx.conn);
    let session = Arc::clone(&entry.session);
    let game_id = payload.game_id.clone();
    tokio::spawn(async move {
        while let Some(event) = ticks.recv().await {
            let payload = GameTickPayload::from_event(&game_id, &event);
            if conn.emit("game_tick", &payload).await.is_err() {
                break;
            }
        }
        session.unobserve(observer_id);
    });
}

/// Disconnect hook: any seats this connection held become forfeits.
pub(crate) async fn forfeit_seated_games(ctx: &EventContext, games: &Arc<GameStore>) {
    for (key, value) in ctx.conn.entries() {
        let Some(game_id) = key.strip_prefix("seat:") else {
            continue;
        };
        let Some(color) = value.as_str().and_then(parse_color) else {
            continue;
        };
        if let Some(entry) = lookup(games, game_id).await {
            let _ = entry.session.end_by_forfeit(color);
        }
    }
}

// ---------------------------------------------------------------------------
// Small helpers
// ---------------------------------------------------------------------------

fn game_room(game_id: &str) -> String {
    format!("game:{game_id}")
}

fn seat_key(game_id: &str) -> String {
    format!("seat:{game_id}")
}

async fn lookup(games: &GameStore, game_id: &str) -> Option<Arc<GameEntry>> {
    games.read().await.get(game_id).cloned()
}

async fn seated_entry(
    ctx: &EventContext,
    games: &Arc<GameStore>,
) -> Option<(Arc<GameEntry>, Color)> {
    let payload: GameRefPayload = match ctx.bind() {
        Ok(payload) => payload,
        Err(_) => {
            let _ = ctx.error("invalid payload").await;
            return None;
        }
    };
    let Some(entry) = lookup(games, &payload.game_id).await else {
        let _ = ctx.error("game not found").await;
        return None;
    };
    let Some(color) = entry.seat_of(ctx.id()) else {
        let _ = ctx.error("not seated in this game").await;
        return None;
    };
    Some((entry, color))
}

fn parse_color(text: &str) -> Option<Color> {
    match text {
        "white" | "w" => Some(Color::White),
        "black" | "b" => Some(Color::Black),
        _ => None,
    }
}

fn parse_promo(text: &str) -> Option<PieceType> {
    match text.to_ascii_lowercase().as_str() {
        "q" | "queen" => Some(PieceType::Queen),
        "r" | "rook" => Some(PieceType::Rook),
        "b" | "bishop" => Some(PieceType::Bishop),
        "n" | "knight" => Some(PieceType::Knight),
        _ => None,
    }
}

/// Build the one-shot end callback: broadcast `game_over` to the room and
/// retire the game.
fn end_broadcaster(hub: Arc<Hub>, games: Arc<GameStore>, game_id: String) -> EndCallback {
    Box::new(move |result| {
        tokio::spawn(async move {
            let payload = GameOverPayload::from_result(&game_id, &result);
            if let Err(err) = hub
                .to_room(&game_room(&game_id))
                .emit("game_over", &payload)
                .await
            {
                tracing::warn!(%game_id, error = %err, "game_over broadcast failed");
            }
            games.write().await.remove(&game_id);
        });
    })
}

// ---------------------------------------------------------------------------
// Tests — drive the handlers through hand-built contexts
// ---------------------------------------------------------------------------
