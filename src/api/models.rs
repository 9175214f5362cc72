//! Event payload shapes for the game server protocol.

use serde::{Deserialize, Serialize};

use crate::engine::types::Color;
use crate::game::observer::{GameEvent, GameEventType};
use crate::game::session::{GameResult, GameSession};

// ---------------------------------------------------------------------------
// Client → server
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGamePayload {
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub fen: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinGamePayload {
    pub game_id: String,
    pub color: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovePayload {
    pub game_id: String,
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub promo: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameRefPayload {
    pub game_id: String,
}

// ---------------------------------------------------------------------------
// Server → client
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameCreatedPayload {
    pub game_id: String,
    pub mode: String,
    pub fen: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinedPayload {
    pub game_id: String,
    pub color: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStatePayload {
    pub game_id: String,
    pub fen: String,
    pub status: String,
    pub turn: String,
    pub white_remaining_ms: u64,
    pub black_remaining_ms: u64,
}

impl GameStatePayload {
    pub fn snapshot(game_id: &str, session: &GameSession) -> Self {
        GameStatePayload {
            game_id: game_id.to_string(),
            fen: session.fen(),
            status: session.status().as_str().to_string(),
            turn: session.side_to_move().to_string(),
            white_remaining_ms: session.remaining(Color::White).as_millis() as u64,
            black_remaining_ms: session.remaining(Color::Black).as_millis() as u64,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveMadePayload {
    pub game_id: String,
    pub from: String,
    pub to: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promo: Option<String>,
    pub player: String,
    pub fen: String,
    pub status: String,
    pub white_remaining_ms: u64,
    pub black_remaining_ms: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DrawOfferedPayload {
    pub game_id: String,
    pub by: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameOverPayload {
    pub game_id: String,
    pub result: String,
    pub winner: String,
    pub duration_ms: u64,
    pub white_remaining_ms: u64,
    pub black_remaining_ms: u64,
    pub moves: Vec<String>,
    pub start_fen: String,
    pub final_fen: String,
}

impl GameOverPayload {
    pub fn from_result(game_id: &str, result: &GameResult) -> Self {
        GameOverPayload {
            game_id: game_id.to_string(),
            result: result.result.as_str().to_string(),
            winner: result.winner.as_str().to_string(),
            duration_ms: result.duration.as_millis() as u64,
            white_remaining_ms: result.white_remaining.as_millis() as u64,
            black_remaining_ms: result.black_remaining.as_millis() as u64,
            moves: result.moves.iter().map(|mv| mv.to_string()).collect(),
            start_fen: result.start_fen.clone(),
            final_fen: result.final_fen.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameTickPayload {
    pub game_id: String,
    pub tick: u64,
    pub event: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mv: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    pub white_remaining_ms: u64,
    pub black_remaining_ms: u64,
    pub status: String,
    pub winner: String,
}

impl GameTickPayload {
    pub fn from_event(game_id: &str, event: &GameEvent) -> Self {
        let name = match event.event_type {
            GameEventType::GameStarted => "game_started",
            GameEventType::GameStopped => "game_stopped",
            GameEventType::MoveMade => "move_made",
            GameEventType::TimeUpdated => "time_updated",
            GameEventType::GameEnded => "game_ended",
        };
        GameTickPayload {
            game_id: game_id.to_string(),
            tick: event.tick,
            event: name,
            mv: event.mv.map(|mv| mv.to_string()),
            color: event.move_color.map(|c| c.to_string()),
            white_remaining_ms: event.white_remaining.as_millis() as u64,
            black_remaining_ms: event.black_remaining.as_millis() as u64,
            status: event.status.as_str().to_string(),
            winner: event.winner.as_str().to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_secs: u64,
    pub connections: usize,
    pub games: usize,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
