//! chess-arena — real-time multiplayer chess server core.
//!
//! Three layers:
//!
//! - [`engine`]: magic-bitboard position engine — attack tables, move
//!   generation, FEN I/O, Zobrist hashing, result classification.
//! - [`game`]: the authoritative session driver — Fischer clock, terminal
//!   transitions, one-shot end callback, spectator tick bus.
//! - [`ws`]: the websocket fabric — connections, rooms, hub, event
//!   dispatch, rate limiting, keepalive.
//!
//! [`api`] wires the three together into a running game server; [`config`]
//! reads the environment.

pub mod api;
pub mod config;
pub mod engine;
pub mod game;
pub mod ws;
