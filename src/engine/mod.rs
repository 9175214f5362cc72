//! Magic-bitboard chess position engine.
//!
//! - [`types`]: squares, bitboards, packed moves, statuses, errors.
//! - [`attacks`]: precomputed leaper/slider attack tables.
//! - [`zobrist`]: incremental position hashing.
//! - [`board`]: `Position` — placement, FEN I/O, make/undo.
//! - [`movegen`]: pseudo-legal generation and candidate-move construction.
//! - [`game`]: `GameState` — history, legality, result classification.

pub mod attacks;
pub mod board;
pub mod game;
pub mod movegen;
pub mod types;
pub mod zobrist;

pub use board::{Position, STARTING_FEN};
pub use game::GameState;
pub use movegen::legal_moves;
pub use types::*;
