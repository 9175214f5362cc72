//! Zobrist hashing for incremental position identification.
//!
//! Each aspect of a position (piece on square, side to move, castling rights,
//! en-passant target square) gets a random 64-bit key. The position hash is
//! the XOR of all applicable keys, which allows O(1) incremental updates on
//! make/undo. The hash is used only for threefold-repetition detection.

use crate::engine::types::{Piece, Square};

// ---------------------------------------------------------------------------
// Table dimensions
// ---------------------------------------------------------------------------

/// 16 possible castling-rights bitmasks (0..15).
const CASTLING_KEYS: usize = 16;
/// One key per possible en-passant target square.
const EP_KEYS: usize = 64;
/// Total number of random keys.
#[cfg(test)]
const TOTAL_KEYS: usize = 12 * 64 + 1 + CASTLING_KEYS + EP_KEYS;

// ---------------------------------------------------------------------------
// ZobristKeys — immutable singleton
// ---------------------------------------------------------------------------

/// Pre-computed Zobrist random keys (generated once via `OnceLock`).
pub struct ZobristKeys {
    /// piece\[piece_index - 1\]\[square\] — random key for a piece on a square.
    pub piece: [[u64; 64]; 12],
    /// XOR this when it is Black's turn to move.
    pub side_to_move: u64,
    /// castling\[rights_as_u8\] — one key per possible castling bitmask (0..15).
    pub castling: [u64; CASTLING_KEYS],
    /// en_passant\[square\] — one key per possible en-passant target square.
    pub en_passant: [u64; EP_KEYS],
}

/// Static singleton holding the Zobrist keys (initialised once).
static ZOBRIST: std::sync::OnceLock<ZobristKeys> = std::sync::OnceLock::new();

/// Get a reference to the global Zobrist keys.
pub fn keys() -> &'static ZobristKeys {
    ZOBRIST.get_or_init(ZobristKeys::init)
}

impl ZobristKeys {
    /// Generate all keys using a deterministic PRNG seeded with a fixed value.
    /// The fixed seed keeps hashes reproducible across runs.
    fn init() -> Self {
        let mut rng = Xorshift64::new(0x3243_F6A8_885A_308D); // π digits

        let mut piece = [[0u64; 64]; 12];
        for pc in &mut piece {
            for sq in pc {
                *sq = rng.next_u64();
            }
        }

        let side_to_move = rng.next_u64();

        let mut castling = [0u64; CASTLING_KEYS];
        for key in &mut castling {
            *key = rng.next_u64();
        }

        let mut en_passant = [0u64; EP_KEYS];
        for key in &mut en_passant {
            *key = rng.next_u64();
        }

        ZobristKeys {
            piece,
            side_to_move,
            castling,
            en_passant,
        }
    }

    // -----------------------------------------------------------------------
    // Convenience accessors
    // -----------------------------------------------------------------------

    /// Key for a specific piece on a specific square.
    #[inline]
    pub fn piece_key(&self, piece: Piece, sq: Square) -> u64 {
        self.piece[(piece.index() - 1) as usize][sq.0 as usize]
    }

    /// Key for a specific en-passant target square.
    #[inline]
    pub fn ep_key(&self, sq: Square) -> u64 {
        self.en_passant[sq.0 as usize]
    }

    /// Key for a specific castling-rights bitmask.
    #[inline]
    pub fn castling_key(&self, rights: u8) -> u64 {
        self.castling[rights as usize]
    }
}

// ---------------------------------------------------------------------------
// Deterministic PRNG (xorshift64)
// ---------------------------------------------------------------------------

/// Minimal xorshift64 PRNG — deterministic, fast, good distribution.
pub(crate) struct Xorshift64 {
    state: u64,
}

impl Xorshift64 {
    pub(crate) fn new(seed: u64) -> Self {
        // State must never be zero (xorshift of zero stays zero).
        Xorshift64 {
            state: if seed == 0 { 1 } else { seed },
        }
    }

    pub(crate) fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
