//! Bitboard-based chess position representation.
//!
//! `Position` stores piece placement as 12 bitboards (2 colours × 6 piece
//! types), redundant occupancy bitboards, side to move, castling rights,
//! en-passant square, move counters, and an incremental Zobrist hash.

use crate::engine::attacks;
use crate::engine::types::{
    Bitboard, CastlingRights, ChessError, Color, Move, Piece, PieceType, Square,
};
use crate::engine::zobrist;

/// Standard starting position FEN.
pub const STARTING_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

// ---------------------------------------------------------------------------
// UndoInfo — saved state for reversing a move
// ---------------------------------------------------------------------------

/// State that must be saved before making a move so it can be restored on
/// undo.
#[derive(Clone, Debug)]
pub struct UndoInfo {
    pub captured_piece: Option<PieceType>,
    pub castling_rights: CastlingRights,
    pub en_passant: Option<Square>,
    pub halfmove_clock: u16,
    pub zobrist_hash: u64,
}

// ---------------------------------------------------------------------------
// Position
// ---------------------------------------------------------------------------

/// A complete chess position using bitboard representation.
///
/// Board layout follows LERF (Little-Endian Rank-File) mapping:
/// a1 = 0, b1 = 1, … h1 = 7, a2 = 8, … h8 = 63.
#[derive(Clone, Debug, PartialEq)]
pub struct Position {
    /// Piece bitboards: `pieces[color][piece_type]`.
    pub pieces: [[Bitboard; PieceType::COUNT]; 2],

    /// Per-colour occupancy (union of all piece bitboards for that colour).
    pub occupied: [Bitboard; 2],

    /// Total occupancy (union of both colours).
    pub all_occupied: Bitboard,

    /// Whose turn it is.
    pub side_to_move: Color,

    /// Castling availability (K/Q/k/q).
    pub castling_rights: CastlingRights,

    /// En-passant target square (the square *behind* the double-pushed pawn).
    pub en_passant: Option<Square>,

    /// Half-move clock for the 50/75-move rules (reset on pawn move or
    /// capture).
    pub halfmove_clock: u16,

    /// Full-move number (starts at 1, incremented after Black moves).
    pub fullmove_number: u16,

    /// Incremental Zobrist hash of the position.
    pub zobrist_hash: u64,
}

// ---------------------------------------------------------------------------
// Construction helpers
// ---------------------------------------------------------------------------

impl Position {
    /// Create an empty board with no pieces.
    pub fn empty() -> Self {
        Position {
            pieces: [[Bitboard::EMPTY; PieceType::COUNT]; 2],
            occupied: [Bitboard::EMPTY; 2],
            all_occupied: Bitboard::EMPTY,
            side_to_move: Color::White,
            castling_rights: CastlingRights::NONE,
            en_passant: None,
            halfmove_clock: 0,
            fullmove_number: 1,
            zobrist_hash: 0,
        }
    }

    /// Standard starting position.
    pub fn starting() -> Self {
        Self::from_fen(STARTING_FEN).expect("starting FEN is always valid")
    }

    // -----------------------------------------------------------------------
    // Piece manipulation (low-level)
    // -----------------------------------------------------------------------

    /// Place a piece on a square. Does NOT update the Zobrist hash.
    #[inline]
    pub fn put_piece(&mut self, sq: Square, color: Color, piece: PieceType) {
        let bb = Bitboard::from_square(sq);
        self.pieces[color.index()][piece.index()] |= bb;
        self.occupied[color.index()] |= bb;
        self.all_occupied |= bb;
    }

    /// Remove a piece from a square. Does NOT update the Zobrist hash.
    #[inline]
    pub fn remove_piece(&mut self, sq: Square, color: Color, piece: PieceType) {
        let bb = Bitboard::from_square(sq);
        self.pieces[color.index()][piece.index()] &= !bb;
        self.occupied[color.index()] &= !bb;
        self.all_occupied &= !bb;
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// What piece (if any) is on a given square?
    pub fn piece_at(&self, sq: Square) -> Option<(Color, PieceType)> {
        let bb = Bitboard::from_square(sq);

        // Quick bail-out: nothing on this square at all.
        if (self.all_occupied & bb).is_empty() {
            return None;
        }

        let color = if (self.occupied[Color::White.index()] & bb).is_not_empty() {
            Color::White
        } else {
            Color::Black
        };

        for &pt in &PieceType::ALL {
            if (self.pieces[color.index()][pt.index()] & bb).is_not_empty() {
                return Some((color, pt));
            }
        }

        // Unreachable if occupancy is consistent.
        None
    }

    /// The encoded piece on a square, if any.
    #[inline]
    pub fn encoded_piece_at(&self, sq: Square) -> Option<Piece> {
        self.piece_at(sq).map(|(c, pt)| Piece::new(c, pt))
    }

    /// Bitboard of all pieces of a given colour and type.
    #[inline]
    pub fn bb(&self, color: Color, piece: PieceType) -> Bitboard {
        self.pieces[color.index()][piece.index()]
    }

    /// Bitboard of friendly (side-to-move) pieces.
    #[inline]
    pub fn friendly(&self) -> Bitboard {
        self.occupied[self.side_to_move.index()]
    }

    /// Bitboard of enemy pieces.
    #[inline]
    pub fn enemy(&self) -> Bitboard {
        self.occupied[(!self.side_to_move).index()]
    }

    /// Find the king square for the given colour.
    #[inline]
    pub fn king_sq(&self, color: Color) -> Square {
        self.pieces[color.index()][PieceType::King.index()]
            .lsb()
            .expect("king must exist")
    }

    // -----------------------------------------------------------------------
    // Zobrist hash computation (full recompute)
    // -----------------------------------------------------------------------

    /// Compute the Zobrist hash from scratch (FEN loading / verification).
    pub fn compute_zobrist(&self) -> u64 {
        let zk = zobrist::keys();
        let mut hash = 0u64;

        for color in [Color::White, Color::Black] {
            for &pt in &PieceType::ALL {
                for sq in self.bb(color, pt).iter() {
                    hash ^= zk.piece_key(Piece::new(color, pt), sq);
                }
            }
        }

        if self.side_to_move == Color::Black {
            hash ^= zk.side_to_move;
        }

        hash ^= zk.castling_key(self.castling_rights.0);

        if let Some(ep_sq) = self.en_passant {
            hash ^= zk.ep_key(ep_sq);
        }

        hash
    }

    // -----------------------------------------------------------------------
    // Occupancy sanity check (debug builds)
    // -----------------------------------------------------------------------

    /// Verify that redundant occupancy bitboards are consistent with piece
    /// bitboards.
    #[cfg(any(debug_assertions, test))]
    pub fn assert_consistent(&self) {
        for color in [Color::White, Color::Black] {
            let mut expected = Bitboard::EMPTY;
            for &pt in &PieceType::ALL {
                expected |= self.pieces[color.index()][pt.index()];
            }
            assert_eq!(
                self.occupied[color.index()],
                expected,
                "occupancy mismatch for {color:?}",
            );
        }
        assert_eq!(
            self.all_occupied,
            self.occupied[0] | self.occupied[1],
            "all_occupied mismatch",
        );
        // Piece boards must be pairwise disjoint.
        let mut total = 0u32;
        for color in 0..2 {
            for pt in 0..PieceType::COUNT {
                total += self.pieces[color][pt].pop_count();
            }
        }
        assert_eq!(total, self.all_occupied.pop_count(), "piece boards overlap");
    }

    // -----------------------------------------------------------------------
    // Attack detection
    // -----------------------------------------------------------------------

    /// Is `sq` attacked by any piece of the colour opposing `defender`?
    ///
    /// Probes in rising order of expected cost: pawns, knights, king, then
    /// the sliders.
    pub fn is_square_attacked(&self, sq: Square, defender: Color) -> bool {
        let t = attacks::tables();
        let occ = self.all_occupied;
        let by = !defender;

        // A pawn of `by` attacks sq iff a pawn of `defender`'s colour on sq
        // would attack it back.
        if (t.pawn_attacks(defender, sq) & self.bb(by, PieceType::Pawn)).is_not_empty() {
            return true;
        }

        if (t.knight_attacks(sq) & self.bb(by, PieceType::Knight)).is_not_empty() {
            return true;
        }

        if (t.king_attacks(sq) & self.bb(by, PieceType::King)).is_not_empty() {
            return true;
        }

        let bishop_queen = self.bb(by, PieceType::Bishop) | self.bb(by, PieceType::Queen);
        if (t.bishop_attacks(sq, occ) & bishop_queen).is_not_empty() {
            return true;
        }

        let rook_queen = self.bb(by, PieceType::Rook) | self.bb(by, PieceType::Queen);
        if (t.rook_attacks(sq, occ) & rook_queen).is_not_empty() {
            return true;
        }

        false
    }

    /// Bitboard of all enemy pieces attacking `sq` (from `defender`'s point
    /// of view).
    pub fn attackers_to(&self, sq: Square, defender: Color) -> Bitboard {
        let t = attacks::tables();
        let occ = self.all_occupied;
        let by = !defender;
        let mut attackers = Bitboard::EMPTY;

        attackers |= t.pawn_attacks(defender, sq) & self.bb(by, PieceType::Pawn);
        attackers |= t.knight_attacks(sq) & self.bb(by, PieceType::Knight);
        attackers |= t.king_attacks(sq) & self.bb(by, PieceType::King);
        attackers |= t.bishop_attacks(sq, occ)
            & (self.bb(by, PieceType::Bishop) | self.bb(by, PieceType::Queen));
        attackers |= t.rook_attacks(sq, occ)
            & (self.bb(by, PieceType::Rook) | self.bb(by, PieceType::Queen));

        attackers
    }

    /// Is the given colour's king currently attacked?
    #[inline]
    pub fn is_king_attacked(&self, color: Color) -> bool {
        self.is_square_attacked(self.king_sq(color), color)
    }

    /// Is the side-to-move's king currently in check?
    #[inline]
    pub fn is_in_check(&self) -> bool {
        self.is_king_attacked(self.side_to_move)
    }

    // -----------------------------------------------------------------------
    // Make / Undo move
    // -----------------------------------------------------------------------

    /// Apply a packed move to the position. Returns `UndoInfo` for reversal.
    ///
    /// The caller is responsible for legality (the mover's king may be left
    /// in check — legality filtering happens on a copy at a higher level).
    pub fn make_move(&mut self, mv: Move) -> UndoInfo {
        let zk = zobrist::keys();
        let us = self.side_to_move;
        let them = !us;

        let undo = UndoInfo {
            captured_piece: None, // updated below if capture
            castling_rights: self.castling_rights,
            en_passant: self.en_passant,
            halfmove_clock: self.halfmove_clock,
            zobrist_hash: self.zobrist_hash,
        };

        let moving_piece = mv.piece().piece_type();

        // ---- Remove en-passant hash (if any) ----
        if let Some(ep) = self.en_passant {
            self.zobrist_hash ^= zk.ep_key(ep);
        }
        self.en_passant = None;

        // ---- Remove old castling hash ----
        self.zobrist_hash ^= zk.castling_key(self.castling_rights.0);

        // ---- Handle capture ----
        let mut captured = None;
        if mv.is_en_passant() {
            // The captured pawn sits beside the destination, not on it.
            let cap_sq = match us {
                Color::White => Square(mv.to().0 - 8),
                Color::Black => Square(mv.to().0 + 8),
            };
            self.remove_piece(cap_sq, them, PieceType::Pawn);
            self.zobrist_hash ^= zk.piece_key(Piece::new(them, PieceType::Pawn), cap_sq);
            captured = Some(PieceType::Pawn);
        } else if mv.is_capture() {
            let cap_piece = self.piece_type_at(mv.to(), them);
            self.remove_piece(mv.to(), them, cap_piece);
            self.zobrist_hash ^= zk.piece_key(Piece::new(them, cap_piece), mv.to());
            captured = Some(cap_piece);
        }

        // ---- Move the piece ----
        self.remove_piece(mv.from(), us, moving_piece);
        self.zobrist_hash ^= zk.piece_key(Piece::new(us, moving_piece), mv.from());

        let landing_piece = mv.promotion().unwrap_or(moving_piece);
        self.put_piece(mv.to(), us, landing_piece);
        self.zobrist_hash ^= zk.piece_key(Piece::new(us, landing_piece), mv.to());

        // ---- Castling: move the rook ----
        if mv.is_castle() {
            let (rook_from, rook_to) = castling_rook_squares(mv.to());
            self.remove_piece(rook_from, us, PieceType::Rook);
            self.zobrist_hash ^= zk.piece_key(Piece::new(us, PieceType::Rook), rook_from);
            self.put_piece(rook_to, us, PieceType::Rook);
            self.zobrist_hash ^= zk.piece_key(Piece::new(us, PieceType::Rook), rook_to);
        }

        // ---- Update castling rights ----
        // Moving king or rook, or capturing on a rook's home square.
        self.castling_rights.0 &= CASTLING_MASK[mv.from().0 as usize];
        self.castling_rights.0 &= CASTLING_MASK[mv.to().0 as usize];

        self.zobrist_hash ^= zk.castling_key(self.castling_rights.0);

        // ---- Double pawn push → set en passant ----
        if mv.is_double_push() {
            let ep_sq = match us {
                Color::White => Square(mv.from().0 + 8),
                Color::Black => Square(mv.from().0 - 8),
            };
            self.en_passant = Some(ep_sq);
            self.zobrist_hash ^= zk.ep_key(ep_sq);
        }

        // ---- Halfmove clock ----
        if moving_piece == PieceType::Pawn || captured.is_some() {
            self.halfmove_clock = 0;
        } else {
            self.halfmove_clock += 1;
        }

        // ---- Fullmove number ----
        if us == Color::Black {
            self.fullmove_number += 1;
        }

        // ---- Switch side ----
        self.side_to_move = them;
        self.zobrist_hash ^= zk.side_to_move;

        UndoInfo {
            captured_piece: captured,
            ..undo
        }
    }

    /// Reverse a move previously applied with `make_move`.
    pub fn undo_move(&mut self, mv: Move, undo: &UndoInfo) {
        let them = self.side_to_move; // after make_move, side was switched
        let us = !them;

        self.side_to_move = us;

        let original_piece = mv.piece().piece_type();
        let landing_piece = mv.promotion().unwrap_or(original_piece);

        // ---- Remove the piece from to-square, put back on from-square ----
        self.remove_piece(mv.to(), us, landing_piece);
        self.put_piece(mv.from(), us, original_piece);

        // ---- Restore capture ----
        if mv.is_en_passant() {
            let cap_sq = match us {
                Color::White => Square(mv.to().0 - 8),
                Color::Black => Square(mv.to().0 + 8),
            };
            self.put_piece(cap_sq, them, PieceType::Pawn);
        } else if let Some(cap_piece) = undo.captured_piece {
            self.put_piece(mv.to(), them, cap_piece);
        }

        // ---- Undo castling: move the rook back ----
        if mv.is_castle() {
            let (rook_from, rook_to) = castling_rook_squares(mv.to());
            self.remove_piece(rook_to, us, PieceType::Rook);
            self.put_piece(rook_from, us, PieceType::Rook);
        }

        // ---- Restore saved state ----
        self.castling_rights = undo.castling_rights;
        self.en_passant = undo.en_passant;
        self.halfmove_clock = undo.halfmove_clock;
        self.zobrist_hash = undo.zobrist_hash;

        // Fullmove: decrement if we're undoing a Black move.
        if us == Color::Black {
            self.fullmove_number -= 1;
        }
    }

    // -----------------------------------------------------------------------
    // Internal helper: find piece type on a square for a known colour
    // -----------------------------------------------------------------------

    /// Like `piece_at` but only checks one colour and panics if not found.
    #[inline]
    fn piece_type_at(&self, sq: Square, color: Color) -> PieceType {
        let bb = Bitboard::from_square(sq);
        for &pt in &PieceType::ALL {
            if (self.pieces[color.index()][pt.index()] & bb).is_not_empty() {
                return pt;
            }
        }
        panic!(
            "no {} piece found on {} (board:\n{})",
            color,
            sq,
            self.board_string()
        );
    }

    // -----------------------------------------------------------------------
    // Board display (8×8 text grid)
    // -----------------------------------------------------------------------

    /// Render the board as an 8-line string (rank 8 at top), for debugging.
    pub fn board_string(&self) -> String {
        let mut s = String::with_capacity(200);
        for rank in (0..8).rev() {
            s.push((b'1' + rank) as char);
            s.push(' ');
            for file in 0..8 {
                let sq = Square::from_file_rank(file, rank);
                let ch = match self.piece_at(sq) {
                    Some((c, p)) => p.to_char(c),
                    None => '.',
                };
                s.push(ch);
                if file < 7 {
                    s.push(' ');
                }
            }
            s.push('\n');
        }
        s.push_str("  a b c d e f g h");
        s
    }
}

// ---------------------------------------------------------------------------
// Castling helpers (free functions)
// ---------------------------------------------------------------------------

/// For a king-destination square (after castling), return (rook_from,
/// rook_to).
fn castling_rook_squares(king_to: Square) -> (Square, Square) {
    match king_to {
        // White kingside: king e1→g1, rook h1→f1.
        Square::G1 => (Square::H1, Square::F1),
        // White queenside: king e1→c1, rook a1→d1.
        Square::C1 => (Square::A1, Square::D1),
        // Black kingside: king e8→g8, rook h8→f8.
        Square::G8 => (Square::H8, Square::F8),
        // Black queenside: king e8→c8, rook a8→d8.
        Square::C8 => (Square::A8, Square::D8),
        _ => panic!("invalid castling king destination: {king_to}"),
    }
}

/// Mask table indexed by square. When a move touches a square, AND the
/// castling rights with this mask. E.g. if a rook on a1 moves (or is
/// captured), remove White-queenside; the king's home square removes both of
/// that side's rights.
#[rustfmt::skip]
const CASTLING_MASK: [u8; 64] = {
    let mut mask = [0b1111u8; 64];
    mask[0]  = 0b1111 & !CastlingRights::WHITE_QUEENSIDE;
    mask[4]  = 0b1111 & !(CastlingRights::WHITE_KINGSIDE | CastlingRights::WHITE_QUEENSIDE);
    mask[7]  = 0b1111 & !CastlingRights::WHITE_KINGSIDE;
    mask[56] = 0b1111 & !CastlingRights::BLACK_QUEENSIDE;
    mask[60] = 0b1111 & !(CastlingRights::BLACK_KINGSIDE | CastlingRights::BLACK_QUEENSIDE);
    mask[63] = 0b1111 & !CastlingRights::BLACK_KINGSIDE;
    mask
};

// ---------------------------------------------------------------------------
// FEN parsing & generation
// ---------------------------------------------------------------------------

impl Position {
    /// Parse a FEN string into a `Position`.
    ///
    /// Validates all 6 fields (piece placement, side to move, castling, en
    /// passant, halfmove clock, fullmove number), exactly one king per side,
    /// no pawns on the back ranks, and at most 16 pieces per side.
    pub fn from_fen(fen: &str) -> Result<Self, ChessError> {
        let fields: Vec<&str> = fen.split_whitespace().collect();
        if fields.len() != 6 {
            return Err(ChessError::InvalidFen(format!(
                "expected 6 fields, got {}",
                fields.len()
            )));
        }

        let mut pos = Position::empty();

        // ----- Field 1: Piece placement -----
        let ranks: Vec<&str> = fields[0].split('/').collect();
        if ranks.len() != 8 {
            return Err(ChessError::InvalidFen(format!(
                "expected 8 ranks, got {}",
                ranks.len()
            )));
        }

        for (rank_idx, rank_str) in ranks.iter().enumerate() {
            let rank = 7 - rank_idx as u8; // FEN starts from rank 8
            let mut file: u8 = 0;
            for ch in rank_str.chars() {
                if file > 7 {
                    return Err(ChessError::InvalidFen(format!(
                        "too many squares in rank {}",
                        rank + 1
                    )));
                }
                if let Some(digit) = ch.to_digit(10) {
                    if !(1..=8).contains(&digit) {
                        return Err(ChessError::InvalidFen(format!(
                            "invalid empty count '{ch}' in rank {}",
                            rank + 1
                        )));
                    }
                    file += digit as u8;
                } else if let Some((color, piece)) = PieceType::from_char(ch) {
                    let sq = Square::from_file_rank(file, rank);
                    pos.put_piece(sq, color, piece);
                    file += 1;
                } else {
                    return Err(ChessError::InvalidPiece(ch));
                }
            }
            if file != 8 {
                return Err(ChessError::InvalidFen(format!(
                    "rank {} has {} squares instead of 8",
                    rank + 1,
                    file
                )));
            }
        }

        // Exactly one king per side.
        for color in [Color::White, Color::Black] {
            let king_count = pos.pieces[color.index()][PieceType::King.index()].pop_count();
            if king_count == 0 {
                return Err(ChessError::NoKing(color));
            }
            if king_count > 1 {
                return Err(ChessError::MultipleKings(color));
            }
            if pos.occupied[color.index()].pop_count() > 16 {
                return Err(ChessError::TooManyPieces);
            }
        }

        // No pawns on the first or last rank.
        let pawns = pos.bb(Color::White, PieceType::Pawn) | pos.bb(Color::Black, PieceType::Pawn);
        if (pawns & (Bitboard::RANK_1 | Bitboard::RANK_8)).is_not_empty() {
            return Err(ChessError::PawnOnBackRank);
        }

        // ----- Field 2: Side to move -----
        pos.side_to_move = match fields[1] {
            "w" => Color::White,
            "b" => Color::Black,
            other => return Err(ChessError::InvalidSideToMove(other.to_string())),
        };

        // ----- Field 3: Castling availability -----
        pos.castling_rights = CastlingRights::from_fen(fields[2])
            .ok_or_else(|| ChessError::InvalidCastling(fields[2].to_string()))?;

        // ----- Field 4: En passant target square -----
        if fields[3] != "-" {
            let ep_sq = Square::from_algebraic(&fields[3].to_ascii_lowercase())
                .ok_or_else(|| ChessError::InvalidEnPassant(fields[3].to_string()))?;
            // Target must be on rank 3 (White pushed) or rank 6 (Black pushed).
            let rank = ep_sq.rank();
            if rank != 2 && rank != 5 {
                return Err(ChessError::InvalidEnPassant(fields[3].to_string()));
            }
            pos.en_passant = Some(ep_sq);
        }

        // ----- Field 5: Halfmove clock -----
        pos.halfmove_clock = fields[4]
            .parse::<u16>()
            .map_err(|_| ChessError::InvalidHalfmove(fields[4].to_string()))?;

        // ----- Field 6: Fullmove number -----
        pos.fullmove_number = fields[5]
            .parse::<u16>()
            .map_err(|_| ChessError::InvalidFullmove(fields[5].to_string()))?;
        if pos.fullmove_number == 0 {
            return Err(ChessError::InvalidFullmove(fields[5].to_string()));
        }

        // Compute the Zobrist hash from scratch.
        pos.zobrist_hash = pos.compute_zobrist();

        #[cfg(debug_assertions)]
        pos.assert_consistent();

        Ok(pos)
    }

    /// Export the position as a FEN string.
    pub fn to_fen(&self) -> String {
        let mut fen = String::with_capacity(80);

        // ----- Field 1: Piece placement -----
        for rank in (0..8).rev() {
            let mut empty_count = 0u8;
            for file in 0..8 {
                let sq = Square::from_file_rank(file, rank);
                match self.piece_at(sq) {
                    Some((color, piece)) => {
                        if empty_count > 0 {
                            fen.push((b'0' + empty_count) as char);
                            empty_count = 0;
                        }
                        fen.push(piece.to_char(color));
                    }
                    None => {
                        empty_count += 1;
                    }
                }
            }
            if empty_count > 0 {
                fen.push((b'0' + empty_count) as char);
            }
            if rank > 0 {
                fen.push('/');
            }
        }

        // ----- Field 2: Side to move -----
        fen.push(' ');
        fen.push(match self.side_to_move {
            Color::White => 'w',
            Color::Black => 'b',
        });

        // ----- Field 3: Castling -----
        fen.push(' ');
        fen.push_str(&self.castling_rights.to_fen());

        // ----- Field 4: En passant -----
        fen.push(' ');
        match self.en_passant {
            Some(sq) => fen.push_str(&sq.to_algebraic()),
            None => fen.push('-'),
        }

        // ----- Field 5: Halfmove clock -----
        fen.push(' ');
        fen.push_str(&self.halfmove_clock.to_string());

        // ----- Field 6: Fullmove number -----
        fen.push(' ');
        fen.push_str(&self.fullmove_number.to_string());

        fen
    }
}

// ---------------------------------------------------------------------------
// Display
// ---------------------------------------------------------------------------

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.board_string())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn starting() -> Position {
        Position::starting()
    }

    fn sq(name: &str) -> Square {
        Square::from_algebraic(name).unwrap()
    }

    // ===================================================================
    // Starting position
    // ===================================================================

    #[test]
    fn starting_position_fen() {
        let pos = starting();
        assert_eq!(pos.to_fen(), STARTING_FEN);
    }

    #[test]
    fn starting_position_side_to_move() {
        let pos = starting();
        assert_eq!(pos.side_to_move, Color::White);
    }

    #[test]
    fn starting_position_castling() {
        let pos = starting();
        assert_eq!(pos.castling_rights, CastlingRights::ALL);
    }

    #[test]
    fn starting_position_en_passant() {
        let pos = starting();
        assert_eq!(pos.en_passant, None);
    }

    #[test]
    fn starting_position_clocks() {
        let pos = starting();
        assert_eq!(pos.halfmove_clock, 0);
        assert_eq!(pos.fullmove_number, 1);
    }

    #[test]
    fn starting_position_piece_count() {
        let pos = starting();
        assert_eq!(pos.all_occupied.pop_count(), 32);
        assert_eq!(pos.occupied[Color::White.index()].pop_count(), 16);
        assert_eq!(pos.occupied[Color::Black.index()].pop_count(), 16);
    }

    // ===================================================================
    // piece_at queries
    // ===================================================================

    #[test]
    fn piece_at_white_king() {
        let pos = starting();
        assert_eq!(pos.piece_at(sq("e1")), Some((Color::White, PieceType::King)));
    }

    #[test]
    fn piece_at_black_queen() {
        let pos = starting();
        assert_eq!(
            pos.piece_at(sq("d8")),
            Some((Color::Black, PieceType::Queen))
        );
    }

    #[test]
    fn piece_at_empty_squares() {
        let pos = starting();
        for rank in 3..=6 {
            for file in b'a'..=b'h' {
                let name = format!("{}{}", file as char, rank);
                assert_eq!(pos.piece_at(sq(&name)), None, "expected empty on {name}");
            }
        }
    }

    #[test]
    fn encoded_piece_at_matches() {
        let pos = starting();
        assert_eq!(pos.encoded_piece_at(sq("e1")), Some(Piece::W_KING));
        assert_eq!(pos.encoded_piece_at(sq("d8")), Some(Piece::B_QUEEN));
        assert_eq!(pos.encoded_piece_at(sq("e4")), None);
    }

    // ===================================================================
    // king_sq
    // ===================================================================

    #[test]
    fn king_sq_starting() {
        let pos = starting();
        assert_eq!(pos.king_sq(Color::White), sq("e1"));
        assert_eq!(pos.king_sq(Color::Black), sq("e8"));
    }

    // ===================================================================
    // put_piece / remove_piece
    // ===================================================================

    #[test]
    fn put_and_remove_piece() {
        let mut pos = Position::empty();
        let e4 = sq("e4");

        pos.put_piece(e4, Color::White, PieceType::Knight);
        assert_eq!(pos.piece_at(e4), Some((Color::White, PieceType::Knight)));
        assert!(pos.all_occupied.is_set(e4));

        pos.remove_piece(e4, Color::White, PieceType::Knight);
        assert_eq!(pos.piece_at(e4), None);
        assert!(!pos.all_occupied.is_set(e4));
    }

    // ===================================================================
    // Attack detection
    // ===================================================================

    #[test]
    fn starting_position_no_check() {
        let pos = starting();
        assert!(!pos.is_in_check());
        assert!(!pos.is_king_attacked(Color::White));
        assert!(!pos.is_king_attacked(Color::Black));
    }

    #[test]
    fn rook_gives_check() {
        // Black rook on e8 attacks white king on e1 down the open file.
        let pos = Position::from_fen("4r2k/8/8/8/8/8/8/4K3 w - - 0 1").unwrap();
        assert!(pos.is_king_attacked(Color::White));
        assert!(!pos.is_king_attacked(Color::Black));
    }

    #[test]
    fn pawn_attack_direction() {
        // Black pawn on d2 attacks e1/c1; white king on e1 is in check.
        let pos = Position::from_fen("7k/8/8/8/8/8/3p4/4K3 w - - 0 1").unwrap();
        assert!(pos.is_king_attacked(Color::White));
    }

    #[test]
    fn attackers_to_counts_double_check() {
        // White king e1 attacked by rook e8 and knight d3.
        let pos = Position::from_fen("4r2k/8/8/8/8/3n4/8/4K3 w - - 0 1").unwrap();
        let attackers = pos.attackers_to(pos.king_sq(Color::White), Color::White);
        assert_eq!(attackers.pop_count(), 2);
    }

    // ===================================================================
    // Zobrist hash
    // ===================================================================

    #[test]
    fn zobrist_hash_nonzero_for_starting() {
        let pos = starting();
        assert_ne!(pos.zobrist_hash, 0);
    }

    #[test]
    fn zobrist_hash_matches_recompute() {
        let pos = starting();
        assert_eq!(pos.zobrist_hash, pos.compute_zobrist());
    }

    #[test]
    fn zobrist_different_positions_differ() {
        let pos1 = starting();
        let pos2 =
            Position::from_fen("rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1")
                .unwrap();
        assert_ne!(pos1.zobrist_hash, pos2.zobrist_hash);
    }

    #[test]
    fn zobrist_ep_square_matters() {
        let without =
            Position::from_fen("rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1")
                .unwrap();
        let with =
            Position::from_fen("rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1")
                .unwrap();
        assert_ne!(without.zobrist_hash, with.zobrist_hash);
    }

    // ===================================================================
    // FEN parsing
    // ===================================================================

    #[test]
    fn fen_round_trip_starting() {
        let pos = Position::from_fen(STARTING_FEN).unwrap();
        assert_eq!(pos.to_fen(), STARTING_FEN);
    }

    #[test]
    fn fen_round_trip_after_e4() {
        let fen = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1";
        let pos = Position::from_fen(fen).unwrap();
        assert_eq!(pos.to_fen(), fen);
    }

    #[test]
    fn fen_round_trip_kiwipete() {
        let fen = "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1";
        let pos = Position::from_fen(fen).unwrap();
        assert_eq!(pos.to_fen(), fen);
    }

    #[test]
    fn fen_round_trip_endgame() {
        let fen = "8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1";
        let pos = Position::from_fen(fen).unwrap();
        assert_eq!(pos.to_fen(), fen);
    }

    #[test]
    fn fen_uppercase_ep_square_normalised() {
        let fen = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq E3 0 1";
        let pos = Position::from_fen(fen).unwrap();
        assert_eq!(pos.en_passant, Some(sq("e3")));
        assert!(pos.to_fen().contains(" e3 "));
    }

    // ===================================================================
    // FEN validation errors
    // ===================================================================

    #[test]
    fn fen_error_wrong_field_count() {
        assert!(
            Position::from_fen("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq -").is_err()
        );
    }

    #[test]
    fn fen_error_wrong_rank_count() {
        assert!(
            Position::from_fen("rnbqkbnr/pppppppp/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1").is_err()
        );
    }

    #[test]
    fn fen_error_invalid_piece_char() {
        assert_eq!(
            Position::from_fen("xnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1"),
            Err(ChessError::InvalidPiece('x'))
        );
    }

    #[test]
    fn fen_error_invalid_side_to_move() {
        assert!(matches!(
            Position::from_fen("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR x KQkq - 0 1"),
            Err(ChessError::InvalidSideToMove(_))
        ));
    }

    #[test]
    fn fen_error_invalid_castling() {
        assert!(matches!(
            Position::from_fen("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w XYZ - 0 1"),
            Err(ChessError::InvalidCastling(_))
        ));
    }

    #[test]
    fn fen_error_invalid_ep_square() {
        assert!(matches!(
            Position::from_fen("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq z9 0 1"),
            Err(ChessError::InvalidEnPassant(_))
        ));
    }

    #[test]
    fn fen_error_ep_wrong_rank() {
        // e4 is rank 4, not 3 or 6 — invalid for en passant target.
        assert!(matches!(
            Position::from_fen("rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e4 0 1"),
            Err(ChessError::InvalidEnPassant(_))
        ));
    }

    #[test]
    fn fen_error_invalid_halfmove() {
        assert!(matches!(
            Position::from_fen("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - abc 1"),
            Err(ChessError::InvalidHalfmove(_))
        ));
    }

    #[test]
    fn fen_error_fullmove_zero() {
        assert!(matches!(
            Position::from_fen("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 0"),
            Err(ChessError::InvalidFullmove(_))
        ));
    }

    #[test]
    fn fen_error_no_white_king() {
        assert_eq!(
            Position::from_fen("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQ1BNR w KQkq - 0 1"),
            Err(ChessError::NoKing(Color::White))
        );
    }

    #[test]
    fn fen_error_two_white_kings() {
        assert_eq!(
            Position::from_fen("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBKKBNR w KQkq - 0 1"),
            Err(ChessError::MultipleKings(Color::White))
        );
    }

    #[test]
    fn fen_error_pawn_on_back_rank() {
        assert_eq!(
            Position::from_fen("rnbqkbnP/pppppppp/8/8/8/8/PPPPPPP1/RNBQKBNR w KQkq - 0 1"),
            Err(ChessError::PawnOnBackRank)
        );
    }

    #[test]
    fn fen_error_too_many_pieces() {
        // 17 white pieces: full back rank + 8 pawns + an extra knight.
        assert_eq!(
            Position::from_fen("4k3/8/8/8/N7/PPPPPPPP/PPPPPPPP/RNBQKBNR w - - 0 1"),
            Err(ChessError::TooManyPieces)
        );
    }

    #[test]
    fn fen_error_rank_too_long() {
        assert!(
            Position::from_fen("rnbqkbnrr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1")
                .is_err()
        );
    }

    // ===================================================================
    // make_move / undo_move on packed moves
    // ===================================================================

    #[test]
    fn make_move_e2e4_updates_state() {
        let mut pos = starting();
        let mv = Move::new(sq("e2"), sq("e4"), Piece::W_PAWN).with_double_push();
        let undo = pos.make_move(mv);

        assert_eq!(pos.side_to_move, Color::Black);
        assert_eq!(pos.en_passant, Some(sq("e3")));
        assert_eq!(pos.halfmove_clock, 0);
        assert_eq!(pos.fullmove_number, 1);
        assert_eq!(pos.piece_at(sq("e4")), Some((Color::White, PieceType::Pawn)));
        assert_eq!(pos.piece_at(sq("e2")), None);
        assert_eq!(undo.captured_piece, None);
        pos.assert_consistent();
    }

    #[test]
    fn make_undo_restores_position_exactly() {
        let fen = "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1";
        let original = Position::from_fen(fen).unwrap();
        let mut pos = original.clone();

        let mv = Move::new(sq("e2"), sq("a6"), Piece::W_BISHOP).with_capture();
        let undo = pos.make_move(mv);
        assert_ne!(pos.to_fen(), fen);

        pos.undo_move(mv, &undo);
        assert_eq!(pos.to_fen(), fen);
        assert_eq!(pos.zobrist_hash, original.zobrist_hash);
        pos.assert_consistent();
    }

    #[test]
    fn make_move_castle_moves_rook() {
        let mut pos = Position::from_fen("r3k2r/pppppppp/8/8/8/8/PPPPPPPP/R3K2R w KQkq - 0 1")
            .unwrap();
        let mv = Move::new(sq("e1"), sq("g1"), Piece::W_KING).with_castle();
        pos.make_move(mv);
        assert_eq!(pos.piece_at(sq("g1")), Some((Color::White, PieceType::King)));
        assert_eq!(pos.piece_at(sq("f1")), Some((Color::White, PieceType::Rook)));
        assert_eq!(pos.piece_at(sq("h1")), None);
        assert!(!pos.castling_rights.can_castle_kingside(Color::White));
        assert!(!pos.castling_rights.can_castle_queenside(Color::White));
        pos.assert_consistent();
    }

    #[test]
    fn make_move_en_passant_removes_adjacent_pawn() {
        // White pawn e5, black just played d7-d5.
        let mut pos = Position::from_fen(
            "rnbqkbnr/ppp1pppp/8/3pP3/8/8/PPPP1PPP/RNBQKBNR w KQkq d6 0 3",
        )
        .unwrap();
        let mv = Move::new(sq("e5"), sq("d6"), Piece::W_PAWN).with_en_passant();
        let undo = pos.make_move(mv);
        assert_eq!(pos.piece_at(sq("d5")), None, "captured pawn removed");
        assert_eq!(pos.piece_at(sq("d6")), Some((Color::White, PieceType::Pawn)));
        assert_eq!(undo.captured_piece, Some(PieceType::Pawn));
        pos.assert_consistent();
    }

    #[test]
    fn make_move_promotion_replaces_pawn() {
        let mut pos = Position::from_fen("7k/4P3/8/8/8/8/8/4K3 w - - 0 1").unwrap();
        let mv = Move::new(sq("e7"), sq("e8"), Piece::W_PAWN).with_promotion(PieceType::Queen);
        pos.make_move(mv);
        assert_eq!(pos.piece_at(sq("e8")), Some((Color::White, PieceType::Queen)));
        assert_eq!(pos.bb(Color::White, PieceType::Pawn).pop_count(), 0);
        pos.assert_consistent();
    }

    #[test]
    fn halfmove_clock_resets_on_pawn_move_and_capture() {
        let mut pos = Position::from_fen("r3k3/8/8/8/8/8/P7/R3K3 w - - 10 20").unwrap();
        // Rook move: clock increments.
        let undo = pos.make_move(Move::new(sq("a1"), sq("b1"), Piece::W_ROOK));
        assert_eq!(pos.halfmove_clock, 11);
        pos.undo_move(Move::new(sq("a1"), sq("b1"), Piece::W_ROOK), &undo);

        // Pawn move: clock resets.
        pos.make_move(Move::new(sq("a2"), sq("a3"), Piece::W_PAWN));
        assert_eq!(pos.halfmove_clock, 0);
    }

    #[test]
    fn castling_rights_cleared_when_rook_captured() {
        let mut pos =
            Position::from_fen("r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1").unwrap();
        // White rook captures the h8 rook: black loses kingside rights.
        let mv = Move::new(sq("h1"), sq("h8"), Piece::W_ROOK).with_capture();
        pos.make_move(mv);
        assert!(!pos.castling_rights.can_castle_kingside(Color::Black));
        assert!(pos.castling_rights.can_castle_queenside(Color::Black));
        // White also loses kingside rights (rook left h1).
        assert!(!pos.castling_rights.can_castle_kingside(Color::White));
    }

    #[test]
    fn fullmove_increments_after_black() {
        let mut pos = starting();
        pos.make_move(Move::new(sq("e2"), sq("e4"), Piece::W_PAWN).with_double_push());
        assert_eq!(pos.fullmove_number, 1);
        pos.make_move(Move::new(sq("e7"), sq("e5"), Piece::B_PAWN).with_double_push());
        assert_eq!(pos.fullmove_number, 2);
    }

    // ===================================================================
    // Consistency check
    // ===================================================================

    #[test]
    fn starting_position_is_consistent() {
        starting().assert_consistent();
    }

    #[test]
    fn fen_loaded_position_is_consistent() {
        let pos = Position::from_fen(
            "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
        )
        .unwrap();
        pos.assert_consistent();
    }
}
