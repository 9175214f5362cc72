//! Move generation and candidate-move construction.
//!
//! Pipeline:
//!   1. Generate pseudo-legal moves (ignoring pins / check evasion).
//!   2. Filter: make the move on a copy, verify the king is not attacked.
//!
//! This "make-and-check" approach is simple and correct; the session layer
//! enforces legality the same way when a client submits `(from, to, promo)`.

use crate::engine::attacks;
use crate::engine::board::Position;
use crate::engine::types::{
    Bitboard, CastlingRights, ChessError, Color, Move, Piece, PieceType, Square,
};

// =========================================================================
// Public API
// =========================================================================

/// Generate all legal moves for the side to move.
pub fn legal_moves(pos: &Position) -> Vec<Move> {
    let mut pseudo = Vec::with_capacity(64);
    generate_pseudo_legal(pos, &mut pseudo);

    let us = pos.side_to_move;
    let mut legal = Vec::with_capacity(pseudo.len());
    for mv in pseudo {
        let mut copy = pos.clone();
        copy.make_move(mv);
        if !copy.is_king_attacked(us) {
            legal.push(mv);
        }
    }
    legal
}

/// Does the side to move have at least one legal move?
///
/// Runs after every committed move to classify checkmate/stalemate, so it
/// early-returns on the first legal candidate. When the king is attacked by
/// two or more pieces only king moves can be legal, which prunes the search
/// considerably.
pub fn has_any_legal_move(pos: &Position) -> bool {
    let us = pos.side_to_move;
    let king_sq = pos.king_sq(us);

    let attackers = pos.attackers_to(king_sq, us);
    if attackers.pop_count() >= 2 {
        // Double check: only the king can move.
        let t = attacks::tables();
        let king = Piece::new(us, PieceType::King);
        let targets = t.king_attacks(king_sq) & !pos.occupied[us.index()];
        for to in targets.iter() {
            let mut mv = Move::new(king_sq, to, king);
            if pos.enemy().is_set(to) {
                mv = mv.with_capture();
            }
            let mut copy = pos.clone();
            copy.make_move(mv);
            if !copy.is_king_attacked(us) {
                return true;
            }
        }
        return false;
    }

    let mut pseudo = Vec::with_capacity(64);
    generate_pseudo_legal(pos, &mut pseudo);
    for mv in pseudo {
        let mut copy = pos.clone();
        copy.make_move(mv);
        if !copy.is_king_attacked(us) {
            return true;
        }
    }
    false
}

/// Build a candidate move from client coordinates, validating piece
/// geometry against the current position.
///
/// Capture, en-passant, double-push and castle flags are resolved here; the
/// caller still has to reject moves that leave the own king attacked.
pub fn build_move(
    pos: &Position,
    from: Square,
    to: Square,
    promo: Option<PieceType>,
) -> Result<Move, ChessError> {
    let Some(piece) = pos.encoded_piece_at(from) else {
        return Err(ChessError::InvalidMove);
    };
    let side = piece.color();
    let t = attacks::tables();
    let ally = pos.occupied[side.index()];
    let enemy = pos.occupied[(!side).index()];
    let occ = pos.all_occupied;
    let to_bb = Bitboard::from_square(to);

    match piece.piece_type() {
        PieceType::Pawn => build_pawn_move(pos, piece, from, to, promo),
        PieceType::Knight => {
            if (t.knight_attacks(from) & !ally & to_bb).is_empty() {
                return Err(ChessError::InvalidMove);
            }
            Ok(flag_capture(Move::new(from, to, piece), enemy, to))
        }
        PieceType::Bishop => {
            if (t.bishop_attacks(from, occ) & !ally & to_bb).is_empty() {
                return Err(ChessError::InvalidMove);
            }
            Ok(flag_capture(Move::new(from, to, piece), enemy, to))
        }
        PieceType::Rook => {
            if (t.rook_attacks(from, occ) & !ally & to_bb).is_empty() {
                return Err(ChessError::InvalidMove);
            }
            Ok(flag_capture(Move::new(from, to, piece), enemy, to))
        }
        PieceType::Queen => {
            if (t.queen_attacks(from, occ) & !ally & to_bb).is_empty() {
                return Err(ChessError::InvalidMove);
            }
            Ok(flag_capture(Move::new(from, to, piece), enemy, to))
        }
        PieceType::King => build_king_move(pos, piece, from, to),
    }
}

#[inline]
fn flag_capture(mv: Move, enemy: Bitboard, to: Square) -> Move {
    if enemy.is_set(to) { mv.with_capture() } else { mv }
}

fn build_pawn_move(
    pos: &Position,
    piece: Piece,
    from: Square,
    to: Square,
    promo: Option<PieceType>,
) -> Result<Move, ChessError> {
    let side = piece.color();
    let t = attacks::tables();
    let enemy = pos.occupied[(!side).index()];
    let occ = pos.all_occupied;

    let (step, start_rank, promo_rank): (i8, u8, u8) = match side {
        Color::White => (8, 1, 7),
        Color::Black => (-8, 6, 0),
    };

    let check_promotion = |mv: Move| -> Result<Move, ChessError> {
        if to.rank() == promo_rank {
            match promo {
                Some(
                    pt @ (PieceType::Queen | PieceType::Rook | PieceType::Bishop
                    | PieceType::Knight),
                ) => Ok(mv.with_promotion(pt)),
                _ => Err(ChessError::InvalidPromotion),
            }
        } else {
            Ok(mv)
        }
    };

    // Single push into an empty square.
    if from.0 as i8 + step == to.0 as i8 && !occ.is_set(to) {
        return check_promotion(Move::new(from, to, piece));
    }

    // Double push from the starting rank, both squares empty.
    if from.rank() == start_rank && from.0 as i8 + step * 2 == to.0 as i8 {
        let mid = Square((from.0 as i8 + step) as u8);
        if !occ.is_set(mid) && !occ.is_set(to) {
            return Ok(Move::new(from, to, piece).with_double_push());
        }
        return Err(ChessError::InvalidMove);
    }

    // Diagonal capture, including en passant into the remembered square.
    if t.pawn_attacks(side, from).is_set(to) {
        if pos.en_passant == Some(to) {
            return Ok(Move::new(from, to, piece).with_en_passant());
        }
        if enemy.is_set(to) {
            return check_promotion(Move::new(from, to, piece).with_capture());
        }
    }

    Err(ChessError::InvalidMove)
}

fn build_king_move(
    pos: &Position,
    piece: Piece,
    from: Square,
    to: Square,
) -> Result<Move, ChessError> {
    let side = piece.color();
    let t = attacks::tables();
    let ally = pos.occupied[side.index()];
    let enemy = pos.occupied[(!side).index()];

    // Ordinary king step. Rejecting an attacked destination early is an
    // optimisation only — the make-on-copy check is still authoritative.
    if (t.king_attacks(from) & !ally).is_set(to) && !pos.is_square_attacked(to, side) {
        return Ok(flag_capture(Move::new(from, to, piece), enemy, to));
    }

    // Castling: king two squares sideways from its home square.
    let (home, ks_to, qs_to, ks_right, qs_right) = match side {
        Color::White => (
            Square::E1,
            Square::G1,
            Square::C1,
            CastlingRights::WHITE_KINGSIDE,
            CastlingRights::WHITE_QUEENSIDE,
        ),
        Color::Black => (
            Square::E8,
            Square::G8,
            Square::C8,
            CastlingRights::BLACK_KINGSIDE,
            CastlingRights::BLACK_QUEENSIDE,
        ),
    };

    if from == home && to == ks_to && pos.castling_rights.has(ks_right) {
        let f = Square(home.0 + 1);
        let g = Square(home.0 + 2);
        if !pos.all_occupied.is_set(f)
            && !pos.all_occupied.is_set(g)
            && !pos.is_square_attacked(home, side)
            && !pos.is_square_attacked(f, side)
            && !pos.is_square_attacked(g, side)
        {
            return Ok(Move::new(from, to, piece).with_castle());
        }
    }

    if from == home && to == qs_to && pos.castling_rights.has(qs_right) {
        let b = Square(home.0 - 3);
        let c = Square(home.0 - 2);
        let d = Square(home.0 - 1);
        if !pos.all_occupied.is_set(b)
            && !pos.all_occupied.is_set(c)
            && !pos.all_occupied.is_set(d)
            && !pos.is_square_attacked(home, side)
            && !pos.is_square_attacked(d, side)
            && !pos.is_square_attacked(c, side)
        {
            return Ok(Move::new(from, to, piece).with_castle());
        }
    }

    Err(ChessError::InvalidMove)
}

// =========================================================================
// Pseudo-legal generation
// =========================================================================

pub fn generate_pseudo_legal(pos: &Position, moves: &mut Vec<Move>) {
    let us = pos.side_to_move;
    generate_pawn_moves(pos, us, moves);
    generate_knight_moves(pos, us, moves);
    generate_king_moves(pos, us, moves);
    generate_slider_moves(pos, us, PieceType::Bishop, moves);
    generate_slider_moves(pos, us, PieceType::Rook, moves);
    generate_slider_moves(pos, us, PieceType::Queen, moves);
    generate_castling_moves(pos, us, moves);
}

// =========================================================================
// Pawn moves
// =========================================================================

fn generate_pawn_moves(pos: &Position, us: Color, moves: &mut Vec<Move>) {
    let t = attacks::tables();
    let piece = Piece::new(us, PieceType::Pawn);
    let pawns = pos.bb(us, PieceType::Pawn);
    let enemy = pos.occupied[(!us).index()];
    let empty = !pos.all_occupied;

    let (push_dir, start_rank, promo_rank): (i8, u8, u8) = match us {
        Color::White => (8, 1, 6),  // rank 2 start, rank 7 promotes
        Color::Black => (-8, 6, 1), // rank 7 start, rank 2 promotes
    };

    for from in pawns.iter() {
        let from_rank = from.rank();

        // --- Single push ---
        let to = Square((from.0 as i8 + push_dir) as u8);
        if empty.is_set(to) {
            if from_rank == promo_rank {
                add_promotions(Move::new(from, to, piece), moves);
            } else {
                moves.push(Move::new(from, to, piece));
            }

            // --- Double push ---
            if from_rank == start_rank {
                let to2 = Square((from.0 as i8 + push_dir * 2) as u8);
                if empty.is_set(to2) {
                    moves.push(Move::new(from, to2, piece).with_double_push());
                }
            }
        }

        // --- Captures (including promotion captures) ---
        let attack_bb = t.pawn_attacks(us, from) & enemy;
        for to in attack_bb.iter() {
            if from_rank == promo_rank {
                add_promotions(Move::new(from, to, piece).with_capture(), moves);
            } else {
                moves.push(Move::new(from, to, piece).with_capture());
            }
        }

        // --- En passant ---
        if let Some(ep_sq) = pos.en_passant
            && t.pawn_attacks(us, from).is_set(ep_sq)
        {
            moves.push(Move::new(from, ep_sq, piece).with_en_passant());
        }
    }
}

/// Add all four promotion variants for a pawn push or capture.
fn add_promotions(base: Move, moves: &mut Vec<Move>) {
    for &promo in &[
        PieceType::Queen,
        PieceType::Rook,
        PieceType::Bishop,
        PieceType::Knight,
    ] {
        moves.push(base.with_promotion(promo));
    }
}

// =========================================================================
// Knight moves
// =========================================================================

fn generate_knight_moves(pos: &Position, us: Color, moves: &mut Vec<Move>) {
    let t = attacks::tables();
    let piece = Piece::new(us, PieceType::Knight);
    let knights = pos.bb(us, PieceType::Knight);
    let friendly = pos.occupied[us.index()];
    let enemy = pos.occupied[(!us).index()];

    for from in knights.iter() {
        let targets = t.knight_attacks(from) & !friendly;
        for to in targets.iter() {
            moves.push(flag_capture(Move::new(from, to, piece), enemy, to));
        }
    }
}

// =========================================================================
// King moves (non-castling)
// =========================================================================

fn generate_king_moves(pos: &Position, us: Color, moves: &mut Vec<Move>) {
    let t = attacks::tables();
    let piece = Piece::new(us, PieceType::King);
    let king_sq = pos.king_sq(us);
    let friendly = pos.occupied[us.index()];
    let enemy = pos.occupied[(!us).index()];

    let targets = t.king_attacks(king_sq) & !friendly;
    for to in targets.iter() {
        moves.push(flag_capture(Move::new(king_sq, to, piece), enemy, to));
    }
}

// =========================================================================
// Slider moves (bishop, rook, queen)
// =========================================================================

fn generate_slider_moves(pos: &Position, us: Color, piece_type: PieceType, moves: &mut Vec<Move>) {
    let t = attacks::tables();
    let piece = Piece::new(us, piece_type);
    let pieces = pos.bb(us, piece_type);
    let friendly = pos.occupied[us.index()];
    let enemy = pos.occupied[(!us).index()];
    let occ = pos.all_occupied;

    for from in pieces.iter() {
        let attacks = match piece_type {
            PieceType::Bishop => t.bishop_attacks(from, occ),
            PieceType::Rook => t.rook_attacks(from, occ),
            PieceType::Queen => t.queen_attacks(from, occ),
            _ => unreachable!(),
        };
        let targets = attacks & !friendly;
        for to in targets.iter() {
            moves.push(flag_capture(Move::new(from, to, piece), enemy, to));
        }
    }
}

// =========================================================================
// Castling
// =========================================================================

fn generate_castling_moves(pos: &Position, us: Color, moves: &mut Vec<Move>) {
    let piece = Piece::new(us, PieceType::King);

    // Can't castle while in check.
    let king_sq = pos.king_sq(us);
    if pos.is_square_attacked(king_sq, us) {
        return;
    }

    let (ks_right, qs_right, rank_base) = match us {
        Color::White => (
            CastlingRights::WHITE_KINGSIDE,
            CastlingRights::WHITE_QUEENSIDE,
            0u8,
        ),
        Color::Black => (
            CastlingRights::BLACK_KINGSIDE,
            CastlingRights::BLACK_QUEENSIDE,
            56u8,
        ),
    };

    // Kingside: king e→g, path through f and g must be clear and unattacked.
    if pos.castling_rights.has(ks_right) {
        let f_sq = Square(rank_base + 5);
        let g_sq = Square(rank_base + 6);
        if !pos.all_occupied.is_set(f_sq)
            && !pos.all_occupied.is_set(g_sq)
            && !pos.is_square_attacked(f_sq, us)
            && !pos.is_square_attacked(g_sq, us)
        {
            moves.push(Move::new(king_sq, g_sq, piece).with_castle());
        }
    }

    // Queenside: king e→c, path through b, c, d clear; c and d unattacked.
    if pos.castling_rights.has(qs_right) {
        let b_sq = Square(rank_base + 1);
        let c_sq = Square(rank_base + 2);
        let d_sq = Square(rank_base + 3);
        if !pos.all_occupied.is_set(b_sq)
            && !pos.all_occupied.is_set(c_sq)
            && !pos.all_occupied.is_set(d_sq)
            && !pos.is_square_attacked(c_sq, us)
            && !pos.is_square_attacked(d_sq, us)
        {
            moves.push(Move::new(king_sq, c_sq, piece).with_castle());
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
