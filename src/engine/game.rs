//! Rules-complete game state on top of `Position`.
//!
//! `GameState` validates and applies client moves, keeps the move history
//! with pre-move Zobrist hashes for repetition detection, and classifies the
//! result after every move (checkmate, stalemate, and the automatic draws).
//! It knows nothing about clocks or sessions; those live a layer up.

use crate::engine::board::{Position, STARTING_FEN, UndoInfo};
use crate::engine::movegen;
use crate::engine::types::{ChessError, Color, GameStatus, Move, PieceType, Square};

// =========================================================================
// History
// =========================================================================

/// One played move together with the Zobrist hash of the position it was
/// played *from*. The current position plus two matching entries in the
/// window of reversible moves make a threefold repetition.
#[derive(Clone, Copy, Debug)]
pub struct HistoryEntry {
    pub mv: Move,
    pub hash: u64,
}

// =========================================================================
// GameState
// =========================================================================

/// A complete chess game: position, history, and result classification.
#[derive(Clone, Debug)]
pub struct GameState {
    position: Position,
    history: Vec<HistoryEntry>,
    undo_stack: Vec<UndoInfo>,
    starting_fen: String,
    result: GameStatus,
}

impl GameState {
    // -----------------------------------------------------------------
    // Constructors
    // -----------------------------------------------------------------

    /// New game from the standard starting position.
    pub fn new() -> Self {
        Self::from_fen(STARTING_FEN).expect("starting FEN is always valid")
    }

    /// New game from a FEN string.
    pub fn from_fen(fen: &str) -> Result<Self, ChessError> {
        let position = Position::from_fen(fen)?;
        Ok(Self {
            position,
            history: Vec::with_capacity(64),
            undo_stack: Vec::with_capacity(64),
            starting_fen: fen.to_string(),
            result: GameStatus::Ongoing,
        })
    }

    // -----------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------

    /// Current board position.
    pub fn position(&self) -> &Position {
        &self.position
    }

    /// Side to move.
    pub fn side_to_move(&self) -> Color {
        self.position.side_to_move
    }

    /// Current engine-level result.
    pub fn result(&self) -> GameStatus {
        self.result
    }

    /// Completed move history.
    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    /// The moves played so far, oldest first.
    pub fn moves(&self) -> Vec<Move> {
        self.history.iter().map(|e| e.mv).collect()
    }

    /// The FEN the game started from.
    pub fn starting_fen(&self) -> &str {
        &self.starting_fen
    }

    /// Current position as FEN.
    pub fn to_fen(&self) -> String {
        self.position.to_fen()
    }

    /// Halfmove clock (plies since last pawn move or capture).
    pub fn halfmove_clock(&self) -> u16 {
        self.position.halfmove_clock
    }

    /// Fullmove number.
    pub fn fullmove_number(&self) -> u16 {
        self.position.fullmove_number
    }

    /// All legal moves in the current position.
    pub fn legal_moves(&self) -> Vec<Move> {
        movegen::legal_moves(&self.position)
    }

    /// Winner by checkmate, if the game ended that way.
    pub fn winner(&self) -> Option<Color> {
        if self.result == GameStatus::Checkmate {
            // The side that delivered mate moved last.
            Some(!self.position.side_to_move)
        } else {
            None
        }
    }

    // -----------------------------------------------------------------
    // Make move
    // -----------------------------------------------------------------

    /// Validate and play a move submitted as `(side, from, to, promo)`.
    ///
    /// Returns the result classification after the move. Fails without
    /// mutating state when the game is over, it is not `side`'s turn, the
    /// geometry is invalid, or the move would leave the own king attacked.
    pub fn make_move(
        &mut self,
        side: Color,
        from: Square,
        to: Square,
        promo: Option<PieceType>,
    ) -> Result<GameStatus, ChessError> {
        if self.result.is_terminal() {
            return Err(ChessError::MatchEnd);
        }
        if self.position.side_to_move != side {
            return Err(ChessError::MoveOutOfTurn);
        }

        let mv = movegen::build_move(&self.position, from, to, promo)?;
        if mv.side() != side {
            return Err(ChessError::MoveOutOfTurn);
        }

        // Play on a copy; commit only if the mover's king stays safe.
        let mut next = self.position.clone();
        let undo = next.make_move(mv);
        if next.is_king_attacked(side) {
            return Err(ChessError::MoveIntoCheck);
        }

        let hash_before = self.position.zobrist_hash;
        self.history.push(HistoryEntry {
            mv,
            hash: hash_before,
        });
        self.undo_stack.push(undo);
        self.position = next;

        self.result = self.classify();
        Ok(self.result)
    }

    /// Take back the last `n` plies. Mostly for analysis; the session uses
    /// `undo(1)` to roll back a move whose clock debit flagged.
    pub fn undo(&mut self, n: usize) -> Result<(), ChessError> {
        if n > self.history.len() {
            return Err(ChessError::NothingToUndo);
        }
        for _ in 0..n {
            let entry = self.history.pop().expect("length checked above");
            let undo = self.undo_stack.pop().expect("stacks move in lockstep");
            self.position.undo_move(entry.mv, &undo);
        }
        // Any terminal state reached by the undone moves is reopened.
        self.result = GameStatus::Ongoing;
        Ok(())
    }

    // -----------------------------------------------------------------
    // Result classification
    // -----------------------------------------------------------------

    /// Classify the position after a committed move, in priority order.
    fn classify(&self) -> GameStatus {
        // New side to move out of moves: mate or stalemate.
        if !movegen::has_any_legal_move(&self.position) {
            if self.position.is_in_check() {
                return GameStatus::Checkmate;
            }
            return GameStatus::Stalemate;
        }

        if self.is_insufficient_material() {
            return GameStatus::InsufficientMaterial;
        }

        if self.is_threefold_repetition() {
            return GameStatus::ThreefoldRepetition;
        }

        // 75 moves per side without pawn move or capture = 150 plies.
        if self.position.halfmove_clock >= 150 {
            return GameStatus::DrawBy75Move;
        }

        GameStatus::Ongoing
    }

    /// Automatic dead-position draws: K vs K, K+N vs K, K+B vs K, and
    /// K+B vs K+B with both bishops on the same tile colour.
    fn is_insufficient_material(&self) -> bool {
        let pos = &self.position;
        let white = pos.occupied[Color::White.index()].pop_count();
        let black = pos.occupied[Color::Black.index()].pop_count();

        if white == 1 && black == 1 {
            return true;
        }

        let w_knights = pos.bb(Color::White, PieceType::Knight).pop_count();
        let b_knights = pos.bb(Color::Black, PieceType::Knight).pop_count();
        let w_bishops = pos.bb(Color::White, PieceType::Bishop);
        let b_bishops = pos.bb(Color::Black, PieceType::Bishop);

        // King + one minor piece vs bare king.
        if (white == 2 && black == 1 && w_knights + w_bishops.pop_count() == 1)
            || (black == 2 && white == 1 && b_knights + b_bishops.pop_count() == 1)
        {
            return true;
        }

        // King + bishop each, bishops on the same tile colour.
        if white == 2
            && black == 2
            && w_bishops.pop_count() == 1
            && b_bishops.pop_count() == 1
        {
            let w_sq = w_bishops.lsb().expect("bishop present");
            let b_sq = b_bishops.lsb().expect("bishop present");
            if w_sq.is_light() == b_sq.is_light() {
                return true;
            }
        }

        false
    }

    /// The current position counts as its own occurrence; two more matching
    /// hashes inside the reversible-move window make three. Irreversible
    /// moves (pawn moves, captures) reset the halfmove clock, which bounds
    /// how far back equal positions can exist.
    fn is_threefold_repetition(&self) -> bool {
        let current = self.position.zobrist_hash;
        let window_start = self
            .history
            .len()
            .saturating_sub(self.position.halfmove_clock as usize);

        let mut count = 0;
        for entry in self.history[window_start..].iter().rev() {
            if entry.hash == current {
                count += 1;
                if count >= 2 {
                    return true;
                }
            }
        }
        false
    }

    // -----------------------------------------------------------------
    // Material judgements for flag/walkover rules
    // -----------------------------------------------------------------

    /// Can `color` deliver checkmate at all with the material on the board?
    ///
    /// Used when the opponent's flag falls or they leave: a win is only
    /// awarded if mate was still possible, otherwise the game is a draw.
    pub fn can_force_checkmate(&self, color: Color) -> bool {
        let pos = &self.position;
        let knights = pos.bb(color, PieceType::Knight).pop_count();
        let bishops = pos.bb(color, PieceType::Bishop);
        let bishop_count = bishops.pop_count();
        let own = pos.occupied[color.index()].pop_count();
        let opponent = pos.occupied[(!color).index()].pop_count();

        // Any pawn, rook or queen mates by force.
        if own > knights + bishop_count + 1 {
            return true;
        }
        // Lone king.
        if own == 1 {
            return false;
        }
        // Opponent keeps material: helpmates remain possible.
        if opponent > 1 {
            return true;
        }
        // K+N or K+B vs bare king.
        if own == 2 {
            return false;
        }
        // K+N+N vs bare king.
        if own == 3 && knights == 2 {
            return false;
        }
        // K+B+B needs bishops on opposite tile colours.
        if own == 3 && bishop_count == 2 {
            let b1 = bishops.lsb().expect("bishop present");
            let b2 = bishops.msb().expect("bishop present");
            return b1.is_light() != b2.is_light();
        }
        true
    }

    /// Fifty-move claim threshold: 100 plies without pawn move or capture.
    pub fn can_draw_by_50_move(&self) -> bool {
        self.position.halfmove_clock >= 100
    }
}

impl Default for GameState {
    fn default() -> Self {
        Self::new()
    }
}

// =========================================================================
// Tests
// =========================================================================
