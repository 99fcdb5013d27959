//! Rules Oracle
//!
//! Move legality, resulting positions and terminal flags are delegated to a
//! rules engine. The session machine only talks to the `RulesEngine` trait;
//! `StandardRules` implements it on top of `shakmaty`.

use shakmaty::fen::Fen;
use shakmaty::uci::Uci;
use shakmaty::{CastlingMode, Chess, EnPassantMode, Position as _, Rank, Role, Square};
use thiserror::Error;

use crate::game::state::{Color, MoveRequest, OutcomeCause, Position, Promotion};

/// Occurrences of a position that end the game in a draw.
pub const REPETITION_LIMIT: u32 = 3;

/// Terminal condition of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    /// Side to move is mated; `winner` just moved.
    Checkmate {
        /// Side that delivered mate.
        winner: Color,
    },
    /// No legal move, not in check.
    Stalemate,
    /// Neither side has mating material.
    InsufficientMaterial,
    /// Halfmove clock reached 100.
    FiftyMove,
}

/// Facts about a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionStatus {
    /// Side to move.
    pub side_to_move: Color,
    /// Side to move is in check.
    pub check: bool,
    /// Terminal condition, if any. Repetition is not a property of a single
    /// position and is tracked by the caller.
    pub terminal: Option<Terminal>,
}

impl PositionStatus {
    /// How the game ends here, given how often the position has occurred.
    /// Returns the cause and the winner (`None` for a draw).
    pub fn ending(&self, occurrences: u32) -> Option<(OutcomeCause, Option<Color>)> {
        match self.terminal {
            Some(Terminal::Checkmate { winner }) => Some((OutcomeCause::Checkmate, Some(winner))),
            Some(Terminal::Stalemate) => Some((OutcomeCause::Stalemate, None)),
            Some(Terminal::InsufficientMaterial) => Some((OutcomeCause::InsufficientMaterial, None)),
            Some(Terminal::FiftyMove) => Some((OutcomeCause::FiftyMove, None)),
            None if occurrences >= REPETITION_LIMIT => Some((OutcomeCause::Threefold, None)),
            None => None,
        }
    }
}

/// Result of applying a legal move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveOutcome {
    /// The move as the engine interpreted it (promotion normalized).
    pub applied: MoveRequest,
    /// Resulting position.
    pub position: Position,
    /// Side that moved.
    pub mover: Color,
    /// Whether a piece was captured.
    pub capture: bool,
    /// Status of the resulting position.
    pub status: PositionStatus,
}

/// Rules engine errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RulesError {
    /// Position text could not be loaded.
    #[error("invalid position: {0}")]
    InvalidPosition(String),

    /// Square name could not be parsed.
    #[error("invalid square: {0}")]
    InvalidSquare(String),

    /// Move is not legal in the position.
    #[error("illegal move {0}")]
    IllegalMove(String),
}

/// Chess rules oracle.
pub trait RulesEngine: Send + Sync + 'static {
    /// Status of a position.
    fn status(&self, position: &Position) -> Result<PositionStatus, RulesError>;

    /// Validate and apply a move.
    fn apply(&self, position: &Position, mv: &MoveRequest) -> Result<MoveOutcome, RulesError>;

    /// Legal destination squares for the piece on `from` (side to move only).
    fn legal_destinations(&self, position: &Position, from: &str) -> Result<Vec<String>, RulesError>;

    /// Colour of the piece on a square.
    fn color_at(&self, position: &Position, square: &str) -> Result<Option<Color>, RulesError>;
}

/// Standard chess via `shakmaty`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardRules;

impl StandardRules {
    /// Create the engine.
    pub fn new() -> Self {
        Self
    }

    fn load(position: &Position) -> Result<Chess, RulesError> {
        let fen = Fen::from_ascii(position.as_str().as_bytes())
            .map_err(|e| RulesError::InvalidPosition(e.to_string()))?;
        fen.into_position(CastlingMode::Standard)
            .map_err(|e| RulesError::InvalidPosition(e.to_string()))
    }

    fn store(pos: &Chess) -> Position {
        Position::from_fen(Fen::from_position(pos.clone(), EnPassantMode::Legal).to_string())
    }

    fn square(name: &str) -> Result<Square, RulesError> {
        name.parse::<Square>()
            .map_err(|_| RulesError::InvalidSquare(name.to_string()))
    }

    fn status_of(pos: &Chess) -> PositionStatus {
        let side_to_move = Color::from(pos.turn());
        let terminal = if pos.is_checkmate() {
            Some(Terminal::Checkmate { winner: side_to_move.opposite() })
        } else if pos.is_stalemate() {
            Some(Terminal::Stalemate)
        } else if pos.is_insufficient_material() {
            Some(Terminal::InsufficientMaterial)
        } else if pos.halfmoves() >= 100 {
            Some(Terminal::FiftyMove)
        } else {
            None
        };

        PositionStatus {
            side_to_move,
            check: pos.is_check(),
            terminal,
        }
    }

    /// Promotion actually required by a move: a pawn reaching the last rank
    /// promotes (queen unless told otherwise); anything else never does.
    fn effective_promotion(pos: &Chess, from: Square, to: Square, requested: Option<Promotion>) -> Option<Promotion> {
        let is_pawn = pos.board().piece_at(from).map(|p| p.role == Role::Pawn).unwrap_or(false);
        let last_rank = matches!(to.rank(), Rank::First | Rank::Eighth);
        if is_pawn && last_rank {
            Some(requested.unwrap_or_default())
        } else {
            None
        }
    }
}

impl RulesEngine for StandardRules {
    fn status(&self, position: &Position) -> Result<PositionStatus, RulesError> {
        Ok(Self::status_of(&Self::load(position)?))
    }

    fn apply(&self, position: &Position, mv: &MoveRequest) -> Result<MoveOutcome, RulesError> {
        let pos = Self::load(position)?;
        let from = Self::square(&mv.from)?;
        let to = Self::square(&mv.to)?;
        let promotion = Self::effective_promotion(&pos, from, to, mv.promotion);

        let uci = Uci::Normal {
            from,
            to,
            promotion: promotion.map(Role::from),
        };
        let m = uci
            .to_move(&pos)
            .map_err(|_| RulesError::IllegalMove(mv.to_string()))?;

        let mover = Color::from(pos.turn());
        let capture = m.is_capture();
        let next = pos
            .play(&m)
            .map_err(|_| RulesError::IllegalMove(mv.to_string()))?;

        Ok(MoveOutcome {
            applied: MoveRequest::new(mv.from.clone(), mv.to.clone(), promotion),
            position: Self::store(&next),
            mover,
            capture,
            status: Self::status_of(&next),
        })
    }

    fn legal_destinations(&self, position: &Position, from: &str) -> Result<Vec<String>, RulesError> {
        let pos = Self::load(position)?;
        let origin = Self::square(from)?;

        let mut targets: Vec<String> = pos
            .legal_moves()
            .iter()
            .filter_map(|m| match m.to_uci(CastlingMode::Standard) {
                Uci::Normal { from, to, .. } if from == origin => Some(to.to_string()),
                _ => None,
            })
            .collect();
        targets.sort();
        targets.dedup();
        Ok(targets)
    }

    fn color_at(&self, position: &Position, square: &str) -> Result<Option<Color>, RulesError> {
        let pos = Self::load(position)?;
        let sq = Self::square(square)?;
        Ok(pos.board().piece_at(sq).map(|p| Color::from(p.color)))
    }
}

impl From<shakmaty::Color> for Color {
    fn from(color: shakmaty::Color) -> Self {
        match color {
            shakmaty::Color::White => Color::White,
            shakmaty::Color::Black => Color::Black,
        }
    }
}

impl From<Promotion> for Role {
    fn from(promotion: Promotion) -> Self {
        match promotion {
            Promotion::Queen => Role::Queen,
            Promotion::Rook => Role::Rook,
            Promotion::Bishop => Role::Bishop,
            Promotion::Knight => Role::Knight,
        }
    }
}
