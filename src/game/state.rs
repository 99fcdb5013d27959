//! Session State
//!
//! Data model for one peer-synchronized chess session.
//! `GameSession` is owned by the session machine; the presentation layer
//! only ever sees `SessionSnapshot` copies.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use uuid::Uuid;

use crate::core::hash::{position_checksum, PositionHash};

/// Client-side identity of one session (idempotency key for recording).
pub type SessionId = Uuid;

/// FEN of the standard starting position.
pub const STARTING_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// Side colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    /// Moves first.
    White,
    /// Moves second.
    Black,
}

impl Color {
    /// The other side.
    pub fn opposite(self) -> Self {
        match self {
            Color::White => Color::Black,
            Color::Black => Color::White,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Color::White => write!(f, "White"),
            Color::Black => write!(f, "Black"),
        }
    }
}

/// Promotion piece choice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Promotion {
    /// Queen (default).
    #[default]
    #[serde(rename = "q")]
    Queen,
    /// Rook.
    #[serde(rename = "r")]
    Rook,
    /// Bishop.
    #[serde(rename = "b")]
    Bishop,
    /// Knight.
    #[serde(rename = "n")]
    Knight,
}

impl Promotion {
    /// Lowercase piece letter.
    pub fn as_char(self) -> char {
        match self {
            Promotion::Queen => 'q',
            Promotion::Rook => 'r',
            Promotion::Bishop => 'b',
            Promotion::Knight => 'n',
        }
    }

    /// Parse a piece letter (either case).
    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_lowercase() {
            'q' => Some(Promotion::Queen),
            'r' => Some(Promotion::Rook),
            'b' => Some(Promotion::Bishop),
            'n' => Some(Promotion::Knight),
            _ => None,
        }
    }
}

/// Serialized board state understood by the rules engine (FEN).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Position(String);

impl Position {
    /// Wrap a FEN string. Validity is checked by the rules engine, not here.
    pub fn from_fen(fen: impl Into<String>) -> Self {
        Self(fen.into().trim().to_string())
    }

    /// Standard starting position.
    pub fn starting() -> Self {
        Self(STARTING_FEN.to_string())
    }

    /// FEN text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Checksum of this position.
    pub fn checksum(&self) -> PositionHash {
        position_checksum(&self.0)
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::starting()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A move as entered by a player or received from the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRequest {
    /// Origin square, e.g. "e2".
    pub from: String,
    /// Destination square, e.g. "e4".
    pub to: String,
    /// Promotion choice, if any.
    pub promotion: Option<Promotion>,
}

impl MoveRequest {
    /// Create a move request.
    pub fn new(from: impl Into<String>, to: impl Into<String>, promotion: Option<Promotion>) -> Self {
        Self {
            from: from.into().to_ascii_lowercase(),
            to: to.into().to_ascii_lowercase(),
            promotion,
        }
    }

    /// Quiet/capture move without promotion.
    pub fn simple(from: &str, to: &str) -> Self {
        Self::new(from, to, None)
    }
}

impl fmt::Display for MoveRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.from, self.to)?;
        if let Some(p) = self.promotion {
            write!(f, "{}", p.as_char())?;
        }
        Ok(())
    }
}

/// Which side of the connection originated a move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Originator {
    /// Played on this client.
    Local,
    /// Received from the opponent via the relay.
    Remote,
}

/// Entry in the move log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRecord {
    /// Origin square.
    pub from: String,
    /// Destination square.
    pub to: String,
    /// Promotion applied, if any.
    pub promotion: Option<Promotion>,
    /// Who played it.
    pub originator: Originator,
    /// Whether the move captured.
    pub capture: bool,
    /// Wall-clock time the move entered the log.
    pub recorded_at: DateTime<Utc>,
}

/// A local move applied optimistically and not yet confirmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMove {
    /// The move as normalized by the rules engine.
    pub request: MoveRequest,
    /// Correlation id sent with the move.
    pub correlation_id: Uuid,
    /// Optimistic resulting position.
    pub resulting: Position,
}

/// The matched opponent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpponentIdentity {
    /// Opaque user id.
    pub user_id: String,
    /// Display name.
    pub username: String,
}

/// The local user, injected at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalPlayer {
    /// Opaque user id.
    pub user_id: String,
    /// Display name.
    pub username: String,
}

impl LocalPlayer {
    /// Create a local player identity.
    pub fn new(user_id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
        }
    }
}

/// Result from the local player's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameResult {
    /// Local player won.
    #[serde(rename = "win")]
    Win,
    /// Local player lost.
    #[serde(rename = "lose")]
    Loss,
    /// Draw.
    #[serde(rename = "draw")]
    Draw,
}

impl GameResult {
    /// Status string used by the profile store.
    pub fn as_status(self) -> &'static str {
        match self {
            GameResult::Win => "win",
            GameResult::Loss => "lose",
            GameResult::Draw => "draw",
        }
    }
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeCause {
    /// Side to move is mated.
    Checkmate,
    /// Local player left.
    Resignation,
    /// Opponent disconnected.
    Disconnect,
    /// Side to move has no legal move and is not in check.
    Stalemate,
    /// Same position occurred three times.
    Threefold,
    /// Neither side can mate.
    InsufficientMaterial,
    /// Fifty moves without capture or pawn move.
    FiftyMove,
}

impl fmt::Display for OutcomeCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            OutcomeCause::Checkmate => "checkmate",
            OutcomeCause::Resignation => "resignation",
            OutcomeCause::Disconnect => "disconnect",
            OutcomeCause::Stalemate => "stalemate",
            OutcomeCause::Threefold => "threefold repetition",
            OutcomeCause::InsufficientMaterial => "insufficient material",
            OutcomeCause::FiftyMove => "fifty-move rule",
        };
        f.write_str(text)
    }
}

/// Terminal outcome of a session. Set exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalOutcome {
    /// Result for the local player.
    pub result: GameResult,
    /// Cause.
    pub cause: OutcomeCause,
}

/// Session lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Queued for matchmaking.
    AwaitingOpponent,
    /// Game in progress.
    Active,
    /// Transport dropped mid-game; moves paused.
    AwaitingReconnect,
    /// Outcome decided. No transitions out.
    Terminated,
}

/// Transport state as shown to the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// First connection in progress.
    Connecting,
    /// Socket open.
    Connected,
    /// Waiting to retry.
    Reconnecting {
        /// Attempt about to be made (1-based).
        attempt: u32,
        /// Delay before it, in milliseconds.
        delay_ms: u64,
    },
    /// Retries exhausted. Persistent, non-fatal.
    Lost,
}

/// Root entity for one match.
#[derive(Debug, Clone)]
pub struct GameSession {
    pub(crate) session_id: SessionId,
    pub(crate) phase: SessionPhase,
    pub(crate) local_color: Option<Color>,
    pub(crate) confirmed_position: Position,
    pub(crate) pending_move: Option<PendingMove>,
    pub(crate) move_log: Vec<MoveRecord>,
    pub(crate) opponent: Option<OpponentIdentity>,
    pub(crate) outcome: Option<TerminalOutcome>,
    pub(crate) awaiting_resync: bool,
    pub(crate) waiting_count: Option<u32>,
    pub(crate) connection: ConnectionStatus,
    pub(crate) game_id: Option<String>,
}

impl GameSession {
    /// Fresh session awaiting an opponent.
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            phase: SessionPhase::AwaitingOpponent,
            local_color: None,
            confirmed_position: Position::starting(),
            pending_move: None,
            move_log: Vec::new(),
            opponent: None,
            outcome: None,
            awaiting_resync: false,
            waiting_count: None,
            connection: ConnectionStatus::Connecting,
            game_id: None,
        }
    }

    /// Session identifier.
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Current phase.
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Colour assigned by the server.
    pub fn local_color(&self) -> Option<Color> {
        self.local_color
    }

    /// Last agreed position.
    pub fn confirmed_position(&self) -> &Position {
        &self.confirmed_position
    }

    /// Outstanding optimistic move.
    pub fn pending_move(&self) -> Option<&PendingMove> {
        self.pending_move.as_ref()
    }

    /// Chronological move log.
    pub fn move_log(&self) -> &[MoveRecord] {
        &self.move_log
    }

    /// Matched opponent.
    pub fn opponent(&self) -> Option<&OpponentIdentity> {
        self.opponent.as_ref()
    }

    /// Terminal outcome, once decided.
    pub fn outcome(&self) -> Option<TerminalOutcome> {
        self.outcome
    }

    /// True between a desync and the next full sync.
    pub fn is_awaiting_resync(&self) -> bool {
        self.awaiting_resync
    }

    /// Position the board should display: optimistic if a move is pending.
    pub fn display_position(&self) -> &Position {
        self.pending_move
            .as_ref()
            .map(|p| &p.resulting)
            .unwrap_or(&self.confirmed_position)
    }
}

/// Immutable copy of the session for rendering.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    /// Session identifier.
    pub session_id: SessionId,
    /// Phase.
    pub phase: SessionPhase,
    /// Assigned colour.
    pub local_color: Option<Color>,
    /// Confirmed position.
    pub confirmed_position: Position,
    /// Position to draw (optimistic when a move is pending).
    pub display_position: Position,
    /// Whether a local move awaits confirmation.
    pub has_pending_move: bool,
    /// Move log.
    pub move_log: Vec<MoveRecord>,
    /// Opponent.
    pub opponent: Option<OpponentIdentity>,
    /// Outcome.
    pub outcome: Option<TerminalOutcome>,
    /// Resync outstanding.
    pub awaiting_resync: bool,
    /// Players waiting in the matchmaking queue.
    pub waiting_count: Option<u32>,
    /// Transport state.
    pub connection: ConnectionStatus,
    /// Whether the local player may move now.
    pub is_local_turn: bool,
    /// Human-readable status.
    pub status_line: String,
}

/// Status text shown above the board.
pub fn status_line(
    side_to_move: Color,
    local_color: Option<Color>,
    check: bool,
    outcome: Option<(TerminalOutcome, Option<Color>)>,
) -> String {
    match outcome {
        Some((TerminalOutcome { cause: OutcomeCause::Checkmate, .. }, Some(winner))) => {
            format!("Game over, {winner} wins by checkmate.")
        }
        Some((TerminalOutcome { result: GameResult::Draw, cause }, _)) => {
            format!("Game over, draw by {cause}.")
        }
        Some((TerminalOutcome { result: GameResult::Win, cause }, _)) => {
            format!("Game over, you win by {cause}.")
        }
        Some((TerminalOutcome { result: GameResult::Loss, cause }, _)) => {
            format!("Game over, you lose by {cause}.")
        }
        None => {
            let mut status = format!("{side_to_move} to move");
            if local_color == Some(side_to_move) {
                status.push_str(" (Your turn)");
            }
            if check {
                status.push_str(", check!");
            }
            status
        }
    }
}
