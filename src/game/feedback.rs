//! Move Feedback
//!
//! Sound/visual cue selection. A pure function of the move outcome.

use serde::{Serialize, Deserialize};

use crate::game::rules::{MoveOutcome, Terminal};
use crate::game::state::{Originator, Position};

/// Primary cue for a move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cue {
    /// Quiet move.
    Move,
    /// A piece was captured.
    Capture,
}

/// Feedback for one applied move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    /// Primary cue.
    pub cue: Cue,
    /// Opponent of the mover is in check.
    pub check: bool,
    /// Move delivered mate.
    pub checkmate: bool,
    /// Origin square (for last-move highlighting).
    pub from: String,
    /// Destination square.
    pub to: String,
    /// Who played the move.
    pub originator: Originator,
    /// Position to render after the move.
    pub position: Position,
}

impl Feedback {
    /// Select feedback for a move outcome.
    pub fn for_move(outcome: &MoveOutcome, originator: Originator) -> Self {
        let cue = if outcome.capture { Cue::Capture } else { Cue::Move };
        Self {
            cue,
            check: outcome.status.check,
            checkmate: matches!(outcome.status.terminal, Some(Terminal::Checkmate { .. })),
            from: outcome.applied.from.clone(),
            to: outcome.applied.to.clone(),
            originator,
            position: outcome.position.clone(),
        }
    }
}
