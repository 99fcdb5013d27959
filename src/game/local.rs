//! Local Game
//!
//! Hot-seat play: both colours on one device. Same rules engine as the
//! networked session, no transport and nothing recorded.

use thiserror::Error;
use tracing::debug;

use crate::core::hash::RepetitionTable;
use crate::game::feedback::Feedback;
use crate::game::rules::{RulesEngine, RulesError, StandardRules};
use crate::game::state::{Color, MoveRecord, MoveRequest, OutcomeCause, Originator, Position};

/// How a local game ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalOutcome {
    /// Winning side; `None` for a draw.
    pub winner: Option<Color>,
    /// Cause.
    pub cause: OutcomeCause,
}

/// Local game errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocalGameError {
    /// The game is over; reset to play again.
    #[error("game is over")]
    GameOver,

    /// Rules engine rejected the move.
    #[error(transparent)]
    Rules(#[from] RulesError),
}

/// Hot-seat game.
pub struct LocalGame<R: RulesEngine = StandardRules> {
    rules: R,
    position: Position,
    move_log: Vec<MoveRecord>,
    repetitions: RepetitionTable,
    outcome: Option<LocalOutcome>,
    check: bool,
}

impl LocalGame<StandardRules> {
    /// Standard chess from the initial position.
    pub fn standard() -> Self {
        Self::new(StandardRules::new())
    }
}

impl<R: RulesEngine> LocalGame<R> {
    /// New game from the initial position.
    pub fn new(rules: R) -> Self {
        let position = Position::starting();
        Self {
            rules,
            repetitions: RepetitionTable::seeded(position.as_str()),
            position,
            move_log: Vec::new(),
            outcome: None,
            check: false,
        }
    }

    /// Current position.
    pub fn position(&self) -> &Position {
        &self.position
    }

    /// Moves played so far.
    pub fn move_log(&self) -> &[MoveRecord] {
        &self.move_log
    }

    /// Outcome, once the game is over.
    pub fn outcome(&self) -> Option<LocalOutcome> {
        self.outcome
    }

    /// Play a move for the side to move.
    pub fn play(&mut self, request: &MoveRequest) -> Result<Feedback, LocalGameError> {
        if self.outcome.is_some() {
            return Err(LocalGameError::GameOver);
        }
        let outcome = self.rules.apply(&self.position, request)?;

        self.move_log.push(MoveRecord {
            from: outcome.applied.from.clone(),
            to: outcome.applied.to.clone(),
            promotion: outcome.applied.promotion,
            originator: Originator::Local,
            capture: outcome.capture,
            recorded_at: chrono::Utc::now(),
        });
        self.position = outcome.position.clone();
        self.check = outcome.status.check;

        let occurrences = self.repetitions.record(self.position.as_str());
        self.outcome = outcome
            .status
            .ending(occurrences)
            .map(|(cause, winner)| LocalOutcome { winner, cause });
        if let Some(over) = self.outcome {
            debug!(cause = %over.cause, moves = self.move_log.len(), "Local game over");
        }

        Ok(Feedback::for_move(&outcome, Originator::Local))
    }

    /// Legal destinations for the piece on `square`.
    pub fn legal_destinations(&self, square: &str) -> Vec<String> {
        if self.outcome.is_some() {
            return Vec::new();
        }
        self.rules.legal_destinations(&self.position, square).unwrap_or_default()
    }

    /// Status banner text.
    pub fn status_line(&self) -> String {
        match self.outcome {
            Some(LocalOutcome { winner: Some(winner), .. }) => format!("{winner} wins by checkmate!"),
            Some(LocalOutcome { cause, .. }) => format!("It's a draw! ({cause})"),
            None => {
                let side = self
                    .rules
                    .status(&self.position)
                    .map(|s| s.side_to_move)
                    .unwrap_or(Color::White);
                if self.check {
                    format!("{side} to move, check!")
                } else {
                    format!("{side} to move")
                }
            }
        }
    }

    /// Start over from the initial position.
    pub fn reset(&mut self) {
        self.position = Position::starting();
        self.move_log.clear();
        self.repetitions = RepetitionTable::seeded(self.position.as_str());
        self.outcome = None;
        self.check = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alternating_sides() {
        let mut game = LocalGame::standard();
        game.play(&MoveRequest::simple("e2", "e4")).unwrap();
        assert_eq!(game.status_line(), "Black to move");
        game.play(&MoveRequest::simple("e7", "e5")).unwrap();
        assert_eq!(game.move_log().len(), 2);
        assert!(game.move_log().iter().all(|m| m.originator == Originator::Local));
    }

    #[test]
    fn test_illegal_move_rejected() {
        let mut game = LocalGame::standard();
        let err = game.play(&MoveRequest::simple("e7", "e5")).unwrap_err();
        assert!(matches!(err, LocalGameError::Rules(RulesError::IllegalMove(_))));
        assert_eq!(game.position(), &Position::starting());
    }

    #[test]
    fn test_fools_mate_then_reset() {
        let mut game = LocalGame::standard();
        for (from, to) in [("f2", "f3"), ("e7", "e5"), ("g2", "g4"), ("d8", "h4")] {
            game.play(&MoveRequest::simple(from, to)).unwrap();
        }
        assert_eq!(
            game.outcome(),
            Some(LocalOutcome { winner: Some(Color::Black), cause: OutcomeCause::Checkmate })
        );
        assert_eq!(game.status_line(), "Black wins by checkmate!");
        assert_eq!(game.play(&MoveRequest::simple("a2", "a3")), Err(LocalGameError::GameOver));
        assert!(game.legal_destinations("a2").is_empty());

        game.reset();
        assert!(game.outcome().is_none());
        assert!(game.move_log().is_empty());
        assert_eq!(game.position(), &Position::starting());
        assert_eq!(game.status_line(), "White to move");
    }

    #[test]
    fn test_threefold_draw() {
        let mut game = LocalGame::standard();
        for _ in 0..2 {
            for (from, to) in [("g1", "f3"), ("g8", "f6"), ("f3", "g1"), ("f6", "g8")] {
                game.play(&MoveRequest::simple(from, to)).unwrap();
            }
        }
        assert_eq!(
            game.outcome(),
            Some(LocalOutcome { winner: None, cause: OutcomeCause::Threefold })
        );
        assert_eq!(game.status_line(), "It's a draw! (threefold repetition)");
    }

    #[test]
    fn test_destinations_for_side_to_move() {
        let game = LocalGame::standard();
        assert_eq!(game.legal_destinations("b1"), vec!["a3".to_string(), "c3".to_string()]);
        assert!(game.legal_destinations("b8").is_empty());
    }
}
