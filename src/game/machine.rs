//! Session State Machine
//!
//! Owns one `GameSession` and reconciles local optimistic moves, remote moves,
//! full-state syncs and transport lifecycle events.
//!
//! ## Phases
//!
//! ```text
//! AwaitingOpponent ──► Active ⇄ AwaitingReconnect
//!        │               │            │
//!        └───────────────┴────────────┴──► Terminated
//! ```
//!
//! Every handler is a synchronous reducer step. Side outputs (messages to send,
//! outcomes to record, feedback cues) are queued as `Effect`s and collected
//! with [`SessionMachine::drain_effects`]; the machine performs no I/O itself.

use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::hash::{short_hex, RepetitionTable};
use crate::game::events::{
    Effect, MatchCompletion, Outbound, OutcomeReport, RemoteMove, SessionInput,
};
use crate::game::feedback::Feedback;
use crate::game::rules::{MoveOutcome, RulesEngine, RulesError, StandardRules};
use crate::game::state::{
    status_line, Color, ConnectionStatus, GameResult, GameSession, LocalPlayer, MoveRecord,
    MoveRequest, OpponentIdentity, OutcomeCause, Originator, PendingMove, Position, SessionId,
    SessionPhase, SessionSnapshot, TerminalOutcome,
};

/// Label used when the opponent's name is unknown.
pub const DEFAULT_OPPONENT_LABEL: &str = "Opponent";

/// Session errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Local move rejected by the rules engine. State untouched.
    #[error("illegal move {0}")]
    IllegalMove(String),

    /// Remote move does not apply to the confirmed position. Resync requested.
    #[error("remote move {0} does not apply to the confirmed position")]
    Desync(String),

    /// Operation needs an active game.
    #[error("session is not active ({0:?})")]
    NotActive(SessionPhase),

    /// Session already has an outcome.
    #[error("session has terminated")]
    Terminated,

    /// A local move is still awaiting confirmation.
    #[error("a local move is awaiting confirmation")]
    MovePending,

    /// It is the opponent's turn.
    #[error("not your turn")]
    NotYourTurn,

    /// Moves are suspended until a full state sync arrives.
    #[error("waiting for state resync")]
    AwaitingResync,

    /// Square name could not be parsed.
    #[error("invalid square: {0}")]
    InvalidSquare(String),

    /// Position text could not be loaded.
    #[error("invalid position: {0}")]
    InvalidPosition(String),

    /// The server tried to change an assigned colour.
    #[error("colour already assigned as {0}")]
    ColorReassigned(Color),
}

impl From<RulesError> for SessionError {
    fn from(err: RulesError) -> Self {
        match err {
            RulesError::IllegalMove(mv) => SessionError::IllegalMove(mv),
            RulesError::InvalidSquare(sq) => SessionError::InvalidSquare(sq),
            RulesError::InvalidPosition(msg) => SessionError::InvalidPosition(msg),
        }
    }
}

/// The session state machine.
pub struct SessionMachine<R: RulesEngine = StandardRules> {
    session: GameSession,
    local: LocalPlayer,
    rules: R,
    repetitions: RepetitionTable,
    effects: Vec<Effect>,
}

impl SessionMachine<StandardRules> {
    /// Machine with standard chess rules and a fresh session id.
    pub fn standard(local: LocalPlayer) -> Self {
        Self::new(local, StandardRules::new())
    }
}

impl<R: RulesEngine> SessionMachine<R> {
    /// Create a machine with a fresh session id.
    pub fn new(local: LocalPlayer, rules: R) -> Self {
        Self::with_session_id(local, rules, Uuid::new_v4())
    }

    /// Create a machine with a given session id.
    pub fn with_session_id(local: LocalPlayer, rules: R, session_id: SessionId) -> Self {
        let session = GameSession::new(session_id);
        let repetitions = RepetitionTable::seeded(session.confirmed_position.as_str());
        Self {
            session,
            local,
            rules,
            repetitions,
            effects: Vec::new(),
        }
    }

    /// Read-only view of the session.
    pub fn session(&self) -> &GameSession {
        &self.session
    }

    /// Injected local identity.
    pub fn local_player(&self) -> &LocalPlayer {
        &self.local
    }

    /// Take queued effects.
    pub fn drain_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    /// Single entry point: apply one input.
    pub fn handle(&mut self, input: SessionInput) -> Result<(), SessionError> {
        match input {
            SessionInput::Waiting(waiting) => {
                self.set_waiting(waiting);
                Ok(())
            }
            SessionInput::ColorAssigned(color) => self.assign_color(color),
            SessionInput::OpponentFound(opponent) => {
                self.set_opponent(opponent);
                Ok(())
            }
            SessionInput::GameAssigned(game_id) => {
                debug!(session = %self.session.session_id, game_id = %game_id, "Game id assigned");
                self.session.game_id = Some(game_id);
                Ok(())
            }
            SessionInput::WaitingCount(count) => {
                self.session.waiting_count = Some(count);
                Ok(())
            }
            SessionInput::RemoteMove(remote) => self.receive_remote_move(remote),
            SessionInput::StateSync(position) => self.receive_state_sync(position),
            SessionInput::OpponentDisconnected(label) => self.handle_opponent_disconnected(label),
            SessionInput::Connected => {
                self.handle_connected();
                Ok(())
            }
            SessionInput::Disconnected(reason) => {
                self.handle_disconnected(&reason);
                Ok(())
            }
            SessionInput::Reconnecting { attempt, delay } => {
                self.session.connection = ConnectionStatus::Reconnecting {
                    attempt,
                    delay_ms: delay.as_millis() as u64,
                };
                Ok(())
            }
            SessionInput::ConnectionLost => {
                warn!(session = %self.session.session_id, "Connection lost, retries exhausted");
                self.session.connection = ConnectionStatus::Lost;
                Ok(())
            }
            SessionInput::LocalMove(request) => self.submit_local_move(request),
            SessionInput::LocalLeave => {
                self.handle_local_leave();
                Ok(())
            }
        }
    }

    // =========================================================================
    // MATCHMAKING
    // =========================================================================

    fn set_waiting(&mut self, waiting: bool) {
        if waiting && self.session.phase == SessionPhase::AwaitingOpponent {
            self.effects.push(Effect::Send(Outbound::GetWaitingCount));
        }
    }

    fn assign_color(&mut self, color: Color) -> Result<(), SessionError> {
        match self.session.local_color {
            Some(existing) if existing != color => {
                warn!(session = %self.session.session_id, %existing, %color, "Rejected colour reassignment");
                return Err(SessionError::ColorReassigned(existing));
            }
            Some(_) => return Ok(()),
            None => {}
        }
        info!(session = %self.session.session_id, %color, "Colour assigned");
        self.session.local_color = Some(color);
        self.try_activate();
        Ok(())
    }

    fn set_opponent(&mut self, opponent: OpponentIdentity) {
        if let Some(existing) = &self.session.opponent {
            if existing != &opponent {
                warn!(session = %self.session.session_id, "Ignoring second opponent identity");
            }
            return;
        }
        info!(session = %self.session.session_id, opponent = %opponent.username, "Opponent found");
        self.session.opponent = Some(opponent);
        self.try_activate();
    }

    fn try_activate(&mut self) {
        if self.session.phase == SessionPhase::AwaitingOpponent
            && self.session.local_color.is_some()
            && self.session.opponent.is_some()
        {
            info!(session = %self.session.session_id, "Match started");
            self.session.phase = SessionPhase::Active;
            self.session.waiting_count = None;
        }
    }

    // =========================================================================
    // MOVES
    // =========================================================================

    /// Validate and optimistically apply a local move.
    pub fn submit_local_move(&mut self, request: MoveRequest) -> Result<(), SessionError> {
        match self.session.phase {
            SessionPhase::Active => {}
            SessionPhase::Terminated => return Err(SessionError::Terminated),
            phase => return Err(SessionError::NotActive(phase)),
        }
        if self.session.pending_move.is_some() {
            return Err(SessionError::MovePending);
        }
        if self.session.awaiting_resync {
            return Err(SessionError::AwaitingResync);
        }
        let local_color = self
            .session
            .local_color
            .ok_or(SessionError::NotActive(self.session.phase))?;

        let status = self.rules.status(&self.session.confirmed_position)?;
        if status.side_to_move != local_color {
            return Err(SessionError::NotYourTurn);
        }

        let outcome = self.rules.apply(&self.session.confirmed_position, &request)?;
        let correlation_id = Uuid::new_v4();

        debug!(
            session = %self.session.session_id,
            mv = %outcome.applied,
            checksum = %short_hex(&outcome.position.checksum()),
            "Local move applied optimistically"
        );

        self.session.pending_move = Some(PendingMove {
            request: outcome.applied.clone(),
            correlation_id,
            resulting: outcome.position.clone(),
        });
        self.append_log(&outcome, Originator::Local);
        self.effects.push(Effect::Send(Outbound::SubmitMove {
            request: outcome.applied.clone(),
            position: outcome.position.clone(),
            correlation_id,
        }));
        self.effects.push(Effect::Feedback(Feedback::for_move(&outcome, Originator::Local)));

        let occurrences = self.repetitions.record(outcome.position.as_str());
        if let Some((cause, winner)) = outcome.status.ending(occurrences) {
            // The opponent will not reply to a game-ending move.
            self.confirm_pending();
            self.conclude(cause, winner);
        }
        Ok(())
    }

    /// Merge a move received from the relay.
    pub fn receive_remote_move(&mut self, mut remote: RemoteMove) -> Result<(), SessionError> {
        if let Some(sync) = remote.sync.take() {
            return self.receive_state_sync(sync);
        }
        match self.session.phase {
            SessionPhase::Active | SessionPhase::AwaitingReconnect => {}
            SessionPhase::Terminated => return Err(SessionError::Terminated),
            phase => return Err(SessionError::NotActive(phase)),
        }
        if self.session.awaiting_resync {
            debug!(session = %self.session.session_id, mv = %remote.request, "Dropping remote move during resync");
            return Err(SessionError::AwaitingResync);
        }

        if let Some(pending) = &self.session.pending_move {
            if Self::is_echo(pending, &remote) {
                debug!(session = %self.session.session_id, mv = %remote.request, "Local move acknowledged");
                self.confirm_pending();
                return Ok(());
            }
        }

        // The opponent can only have moved after our pending move, so apply on top of it.
        let base = self.session.display_position().clone();
        let outcome = match self.rules.apply(&base, &remote.request) {
            Ok(outcome) if Some(outcome.mover) != self.session.local_color => outcome,
            Ok(_) | Err(_) => {
                warn!(session = %self.session.session_id, mv = %remote.request, "Remote move does not apply, requesting resync");
                self.request_resync();
                return Err(SessionError::Desync(remote.request.to_string()));
            }
        };

        self.session.pending_move = None;
        self.session.confirmed_position = outcome.position.clone();
        self.append_log(&outcome, Originator::Remote);
        self.effects.push(Effect::Feedback(Feedback::for_move(&outcome, Originator::Remote)));

        let occurrences = self.repetitions.record(outcome.position.as_str());
        if let Some((cause, winner)) = outcome.status.ending(occurrences) {
            self.conclude(cause, winner);
        }
        Ok(())
    }

    /// Overwrite the confirmed position with an authoritative one.
    pub fn receive_state_sync(&mut self, position: Position) -> Result<(), SessionError> {
        let status = self.rules.status(&position)?;

        info!(
            session = %self.session.session_id,
            checksum = %short_hex(&position.checksum()),
            "State sync applied"
        );
        self.session.confirmed_position = position;
        self.session.pending_move = None;
        self.session.awaiting_resync = false;
        self.repetitions = RepetitionTable::seeded(self.session.confirmed_position.as_str());

        if matches!(self.session.phase, SessionPhase::Active | SessionPhase::AwaitingReconnect) {
            if let Some((cause, winner)) = status.ending(1) {
                self.conclude(cause, winner);
            }
        }
        Ok(())
    }

    fn is_echo(pending: &PendingMove, remote: &RemoteMove) -> bool {
        if let Some(id) = remote.correlation_id {
            return id == pending.correlation_id;
        }
        let ours = &pending.request;
        let theirs = &remote.request;
        let same_promotion = match ours.promotion {
            None => true,
            Some(p) => theirs.promotion.unwrap_or_default() == p,
        };
        ours.from == theirs.from && ours.to == theirs.to && same_promotion
    }

    fn confirm_pending(&mut self) {
        if let Some(pending) = self.session.pending_move.take() {
            self.session.confirmed_position = pending.resulting;
        }
    }

    fn request_resync(&mut self) {
        if !self.session.awaiting_resync {
            self.session.awaiting_resync = true;
            self.effects.push(Effect::Send(Outbound::RequestState));
        }
    }

    fn append_log(&mut self, outcome: &MoveOutcome, originator: Originator) {
        self.session.move_log.push(MoveRecord {
            from: outcome.applied.from.clone(),
            to: outcome.applied.to.clone(),
            promotion: outcome.applied.promotion,
            originator,
            capture: outcome.capture,
            recorded_at: chrono::Utc::now(),
        });
    }

    // =========================================================================
    // TERMINATION
    // =========================================================================

    /// Board-decided ending: record it and tell the relay.
    fn conclude(&mut self, cause: OutcomeCause, winner: Option<Color>) {
        let result = match winner {
            None => GameResult::Draw,
            Some(w) if Some(w) == self.session.local_color => GameResult::Win,
            Some(_) => GameResult::Loss,
        };
        if !self.terminate(TerminalOutcome { result, cause }, None) {
            return;
        }
        if let Some(opponent) = &self.session.opponent {
            let completion = match result {
                GameResult::Win => MatchCompletion::Decisive {
                    winner: self.local.user_id.clone(),
                    loser: opponent.user_id.clone(),
                },
                GameResult::Loss => MatchCompletion::Decisive {
                    winner: opponent.user_id.clone(),
                    loser: self.local.user_id.clone(),
                },
                GameResult::Draw => MatchCompletion::Draw {
                    players: vec![self.local.user_id.clone(), opponent.user_id.clone()],
                },
            };
            self.effects.push(Effect::Send(Outbound::MatchCompleted(completion)));
        }
    }

    /// Set the outcome exactly once and queue the recorder call.
    /// Returns false if the session had already terminated.
    fn terminate(&mut self, outcome: TerminalOutcome, label: Option<String>) -> bool {
        if self.session.outcome.is_some() || self.session.phase == SessionPhase::Terminated {
            return false;
        }
        info!(
            session = %self.session.session_id,
            result = outcome.result.as_status(),
            cause = %outcome.cause,
            moves = self.session.move_log.len(),
            "Session terminated"
        );
        self.session.outcome = Some(outcome);
        self.session.phase = SessionPhase::Terminated;
        self.session.awaiting_resync = false;

        let opponent_label = self
            .session
            .opponent
            .as_ref()
            .map(|o| o.username.clone())
            .or(label)
            .unwrap_or_else(|| DEFAULT_OPPONENT_LABEL.to_string());

        self.effects.push(Effect::RecordOutcome(OutcomeReport {
            session_id: self.session.session_id,
            user_id: self.local.user_id.clone(),
            opponent_label,
            result: outcome.result,
        }));
        true
    }

    /// Opponent left: immediate forfeit in our favour.
    pub fn handle_opponent_disconnected(&mut self, label: Option<String>) -> Result<(), SessionError> {
        match self.session.phase {
            SessionPhase::Active => {}
            SessionPhase::Terminated => {
                debug!(session = %self.session.session_id, "Duplicate opponent disconnect ignored");
                return Ok(());
            }
            phase => return Err(SessionError::NotActive(phase)),
        }
        self.confirm_pending();
        self.terminate(
            TerminalOutcome { result: GameResult::Win, cause: OutcomeCause::Disconnect },
            label,
        );
        Ok(())
    }

    /// Local player leaves. Records a loss once; repeats are no-ops.
    pub fn handle_local_leave(&mut self) {
        match self.session.phase {
            SessionPhase::Terminated => {
                debug!(session = %self.session.session_id, "Duplicate leave ignored");
            }
            SessionPhase::AwaitingOpponent => {
                info!(session = %self.session.session_id, "Left matchmaking queue");
                self.session.phase = SessionPhase::Terminated;
            }
            SessionPhase::Active | SessionPhase::AwaitingReconnect => {
                let terminated = self.terminate(
                    TerminalOutcome { result: GameResult::Loss, cause: OutcomeCause::Resignation },
                    None,
                );
                if terminated {
                    self.effects.push(Effect::Send(Outbound::PlayerLeft {
                        user_id: self.local.user_id.clone(),
                        username: self.local.username.clone(),
                        opponent_id: self.session.opponent.as_ref().map(|o| o.user_id.clone()),
                    }));
                }
            }
        }
    }

    // =========================================================================
    // TRANSPORT LIFECYCLE
    // =========================================================================

    fn handle_connected(&mut self) {
        self.session.connection = ConnectionStatus::Connected;
        match self.session.phase {
            SessionPhase::AwaitingReconnect => {
                info!(session = %self.session.session_id, "Reconnected, requesting state");
                self.session.phase = SessionPhase::Active;
                // Moves may have happened while we were away.
                self.session.awaiting_resync = true;
                self.effects.push(Effect::Send(Outbound::RequestState));
            }
            SessionPhase::AwaitingOpponent => {
                self.effects.push(Effect::Send(Outbound::GetWaitingCount));
            }
            SessionPhase::Active | SessionPhase::Terminated => {}
        }
    }

    fn handle_disconnected(&mut self, reason: &str) {
        info!(session = %self.session.session_id, reason, "Transport disconnected");
        self.session.connection = ConnectionStatus::Connecting;
        if self.session.phase == SessionPhase::Active {
            self.session.phase = SessionPhase::AwaitingReconnect;
        }
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    /// Whether the local player may submit a move now.
    pub fn is_local_turn(&self) -> bool {
        if self.session.phase != SessionPhase::Active
            || self.session.pending_move.is_some()
            || self.session.awaiting_resync
        {
            return false;
        }
        match (self.session.local_color, self.rules.status(&self.session.confirmed_position)) {
            (Some(color), Ok(status)) => status.side_to_move == color,
            _ => false,
        }
    }

    /// Legal destinations for a local piece, for move hints. Empty when the
    /// local player cannot move that piece now.
    pub fn legal_destinations(&self, square: &str) -> Vec<String> {
        if !self.is_local_turn() {
            return Vec::new();
        }
        let position = &self.session.confirmed_position;
        match self.rules.color_at(position, square) {
            Ok(Some(color)) if Some(color) == self.session.local_color => {
                self.rules.legal_destinations(position, square).unwrap_or_default()
            }
            _ => Vec::new(),
        }
    }

    /// Immutable copy for rendering.
    pub fn snapshot(&self) -> SessionSnapshot {
        let shown = self.session.display_position();
        let (side_to_move, check) = match self.rules.status(shown) {
            Ok(status) => (status.side_to_move, status.check),
            Err(_) => (Color::White, false),
        };
        let outcome = self.session.outcome.map(|o| {
            let winner = match (o.result, self.session.local_color) {
                (GameResult::Win, Some(c)) => Some(c),
                (GameResult::Loss, Some(c)) => Some(c.opposite()),
                _ => None,
            };
            (o, winner)
        });

        SessionSnapshot {
            session_id: self.session.session_id,
            phase: self.session.phase,
            local_color: self.session.local_color,
            confirmed_position: self.session.confirmed_position.clone(),
            display_position: shown.clone(),
            has_pending_move: self.session.pending_move.is_some(),
            move_log: self.session.move_log.clone(),
            opponent: self.session.opponent.clone(),
            outcome: self.session.outcome,
            awaiting_resync: self.session.awaiting_resync,
            waiting_count: self.session.waiting_count,
            connection: self.session.connection,
            is_local_turn: self.is_local_turn(),
            status_line: status_line(side_to_move, self.session.local_color, check, outcome),
        }
    }
}
