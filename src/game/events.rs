//! Session Events
//!
//! Typed inputs consumed by the session machine and the effects it produces.
//! Wire decoding happens in `network::protocol`; nothing here is string-keyed.

use std::time::Duration;

use serde::{Serialize, Deserialize};
use uuid::Uuid;

use crate::game::feedback::Feedback;
use crate::game::state::{
    Color, GameResult, MoveRequest, OpponentIdentity, Position, SessionId,
};

/// A move arriving from the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteMove {
    /// The move.
    pub request: MoveRequest,
    /// Authoritative position, when the relay attaches one.
    pub sync: Option<Position>,
    /// Correlation id, present when this is an echo of a local move.
    pub correlation_id: Option<Uuid>,
}

/// Everything that can happen to a session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionInput {
    /// Matchmaking queue status.
    Waiting(bool),
    /// Colour assignment.
    ColorAssigned(Color),
    /// Opponent matched.
    OpponentFound(OpponentIdentity),
    /// Server-side game identifier.
    GameAssigned(String),
    /// Number of players waiting.
    WaitingCount(u32),
    /// Move from the relay.
    RemoteMove(RemoteMove),
    /// Full position from the relay.
    StateSync(Position),
    /// Opponent left; label is the display name if sent.
    OpponentDisconnected(Option<String>),
    /// Transport connected (first time or after a reconnect).
    Connected,
    /// Transport dropped.
    Disconnected(String),
    /// Transport scheduled a retry.
    Reconnecting {
        /// Attempt about to be made (1-based).
        attempt: u32,
        /// Delay before it.
        delay: Duration,
    },
    /// Transport gave up.
    ConnectionLost,
    /// Player gesture: move a piece.
    LocalMove(MoveRequest),
    /// Player gesture: leave the game.
    LocalLeave,
}

/// Messages the machine asks the transport to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Submit a local move.
    SubmitMove {
        /// The move.
        request: MoveRequest,
        /// Resulting position (also the checksum source).
        position: Position,
        /// Correlation id for echo detection.
        correlation_id: Uuid,
    },
    /// Ask the relay for the authoritative position.
    RequestState,
    /// Ask for the matchmaking queue size.
    GetWaitingCount,
    /// Tell the relay the local player left.
    PlayerLeft {
        /// Local user id.
        user_id: String,
        /// Local display name.
        username: String,
        /// Opponent user id.
        opponent_id: Option<String>,
    },
    /// Tell the relay the match finished on the board.
    MatchCompleted(MatchCompletion),
}

/// Finished-match summary for the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchCompletion {
    /// Decisive result.
    Decisive {
        /// Winner user id.
        winner: String,
        /// Loser user id.
        loser: String,
    },
    /// Drawn result.
    Draw {
        /// Both user ids.
        players: Vec<String>,
    },
}

/// Payload for the outcome recorder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeReport {
    /// Idempotency key.
    pub session_id: SessionId,
    /// Local user id.
    pub user_id: String,
    /// Opponent display label.
    pub opponent_label: String,
    /// Result for the local user.
    pub result: GameResult,
}

/// Side outputs of a state transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Send a message on the transport.
    Send(Outbound),
    /// Persist a result (exactly once per session).
    RecordOutcome(OutcomeReport),
    /// Play a sound / highlight a move.
    Feedback(Feedback),
}
