//! Protocol Messages
//!
//! Wire format for client-relay communication over WebSocket.
//! Every frame is a JSON object `{"event": <name>, "data": <payload>}`.
//! Inbound frames are decoded into the closed `ServerEvent` enum here, at the
//! boundary; nothing past this module sees event-name strings.

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::game::events::{MatchCompletion, Outbound, RemoteMove, SessionInput};
use crate::game::state::{Color, MoveRequest, OpponentIdentity, Position, Promotion};

/// Protocol errors.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame is not valid JSON or a payload has the wrong shape.
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),

    /// Event name not part of the protocol.
    #[error("unknown event: {0}")]
    UnknownEvent(String),
}

// =============================================================================
// PAYLOADS
// =============================================================================

/// A move on the wire, in either direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovePayload {
    /// Origin square.
    pub from: String,
    /// Destination square.
    pub to: String,
    /// Promotion piece, if any.
    #[serde(default, deserialize_with = "lenient_promotion", skip_serializing_if = "Option::is_none")]
    pub obtained_promotion: Option<Promotion>,
    /// Resulting position. On an inbound move this is authoritative.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fen: Option<String>,
    /// Correlation id of the originating local move.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,
}

/// Authoritative position, either a bare FEN string or `{"fen": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GameStatePayload {
    /// Bare FEN.
    Bare(String),
    /// Wrapped FEN.
    Wrapped {
        /// Position text.
        fen: String,
    },
}

impl GameStatePayload {
    /// Position text.
    pub fn fen(&self) -> &str {
        match self {
            GameStatePayload::Bare(fen) | GameStatePayload::Wrapped { fen } => fen,
        }
    }
}

/// Local player leaving.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerLeftPayload {
    /// Local user id.
    pub user_id: String,
    /// Local display name.
    pub username: String,
    /// Opponent user id.
    pub opponent_id: Option<String>,
}

/// Finished match summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MatchCompletedPayload {
    /// Decisive result.
    Decisive {
        /// Winner user id.
        winner: String,
        /// Loser user id.
        loser: String,
    },
    /// Draw.
    Draw {
        /// Always true.
        draw: bool,
        /// Both user ids.
        players: Vec<String>,
    },
}

/// Accepts `"q"`, `"Q"`, `""` and `null`.
fn lenient_promotion<'de, D>(deserializer: D) -> Result<Option<Promotion>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|s| s.chars().next()).and_then(Promotion::from_char))
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Events sent by the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    /// Matchmaking queue status.
    Waiting(bool),
    /// Colour assignment.
    Color(Color),
    /// Matched opponent.
    Opponent(OpponentIdentity),
    /// Opponent move (or echo of ours).
    Move(MovePayload),
    /// Full position.
    GameState(GameStatePayload),
    /// Opponent left; payload is their display name.
    OpponentDisconnected(Option<String>),
    /// Players waiting in the queue.
    WaitingCount(u32),
    /// Server-side game id for reconnection.
    GameAssigned(String),
}

#[derive(Deserialize)]
struct Frame {
    event: String,
    #[serde(default)]
    data: serde_json::Value,
}

impl ServerEvent {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode a frame.
    pub fn from_json(s: &str) -> Result<Self, ProtocolError> {
        let frame: Frame = serde_json::from_str(s)?;
        let data = frame.data;
        let event = match frame.event.as_str() {
            "waiting" => ServerEvent::Waiting(serde_json::from_value(data)?),
            "color" => ServerEvent::Color(serde_json::from_value(data)?),
            "opponent" => ServerEvent::Opponent(serde_json::from_value(data)?),
            "move" => ServerEvent::Move(serde_json::from_value(data)?),
            "gameState" => ServerEvent::GameState(serde_json::from_value(data)?),
            "opponentDisconnected" => ServerEvent::OpponentDisconnected(serde_json::from_value(data)?),
            "waitingCount" => ServerEvent::WaitingCount(serde_json::from_value(data)?),
            "gameAssigned" => ServerEvent::GameAssigned(serde_json::from_value(data)?),
            other => {
                debug!(event = other, "Unknown event");
                return Err(ProtocolError::UnknownEvent(other.to_string()));
            }
        };
        Ok(event)
    }

    /// Convert to a session input.
    pub fn into_input(self) -> SessionInput {
        match self {
            ServerEvent::Waiting(waiting) => SessionInput::Waiting(waiting),
            ServerEvent::Color(color) => SessionInput::ColorAssigned(color),
            ServerEvent::Opponent(opponent) => SessionInput::OpponentFound(opponent),
            ServerEvent::Move(payload) => SessionInput::RemoteMove(RemoteMove {
                request: MoveRequest::new(payload.from, payload.to, payload.obtained_promotion),
                sync: payload.fen.map(Position::from_fen),
                correlation_id: payload.correlation_id,
            }),
            ServerEvent::GameState(payload) => SessionInput::StateSync(Position::from_fen(payload.fen())),
            ServerEvent::OpponentDisconnected(name) => SessionInput::OpponentDisconnected(name),
            ServerEvent::WaitingCount(count) => SessionInput::WaitingCount(count),
            ServerEvent::GameAssigned(game_id) => SessionInput::GameAssigned(game_id),
        }
    }
}

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Events sent to the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    /// Local move.
    Move(MovePayload),
    /// Ask for the authoritative position.
    RequestGameState,
    /// Ask for the queue size.
    GetWaitingCount,
    /// Local player left.
    PlayerLeft(PlayerLeftPayload),
    /// Match finished on the board.
    MatchCompleted(MatchCompletedPayload),
}

impl ClientEvent {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(s)?)
    }

    /// Wire event name.
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::Move(_) => "move",
            ClientEvent::RequestGameState => "requestGameState",
            ClientEvent::GetWaitingCount => "getWaitingCount",
            ClientEvent::PlayerLeft(_) => "playerLeft",
            ClientEvent::MatchCompleted(_) => "matchCompleted",
        }
    }
}

impl From<Outbound> for ClientEvent {
    fn from(outbound: Outbound) -> Self {
        match outbound {
            Outbound::SubmitMove { request, position, correlation_id } => ClientEvent::Move(MovePayload {
                from: request.from,
                to: request.to,
                obtained_promotion: request.promotion,
                fen: Some(position.as_str().to_string()),
                correlation_id: Some(correlation_id),
            }),
            Outbound::RequestState => ClientEvent::RequestGameState,
            Outbound::GetWaitingCount => ClientEvent::GetWaitingCount,
            Outbound::PlayerLeft { user_id, username, opponent_id } => {
                ClientEvent::PlayerLeft(PlayerLeftPayload { user_id, username, opponent_id })
            }
            Outbound::MatchCompleted(MatchCompletion::Decisive { winner, loser }) => {
                ClientEvent::MatchCompleted(MatchCompletedPayload::Decisive { winner, loser })
            }
            Outbound::MatchCompleted(MatchCompletion::Draw { players }) => {
                ClientEvent::MatchCompleted(MatchCompletedPayload::Draw { draw: true, players })
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::STARTING_FEN;

    #[test]
    fn test_decode_every_server_event() {
        let cases = [
            (r#"{"event":"waiting","data":true}"#, ServerEvent::Waiting(true)),
            (r#"{"event":"color","data":"black"}"#, ServerEvent::Color(Color::Black)),
            (
                r#"{"event":"opponent","data":{"userId":"u2","username":"bob","wins":3}}"#,
                ServerEvent::Opponent(OpponentIdentity { user_id: "u2".into(), username: "bob".into() }),
            ),
            (
                r#"{"event":"move","data":{"from":"e7","to":"e5","obtainedPromotion":"q"}}"#,
                ServerEvent::Move(MovePayload {
                    from: "e7".into(),
                    to: "e5".into(),
                    obtained_promotion: Some(Promotion::Queen),
                    fen: None,
                    correlation_id: None,
                }),
            ),
            (
                r#"{"event":"gameState","data":{"fen":"8/8/8/8/8/8/8/K6k w - - 0 1"}}"#,
                ServerEvent::GameState(GameStatePayload::Wrapped { fen: "8/8/8/8/8/8/8/K6k w - - 0 1".into() }),
            ),
            (
                r#"{"event":"opponentDisconnected","data":"bob"}"#,
                ServerEvent::OpponentDisconnected(Some("bob".into())),
            ),
            (r#"{"event":"opponentDisconnected"}"#, ServerEvent::OpponentDisconnected(None)),
            (r#"{"event":"waitingCount","data":7}"#, ServerEvent::WaitingCount(7)),
            (r#"{"event":"gameAssigned","data":"g-42"}"#, ServerEvent::GameAssigned("g-42".into())),
        ];
        for (json, expected) in cases {
            assert_eq!(ServerEvent::from_json(json).unwrap(), expected, "{json}");
        }
    }

    #[test]
    fn test_unknown_event_rejected() {
        let err = ServerEvent::from_json(r#"{"event":"chat","data":"hi"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownEvent(name) if name == "chat"));
    }

    #[test]
    fn test_malformed_payload_rejected() {
        assert!(matches!(
            ServerEvent::from_json(r#"{"event":"color","data":"green"}"#),
            Err(ProtocolError::Json(_))
        ));
        assert!(ServerEvent::from_json("not json").is_err());
    }

    #[test]
    fn test_empty_promotion_is_none() {
        let event = ServerEvent::from_json(
            r#"{"event":"move","data":{"from":"g8","to":"f6","obtainedPromotion":""}}"#,
        )
        .unwrap();
        match event.into_input() {
            SessionInput::RemoteMove(remote) => {
                assert_eq!(remote.request, MoveRequest::simple("g8", "f6"));
                assert!(remote.sync.is_none());
            }
            other => panic!("unexpected input: {other:?}"),
        }
    }

    #[test]
    fn test_move_with_fen_becomes_sync() {
        let json = format!(r#"{{"event":"move","data":{{"from":"e2","to":"e4","fen":"{STARTING_FEN}"}}}}"#);
        match ServerEvent::from_json(&json).unwrap().into_input() {
            SessionInput::RemoteMove(remote) => assert_eq!(remote.sync, Some(Position::starting())),
            other => panic!("unexpected input: {other:?}"),
        }
    }

    #[test]
    fn test_bare_game_state() {
        let json = format!(r#"{{"event":"gameState","data":"{STARTING_FEN}"}}"#);
        assert_eq!(
            ServerEvent::from_json(&json).unwrap().into_input(),
            SessionInput::StateSync(Position::starting())
        );
    }

    #[test]
    fn test_server_event_encoding_decodes_back() {
        let event = ServerEvent::Move(MovePayload {
            from: "a7".into(),
            to: "a8".into(),
            obtained_promotion: Some(Promotion::Knight),
            fen: None,
            correlation_id: Some(Uuid::nil()),
        });
        assert_eq!(ServerEvent::from_json(&event.to_json().unwrap()).unwrap(), event);
    }

    #[test]
    fn test_submit_move_encoding() {
        let id = Uuid::new_v4();
        let event = ClientEvent::from(Outbound::SubmitMove {
            request: MoveRequest::simple("e2", "e4"),
            position: Position::starting(),
            correlation_id: id,
        });
        let value: serde_json::Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(value["event"], "move");
        assert_eq!(value["data"]["from"], "e2");
        assert_eq!(value["data"]["to"], "e4");
        assert_eq!(value["data"]["fen"], STARTING_FEN);
        assert_eq!(value["data"]["correlationId"], id.to_string());
        assert!(value["data"].get("obtainedPromotion").is_none());
    }

    #[test]
    fn test_unit_events_have_no_data() {
        assert_eq!(
            ClientEvent::from(Outbound::RequestState).to_json().unwrap(),
            r#"{"event":"requestGameState"}"#
        );
        assert_eq!(ClientEvent::GetWaitingCount.name(), "getWaitingCount");
    }

    #[test]
    fn test_match_completed_shapes() {
        let decisive = ClientEvent::from(Outbound::MatchCompleted(MatchCompletion::Decisive {
            winner: "u1".into(),
            loser: "u2".into(),
        }));
        assert_eq!(
            decisive.to_json().unwrap(),
            r#"{"event":"matchCompleted","data":{"winner":"u1","loser":"u2"}}"#
        );

        let draw = ClientEvent::from(Outbound::MatchCompleted(MatchCompletion::Draw {
            players: vec!["u1".into(), "u2".into()],
        }));
        assert_eq!(
            draw.to_json().unwrap(),
            r#"{"event":"matchCompleted","data":{"draw":true,"players":["u1","u2"]}}"#
        );
    }

    #[test]
    fn test_player_left_payload() {
        let event = ClientEvent::from(Outbound::PlayerLeft {
            user_id: "u1".into(),
            username: "alice".into(),
            opponent_id: Some("u2".into()),
        });
        assert_eq!(
            event.to_json().unwrap(),
            r#"{"event":"playerLeft","data":{"userId":"u1","username":"alice","opponentId":"u2"}}"#
        );
        assert_eq!(ClientEvent::from_json(&event.to_json().unwrap()).unwrap(), event);
    }
}
