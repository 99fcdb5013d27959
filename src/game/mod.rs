//! Game Logic Module
//!
//! Session state and chess rules. No I/O: every step is a synchronous
//! reducer call, so the whole module is testable without a transport.
//!
//! ## Module Structure
//!
//! - `rules`: Rules engine trait and the `shakmaty` implementation
//! - `state`: Session data model and snapshots
//! - `events`: Typed session inputs and effects
//! - `machine`: Session state machine
//! - `feedback`: Move sound/visual cues
//! - `local`: Hot-seat local game
//! - `stats`: Match statistics and rating

pub mod rules;
pub mod state;
pub mod events;
pub mod machine;
pub mod feedback;
pub mod local;
pub mod stats;

// Re-export key types
pub use rules::{RulesEngine, RulesError, StandardRules};
pub use state::{Color, GameSession, MoveRequest, Position, SessionPhase, SessionSnapshot};
pub use events::{Effect, Outbound, OutcomeReport, SessionInput};
pub use machine::{SessionError, SessionMachine};
pub use local::LocalGame;
pub use stats::MatchStats;
