//! # Chess Relay Client
//!
//! Peer-synchronized chess sessions over a relay server.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      CHESS RELAY                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  config.rs       - Env-driven client configuration           │
//! │                                                              │
//! │  core/           - Deterministic primitives                  │
//! │  ├── hash.rs     - Position checksums, repetition keys       │
//! │  └── backoff.rs  - Capped exponential reconnect backoff      │
//! │                                                              │
//! │  game/           - Session logic (no I/O)                    │
//! │  ├── rules.rs    - Rules engine trait + shakmaty backend     │
//! │  ├── state.rs    - Session data model and snapshots          │
//! │  ├── events.rs   - Session inputs and effects                │
//! │  ├── machine.rs  - Session state machine                     │
//! │  ├── feedback.rs - Move sound/visual cues                    │
//! │  ├── local.rs    - Hot-seat local game                       │
//! │  └── stats.rs    - Match statistics and rating               │
//! │                                                              │
//! │  network/        - I/O edge                                  │
//! │  ├── protocol.rs - Wire events                               │
//! │  ├── transport.rs- WebSocket transport with reconnection     │
//! │  ├── recorder.rs - Outcome persistence with retries          │
//! │  └── client.rs   - Async driver for one session              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Move Reconciliation
//!
//! A local move is applied optimistically and sent to the relay with a
//! correlation id. It is confirmed by its echo, by the opponent's reply, or
//! overridden by a full-state sync. A remote move that does not apply to the
//! confirmed position suspends play until the relay sends the authoritative
//! position.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod core;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use crate::config::{ClientConfig, ConfigError};
pub use crate::core::backoff::{Backoff, BackoffConfig};
pub use crate::game::machine::{SessionError, SessionMachine};
pub use crate::game::state::{Color, GameSession, MoveRequest, Position, SessionPhase, SessionSnapshot};
pub use crate::network::client::{SessionClient, SessionDriver};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
