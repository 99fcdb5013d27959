//! Network Layer
//!
//! Everything that touches the relay or the profile service.
//! Session logic lives in `game/`; this layer only moves bytes and retries.

pub mod protocol;
pub mod transport;
pub mod recorder;
pub mod client;

pub use protocol::{ClientEvent, ServerEvent, ProtocolError};
pub use transport::{
    Transport, TransportEvent, TransportHandle, TransportLifecycle, ReconnectDecision,
    TransportError, WsTransport,
};
pub use recorder::{
    OutcomeRecorder, HttpOutcomeRecorder, RecordingCoordinator, RetryPolicy, RecorderError,
};
pub use client::{SessionDriver, SessionClient, SessionUpdate, ClientError, DriverExit};
