//! Core deterministic primitives.
//!
//! Position checksums and reconnect backoff. Neither depends on wall-clock
//! time or randomness.

pub mod hash;
pub mod backoff;

// Re-export core types
pub use hash::{position_checksum, PositionHash, RepetitionTable};
pub use backoff::{Backoff, BackoffConfig};
