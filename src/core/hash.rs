//! Position Hashing
//!
//! Provides deterministic hashing of chess positions for:
//! - Checksums sent alongside submitted moves
//! - Repetition keys for threefold detection
//! - Compact log output

use std::collections::BTreeMap;

use sha2::{Sha256, Digest};

/// Hash output type (256 bits / 32 bytes)
pub type PositionHash = [u8; 32];

/// Domain separator for full-position checksums.
const CHECKSUM_DOMAIN: &[u8] = b"CHESS_RELAY_POSITION_V1";

/// Domain separator for repetition keys.
const REPETITION_DOMAIN: &[u8] = b"CHESS_RELAY_REPETITION_V1";

/// Deterministic hasher for position data.
///
/// Wraps SHA-256 with a domain separator.
/// Order of updates is critical for determinism.
pub struct PositionHasher {
    hasher: Sha256,
}

impl PositionHasher {
    /// Create a new hasher with domain separator.
    pub fn new(domain: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(domain);
        Self { hasher }
    }

    /// Update with a string field, length-prefixed so adjacent fields cannot alias.
    #[inline]
    pub fn update_field(&mut self, field: &str) {
        self.hasher.update((field.len() as u32).to_le_bytes());
        self.hasher.update(field.as_bytes());
    }

    /// Finalize and return the hash.
    pub fn finalize(self) -> PositionHash {
        self.hasher.finalize().into()
    }
}

/// Checksum of a full FEN string.
pub fn position_checksum(fen: &str) -> PositionHash {
    let mut hasher = PositionHasher::new(CHECKSUM_DOMAIN);
    hasher.update_field(fen.trim());
    hasher.finalize()
}

/// Repetition key of a FEN string.
///
/// Only placement, side to move, castling rights and en passant square take
/// part; the halfmove clock and fullmove number do not.
pub fn repetition_key(fen: &str) -> PositionHash {
    let mut hasher = PositionHasher::new(REPETITION_DOMAIN);
    for field in fen.split_whitespace().take(4) {
        hasher.update_field(field);
    }
    hasher.finalize()
}

/// Short hex prefix of a hash for log lines.
pub fn short_hex(hash: &PositionHash) -> String {
    hex::encode(&hash[..6])
}

/// Occurrence counts of positions, keyed by repetition key.
#[derive(Debug, Clone, Default)]
pub struct RepetitionTable {
    counts: BTreeMap<PositionHash, u32>,
}

impl RepetitionTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a fresh table seeded with one position.
    pub fn seeded(fen: &str) -> Self {
        let mut table = Self::new();
        table.record(fen);
        table
    }

    /// Record one occurrence of a position. Returns the new count.
    pub fn record(&mut self, fen: &str) -> u32 {
        let count = self.counts.entry(repetition_key(fen)).or_insert(0);
        *count += 1;
        *count
    }
}
