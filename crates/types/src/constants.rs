//! Protocol constants for quorum coordination.

/// Maximum number of validators in one blink subquorum.
pub const BLINK_SUBQUORUM_SIZE: usize = 10;

/// Minimum number of approval signatures each subquorum must contribute
/// before a blink transaction is considered approved.
pub const BLINK_MIN_VOTES: usize = 7;

/// Number of overlapping blink subquorums (`Q` and the future quorum `Q'`).
pub const NUM_BLINK_QUORUMS: usize = 2;

/// Blink quorums are re-selected every this many blocks.
pub const BLINK_QUORUM_INTERVAL: u64 = 5;

/// How far behind the authorization height the base quorum is selected.
/// The lag keeps quorum membership stable against small reorgs near the tip.
pub const BLINK_QUORUM_LAG: u64 = 7 * BLINK_QUORUM_INTERVAL;

/// A blink authorization height must be within this many blocks of the
/// current chain tip (in either direction) when a submission is first seen.
pub const BLINK_HEIGHT_TOLERANCE: u64 = 2;

/// Blink cache entries are evicted once their height falls this many blocks
/// below the tip.
pub const BLINK_RETENTION_BLOCKS: u64 = 8;

/// Hard fork version from which blink transactions are accepted.
pub const HF_VERSION_BLINK: u8 = 14;

/// Number of validators in a pulse block-production quorum.
pub const PULSE_QUORUM_NUM_VALIDATORS: usize = 11;

/// Signatures required on a pulse-produced block.
pub const PULSE_BLOCK_REQUIRED_SIGNATURES: usize = 7;

/// Minimum votes for an obligations (uptime/misbehaviour) quorum decision.
pub const OBLIGATIONS_MIN_VOTES: usize = 7;

/// Minimum votes for a checkpointing quorum decision.
pub const CHECKPOINT_MIN_VOTES: usize = 13;
