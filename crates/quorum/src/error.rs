//! Quorum assembly and relay errors.

use blinknet_types::QuorumType;
use thiserror::Error;

/// Errors from quorum view assembly and relay planning.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuorumError {
    /// Too early in the chain for a lagged quorum to exist.
    #[error("Too early in blockchain to create a quorum")]
    TooEarly,

    /// The registry has no quorum of this type at this height.
    #[error("Unable to retrieve {quorum_type} quorum for height {height}")]
    NoQuorum {
        /// Quorum type requested.
        quorum_type: QuorumType,
        /// Height requested.
        height: u64,
    },

    /// A subquorum is outside the allowed size bounds.
    #[error("Not enough blink nodes to form a quorum ({size} validators)")]
    BadQuorumSize {
        /// Observed validator count.
        size: usize,
    },

    /// The sender's checksum disagrees with the locally computed one.
    #[error("wrong quorum checksum (expected {local}, received {received})")]
    ChecksumMismatch {
        /// Locally computed checksum.
        local: u64,
        /// Checksum received from the peer.
        received: u64,
    },

    /// This node is not a member of the relevant quorum.
    #[error("This service node is not a member of the {quorum_type} quorum")]
    NotAMember {
        /// Quorum type checked.
        quorum_type: QuorumType,
    },
}
