//! Blink submission errors.

use blinknet_quorum::QuorumError;
use blinknet_wire::WireError;
use thiserror::Error;

/// Why a submission never started quorum processing on this node.
///
/// The display strings double as the `bl.nostart` reasons sent back to an
/// originator, so they are part of the protocol surface and must not drift.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlinkError {
    /// The submission dict was malformed.
    #[error("Invalid blink submission: {0}")]
    Malformed(WireError),

    /// The blink hard fork is not active on this chain.
    #[error("Blink is not available on this network yet")]
    NotEnabled,

    /// The authorization height is outside the tolerance window around the
    /// tip.
    #[error("Invalid blink authorization height")]
    BadHeight {
        /// Claimed authorization height.
        height: u64,
        /// Local chain tip.
        tip: u64,
    },

    /// Quorum assembly failed, or this node is not a member.
    #[error(transparent)]
    Quorum(QuorumError),

    /// The sender's checksum disagrees with the local quorum view.
    #[error("Invalid blink submission: {0}")]
    WrongChecksum(QuorumError),

    /// The tx blob does not parse.
    #[error("Failed to parse transaction data")]
    TxParse,

    /// The stated tx hash does not match the parsed transaction.
    #[error("Invalid transaction hash")]
    TxHashMismatch,

    /// No quorum peer could be reached for pre-distribution.
    #[error("Unable to relay blink transaction: no reachable blink quorum peers")]
    NoReachablePeers,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nostart_reasons_are_stable() {
        assert_eq!(
            BlinkError::BadHeight {
                height: 997,
                tip: 1000
            }
            .to_string(),
            "Invalid blink authorization height"
        );
        assert_eq!(
            BlinkError::TxParse.to_string(),
            "Failed to parse transaction data"
        );
        assert_eq!(
            BlinkError::WrongChecksum(QuorumError::ChecksumMismatch {
                local: 1,
                received: 2
            })
            .to_string(),
            "Invalid blink submission: wrong quorum checksum (expected 1, received 2)"
        );
    }
}
