//! Quorum membership types and the membership checksum.

use crate::{SnPublicKey, CHECKPOINT_MIN_VOTES, OBLIGATIONS_MIN_VOTES};
use crate::{BLINK_MIN_VOTES, PULSE_BLOCK_REQUIRED_SIGNATURES};
use std::fmt;

/// The kinds of quorums deterministically selected from the service-node set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QuorumType {
    /// Uptime / misbehaviour testing quorum.
    Obligations,
    /// Chain checkpointing quorum.
    Checkpointing,
    /// Instant-finality transaction quorum.
    Blink,
    /// Block-production quorum.
    Pulse,
}

impl QuorumType {
    /// Numeric tag used on the wire.
    pub fn to_u8(self) -> u8 {
        match self {
            QuorumType::Obligations => 0,
            QuorumType::Checkpointing => 1,
            QuorumType::Blink => 2,
            QuorumType::Pulse => 3,
        }
    }

    /// Parse the wire tag.
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(QuorumType::Obligations),
            1 => Some(QuorumType::Checkpointing),
            2 => Some(QuorumType::Blink),
            3 => Some(QuorumType::Pulse),
            _ => None,
        }
    }
}

impl fmt::Display for QuorumType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QuorumType::Obligations => "obligations",
            QuorumType::Checkpointing => "checkpointing",
            QuorumType::Blink => "blink",
            QuorumType::Pulse => "pulse",
        };
        write!(f, "{s}")
    }
}

/// Minimum votes required for a decision of the given quorum type.
pub fn min_votes_for_quorum_type(quorum_type: QuorumType) -> usize {
    match quorum_type {
        QuorumType::Obligations => OBLIGATIONS_MIN_VOTES,
        QuorumType::Checkpointing => CHECKPOINT_MIN_VOTES,
        QuorumType::Blink => BLINK_MIN_VOTES,
        QuorumType::Pulse => PULSE_BLOCK_REQUIRED_SIGNATURES,
    }
}

/// A quorum selected at some height: an ordered validator set plus, for
/// quorum types that use them, the workers the quorum passes judgement on
/// (obligations) or informs (pulse).
///
/// Order is deterministic from on-chain entropy; all honest nodes at the same
/// height agree on it exactly.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Quorum {
    /// Voting members, in selection order.
    pub validators: Vec<SnPublicKey>,
    /// Non-voting members (unused by blink).
    pub workers: Vec<SnPublicKey>,
}

impl Quorum {
    /// Position of a pubkey in the validator list, if present.
    pub fn position_of(&self, pubkey: &SnPublicKey) -> Option<usize> {
        self.validators.iter().position(|v| v == pubkey)
    }
}

/// Deterministic checksum over a validator list.
///
/// For each validator, an 8-byte window is read from the 32-byte pubkey
/// starting at `offset % 32` (wrapping around the end of the key),
/// interpreted little-endian, and added into a wrapping sum; the offset
/// advances by one per validator. Both sides of a quorum exchange must agree
/// on this value bit-exactly, so the window walk and byte order are part of
/// the protocol.
pub fn quorum_checksum(validators: &[SnPublicKey], mut offset: usize) -> u64 {
    const KEY_BYTES: usize = SnPublicKey::BYTES;
    const WINDOW: usize = std::mem::size_of::<u64>();

    let mut sum = 0u64;
    for pubkey in validators {
        offset %= KEY_BYTES;
        let bytes = pubkey.as_bytes();
        let mut window = [0u8; WINDOW];
        if offset <= KEY_BYTES - WINDOW {
            window.copy_from_slice(&bytes[offset..offset + WINDOW]);
        } else {
            let front = KEY_BYTES - offset;
            window[..front].copy_from_slice(&bytes[offset..]);
            window[front..].copy_from_slice(&bytes[..WINDOW - front]);
        }
        sum = sum.wrapping_add(u64::from_le_bytes(window));
        offset += 1;
    }
    sum
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(seed: u8) -> SnPublicKey {
        SnPublicKey::from_bytes(crate::Hash::from_bytes(&[seed]).to_bytes())
    }

    #[test]
    fn test_position_of() {
        let q = Quorum {
            validators: vec![key(1), key(2), key(3)],
            workers: vec![],
        };
        assert_eq!(q.position_of(&key(2)), Some(1));
        assert_eq!(q.position_of(&key(9)), None);
    }

    #[test]
    fn test_checksum_deterministic() {
        let validators: Vec<_> = (0..10).map(key).collect();
        assert_eq!(
            quorum_checksum(&validators, 0),
            quorum_checksum(&validators, 0)
        );
    }

    #[test]
    fn test_checksum_depends_on_offset_and_order() {
        let validators: Vec<_> = (0..10).map(key).collect();
        let base = quorum_checksum(&validators, 0);
        assert_ne!(base, quorum_checksum(&validators, 10));

        let mut reversed = validators.clone();
        reversed.reverse();
        assert_ne!(base, quorum_checksum(&reversed, 0));
    }

    #[test]
    fn test_checksum_window_wraps_around_key() {
        // Offsets 25..=31 force the window to wrap; must not panic and must
        // differ from the unwrapped reads.
        let validators = vec![key(42)];
        let mut seen = std::collections::HashSet::new();
        for offset in 24..32 {
            seen.insert(quorum_checksum(&validators, offset));
        }
        assert_eq!(seen.len(), 8);
    }

    #[test]
    fn test_checksum_empty() {
        assert_eq!(quorum_checksum(&[], 0), 0);
    }

    #[test]
    fn test_quorum_type_tag_roundtrip() {
        for t in [
            QuorumType::Obligations,
            QuorumType::Checkpointing,
            QuorumType::Blink,
            QuorumType::Pulse,
        ] {
            assert_eq!(QuorumType::from_u8(t.to_u8()), Some(t));
        }
        assert_eq!(QuorumType::from_u8(9), None);
    }
}
