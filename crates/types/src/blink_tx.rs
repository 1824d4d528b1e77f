//! Blink transaction state: per-slot signatures across the two subquorums.

use crate::{
    Hash, QuorumSignature, BLINK_MIN_VOTES, BLINK_QUORUM_INTERVAL, BLINK_QUORUM_LAG,
    BLINK_SUBQUORUM_SIZE, NUM_BLINK_QUORUMS,
};

/// One of the two overlapping blink subquorums.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Subquorum {
    /// `Q`, selected at the base quorum height.
    Base,
    /// `Q'`, selected one quorum interval later.
    Future,
}

impl Subquorum {
    /// Index of this subquorum (0 or 1).
    pub fn index(self) -> usize {
        match self {
            Subquorum::Base => 0,
            Subquorum::Future => 1,
        }
    }

    /// Parse a subquorum index.
    pub fn from_index(i: usize) -> Option<Self> {
        match i {
            0 => Some(Subquorum::Base),
            1 => Some(Subquorum::Future),
            _ => None,
        }
    }
}

/// State of a single validator slot.
///
/// Transitions are one-shot: a slot written as approved or rejected is never
/// overwritten.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SignatureSlot {
    /// No signature received for this slot yet.
    #[default]
    Vacant,
    /// Validator signed the approval hash.
    Approved(QuorumSignature),
    /// Validator signed the rejection hash.
    Rejected(QuorumSignature),
}

impl SignatureSlot {
    /// True unless the slot is vacant.
    pub fn is_filled(&self) -> bool {
        !matches!(self, SignatureSlot::Vacant)
    }
}

/// A blink transaction under quorum consideration.
///
/// Holds the raw transaction blob (parsing and semantic verification belong
/// to the tx pool), the authorization height, the canonical tx hash, and a
/// slot of signature state per validator position in each subquorum.
///
/// Invariants maintained here:
/// - a slot is written at most once;
/// - once [`approved`](Self::approved) or [`rejected`](Self::rejected) is
///   true, no further slot changes are accepted;
/// - `approved` and `rejected` can never hold simultaneously (approval needs
///   [`BLINK_MIN_VOTES`] approvals per subquorum, rejection needs enough
///   rejections in some subquorum to make that unreachable).
#[derive(Clone, Debug)]
pub struct BlinkTx {
    height: u64,
    txhash: Hash,
    tx_blob: Vec<u8>,
    quorum_sizes: [usize; NUM_BLINK_QUORUMS],
    slots: [[SignatureSlot; BLINK_SUBQUORUM_SIZE]; NUM_BLINK_QUORUMS],
    approvals: [usize; NUM_BLINK_QUORUMS],
    rejections: [usize; NUM_BLINK_QUORUMS],
}

impl BlinkTx {
    /// Create a new blink tx for the given authorization height.
    ///
    /// `quorum_sizes` are the actual validator counts of the two subquorums
    /// at this height; positions at or beyond a subquorum's size are
    /// rejected by [`add_prechecked_signature`](Self::add_prechecked_signature).
    pub fn new(
        height: u64,
        txhash: Hash,
        tx_blob: Vec<u8>,
        quorum_sizes: [usize; NUM_BLINK_QUORUMS],
    ) -> Self {
        Self {
            height,
            txhash,
            tx_blob,
            quorum_sizes,
            slots: Default::default(),
            approvals: [0; NUM_BLINK_QUORUMS],
            rejections: [0; NUM_BLINK_QUORUMS],
        }
    }

    /// Blink authorization height.
    pub fn height(&self) -> u64 {
        self.height
    }

    /// Canonical transaction hash.
    pub fn txhash(&self) -> &Hash {
        &self.txhash
    }

    /// Raw transaction blob as received.
    pub fn tx_blob(&self) -> &[u8] {
        &self.tx_blob
    }

    /// The height at which the given subquorum is selected, derived from the
    /// authorization height.
    ///
    /// Returns `None` too early in the chain, before enough blocks exist for
    /// a lagged quorum. Every node must derive the same value, so the
    /// interval rounding here is part of the protocol.
    pub fn quorum_height(height: u64, subquorum: Subquorum) -> Option<u64> {
        let base = height.checked_sub(height % BLINK_QUORUM_INTERVAL + BLINK_QUORUM_LAG)?;
        Some(base + subquorum.index() as u64 * BLINK_QUORUM_INTERVAL)
    }

    /// The digest quorum members sign: one value for approval, a distinct
    /// one for rejection, both bound to this (height, txhash).
    pub fn signing_hash(&self, approved: bool) -> Hash {
        blink_signing_hash(self.height, &self.txhash, approved)
    }

    /// Signature state at a slot, or `None` if the position is out of range
    /// for that subquorum.
    pub fn slot(&self, subquorum: Subquorum, position: usize) -> Option<&SignatureSlot> {
        if position >= self.quorum_sizes[subquorum.index()] {
            return None;
        }
        Some(&self.slots[subquorum.index()][position])
    }

    /// True if the slot already holds a signature (out-of-range positions
    /// count as filled so callers skip them).
    pub fn slot_filled(&self, subquorum: Subquorum, position: usize) -> bool {
        self.slot(subquorum, position).map_or(true, SignatureSlot::is_filled)
    }

    /// Record a signature that has already passed pubkey verification.
    ///
    /// Returns `true` iff the slot was vacant and the tx was still
    /// undecided; a second writer for the same slot, an out-of-range
    /// position, or a write after the approved/rejected transition all
    /// return `false` and leave the state untouched.
    pub fn add_prechecked_signature(
        &mut self,
        subquorum: Subquorum,
        position: usize,
        approved: bool,
        signature: QuorumSignature,
    ) -> bool {
        if self.approved() || self.rejected() {
            return false;
        }
        let qi = subquorum.index();
        if position >= self.quorum_sizes[qi] || self.slots[qi][position].is_filled() {
            return false;
        }
        if approved {
            self.slots[qi][position] = SignatureSlot::Approved(signature);
            self.approvals[qi] += 1;
        } else {
            self.slots[qi][position] = SignatureSlot::Rejected(signature);
            self.rejections[qi] += 1;
        }
        true
    }

    /// True once every subquorum holds at least [`BLINK_MIN_VOTES`]
    /// approvals.
    pub fn approved(&self) -> bool {
        self.approvals.iter().all(|&a| a >= BLINK_MIN_VOTES)
    }

    /// True once some subquorum holds enough rejections that it can no
    /// longer reach [`BLINK_MIN_VOTES`] approvals.
    pub fn rejected(&self) -> bool {
        self.rejections
            .iter()
            .zip(&self.quorum_sizes)
            .any(|(&rej, &size)| size - rej < BLINK_MIN_VOTES)
    }

    /// Approval counts per subquorum.
    pub fn approval_counts(&self) -> [usize; NUM_BLINK_QUORUMS] {
        self.approvals
    }
}

/// The blink signing digest for `(height, txhash, approved)`.
///
/// Standalone so signatures arriving before the tx body can still be
/// verified.
pub fn blink_signing_hash(height: u64, txhash: &Hash, approved: bool) -> Hash {
    Hash::from_parts(&[&height.to_le_bytes(), txhash.as_bytes(), &[approved as u8]])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_btx() -> BlinkTx {
        BlinkTx::new(1000, Hash::from_bytes(b"tx"), b"blob".to_vec(), [10, 10])
    }

    fn sig(n: u8) -> QuorumSignature {
        QuorumSignature([n; 64])
    }

    #[test]
    fn test_quorum_height_derivation() {
        // 1000 % 5 == 0, so base = 1000 - 35 = 965 and future = 970.
        assert_eq!(BlinkTx::quorum_height(1000, Subquorum::Base), Some(965));
        assert_eq!(BlinkTx::quorum_height(1000, Subquorum::Future), Some(970));
        // 1003 rounds down to the same interval boundary.
        assert_eq!(BlinkTx::quorum_height(1003, Subquorum::Base), Some(965));
        // Too early in the chain.
        assert_eq!(BlinkTx::quorum_height(30, Subquorum::Base), None);
    }

    #[test]
    fn test_signing_hash_distinguishes_outcomes() {
        let btx = make_btx();
        assert_ne!(btx.signing_hash(true), btx.signing_hash(false));
        assert_eq!(
            btx.signing_hash(true),
            blink_signing_hash(1000, &Hash::from_bytes(b"tx"), true)
        );
    }

    #[test]
    fn test_slot_written_at_most_once() {
        let mut btx = make_btx();
        assert!(btx.add_prechecked_signature(Subquorum::Base, 3, true, sig(1)));
        assert!(!btx.add_prechecked_signature(Subquorum::Base, 3, true, sig(2)));
        assert!(!btx.add_prechecked_signature(Subquorum::Base, 3, false, sig(3)));
        assert_eq!(
            btx.slot(Subquorum::Base, 3),
            Some(&SignatureSlot::Approved(sig(1)))
        );
    }

    #[test]
    fn test_out_of_range_position_rejected() {
        let mut btx = BlinkTx::new(1000, Hash::from_bytes(b"tx"), vec![], [8, 10]);
        assert!(!btx.add_prechecked_signature(Subquorum::Base, 8, true, sig(1)));
        assert!(btx.add_prechecked_signature(Subquorum::Future, 8, true, sig(1)));
        assert!(btx.slot_filled(Subquorum::Base, 9));
    }

    #[test]
    fn test_approval_threshold() {
        let mut btx = make_btx();
        for pos in 0..BLINK_MIN_VOTES {
            btx.add_prechecked_signature(Subquorum::Base, pos, true, sig(pos as u8));
        }
        // One subquorum at threshold is not enough.
        assert!(!btx.approved());
        for pos in 0..BLINK_MIN_VOTES - 1 {
            btx.add_prechecked_signature(Subquorum::Future, pos, true, sig(pos as u8));
        }
        assert!(!btx.approved());
        btx.add_prechecked_signature(Subquorum::Future, 9, true, sig(99));
        assert!(btx.approved());
        assert!(!btx.rejected());
    }

    #[test]
    fn test_rejection_when_approval_unreachable() {
        let mut btx = make_btx();
        // 10 validators, 7 needed: 3 rejections still leave approval
        // reachable, the 4th makes it impossible.
        for pos in 0..3 {
            btx.add_prechecked_signature(Subquorum::Base, pos, false, sig(pos as u8));
        }
        assert!(!btx.rejected());
        btx.add_prechecked_signature(Subquorum::Base, 3, false, sig(3));
        assert!(btx.rejected());
        assert!(!btx.approved());
    }

    #[test]
    fn test_no_writes_after_decision() {
        let mut btx = make_btx();
        for pos in 0..4 {
            btx.add_prechecked_signature(Subquorum::Base, pos, false, sig(pos as u8));
        }
        assert!(btx.rejected());
        assert!(!btx.add_prechecked_signature(Subquorum::Future, 0, true, sig(50)));
        assert_eq!(btx.approval_counts(), [0, 0]);
    }

    #[test]
    fn test_smaller_quorum_rejects_sooner() {
        // 7 validators and 7 required votes: a single rejection decides.
        let mut btx = BlinkTx::new(1000, Hash::from_bytes(b"tx"), vec![], [7, 10]);
        assert!(btx.add_prechecked_signature(Subquorum::Base, 0, false, sig(1)));
        assert!(btx.rejected());
    }

}
