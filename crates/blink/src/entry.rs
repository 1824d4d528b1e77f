//! Per-(height, txhash) cache entries on the quorum-member side.

use blinknet_core::ConnectionId;
use blinknet_types::{BlinkTx, QuorumSignature};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::hash::{Hash as StdHash, Hasher};
use std::sync::Arc;

/// A signature awaiting (or undergoing) slot insertion.
///
/// Equality and hashing cover only `(subquorum, signature)` — the dedup
/// identity for signatures that arrive before the tx body.
#[derive(Clone, Copy, Debug)]
pub struct PendingSignature {
    /// Approval (`true`) or rejection (`false`).
    pub approved: bool,
    /// Subquorum index.
    pub subquorum: u8,
    /// Position within the subquorum.
    pub position: u8,
    /// The signature itself.
    pub signature: QuorumSignature,
}

impl PartialEq for PendingSignature {
    fn eq(&self, other: &Self) -> bool {
        self.subquorum == other.subquorum && self.signature == other.signature
    }
}

impl Eq for PendingSignature {}

impl StdHash for PendingSignature {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.subquorum.hash(state);
        self.signature.hash(state);
    }
}

/// Cache entry for one `(height, txhash)`.
///
/// Created either by a submission (then `btx` is set) or by signatures that
/// outran the tx body (then only `pending_sigs` holds data). The stashed
/// reply route is consumed exactly once, when the quorum decision fires.
#[derive(Default)]
pub struct BlinkEntry {
    /// The blink tx being signed, shared with in-flight signature batches.
    /// Absent while only detached signatures have arrived.
    pub btx: Option<Arc<RwLock<BlinkTx>>>,
    /// Signatures that arrived before the tx body, deduplicated by
    /// `(subquorum, signature)`.
    pub pending_sigs: HashSet<PendingSignature>,
    /// Connection of an originator awaiting the decision.
    pub reply_conn: Option<ConnectionId>,
    /// The originator's tag; zero when no reply is owed.
    pub reply_tag: u64,
}

impl BlinkEntry {
    /// Take the reply route, if one is owed, leaving the entry with none.
    pub fn take_reply(&mut self) -> Option<(ConnectionId, u64)> {
        if self.reply_tag == 0 {
            return None;
        }
        let conn = self.reply_conn.take()?;
        let tag = std::mem::take(&mut self.reply_tag);
        Some((conn, tag))
    }

    /// Stash a reply route for a waiting originator. A second originator for
    /// the same tx keeps the first route (one reply per entry).
    pub fn stash_reply(&mut self, conn: ConnectionId, tag: u64) {
        if tag != 0 && self.reply_tag == 0 {
            self.reply_conn = Some(conn);
            self.reply_tag = tag;
        }
    }
}
