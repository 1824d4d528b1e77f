//! In-memory fakes for the collaborator traits, shared by protocol-crate
//! tests.

use crate::{
    BlinkTxPool, ChainView, ConnectionId, MessageSender, SendOptions, SnProof, SnRegistry,
    TxError, VoteOutcome, VotePool,
};
use blinknet_types::{Hash, ObligationVote, Quorum, QuorumType, SnPublicKey, X25519PublicKey};
use blinknet_wire::WireDict;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Fixed-height chain view.
pub struct TestChain {
    tip: Mutex<u64>,
    hf: Mutex<u8>,
}

impl TestChain {
    /// Chain at the given tip with blink enabled.
    pub fn at_height(tip: u64) -> Self {
        Self {
            tip: Mutex::new(tip),
            hf: Mutex::new(blinknet_types::HF_VERSION_BLINK),
        }
    }

    /// Move the tip.
    pub fn set_tip(&self, tip: u64) {
        *self.tip.lock() = tip;
    }

    /// Change the hard fork version.
    pub fn set_hf(&self, hf: u8) {
        *self.hf.lock() = hf;
    }
}

impl ChainView for TestChain {
    fn tip_height(&self) -> u64 {
        *self.tip.lock()
    }

    fn hf_version(&self) -> u8 {
        *self.hf.lock()
    }
}

/// Registry backed by maps.
#[derive(Default)]
pub struct TestRegistry {
    quorums: Mutex<HashMap<(QuorumType, u64), Arc<Quorum>>>,
    proofs: Mutex<HashMap<SnPublicKey, SnProof>>,
}

impl TestRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a quorum at (type, height).
    pub fn put_quorum(&self, quorum_type: QuorumType, height: u64, quorum: Quorum) {
        self.quorums
            .lock()
            .insert((quorum_type, height), Arc::new(quorum));
    }

    /// Install a proof for a pubkey.
    pub fn put_proof(&self, pubkey: SnPublicKey, proof: SnProof) {
        self.proofs.lock().insert(pubkey, proof);
    }
}

impl SnRegistry for TestRegistry {
    fn get_quorum(&self, quorum_type: QuorumType, height: u64) -> Option<Arc<Quorum>> {
        self.quorums.lock().get(&(quorum_type, height)).cloned()
    }

    fn proof(&self, pubkey: &SnPublicKey) -> Option<SnProof> {
        self.proofs.lock().get(pubkey).cloned()
    }
}

/// Scriptable tx pool: hashes blobs with blake3 and accepts or rejects
/// according to a per-test setting.
pub struct TestTxPool {
    /// Whether `try_accept_blink` accepts.
    pub accept: Mutex<bool>,
    /// Hashes promoted after quorum approval.
    pub promoted: Mutex<Vec<(u64, Hash)>>,
}

impl Default for TestTxPool {
    fn default() -> Self {
        Self {
            accept: Mutex::new(true),
            promoted: Mutex::new(Vec::new()),
        }
    }
}

impl TestTxPool {
    /// Pool that accepts everything.
    pub fn accepting() -> Self {
        Self::default()
    }

    /// Pool that rejects everything.
    pub fn rejecting() -> Self {
        Self {
            accept: Mutex::new(false),
            promoted: Mutex::new(Vec::new()),
        }
    }

    /// The canonical hash this pool derives for a blob.
    pub fn hash_of(blob: &[u8]) -> Hash {
        Hash::from_bytes(blob)
    }
}

impl BlinkTxPool for TestTxPool {
    fn parse_tx(&self, blob: &[u8]) -> Result<Hash, TxError> {
        if blob.is_empty() {
            return Err(TxError::Parse);
        }
        Ok(Self::hash_of(blob))
    }

    fn try_accept_blink(&self, _height: u64, _txhash: &Hash, blob: &[u8]) -> Result<bool, TxError> {
        if blob.is_empty() {
            return Err(TxError::Parse);
        }
        Ok(*self.accept.lock())
    }

    fn promote_approved_blink(&self, height: u64, txhash: &Hash) {
        self.promoted.lock().push((height, *txhash));
    }
}

/// A message captured by [`RecordingSender`].
#[derive(Clone, Debug)]
pub struct SentMessage {
    /// Destination peer.
    pub to: X25519PublicKey,
    /// Command name.
    pub command: String,
    /// Payload dict.
    pub payload: WireDict,
    /// Delivery options.
    pub options: SendOptions,
}

/// A reply captured by [`RecordingSender`].
#[derive(Clone, Debug)]
pub struct SentReply {
    /// Connection the reply went to.
    pub conn: ConnectionId,
    /// Command name.
    pub command: String,
    /// Payload dict.
    pub payload: WireDict,
}

/// Transport fake that records every send and reply.
#[derive(Default)]
pub struct RecordingSender {
    /// Peer-addressed sends, in order.
    pub sent: Mutex<Vec<SentMessage>>,
    /// Connection replies, in order.
    pub replies: Mutex<Vec<SentReply>>,
}

impl RecordingSender {
    /// Empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands of all recorded sends, in order.
    pub fn sent_commands(&self) -> Vec<String> {
        self.sent.lock().iter().map(|m| m.command.clone()).collect()
    }

    /// Commands of all recorded replies, in order.
    pub fn reply_commands(&self) -> Vec<String> {
        self.replies
            .lock()
            .iter()
            .map(|r| r.command.clone())
            .collect()
    }
}

impl MessageSender for RecordingSender {
    fn send(&self, to: &X25519PublicKey, command: &str, payload: WireDict, options: SendOptions) {
        self.sent.lock().push(SentMessage {
            to: *to,
            command: command.to_string(),
            payload,
            options,
        });
    }

    fn reply(&self, conn: ConnectionId, command: &str, payload: WireDict) {
        self.replies.lock().push(SentReply {
            conn,
            command: command.to_string(),
            payload,
        });
    }
}

/// Vote pool fake with a scriptable outcome.
#[derive(Default)]
pub struct TestVotePool {
    /// Outcome returned for every vote.
    pub outcome: Mutex<VoteOutcome>,
    /// Votes received, in order.
    pub received: Mutex<Vec<ObligationVote>>,
}

impl TestVotePool {
    /// Pool reporting every vote as newly added.
    pub fn adding() -> Self {
        Self {
            outcome: Mutex::new(VoteOutcome {
                verification_failed: false,
                added_to_pool: true,
            }),
            received: Mutex::new(Vec::new()),
        }
    }
}

impl VotePool for TestVotePool {
    fn handle_vote(&self, vote: &ObligationVote) -> VoteOutcome {
        self.received.lock().push(*vote);
        *self.outcome.lock()
    }
}
