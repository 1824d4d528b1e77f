//! Traits at the seams to the node's other subsystems.
//!
//! All methods are synchronous and expected to be cheap except where noted;
//! implementations own their own locking.

use blinknet_types::{
    Hash, ObligationVote, Quorum, QuorumType, SnPublicKey, SoftwareVersion, X25519PublicKey,
};
use std::net::Ipv4Addr;
use std::sync::Arc;
use thiserror::Error;

/// Read-only view of the local chain state.
pub trait ChainView: Send + Sync {
    /// Current blockchain height (the tip).
    fn tip_height(&self) -> u64;

    /// Hard fork version in effect at the tip.
    fn hf_version(&self) -> u8;
}

/// The registration and uptime-proof data the registry holds per service
/// node, as needed for peer resolution.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SnProof {
    /// Whether the node is currently active (registered, not decommissioned).
    pub active: bool,
    /// Transport pubkey from the last uptime proof.
    pub x25519_pubkey: Option<X25519PublicKey>,
    /// Public IP from the last uptime proof.
    pub public_ip: Option<Ipv4Addr>,
    /// Quorumnet listening port; 0 when unset.
    pub quorumnet_port: u16,
    /// Software version from the last uptime proof.
    pub version: SoftwareVersion,
}

/// Read-only view of the service-node registry.
pub trait SnRegistry: Send + Sync {
    /// The deterministically selected quorum of the given type at the given
    /// height, or `None` if that state is unknown (pruned or future).
    fn get_quorum(&self, quorum_type: QuorumType, height: u64) -> Option<Arc<Quorum>>;

    /// Latest registration/proof info for a service node, or `None` if it is
    /// not registered.
    fn proof(&self, pubkey: &SnPublicKey) -> Option<SnProof>;
}

/// Errors surfaced by the transaction pool.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TxError {
    /// The blob does not deserialize to a transaction.
    #[error("failed to parse transaction data")]
    Parse,

    /// The transaction is structurally valid but fails verification
    /// (bad signatures, spent outputs, fee rules, version range).
    #[error("transaction verification failed: {0}")]
    Invalid(String),

    /// A transient internal failure; the operation may succeed elsewhere.
    #[error("transaction pool unavailable: {0}")]
    Internal(String),
}

/// The mempool surface the blink coordinator needs.
pub trait BlinkTxPool: Send + Sync {
    /// Parse and structurally validate a tx blob, returning its canonical
    /// hash. No semantic verification.
    fn parse_tx(&self, blob: &[u8]) -> Result<Hash, TxError>;

    /// Fully verify the transaction and insert it into the mempool flagged
    /// as a blink candidate. `Ok(true)` means accepted, `Ok(false)` means
    /// the pool rejected it (a valid quorum outcome, not an error).
    ///
    /// Takes the pool's own lock; may block briefly.
    fn try_accept_blink(&self, height: u64, txhash: &Hash, blob: &[u8]) -> Result<bool, TxError>;

    /// Called once the quorum approved the blink: register the approval with
    /// the mempool, mark the tx relayable, and trigger a standard relay
    /// pass.
    fn promote_approved_blink(&self, height: u64, txhash: &Hash);
}

/// Result of handing an inbound vote to the vote subsystem.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VoteOutcome {
    /// Signature/structure verification failed.
    pub verification_failed: bool,
    /// The vote was new and entered the pool (worth re-relaying).
    pub added_to_pool: bool,
}

/// The vote subsystem surface the obligation-vote relay needs. The pool is
/// responsible for deduplication.
pub trait VotePool: Send + Sync {
    /// Verify and record a vote received from a peer.
    fn handle_vote(&self, vote: &ObligationVote) -> VoteOutcome;
}
