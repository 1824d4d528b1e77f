//! Core types for the blinknet quorum coordination core.
//!
//! This crate provides the foundational types shared by every other layer:
//!
//! - **Primitives**: [`Hash`], service-node keys and signatures
//! - **Quorums**: [`Quorum`], [`QuorumType`], the membership checksum
//! - **Blink**: [`BlinkTx`] with its per-slot signature accounting
//! - **Votes**: [`ObligationVote`] relayed between quorum members
//!
//! It is self-contained: no other workspace crate is a dependency, making it
//! the foundation layer.

mod blink_tx;
mod constants;
mod crypto;
mod hash;
mod identifiers;
mod quorum;
mod vote;

pub use blink_tx::{blink_signing_hash, BlinkTx, SignatureSlot, Subquorum};
pub use constants::*;
pub use crypto::{batch_verify_signatures, verify_signature, QuorumSignature, ServiceNodeKeys};
pub use hash::{Hash, HexError};
pub use identifiers::{SnPublicKey, SoftwareVersion, X25519PublicKey};
pub use quorum::{min_votes_for_quorum_type, quorum_checksum, Quorum, QuorumType};
pub use vote::{NodeStateChange, ObligationVote, VoteGroup, VotePayload};
