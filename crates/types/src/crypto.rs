//! Service-node keys and quorum signatures.
//!
//! Quorum members sign with their primary ed25519 key; signatures travel as
//! opaque 64-byte values and are verified against the validator pubkey at the
//! claimed quorum position. Batch verification is used for signature bundles
//! where it is meaningfully faster than one-at-a-time checks.

use crate::{Hash, SnPublicKey, X25519PublicKey};
use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use std::fmt;

/// A detached 64-byte ed25519 signature as carried in quorum messages.
///
/// Hashable so that signature sets can deduplicate on the raw bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct QuorumSignature(pub [u8; 64]);

impl QuorumSignature {
    /// Size of the signature in bytes.
    pub const BYTES: usize = 64;

    /// Wrap a byte slice; `None` unless it is exactly 64 bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        bytes.try_into().ok().map(Self)
    }

    /// Borrow the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }
}

impl fmt::Debug for QuorumSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = hex::encode(self.0);
        write!(f, "QuorumSignature({}..{})", &hex[..4], &hex[124..])
    }
}

/// The key material a running service node holds for quorum duty: the
/// primary signing key plus the x25519 pubkey it advertises in uptime proofs.
pub struct ServiceNodeKeys {
    signing_key: SigningKey,
    pubkey: SnPublicKey,
    x25519_pubkey: X25519PublicKey,
}

impl ServiceNodeKeys {
    /// Assemble from an existing secret and the transport pubkey advertised
    /// in this node's uptime proofs.
    pub fn new(secret: [u8; 32], x25519_pubkey: X25519PublicKey) -> Self {
        let signing_key = SigningKey::from_bytes(&secret);
        let pubkey = SnPublicKey::from_bytes(signing_key.verifying_key().to_bytes());
        Self {
            signing_key,
            pubkey,
            x25519_pubkey,
        }
    }

    /// Generate a fresh random key set.
    pub fn generate() -> Self {
        let mut csprng = rand::rngs::OsRng;
        let signing_key = SigningKey::generate(&mut csprng);
        let mut x25519 = [0u8; 32];
        rand::RngCore::fill_bytes(&mut csprng, &mut x25519);
        let pubkey = SnPublicKey::from_bytes(signing_key.verifying_key().to_bytes());
        Self {
            signing_key,
            pubkey,
            x25519_pubkey: X25519PublicKey::from_bytes(x25519),
        }
    }

    /// Deterministic keys from a seed, for tests and simulation.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(seed);
        let pubkey = SnPublicKey::from_bytes(signing_key.verifying_key().to_bytes());
        let x25519 = Hash::from_parts(&[b"x25519", seed]).to_bytes();
        Self {
            signing_key,
            pubkey,
            x25519_pubkey: X25519PublicKey::from_bytes(x25519),
        }
    }

    /// Primary (on-chain) public key.
    pub fn pubkey(&self) -> &SnPublicKey {
        &self.pubkey
    }

    /// Transport identity pubkey.
    pub fn x25519_pubkey(&self) -> &X25519PublicKey {
        &self.x25519_pubkey
    }

    /// Sign a 32-byte digest with the primary key.
    pub fn sign(&self, digest: &Hash) -> QuorumSignature {
        QuorumSignature(self.signing_key.sign(digest.as_bytes()).to_bytes())
    }
}

impl fmt::Debug for ServiceNodeKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceNodeKeys")
            .field("pubkey", &self.pubkey)
            .field("x25519_pubkey", &self.x25519_pubkey)
            .finish_non_exhaustive()
    }
}

/// Verify one signature over a 32-byte digest.
///
/// Returns `false` for malformed public keys as well as bad signatures.
pub fn verify_signature(digest: &Hash, pubkey: &SnPublicKey, sig: &QuorumSignature) -> bool {
    let Ok(vk) = VerifyingKey::from_bytes(pubkey.as_bytes()) else {
        return false;
    };
    let sig = ed25519_dalek::Signature::from_bytes(sig.as_bytes());
    vk.verify_strict(digest.as_bytes(), &sig).is_ok()
}

/// Batch-verify signatures over per-entry digests.
///
/// Returns one bool per entry. The all-valid case costs a single batch
/// verification; on failure it falls back to individual checks to identify
/// which entries failed.
pub fn batch_verify_signatures(
    digests: &[Hash],
    pubkeys: &[SnPublicKey],
    sigs: &[QuorumSignature],
) -> Vec<bool> {
    let n = digests.len();
    if pubkeys.len() != n || sigs.len() != n {
        return vec![false; n.max(pubkeys.len()).max(sigs.len())];
    }
    if n == 0 {
        return vec![];
    }

    let mut messages: Vec<&[u8]> = Vec::with_capacity(n);
    let mut dalek_sigs = Vec::with_capacity(n);
    let mut dalek_pks = Vec::with_capacity(n);
    let mut convertible = true;
    for ((digest, pk), sig) in digests.iter().zip(pubkeys).zip(sigs) {
        messages.push(digest.as_bytes());
        dalek_sigs.push(ed25519_dalek::Signature::from_bytes(sig.as_bytes()));
        match VerifyingKey::from_bytes(pk.as_bytes()) {
            Ok(vk) => dalek_pks.push(vk),
            Err(_) => {
                convertible = false;
                break;
            }
        }
    }

    // Fast path: all signatures valid in one batch operation.
    if convertible && ed25519_dalek::verify_batch(&messages, &dalek_sigs, &dalek_pks).is_ok() {
        return vec![true; n];
    }

    // Slow path: identify the failures individually.
    digests
        .iter()
        .zip(pubkeys)
        .zip(sigs)
        .map(|((digest, pk), sig)| verify_signature(digest, pk, sig))
        .collect()
}
