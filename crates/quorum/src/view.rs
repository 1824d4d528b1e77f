//! Assembly of the blink quorum pair at an authorization height.

use crate::QuorumError;
use blinknet_core::SnRegistry;
use blinknet_types::{
    quorum_checksum, BlinkTx, Quorum, QuorumType, SnPublicKey, Subquorum, BLINK_MIN_VOTES,
    BLINK_SUBQUORUM_SIZE, NUM_BLINK_QUORUMS,
};
use std::sync::Arc;

/// The two blink subquorums for one authorization height, with the locally
/// computed membership checksum.
///
/// All honest nodes at the same tip derive an identical view, which is what
/// makes the checksum a cheap self-check between peers.
#[derive(Clone, Debug)]
pub struct BlinkQuorumView {
    /// Blink authorization height the view was derived for.
    pub blink_height: u64,
    /// The subquorums, indexed by [`Subquorum::index`].
    pub quorums: [Arc<Quorum>; NUM_BLINK_QUORUMS],
    /// Aggregate membership checksum over both subquorums.
    pub checksum: u64,
}

impl BlinkQuorumView {
    /// Derive the quorum pair for `blink_height` from the registry.
    ///
    /// Fails if the chain is too young for a lagged quorum, if the registry
    /// cannot produce a quorum at a derived height, or if either subquorum
    /// is outside `[BLINK_MIN_VOTES, BLINK_SUBQUORUM_SIZE]`.
    pub fn assemble(
        blink_height: u64,
        registry: &dyn SnRegistry,
    ) -> Result<Self, QuorumError> {
        let fetch = |subquorum: Subquorum| -> Result<Arc<Quorum>, QuorumError> {
            let height = BlinkTx::quorum_height(blink_height, subquorum)
                .ok_or(QuorumError::TooEarly)?;
            let quorum = registry.get_quorum(QuorumType::Blink, height).ok_or(
                QuorumError::NoQuorum {
                    quorum_type: QuorumType::Blink,
                    height,
                },
            )?;
            let size = quorum.validators.len();
            if !(BLINK_MIN_VOTES..=BLINK_SUBQUORUM_SIZE).contains(&size) {
                return Err(QuorumError::BadQuorumSize { size });
            }
            Ok(quorum)
        };
        let quorums = [fetch(Subquorum::Base)?, fetch(Subquorum::Future)?];

        // Each subquorum contributes at an offset of its index times the
        // maximum subquorum size, so swapped quorums do not cancel out.
        let checksum = quorums.iter().enumerate().fold(0u64, |sum, (qi, quorum)| {
            sum.wrapping_add(quorum_checksum(
                &quorum.validators,
                qi * BLINK_SUBQUORUM_SIZE,
            ))
        });

        Ok(Self {
            blink_height,
            quorums,
            checksum,
        })
    }

    /// Check a checksum received from a peer against the local view.
    pub fn verify_checksum(&self, received: u64) -> Result<(), QuorumError> {
        if received != self.checksum {
            return Err(QuorumError::ChecksumMismatch {
                local: self.checksum,
                received,
            });
        }
        Ok(())
    }

    /// This node's position in each subquorum (`None` where absent).
    pub fn positions_of(&self, pubkey: &SnPublicKey) -> [Option<usize>; NUM_BLINK_QUORUMS] {
        [
            self.quorums[0].position_of(pubkey),
            self.quorums[1].position_of(pubkey),
        ]
    }

    /// True if the pubkey sits in at least one subquorum.
    pub fn is_member(&self, pubkey: &SnPublicKey) -> bool {
        self.positions_of(pubkey).iter().any(Option::is_some)
    }

    /// Validator counts of the subquorums.
    pub fn sizes(&self) -> [usize; NUM_BLINK_QUORUMS] {
        [
            self.quorums[0].validators.len(),
            self.quorums[1].validators.len(),
        ]
    }

    /// All distinct validators across both subquorums.
    pub fn all_validators(&self) -> Vec<SnPublicKey> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for quorum in &self.quorums {
            for validator in &quorum.validators {
                if seen.insert(*validator) {
                    out.push(*validator);
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blinknet_core::testing::TestRegistry;
    use blinknet_types::ServiceNodeKeys;

    fn keys(n: usize) -> Vec<ServiceNodeKeys> {
        (0..n)
            .map(|i| {
                let mut seed = [0u8; 32];
                seed[0] = i as u8;
                seed[1] = 0xAB;
                ServiceNodeKeys::from_seed(&seed)
            })
            .collect()
    }

    fn install_quorums(registry: &TestRegistry, blink_height: u64, sizes: [usize; 2]) -> Vec<ServiceNodeKeys> {
        let all = keys(sizes[0] + sizes[1]);
        let (base, future) = all.split_at(sizes[0]);
        let base_height = BlinkTx::quorum_height(blink_height, Subquorum::Base).unwrap();
        let future_height = BlinkTx::quorum_height(blink_height, Subquorum::Future).unwrap();
        registry.put_quorum(
            QuorumType::Blink,
            base_height,
            Quorum {
                validators: base.iter().map(|k| *k.pubkey()).collect(),
                workers: vec![],
            },
        );
        registry.put_quorum(
            QuorumType::Blink,
            future_height,
            Quorum {
                validators: future.iter().map(|k| *k.pubkey()).collect(),
                workers: vec![],
            },
        );
        all
    }

    #[test]
    fn test_assemble_and_checksum_agree_across_nodes() {
        let registry = TestRegistry::new();
        install_quorums(&registry, 1000, [10, 10]);

        let a = BlinkQuorumView::assemble(1000, &registry).unwrap();
        let b = BlinkQuorumView::assemble(1000, &registry).unwrap();
        assert_eq!(a.checksum, b.checksum);
        assert!(a.verify_checksum(b.checksum).is_ok());
        assert!(matches!(
            a.verify_checksum(b.checksum.wrapping_add(1)),
            Err(QuorumError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_assemble_too_early() {
        let registry = TestRegistry::new();
        assert_eq!(
            BlinkQuorumView::assemble(30, &registry).unwrap_err(),
            QuorumError::TooEarly
        );
    }

    #[test]
    fn test_assemble_missing_quorum() {
        let registry = TestRegistry::new();
        assert!(matches!(
            BlinkQuorumView::assemble(1000, &registry).unwrap_err(),
            QuorumError::NoQuorum { .. }
        ));
    }

    #[test]
    fn test_assemble_rejects_small_quorum() {
        let registry = TestRegistry::new();
        // One fewer validator than BLINK_MIN_VOTES in the base quorum.
        install_quorums(&registry, 1000, [BLINK_MIN_VOTES - 1, 10]);
        assert_eq!(
            BlinkQuorumView::assemble(1000, &registry).unwrap_err(),
            QuorumError::BadQuorumSize {
                size: BLINK_MIN_VOTES - 1
            }
        );
    }

    #[test]
    fn test_assemble_accepts_minimum_quorum() {
        let registry = TestRegistry::new();
        install_quorums(&registry, 1000, [BLINK_MIN_VOTES, BLINK_MIN_VOTES]);
        let view = BlinkQuorumView::assemble(1000, &registry).unwrap();
        assert_eq!(view.sizes(), [BLINK_MIN_VOTES, BLINK_MIN_VOTES]);
    }

    #[test]
    fn test_membership_lookup() {
        let registry = TestRegistry::new();
        let all = install_quorums(&registry, 1000, [10, 10]);
        let view = BlinkQuorumView::assemble(1000, &registry).unwrap();

        assert_eq!(view.positions_of(all[3].pubkey()), [Some(3), None]);
        assert_eq!(view.positions_of(all[13].pubkey()), [None, Some(3)]);
        assert!(view.is_member(all[0].pubkey()));
        assert!(!view.is_member(ServiceNodeKeys::from_seed(&[0xFF; 32]).pubkey()));
        assert_eq!(view.all_validators().len(), 20);
    }
}
