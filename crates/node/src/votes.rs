//! Point-to-point relay of service-node obligation votes.

use blinknet_core::{ChainView, InboundMessage, MessageSender, SnRegistry, VotePool};
use blinknet_quorum::{plan_matrix_relay, resolve_peers};
use blinknet_types::{min_votes_for_quorum_type, ObligationVote, ServiceNodeKeys};
use blinknet_wire::{commands, vote_from_dict, vote_to_dict};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Relays misbehaviour votes between quorum members and feeds inbound votes
/// to the vote subsystem (which owns verification and deduplication).
pub struct VoteRelay {
    keys: Arc<ServiceNodeKeys>,
    chain: Arc<dyn ChainView>,
    registry: Arc<dyn SnRegistry>,
    pool: Arc<dyn VotePool>,
    sender: Arc<dyn MessageSender>,
}

impl VoteRelay {
    /// Create a vote relay around the node's collaborators.
    pub fn new(
        keys: Arc<ServiceNodeKeys>,
        chain: Arc<dyn ChainView>,
        registry: Arc<dyn SnRegistry>,
        pool: Arc<dyn VotePool>,
        sender: Arc<dyn MessageSender>,
    ) -> Self {
        Self {
            keys,
            chain,
            registry,
            pool,
            sender,
        }
    }

    /// Relay a batch of votes this node cast (or just accepted) to its
    /// quorum peers.
    ///
    /// Each vote's quorum must exist, hold at least the minimum validators
    /// for its type, and include this node; votes failing any guard are
    /// skipped with a log.
    pub fn relay_votes(&self, votes: &[ObligationVote]) {
        let mut relayed = 0usize;
        for vote in votes {
            let Some(quorum) = self.registry.get_quorum(vote.vote_type, vote.height) else {
                warn!(
                    quorum_type = %vote.vote_type,
                    height = vote.height,
                    "unable to relay vote: no quorum at this height"
                );
                continue;
            };
            let min_votes = min_votes_for_quorum_type(vote.vote_type);
            if quorum.validators.len() < min_votes {
                warn!(
                    quorum_type = %vote.vote_type,
                    height = vote.height,
                    validators = quorum.validators.len(),
                    min_votes,
                    "unable to relay vote: quorum too small to reach the required votes"
                );
                continue;
            }
            let Some(my_position) = quorum.position_of(self.keys.pubkey()) else {
                warn!(
                    quorum_type = %vote.vote_type,
                    height = vote.height,
                    "unable to relay vote: this service node is not in the quorum"
                );
                continue;
            };

            let remotes = resolve_peers(self.registry.as_ref(), &quorum.validators);
            let quorums = [quorum.clone()];
            let plan = plan_matrix_relay(&quorums, &[Some(my_position)], &remotes, None);
            let payload = vote_to_dict(vote);
            for (x25519, options) in plan.destinations() {
                self.sender
                    .send(x25519, commands::VOTE_OB, payload.clone(), options);
            }
            relayed += 1;
        }
        debug!(relayed, total = votes.len(), "relayed obligation votes");
    }

    /// Handle a `quorum.vote_ob` from a peer: deserialize, bound by the tip,
    /// hand to the vote pool, and re-relay anything the pool reports as new
    /// so it reaches peers outside the sender's fan-out.
    pub fn handle_vote(&self, msg: &InboundMessage) {
        let vote = match vote_from_dict(&msg.payload) {
            Ok(v) => v,
            Err(e) => {
                info!(error = %e, "ignoring malformed obligation vote");
                return;
            }
        };

        if vote.height > self.chain.tip_height() {
            debug!(
                height = vote.height,
                tip = self.chain.tip_height(),
                "ignoring vote from the future"
            );
            return;
        }

        let outcome = self.pool.handle_vote(&vote);
        if outcome.verification_failed {
            warn!(
                quorum_type = %vote.vote_type,
                height = vote.height,
                "vote verification failed; ignoring vote"
            );
            return;
        }
        if outcome.added_to_pool {
            self.relay_votes(std::slice::from_ref(&vote));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blinknet_core::testing::{RecordingSender, TestChain, TestRegistry, TestVotePool};
    use blinknet_core::{ConnectionId, SnProof, VoteOutcome};
    use blinknet_types::{
        NodeStateChange, Quorum, QuorumSignature, QuorumType, SoftwareVersion, VoteGroup,
        VotePayload,
    };
    use std::net::Ipv4Addr;

    const TIP: u64 = 700;
    const VOTE_HEIGHT: u64 = 690;

    struct TestBed {
        sender: Arc<RecordingSender>,
        pool: Arc<TestVotePool>,
        relay: VoteRelay,
    }

    fn vote() -> ObligationVote {
        ObligationVote {
            version: 0,
            vote_type: QuorumType::Obligations,
            height: VOTE_HEIGHT,
            group: VoteGroup::Validator,
            index_in_group: 0,
            signature: QuorumSignature([4u8; 64]),
            payload: VotePayload::StateChange {
                worker_index: 1,
                state: NodeStateChange::Decommission,
            },
        }
    }

    fn testbed(member: bool, quorum_size: usize) -> TestBed {
        let validators: Vec<Arc<ServiceNodeKeys>> = (0..quorum_size)
            .map(|i| {
                let mut seed = [0u8; 32];
                seed[0] = i as u8;
                seed[1] = 0x77;
                Arc::new(ServiceNodeKeys::from_seed(&seed))
            })
            .collect();
        let registry = Arc::new(TestRegistry::new());
        registry.put_quorum(
            QuorumType::Obligations,
            VOTE_HEIGHT,
            Quorum {
                validators: validators.iter().map(|k| *k.pubkey()).collect(),
                workers: vec![],
            },
        );
        for (i, keys) in validators.iter().enumerate() {
            registry.put_proof(
                *keys.pubkey(),
                SnProof {
                    active: true,
                    x25519_pubkey: Some(*keys.x25519_pubkey()),
                    public_ip: Some(Ipv4Addr::new(10, 4, 0, i as u8)),
                    quorumnet_port: 14000 + i as u16,
                    version: SoftwareVersion::new(11, 3, 0),
                },
            );
        }

        let my_keys = if member {
            validators[0].clone()
        } else {
            Arc::new(ServiceNodeKeys::from_seed(&[0xDD; 32]))
        };
        let sender = Arc::new(RecordingSender::new());
        let pool = Arc::new(TestVotePool::adding());
        let relay = VoteRelay::new(
            my_keys,
            Arc::new(TestChain::at_height(TIP)),
            registry,
            pool.clone(),
            sender.clone(),
        );
        TestBed {
            sender,
            pool,
            relay,
        }
    }

    fn inbound(vote: &ObligationVote) -> InboundMessage {
        InboundMessage {
            conn: ConnectionId(3),
            from_sn: Some(blinknet_types::X25519PublicKey::from_bytes([9u8; 32])),
            command: commands::VOTE_OB.to_string(),
            payload: vote_to_dict(vote),
        }
    }

    #[test]
    fn test_relay_votes_to_quorum_peers() {
        let bed = testbed(true, 10);
        bed.relay.relay_votes(&[vote()]);
        let sent = bed.sender.sent.lock();
        assert!(!sent.is_empty());
        assert!(sent.iter().all(|m| m.command == commands::VOTE_OB));
        // Strong edges carry connect hints.
        assert!(sent.iter().any(|m| m.options.hint.is_some()));
    }

    #[test]
    fn test_relay_skipped_when_not_a_member() {
        let bed = testbed(false, 10);
        bed.relay.relay_votes(&[vote()]);
        assert!(bed.sender.sent.lock().is_empty());
    }

    #[test]
    fn test_relay_skipped_when_quorum_too_small() {
        let bed = testbed(true, 5);
        bed.relay.relay_votes(&[vote()]);
        assert!(bed.sender.sent.lock().is_empty());
    }

    #[test]
    fn test_inbound_vote_added_and_rerelayed() {
        let bed = testbed(true, 10);
        bed.relay.handle_vote(&inbound(&vote()));
        assert_eq!(bed.pool.received.lock().len(), 1);
        assert!(!bed.sender.sent.lock().is_empty());
    }

    #[test]
    fn test_inbound_duplicate_not_rerelayed() {
        let bed = testbed(true, 10);
        *bed.pool.outcome.lock() = VoteOutcome {
            verification_failed: false,
            added_to_pool: false,
        };
        bed.relay.handle_vote(&inbound(&vote()));
        assert_eq!(bed.pool.received.lock().len(), 1);
        assert!(bed.sender.sent.lock().is_empty());
    }

    #[test]
    fn test_inbound_future_vote_dropped() {
        let bed = testbed(true, 10);
        let mut future_vote = vote();
        future_vote.height = TIP + 1;
        bed.relay.handle_vote(&inbound(&future_vote));
        assert!(bed.pool.received.lock().is_empty());
    }

    #[test]
    fn test_inbound_failed_verification_not_rerelayed() {
        let bed = testbed(true, 10);
        *bed.pool.outcome.lock() = VoteOutcome {
            verification_failed: true,
            added_to_pool: false,
        };
        bed.relay.handle_vote(&inbound(&vote()));
        assert!(bed.sender.sent.lock().is_empty());
    }
}
