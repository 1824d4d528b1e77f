//! Network-side pulse coordination: validation, hand-off, and relay.

use crate::{PulseEvent, PulseQueue};
use blinknet_core::{InboundMessage, MessageSender, SendOptions, SnRegistry};
use blinknet_quorum::{plan_matrix_relay, plan_subset_relay, resolve_peers};
use blinknet_types::{QuorumType, ServiceNodeKeys, X25519PublicKey};
use blinknet_wire::PulseMessage;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Fan-out width for block templates, which originate at a single producer.
pub const PULSE_TEMPLATE_FANOUT: usize = 4;

/// Dedup key for at-most-once forwarding: message kind plus claimed
/// position (`None` for the producer's block template).
type SeenKey = (&'static str, Option<usize>);

struct RoundState {
    height: u64,
    round: u8,
    seen: HashSet<SeenKey>,
}

/// Pulse coordinator for a service node.
///
/// Validated messages are handed to the single-threaded pulse handler in
/// arrival order; each distinct (kind, position) is forwarded to quorum
/// peers at most once per round.
pub struct PulseCoordinator {
    keys: Arc<ServiceNodeKeys>,
    registry: Arc<dyn SnRegistry>,
    sender: Arc<dyn MessageSender>,
    queue: PulseQueue,
    state: Mutex<RoundState>,
}

impl PulseCoordinator {
    /// Create a coordinator; `queue` feeds the block-production handler.
    pub fn new(
        keys: Arc<ServiceNodeKeys>,
        registry: Arc<dyn SnRegistry>,
        sender: Arc<dyn MessageSender>,
        queue: PulseQueue,
    ) -> Self {
        Self {
            keys,
            registry,
            sender,
            queue,
            state: Mutex::new(RoundState {
                height: 0,
                round: 0,
                seen: HashSet::new(),
            }),
        }
    }

    /// Enter a new (height, round), clearing the forwarding dedup state.
    /// Called by the block-production loop at each round boundary.
    pub fn begin_round(&self, height: u64, round: u8) {
        let mut state = self.state.lock();
        debug!(height, round, "pulse round started");
        state.height = height;
        state.round = round;
        state.seen.clear();
    }

    /// Handle an inbound `pulse.*` message: validate, hand to the handler,
    /// and forward to quorum peers (first arrival only, sender excluded).
    pub fn handle_message(&self, msg: &InboundMessage) {
        let message = match PulseMessage::from_command(&msg.command, &msg.payload) {
            Some(Ok(m)) => m,
            Some(Err(e)) => {
                info!(command = %msg.command, error = %e, "ignoring malformed pulse message");
                return;
            }
            None => {
                trace!(command = %msg.command, "not a pulse message");
                return;
            }
        };

        let first_arrival = {
            let mut state = self.state.lock();
            state.seen.insert((message.command(), message.position()))
        };
        if !first_arrival {
            trace!(command = message.command(), "duplicate pulse message, not forwarding");
            return;
        }

        self.queue.enqueue(PulseEvent {
            from: msg.from_sn,
            message: message.clone(),
        });
        self.relay(&message, msg.from_sn.as_ref());
    }

    /// Relay a message this node originates (its own handshake, bitset,
    /// template, or entropy values).
    pub fn relay_own(&self, message: &PulseMessage) {
        {
            let mut state = self.state.lock();
            state.seen.insert((message.command(), message.position()));
        }
        self.relay(message, None);
    }

    fn relay(&self, message: &PulseMessage, exclude: Option<&X25519PublicKey>) {
        let (height, round) = {
            let state = self.state.lock();
            (state.height, state.round)
        };
        let Some(quorum) = self.registry.get_quorum(QuorumType::Pulse, height) else {
            warn!(height, round, "no pulse quorum for relay");
            return;
        };
        trace!(height, round, command = message.command(), "relaying pulse message");

        let payload = message.to_dict();

        if matches!(message, PulseMessage::BlockTemplate { .. }) {
            // Templates start from one producer; a small subset fan-out
            // reaches the quorum without a connection storm.
            let mut remotes = resolve_peers(self.registry.as_ref(), &quorum.validators);
            remotes.retain(|_, peer| peer.x25519_pubkey != *self.keys.x25519_pubkey());
            for peer in plan_subset_relay(&remotes, PULSE_TEMPLATE_FANOUT) {
                if exclude == Some(&peer.x25519_pubkey) {
                    continue;
                }
                self.sender.send(
                    &peer.x25519_pubkey,
                    message.command(),
                    payload.clone(),
                    SendOptions::hint(peer.address.clone()),
                );
            }
            return;
        }

        // All other phases travel the connection matrix. The agreed bitset
        // additionally goes to the quorum's workers, so non-validators
        // observe the consensus progressing.
        let include_workers = matches!(message, PulseMessage::HandshakeBitset { .. });
        let mut candidates = quorum.validators.clone();
        if include_workers {
            candidates.extend(quorum.workers.iter().copied());
        }
        let remotes = resolve_peers(self.registry.as_ref(), &candidates);

        let my_position = quorum.position_of(self.keys.pubkey());
        let quorums = [quorum.clone()];
        let plan = plan_matrix_relay(&quorums, &[my_position], &remotes, exclude);
        for (x25519, options) in plan.destinations() {
            self.sender
                .send(x25519, message.command(), payload.clone(), options);
        }

        if include_workers {
            for worker in &quorum.workers {
                let Some(peer) = remotes.get(worker) else {
                    continue;
                };
                if exclude == Some(&peer.x25519_pubkey) {
                    continue;
                }
                if plan.get(&peer.x25519_pubkey).is_some() {
                    continue;
                }
                self.sender.send(
                    &peer.x25519_pubkey,
                    message.command(),
                    payload.clone(),
                    SendOptions::hint(peer.address.clone()),
                );
            }
        }
    }
}
