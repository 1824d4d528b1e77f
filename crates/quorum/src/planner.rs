//! Relay fan-out planning.
//!
//! Two modes, per the two ways a node participates:
//!
//! - **Matrix fan-out** for quorum members: deterministic strong edges from
//!   the connection matrix plus opportunistic edges to incoming sources, and
//!   strong inter-quorum edges stitching `Q` to `Q'`.
//! - **Subset fan-out** for originators and block producers: a few
//!   destinations sampled from the whole quorum, biased to newer software.

use crate::{quorum_incoming_conns, quorum_outgoing_conns, Peer};
use blinknet_core::SendOptions;
use blinknet_types::{Quorum, SnPublicKey, X25519PublicKey};
use rand::seq::SliceRandom;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, trace};

/// One planned relay destination.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlannedPeer {
    /// Connect address; always present for strong peers.
    pub address: Option<String>,
    /// Strong peers are dialled if not connected; opportunistic peers are
    /// only reached over existing connections.
    pub strong: bool,
}

/// The set of destinations for one relay pass.
///
/// A peer appearing through both a strong and an opportunistic edge is
/// upgraded to strong exactly once; `strong_peers` counts each distinct
/// strong destination a single time.
#[derive(Debug, Default)]
pub struct RelayPlan {
    peers: HashMap<X25519PublicKey, PlannedPeer>,
    /// Number of distinct strong destinations.
    pub strong_peers: usize,
}

impl RelayPlan {
    /// Add a strong destination, upgrading an existing opportunistic edge.
    fn add_strong(&mut self, peer: &Peer) {
        let entry = self
            .peers
            .entry(peer.x25519_pubkey)
            .or_insert(PlannedPeer {
                address: None,
                strong: false,
            });
        if !entry.strong {
            entry.strong = true;
            entry.address = Some(peer.address.clone());
            self.strong_peers += 1;
        }
    }

    /// Add an opportunistic destination unless the peer is already planned.
    fn add_opportunistic(&mut self, peer: &Peer) {
        self.peers.entry(peer.x25519_pubkey).or_insert(PlannedPeer {
            address: None,
            strong: false,
        });
    }

    /// Iterate destinations with the transport options each should use.
    pub fn destinations(&self) -> impl Iterator<Item = (&X25519PublicKey, SendOptions)> {
        self.peers.iter().map(|(x25519, planned)| {
            let options = if planned.strong {
                SendOptions::hint(planned.address.clone().expect("strong peer has address"))
            } else {
                SendOptions::optional()
            };
            (x25519, options)
        })
    }

    /// Look up a planned peer (test support).
    pub fn get(&self, x25519: &X25519PublicKey) -> Option<&PlannedPeer> {
        self.peers.get(x25519)
    }

    /// Number of planned destinations of either strength.
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// True when nothing is planned.
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

/// Plan a matrix fan-out across the quorums this node belongs to.
///
/// `my_positions` runs parallel to `quorums`; `remotes` is the resolved peer
/// map (unresolved validators are skipped with a log); `exclude` removes the
/// peer a message was just received from so it does not bounce straight
/// back.
pub fn plan_matrix_relay(
    quorums: &[Arc<Quorum>],
    my_positions: &[Option<usize>],
    remotes: &HashMap<SnPublicKey, Peer>,
    exclude: Option<&X25519PublicKey>,
) -> RelayPlan {
    debug_assert_eq!(quorums.len(), my_positions.len());
    let mut plan = RelayPlan::default();

    let mut add = |plan: &mut RelayPlan, target: &SnPublicKey, strong: bool| {
        let Some(peer) = remotes.get(target) else {
            info!(
                peer = %target,
                "unable to relay to quorum peer: inactive or missing x25519 pubkey, ip, or port"
            );
            return;
        };
        if exclude == Some(&peer.x25519_pubkey) {
            return;
        }
        if strong {
            plan.add_strong(peer);
        } else {
            plan.add_opportunistic(peer);
        }
    };

    for (qi, (quorum, position)) in quorums.iter().zip(my_positions).enumerate() {
        let Some(pos) = *position else { continue };
        let size = quorum.validators.len();

        // Strong edges to my outgoing targets within the quorum.
        for j in quorum_outgoing_conns(pos, size) {
            trace!(target = %quorum.validators[j], "intra-quorum relay");
            add(&mut plan, &quorum.validators[j], true);
        }

        // Opportunistic edges to my incoming sources, over existing
        // connections only.
        for j in quorum_incoming_conns(pos, size) {
            trace!(target = %quorum.validators[j], "intra-quorum opportunistic relay");
            add(&mut plan, &quorum.validators[j], false);
        }

        // Upper half of this quorum bridges to the lower half of the next
        // one, skipped when this node sits in both (it already relays into
        // the next quorum directly). "Half" is half the smaller quorum, so
        // an odd size leaves the last position unbridged.
        if qi + 1 < quorums.len() && my_positions[qi + 1].is_none() {
            let next = &quorums[qi + 1];
            let half = size.min(next.validators.len()) / 2;
            if (half..2 * half).contains(&pos) {
                trace!(target = %next.validators[pos - half], "inter-quorum relay to next");
                add(&mut plan, &next.validators[pos - half], true);
            }
        }

        // And the mirror image: lower half of this quorum bridges back to
        // the upper half of the previous one.
        if qi > 0 && my_positions[qi - 1].is_none() {
            let prev = &quorums[qi - 1];
            let half = size.min(prev.validators.len()) / 2;
            if pos < half {
                trace!(target = %prev.validators[pos + half], "inter-quorum relay to previous");
                add(&mut plan, &prev.validators[pos + half], true);
            }
        }
    }

    debug!(
        strong = plan.strong_peers,
        total = plan.len(),
        "planned matrix relay"
    );
    plan
}

/// Plan a subset fan-out: up to `count` resolved peers, preferring newer
/// software versions (shuffle first so ties are load-balanced, then a stable
/// sort by descending version).
pub fn plan_subset_relay(remotes: &HashMap<SnPublicKey, Peer>, count: usize) -> Vec<Peer> {
    let mut peers: Vec<Peer> = remotes.values().cloned().collect();
    peers.shuffle(&mut rand::thread_rng());
    peers.sort_by(|a, b| b.version.cmp(&a.version));
    peers.truncate(count);
    peers
}
