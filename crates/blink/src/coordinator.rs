//! Quorum-member side of blink: submission intake, pre-distribution,
//! signing, and signature aggregation.

use crate::entry::{BlinkEntry, PendingSignature};
use crate::{BlinkConfig, BlinkError};
use blinknet_core::{
    BlinkTxPool, ChainView, ConnectionId, InboundMessage, MessageSender, SnRegistry, TxError,
};
use blinknet_quorum::{plan_matrix_relay, resolve_peers, BlinkQuorumView, QuorumError};
use blinknet_types::{
    batch_verify_signatures, blink_signing_hash, verify_signature, BlinkTx, Hash,
    ServiceNodeKeys, SnPublicKey, Subquorum, X25519PublicKey, BLINK_HEIGHT_TOLERANCE,
    HF_VERSION_BLINK,
};
use blinknet_wire::{commands, BlinkSignBundle, BlinkSignatureEntry, BlinkSubmission};
use blinknet_wire::{DecisionReply, NostartReply, WireValue};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Blink coordinator state for a service node.
///
/// Multi-threaded: the transport's worker pool calls the `handle_*` methods
/// concurrently. The submission cache is guarded by one mutex; each cached
/// [`BlinkTx`] has its own reader/writer lock so the narrow "insert
/// signatures and detect the decision" window is the only exclusive section.
pub struct BlinkCoordinator {
    keys: Arc<ServiceNodeKeys>,
    chain: Arc<dyn ChainView>,
    registry: Arc<dyn SnRegistry>,
    pool: Arc<dyn BlinkTxPool>,
    sender: Arc<dyn MessageSender>,
    config: BlinkConfig,
    /// `height → {txhash → entry}`.
    blinks: Mutex<BTreeMap<u64, HashMap<Hash, BlinkEntry>>>,
}

impl BlinkCoordinator {
    /// Create a coordinator around the node's collaborators.
    pub fn new(
        keys: Arc<ServiceNodeKeys>,
        chain: Arc<dyn ChainView>,
        registry: Arc<dyn SnRegistry>,
        pool: Arc<dyn BlinkTxPool>,
        sender: Arc<dyn MessageSender>,
        config: BlinkConfig,
    ) -> Self {
        Self {
            keys,
            chain,
            registry,
            pool,
            sender,
            config,
            blinks: Mutex::new(BTreeMap::new()),
        }
    }

    /// Handle a `blink.submit` from an external originator or a quorum-member
    /// forward.
    ///
    /// Everything that stops processing before quorum distribution surfaces
    /// from the precondition ladder as a [`BlinkError`], converted into the
    /// `bl.nostart` reply at this single point.
    pub fn handle_submission(&self, msg: &InboundMessage) {
        self.evict_expired();

        // The tag is pulled out up front so even a malformed submission can
        // be answered when the sender expects replies.
        let tag = msg
            .payload
            .get("!")
            .and_then(WireValue::as_int)
            .unwrap_or(0);

        if let Err(e) = self.start_submission(msg, tag) {
            info!(error = %e, "rejecting blink submission");
            self.send_nostart(msg.conn, tag, &e.to_string());
        }
    }

    /// The submission precondition ladder (in protocol order), tx intake,
    /// pre-distribution, and the local verdict.
    fn start_submission(&self, msg: &InboundMessage, tag: u64) -> Result<(), BlinkError> {
        let submission =
            BlinkSubmission::from_dict(&msg.payload).map_err(BlinkError::Malformed)?;

        if self.chain.hf_version() < HF_VERSION_BLINK {
            return Err(BlinkError::NotEnabled);
        }

        let tip = self.chain.tip_height();
        if submission.height + BLINK_HEIGHT_TOLERANCE < tip
            || submission.height > tip + BLINK_HEIGHT_TOLERANCE
        {
            return Err(BlinkError::BadHeight {
                height: submission.height,
                tip,
            });
        }

        // Short-circuit on the precomputed hash before touching the tx body:
        // a forwarded submission we have already processed is a no-op, and a
        // decided one gets its verdict replayed to the new originator. An
        // entry holding only detached signatures falls through to full
        // processing.
        let mut replay_decision = None;
        let mut already_in_flight = false;
        {
            let mut blinks = self.blinks.lock();
            if let Some(entry) = blinks
                .get_mut(&submission.height)
                .and_then(|m| m.get_mut(&submission.txhash))
            {
                match &entry.btx {
                    Some(btx) => {
                        let (approved, rejected) = {
                            let btx = btx.read();
                            (btx.approved(), btx.rejected())
                        };
                        if approved || rejected {
                            replay_decision = Some(approved);
                        } else {
                            entry.stash_reply(msg.conn, tag);
                            already_in_flight = true;
                        }
                    }
                    None => entry.stash_reply(msg.conn, tag),
                }
            }
        }
        if let Some(approved) = replay_decision {
            debug!(txhash = %submission.txhash, "replaying decision for known blink tx");
            self.send_decision(msg.conn, tag, approved);
            return Ok(());
        }
        if already_in_flight {
            trace!(txhash = %submission.txhash, "already processing this blink tx");
            return Ok(());
        }

        let view = BlinkQuorumView::assemble(submission.height, self.registry.as_ref())
            .map_err(BlinkError::Quorum)?;
        view.verify_checksum(submission.checksum)
            .map_err(BlinkError::WrongChecksum)?;

        let my_positions = view.positions_of(self.keys.pubkey());
        if my_positions.iter().all(Option::is_none) {
            return Err(BlinkError::Quorum(QuorumError::NotAMember {
                quorum_type: blinknet_types::QuorumType::Blink,
            }));
        }

        let parsed_hash = self
            .pool
            .parse_tx(&submission.tx_blob)
            .map_err(|_| BlinkError::TxParse)?;
        if parsed_hash != submission.txhash {
            return Err(BlinkError::TxHashMismatch);
        }

        // Insert the blink tx, re-checking for a concurrent winner: two
        // near-simultaneous forwards of the same tx must not both relay.
        let stashed_sigs = {
            let mut blinks = self.blinks.lock();
            let entry = blinks
                .entry(submission.height)
                .or_default()
                .entry(submission.txhash)
                .or_default();
            if entry.btx.is_some() {
                trace!(txhash = %submission.txhash, "lost submission race, ignoring");
                entry.stash_reply(msg.conn, tag);
                return Ok(());
            }
            entry.btx = Some(Arc::new(RwLock::new(BlinkTx::new(
                submission.height,
                submission.txhash,
                submission.tx_blob.clone(),
                view.sizes(),
            ))));
            entry.stash_reply(msg.conn, tag);
            entry.pending_sigs.drain().collect::<Vec<_>>()
        };

        // Pre-distribute before verifying the tx: every quorum member must
        // verify from its own view anyway, and a verification failure here
        // must not stop peers from reaching their own verdict.
        let remotes = resolve_peers(self.registry.as_ref(), &view.all_validators());
        let plan = plan_matrix_relay(&view.quorums, &my_positions, &remotes, None);
        if plan.strong_peers == 0 {
            return Err(BlinkError::NoReachablePeers);
        }
        let forward = BlinkSubmission {
            tag: 0,
            ..submission.clone()
        }
        .to_dict();
        for (x25519, options) in plan.destinations() {
            self.sender
                .send(x25519, commands::BLINK_SUBMIT, forward.clone(), options);
        }
        debug!(
            txhash = %submission.txhash,
            strong = plan.strong_peers,
            "pre-distributed blink tx to quorum peers"
        );

        // Local verdict. A pool rejection is a successful quorum outcome
        // (signed as a rejection); only transient internal failures are
        // dropped, leaving this slot for peers to fill.
        let approved = match self.pool.try_accept_blink(
            submission.height,
            &submission.txhash,
            &submission.tx_blob,
        ) {
            Ok(accepted) => accepted,
            Err(TxError::Internal(e)) => {
                warn!(error = %e, "dropping blink verdict: tx pool unavailable");
                return Ok(());
            }
            Err(e) => {
                info!(error = %e, "signing blink rejection: tx failed verification");
                false
            }
        };

        let digest = blink_signing_hash(submission.height, &submission.txhash, approved);
        let own_signature = self.keys.sign(&digest);
        let mut sigs: Vec<PendingSignature> = my_positions
            .iter()
            .enumerate()
            .filter_map(|(qi, pos)| {
                pos.map(|position| PendingSignature {
                    approved,
                    subquorum: qi as u8,
                    position: position as u8,
                    signature: own_signature,
                })
            })
            .collect();
        sigs.extend(stashed_sigs);

        self.process_signatures(submission.height, submission.txhash, &view, sigs, None);
        Ok(())
    }

    /// Handle a `quorum.blink_sign` signature bundle from a quorum peer.
    pub fn handle_signatures(&self, msg: &InboundMessage) {
        let bundle = match BlinkSignBundle::from_dict(&msg.payload) {
            Ok(b) => b,
            Err(e) => {
                info!(error = %e, "ignoring blink signature bundle: malformed payload");
                return;
            }
        };

        let view = match BlinkQuorumView::assemble(bundle.height, self.registry.as_ref()) {
            Ok(view) => view,
            Err(e) => {
                info!(height = bundle.height, error = %e, "ignoring blink signature bundle");
                return;
            }
        };
        if let Err(e) = view.verify_checksum(bundle.checksum) {
            info!(error = %e, "ignoring blink signature bundle");
            return;
        }

        let sigs: Vec<PendingSignature> = bundle
            .entries
            .iter()
            .map(|e| PendingSignature {
                approved: e.approved,
                subquorum: e.subquorum,
                position: e.position,
                signature: e.signature,
            })
            .collect();

        let have_btx = {
            let blinks = self.blinks.lock();
            blinks
                .get(&bundle.height)
                .and_then(|m| m.get(&bundle.txhash))
                .is_some_and(|entry| entry.btx.is_some())
        };

        if have_btx {
            self.process_signatures(bundle.height, bundle.txhash, &view, sigs, msg.from_sn);
        } else {
            self.stash_detached_signatures(bundle.height, bundle.txhash, &view, sigs);
        }
    }

    /// Hold signatures that outran their tx body, verifying them first so a
    /// peer cannot grow the cache with junk.
    fn stash_detached_signatures(
        &self,
        height: u64,
        txhash: Hash,
        view: &BlinkQuorumView,
        sigs: Vec<PendingSignature>,
    ) {
        let survivors: Vec<PendingSignature> = sigs
            .into_iter()
            .filter(|sig| {
                let quorum = &view.quorums[sig.subquorum as usize];
                let Some(pubkey) = quorum.validators.get(sig.position as usize) else {
                    trace!(position = sig.position, "dropping signature for missing position");
                    return false;
                };
                let digest = blink_signing_hash(height, &txhash, sig.approved);
                if !verify_signature(&digest, pubkey, &sig.signature) {
                    info!(signer = %pubkey, "dropping invalid detached blink signature");
                    return false;
                }
                true
            })
            .collect();
        if survivors.is_empty() {
            return;
        }

        let mut blinks = self.blinks.lock();
        let entry = blinks.entry(height).or_default().entry(txhash).or_default();
        let before = entry.pending_sigs.len();
        entry.pending_sigs.extend(survivors);
        let added = entry.pending_sigs.len() - before;
        if entry.btx.is_some() {
            // The tx body arrived while we were verifying; sweep the pending
            // set through the normal path right away, since nothing else
            // will.
            let drained: Vec<PendingSignature> = entry.pending_sigs.drain().collect();
            drop(blinks);
            self.process_signatures(height, txhash, view, drained, None);
            return;
        }
        debug!(txhash = %txhash, added, "stashed detached blink signatures");
    }

    /// Record verified signatures, detect the decision transition, and relay
    /// whatever is new.
    fn process_signatures(
        &self,
        height: u64,
        txhash: Hash,
        view: &BlinkQuorumView,
        sigs: Vec<PendingSignature>,
        received_from: Option<X25519PublicKey>,
    ) {
        let Some(btx) = ({
            let blinks = self.blinks.lock();
            blinks
                .get(&height)
                .and_then(|m| m.get(&txhash))
                .and_then(|entry| entry.btx.clone())
        }) else {
            warn!(txhash = %txhash, "no blink tx for signature processing");
            return;
        };

        // Shared-lock prefilter: drop signatures for filled or out-of-range
        // slots (and everything, once the tx is already decided).
        let candidates: Vec<PendingSignature> = {
            let btx = btx.read();
            if btx.approved() || btx.rejected() {
                return;
            }
            sigs.into_iter()
                .filter(|sig| {
                    Subquorum::from_index(sig.subquorum as usize)
                        .map(|sq| !btx.slot_filled(sq, sig.position as usize))
                        .unwrap_or(false)
                })
                .collect()
        };
        if candidates.is_empty() {
            return;
        }

        // Pubkey verification without any lock held; this is the CPU-heavy
        // part.
        let verified = self.verify_candidates(height, &txhash, view, candidates);
        if verified.is_empty() {
            return;
        }

        // Exclusive window: insert and watch for the decision transition.
        // add_prechecked_signature is idempotent, so a concurrent second
        // writer simply sees its insert refused, and exactly one thread
        // observes the flip.
        let (added, became_approved, became_rejected) = {
            let mut btx = btx.write();
            let was_decided = btx.approved() || btx.rejected();
            let mut added = Vec::new();
            for sig in verified {
                let Some(subquorum) = Subquorum::from_index(sig.subquorum as usize) else {
                    continue;
                };
                if btx.add_prechecked_signature(
                    subquorum,
                    sig.position as usize,
                    sig.approved,
                    sig.signature,
                ) {
                    added.push(sig);
                }
            }
            (
                added,
                !was_decided && btx.approved(),
                !was_decided && btx.rejected(),
            )
        };

        if became_approved {
            debug!(txhash = %txhash, "blink tx approved by quorums");
            self.pool.promote_approved_blink(height, &txhash);
        }

        if !added.is_empty() {
            let my_positions = view.positions_of(self.keys.pubkey());
            let remotes = resolve_peers(self.registry.as_ref(), &view.all_validators());
            let plan =
                plan_matrix_relay(&view.quorums, &my_positions, &remotes, received_from.as_ref());
            let bundle = BlinkSignBundle {
                height,
                txhash,
                checksum: view.checksum,
                entries: added
                    .iter()
                    .map(|sig| BlinkSignatureEntry {
                        subquorum: sig.subquorum,
                        position: sig.position,
                        approved: sig.approved,
                        signature: sig.signature,
                    })
                    .collect(),
            }
            .to_dict();
            for (x25519, options) in plan.destinations() {
                self.sender
                    .send(x25519, commands::BLINK_SIGN, bundle.clone(), options);
            }
            trace!(txhash = %txhash, new_sigs = added.len(), "relayed blink signatures");
        }

        if became_approved || became_rejected {
            let reply = {
                let mut blinks = self.blinks.lock();
                blinks
                    .get_mut(&height)
                    .and_then(|m| m.get_mut(&txhash))
                    .and_then(BlinkEntry::take_reply)
            };
            if let Some((conn, tag)) = reply {
                self.send_decision(conn, tag, became_approved);
            }
        }
    }

    fn verify_candidates(
        &self,
        height: u64,
        txhash: &Hash,
        view: &BlinkQuorumView,
        candidates: Vec<PendingSignature>,
    ) -> Vec<PendingSignature> {
        let mut digests = Vec::with_capacity(candidates.len());
        let mut pubkeys: Vec<SnPublicKey> = Vec::with_capacity(candidates.len());
        let mut usable = Vec::with_capacity(candidates.len());
        for sig in candidates {
            let quorum = &view.quorums[sig.subquorum as usize];
            let Some(pubkey) = quorum.validators.get(sig.position as usize) else {
                continue;
            };
            digests.push(blink_signing_hash(height, txhash, sig.approved));
            pubkeys.push(*pubkey);
            usable.push(sig);
        }

        let signatures: Vec<_> = usable.iter().map(|s| s.signature).collect();
        let results = batch_verify_signatures(&digests, &pubkeys, &signatures);
        usable
            .into_iter()
            .zip(results)
            .zip(pubkeys)
            .filter_map(|((sig, valid), pubkey)| {
                if valid {
                    Some(sig)
                } else {
                    info!(signer = %pubkey, "dropping blink signature that failed verification");
                    None
                }
            })
            .collect()
    }

    /// Evict cache entries whose height has fallen out of the retention
    /// window below the tip.
    fn evict_expired(&self) {
        let tip = self.chain.tip_height();
        let Some(cutoff) = tip.checked_sub(self.config.retention_blocks) else {
            return;
        };
        let mut blinks = self.blinks.lock();
        let keep = blinks.split_off(&(cutoff + 1));
        let evicted: usize = blinks.values().map(HashMap::len).sum();
        *blinks = keep;
        if evicted > 0 {
            debug!(evicted, cutoff, "evicted stale blink cache entries");
        }
    }

    fn send_nostart(&self, conn: ConnectionId, tag: u64, reason: &str) {
        if tag == 0 {
            return;
        }
        let reply = NostartReply {
            tag,
            reason: reason.to_string(),
        };
        self.sender.reply(conn, commands::BL_NOSTART, reply.to_dict());
    }

    fn send_decision(&self, conn: ConnectionId, tag: u64, approved: bool) {
        if tag == 0 {
            return;
        }
        let command = if approved {
            commands::BL_GOOD
        } else {
            commands::BL_BAD
        };
        self.sender
            .reply(conn, command, DecisionReply { tag }.to_dict());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blinknet_core::testing::{RecordingSender, TestChain, TestRegistry, TestTxPool};
    use blinknet_core::SnProof;
    use blinknet_types::{Quorum, SoftwareVersion, BLINK_MIN_VOTES};
    use blinknet_wire::WireDict;
    use std::net::Ipv4Addr;

    const TIP: u64 = 1000;

    struct TestBed {
        /// Index into `validators` of the node under test (position 3 of the
        /// base quorum, absent from the future quorum).
        validators: Vec<Arc<ServiceNodeKeys>>,
        registry: Arc<TestRegistry>,
        chain: Arc<TestChain>,
        pool: Arc<TestTxPool>,
        sender: Arc<RecordingSender>,
        coordinator: BlinkCoordinator,
        view: BlinkQuorumView,
    }

    fn proof_for(keys: &ServiceNodeKeys, n: u8) -> SnProof {
        SnProof {
            active: true,
            x25519_pubkey: Some(*keys.x25519_pubkey()),
            public_ip: Some(Ipv4Addr::new(10, 1, 0, n)),
            quorumnet_port: 11000 + n as u16,
            version: SoftwareVersion::new(11, 0, n as u16),
        }
    }

    fn testbed_with_sizes(sizes: [usize; 2], accept: bool) -> TestBed {
        let validators: Vec<Arc<ServiceNodeKeys>> = (0..sizes[0] + sizes[1])
            .map(|i| {
                let mut seed = [0u8; 32];
                seed[0] = i as u8;
                seed[1] = 0x5A;
                Arc::new(ServiceNodeKeys::from_seed(&seed))
            })
            .collect();

        let registry = Arc::new(TestRegistry::new());
        let (base, future) = validators.split_at(sizes[0]);
        let base_height = BlinkTx::quorum_height(TIP, Subquorum::Base).unwrap();
        let future_height = BlinkTx::quorum_height(TIP, Subquorum::Future).unwrap();
        registry.put_quorum(
            blinknet_types::QuorumType::Blink,
            base_height,
            Quorum {
                validators: base.iter().map(|k| *k.pubkey()).collect(),
                workers: vec![],
            },
        );
        registry.put_quorum(
            blinknet_types::QuorumType::Blink,
            future_height,
            Quorum {
                validators: future.iter().map(|k| *k.pubkey()).collect(),
                workers: vec![],
            },
        );
        for (i, keys) in validators.iter().enumerate() {
            registry.put_proof(*keys.pubkey(), proof_for(keys, i as u8));
        }

        let chain = Arc::new(TestChain::at_height(TIP));
        let pool = Arc::new(if accept {
            TestTxPool::accepting()
        } else {
            TestTxPool::rejecting()
        });
        let sender = Arc::new(RecordingSender::new());
        let coordinator = BlinkCoordinator::new(
            validators[3].clone(),
            chain.clone(),
            registry.clone(),
            pool.clone(),
            sender.clone(),
            BlinkConfig::default(),
        );
        let view = BlinkQuorumView::assemble(TIP, registry.as_ref()).unwrap();

        TestBed {
            validators,
            registry,
            chain,
            pool,
            sender,
            coordinator,
            view,
        }
    }

    fn testbed() -> TestBed {
        testbed_with_sizes([10, 10], true)
    }

    const TX_BLOB: &[u8] = b"a perfectly reasonable transaction";

    fn submission(bed: &TestBed, tag: u64) -> WireDict {
        submission_at(bed, tag, TIP)
    }

    fn submission_at(bed: &TestBed, tag: u64, height: u64) -> WireDict {
        BlinkSubmission {
            tag,
            height,
            checksum: bed.view.checksum,
            tx_blob: TX_BLOB.to_vec(),
            txhash: TestTxPool::hash_of(TX_BLOB),
        }
        .to_dict()
    }

    fn inbound(payload: WireDict, conn: u64) -> InboundMessage {
        InboundMessage {
            conn: ConnectionId(conn),
            from_sn: None,
            command: commands::BLINK_SUBMIT.to_string(),
            payload,
        }
    }

    /// A signature bundle as validator `index` (across both quorums) would
    /// produce it for its own slots.
    fn bundle_from(bed: &TestBed, index: usize, approved: bool) -> InboundMessage {
        let keys = &bed.validators[index];
        let txhash = TestTxPool::hash_of(TX_BLOB);
        let digest = blink_signing_hash(TIP, &txhash, approved);
        let signature = keys.sign(&digest);
        let positions = bed.view.positions_of(keys.pubkey());
        let entries = positions
            .iter()
            .enumerate()
            .filter_map(|(qi, pos)| {
                pos.map(|p| BlinkSignatureEntry {
                    subquorum: qi as u8,
                    position: p as u8,
                    approved,
                    signature,
                })
            })
            .collect();
        InboundMessage {
            conn: ConnectionId(900 + index as u64),
            from_sn: Some(*keys.x25519_pubkey()),
            command: commands::BLINK_SIGN.to_string(),
            payload: BlinkSignBundle {
                height: TIP,
                txhash,
                checksum: bed.view.checksum,
                entries,
            }
            .to_dict(),
        }
    }

    #[test]
    fn test_happy_path_approval_replies_good() {
        let bed = testbed();
        bed.coordinator
            .handle_submission(&inbound(submission(&bed, 0xDEAD_BEEF), 1));

        // Pre-distribution fanned the submission out to strong peers and the
        // local approval signature was bundled out.
        let sent = bed.sender.sent.lock();
        let submits = sent
            .iter()
            .filter(|m| m.command == commands::BLINK_SUBMIT)
            .count();
        let strong_submits = sent
            .iter()
            .filter(|m| m.command == commands::BLINK_SUBMIT && m.options.hint.is_some())
            .count();
        assert!(submits >= 1);
        assert!(strong_submits >= 1);
        assert!(sent.iter().any(|m| m.command == commands::BLINK_SIGN));
        drop(sent);

        // Not decided yet: no reply.
        assert!(bed.sender.replies.lock().is_empty());

        // Six more base-quorum approvals and seven future-quorum approvals.
        for index in [0, 1, 2, 4, 5, 6] {
            bed.coordinator.handle_signatures(&bundle_from(&bed, index, true));
        }
        assert!(bed.sender.replies.lock().is_empty());
        for index in 10..17 {
            bed.coordinator.handle_signatures(&bundle_from(&bed, index, true));
        }

        let replies = bed.sender.replies.lock();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].command, commands::BL_GOOD);
        assert_eq!(replies[0].conn, ConnectionId(1));
        assert_eq!(
            DecisionReply::from_dict(&replies[0].payload).unwrap().tag,
            0xDEAD_BEEF
        );

        // Approval reached the mempool exactly once.
        assert_eq!(
            bed.pool.promoted.lock().as_slice(),
            &[(TIP, TestTxPool::hash_of(TX_BLOB))]
        );
    }

    #[test]
    fn test_rejecting_pool_leads_to_bad_reply() {
        // Minimum-size quorums: a single rejection per subquorum decides.
        let bed = testbed_with_sizes([BLINK_MIN_VOTES, BLINK_MIN_VOTES], false);
        bed.coordinator
            .handle_submission(&inbound(submission(&bed, 77), 4));

        let replies = bed.sender.replies.lock();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].command, commands::BL_BAD);
        assert_eq!(DecisionReply::from_dict(&replies[0].payload).unwrap().tag, 77);
        assert!(bed.pool.promoted.lock().is_empty());
    }

    #[test]
    fn test_late_signature_held_then_merged() {
        let bed = testbed();

        // A valid approval from base position 4 arrives before any
        // submission.
        bed.coordinator.handle_signatures(&bundle_from(&bed, 4, true));

        {
            let blinks = bed.coordinator.blinks.lock();
            let entry = &blinks[&TIP][&TestTxPool::hash_of(TX_BLOB)];
            assert!(entry.btx.is_none());
            assert_eq!(entry.pending_sigs.len(), 1);
        }
        // No relay happened for the detached signature.
        assert!(bed.sender.sent_commands().is_empty());

        // The submission arrives; the stashed signature is merged and
        // relayed together with our own.
        bed.coordinator.handle_submission(&inbound(submission(&bed, 0), 2));
        let blinks = bed.coordinator.blinks.lock();
        let entry = &blinks[&TIP][&TestTxPool::hash_of(TX_BLOB)];
        let btx = entry.btx.as_ref().unwrap().read();
        assert!(btx.slot_filled(Subquorum::Base, 3)); // our own signature
        assert!(btx.slot_filled(Subquorum::Base, 4)); // the stashed one
        assert_eq!(btx.approval_counts()[0], 2);
    }

    #[test]
    fn test_height_too_low_nostart() {
        let bed = testbed();
        bed.coordinator
            .handle_submission(&inbound(submission_at(&bed, 42, TIP - 3), 9));

        let replies = bed.sender.replies.lock();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].command, commands::BL_NOSTART);
        let reply = NostartReply::from_dict(&replies[0].payload).unwrap();
        assert_eq!(reply.tag, 42);
        assert_eq!(reply.reason, "Invalid blink authorization height");

        // No relay, no cache entry.
        assert!(bed.sender.sent.lock().is_empty());
        assert!(bed.coordinator.blinks.lock().is_empty());
    }

    #[test]
    fn test_height_boundaries() {
        for (height, ok) in [
            (TIP - 3, false),
            (TIP - 2, true),
            (TIP, true),
            (TIP + 2, true),
            (TIP + 3, false),
        ] {
            let bed = testbed();
            // Quorums are registered for TIP; only the in-range heights get
            // far enough to consult them, so just check the nostart reason.
            bed.coordinator
                .handle_submission(&inbound(submission_at(&bed, 5, height), 1));
            let replies = bed.sender.replies.lock();
            let height_rejected = replies.iter().any(|r| {
                r.command == commands::BL_NOSTART
                    && NostartReply::from_dict(&r.payload).unwrap().reason
                        == "Invalid blink authorization height"
            });
            assert_eq!(height_rejected, !ok, "height {height}");
        }
    }

    #[test]
    fn test_checksum_mismatch_nostart() {
        let bed = testbed();
        let mut payload = submission(&bed, 7);
        payload.insert(
            "q".into(),
            WireValue::Int(bed.view.checksum.wrapping_add(1)),
        );
        bed.coordinator.handle_submission(&inbound(payload, 3));

        let replies = bed.sender.replies.lock();
        assert_eq!(replies.len(), 1);
        let reason = NostartReply::from_dict(&replies[0].payload).unwrap().reason;
        assert!(reason.contains("wrong quorum checksum"), "reason: {reason}");
        assert!(reason.contains(&bed.view.checksum.to_string()));
        assert!(bed.sender.sent.lock().is_empty());
    }

    #[test]
    fn test_non_member_nostart() {
        let bed = testbed();
        let outsider = Arc::new(ServiceNodeKeys::from_seed(&[0xEE; 32]));
        bed.registry.put_proof(*outsider.pubkey(), proof_for(&outsider, 99));
        let coordinator = BlinkCoordinator::new(
            outsider,
            bed.chain.clone(),
            bed.registry.clone(),
            bed.pool.clone(),
            bed.sender.clone(),
            BlinkConfig::default(),
        );
        coordinator.handle_submission(&inbound(submission(&bed, 6), 8));
        let replies = bed.sender.replies.lock();
        assert_eq!(replies.len(), 1);
        assert_eq!(
            NostartReply::from_dict(&replies[0].payload).unwrap().reason,
            "This service node is not a member of the blink quorum"
        );
    }

    #[test]
    fn test_duplicate_submission_is_noop() {
        let bed = testbed();
        bed.coordinator.handle_submission(&inbound(submission(&bed, 0), 1));
        let sends_after_first = bed.sender.sent.lock().len();

        bed.coordinator.handle_submission(&inbound(submission(&bed, 0), 2));
        assert_eq!(bed.sender.sent.lock().len(), sends_after_first);
    }

    #[test]
    fn test_decided_tx_replays_verdict() {
        let bed = testbed();
        bed.coordinator.handle_submission(&inbound(submission(&bed, 0), 1));
        for index in [0, 1, 2, 4, 5, 6] {
            bed.coordinator.handle_signatures(&bundle_from(&bed, index, true));
        }
        for index in 10..17 {
            bed.coordinator.handle_signatures(&bundle_from(&bed, index, true));
        }
        bed.sender.replies.lock().clear();

        // A later submission for the decided tx answers immediately, with no
        // further relay.
        let sends_before = bed.sender.sent.lock().len();
        bed.coordinator
            .handle_submission(&inbound(submission(&bed, 0xBEEF), 5));
        let replies = bed.sender.replies.lock();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].command, commands::BL_GOOD);
        assert_eq!(replies[0].conn, ConnectionId(5));
        assert_eq!(bed.sender.sent.lock().len(), sends_before);
    }

    #[test]
    fn test_invalid_signature_dropped() {
        let bed = testbed();
        bed.coordinator.handle_submission(&inbound(submission(&bed, 0), 1));

        // Validator 5 claims approval but signs garbage.
        let mut msg = bundle_from(&bed, 5, true);
        let mut bundle = BlinkSignBundle::from_dict(&msg.payload).unwrap();
        bundle.entries[0].signature = blinknet_types::QuorumSignature([9u8; 64]);
        msg.payload = bundle.to_dict();
        bed.coordinator.handle_signatures(&msg);

        let blinks = bed.coordinator.blinks.lock();
        let entry = &blinks[&TIP][&TestTxPool::hash_of(TX_BLOB)];
        assert!(!entry.btx.as_ref().unwrap().read().slot_filled(Subquorum::Base, 5));
    }

    #[test]
    fn test_duplicate_signatures_recorded_once() {
        let bed = testbed();
        bed.coordinator.handle_submission(&inbound(submission(&bed, 0), 1));
        bed.coordinator.handle_signatures(&bundle_from(&bed, 6, true));
        let sends = bed.sender.sent.lock().len();

        // The identical bundle again: slot already filled, nothing relayed.
        bed.coordinator.handle_signatures(&bundle_from(&bed, 6, true));
        assert_eq!(bed.sender.sent.lock().len(), sends);

        let blinks = bed.coordinator.blinks.lock();
        let entry = &blinks[&TIP][&TestTxPool::hash_of(TX_BLOB)];
        assert_eq!(entry.btx.as_ref().unwrap().read().approval_counts()[0], 2);
    }

    #[test]
    fn test_signature_relay_excludes_sender() {
        let bed = testbed();
        bed.coordinator.handle_submission(&inbound(submission(&bed, 0), 1));
        bed.sender.sent.lock().clear();

        let msg = bundle_from(&bed, 0, true);
        let sender_x25519 = msg.from_sn.unwrap();
        bed.coordinator.handle_signatures(&msg);

        let sent = bed.sender.sent.lock();
        assert!(sent.iter().any(|m| m.command == commands::BLINK_SIGN));
        assert!(
            sent.iter()
                .all(|m| !(m.command == commands::BLINK_SIGN && m.to == sender_x25519)),
            "signature bundle bounced back to its sender"
        );
    }

    #[test]
    fn test_eviction_by_retention_window() {
        let bed = testbed();
        bed.coordinator.handle_submission(&inbound(submission(&bed, 0), 1));
        assert!(!bed.coordinator.blinks.lock().is_empty());

        // Advance the tip past the retention window; the next intake sweeps
        // the stale entry.
        bed.chain.set_tip(TIP + BlinkConfig::default().retention_blocks + 1);
        bed.coordinator
            .handle_submission(&inbound(submission_at(&bed, 0, TIP), 2));
        assert!(bed.coordinator.blinks.lock().get(&TIP).is_none());
    }

    #[test]
    fn test_hard_fork_guard() {
        let bed = testbed();
        bed.chain.set_hf(HF_VERSION_BLINK - 1);
        bed.coordinator.handle_submission(&inbound(submission(&bed, 3), 1));
        let replies = bed.sender.replies.lock();
        assert_eq!(replies.len(), 1);
        assert_eq!(
            NostartReply::from_dict(&replies[0].payload).unwrap().reason,
            "Blink is not available on this network yet"
        );
    }

    #[test]
    fn test_tagless_rejection_sends_no_reply() {
        let bed = testbed();
        bed.coordinator
            .handle_submission(&inbound(submission_at(&bed, 0, TIP - 3), 1));
        assert!(bed.sender.replies.lock().is_empty());
    }
}
