//! Originator side of blink: fan a transaction out to quorum entry points
//! and resolve a future with the quorum's verdict.

use crate::OriginatorConfig;
use blinknet_core::{BlinkTxPool, ChainView, InboundMessage, MessageSender, SendOptions, SnRegistry};
use blinknet_quorum::{plan_subset_relay, resolve_peers, BlinkQuorumView};
use blinknet_types::Hash;
use blinknet_wire::{commands, BlinkSubmission, DecisionReply, NostartReply};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, info, trace};

/// Final status of a blink submission.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlinkResult {
    /// The quorum approved; the tx is final.
    Accepted,
    /// The quorum rejected, or the submission never started.
    Rejected,
    /// No decisive answer within the deadline.
    Timeout,
}

/// One outstanding submission, keyed by its random tag.
struct PromiseEntry {
    txhash: Hash,
    resolve: oneshot::Sender<(BlinkResult, String)>,
    expires_at: Instant,
    /// How many peers the submission was fanned out to.
    remote_count: usize,
    /// `bl.nostart` replies seen so far.
    nostart_count: AtomicUsize,
}

/// Tracks submissions this node originated and resolves their futures from
/// quorum replies.
///
/// A single `bl.good` or `bl.bad` is decisive (the replying quorum member
/// validated the threshold signatures itself); `bl.nostart` only counts
/// against the submission once a strict majority of the fan-out reported it.
pub struct BlinkOriginator {
    chain: Arc<dyn ChainView>,
    registry: Arc<dyn SnRegistry>,
    pool: Arc<dyn BlinkTxPool>,
    sender: Arc<dyn MessageSender>,
    config: OriginatorConfig,
    pending: Mutex<HashMap<u64, PromiseEntry>>,
}

impl BlinkOriginator {
    /// Create an originator around the node's collaborators.
    pub fn new(
        chain: Arc<dyn ChainView>,
        registry: Arc<dyn SnRegistry>,
        pool: Arc<dyn BlinkTxPool>,
        sender: Arc<dyn MessageSender>,
        config: OriginatorConfig,
    ) -> Self {
        Self {
            chain,
            registry,
            pool,
            sender,
            config,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Submit a transaction for blink finality.
    ///
    /// Resolves with the quorum verdict, or [`BlinkResult::Timeout`] when
    /// the deadline passes without one. Every internal failure on the
    /// submission path resolves as `Rejected` with a readable reason.
    pub async fn send_blink(&self, tx_blob: Vec<u8>) -> (BlinkResult, String) {
        let txhash = match self.pool.parse_tx(&tx_blob) {
            Ok(h) => h,
            Err(e) => return (BlinkResult::Rejected, e.to_string()),
        };

        self.sweep_expired();

        {
            let pending = self.pending.lock();
            if pending.values().any(|p| p.txhash == txhash) {
                return (
                    BlinkResult::Rejected,
                    "Transaction was already submitted".to_string(),
                );
            }
            if pending.len() >= self.config.max_active_promises {
                return (
                    BlinkResult::Rejected,
                    "Too many pending blink transactions".to_string(),
                );
            }
        }

        let height = self.chain.tip_height();
        let view = match BlinkQuorumView::assemble(height, self.registry.as_ref()) {
            Ok(view) => view,
            Err(e) => return (BlinkResult::Rejected, e.to_string()),
        };
        let remotes = resolve_peers(self.registry.as_ref(), &view.all_validators());
        let targets = plan_subset_relay(&remotes, self.config.fanout);
        if targets.is_empty() {
            return (
                BlinkResult::Rejected,
                "No reachable blink quorum members".to_string(),
            );
        }

        let deadline = Instant::now() + self.config.deadline;
        let (tx, rx) = oneshot::channel();
        let tag = {
            let mut pending = self.pending.lock();
            // The dup check races with the planning above; re-check now that
            // the insert is imminent.
            if pending.values().any(|p| p.txhash == txhash) {
                return (
                    BlinkResult::Rejected,
                    "Transaction was already submitted".to_string(),
                );
            }
            let tag = loop {
                let candidate: u64 = rand::random();
                if candidate != 0 && !pending.contains_key(&candidate) {
                    break candidate;
                }
            };
            pending.insert(
                tag,
                PromiseEntry {
                    txhash,
                    resolve: tx,
                    expires_at: deadline,
                    remote_count: targets.len(),
                    nostart_count: AtomicUsize::new(0),
                },
            );
            tag
        };

        let payload = BlinkSubmission {
            tag,
            height,
            checksum: view.checksum,
            tx_blob,
            txhash,
        }
        .to_dict();
        for peer in &targets {
            self.sender.send(
                &peer.x25519_pubkey,
                commands::BLINK_SUBMIT,
                payload.clone(),
                SendOptions::hint(peer.address.clone()),
            );
        }
        debug!(%txhash, tag, fanout = targets.len(), "submitted blink tx to quorum");

        match tokio::time::timeout_at(deadline, rx).await {
            Ok(Ok(outcome)) => outcome,
            // Sender dropped without resolving; treat like the deadline.
            Ok(Err(_)) => (BlinkResult::Timeout, "Blink quorum timeout".to_string()),
            Err(_) => {
                self.pending.lock().remove(&tag);
                (BlinkResult::Timeout, "Blink quorum timeout".to_string())
            }
        }
    }

    /// Handle a `bl.nostart` reply: one quorum entry point declined to
    /// process the submission. Resolves as rejected only once a strict
    /// majority of the fan-out has declined, tolerating a minority of stale
    /// or faulty entry points.
    pub fn handle_nostart(&self, msg: &InboundMessage) {
        let reply = match NostartReply::from_dict(&msg.payload) {
            Ok(r) => r,
            Err(e) => {
                info!(error = %e, "ignoring malformed bl.nostart");
                return;
            }
        };
        let resolved = {
            let mut pending = self.pending.lock();
            let Some(entry) = pending.get(&reply.tag) else {
                trace!(tag = reply.tag, "bl.nostart for unknown tag");
                return;
            };
            let count = entry.nostart_count.fetch_add(1, Ordering::Relaxed) + 1;
            if count > entry.remote_count / 2 {
                pending.remove(&reply.tag)
            } else {
                debug!(
                    tag = reply.tag,
                    count,
                    remote_count = entry.remote_count,
                    "bl.nostart below majority"
                );
                None
            }
        };
        if let Some(entry) = resolved {
            let _ = entry.resolve.send((BlinkResult::Rejected, reply.reason));
        }
    }

    /// Handle a `bl.bad` reply: the quorum rejected the transaction. Any
    /// single report is decisive since the reporter verified the rejection
    /// signatures itself.
    pub fn handle_bad(&self, msg: &InboundMessage) {
        self.resolve_decision(msg, BlinkResult::Rejected, "Transaction rejected by blink quorum");
    }

    /// Handle a `bl.good` reply: the quorum approved the transaction.
    pub fn handle_good(&self, msg: &InboundMessage) {
        self.resolve_decision(msg, BlinkResult::Accepted, "");
    }

    fn resolve_decision(&self, msg: &InboundMessage, result: BlinkResult, reason: &str) {
        let reply = match DecisionReply::from_dict(&msg.payload) {
            Ok(r) => r,
            Err(e) => {
                info!(error = %e, "ignoring malformed blink decision reply");
                return;
            }
        };
        let Some(entry) = self.pending.lock().remove(&reply.tag) else {
            trace!(tag = reply.tag, "blink decision for unknown tag");
            return;
        };
        debug!(tag = reply.tag, ?result, "blink promise resolved");
        let _ = entry.resolve.send((result, reason.to_string()));
    }

    /// Resolve and drop every promise past its deadline. Called on entry to
    /// each submission; the submission's own `timeout_at` covers promises
    /// no further submission ever sweeps.
    fn sweep_expired(&self) {
        let now = Instant::now();
        let expired: Vec<PromiseEntry> = {
            let mut pending = self.pending.lock();
            let tags: Vec<u64> = pending
                .iter()
                .filter(|(_, p)| p.expires_at <= now)
                .map(|(tag, _)| *tag)
                .collect();
            tags.into_iter()
                .filter_map(|tag| pending.remove(&tag))
                .collect()
        };
        for entry in expired {
            trace!(txhash = %entry.txhash, "expiring blink promise");
            let _ = entry
                .resolve
                .send((BlinkResult::Timeout, "Blink quorum timeout".to_string()));
        }
    }

    /// Number of unresolved promises (introspection and tests).
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}
