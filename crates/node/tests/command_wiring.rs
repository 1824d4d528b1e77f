//! End-to-end wiring test: messages entering the dispatcher reach the right
//! coordinator and produce the protocol's replies.

use blinknet_blink::{BlinkConfig, BlinkCoordinator, BlinkOriginator, OriginatorConfig};
use blinknet_core::testing::{RecordingSender, TestChain, TestRegistry, TestTxPool, TestVotePool};
use blinknet_core::{ConnectionId, InboundMessage};
use blinknet_node::{register_quorum_commands, CommandDispatcher, DispatchError, VoteRelay};
use blinknet_pulse::{PulseCoordinator, PulseQueue};
use blinknet_types::{ServiceNodeKeys, X25519PublicKey};
use blinknet_wire::{commands, BlinkSubmission, NostartReply, WireDict};
use std::sync::Arc;

fn wired() -> (CommandDispatcher, Arc<RecordingSender>) {
    let keys = Arc::new(ServiceNodeKeys::from_seed(&[1u8; 32]));
    let chain = Arc::new(TestChain::at_height(1000));
    let registry = Arc::new(TestRegistry::new());
    let pool = Arc::new(TestTxPool::accepting());
    let sender = Arc::new(RecordingSender::new());

    let blink = Arc::new(BlinkCoordinator::new(
        keys.clone(),
        chain.clone(),
        registry.clone(),
        pool.clone(),
        sender.clone(),
        BlinkConfig::default(),
    ));
    let originator = Arc::new(BlinkOriginator::new(
        chain.clone(),
        registry.clone(),
        pool.clone(),
        sender.clone(),
        OriginatorConfig::default(),
    ));
    let (queue, _rx) = PulseQueue::new();
    let pulse = Arc::new(PulseCoordinator::new(
        keys.clone(),
        registry.clone(),
        sender.clone(),
        queue,
    ));
    let votes = Arc::new(VoteRelay::new(
        keys,
        chain,
        registry,
        Arc::new(TestVotePool::adding()),
        sender.clone(),
    ));

    let dispatcher = CommandDispatcher::new();
    register_quorum_commands(&dispatcher, blink, originator, pulse, votes);
    (dispatcher, sender)
}

#[test]
fn test_external_submission_reaches_blink_coordinator() {
    let (dispatcher, sender) = wired();

    // No quorums are registered, so a valid-looking submission must come
    // back as a nostart through the blink coordinator.
    let payload = BlinkSubmission {
        tag: 99,
        height: 1000,
        checksum: 0,
        tx_blob: b"tx".to_vec(),
        txhash: TestTxPool::hash_of(b"tx"),
    }
    .to_dict();
    let handled = dispatcher.dispatch(&InboundMessage {
        conn: ConnectionId(7),
        from_sn: None,
        command: commands::BLINK_SUBMIT.to_string(),
        payload,
    });
    assert!(handled.is_ok());

    let replies = sender.replies.lock();
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].command, commands::BL_NOSTART);
    assert_eq!(NostartReply::from_dict(&replies[0].payload).unwrap().tag, 99);
}

#[test]
fn test_sn_only_commands_blocked_for_anonymous_senders() {
    let (dispatcher, _) = wired();
    for command in [
        commands::BLINK_SIGN,
        commands::VOTE_OB,
        commands::PULSE_VALIDATOR_BIT,
        commands::BL_GOOD,
    ] {
        let handled = dispatcher.dispatch(&InboundMessage {
            conn: ConnectionId(1),
            from_sn: None,
            command: command.to_string(),
            payload: WireDict::new(),
        });
        assert!(
            matches!(handled, Err(DispatchError::AccessDenied { .. })),
            "{command} must require an SN sender"
        );
    }

    // The same commands pass the access check when authenticated (and then
    // fail harmlessly on their empty payloads).
    for command in [commands::BLINK_SIGN, commands::VOTE_OB] {
        let handled = dispatcher.dispatch(&InboundMessage {
            conn: ConnectionId(1),
            from_sn: Some(X25519PublicKey::from_bytes([3u8; 32])),
            command: command.to_string(),
            payload: WireDict::new(),
        });
        assert!(handled.is_ok());
    }
}
