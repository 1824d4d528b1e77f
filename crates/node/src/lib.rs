//! Node-level wiring for the quorum core: the transport-facing command
//! dispatcher and the obligation-vote relay.

mod dispatch;
mod votes;

pub use dispatch::{CategoryAccess, CommandDispatcher, DispatchError};
pub use votes::VoteRelay;

use blinknet_blink::{BlinkCoordinator, BlinkOriginator};
use blinknet_pulse::PulseCoordinator;
use std::sync::Arc;

/// Register every quorum command on a dispatcher, wiring the transport's
/// category/command table to the coordinators.
///
/// Category access mirrors the roles: `quorum.*` and `pulse.*` are
/// SN-to-SN, `blink.*` accepts external submitters, and `bl.*` carries
/// replies from service nodes back to an open originator.
pub fn register_quorum_commands(
    dispatcher: &CommandDispatcher,
    blink: Arc<BlinkCoordinator>,
    originator: Arc<BlinkOriginator>,
    pulse: Arc<PulseCoordinator>,
    votes: Arc<VoteRelay>,
) {
    use blinknet_wire::commands;

    dispatcher.register_category("quorum", CategoryAccess::SnToSn, 2);
    dispatcher.register_category("blink", CategoryAccess::OpenToSn, 1);
    dispatcher.register_category("bl", CategoryAccess::SnToOpen, 1);
    dispatcher.register_category("pulse", CategoryAccess::SnToSn, 1);

    let c = blink.clone();
    dispatcher.register_command(commands::BLINK_SUBMIT, move |msg| c.handle_submission(msg));
    dispatcher.register_command(commands::BLINK_SIGN, move |msg| blink.handle_signatures(msg));

    dispatcher.register_command(commands::VOTE_OB, move |msg| votes.handle_vote(msg));

    let o = originator.clone();
    dispatcher.register_command(commands::BL_NOSTART, move |msg| o.handle_nostart(msg));
    let o = originator.clone();
    dispatcher.register_command(commands::BL_BAD, move |msg| o.handle_bad(msg));
    dispatcher.register_command(commands::BL_GOOD, move |msg| originator.handle_good(msg));

    for command in [
        commands::PULSE_VALIDATOR_BIT,
        commands::PULSE_VALIDATOR_BITSET,
        commands::PULSE_BLOCK_TEMPLATE,
        commands::PULSE_RANDOM_VALUE_HASH,
        commands::PULSE_RANDOM_VALUE,
    ] {
        let p = pulse.clone();
        dispatcher.register_command(command, move |msg| p.handle_message(msg));
    }
}
