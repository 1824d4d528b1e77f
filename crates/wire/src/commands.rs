//! Command names for the transport's category/command dispatcher.
//!
//! The category prefix (up to the first `.`) selects the access policy; the
//! rest selects the handler.

/// Blink submission from an external node or a quorum-member forward.
pub const BLINK_SUBMIT: &str = "blink.submit";

/// Signature bundle exchanged between blink quorum members.
pub const BLINK_SIGN: &str = "quorum.blink_sign";

/// Obligation vote relayed between quorum members.
pub const VOTE_OB: &str = "quorum.vote_ob";

/// Reply to a submitter: this node did not start quorum processing.
pub const BL_NOSTART: &str = "bl.nostart";

/// Reply to a submitter: the quorum rejected the transaction.
pub const BL_BAD: &str = "bl.bad";

/// Reply to a submitter: the quorum approved the transaction.
pub const BL_GOOD: &str = "bl.good";

/// Pulse handshake participation bit.
pub const PULSE_VALIDATOR_BIT: &str = "pulse.validator_bit";

/// Pulse agreed participation bitset.
pub const PULSE_VALIDATOR_BITSET: &str = "pulse.validator_bitset";

/// Pulse block template from the round's block producer.
pub const PULSE_BLOCK_TEMPLATE: &str = "pulse.block_template";

/// Pulse random value commitment (hash).
pub const PULSE_RANDOM_VALUE_HASH: &str = "pulse.random_value_hash";

/// Pulse random value reveal.
pub const PULSE_RANDOM_VALUE: &str = "pulse.random_value";
