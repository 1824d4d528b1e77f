//! Wire encoding for quorum-to-quorum messages.
//!
//! All quorum payloads travel as a canonical, length-prefixed,
//! lexicographically-keyed dictionary serialisation ([`WireValue`] /
//! [`WireDict`]). Typed message structs convert to and from dicts at this
//! boundary; field presence and size validation happens here so protocol
//! code only ever sees well-formed messages.

mod messages;
mod value;

pub mod commands;

pub use messages::{
    vote_from_dict, vote_to_dict, BlinkSignBundle, BlinkSignatureEntry, BlinkSubmission,
    DecisionReply, NostartReply, PulseMessage,
};
pub use value::{decode_dict, encode_dict, WireDict, WireError, WireValue};
