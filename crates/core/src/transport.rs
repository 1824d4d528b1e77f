//! The authenticated message transport boundary.
//!
//! The transport owns sockets, encryption, connection management, and the
//! dict codec framing; the core addresses peers by x25519 pubkey and speaks
//! in [`WireDict`] payloads.

use blinknet_types::X25519PublicKey;
use blinknet_wire::WireDict;
use std::fmt;

/// Opaque identifier of an inbound connection, used to route replies back to
/// an originator that is not itself a service node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// Delivery options for an outgoing message.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SendOptions {
    /// Connect hint: a `tcp://ip:port` address to dial if no connection to
    /// the peer exists yet.
    pub hint: Option<String>,
    /// When set, the message is sent only over an already-established
    /// connection and silently dropped otherwise.
    pub optional: bool,
}

impl SendOptions {
    /// Strong delivery: connect using `address` if needed.
    pub fn hint(address: impl Into<String>) -> Self {
        Self {
            hint: Some(address.into()),
            optional: false,
        }
    }

    /// Opportunistic delivery: never opens a new connection.
    pub fn optional() -> Self {
        Self {
            hint: None,
            optional: true,
        }
    }
}

/// Outgoing half of the transport.
///
/// Sends are queued and non-blocking; delivery is best-effort and failures
/// surface only in transport logs (peers cover for lost relays).
pub trait MessageSender: Send + Sync {
    /// Send `command` with `payload` to the peer identified by `to`.
    fn send(&self, to: &X25519PublicKey, command: &str, payload: WireDict, options: SendOptions);

    /// Send a reply over an existing inbound connection. Never opens a new
    /// connection; if the originator is gone the reply is dropped.
    fn reply(&self, conn: ConnectionId, command: &str, payload: WireDict);
}

/// An inbound message as delivered by the transport dispatcher.
#[derive(Clone, Debug)]
pub struct InboundMessage {
    /// The connection it arrived on.
    pub conn: ConnectionId,
    /// The authenticated service-node transport pubkey of the sender, or
    /// `None` for anonymous (non-SN) connections.
    pub from_sn: Option<X25519PublicKey>,
    /// Full command name, e.g. `blink.submit`.
    pub command: String,
    /// Decoded dict payload.
    pub payload: WireDict,
}

impl InboundMessage {
    /// True when the sender authenticated as a service node.
    pub fn is_from_sn(&self) -> bool {
        self.from_sn.is_some()
    }
}
