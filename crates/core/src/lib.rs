//! Boundary traits and transport plumbing for the quorum coordination core.
//!
//! The blockchain, mempool, service-node registry, vote pool, and the
//! authenticated message transport are external collaborators. This crate
//! pins down the narrow synchronous interfaces the core consumes, so
//! protocol crates depend on traits rather than node internals.

mod traits;
mod transport;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use traits::{
    BlinkTxPool, ChainView, SnProof, SnRegistry, TxError, VoteOutcome, VotePool,
};
pub use transport::{ConnectionId, InboundMessage, MessageSender, SendOptions};
