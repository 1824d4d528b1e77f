//! Blink: instant transaction finality via overlapping service-node quorums.
//!
//! Two halves, matching the two roles a node can play:
//!
//! - [`BlinkCoordinator`] runs on quorum members: it takes in submissions,
//!   pre-distributes them across the quorums, casts and collects signatures,
//!   and reports the decision back to the originator.
//! - [`BlinkOriginator`] runs on the submitting node: it fans a transaction
//!   out to a few quorum members and resolves a future with the quorum's
//!   decision (or a timeout).

mod config;
mod coordinator;
mod entry;
mod error;
mod originator;

pub use config::{BlinkConfig, OriginatorConfig};
pub use coordinator::BlinkCoordinator;
pub use entry::{BlinkEntry, PendingSignature};
pub use error::BlinkError;
pub use originator::{BlinkOriginator, BlinkResult};
