//! Pulse: quorum block production coordination.
//!
//! The network side of pulse is deliberately thin. Inbound messages are
//! validated and handed off as typed variants to a single-threaded handler
//! owned by the block-production loop; the relay side reuses the blink
//! substrate (peer resolution, matrix and subset planners) with pulse's own
//! routing rules. The coordinator guarantees at-most-once forwarding within
//! a (height, round) and in-order hand-off to the handler.

mod coordinator;
mod queue;

pub use coordinator::{PulseCoordinator, PULSE_TEMPLATE_FANOUT};
pub use queue::{spawn_pulse_handler, PulseEvent, PulseQueue};
