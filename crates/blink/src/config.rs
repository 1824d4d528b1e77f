//! Blink configuration.

use blinknet_types::BLINK_RETENTION_BLOCKS;
use serde::Deserialize;
use std::time::Duration;

/// Default number of peers an originator fans a submission out to.
pub const DEFAULT_ORIGINATOR_FANOUT: usize = 4;

/// Default deadline for an originator promise.
pub const DEFAULT_ORIGINATOR_DEADLINE: Duration = Duration::from_secs(30);

/// Default cap on concurrently pending originator promises.
pub const DEFAULT_MAX_ACTIVE_PROMISES: usize = 1000;

/// Quorum-member side configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BlinkConfig {
    /// Blocks below the tip after which cache entries are evicted.
    #[serde(default = "default_retention_blocks")]
    pub retention_blocks: u64,
}

fn default_retention_blocks() -> u64 {
    BLINK_RETENTION_BLOCKS
}

impl Default for BlinkConfig {
    fn default() -> Self {
        Self {
            retention_blocks: BLINK_RETENTION_BLOCKS,
        }
    }
}

/// Originator side configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct OriginatorConfig {
    /// Peers to fan each submission out to.
    #[serde(default = "default_fanout")]
    pub fanout: usize,

    /// Deadline after which an unresolved promise times out.
    #[serde(default = "default_deadline", with = "duration_secs")]
    pub deadline: Duration,

    /// Back-pressure cap on concurrently pending promises.
    #[serde(default = "default_max_active")]
    pub max_active_promises: usize,
}

fn default_fanout() -> usize {
    DEFAULT_ORIGINATOR_FANOUT
}

fn default_deadline() -> Duration {
    DEFAULT_ORIGINATOR_DEADLINE
}

fn default_max_active() -> usize {
    DEFAULT_MAX_ACTIVE_PROMISES
}

impl Default for OriginatorConfig {
    fn default() -> Self {
        Self {
            fanout: DEFAULT_ORIGINATOR_FANOUT,
            deadline: DEFAULT_ORIGINATOR_DEADLINE,
            max_active_promises: DEFAULT_MAX_ACTIVE_PROMISES,
        }
    }
}

/// Serde helper: whole seconds on the wire.
mod duration_secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}
