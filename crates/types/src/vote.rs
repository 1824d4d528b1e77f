//! Service-node misbehaviour votes relayed between quorum members.

use crate::{Hash, QuorumSignature, QuorumType};

/// Which group of a quorum the voter belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoteGroup {
    /// A voting validator.
    Validator,
    /// A worker under test.
    Worker,
}

impl VoteGroup {
    /// Numeric tag used on the wire.
    pub fn to_u8(self) -> u8 {
        match self {
            VoteGroup::Validator => 0,
            VoteGroup::Worker => 1,
        }
    }

    /// Parse the wire tag.
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(VoteGroup::Validator),
            1 => Some(VoteGroup::Worker),
            _ => None,
        }
    }
}

/// Requested state change for a misbehaving (or recovered) service node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeStateChange {
    /// Temporarily remove from quorum duty.
    Decommission,
    /// Restore a decommissioned node.
    Recommission,
    /// Permanently deregister.
    Deregister,
    /// Penalise an IP address change.
    IpChangePenalty,
}

impl NodeStateChange {
    /// Numeric tag used on the wire.
    pub fn to_u8(self) -> u8 {
        match self {
            NodeStateChange::Decommission => 0,
            NodeStateChange::Recommission => 1,
            NodeStateChange::Deregister => 2,
            NodeStateChange::IpChangePenalty => 3,
        }
    }

    /// Parse the wire tag.
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(NodeStateChange::Decommission),
            1 => Some(NodeStateChange::Recommission),
            2 => Some(NodeStateChange::Deregister),
            3 => Some(NodeStateChange::IpChangePenalty),
            _ => None,
        }
    }
}

/// Variant payload of a quorum vote.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VotePayload {
    /// Checkpointing votes carry the voted block hash.
    Checkpoint {
        /// Hash of the block being checkpointed.
        block_hash: Hash,
    },
    /// Obligations votes carry the target worker and requested change.
    StateChange {
        /// Index of the worker under test in the quorum's worker list.
        worker_index: u16,
        /// Requested state change.
        state: NodeStateChange,
    },
}

/// A single vote cast by a quorum validator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ObligationVote {
    /// Vote format version.
    pub version: u8,
    /// Which quorum type produced this vote.
    pub vote_type: QuorumType,
    /// Height of the quorum that voted.
    pub height: u64,
    /// Voter's group within the quorum.
    pub group: VoteGroup,
    /// Voter's index within that group.
    pub index_in_group: u16,
    /// Signature by the voter over the vote contents.
    pub signature: QuorumSignature,
    /// Variant payload.
    pub payload: VotePayload,
}
