//! Typed quorum messages and their dict conversions.
//!
//! Key layouts are part of the protocol and must stay bit-compatible:
//! single-byte keys where documented, parallel lists for signature bundles.

use crate::value::{int_or, require_bytes, require_int, require_list, require_sized_bytes};
use crate::{commands, WireDict, WireError, WireValue};
use blinknet_types::{
    Hash, NodeStateChange, ObligationVote, QuorumSignature, QuorumType, VoteGroup, VotePayload,
    BLINK_SUBQUORUM_SIZE, NUM_BLINK_QUORUMS, PULSE_QUORUM_NUM_VALIDATORS,
};

// ═══════════════════════════════════════════════════════════════════════
// blink.submit
// ═══════════════════════════════════════════════════════════════════════

/// A blink submission: external origination or quorum-member forward.
///
/// Wire keys: `!` originator tag (absent on forwards), `h` authorization
/// height, `q` quorum checksum, `t` tx blob, `#` precomputed tx hash.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlinkSubmission {
    /// Non-zero when an external originator expects replies; zero on
    /// quorum-member forwards.
    pub tag: u64,
    /// Blink authorization height.
    pub height: u64,
    /// Sender's quorum membership checksum.
    pub checksum: u64,
    /// Serialized transaction.
    pub tx_blob: Vec<u8>,
    /// Precomputed transaction hash.
    pub txhash: Hash,
}

impl BlinkSubmission {
    /// Parse from a received dict.
    pub fn from_dict(dict: &WireDict) -> Result<Self, WireError> {
        let txhash = Hash::from_hash_bytes(require_sized_bytes(dict, "#", Hash::BYTES)?)
            .ok_or(WireError::BadSize("#"))?;
        Ok(Self {
            tag: int_or(dict, "!", 0),
            height: require_int(dict, "h")?,
            checksum: require_int(dict, "q")?,
            tx_blob: require_bytes(dict, "t")?.to_vec(),
            txhash,
        })
    }

    /// Serialise for sending. The tag is omitted when zero, since forwards
    /// carry no reply association.
    pub fn to_dict(&self) -> WireDict {
        let mut dict = WireDict::new();
        if self.tag != 0 {
            dict.insert("!".into(), WireValue::Int(self.tag));
        }
        dict.insert("h".into(), WireValue::Int(self.height));
        dict.insert("q".into(), WireValue::Int(self.checksum));
        dict.insert("t".into(), WireValue::Bytes(self.tx_blob.clone()));
        dict.insert(
            "#".into(),
            WireValue::Bytes(self.txhash.as_bytes().to_vec()),
        );
        dict
    }
}

// ═══════════════════════════════════════════════════════════════════════
// quorum.blink_sign
// ═══════════════════════════════════════════════════════════════════════

/// One signature in a [`BlinkSignBundle`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlinkSignatureEntry {
    /// Subquorum index (< [`NUM_BLINK_QUORUMS`]).
    pub subquorum: u8,
    /// Position within the subquorum (< [`BLINK_SUBQUORUM_SIZE`]).
    pub position: u8,
    /// Approval (`true`) or rejection (`false`).
    pub approved: bool,
    /// The validator's signature over the matching signing hash.
    pub signature: QuorumSignature,
}

/// A compact signature bundle: four parallel lists, one entry per signature.
///
/// Wire keys: `h`, `#`, `q` as in [`BlinkSubmission`]; `i` subquorum
/// indices, `p` positions, `r` results, `s` signatures.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlinkSignBundle {
    /// Blink authorization height.
    pub height: u64,
    /// Transaction hash the signatures apply to.
    pub txhash: Hash,
    /// Sender's quorum membership checksum.
    pub checksum: u64,
    /// The signatures.
    pub entries: Vec<BlinkSignatureEntry>,
}

impl BlinkSignBundle {
    /// Parse from a received dict, enforcing parallel-list agreement and
    /// per-entry bounds.
    pub fn from_dict(dict: &WireDict) -> Result<Self, WireError> {
        let txhash = Hash::from_hash_bytes(require_sized_bytes(dict, "#", Hash::BYTES)?)
            .ok_or(WireError::BadSize("#"))?;
        let subquorums = require_list(dict, "i")?;
        let positions = require_list(dict, "p")?;
        let results = require_list(dict, "r")?;
        let signatures = require_list(dict, "s")?;
        let n = subquorums.len();
        if positions.len() != n || results.len() != n || signatures.len() != n {
            return Err(WireError::LengthMismatch);
        }

        let mut entries = Vec::with_capacity(n);
        for i in 0..n {
            let subquorum = subquorums[i].as_int().ok_or(WireError::WrongType("i"))?;
            if subquorum >= NUM_BLINK_QUORUMS as u64 {
                return Err(WireError::BadValue("i"));
            }
            let position = positions[i].as_int().ok_or(WireError::WrongType("p"))?;
            if position >= BLINK_SUBQUORUM_SIZE as u64 {
                return Err(WireError::BadValue("p"));
            }
            let result = results[i].as_int().ok_or(WireError::WrongType("r"))?;
            if result > 1 {
                return Err(WireError::BadValue("r"));
            }
            let sig_bytes = signatures[i].as_bytes().ok_or(WireError::WrongType("s"))?;
            let signature =
                QuorumSignature::from_slice(sig_bytes).ok_or(WireError::BadSize("s"))?;
            entries.push(BlinkSignatureEntry {
                subquorum: subquorum as u8,
                position: position as u8,
                approved: result == 1,
                signature,
            });
        }

        Ok(Self {
            height: require_int(dict, "h")?,
            txhash,
            checksum: require_int(dict, "q")?,
            entries,
        })
    }

    /// Serialise for sending.
    pub fn to_dict(&self) -> WireDict {
        let mut dict = WireDict::new();
        dict.insert("h".into(), WireValue::Int(self.height));
        dict.insert(
            "#".into(),
            WireValue::Bytes(self.txhash.as_bytes().to_vec()),
        );
        dict.insert("q".into(), WireValue::Int(self.checksum));
        dict.insert(
            "i".into(),
            WireValue::List(
                self.entries
                    .iter()
                    .map(|e| WireValue::Int(e.subquorum as u64))
                    .collect(),
            ),
        );
        dict.insert(
            "p".into(),
            WireValue::List(
                self.entries
                    .iter()
                    .map(|e| WireValue::Int(e.position as u64))
                    .collect(),
            ),
        );
        dict.insert(
            "r".into(),
            WireValue::List(
                self.entries
                    .iter()
                    .map(|e| WireValue::Int(e.approved as u64))
                    .collect(),
            ),
        );
        dict.insert(
            "s".into(),
            WireValue::List(
                self.entries
                    .iter()
                    .map(|e| WireValue::Bytes(e.signature.as_bytes().to_vec()))
                    .collect(),
            ),
        );
        dict
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Originator replies
// ═══════════════════════════════════════════════════════════════════════

/// `bl.nostart`: this node did not begin quorum processing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NostartReply {
    /// The originator's tag, echoed back.
    pub tag: u64,
    /// Human-readable reason.
    pub reason: String,
}

impl NostartReply {
    /// Parse from a received dict.
    pub fn from_dict(dict: &WireDict) -> Result<Self, WireError> {
        let reason = require_bytes(dict, "e")?;
        Ok(Self {
            tag: require_int(dict, "!")?,
            reason: String::from_utf8_lossy(reason).into_owned(),
        })
    }

    /// Serialise for sending.
    pub fn to_dict(&self) -> WireDict {
        let mut dict = WireDict::new();
        dict.insert("!".into(), WireValue::Int(self.tag));
        dict.insert(
            "e".into(),
            WireValue::Bytes(self.reason.as_bytes().to_vec()),
        );
        dict
    }
}

/// `bl.good` / `bl.bad`: the quorum reached a decision. Carries only the tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DecisionReply {
    /// The originator's tag, echoed back.
    pub tag: u64,
}

impl DecisionReply {
    /// Parse from a received dict.
    pub fn from_dict(dict: &WireDict) -> Result<Self, WireError> {
        Ok(Self {
            tag: require_int(dict, "!")?,
        })
    }

    /// Serialise for sending.
    pub fn to_dict(&self) -> WireDict {
        let mut dict = WireDict::new();
        dict.insert("!".into(), WireValue::Int(self.tag));
        dict
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Pulse messages
// ═══════════════════════════════════════════════════════════════════════

/// A pulse block-production message, already validated for field presence,
/// signature size, and position bounds.
///
/// The message kind is carried by the command name; each variant shares the
/// flat single-byte key schema (`q` position, `s` signature, plus one
/// kind-specific field).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PulseMessage {
    /// A validator announcing round participation.
    Handshake {
        /// Sender's position in the pulse quorum.
        position: usize,
        /// Signature over the handshake contents.
        signature: QuorumSignature,
    },
    /// The locked-in set of participating validators.
    HandshakeBitset {
        /// One bit per validator position.
        bitset: u16,
        /// Sender's position in the pulse quorum.
        position: usize,
        /// Signature over the bitset.
        signature: QuorumSignature,
    },
    /// The block producer's proposed template.
    BlockTemplate {
        /// Serialized block template.
        template: Vec<u8>,
        /// Block producer's signature over the template.
        signature: QuorumSignature,
    },
    /// Commitment to a random value (entropy commit phase).
    RandomValueHash {
        /// Hash of the validator's random value.
        hash: Hash,
        /// Sender's position in the pulse quorum.
        position: usize,
        /// Signature over the commitment.
        signature: QuorumSignature,
    },
    /// Reveal of the committed random value.
    RandomValue {
        /// The revealed 32-byte value.
        value: [u8; 32],
        /// Sender's position in the pulse quorum.
        position: usize,
        /// Signature over the reveal.
        signature: QuorumSignature,
    },
}

fn pulse_position(dict: &WireDict) -> Result<usize, WireError> {
    let position = require_int(dict, "q")?;
    if position >= PULSE_QUORUM_NUM_VALIDATORS as u64 {
        return Err(WireError::BadValue("q"));
    }
    Ok(position as usize)
}

fn pulse_signature(dict: &WireDict) -> Result<QuorumSignature, WireError> {
    QuorumSignature::from_slice(require_sized_bytes(dict, "s", QuorumSignature::BYTES)?)
        .ok_or(WireError::BadSize("s"))
}

impl PulseMessage {
    /// Parse and validate a pulse message for the given command.
    ///
    /// Returns `None` for commands outside the pulse category.
    pub fn from_command(command: &str, dict: &WireDict) -> Option<Result<Self, WireError>> {
        let result = match command {
            commands::PULSE_VALIDATOR_BIT => pulse_signature(dict).and_then(|signature| {
                Ok(PulseMessage::Handshake {
                    position: pulse_position(dict)?,
                    signature,
                })
            }),
            commands::PULSE_VALIDATOR_BITSET => pulse_signature(dict).and_then(|signature| {
                let bitset = require_int(dict, "b")?;
                if bitset > u16::MAX as u64 {
                    return Err(WireError::BadValue("b"));
                }
                Ok(PulseMessage::HandshakeBitset {
                    bitset: bitset as u16,
                    position: pulse_position(dict)?,
                    signature,
                })
            }),
            commands::PULSE_BLOCK_TEMPLATE => pulse_signature(dict).and_then(|signature| {
                Ok(PulseMessage::BlockTemplate {
                    template: require_bytes(dict, "t")?.to_vec(),
                    signature,
                })
            }),
            commands::PULSE_RANDOM_VALUE_HASH => pulse_signature(dict).and_then(|signature| {
                let hash = Hash::from_hash_bytes(require_sized_bytes(dict, "#", Hash::BYTES)?)
                    .ok_or(WireError::BadSize("#"))?;
                Ok(PulseMessage::RandomValueHash {
                    hash,
                    position: pulse_position(dict)?,
                    signature,
                })
            }),
            commands::PULSE_RANDOM_VALUE => pulse_signature(dict).and_then(|signature| {
                let value: [u8; 32] = require_sized_bytes(dict, "r", 32)?
                    .try_into()
                    .map_err(|_| WireError::BadSize("r"))?;
                Ok(PulseMessage::RandomValue {
                    value,
                    position: pulse_position(dict)?,
                    signature,
                })
            }),
            _ => return None,
        };
        Some(result)
    }

    /// The command this message travels under.
    pub fn command(&self) -> &'static str {
        match self {
            PulseMessage::Handshake { .. } => commands::PULSE_VALIDATOR_BIT,
            PulseMessage::HandshakeBitset { .. } => commands::PULSE_VALIDATOR_BITSET,
            PulseMessage::BlockTemplate { .. } => commands::PULSE_BLOCK_TEMPLATE,
            PulseMessage::RandomValueHash { .. } => commands::PULSE_RANDOM_VALUE_HASH,
            PulseMessage::RandomValue { .. } => commands::PULSE_RANDOM_VALUE,
        }
    }

    /// Sender's quorum position, if the variant carries one (the block
    /// template is identified by the producer's signature alone).
    pub fn position(&self) -> Option<usize> {
        match self {
            PulseMessage::Handshake { position, .. }
            | PulseMessage::HandshakeBitset { position, .. }
            | PulseMessage::RandomValueHash { position, .. }
            | PulseMessage::RandomValue { position, .. } => Some(*position),
            PulseMessage::BlockTemplate { .. } => None,
        }
    }

    /// Serialise for sending.
    pub fn to_dict(&self) -> WireDict {
        let mut dict = WireDict::new();
        match self {
            PulseMessage::Handshake {
                position,
                signature,
            } => {
                dict.insert("q".into(), WireValue::Int(*position as u64));
                dict.insert(
                    "s".into(),
                    WireValue::Bytes(signature.as_bytes().to_vec()),
                );
            }
            PulseMessage::HandshakeBitset {
                bitset,
                position,
                signature,
            } => {
                dict.insert("b".into(), WireValue::Int(*bitset as u64));
                dict.insert("q".into(), WireValue::Int(*position as u64));
                dict.insert(
                    "s".into(),
                    WireValue::Bytes(signature.as_bytes().to_vec()),
                );
            }
            PulseMessage::BlockTemplate {
                template,
                signature,
            } => {
                dict.insert("s".into(), WireValue::Bytes(signature.as_bytes().to_vec()));
                dict.insert("t".into(), WireValue::Bytes(template.clone()));
            }
            PulseMessage::RandomValueHash {
                hash,
                position,
                signature,
            } => {
                dict.insert("#".into(), WireValue::Bytes(hash.as_bytes().to_vec()));
                dict.insert("q".into(), WireValue::Int(*position as u64));
                dict.insert(
                    "s".into(),
                    WireValue::Bytes(signature.as_bytes().to_vec()),
                );
            }
            PulseMessage::RandomValue {
                value,
                position,
                signature,
            } => {
                dict.insert("r".into(), WireValue::Bytes(value.to_vec()));
                dict.insert("q".into(), WireValue::Int(*position as u64));
                dict.insert(
                    "s".into(),
                    WireValue::Bytes(signature.as_bytes().to_vec()),
                );
            }
        }
        dict
    }
}

// ═══════════════════════════════════════════════════════════════════════
// quorum.vote_ob
// ═══════════════════════════════════════════════════════════════════════

/// Serialise an obligation vote.
///
/// Keys: `v` version, `t` quorum type, `h` height, `g` group, `i` index in
/// group, `s` signature; checkpoint votes add `bh`, state-change votes add
/// `wi` and `sc`.
pub fn vote_to_dict(vote: &ObligationVote) -> WireDict {
    let mut dict = WireDict::new();
    dict.insert("v".into(), WireValue::Int(vote.version as u64));
    dict.insert("t".into(), WireValue::Int(vote.vote_type.to_u8() as u64));
    dict.insert("h".into(), WireValue::Int(vote.height));
    dict.insert("g".into(), WireValue::Int(vote.group.to_u8() as u64));
    dict.insert("i".into(), WireValue::Int(vote.index_in_group as u64));
    dict.insert(
        "s".into(),
        WireValue::Bytes(vote.signature.as_bytes().to_vec()),
    );
    match &vote.payload {
        VotePayload::Checkpoint { block_hash } => {
            dict.insert(
                "bh".into(),
                WireValue::Bytes(block_hash.as_bytes().to_vec()),
            );
        }
        VotePayload::StateChange {
            worker_index,
            state,
        } => {
            dict.insert("wi".into(), WireValue::Int(*worker_index as u64));
            dict.insert("sc".into(), WireValue::Int(state.to_u8() as u64));
        }
    }
    dict
}

/// Parse an obligation vote, validating sizes and enum ranges.
pub fn vote_from_dict(dict: &WireDict) -> Result<ObligationVote, WireError> {
    let version = require_int(dict, "v")?;
    if version > u8::MAX as u64 {
        return Err(WireError::BadValue("v"));
    }
    let vote_type = QuorumType::from_u8(
        u8::try_from(require_int(dict, "t")?).map_err(|_| WireError::BadValue("t"))?,
    )
    .ok_or(WireError::BadValue("t"))?;
    let group = VoteGroup::from_u8(
        u8::try_from(require_int(dict, "g")?).map_err(|_| WireError::BadValue("g"))?,
    )
    .ok_or(WireError::BadValue("g"))?;
    let index_in_group =
        u16::try_from(require_int(dict, "i")?).map_err(|_| WireError::BadValue("i"))?;
    let signature =
        QuorumSignature::from_slice(require_sized_bytes(dict, "s", QuorumSignature::BYTES)?)
            .ok_or(WireError::BadSize("s"))?;

    let payload = if vote_type == QuorumType::Checkpointing {
        VotePayload::Checkpoint {
            block_hash: Hash::from_hash_bytes(require_sized_bytes(dict, "bh", Hash::BYTES)?)
                .ok_or(WireError::BadSize("bh"))?,
        }
    } else {
        VotePayload::StateChange {
            worker_index: u16::try_from(require_int(dict, "wi")?)
                .map_err(|_| WireError::BadValue("wi"))?,
            state: NodeStateChange::from_u8(
                u8::try_from(require_int(dict, "sc")?).map_err(|_| WireError::BadValue("sc"))?,
            )
            .ok_or(WireError::BadValue("sc"))?,
        }
    };

    Ok(ObligationVote {
        version: version as u8,
        vote_type,
        height: require_int(dict, "h")?,
        group,
        index_in_group,
        signature,
        payload,
    })
}
