//! Protocol-level message types and their per-revision wire mapping.
//!
//! Every revision shares [`crate::pb`]. Encoding and decoding match on
//! [`ProtocolVersion`] exhaustively, so a field only reaches the wire in the
//! revisions that define it.

use bytes::Bytes;
use cid::Cid;
use prost::Message as _;
use tracing::warn;

use crate::address::{block_prefix, cid_from_prefix, parse_cid, to_v0, to_v1};
use crate::error::CodecError;
use crate::pb;
use crate::version::ProtocolVersion;

/// What the peer wants back for an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WantType {
    /// The block itself.
    #[default]
    Block,
    /// Only whether the block exists.
    Have,
}

/// One wantlist line item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Requested content.
    pub cid: Cid,
    /// Priority in `[0, i32::MAX]`.
    pub priority: i32,
    /// Revokes an earlier want for the same CID.
    pub cancel: bool,
    /// Requested response kind.
    pub want_type: WantType,
    /// Answer a miss with `DontHave`.
    pub send_dont_have: bool,
}

impl Entry {
    /// A `Block` want with default priority.
    #[must_use]
    pub fn want_block(cid: Cid) -> Self {
        Self {
            cid,
            priority: 1,
            cancel: false,
            want_type: WantType::Block,
            send_dont_have: false,
        }
    }

    /// A `Have` want with default priority.
    #[must_use]
    pub fn want_have(cid: Cid) -> Self {
        Self {
            want_type: WantType::Have,
            ..Self::want_block(cid)
        }
    }

    /// A cancellation for `cid`.
    #[must_use]
    pub fn cancel(cid: Cid) -> Self {
        Self {
            cancel: true,
            ..Self::want_block(cid)
        }
    }

    /// Set the `send_dont_have` flag.
    #[must_use]
    pub fn with_send_dont_have(mut self, send_dont_have: bool) -> Self {
        self.send_dont_have = send_dont_have;
        self
    }
}

/// A peer's wantlist.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WantList {
    /// Entries in wire order.
    pub entries: Vec<Entry>,
    /// Complete replacement of the peer's wanted set.
    pub full: bool,
}

/// A block with the prefix needed to rebuild its CID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Varint CID version, codec, hash code and hash length.
    pub prefix: Bytes,
    /// Payload.
    pub data: Bytes,
}

impl Block {
    /// Wrap `data` fetched for `cid`.
    #[must_use]
    pub fn new(cid: &Cid, data: Bytes) -> Self {
        Self {
            prefix: Bytes::from(block_prefix(cid)),
            data,
        }
    }

    /// Rebuild the CID from prefix and payload (sha2-256 only).
    pub fn cid(&self) -> Result<Cid, CodecError> {
        cid_from_prefix(&self.prefix, &self.data)
    }
}

/// Presence answer kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockPresenceType {
    /// The block is available.
    Have,
    /// The block is not available.
    DontHave,
}

/// A have/don't-have answer for one CID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockPresence {
    /// Subject of the answer.
    pub cid: Cid,
    /// Answer.
    pub presence_type: BlockPresenceType,
}

/// A decoded or to-be-encoded BitSwap message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    /// Wantlist; empty on responses.
    pub wantlist: WantList,
    /// Blocks.
    pub blocks: Vec<Block>,
    /// Presences (1.2.0 only).
    pub block_presences: Vec<BlockPresence>,
    /// Bytes still queued by the sender (1.2.0 only).
    pub pending_bytes: i32,
    /// Entries and presences skipped while decoding because their CID did
    /// not parse. Never encoded.
    pub rejected: usize,
}

/// Prefix assumed for bare 1.0.0 blocks: CIDv1 dag-pb over sha2-256.
const LEGACY_BLOCK_PREFIX: [u8; 4] = [1, 0x70, 0x12, 0x20];

impl Message {
    /// Whether there is nothing to send back.
    #[must_use]
    pub fn has_no_elements(&self) -> bool {
        self.blocks.is_empty() && self.block_presences.is_empty()
    }

    /// Encode for `version`, dropping fields the revision does not define.
    #[must_use]
    pub fn encode(&self, version: ProtocolVersion) -> Bytes {
        let wire = match version {
            ProtocolVersion::V100 => pb::Message {
                wantlist: self.wire_wantlist(|entry| pb::Entry {
                    block: Bytes::from(to_v0(entry.cid).to_bytes()),
                    priority: entry.priority,
                    cancel: entry.cancel,
                    ..pb::Entry::default()
                }),
                blocks: self.blocks.iter().map(|b| b.data.clone()).collect(),
                ..pb::Message::default()
            },
            ProtocolVersion::V110 => pb::Message {
                wantlist: self.wire_wantlist(full_entry),
                payload: self.wire_payload(),
                ..pb::Message::default()
            },
            ProtocolVersion::V120 => pb::Message {
                wantlist: self.wire_wantlist(full_entry),
                payload: self.wire_payload(),
                block_presences: self
                    .block_presences
                    .iter()
                    .map(|p| pb::BlockPresence {
                        cid: Bytes::from(p.cid.to_bytes()),
                        r#type: match p.presence_type {
                            BlockPresenceType::Have => pb::BlockPresenceType::Have,
                            BlockPresenceType::DontHave => pb::BlockPresenceType::DontHave,
                        } as i32,
                    })
                    .collect(),
                pending_bytes: self.pending_bytes,
                ..pb::Message::default()
            },
        };
        Bytes::from(wire.encode_to_vec())
    }

    /// Decode bytes received under `version`.
    ///
    /// Malformed protobuf is an error. Entries and presences whose CID does
    /// not parse are skipped and counted in [`Message::rejected`].
    pub fn decode(bytes: Bytes, version: ProtocolVersion) -> Result<Self, CodecError> {
        let wire = pb::Message::decode(bytes)?;
        let mut rejected = 0;

        let mut wantlist = WantList::default();
        if let Some(list) = wire.wantlist {
            wantlist.full = list.full;
            for raw in &list.entries {
                match parse_cid(&raw.block) {
                    Ok(cid) => wantlist.entries.push(decode_entry(raw, cid, version)),
                    Err(e) => {
                        warn!(error = %e, "skipping wantlist entry");
                        rejected += 1;
                    }
                }
            }
        }

        let mut message = Self {
            wantlist,
            rejected,
            ..Self::default()
        };

        match version {
            ProtocolVersion::V100 => {
                message.blocks = wire
                    .blocks
                    .into_iter()
                    .map(|data| Block {
                        prefix: Bytes::from_static(&LEGACY_BLOCK_PREFIX),
                        data,
                    })
                    .collect();
            }
            ProtocolVersion::V110 => {
                message.blocks = decode_payload(wire.payload);
            }
            ProtocolVersion::V120 => {
                message.blocks = decode_payload(wire.payload);
                message.pending_bytes = wire.pending_bytes;
                for raw in &wire.block_presences {
                    let Ok(cid) = parse_cid(&raw.cid) else {
                        warn!("skipping block presence with invalid CID");
                        message.rejected += 1;
                        continue;
                    };
                    let presence_type = match pb::BlockPresenceType::try_from(raw.r#type) {
                        Ok(pb::BlockPresenceType::DontHave) => BlockPresenceType::DontHave,
                        _ => BlockPresenceType::Have,
                    };
                    message.block_presences.push(BlockPresence { cid, presence_type });
                }
            }
        }

        Ok(message)
    }

    fn wire_wantlist(&self, entry: impl Fn(&Entry) -> pb::Entry) -> Option<pb::Wantlist> {
        if self.wantlist.entries.is_empty() && !self.wantlist.full {
            return None;
        }
        Some(pb::Wantlist {
            entries: self.wantlist.entries.iter().map(entry).collect(),
            full: self.wantlist.full,
        })
    }

    fn wire_payload(&self) -> Vec<pb::Block> {
        self.blocks
            .iter()
            .map(|b| pb::Block {
                prefix: b.prefix.clone(),
                data: b.data.clone(),
            })
            .collect()
    }
}

fn full_entry(entry: &Entry) -> pb::Entry {
    pb::Entry {
        block: Bytes::from(entry.cid.to_bytes()),
        priority: entry.priority,
        cancel: entry.cancel,
        want_type: match entry.want_type {
            WantType::Block => pb::WantType::Block,
            WantType::Have => pb::WantType::Have,
        } as i32,
        send_dont_have: entry.send_dont_have,
    }
}

fn decode_entry(raw: &pb::Entry, cid: Cid, version: ProtocolVersion) -> Entry {
    let priority = raw.priority.max(0);
    match version {
        ProtocolVersion::V100 => Entry {
            cid: to_v1(cid),
            priority,
            cancel: raw.cancel,
            want_type: WantType::Block,
            send_dont_have: false,
        },
        ProtocolVersion::V110 | ProtocolVersion::V120 => Entry {
            cid,
            priority,
            cancel: raw.cancel,
            want_type: match pb::WantType::try_from(raw.want_type) {
                Ok(pb::WantType::Have) => WantType::Have,
                _ => WantType::Block,
            },
            send_dont_have: raw.send_dont_have,
        },
    }
}

fn decode_payload(payload: Vec<pb::Block>) -> Vec<Block> {
    payload
        .into_iter()
        .map(|b| Block {
            prefix: b.prefix,
            data: b.data,
        })
        .collect()
}
