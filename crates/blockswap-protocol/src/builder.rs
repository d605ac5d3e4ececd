//! Size-bounded construction of response messages.
//!
//! The builder never re-encodes to learn its size. Each element's
//! contribution is computed from the 1.2.0 layout, the richest revision:
//! its tag, its length varint, and its encoded body. Older revisions encode
//! the same element in at most as many bytes, so the running size is an
//! upper bound for them and exact for 1.2.0.

use bytes::Bytes;
use prost::Message as _;
use prost::encoding::{encoded_len_varint, key_len};

use crate::message::{Block, BlockPresence, BlockPresenceType, Entry, Message};
use crate::pb;
use crate::version::ProtocolVersion;

const PAYLOAD_TAG: u32 = 3;
const PRESENCE_TAG: u32 = 4;
const PREFIX_TAG: u32 = 1;
const DATA_TAG: u32 = 2;

/// Version, codec, hash code and digest length, each a varint of at most
/// ten bytes.
const MAX_PREFIX_LEN: usize = 40;

/// Upper bound on the bytes a block of `data_len` bytes adds to a message,
/// whatever its CID.
///
/// A block whose data is at most `n` bytes always fits an empty message of
/// `max_block_element_len(n)` bytes.
#[must_use]
pub fn max_block_element_len(data_len: usize) -> usize {
    let inner = key_len(PREFIX_TAG)
        + encoded_len_varint(MAX_PREFIX_LEN as u64)
        + MAX_PREFIX_LEN
        + key_len(DATA_TAG)
        + encoded_len_varint(data_len as u64)
        + data_len;
    OutgoingMessageBuilder::element_len(PAYLOAD_TAG, inner)
}

/// One element of a response message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseElement {
    /// A block payload.
    Block(Block),
    /// A presence answer.
    Presence(BlockPresence),
}

/// Response for a `Block` want given the fetched bytes.
///
/// A hit yields the block. A miss yields `DontHave` only when the peer asked
/// for it and the revision has presences; otherwise nothing.
///
/// # Examples
///
/// ```
/// use blockswap_protocol::{Entry, ProtocolVersion, ResponseElement, block_response};
/// use blockswap_protocol::Cid;
///
/// let cid: Cid = "QmdfTbBqBPQ7VNxZEYEj14VmRuZBkqFbiwReogJgS1zR1n".parse().unwrap();
/// let entry = Entry::want_block(cid).with_send_dont_have(true);
/// assert!(matches!(
///     block_response(&entry, None, ProtocolVersion::V120),
///     Some(ResponseElement::Presence(_))
/// ));
/// assert!(block_response(&entry, None, ProtocolVersion::V110).is_none());
/// ```
#[must_use]
pub fn block_response(
    entry: &Entry,
    data: Option<Bytes>,
    version: ProtocolVersion,
) -> Option<ResponseElement> {
    match data {
        Some(data) => Some(ResponseElement::Block(Block::new(&entry.cid, data))),
        None if entry.send_dont_have && version.supports_presences() => {
            Some(presence(entry, BlockPresenceType::DontHave))
        }
        None => None,
    }
}

/// Response for a `Have` want given whether the block exists.
///
/// Revisions without presences never answer.
#[must_use]
pub fn have_response(entry: &Entry, found: bool, version: ProtocolVersion) -> Option<ResponseElement> {
    if !version.supports_presences() {
        return None;
    }
    if found {
        Some(presence(entry, BlockPresenceType::Have))
    } else if entry.send_dont_have {
        Some(presence(entry, BlockPresenceType::DontHave))
    } else {
        None
    }
}

fn presence(entry: &Entry, presence_type: BlockPresenceType) -> ResponseElement {
    ResponseElement::Presence(BlockPresence {
        cid: entry.cid,
        presence_type,
    })
}

/// Accumulates blocks and presences while keeping the encoded size within
/// `max_size`.
#[derive(Debug, Clone)]
pub struct OutgoingMessageBuilder {
    max_size: usize,
    size: usize,
    message: Message,
}

impl OutgoingMessageBuilder {
    /// Start an empty response message.
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            size: 0,
            message: Message::default(),
        }
    }

    /// Current encoded size upper bound.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Configured limit.
    #[must_use]
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Whether nothing has been added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.message.has_no_elements()
    }

    /// Add a block. Returns `false` without changing anything if it would
    /// push the message past the limit.
    pub fn add_block(&mut self, block: Block) -> bool {
        let inner = pb::Block {
            prefix: block.prefix.clone(),
            data: block.data.clone(),
        }
        .encoded_len();
        if !self.fits(PAYLOAD_TAG, inner) {
            return false;
        }
        self.grow(PAYLOAD_TAG, inner);
        self.message.blocks.push(block);
        true
    }

    /// Add a presence. Same contract as [`Self::add_block`].
    pub fn add_presence(&mut self, presence: BlockPresence) -> bool {
        let inner = pb::BlockPresence {
            cid: Bytes::from(presence.cid.to_bytes()),
            r#type: match presence.presence_type {
                BlockPresenceType::Have => pb::BlockPresenceType::Have,
                BlockPresenceType::DontHave => pb::BlockPresenceType::DontHave,
            } as i32,
        }
        .encoded_len();
        if !self.fits(PRESENCE_TAG, inner) {
            return false;
        }
        self.grow(PRESENCE_TAG, inner);
        self.message.block_presences.push(presence);
        true
    }

    /// Add either kind of element.
    pub fn add(&mut self, element: ResponseElement) -> bool {
        match element {
            ResponseElement::Block(block) => self.add_block(block),
            ResponseElement::Presence(presence) => self.add_presence(presence),
        }
    }

    /// Take the accumulated message, leaving the builder empty.
    pub fn take(&mut self) -> Message {
        self.size = 0;
        std::mem::take(&mut self.message)
    }

    fn element_len(tag: u32, inner: usize) -> usize {
        key_len(tag) + encoded_len_varint(inner as u64) + inner
    }

    fn fits(&self, tag: u32, inner: usize) -> bool {
        self.size + Self::element_len(tag, inner) <= self.max_size
    }

    fn grow(&mut self, tag: u32, inner: usize) {
        self.size += Self::element_len(tag, inner);
    }
}

#[cfg(test)]
mod tests {
    use cid::Cid;

    use super::*;
    use crate::address::{RAW, sha256_multihash};

    fn block_of(len: usize, seed: u8) -> Block {
        let data = vec![seed; len];
        let cid = Cid::new_v1(RAW, sha256_multihash(&data).unwrap());
        Block::new(&cid, Bytes::from(data))
    }

    fn presence_of(seed: u8, presence_type: BlockPresenceType) -> BlockPresence {
        BlockPresence {
            cid: Cid::new_v1(RAW, sha256_multihash(&[seed]).unwrap()),
            presence_type,
        }
    }

    #[test]
    fn test_should_track_exact_encoded_size() {
        let mut builder = OutgoingMessageBuilder::new(1 << 20);
        assert!(builder.add_block(block_of(100, 1)));
        assert!(builder.add_block(block_of(0, 2)));
        assert!(builder.add_presence(presence_of(3, BlockPresenceType::Have)));
        assert!(builder.add_presence(presence_of(4, BlockPresenceType::DontHave)));
        assert!(builder.add_block(block_of(300, 5)));

        let size = builder.size();
        let encoded = builder.take().encode(ProtocolVersion::V120);
        assert_eq!(encoded.len(), size);
    }

    #[test]
    fn test_should_bound_older_versions_by_newest_size() {
        let mut builder = OutgoingMessageBuilder::new(1 << 20);
        for seed in 0..10 {
            assert!(builder.add_block(block_of(usize::from(seed) * 37, seed)));
        }
        let size = builder.size();
        let message = builder.take();
        assert!(message.encode(ProtocolVersion::V110).len() <= size);
        assert!(message.encode(ProtocolVersion::V100).len() <= size);
    }

    #[test]
    fn test_should_refuse_overflowing_element_without_mutation() {
        let mut builder = OutgoingMessageBuilder::new(200);
        assert!(builder.add_block(block_of(100, 1)));
        let before = builder.size();

        assert!(!builder.add_block(block_of(100, 2)));
        assert_eq!(builder.size(), before);
        assert_eq!(builder.take().blocks.len(), 1);
    }

    #[test]
    fn test_should_never_exceed_limit_across_many_additions() {
        let max = 1_000;
        let mut builder = OutgoingMessageBuilder::new(max);
        let mut messages = Vec::new();
        for seed in 0..200_u8 {
            let element = if seed % 3 == 0 {
                ResponseElement::Presence(presence_of(seed, BlockPresenceType::DontHave))
            } else {
                ResponseElement::Block(block_of(usize::from(seed % 50) * 7, seed))
            };
            if !builder.add(element.clone()) {
                messages.push(builder.take());
                assert!(builder.add(element));
            }
            assert!(builder.size() <= max);
        }
        messages.push(builder.take());

        for message in &messages {
            assert!(message.encode(ProtocolVersion::V120).len() <= max);
        }
        let total: usize = messages
            .iter()
            .map(|m| m.blocks.len() + m.block_presences.len())
            .sum();
        assert_eq!(total, 200);
    }

    #[test]
    fn test_should_fit_block_in_message_of_its_max_element_len() {
        for len in [0, 1, 127, 128, 16_383, 16_384, 100_000] {
            let bound = max_block_element_len(len);
            let mut builder = OutgoingMessageBuilder::new(bound);
            assert!(builder.add_block(block_of(len, 7)), "block of {len} bytes");
            assert!(builder.size() <= bound);
        }
        assert!(max_block_element_len(1024) > 1024 + 16);
    }

    #[test]
    fn test_should_reset_after_take() {
        let mut builder = OutgoingMessageBuilder::new(1_000);
        builder.add_block(block_of(10, 1));
        builder.take();
        assert_eq!(builder.size(), 0);
        assert!(builder.is_empty());
    }

    #[test]
    fn test_should_answer_have_wants_by_hit_and_flag() {
        let cid = Cid::new_v1(RAW, sha256_multihash(b"h").unwrap());
        let plain = Entry::want_have(cid);
        let with_flag = Entry::want_have(cid).with_send_dont_have(true);

        assert!(matches!(
            have_response(&plain, true, ProtocolVersion::V120),
            Some(ResponseElement::Presence(BlockPresence { presence_type: BlockPresenceType::Have, .. }))
        ));
        assert!(have_response(&plain, false, ProtocolVersion::V120).is_none());
        assert!(matches!(
            have_response(&with_flag, false, ProtocolVersion::V120),
            Some(ResponseElement::Presence(BlockPresence { presence_type: BlockPresenceType::DontHave, .. }))
        ));
        assert!(have_response(&with_flag, true, ProtocolVersion::V100).is_none());
    }

    #[test]
    fn test_should_answer_block_want_hit_with_block() {
        let data = Bytes::from_static(b"block");
        let cid = Cid::new_v1(RAW, sha256_multihash(&data).unwrap());
        let entry = Entry::want_block(cid);

        let Some(ResponseElement::Block(block)) =
            block_response(&entry, Some(data.clone()), ProtocolVersion::V100)
        else {
            panic!("expected a block");
        };
        assert_eq!(block.data, data);
        assert_eq!(block.cid().unwrap(), cid);
        assert!(block_response(&entry, None, ProtocolVersion::V120).is_none());
    }
}
