//! Protobuf schema shared by every BitSwap revision.
//!
//! Each revision reads and writes a subset of these fields; the subset is
//! chosen in [`crate::message`].

use bytes::Bytes;

/// Top-level wire message.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Message {
    /// Wantlist; absent on responses.
    #[prost(message, optional, tag = "1")]
    pub wantlist: Option<Wantlist>,
    /// Bare block payloads (1.0.0).
    #[prost(bytes = "bytes", repeated, tag = "2")]
    pub blocks: Vec<Bytes>,
    /// Prefixed block payloads (1.1.0 and later).
    #[prost(message, repeated, tag = "3")]
    pub payload: Vec<Block>,
    /// Presences (1.2.0).
    #[prost(message, repeated, tag = "4")]
    pub block_presences: Vec<BlockPresence>,
    /// Bytes the sender still has queued (1.2.0).
    #[prost(int32, tag = "5")]
    pub pending_bytes: i32,
}

/// Wire wantlist.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Wantlist {
    /// Entries.
    #[prost(message, repeated, tag = "1")]
    pub entries: Vec<Entry>,
    /// Whether this replaces the peer's full wantlist.
    #[prost(bool, tag = "2")]
    pub full: bool,
}

/// Wire wantlist entry.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Entry {
    /// Binary CID.
    #[prost(bytes = "bytes", tag = "1")]
    pub block: Bytes,
    /// Priority.
    #[prost(int32, tag = "2")]
    pub priority: i32,
    /// Revokes a previous want.
    #[prost(bool, tag = "3")]
    pub cancel: bool,
    /// [`WantType`] (1.1.0 and later).
    #[prost(enumeration = "WantType", tag = "4")]
    pub want_type: i32,
    /// Ask for a `DontHave` on miss (1.1.0 and later).
    #[prost(bool, tag = "5")]
    pub send_dont_have: bool,
}

/// Wire want type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, prost::Enumeration)]
#[repr(i32)]
pub enum WantType {
    /// Send the block.
    Block = 0,
    /// Send a presence.
    Have = 1,
}

/// Wire block with CID prefix.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Block {
    /// CID version, codec, hash code and hash length as varints.
    #[prost(bytes = "bytes", tag = "1")]
    pub prefix: Bytes,
    /// Block payload.
    #[prost(bytes = "bytes", tag = "2")]
    pub data: Bytes,
}

/// Wire block presence.
#[derive(Clone, PartialEq, prost::Message)]
pub struct BlockPresence {
    /// Binary CID.
    #[prost(bytes = "bytes", tag = "1")]
    pub cid: Bytes,
    /// [`BlockPresenceType`].
    #[prost(enumeration = "BlockPresenceType", tag = "2")]
    pub r#type: i32,
}

/// Wire presence type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, prost::Enumeration)]
#[repr(i32)]
pub enum BlockPresenceType {
    /// The block is available.
    Have = 0,
    /// The block is not available.
    DontHave = 1,
}
