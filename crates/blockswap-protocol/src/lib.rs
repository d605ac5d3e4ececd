//! BitSwap wire codec and response builder for blockswap.
//!
//! - [`ProtocolVersion`] names the three revisions and gates their fields.
//! - [`Message`] is the revision-independent message model with
//!   [`Message::encode`] and [`Message::decode`].
//! - [`OutgoingMessageBuilder`] fills a response up to a byte budget.
//! - [`address`] turns CIDs into storage keys and block prefixes.

pub mod address;
mod builder;
mod error;
mod message;
pub mod pb;
mod version;

pub use builder::{
    OutgoingMessageBuilder, ResponseElement, block_response, have_response, max_block_element_len,
};
pub use error::CodecError;
pub use message::{Block, BlockPresence, BlockPresenceType, Entry, Message, WantList, WantType};
pub use version::ProtocolVersion;

pub use cid::Cid;
