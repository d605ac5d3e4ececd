//! BitSwap protocol revisions.

use std::fmt;
use std::str::FromStr;

use crate::error::CodecError;

/// A BitSwap protocol revision.
///
/// Each revision gates a different subset of the wire schema; see
/// [`crate::Message::encode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProtocolVersion {
    /// `/ipfs/bitswap/1.0.0`: bare blocks, CIDv0 entries, no want types.
    V100,
    /// `/ipfs/bitswap/1.1.0`: prefixed blocks and want types.
    V110,
    /// `/ipfs/bitswap/1.2.0`: presences and pending bytes.
    V120,
}

impl ProtocolVersion {
    /// Every supported revision, newest first.
    pub const ALL: [Self; 3] = [Self::V120, Self::V110, Self::V100];

    /// The protocol identifier negotiated on the stream.
    #[must_use]
    pub fn protocol_id(&self) -> &'static str {
        match self {
            Self::V100 => "/ipfs/bitswap/1.0.0",
            Self::V110 => "/ipfs/bitswap/1.1.0",
            Self::V120 => "/ipfs/bitswap/1.2.0",
        }
    }

    /// Whether `Have` wants and presences exist in this revision.
    #[must_use]
    pub fn supports_presences(&self) -> bool {
        matches!(self, Self::V120)
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.protocol_id())
    }
}

impl FromStr for ProtocolVersion {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|v| v.protocol_id() == s)
            .ok_or_else(|| CodecError::UnsupportedProtocol(s.to_owned()))
    }
}
