//! CID normalization, storage keys, and block prefixes.

use cid::{Cid, Version};
use multibase::Base;
use multihash::Multihash;
use prost::encoding::{decode_varint, encode_varint};
use sha2::{Digest, Sha256};

use crate::error::CodecError;

/// Multicodec code of dag-pb, the codec every CIDv0 implies.
pub const DAG_PB: u64 = 0x70;

/// Multicodec code of raw binary blocks.
pub const RAW: u64 = 0x55;

/// Multihash code of sha2-256.
pub const SHA2_256: u64 = 0x12;

/// Backend lookup key for a CID: base58btc multibase of the multihash bytes.
///
/// The key depends only on the multihash, so the v0 and v1 forms of the same
/// content resolve to the same record.
///
/// # Examples
///
/// ```
/// use blockswap_protocol::address::{storage_key, to_v0, to_v1};
/// use blockswap_protocol::Cid;
///
/// let v0: Cid = "QmdfTbBqBPQ7VNxZEYEj14VmRuZBkqFbiwReogJgS1zR1n".parse().unwrap();
/// assert_eq!(storage_key(&v0), "zQmdfTbBqBPQ7VNxZEYEj14VmRuZBkqFbiwReogJgS1zR1n");
/// assert_eq!(storage_key(&to_v1(v0)), storage_key(&v0));
/// assert_eq!(to_v0(to_v1(v0)), v0);
/// ```
#[must_use]
pub fn storage_key(cid: &Cid) -> String {
    multibase::encode(Base::Base58Btc, cid.hash().to_bytes())
}

/// Upgrade a CIDv0 to its v1 dag-pb form. v1 CIDs are returned unchanged.
#[must_use]
pub fn to_v1(cid: Cid) -> Cid {
    match cid.version() {
        Version::V0 => Cid::new_v1(DAG_PB, *cid.hash()),
        Version::V1 => cid,
    }
}

/// Downgrade to CIDv0 when the CID is dag-pb over a sha2-256 hash.
///
/// Anything else has no v0 form and is returned unchanged.
#[must_use]
pub fn to_v0(cid: Cid) -> Cid {
    if cid.version() == Version::V1 && cid.codec() == DAG_PB {
        Cid::new_v0(*cid.hash()).unwrap_or(cid)
    } else {
        cid
    }
}

/// Parse a binary CID.
pub fn parse_cid(bytes: &[u8]) -> Result<Cid, CodecError> {
    Cid::try_from(bytes).map_err(|e| CodecError::InvalidCid(e.to_string()))
}

/// Encode the block prefix for a CID: varints of version, codec, hash code
/// and digest length.
#[must_use]
pub fn block_prefix(cid: &Cid) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(4);
    let version = match cid.version() {
        Version::V0 => 0,
        Version::V1 => 1,
    };
    encode_varint(version, &mut prefix);
    encode_varint(cid.codec(), &mut prefix);
    encode_varint(cid.hash().code(), &mut prefix);
    encode_varint(u64::from(cid.hash().size()), &mut prefix);
    prefix
}

/// Rebuild the CID of `data` from its block prefix. Only sha2-256 is
/// supported.
pub fn cid_from_prefix(prefix: &[u8], data: &[u8]) -> Result<Cid, CodecError> {
    let mut buf = prefix;
    let mut next = |field: &str| {
        decode_varint(&mut buf).map_err(|_| CodecError::InvalidPrefix(format!("truncated {field}")))
    };
    let version = next("version")?;
    let codec = next("codec")?;
    let hash_code = next("hash code")?;
    let hash_len = next("hash length")?;

    if hash_code != SHA2_256 || hash_len != 32 {
        return Err(CodecError::InvalidPrefix(format!(
            "unsupported multihash 0x{hash_code:x}/{hash_len}"
        )));
    }

    let hash = sha256_multihash(data)?;
    match version {
        0 => Cid::new_v0(hash).map_err(|e| CodecError::InvalidCid(e.to_string())),
        1 => Ok(Cid::new_v1(codec, hash)),
        other => Err(CodecError::InvalidPrefix(format!("unknown CID version {other}"))),
    }
}

/// sha2-256 multihash of `data`.
pub fn sha256_multihash(data: &[u8]) -> Result<Multihash<64>, CodecError> {
    let digest = Sha256::digest(data);
    Multihash::wrap(SHA2_256, &digest).map_err(|e| CodecError::InvalidCid(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_cid(data: &[u8]) -> Cid {
        Cid::new_v1(RAW, sha256_multihash(data).unwrap())
    }

    #[test]
    fn test_should_encode_four_byte_prefix_for_common_cids() {
        assert_eq!(block_prefix(&raw_cid(b"abc")), vec![1, 0x55, 0x12, 0x20]);
        let v0 = Cid::new_v0(sha256_multihash(b"abc").unwrap()).unwrap();
        assert_eq!(block_prefix(&v0), vec![0, 0x70, 0x12, 0x20]);
    }

    #[test]
    fn test_should_rebuild_cid_from_prefix_and_data() {
        let cid = raw_cid(b"hello world");
        let rebuilt = cid_from_prefix(&block_prefix(&cid), b"hello world").unwrap();
        assert_eq!(rebuilt, cid);
    }

    #[test]
    fn test_should_reject_truncated_prefix() {
        let err = cid_from_prefix(&[1, 0x55], b"x").unwrap_err();
        assert!(matches!(err, CodecError::InvalidPrefix(_)));
    }

    #[test]
    fn test_should_leave_raw_cid_untouched_when_downgrading() {
        let cid = raw_cid(b"raw");
        assert_eq!(to_v0(cid), cid);
    }

    #[test]
    fn test_should_share_storage_key_between_codecs_with_same_hash() {
        let hash = sha256_multihash(b"same").unwrap();
        let a = Cid::new_v1(RAW, hash);
        let b = Cid::new_v1(DAG_PB, hash);
        assert_eq!(storage_key(&a), storage_key(&b));
        assert!(storage_key(&a).starts_with("zQm"));
    }
}
