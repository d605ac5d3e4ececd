//! The lookup seam the wantlist processor depends on.

use async_trait::async_trait;
use bytes::Bytes;

use crate::client::BackendClient;
use crate::error::BackendError;
use crate::types::BlockInfo;

/// Resolves storage keys to block metadata and block bytes.
///
/// `Ok(None)` means the block is unknown; errors mean the lookup could not
/// be completed.
#[async_trait]
pub trait BlockSource: Send + Sync + std::fmt::Debug {
    /// Metadata for `key`, used to answer `Have` wants.
    async fn fetch_info(&self, key: &str) -> Result<Option<BlockInfo>, BackendError>;

    /// Bytes for `key`, used to answer `Block` wants.
    async fn fetch_data(&self, key: &str) -> Result<Option<Bytes>, BackendError>;
}

#[async_trait]
impl BlockSource for BackendClient {
    async fn fetch_info(&self, key: &str) -> Result<Option<BlockInfo>, BackendError> {
        self.get_metadata_by_key(key).await
    }

    async fn fetch_data(&self, key: &str) -> Result<Option<Bytes>, BackendError> {
        match self.get_metadata_by_key(key).await? {
            Some(info) => self.fetch_bytes(&info.locator, info.offset, info.length).await,
            None => Ok(None),
        }
    }
}
