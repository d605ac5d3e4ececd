//! Fakes shared by the engine's unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use blockswap_backend::{BackendError, BlockInfo, BlockSource};
use blockswap_protocol::Cid;
use blockswap_protocol::address::{RAW, sha256_multihash, storage_key};
use bytes::Bytes;

use crate::connection::{Connection, MemoryConnection};
use crate::error::TransportError;

pub(crate) fn cid_for(data: &[u8]) -> Cid {
    Cid::new_v1(RAW, sha256_multihash(data).unwrap())
}

/// In-memory block store keyed like the real backend.
#[derive(Debug, Default)]
pub(crate) struct FakeSource {
    blocks: HashMap<String, Bytes>,
    failing: HashSet<String>,
    delays: HashMap<String, Duration>,
    calls: AtomicUsize,
}

impl FakeSource {
    pub(crate) fn with_block(mut self, data: &'static [u8]) -> Self {
        self.blocks
            .insert(storage_key(&cid_for(data)), Bytes::from_static(data));
        self
    }

    pub(crate) fn with_failure(mut self, cid: &Cid) -> Self {
        self.failing.insert(storage_key(cid));
        self
    }

    pub(crate) fn with_delay(mut self, cid: &Cid, delay: Duration) -> Self {
        self.delays.insert(storage_key(cid), delay);
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn lookup(&self, key: &str) -> Result<Option<Bytes>, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delays.get(key) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing.contains(key) {
            return Err(BackendError::Client(format!("injected failure for {key}")));
        }
        Ok(self.blocks.get(key).cloned())
    }
}

#[async_trait]
impl BlockSource for FakeSource {
    async fn fetch_info(&self, key: &str) -> Result<Option<BlockInfo>, BackendError> {
        Ok(self.lookup(key).await?.map(|data| BlockInfo {
            offset: 0,
            length: data.len() as u64,
            locator: "us-west-2/fake/blocks.car".to_owned(),
        }))
    }

    async fn fetch_data(&self, key: &str) -> Result<Option<Bytes>, BackendError> {
        self.lookup(key).await
    }
}

/// Wraps one end of a memory pair and counts sends and closes.
#[derive(Debug)]
pub(crate) struct CountingConnection {
    inner: MemoryConnection,
    fail_sends: bool,
    sends: AtomicUsize,
    closes: AtomicUsize,
}

impl CountingConnection {
    pub(crate) fn pair() -> (Arc<Self>, MemoryConnection) {
        Self::build(false)
    }

    /// Every send fails with [`TransportError::Closed`].
    pub(crate) fn failing() -> (Arc<Self>, MemoryConnection) {
        Self::build(true)
    }

    fn build(fail_sends: bool) -> (Arc<Self>, MemoryConnection) {
        let (server, client) = MemoryConnection::pair(64);
        let conn = Arc::new(Self {
            inner: server,
            fail_sends,
            sends: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
        });
        (conn, client)
    }

    pub(crate) fn sends(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }

    pub(crate) fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connection for CountingConnection {
    async fn receive(&self) -> Option<Result<Bytes, TransportError>> {
        self.inner.receive().await
    }

    async fn send(&self, message: Bytes) -> Result<(), TransportError> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        if self.fail_sends {
            return Err(TransportError::Closed);
        }
        self.inner.send(message).await
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.inner.close().await;
    }
}
