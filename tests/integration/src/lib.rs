//! End-to-end tests for the blockswap listener.
//!
//! Each test binds the real accept loop to an ephemeral TCP port with an
//! in-memory block store behind it, then talks to it as a remote peer would.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Once};

use async_trait::async_trait;
use blockswap_backend::{BackendError, BlockInfo, BlockSource};
use blockswap_core::RecordingMetrics;
use blockswap_engine::server::{dial, serve};
use blockswap_engine::{Connection, FramedConnection, ProcessorConfig, WantlistProcessor};
use blockswap_protocol::address::{RAW, sha256_multihash, storage_key};
use blockswap_protocol::{Cid, Entry, Message, ProtocolVersion, WantList};
use bytes::Bytes;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

mod test_exchange;
mod test_negotiation;

static INIT: Once = Once::new();

/// Initialize tracing (once).
fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .init();
    });
}

/// CIDv1 raw over sha2-256 for `data`.
#[must_use]
pub fn cid_for(data: &[u8]) -> Cid {
    Cid::new_v1(RAW, sha256_multihash(data).expect("sha2-256 digest fits"))
}

/// Block store backed by a map from storage key to bytes.
#[derive(Debug, Default)]
pub struct MemorySource {
    blocks: HashMap<String, Bytes>,
}

impl MemorySource {
    /// Store `data` under the key of its CID.
    #[must_use]
    pub fn with_block(mut self, data: &[u8]) -> Self {
        self.blocks
            .insert(storage_key(&cid_for(data)), Bytes::copy_from_slice(data));
        self
    }
}

#[async_trait]
impl BlockSource for MemorySource {
    async fn fetch_info(&self, key: &str) -> Result<Option<BlockInfo>, BackendError> {
        Ok(self.blocks.get(key).map(|data| BlockInfo {
            offset: 0,
            length: data.len() as u64,
            locator: "us-west-2/memory/blocks.car".to_owned(),
        }))
    }

    async fn fetch_data(&self, key: &str) -> Result<Option<Bytes>, BackendError> {
        Ok(self.blocks.get(key).cloned())
    }
}

/// A listener running on an ephemeral port.
#[derive(Debug)]
pub struct TestServer {
    /// Bound address.
    pub addr: SocketAddr,
    /// Metrics recorded by the processor and listener.
    pub metrics: Arc<RecordingMetrics>,
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl TestServer {
    /// Start serving `source` with `config`.
    pub async fn start(source: MemorySource, config: ProcessorConfig) -> Self {
        init_tracing();
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let metrics = Arc::new(RecordingMetrics::default());
        let processor = Arc::new(WantlistProcessor::new(
            config,
            Arc::new(source),
            metrics.clone(),
        ));
        let (stop, stopped) = oneshot::channel();
        let task = tokio::spawn(serve(listener, processor, async move {
            stopped.await.ok();
        }));
        Self {
            addr,
            metrics,
            stop,
            task,
        }
    }

    /// Open a negotiated stream.
    pub async fn connect(&self, version: ProtocolVersion) -> FramedConnection<TcpStream> {
        let stream = TcpStream::connect(self.addr).await.expect("connect");
        dial(stream, version, 8 * 1024 * 1024)
            .await
            .expect("negotiate")
    }

    /// Send one wantlist and collect every reply until the server closes.
    pub async fn request(&self, version: ProtocolVersion, entries: Vec<Entry>) -> Vec<Message> {
        let conn = self.connect(version).await;
        let request = Message {
            wantlist: WantList {
                entries,
                full: false,
            },
            ..Message::default()
        };
        conn.send(request.encode(version)).await.expect("send wantlist");

        let mut replies = Vec::new();
        while let Some(frame) = conn.receive().await {
            let frame = frame.expect("read reply");
            replies.push(Message::decode(frame, version).expect("decode reply"));
        }
        replies
    }

    /// Stop accepting and wait for open connections to drain.
    pub async fn shutdown(self) {
        self.stop.send(()).ok();
        self.task.await.expect("server task");
    }
}
