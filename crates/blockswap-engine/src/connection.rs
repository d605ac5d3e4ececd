//! The duplex message channel a request is served over.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{Mutex, mpsc};

use crate::error::TransportError;

/// A bidirectional channel of whole encoded messages.
///
/// All methods take `&self` so one connection can be shared by the inbound
/// watcher and the tasks writing responses.
#[async_trait]
pub trait Connection: Send + Sync + fmt::Debug {
    /// Next inbound message. `None` once the peer has closed its side.
    async fn receive(&self) -> Option<Result<Bytes, TransportError>>;

    /// Write one message.
    async fn send(&self, message: Bytes) -> Result<(), TransportError>;

    /// Close the outbound side. Later sends fail with
    /// [`TransportError::Closed`].
    async fn close(&self);
}

/// One end of an in-process connection pair.
///
/// # Examples
///
/// ```
/// # tokio_test_block(async {
/// use blockswap_engine::{Connection, MemoryConnection};
/// use bytes::Bytes;
///
/// let (a, b) = MemoryConnection::pair(4);
/// a.send(Bytes::from_static(b"ping")).await.unwrap();
/// assert_eq!(b.receive().await.unwrap().unwrap(), Bytes::from_static(b"ping"));
/// a.close().await;
/// assert!(b.receive().await.is_none());
/// # });
/// # fn tokio_test_block(f: impl std::future::Future<Output = ()>) {
/// #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f);
/// # }
/// ```
#[derive(Debug)]
pub struct MemoryConnection {
    tx: Mutex<Option<mpsc::Sender<Bytes>>>,
    rx: Mutex<mpsc::Receiver<Bytes>>,
}

impl MemoryConnection {
    /// Two connected ends, each buffering up to `capacity` messages.
    #[must_use]
    pub fn pair(capacity: usize) -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::channel(capacity.max(1));
        let (b_tx, a_rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx: Mutex::new(Some(a_tx)),
                rx: Mutex::new(a_rx),
            },
            Self {
                tx: Mutex::new(Some(b_tx)),
                rx: Mutex::new(b_rx),
            },
        )
    }

    /// Drain every message until the peer closes.
    pub async fn collect(&self) -> Vec<Bytes> {
        let mut messages = Vec::new();
        while let Some(Ok(message)) = self.receive().await {
            messages.push(message);
        }
        messages
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn receive(&self) -> Option<Result<Bytes, TransportError>> {
        self.rx.lock().await.recv().await.map(Ok)
    }

    async fn send(&self, message: Bytes) -> Result<(), TransportError> {
        let tx = self.tx.lock().await.clone().ok_or(TransportError::Closed)?;
        tx.send(message).await.map_err(|_| TransportError::Closed)
    }

    async fn close(&self) {
        self.tx.lock().await.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_should_fail_send_after_close() {
        let (a, _b) = MemoryConnection::pair(1);
        a.close().await;
        let err = a.send(Bytes::from_static(b"late")).await.unwrap_err();
        assert!(matches!(err, TransportError::Closed));
    }

    #[tokio::test]
    async fn test_should_collect_until_peer_closes() {
        let (a, b) = MemoryConnection::pair(4);
        a.send(Bytes::from_static(b"1")).await.unwrap();
        a.send(Bytes::from_static(b"2")).await.unwrap();
        a.close().await;
        assert_eq!(b.collect().await.len(), 2);
    }
}
