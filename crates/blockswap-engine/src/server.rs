//! TCP listener and protocol-id negotiation.
//!
//! A dialer opens a stream and sends one frame holding the protocol id it
//! wants. The listener echoes the id if it speaks that revision and then
//! reads the wantlist; otherwise it answers `na` and closes.

use std::future::Future;
use std::sync::Arc;

use blockswap_core::metrics::names;
use blockswap_protocol::ProtocolVersion;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio_util::codec::Framed;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::connection::Connection;
use crate::error::TransportError;
use crate::framed::{FramedConnection, VarintFrameCodec};
use crate::processor::WantlistProcessor;

/// Reply to a protocol id the listener does not support.
pub const NOT_AVAILABLE: &[u8] = b"na";

/// Read the dialer's protocol id and answer it.
///
/// Returns `None` when the id was refused with `na`.
pub async fn negotiate<T>(
    framed: &mut Framed<T, VarintFrameCodec>,
) -> Result<Option<ProtocolVersion>, TransportError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let frame = framed.next().await.transpose()?.ok_or(TransportError::Closed)?;
    let requested = String::from_utf8_lossy(&frame);
    let requested = requested.trim_end_matches('\n');

    match requested.parse::<ProtocolVersion>() {
        Ok(version) => {
            framed
                .send(Bytes::from_static(version.protocol_id().as_bytes()))
                .await?;
            Ok(Some(version))
        }
        Err(_) => {
            debug!(protocol = requested, "refusing unsupported protocol");
            framed.send(Bytes::from_static(NOT_AVAILABLE)).await?;
            Ok(None)
        }
    }
}

/// Open `version` on a fresh stream from the dialing side.
pub async fn dial<T>(
    io: T,
    version: ProtocolVersion,
    max_frame: usize,
) -> Result<FramedConnection<T>, TransportError>
where
    T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let mut framed = Framed::new(io, VarintFrameCodec::new(max_frame));
    framed
        .send(Bytes::from_static(version.protocol_id().as_bytes()))
        .await?;
    let reply = framed.next().await.transpose()?.ok_or(TransportError::Closed)?;
    if reply.as_ref() != version.protocol_id().as_bytes() {
        return Err(TransportError::ProtocolRejected(version.to_string()));
    }
    Ok(FramedConnection::from_framed(framed))
}

/// Negotiate on `io` and serve one wantlist over it.
pub async fn serve_stream<T>(io: T, processor: &WantlistProcessor) -> Result<(), TransportError>
where
    T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let mut framed = Framed::new(io, VarintFrameCodec::new(processor.config().max_message_size));
    let Some(version) = negotiate(&mut framed).await? else {
        SinkExt::<Bytes>::close(&mut framed).await?;
        return Ok(());
    };

    let connection: Arc<dyn Connection> = Arc::new(FramedConnection::from_framed(framed));
    processor.handle(connection, version).await;
    Ok(())
}

/// Accept connections until `shutdown` resolves, then wait for the
/// connections already accepted to finish.
pub async fn serve(
    listener: TcpListener,
    processor: Arc<WantlistProcessor>,
    shutdown: impl Future<Output = ()>,
) {
    let tracker = TaskTracker::new();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (stream, peer_addr) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(error = %e, "failed to accept connection");
                        continue;
                    }
                };

                let processor = Arc::clone(&processor);
                tracker.spawn(async move {
                    let metrics = Arc::clone(processor.metrics());
                    metrics.increase(names::ACTIVE_CONNECTIONS, 1);
                    debug!(%peer_addr, "connection opened");
                    if let Err(e) = serve_stream(stream, &processor).await {
                        warn!(%peer_addr, error = %e, "connection error");
                    }
                    debug!(%peer_addr, "connection closed");
                    metrics.decrease(names::ACTIVE_CONNECTIONS, 1);
                });
            }

            () = &mut shutdown => {
                info!("shutting down gracefully");
                break;
            }
        }
    }

    tracker.close();
    tracker.wait().await;
    info!("all connections drained");
}
