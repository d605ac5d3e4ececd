//! Unsigned-varint length-prefixed framing over any byte stream.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::{Buf, Bytes, BytesMut};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use prost::encoding::{encode_varint, encoded_len_varint};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio_util::codec::{Decoder, Encoder, Framed};
use tracing::debug;

use crate::connection::Connection;
use crate::error::TransportError;

/// A u64 varint never takes more than ten bytes.
const MAX_VARINT_LEN: usize = 10;

/// Codec for `varint(len) || payload` frames.
///
/// Frames longer than `max_frame` are rejected in both directions.
#[derive(Debug, Clone, Copy)]
pub struct VarintFrameCodec {
    max_frame: usize,
}

impl VarintFrameCodec {
    /// Codec accepting frames of up to `max_frame` payload bytes.
    #[must_use]
    pub fn new(max_frame: usize) -> Self {
        Self { max_frame }
    }

    /// Largest accepted payload.
    #[must_use]
    pub fn max_frame(&self) -> usize {
        self.max_frame
    }
}

impl Decoder for VarintFrameCodec {
    type Item = Bytes;
    type Error = TransportError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, TransportError> {
        let Some((len, header)) = peek_varint(src)? else {
            return Ok(None);
        };
        let frame_len = usize::try_from(len)
            .ok()
            .filter(|l| *l <= self.max_frame)
            .ok_or(TransportError::FrameTooLarge {
                len,
                max: self.max_frame,
            })?;

        let needed = header + frame_len;
        if src.len() < needed {
            src.reserve(needed - src.len());
            return Ok(None);
        }

        src.advance(header);
        Ok(Some(src.split_to(frame_len).freeze()))
    }
}

impl Encoder<Bytes> for VarintFrameCodec {
    type Error = TransportError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), TransportError> {
        if item.len() > self.max_frame {
            return Err(TransportError::FrameTooLarge {
                len: item.len() as u64,
                max: self.max_frame,
            });
        }
        let len = item.len() as u64;
        dst.reserve(encoded_len_varint(len) + item.len());
        encode_varint(len, dst);
        dst.extend_from_slice(&item);
        Ok(())
    }
}

/// Read a varint length without consuming it. `None` means more bytes are
/// needed.
fn peek_varint(src: &[u8]) -> Result<Option<(u64, usize)>, TransportError> {
    let mut value = 0u64;
    for (i, byte) in src.iter().take(MAX_VARINT_LEN).enumerate() {
        value |= u64::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(Some((value, i + 1)));
        }
    }
    if src.len() >= MAX_VARINT_LEN {
        return Err(TransportError::InvalidFrame(
            "length prefix exceeds 10 bytes".to_owned(),
        ));
    }
    Ok(None)
}

type FramedStream<T> = Framed<T, VarintFrameCodec>;

/// A [`Connection`] over a framed byte stream.
pub struct FramedConnection<T> {
    reader: Mutex<SplitStream<FramedStream<T>>>,
    writer: Mutex<SplitSink<FramedStream<T>, Bytes>>,
    closed: AtomicBool,
}

impl<T> fmt::Debug for FramedConnection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FramedConnection")
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl<T> FramedConnection<T>
where
    T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    /// Frame `io` with frames of up to `max_frame` bytes.
    pub fn new(io: T, max_frame: usize) -> Self {
        Self::from_framed(Framed::new(io, VarintFrameCodec::new(max_frame)))
    }

    /// Take over an already framed stream, e.g. after protocol negotiation.
    pub fn from_framed(framed: FramedStream<T>) -> Self {
        let (writer, reader) = framed.split();
        Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl<T> Connection for FramedConnection<T>
where
    T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    async fn receive(&self) -> Option<Result<Bytes, TransportError>> {
        self.reader.lock().await.next().await
    }

    async fn send(&self, message: Bytes) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        self.writer.lock().await.send(message).await
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Err(e) = self.writer.lock().await.close().await {
            debug!(error = %e, "error while closing framed stream");
        }
    }
}
