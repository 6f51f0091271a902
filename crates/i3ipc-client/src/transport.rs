//! Frame-level I/O over the two halves of the socket
//!
//! [`FrameReader`] wraps a `FramedRead` over the read half and yields whole
//! frames; [`FrameWriter`] wraps a `FramedWrite` over the write half. Neither
//! knows about replies or events.

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::trace;

use crate::codec::{Frame, FramingError, I3Codec};
use crate::error::IpcError;
use crate::message::MessageKind;

fn read_error(err: FramingError) -> IpcError {
    match err {
        FramingError::Io(source) => IpcError::ReceiveFailed(source),
        other => IpcError::Framing(other),
    }
}

fn write_error(err: FramingError) -> IpcError {
    match err {
        FramingError::Io(source) => IpcError::SendFailed(source),
        other => IpcError::Framing(other),
    }
}

/// Reads frames from the peer
#[derive(Debug)]
pub struct FrameReader<R> {
    frames: FramedRead<R, I3Codec>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R, max_payload: usize, chunk_size: usize) -> Self {
        Self {
            frames: FramedRead::with_capacity(
                reader,
                I3Codec::new(max_payload),
                chunk_size.max(1),
            ),
        }
    }

    /// Wait for the next complete frame
    ///
    /// Frames already buffered are returned without touching the socket.
    ///
    /// # Errors
    ///
    /// Returns `IpcError::Framing` if the peer announces an oversized payload.
    /// Returns `IpcError::ReceiveFailed` if reading from the socket fails.
    /// Returns `IpcError::ConnectionClosed` when the peer closes the stream.
    pub async fn next_frame(&mut self) -> Result<Frame, IpcError> {
        match self.frames.next().await {
            Some(Ok(frame)) => {
                trace!(
                    message_type = frame.message_type,
                    len = frame.payload.len(),
                    "Received frame"
                );
                Ok(frame)
            }
            Some(Err(err)) => Err(read_error(err)),
            None => Err(IpcError::ConnectionClosed),
        }
    }
}

/// Writes frames to the peer
///
/// A frame is first queued into the `FramedWrite` buffer and then flushed.
/// Bytes left in the buffer by an interrupted flush go out ahead of the next
/// frame, so the stream never carries a torn frame followed by another.
#[derive(Debug)]
pub struct FrameWriter<W> {
    frames: FramedWrite<W, I3Codec>,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            frames: FramedWrite::new(writer, I3Codec::default()),
        }
    }

    /// Encode and flush one request frame
    ///
    /// # Errors
    ///
    /// Returns `IpcError::Framing` if the payload cannot be length-prefixed.
    /// Returns `IpcError::SendFailed` if writing to the socket fails.
    pub async fn send(&mut self, kind: MessageKind, payload: &[u8]) -> Result<(), IpcError> {
        self.queue(kind, payload).await?;
        self.flush().await
    }

    /// Encode one request frame into the write buffer without flushing it
    ///
    /// Once this returns `Ok` the frame will reach the socket with the next
    /// successful flush, even if the caller goes away.
    pub async fn queue(&mut self, kind: MessageKind, payload: &[u8]) -> Result<(), IpcError> {
        self.frames
            .feed((kind, payload))
            .await
            .map_err(write_error)?;
        trace!(kind = %kind, len = payload.len(), "Queued frame");
        Ok(())
    }

    /// Write out everything buffered
    pub async fn flush(&mut self) -> Result<(), IpcError> {
        SinkExt::<Frame>::flush(&mut self.frames)
            .await
            .map_err(write_error)
    }

    /// Flush and shut down the write direction
    pub async fn shutdown(&mut self) -> Result<(), IpcError> {
        SinkExt::<Frame>::close(&mut self.frames)
            .await
            .map_err(write_error)
    }
}
