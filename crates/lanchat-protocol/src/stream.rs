//! Event-level reader and writer over a split socket

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::codec::{Frame, FrameCodec};
use crate::error::ProtocolError;
use crate::event::Event;

/// Receives events from the read half of a connection
pub struct EventReader<R> {
    inner: FramedRead<R, FrameCodec>,
}

impl<R: AsyncRead + Unpin> EventReader<R> {
    /// Wrap a byte stream
    pub fn new(reader: R) -> Self {
        Self {
            inner: FramedRead::new(reader, FrameCodec::new()),
        }
    }

    /// Wait for the next event.
    ///
    /// A clean end of stream is reported as
    /// [`ProtocolError::ConnectionClosed`]. After a non-recoverable error
    /// the reader must not be used again.
    pub async fn recv(&mut self) -> Result<Event, ProtocolError> {
        match self.inner.next().await {
            Some(Ok(frame)) => {
                tracing::trace!("Received frame of {} bytes", frame.payload.len());
                frame.to_event()
            }
            Some(Err(e)) => Err(e),
            None => Err(ProtocolError::ConnectionClosed),
        }
    }
}

/// Sends events on the write half of a connection
pub struct EventWriter<W> {
    inner: FramedWrite<W, FrameCodec>,
}

impl<W: AsyncWrite + Unpin> EventWriter<W> {
    /// Wrap a byte sink
    pub fn new(writer: W) -> Self {
        Self {
            inner: FramedWrite::new(writer, FrameCodec::new()),
        }
    }

    /// Encode and flush one event
    pub async fn send(&mut self, event: &Event) -> Result<(), ProtocolError> {
        let frame = Frame::from_event(event)?;
        self.inner.send(frame).await
    }

    /// Flush pending frames and shut down the write direction
    pub async fn close(&mut self) -> Result<(), ProtocolError> {
        SinkExt::<Frame>::close(&mut self.inner).await
    }
}

/// Split a TCP connection into an event reader and writer
pub fn split(stream: TcpStream) -> (EventReader<OwnedReadHalf>, EventWriter<OwnedWriteHalf>) {
    let (reader, writer) = stream.into_split();
    (EventReader::new(reader), EventWriter::new(writer))
}
