//! Tokio codec for framed protocol events

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{FrameError, ProtocolError};
use crate::event::Event;
use crate::frame::{FrameHeader, HEADER_SIZE};

/// A complete frame payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Serialized event bytes (header not included)
    pub payload: Bytes,
}

impl Frame {
    /// Create a frame from raw payload bytes
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    /// Serialize an event into a frame
    pub fn from_event(event: &Event) -> Result<Self, ProtocolError> {
        Ok(Self::new(event.to_payload()?))
    }

    /// Deserialize the event carried by this frame
    pub fn to_event(&self) -> Result<Event, ProtocolError> {
        Event::from_payload(&self.payload)
    }
}

/// Codec for encoding/decoding protocol frames
#[derive(Debug, Default)]
pub struct FrameCodec {
    /// Current header being decoded (if any)
    pending_header: Option<FrameHeader>,
}

impl FrameCodec {
    /// Create a new codec
    pub fn new() -> Self {
        Self {
            pending_header: None,
        }
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let header = match self.pending_header.take() {
            Some(h) => h,
            None => match FrameHeader::decode(src)? {
                Some(h) => h,
                None => return Ok(None),
            },
        };

        let payload_len = header.payload_length;
        if src.len() < payload_len {
            src.reserve(payload_len - src.len());
            self.pending_header = Some(header);
            return Ok(None);
        }

        let payload = src.split_to(payload_len).freeze();
        Ok(Some(Frame { payload }))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }

        match self.pending_header {
            None if src.is_empty() => Ok(None),
            None => Err(FrameError::IncompleteFrame {
                expected: HEADER_SIZE,
                actual: src.len(),
            }
            .into()),
            Some(header) => Err(FrameError::IncompleteFrame {
                expected: header.payload_length,
                actual: src.len(),
            }
            .into()),
        }
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        FrameHeader::new(frame.payload.len()).encode(dst)?;
        dst.extend_from_slice(&frame.payload);
        Ok(())
    }
}

/// Serialize an event into `header || payload`
pub fn pack(event: &Event) -> Result<Bytes, ProtocolError> {
    let frame = Frame::from_event(event)?;
    let mut buf = BytesMut::with_capacity(HEADER_SIZE + frame.payload.len());
    FrameCodec::new().encode(frame, &mut buf)?;
    Ok(buf.freeze())
}

/// Read exactly one frame from `reader` and decode its event.
///
/// Never reads past the end of the frame, so it can be interleaved with
/// other reads on the same stream. A stream that ends before the first
/// header byte is reported as [`ProtocolError::ConnectionClosed`]; one that
/// ends anywhere later is a [`FrameError::IncompleteFrame`].
pub async fn unpack<R>(reader: &mut R) -> Result<Event, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut raw_header = [0u8; HEADER_SIZE];
    let read = read_full(reader, &mut raw_header).await?;
    if read == 0 {
        return Err(ProtocolError::ConnectionClosed);
    }
    if read < HEADER_SIZE {
        return Err(FrameError::IncompleteFrame {
            expected: HEADER_SIZE,
            actual: read,
        }
        .into());
    }

    let header = FrameHeader::parse(&raw_header)?;
    let mut payload = vec![0u8; header.payload_length];
    let read = read_full(reader, &mut payload).await?;
    if read < header.payload_length {
        return Err(FrameError::IncompleteFrame {
            expected: header.payload_length,
            actual: read,
        }
        .into());
    }

    Event::from_payload(&payload)
}

/// Fill `buf` from `reader`, looping over short reads. Returns the number
/// of bytes read, which is less than `buf.len()` only at end of stream.
async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> Result<usize, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Initiator, Message};
    use tokio::io::AsyncWriteExt;

    fn sample_broadcast(content: &str) -> Event {
        Event::broadcast(Message::at(Initiator::User, "alice", content, 1_700_000_000_000))
    }

    #[test]
    fn test_codec_roundtrip() {
        let mut codec = FrameCodec::new();
        let event = sample_broadcast("hello");

        let mut buf = BytesMut::new();
        codec.encode(Frame::from_event(&event).unwrap(), &mut buf).unwrap();

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.to_event().unwrap(), event);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_codec_partial_read() {
        let mut codec = FrameCodec::new();
        let full = pack(&sample_broadcast("split across reads")).unwrap();

        // Header incomplete
        let mut partial = BytesMut::from(&full[..HEADER_SIZE - 1]);
        assert!(codec.decode(&mut partial).unwrap().is_none());

        // Header complete, payload incomplete
        partial.extend_from_slice(&full[HEADER_SIZE - 1..HEADER_SIZE + 5]);
        assert!(codec.decode(&mut partial).unwrap().is_none());

        // Rest of the payload
        partial.extend_from_slice(&full[HEADER_SIZE + 5..]);
        let decoded = codec.decode(&mut partial).unwrap().unwrap();
        assert_eq!(
            decoded.to_event().unwrap(),
            sample_broadcast("split across reads")
        );
    }

    #[test]
    fn test_codec_back_to_back_frames() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&pack(&Event::auth()).unwrap());
        buf.extend_from_slice(&pack(&sample_broadcast("second")).unwrap());

        let first = codec.decode(&mut buf).unwrap().unwrap();
        let second = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(first.to_event().unwrap(), Event::auth());
        assert_eq!(second.to_event().unwrap(), sample_broadcast("second"));
    }

    #[test]
    fn test_codec_eof_mid_payload() {
        let mut codec = FrameCodec::new();
        let full = pack(&sample_broadcast("truncated")).unwrap();
        let mut buf = BytesMut::from(&full[..full.len() - 3]);

        let result = codec.decode_eof(&mut buf);
        assert!(matches!(
            result,
            Err(ProtocolError::Frame(FrameError::IncompleteFrame { .. }))
        ));
    }

    #[test]
    fn test_codec_clean_eof() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        assert!(codec.decode_eof(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_codec_bad_header() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from(&[b'x'; HEADER_SIZE][..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(ProtocolError::Frame(FrameError::InvalidHeader(_)))
        ));
    }

    #[test]
    fn test_pack_header_matches_payload() {
        let packed = pack(&sample_broadcast("héllo wörld ✓")).unwrap();
        let header = FrameHeader::parse(&packed[..HEADER_SIZE]).unwrap();
        assert_eq!(header.payload_length, packed.len() - HEADER_SIZE);
    }

    #[tokio::test]
    async fn test_unpack_roundtrip_edge_contents() {
        let long = "x".repeat(64 * 1024);
        for content in ["", "héllo 👋 世界", long.as_str()] {
            let event = sample_broadcast(content);
            let packed = pack(&event).unwrap();
            let mut reader = &packed[..];
            assert_eq!(unpack(&mut reader).await.unwrap(), event);
        }
    }

    #[tokio::test]
    async fn test_unpack_across_many_reads() {
        // A tiny duplex buffer forces the payload to arrive in many chunks
        let (mut tx, mut rx) = tokio::io::duplex(7);
        let event = sample_broadcast(&"chunked ".repeat(100));
        let packed = pack(&event).unwrap();

        let writer = tokio::spawn(async move {
            tx.write_all(&packed).await.unwrap();
            tx.write_all(&pack(&Event::auth()).unwrap()).await.unwrap();
        });

        assert_eq!(unpack(&mut rx).await.unwrap(), event);
        assert_eq!(unpack(&mut rx).await.unwrap(), Event::auth());
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_unpack_closed_before_frame() {
        let mut reader: &[u8] = &[];
        assert!(matches!(
            unpack(&mut reader).await,
            Err(ProtocolError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_unpack_closed_mid_payload() {
        let packed = pack(&sample_broadcast("cut short")).unwrap();
        let mut reader = &packed[..packed.len() - 1];
        assert!(matches!(
            unpack(&mut reader).await,
            Err(ProtocolError::Frame(FrameError::IncompleteFrame { .. }))
        ));
    }

    #[tokio::test]
    async fn test_unpack_non_numeric_header() {
        let mut bad = vec![b' '; HEADER_SIZE];
        bad[..4].copy_from_slice(b"four");
        let mut reader = &bad[..];
        assert!(matches!(
            unpack(&mut reader).await,
            Err(ProtocolError::Frame(FrameError::InvalidHeader(_)))
        ));
    }
}
