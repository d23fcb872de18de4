//! Frame header encoding/decoding
//!
//! Every frame starts with a 32-byte header holding the payload length as
//! ASCII decimal, left-justified and right-padded with spaces:
//!
//! ```text
//! "57                              " {"v":1,"kind":"auth",...}
//! |<---------- 32 bytes ---------->| |<----- 57 bytes ----->|
//! ```

use bytes::{BufMut, BytesMut};

use crate::error::FrameError;

/// Size of the frame header in bytes
pub const HEADER_SIZE: usize = 32;

/// Maximum payload size accepted from a peer (1 MiB)
pub const MAX_PAYLOAD_SIZE: usize = 1024 * 1024;

/// Frame header containing the payload length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Length of the payload in bytes
    pub payload_length: usize,
}

impl FrameHeader {
    /// Create a new frame header
    pub fn new(payload_length: usize) -> Self {
        Self { payload_length }
    }

    /// Encode the header into a byte buffer
    pub fn encode(&self, dst: &mut BytesMut) -> Result<(), FrameError> {
        self.check_size()?;
        let text = format!("{:<width$}", self.payload_length, width = HEADER_SIZE);
        dst.reserve(HEADER_SIZE);
        dst.put_slice(text.as_bytes());
        Ok(())
    }

    /// Parse a complete header.
    ///
    /// Surrounding whitespace is ignored; anything else that is not a
    /// decimal integer is rejected.
    pub fn parse(raw: &[u8]) -> Result<Self, FrameError> {
        let invalid = || FrameError::InvalidHeader(String::from_utf8_lossy(raw).into_owned());

        if raw.len() != HEADER_SIZE {
            return Err(invalid());
        }

        let text = std::str::from_utf8(raw).map_err(|_| invalid())?.trim();
        if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        let payload_length = text.parse::<usize>().map_err(|_| invalid())?;
        let header = Self { payload_length };
        header.check_size()?;
        Ok(header)
    }

    /// Decode a header from a byte buffer
    ///
    /// Returns None if there aren't enough bytes in the buffer.
    pub fn decode(src: &mut BytesMut) -> Result<Option<Self>, FrameError> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }

        let raw = src.split_to(HEADER_SIZE);
        Self::parse(&raw).map(Some)
    }

    fn check_size(&self) -> Result<(), FrameError> {
        if self.payload_length > MAX_PAYLOAD_SIZE {
            return Err(FrameError::PayloadTooLarge {
                size: self.payload_length,
                max: MAX_PAYLOAD_SIZE,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let mut buf = BytesMut::new();
        FrameHeader::new(57).encode(&mut buf).unwrap();

        assert_eq!(buf.len(), HEADER_SIZE);
        assert_eq!(&buf[..2], b"57");
        assert!(buf[2..].iter().all(|&b| b == b' '));
    }

    #[test]
    fn test_header_roundtrip() {
        let header = FrameHeader::new(12345);

        let mut buf = BytesMut::with_capacity(HEADER_SIZE);
        header.encode(&mut buf).unwrap();

        let decoded = FrameHeader::decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, header);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_insufficient_bytes() {
        let mut buf = BytesMut::from(&b"12  "[..]);
        let result = FrameHeader::decode(&mut buf).unwrap();
        assert!(result.is_none());
        assert_eq!(buf.len(), 4);
    }

    #[test]
    fn test_non_numeric_header() {
        let mut raw = [b' '; HEADER_SIZE];
        raw[..3].copy_from_slice(b"abc");
        assert!(matches!(
            FrameHeader::parse(&raw),
            Err(FrameError::InvalidHeader(_))
        ));

        let blank = [b' '; HEADER_SIZE];
        assert!(matches!(
            FrameHeader::parse(&blank),
            Err(FrameError::InvalidHeader(_))
        ));

        let mut negative = [b' '; HEADER_SIZE];
        negative[..2].copy_from_slice(b"-5");
        assert!(FrameHeader::parse(&negative).is_err());
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let mut buf = BytesMut::new();
        let result = FrameHeader::new(MAX_PAYLOAD_SIZE + 1).encode(&mut buf);
        assert!(matches!(result, Err(FrameError::PayloadTooLarge { .. })));

        let text = format!("{:<width$}", MAX_PAYLOAD_SIZE + 1, width = HEADER_SIZE);
        assert!(matches!(
            FrameHeader::parse(text.as_bytes()),
            Err(FrameError::PayloadTooLarge { .. })
        ));
    }
}
