//! Newline-delimited message framing.
//!
//! Both device channels speak one JSON object per line. The codec keeps the
//! payloads opaque (`Bytes` in, `Bytes` out); classification happens in the
//! protocol layer. A max-length guard bounds buffering against a peer that
//! never sends a delimiter.

use bytes::{BufMut, Bytes, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};

/// Default upper bound on a single message.
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 1024 * 1024;

/// Frames opaque payloads as newline-terminated lines.
#[derive(Debug, Clone)]
pub struct MessageCodec {
    max_length: usize,
}

impl MessageCodec {
    pub fn new() -> Self {
        Self { max_length: DEFAULT_MAX_MESSAGE_BYTES }
    }

    pub fn with_max_length(max_length: usize) -> Self {
        Self { max_length }
    }
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for MessageCodec {
    type Item = Bytes;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> io::Result<Option<Bytes>> {
        if let Some(pos) = src.iter().position(|b| *b == b'\n') {
            let mut line = src.split_to(pos + 1);
            line.truncate(pos);
            // tolerate CRLF-terminating peers
            if line.last() == Some(&b'\r') {
                let trimmed = line.len() - 1;
                line.truncate(trimmed);
            }
            return Ok(Some(line.freeze()));
        }
        if src.len() > self.max_length {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("message exceeds {} bytes without a delimiter", self.max_length),
            ));
        }
        Ok(None)
    }
}

impl Encoder<Bytes> for MessageCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> io::Result<()> {
        if item.len() > self.max_length {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("message of {} bytes exceeds the {} byte limit", item.len(), self.max_length),
            ));
        }
        if item.contains(&b'\n') {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "message contains an embedded delimiter",
            ));
        }
        dst.reserve(item.len() + 1);
        dst.extend_from_slice(&item);
        dst.put_u8(b'\n');
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_complete_lines_in_order() {
        let mut codec = MessageCodec::new();
        let mut buf = BytesMut::from(&b"{\"a\":1}\n{\"b\":2}\n"[..]);

        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Bytes::from_static(b"{\"a\":1}")));
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Bytes::from_static(b"{\"b\":2}")));
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn reassembles_partial_reads() {
        let mut codec = MessageCodec::new();
        let mut buf = BytesMut::from(&b"{\"frame_nu"[..]);

        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        buf.extend_from_slice(b"mber\":7}\n");
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(Bytes::from_static(b"{\"frame_number\":7}"))
        );
    }

    #[test]
    fn strips_carriage_returns() {
        let mut codec = MessageCodec::new();
        let mut buf = BytesMut::from(&b"{\"a\":1}\r\n"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Bytes::from_static(b"{\"a\":1}")));
    }

    #[test]
    fn oversized_undelimited_input_errors() {
        let mut codec = MessageCodec::with_max_length(8);
        let mut buf = BytesMut::from(&b"0123456789"[..]);
        let err = codec.decode(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn encode_appends_delimiter() {
        let mut codec = MessageCodec::new();
        let mut dst = BytesMut::new();
        codec.encode(Bytes::from_static(b"{\"command\":\"status\"}"), &mut dst).unwrap();
        assert_eq!(&dst[..], b"{\"command\":\"status\"}\n");
    }

    #[test]
    fn encode_rejects_embedded_delimiter() {
        let mut codec = MessageCodec::new();
        let mut dst = BytesMut::new();
        let err = codec.encode(Bytes::from_static(b"a\nb"), &mut dst).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(dst.is_empty());
    }

    #[test]
    fn encode_then_decode_round_trips() {
        let mut codec = MessageCodec::new();
        let mut wire = BytesMut::new();
        let payload = Bytes::from_static(br#"{"command":"configure","params":{"mode":1}}"#);
        codec.encode(payload.clone(), &mut wire).unwrap();
        assert_eq!(codec.decode(&mut wire).unwrap(), Some(payload));
    }
}
