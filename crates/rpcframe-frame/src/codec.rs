use bytes::{BufMut, Bytes, BytesMut};

use crate::channel::{is_raw_stream, TEXT_STREAM_ID};
use crate::error::{FrameError, Result};

/// Frame header: type (1) + stream id (4) + length (4) = 9 bytes.
pub const HEADER_SIZE: usize = 9;

/// Default maximum payload size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// Default maximum amount of not-yet-parsed input: 32 MiB.
pub const DEFAULT_MAX_BUFFERED_BYTES: usize = 32 * 1024 * 1024;

/// Frame type discriminator (header byte 0).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    /// One textual message on stream 0.
    Text = 1,
    /// A slice of bytes for a raw stream.
    Chunk = 2,
    /// Successful end of a raw stream.
    End = 3,
    /// Failure of a raw stream; payload is a UTF-8 message.
    Error = 4,
}

impl FrameType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(Self::Text),
            2 => Some(Self::Chunk),
            3 => Some(Self::End),
            4 => Some(Self::Error),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::Chunk => "CHUNK",
            Self::End => "END",
            Self::Error => "ERROR",
        }
    }

    /// Whether `stream_id` is legal for this frame type.
    pub fn accepts_stream_id(self, stream_id: u32) -> bool {
        match self {
            Self::Text => stream_id == TEXT_STREAM_ID,
            Self::Chunk | Self::End | Self::Error => is_raw_stream(stream_id),
        }
    }

    pub(crate) fn stream_id_rule(self) -> &'static str {
        match self {
            Self::Text => "0",
            Self::Chunk | Self::End | Self::Error => "non-zero",
        }
    }
}

/// A validated frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub frame_type: FrameType,
    pub stream_id: u32,
    pub length: u32,
}

impl FrameHeader {
    /// Decode and validate a header.
    ///
    /// Checks run in order: frame type, stream id convention, payload ceiling.
    /// None of them need the payload to be present.
    pub fn decode(raw: &[u8; HEADER_SIZE], max_payload: usize) -> Result<Self> {
        let frame_type = FrameType::from_u8(raw[0]).ok_or(FrameError::UnknownFrameType(raw[0]))?;
        let stream_id = u32::from_be_bytes([raw[1], raw[2], raw[3], raw[4]]);
        let length = u32::from_be_bytes([raw[5], raw[6], raw[7], raw[8]]);

        if !frame_type.accepts_stream_id(stream_id) {
            return Err(FrameError::InvalidStreamId {
                frame_type,
                stream_id,
            });
        }

        if length as usize > max_payload {
            return Err(FrameError::PayloadTooLarge {
                size: length as usize,
                max: max_payload,
            });
        }

        Ok(Self {
            frame_type,
            stream_id,
            length,
        })
    }

    /// Total wire size of the frame this header introduces.
    pub fn frame_size(&self) -> usize {
        HEADER_SIZE + self.length as usize
    }
}

/// A decoded frame, with the payload typed per frame type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A textual message (stream 0).
    Text(String),
    /// Bytes for a raw stream.
    Chunk { stream_id: u32, data: Bytes },
    /// The raw stream finished successfully.
    End { stream_id: u32 },
    /// The raw stream failed with `message`.
    Error { stream_id: u32, message: String },
}

impl Frame {
    pub fn frame_type(&self) -> FrameType {
        match self {
            Self::Text(_) => FrameType::Text,
            Self::Chunk { .. } => FrameType::Chunk,
            Self::End { .. } => FrameType::End,
            Self::Error { .. } => FrameType::Error,
        }
    }

    pub fn stream_id(&self) -> u32 {
        match self {
            Self::Text(_) => TEXT_STREAM_ID,
            Self::Chunk { stream_id, .. }
            | Self::End { stream_id }
            | Self::Error { stream_id, .. } => *stream_id,
        }
    }

    /// Encode this frame onto `dst`.
    pub fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        let stream_id = self.stream_id();
        match self {
            Self::Text(text) => encode_frame(FrameType::Text, stream_id, text.as_bytes(), dst),
            Self::Chunk { data, .. } => encode_frame(FrameType::Chunk, stream_id, data, dst),
            Self::End { .. } => encode_frame(FrameType::End, stream_id, &[], dst),
            Self::Error { message, .. } => {
                encode_frame(FrameType::Error, stream_id, message.as_bytes(), dst)
            }
        }
    }
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────┬──────────────┬──────────────┬─────────────────┐
/// │ Type     │ Stream id    │ Length       │ Payload         │
/// │ (1B)     │ (4B BE)      │ (4B BE)      │ (Length bytes)  │
/// └──────────┴──────────────┴──────────────┴─────────────────┘
/// ```
pub fn encode_frame(
    frame_type: FrameType,
    stream_id: u32,
    payload: &[u8],
    dst: &mut BytesMut,
) -> Result<()> {
    if !frame_type.accepts_stream_id(stream_id) {
        return Err(FrameError::InvalidStreamId {
            frame_type,
            stream_id,
        });
    }
    if payload.len() > u32::MAX as usize {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: u32::MAX as usize,
        });
    }
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_u8(frame_type.as_u8());
    dst.put_u32(stream_id);
    dst.put_u32(payload.len() as u32);
    dst.put_slice(payload);
    Ok(())
}

/// Decode one frame from the front of a contiguous view.
///
/// Returns `Ok(None)` if the view doesn't contain a complete frame yet.
/// Nothing is retained between calls: the header is re-derived each time.
/// On success, returns the frame and the number of bytes it occupied.
pub fn decode_frame(view: &Bytes, max_payload: usize) -> Result<Option<(Frame, usize)>> {
    let Some(raw) = view.get(..HEADER_SIZE) else {
        return Ok(None); // Need more data
    };
    let mut header_bytes = [0u8; HEADER_SIZE];
    header_bytes.copy_from_slice(raw);
    let header = FrameHeader::decode(&header_bytes, max_payload)?;

    let total = header.frame_size();
    if view.len() < total {
        return Ok(None); // Need more data
    }

    let payload = view.slice(HEADER_SIZE..total);
    let frame = match header.frame_type {
        FrameType::Text => Frame::Text(String::from_utf8_lossy(&payload).into_owned()),
        FrameType::Chunk => Frame::Chunk {
            stream_id: header.stream_id,
            data: payload,
        },
        FrameType::End => Frame::End {
            stream_id: header.stream_id,
        },
        FrameType::Error => Frame::Error {
            stream_id: header.stream_id,
            message: String::from_utf8_lossy(&payload).into_owned(),
        },
    };

    Ok(Some((frame, total)))
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 16 MiB.
    pub max_payload_size: usize,
    /// Maximum not-yet-parsed input held at once. Default: 32 MiB.
    pub max_buffered_bytes: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            max_buffered_bytes: DEFAULT_MAX_BUFFERED_BYTES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire(frame_type: FrameType, stream_id: u32, payload: &[u8]) -> Bytes {
        let mut buf = BytesMut::new();
        encode_frame(frame_type, stream_id, payload, &mut buf).unwrap();
        buf.freeze()
    }

    fn raw_header(type_byte: u8, stream_id: u32, length: u32) -> [u8; HEADER_SIZE] {
        let mut raw = [0u8; HEADER_SIZE];
        raw[0] = type_byte;
        raw[1..5].copy_from_slice(&stream_id.to_be_bytes());
        raw[5..9].copy_from_slice(&length.to_be_bytes());
        raw
    }

    #[test]
    fn header_layout_is_big_endian() {
        let buf = wire(FrameType::Chunk, 0x0102_0304, b"xyz");
        assert_eq!(
            &buf[..HEADER_SIZE],
            &[2, 0x01, 0x02, 0x03, 0x04, 0, 0, 0, 3]
        );
        assert_eq!(&buf[HEADER_SIZE..], b"xyz");
    }

    #[test]
    fn decode_text_frame() {
        let buf = wire(FrameType::Text, 0, b"{}\n");
        let (frame, consumed) = decode_frame(&buf, DEFAULT_MAX_PAYLOAD).unwrap().unwrap();
        assert_eq!(frame, Frame::Text("{}\n".to_string()));
        assert_eq!(consumed, HEADER_SIZE + 3);
    }

    #[test]
    fn decode_chunk_end_and_error_frames() {
        let mut buf = BytesMut::new();
        encode_frame(FrameType::Chunk, 5, &[1, 2, 3], &mut buf).unwrap();
        encode_frame(FrameType::End, 5, &[], &mut buf).unwrap();
        encode_frame(FrameType::Error, 6, b"Stream failed", &mut buf).unwrap();
        let mut view = buf.freeze();

        let (f1, n1) = decode_frame(&view, DEFAULT_MAX_PAYLOAD).unwrap().unwrap();
        assert_eq!(
            f1,
            Frame::Chunk {
                stream_id: 5,
                data: Bytes::from_static(&[1, 2, 3])
            }
        );
        view = view.slice(n1..);

        let (f2, n2) = decode_frame(&view, DEFAULT_MAX_PAYLOAD).unwrap().unwrap();
        assert_eq!(f2, Frame::End { stream_id: 5 });
        assert_eq!(n2, HEADER_SIZE);
        view = view.slice(n2..);

        let (f3, n3) = decode_frame(&view, DEFAULT_MAX_PAYLOAD).unwrap().unwrap();
        assert_eq!(
            f3,
            Frame::Error {
                stream_id: 6,
                message: "Stream failed".to_string()
            }
        );
        assert_eq!(n3, view.len());
    }

    #[test]
    fn end_payload_is_tolerated() {
        let buf = wire(FrameType::End, 9, b"trailing");
        let (frame, consumed) = decode_frame(&buf, DEFAULT_MAX_PAYLOAD).unwrap().unwrap();
        assert_eq!(frame, Frame::End { stream_id: 9 });
        assert_eq!(consumed, buf.len());
    }

    #[test]
    fn decode_incomplete_header() {
        let buf = Bytes::from_static(&[1, 0, 0]);
        assert!(decode_frame(&buf, DEFAULT_MAX_PAYLOAD).unwrap().is_none());
    }

    #[test]
    fn decode_incomplete_payload() {
        let buf = wire(FrameType::Chunk, 1, b"hello").slice(..HEADER_SIZE + 2);
        assert!(decode_frame(&buf, DEFAULT_MAX_PAYLOAD).unwrap().is_none());
    }

    #[test]
    fn unknown_frame_type_rejected() {
        for type_byte in [0u8, 5, 0xFF] {
            let raw = raw_header(type_byte, 1, 0);
            let err = FrameHeader::decode(&raw, DEFAULT_MAX_PAYLOAD).unwrap_err();
            assert!(matches!(err, FrameError::UnknownFrameType(t) if t == type_byte));
        }
    }

    #[test]
    fn text_frame_with_nonzero_id_rejected() {
        let raw = raw_header(FrameType::Text.as_u8(), 7, 0);
        let err = FrameHeader::decode(&raw, DEFAULT_MAX_PAYLOAD).unwrap_err();
        assert!(matches!(
            err,
            FrameError::InvalidStreamId {
                frame_type: FrameType::Text,
                stream_id: 7
            }
        ));
    }

    #[test]
    fn raw_frames_with_zero_id_rejected() {
        for frame_type in [FrameType::Chunk, FrameType::End, FrameType::Error] {
            let raw = raw_header(frame_type.as_u8(), 0, 0);
            let err = FrameHeader::decode(&raw, DEFAULT_MAX_PAYLOAD).unwrap_err();
            assert!(matches!(err, FrameError::InvalidStreamId { stream_id: 0, .. }));
        }
    }

    #[test]
    fn payload_ceiling_is_exact() {
        let max = 1024;
        let at_limit = raw_header(FrameType::Chunk.as_u8(), 1, max as u32);
        assert!(FrameHeader::decode(&at_limit, max).is_ok());

        // Only the header is present: the ceiling must trip without payload bytes.
        let over = Bytes::copy_from_slice(&raw_header(FrameType::Chunk.as_u8(), 1, max as u32 + 1));
        let err = decode_frame(&over, max).unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { size, max: m } if size == max + 1 && m == max));
    }

    #[test]
    fn encode_rejects_id_convention_violations() {
        let mut buf = BytesMut::new();
        assert!(encode_frame(FrameType::Text, 1, b"x", &mut buf).is_err());
        assert!(encode_frame(FrameType::Chunk, 0, b"x", &mut buf).is_err());
        assert!(buf.is_empty());
    }

    #[test]
    fn invalid_utf8_text_is_replaced() {
        let buf = wire(FrameType::Text, 0, &[b'o', b'k', 0xFF]);
        let (frame, _) = decode_frame(&buf, DEFAULT_MAX_PAYLOAD).unwrap().unwrap();
        assert_eq!(frame, Frame::Text("ok\u{FFFD}".to_string()));
    }

    #[test]
    fn frame_encode_matches_encode_frame() {
        let frame = Frame::Error {
            stream_id: 3,
            message: "nope".to_string(),
        };
        let mut buf = BytesMut::new();
        frame.encode(&mut buf).unwrap();
        assert_eq!(buf.freeze(), wire(FrameType::Error, 3, b"nope"));
        assert_eq!(frame.frame_type(), FrameType::Error);
        assert_eq!(frame.stream_id(), 3);
    }

    #[test]
    fn frame_type_roundtrips_through_u8() {
        for frame_type in [
            FrameType::Text,
            FrameType::Chunk,
            FrameType::End,
            FrameType::Error,
        ] {
            assert_eq!(FrameType::from_u8(frame_type.as_u8()), Some(frame_type));
        }
        assert_eq!(FrameType::from_u8(0), None);
    }
}
