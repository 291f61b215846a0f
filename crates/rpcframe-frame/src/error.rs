use std::sync::Arc;

use crate::codec::FrameType;

/// Errors that can occur during frame encoding/decoding.
///
/// Every variant is fatal for the connection it was raised on: the framing
/// has no sync markers, so there is no way to resynchronize after a fault.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FrameError {
    /// The frame header carries a type byte outside TEXT/CHUNK/END/ERROR.
    #[error("unknown frame type: {0}")]
    UnknownFrameType(u8),

    /// The stream id violates the zero/nonzero convention for its type.
    #[error(
        "invalid stream id {stream_id} for {} frame (expected {})",
        .frame_type.name(),
        .frame_type.stream_id_rule()
    )]
    InvalidStreamId { frame_type: FrameType, stream_id: u32 },

    /// The declared payload length exceeds the configured maximum.
    #[error("frame payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// Appending a chunk would exceed the pending-bytes ceiling.
    #[error("buffered input exceeded {max} bytes ({size} pending)")]
    BufferOverflow { size: usize, max: usize },

    /// Input ended with a partial frame still buffered.
    #[error("incomplete frame at end of input ({remaining} bytes left over)")]
    IncompleteFrame { remaining: usize },

    /// An I/O error occurred while reading frames.
    #[error("frame I/O error: {0}")]
    Io(Arc<std::io::Error>),
}

impl From<std::io::Error> for FrameError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
