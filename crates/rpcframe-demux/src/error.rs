use std::sync::Arc;

use rpcframe_frame::FrameError;

/// Errors surfaced by the frame decoder.
///
/// Cloned into every consumer on failure, so the text channel and each live
/// raw stream observe the same value.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DecodeError {
    /// Wire-level violation (framing, ceilings, truncation).
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// More raw streams than `max_concurrent_streams` were requested.
    #[error("too many raw streams in framed response (max {max})")]
    TooManyStreams { max: usize },

    /// More frames than `max_frames` arrived.
    #[error("too many frames in framed response (max {max})")]
    TooManyFrames { max: usize },

    /// A raw stream queued more unread bytes than `max_stream_buffered_bytes`.
    #[error("raw stream {stream_id} buffered more than {max} unread bytes")]
    StreamBufferOverflow { stream_id: u32, max: usize },

    /// Stream id 0 belongs to the text channel.
    #[error("stream id 0 is reserved for the text channel")]
    ReservedStreamId,

    /// The input source itself failed.
    #[error("upstream read failed: {0}")]
    Upstream(Arc<dyn std::error::Error + Send + Sync>),

    /// The response was cancelled by its consumer.
    #[error("framed response cancelled")]
    Cancelled,

    /// The producer reported a failure for one stream via an ERROR frame.
    #[error("{message}")]
    Remote { stream_id: u32, message: String },
}

impl DecodeError {
    pub(crate) fn upstream(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Upstream(Arc::from(err.into()))
    }

    /// True for faults in the bytes on the wire, as opposed to upstream
    /// failure, cancellation or a producer-reported stream error.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Self::Frame(_)
                | Self::TooManyStreams { .. }
                | Self::TooManyFrames { .. }
                | Self::StreamBufferOverflow { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, DecodeError>;
