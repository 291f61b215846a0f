use rpcframe_frame::{FrameConfig, DEFAULT_MAX_BUFFERED_BYTES, DEFAULT_MAX_PAYLOAD};

/// Default maximum number of live raw streams.
pub const DEFAULT_MAX_CONCURRENT_STREAMS: usize = 1024;

/// Default maximum number of frames per response.
pub const DEFAULT_MAX_FRAMES: usize = 100_000;

/// Resource ceilings for one decoder instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoderConfig {
    /// Largest single frame payload. Default: 16 MiB.
    pub max_frame_payload_bytes: usize,
    /// Largest amount of not-yet-parsed input held at once. Default: 32 MiB.
    pub max_buffered_bytes: usize,
    /// Largest number of live raw streams. Default: 1024.
    pub max_concurrent_streams: usize,
    /// Total frames accepted per response; `None` disables the check.
    pub max_frames: Option<usize>,
    /// Unread bytes a single raw stream may queue; `None` disables the check.
    pub max_stream_buffered_bytes: Option<usize>,
}

impl DecoderConfig {
    /// Codec settings derived from these ceilings.
    pub fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            max_payload_size: self.max_frame_payload_bytes,
            max_buffered_bytes: self.max_buffered_bytes,
        }
    }
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            max_frame_payload_bytes: DEFAULT_MAX_PAYLOAD,
            max_buffered_bytes: DEFAULT_MAX_BUFFERED_BYTES,
            max_concurrent_streams: DEFAULT_MAX_CONCURRENT_STREAMS,
            max_frames: Some(DEFAULT_MAX_FRAMES),
            max_stream_buffered_bytes: None,
        }
    }
}
