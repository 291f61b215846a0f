//! Wire codec for multiplexed RPC response frames.
//!
//! Every frame on the wire carries a fixed 9-byte header:
//! - A 1-byte frame type (TEXT, CHUNK, END, ERROR)
//! - A 4-byte big-endian stream id (`0` for TEXT, nonzero otherwise)
//! - A 4-byte big-endian payload length
//!
//! This crate parses and validates frames from arbitrarily chunked input.
//! Demultiplexing into text and raw streams lives in `rpcframe-demux`.

pub mod buffer;
pub mod channel;
pub mod codec;
pub mod error;
pub mod reader;

pub use buffer::PendingBuffer;
pub use channel::{is_raw_stream, stream_name, TEXT_STREAM_ID};
pub use codec::{
    decode_frame, encode_frame, Frame, FrameConfig, FrameHeader, FrameType,
    DEFAULT_MAX_BUFFERED_BYTES, DEFAULT_MAX_PAYLOAD, HEADER_SIZE,
};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
