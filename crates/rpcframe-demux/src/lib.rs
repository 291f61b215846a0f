//! Frame decoder for multiplexed RPC responses.
//!
//! One ordered byte connection carries a textual result channel plus any
//! number of raw byte streams, each named by a numeric id found on the wire.
//! [`FrameDecoder`] consumes the raw chunks on a background task and hands back:
//! - a [`TextChannel`] yielding one message per TEXT frame
//! - a [`StreamRegistry`] whose `get_or_create_stream(id)` returns a
//!   [`RawStream`] for any id, before, during or after its data arrives

pub mod config;
pub mod decoder;
pub mod error;
pub mod registry;
pub mod stream;
pub mod text;

mod driver;

pub use config::{DecoderConfig, DEFAULT_MAX_CONCURRENT_STREAMS, DEFAULT_MAX_FRAMES};
pub use decoder::{decode_response, DecodedResponse, FrameDecoder};
pub use driver::DriverOutcome;
pub use error::{DecodeError, Result};
pub use registry::{DecoderPhase, StreamRegistry};
pub use stream::{RawStream, StreamState};
pub use text::TextChannel;
