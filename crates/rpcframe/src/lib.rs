//! Decoder for multiplexed RPC responses.
//!
//! A single ordered byte connection carries one textual result channel and
//! any number of raw byte streams. This crate bundles the pieces:
//!
//! - [`frame`]: the 9-byte-header wire codec and the pending-bytes accumulator
//! - [`demux`]: the async decoder that splits a response into a text channel
//!   and a registry of raw streams
//!
//! ```no_run
//! # async fn demo(body: impl futures_core::Stream<Item = Result<bytes::Bytes, std::io::Error>> + Send + Unpin + 'static) -> rpcframe::demux::Result<()> {
//! use rpcframe::demux::decode_response;
//!
//! let mut response = decode_response(body);
//! let stream = response.streams.get_or_create_stream(5)?;
//! while let Some(message) = response.text.recv().await {
//!     println!("{}", message?);
//! }
//! let bytes = stream.read_all().await?;
//! # let _ = bytes;
//! # Ok(())
//! # }
//! ```

/// Re-export frame codec types.
pub mod frame {
    pub use rpcframe_frame::*;
}

/// Re-export decoder types.
pub mod demux {
    pub use rpcframe_demux::*;
}
