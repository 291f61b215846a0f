use bytes::Bytes;
use futures_core::Stream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::DecoderConfig;
use crate::driver::{Driver, DriverOutcome};
use crate::registry::StreamRegistry;
use crate::text::TextChannel;

/// Builds decoders with a fixed set of ceilings.
#[derive(Debug, Clone, Default)]
pub struct FrameDecoder {
    config: DecoderConfig,
}

/// The two consumer-facing halves of a decoded response, plus the driver task.
#[derive(Debug)]
pub struct DecodedResponse {
    /// One message per TEXT frame.
    pub text: TextChannel,
    /// Lookup of raw streams by id.
    pub streams: StreamRegistry,
    /// Resolves when the driver reaches `Closed` or `Failed`.
    pub driver: JoinHandle<DriverOutcome>,
}

impl FrameDecoder {
    pub fn new(config: DecoderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Start decoding `input` on the current tokio runtime.
    ///
    /// `input` is any ordered source of byte chunks, e.g. an HTTP response
    /// body. Chunk boundaries need not line up with frame boundaries.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn decode<S, E>(&self, input: S) -> DecodedResponse
    where
        S: Stream<Item = Result<Bytes, E>> + Send + Unpin + 'static,
        E: Into<Box<dyn std::error::Error + Send + Sync>> + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let streams = StreamRegistry::new(
            self.config.max_concurrent_streams,
            self.config.max_stream_buffered_bytes,
        );
        let text = TextChannel::new(rx, cancel.clone(), streams.clone());

        let driver = Driver::new(input, streams.clone(), tx, cancel, self.config.clone());
        let driver = tokio::spawn(driver.run().instrument(tracing::debug_span!("frame_decoder")));

        DecodedResponse {
            text,
            streams,
            driver,
        }
    }
}

/// Decode `input` with default ceilings.
pub fn decode_response<S, E>(input: S) -> DecodedResponse
where
    S: Stream<Item = Result<Bytes, E>> + Send + Unpin + 'static,
    E: Into<Box<dyn std::error::Error + Send + Sync>> + Send + 'static,
{
    FrameDecoder::default().decode(input)
}
