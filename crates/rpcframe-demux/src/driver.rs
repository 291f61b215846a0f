//! The single background task that owns the pending buffer and feeds the
//! text channel and the stream registry.

use bytes::Bytes;
use futures_core::Stream;
use futures_util::StreamExt;
use rpcframe_frame::{Frame, PendingBuffer};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::config::DecoderConfig;
use crate::error::{DecodeError, Result};
use crate::registry::{DecoderPhase, StreamRegistry, Termination};
use crate::text::TextSender;

/// How a driver run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverOutcome {
    /// `Closed` or `Failed`.
    pub phase: DecoderPhase,
    /// Frames dispatched.
    pub frames: usize,
    /// Input bytes received.
    pub bytes: usize,
}

enum Step {
    Chunk(Bytes),
    Exhausted,
    Cancelled,
}

pub(crate) struct Driver<S> {
    input: S,
    buffer: PendingBuffer,
    registry: StreamRegistry,
    text: TextSender,
    cancel: CancellationToken,
    config: DecoderConfig,
    frames: usize,
    bytes: usize,
}

impl<S, E> Driver<S>
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Unpin,
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    pub(crate) fn new(
        input: S,
        registry: StreamRegistry,
        text: TextSender,
        cancel: CancellationToken,
        config: DecoderConfig,
    ) -> Self {
        Self {
            input,
            buffer: PendingBuffer::new(config.max_buffered_bytes),
            registry,
            text,
            cancel,
            config,
            frames: 0,
            bytes: 0,
        }
    }

    /// Run to a terminal phase. The input source is dropped on return.
    pub(crate) async fn run(mut self) -> DriverOutcome {
        debug!("frame decoder started");
        let phase = match self.pump().await {
            Ok(true) => {
                let unterminated = self.registry.close_all();
                if unterminated > 0 {
                    debug!(unterminated, "closed raw streams that never received END");
                }
                debug!(frames = self.frames, bytes = self.bytes, "frame decoder closed");
                DecoderPhase::Closed
            }
            Ok(false) => {
                // The text consumer already failed the registry synchronously.
                self.registry.fail_all(DecodeError::Cancelled, true);
                debug!(frames = self.frames, "frame decoder cancelled");
                DecoderPhase::Failed
            }
            Err(err) => {
                warn!(error = %err, frames = self.frames, "frame decoder failed");
                // The text receiver may already be gone; that is not a failure.
                let _ = self.text.send(Err(err.clone()));
                self.registry.fail_all(err, false);
                DecoderPhase::Failed
            }
        };
        DriverOutcome {
            phase,
            frames: self.frames,
            bytes: self.bytes,
        }
    }

    /// Returns `Ok(true)` on clean end of input, `Ok(false)` on cancellation.
    async fn pump(&mut self) -> Result<bool> {
        loop {
            let step = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Step::Cancelled,
                next = self.input.next() => match next {
                    Some(Ok(chunk)) => Step::Chunk(chunk),
                    Some(Err(err)) => return Err(DecodeError::upstream(err)),
                    None => Step::Exhausted,
                },
            };

            match step {
                Step::Cancelled => return Ok(false),
                Step::Chunk(chunk) => {
                    self.bytes += chunk.len();
                    self.buffer.append(chunk)?;
                    if !self.drain_frames()? {
                        return Ok(false);
                    }
                }
                Step::Exhausted => {
                    self.registry.set_phase(DecoderPhase::Draining);
                    if !self.drain_frames()? {
                        return Ok(false);
                    }
                    self.buffer.finish()?;
                    return Ok(true);
                }
            }
        }
    }

    /// Dispatch every complete frame already buffered.
    ///
    /// Returns false if cancellation was observed between frames.
    fn drain_frames(&mut self) -> Result<bool> {
        loop {
            if self.cancel.is_cancelled() {
                return Ok(false);
            }
            let Some((frame, size)) = self.buffer.next_frame(self.config.max_frame_payload_bytes)?
            else {
                return Ok(true);
            };

            self.frames += 1;
            if let Some(max) = self.config.max_frames {
                if self.frames > max {
                    return Err(DecodeError::TooManyFrames { max });
                }
            }
            trace!(
                frame_type = frame.frame_type().name(),
                stream_id = frame.stream_id(),
                size,
                "frame decoded"
            );
            self.dispatch(frame)?;
        }
    }

    fn dispatch(&mut self, frame: Frame) -> Result<()> {
        match frame {
            Frame::Text(message) => {
                // A dropped text receiver only means nobody reads text any more.
                let _ = self.text.send(Ok(message));
                Ok(())
            }
            Frame::Chunk { stream_id, data } => self.registry.dispatch_chunk(stream_id, data),
            Frame::End { stream_id } => self.registry.terminate(stream_id, Termination::End),
            Frame::Error { stream_id, message } => {
                debug!(stream_id, %message, "raw stream failed by producer");
                self.registry
                    .terminate(stream_id, Termination::Error(message))
            }
        }
    }
}
