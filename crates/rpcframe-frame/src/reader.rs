use std::io::{ErrorKind, Read};

use bytes::Bytes;
use tracing::debug;

use crate::buffer::PendingBuffer;
use crate::codec::{Frame, FrameConfig};
use crate::error::{FrameError, Result};

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads complete frames from any `Read` stream.
///
/// Handles partial reads internally; callers always get complete frames.
pub struct FrameReader<T> {
    inner: T,
    buf: PendingBuffer,
    config: FrameConfig,
    eof: bool,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: PendingBuffer::new(config.max_buffered_bytes),
            config,
            eof: false,
        }
    }

    /// Read the next complete frame (blocking) and its wire size.
    ///
    /// Returns `Ok(None)` at EOF on a frame boundary and
    /// `Err(FrameError::IncompleteFrame)` at EOF mid-frame.
    pub fn read_frame(&mut self) -> Result<Option<(Frame, usize)>> {
        loop {
            if let Some(decoded) = self.buf.next_frame(self.config.max_payload_size)? {
                return Ok(Some(decoded));
            }
            if self.eof {
                if let Err(err) = self.buf.finish() {
                    debug!(pending = self.buf.len(), "input ended mid-frame");
                    return Err(err);
                }
                return Ok(None);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::from(err)),
            };

            if read == 0 {
                self.eof = true;
                continue;
            }

            self.buf.append(Bytes::copy_from_slice(&chunk[..read]))?;
        }
    }

    /// Bytes read from the stream but not yet returned as frames.
    pub fn pending_bytes(&self) -> usize {
        self.buf.len()
    }
}

impl<T: Read> Iterator for FrameReader<T> {
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_frame()
            .map(|decoded| decoded.map(|(frame, _)| frame))
            .transpose()
    }
}
