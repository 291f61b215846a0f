//! Pending-bytes accumulator.
//!
//! Incoming chunks are kept as a list of `Bytes` plus a running total, so
//! appending never copies. Bytes are only flattened when a complete frame
//! straddles more than one chunk.

use std::collections::VecDeque;

use bytes::{Buf, Bytes, BytesMut};
use tracing::trace;

use crate::codec::{decode_frame, Frame, FrameHeader, HEADER_SIZE};
use crate::error::{FrameError, Result};

/// Not-yet-consumed input bytes, bounded by `max_buffered_bytes`.
#[derive(Debug)]
pub struct PendingBuffer {
    chunks: VecDeque<Bytes>,
    len: usize,
    max_buffered_bytes: usize,
}

impl PendingBuffer {
    pub fn new(max_buffered_bytes: usize) -> Self {
        Self {
            chunks: VecDeque::new(),
            len: 0,
            max_buffered_bytes,
        }
    }

    /// Append a chunk to the tail.
    ///
    /// Fails without buffering anything if the new total would exceed the ceiling.
    pub fn append(&mut self, chunk: Bytes) -> Result<()> {
        if chunk.is_empty() {
            return Ok(());
        }
        let size = self.len + chunk.len();
        if size > self.max_buffered_bytes {
            return Err(FrameError::BufferOverflow {
                size,
                max: self.max_buffered_bytes,
            });
        }
        self.len = size;
        self.chunks.push_back(chunk);
        Ok(())
    }

    /// Total number of buffered bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of chunks currently held.
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Copy the first `HEADER_SIZE` bytes out without flattening.
    pub fn peek_header(&self) -> Option<[u8; HEADER_SIZE]> {
        if self.len < HEADER_SIZE {
            return None;
        }
        let mut header = [0u8; HEADER_SIZE];
        let mut filled = 0;
        for chunk in &self.chunks {
            let take = chunk.len().min(HEADER_SIZE - filled);
            header[filled..filled + take].copy_from_slice(&chunk[..take]);
            filled += take;
            if filled == HEADER_SIZE {
                break;
            }
        }
        Some(header)
    }

    /// A single contiguous view of everything buffered.
    ///
    /// Only materializes a new allocation when more than one chunk is pending.
    pub fn ensure_contiguous(&mut self) -> Bytes {
        match self.chunks.len() {
            0 => Bytes::new(),
            1 => self.chunks[0].clone(),
            chunks => {
                trace!(chunks, len = self.len, "flattening pending input");
                let mut flat = BytesMut::with_capacity(self.len);
                for chunk in self.chunks.drain(..) {
                    flat.extend_from_slice(&chunk);
                }
                let flat = flat.freeze();
                self.chunks.push_back(flat.clone());
                flat
            }
        }
    }

    /// Drop the first `n` bytes.
    ///
    /// Fully consumed chunks are released; a partially consumed front chunk is re-sliced.
    pub fn consume(&mut self, mut n: usize) {
        n = n.min(self.len);
        self.len -= n;
        while n > 0 {
            let Some(front) = self.chunks.front_mut() else {
                break;
            };
            if front.len() <= n {
                n -= front.len();
                self.chunks.pop_front();
            } else {
                front.advance(n);
                n = 0;
            }
        }
    }

    /// Extract the next complete frame, if one is fully buffered.
    ///
    /// The header is validated as soon as its 9 bytes are present, so an
    /// oversized or malformed frame fails before any payload arrives.
    pub fn next_frame(&mut self, max_payload: usize) -> Result<Option<(Frame, usize)>> {
        let Some(raw) = self.peek_header() else {
            return Ok(None);
        };
        let header = FrameHeader::decode(&raw, max_payload)?;
        if self.len < header.frame_size() {
            return Ok(None);
        }

        let view = self.ensure_contiguous();
        let decoded = decode_frame(&view, max_payload)?;
        if let Some((_, consumed)) = &decoded {
            self.consume(*consumed);
        }
        Ok(decoded)
    }

    /// Check that input ended on a frame boundary.
    pub fn finish(&self) -> Result<()> {
        if self.len != 0 {
            return Err(FrameError::IncompleteFrame {
                remaining: self.len,
            });
        }
        Ok(())
    }
}
