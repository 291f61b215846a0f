//! Virtual raw streams.
//!
//! A [`RawStream`] is a handle on one shared queue. The driver writes into it
//! through a [`StreamSink`]; consumers read it as a `futures_core::Stream`.
//! Clones share the queue, so each chunk is delivered to exactly one reader.
//! A failure is different: every handle reports it once, then ends.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::task::{Context, Poll, Waker};

use bytes::{Bytes, BytesMut};
use futures_core::Stream;
use futures_util::StreamExt;

use crate::error::{DecodeError, Result};
use crate::registry::RegistryShared;

/// Lifecycle of a raw stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Registered, no data yet.
    Pending,
    /// At least one chunk received, accepting more.
    Open,
    /// END received; buffered chunks are still readable.
    Closed,
    /// Failed; the next read yields the error.
    Errored,
    /// Cancelled by its consumer.
    Cancelled,
}

impl StreamState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending | Self::Open)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Errored => "errored",
            Self::Cancelled => "cancelled",
        }
    }
}

struct Inner {
    state: StreamState,
    queue: VecDeque<Bytes>,
    queued_bytes: usize,
    error: Option<DecodeError>,
    /// One slot per handle; a handle re-polled from a new task replaces its waker.
    wakers: HashMap<u64, Waker>,
    next_handle: u64,
}

impl Inner {
    fn wake_all(&mut self) {
        for (_, waker) in self.wakers.drain() {
            waker.wake();
        }
    }

    fn register_handle(&mut self) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }
}

pub(crate) struct Shared {
    id: u32,
    inner: Mutex<Inner>,
    registry: Weak<RegistryShared>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A consumer-facing raw byte stream for one stream id.
pub struct RawStream {
    shared: Arc<Shared>,
    handle: u64,
    error_reported: bool,
}

impl RawStream {
    pub(crate) fn new(id: u32, registry: Weak<RegistryShared>) -> (Self, StreamSink) {
        Self::with_state(id, registry, StreamState::Pending, None)
    }

    /// A stream that is already finished: with `error`, each handle yields it once.
    pub(crate) fn finished(id: u32, error: Option<DecodeError>) -> Self {
        let state = if error.is_some() {
            StreamState::Errored
        } else {
            StreamState::Closed
        };
        Self::with_state(id, Weak::new(), state, error).0
    }

    fn with_state(
        id: u32,
        registry: Weak<RegistryShared>,
        state: StreamState,
        error: Option<DecodeError>,
    ) -> (Self, StreamSink) {
        let shared = Arc::new(Shared {
            id,
            inner: Mutex::new(Inner {
                state,
                queue: VecDeque::new(),
                queued_bytes: 0,
                error,
                wakers: HashMap::new(),
                next_handle: 0,
            }),
            registry,
        });
        let sink = StreamSink {
            shared: Arc::clone(&shared),
        };
        (Self::attach(shared), sink)
    }

    fn attach(shared: Arc<Shared>) -> Self {
        let handle = shared.lock().register_handle();
        Self {
            shared,
            handle,
            error_reported: false,
        }
    }

    /// The stream id this handle reads.
    pub fn id(&self) -> u32 {
        self.shared.id
    }

    pub fn state(&self) -> StreamState {
        self.shared.lock().state
    }

    /// Bytes received but not yet read.
    pub fn buffered_bytes(&self) -> usize {
        self.shared.lock().queued_bytes
    }

    /// True if both handles read the same underlying stream.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Stop listening to this stream.
    ///
    /// Buffered data is dropped, further frames for this id are discarded, and
    /// the id is evicted so a later lookup creates a fresh stream. An errored
    /// stream keeps its error for handles that have not read it yet.
    pub fn cancel(&self) {
        {
            let mut inner = self.shared.lock();
            if matches!(
                inner.state,
                StreamState::Pending | StreamState::Open | StreamState::Closed
            ) {
                inner.state = StreamState::Cancelled;
                inner.queue.clear();
                inner.queued_bytes = 0;
                inner.wake_all();
            }
        }
        if let Some(registry) = self.shared.registry.upgrade() {
            registry.cancel_stream(self.shared.id, &self.shared);
        }
    }

    /// Read every remaining chunk into one buffer.
    pub async fn read_all(mut self) -> Result<Bytes> {
        let mut out = BytesMut::new();
        while let Some(chunk) = self.next().await {
            out.extend_from_slice(&chunk?);
        }
        Ok(out.freeze())
    }

    pub(crate) fn same_shared(&self, shared: &Arc<Shared>) -> bool {
        Arc::ptr_eq(&self.shared, shared)
    }
}

impl Stream for RawStream {
    type Item = Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let mut inner = this.shared.lock();
        if let Some(chunk) = inner.queue.pop_front() {
            inner.queued_bytes -= chunk.len();
            return Poll::Ready(Some(Ok(chunk)));
        }
        match inner.state {
            StreamState::Pending | StreamState::Open => {
                let waker = inner.wakers.entry(this.handle).or_insert_with(|| cx.waker().clone());
                if !waker.will_wake(cx.waker()) {
                    waker.clone_from(cx.waker());
                }
                Poll::Pending
            }
            StreamState::Errored if !this.error_reported => {
                this.error_reported = true;
                Poll::Ready(inner.error.clone().map(Err))
            }
            StreamState::Errored | StreamState::Closed | StreamState::Cancelled => {
                Poll::Ready(None)
            }
        }
    }
}

impl Clone for RawStream {
    /// The clone shares the queue but has not yet reported any failure.
    fn clone(&self) -> Self {
        Self::attach(Arc::clone(&self.shared))
    }
}

impl Drop for RawStream {
    fn drop(&mut self) {
        self.shared.lock().wakers.remove(&self.handle);
    }
}

impl fmt::Debug for RawStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.shared.lock();
        f.debug_struct("RawStream")
            .field("id", &self.shared.id)
            .field("state", &inner.state)
            .field("queued_chunks", &inner.queue.len())
            .field("queued_bytes", &inner.queued_bytes)
            .finish()
    }
}

/// Write side of a raw stream, held by the registry until END/ERROR.
pub(crate) struct StreamSink {
    shared: Arc<Shared>,
}

impl StreamSink {
    /// Queue a chunk. Chunks for a cancelled stream are dropped.
    ///
    /// The payload is copied out so an unread chunk never pins the input
    /// allocation it was sliced from.
    pub(crate) fn push(&self, data: Bytes, max_buffered: Option<usize>) -> Result<()> {
        let mut inner = self.shared.lock();
        match inner.state {
            StreamState::Pending | StreamState::Open => {}
            _ => return Ok(()),
        }
        if let Some(max) = max_buffered {
            if inner.queued_bytes + data.len() > max {
                return Err(DecodeError::StreamBufferOverflow {
                    stream_id: self.shared.id,
                    max,
                });
            }
        }
        inner.state = StreamState::Open;
        inner.queued_bytes += data.len();
        inner.queue.push_back(Bytes::copy_from_slice(&data));
        inner.wake_all();
        Ok(())
    }

    /// Mark the stream finished; buffered chunks stay readable.
    pub(crate) fn close(&self) {
        let mut inner = self.shared.lock();
        if inner.state.is_terminal() {
            return;
        }
        inner.state = StreamState::Closed;
        inner.wake_all();
    }

    /// Fail the stream: buffered chunks are discarded and the next read yields `error`.
    pub(crate) fn fail(&self, error: DecodeError) {
        let mut inner = self.shared.lock();
        if inner.state.is_terminal() {
            return;
        }
        inner.state = StreamState::Errored;
        inner.queue.clear();
        inner.queued_bytes = 0;
        inner.error = Some(error);
        inner.wake_all();
    }
}

#[cfg(test)]
mod tests {
    use futures_util::FutureExt;

    use super::*;

    fn detached(id: u32) -> (RawStream, StreamSink) {
        RawStream::new(id, Weak::new())
    }

    #[tokio::test]
    async fn chunks_are_read_in_order_then_end() {
        let (stream, sink) = detached(5);
        assert_eq!(stream.state(), StreamState::Pending);

        sink.push(Bytes::from_static(b"ab"), None).unwrap();
        sink.push(Bytes::from_static(b"cd"), None).unwrap();
        assert_eq!(stream.state(), StreamState::Open);
        assert_eq!(stream.buffered_bytes(), 4);
        sink.close();

        assert_eq!(stream.read_all().await.unwrap().as_ref(), b"abcd");
    }

    #[tokio::test]
    async fn queued_chunk_does_not_alias_its_source() {
        let (mut stream, sink) = detached(1);
        let source = Bytes::from(vec![7u8; 4096]);
        sink.push(source.slice(100..101), None).unwrap();

        let chunk = stream.next().await.unwrap().unwrap();
        assert_eq!(chunk.as_ref(), &[7]);
        let range = source.as_ptr_range();
        assert!(!range.contains(&chunk.as_ptr()));
    }

    #[tokio::test]
    async fn reader_waits_for_data() {
        let (mut stream, sink) = detached(1);
        assert!(stream.next().now_or_never().is_none());

        let reader = tokio::spawn(async move { stream.next().await });
        tokio::task::yield_now().await;
        sink.push(Bytes::from_static(b"x"), None).unwrap();

        let chunk = reader.await.unwrap().unwrap().unwrap();
        assert_eq!(chunk.as_ref(), b"x");
    }

    #[tokio::test]
    async fn failure_discards_queue_and_yields_error_once() {
        let (mut stream, sink) = detached(3);
        sink.push(Bytes::from_static(b"lost"), None).unwrap();
        sink.fail(DecodeError::Remote {
            stream_id: 3,
            message: "Stream failed".into(),
        });

        let err = stream.next().await.unwrap().unwrap_err();
        assert_eq!(err.to_string(), "Stream failed");
        assert!(stream.next().await.is_none());
        assert_eq!(stream.state(), StreamState::Errored);
    }

    #[tokio::test]
    async fn failure_is_reported_to_every_handle() {
        let (mut first, sink) = detached(3);
        let second = first.clone();
        sink.fail(DecodeError::Remote {
            stream_id: 3,
            message: "boom".into(),
        });

        assert!(first.next().await.unwrap().is_err());
        assert!(second.read_all().await.is_err());
        assert!(first.clone().read_all().await.is_err());
        assert!(first.next().await.is_none());
    }

    #[tokio::test]
    async fn cancel_keeps_error_for_unread_handles() {
        let (stream, sink) = detached(3);
        sink.fail(DecodeError::Cancelled);
        stream.cancel();
        assert_eq!(stream.state(), StreamState::Errored);
        assert!(matches!(stream.read_all().await, Err(DecodeError::Cancelled)));
    }

    #[test]
    fn each_handle_keeps_one_waker() {
        let (mut stream, sink) = detached(1);
        let other = stream.clone();
        for _ in 0..8 {
            assert!(stream.next().now_or_never().is_none());
        }
        assert_eq!(sink.shared.lock().wakers.len(), 1);

        let mut polled = other.clone();
        assert!(polled.next().now_or_never().is_none());
        assert_eq!(sink.shared.lock().wakers.len(), 2);
        drop(polled);
        assert_eq!(sink.shared.lock().wakers.len(), 1);
        drop(other);
    }

    #[tokio::test]
    async fn terminal_state_is_sticky() {
        let (stream, sink) = detached(2);
        sink.close();
        sink.fail(DecodeError::Cancelled);
        assert_eq!(stream.state(), StreamState::Closed);
        sink.push(Bytes::from_static(b"late"), None).unwrap();
        assert_eq!(stream.buffered_bytes(), 0);
    }

    #[test]
    fn per_stream_ceiling_is_enforced() {
        let (stream, sink) = detached(4);
        sink.push(Bytes::from_static(b"1234"), Some(6)).unwrap();
        let err = sink.push(Bytes::from_static(b"567"), Some(6)).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::StreamBufferOverflow {
                stream_id: 4,
                max: 6
            }
        ));
        assert_eq!(stream.buffered_bytes(), 4);
    }

    #[tokio::test]
    async fn cancel_drops_buffer_and_ends_reads() {
        let (mut stream, sink) = detached(6);
        sink.push(Bytes::from_static(b"abc"), None).unwrap();
        stream.cancel();
        assert_eq!(stream.state(), StreamState::Cancelled);
        assert!(stream.next().await.is_none());
        sink.push(Bytes::from_static(b"more"), None).unwrap();
        assert_eq!(stream.buffered_bytes(), 0);
    }

    #[tokio::test]
    async fn finished_streams_never_block() {
        let closed = RawStream::finished(8, None);
        assert_eq!(closed.state(), StreamState::Closed);
        assert!(closed.read_all().await.unwrap().is_empty());

        let errored = RawStream::finished(8, Some(DecodeError::Cancelled));
        assert!(matches!(errored.read_all().await, Err(DecodeError::Cancelled)));
    }

    #[test]
    fn clones_share_identity() {
        let (a, _sink) = detached(1);
        let b = a.clone();
        let (c, _other) = detached(1);
        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&c));
    }
}
