//! Stream registry: the one structure shared between the driver task and
//! callers of `get_or_create_stream`.
//!
//! Eviction rules differ by how a stream ends. END/ERROR keep the stream
//! object so late readers still see its data; an explicit consumer cancel
//! evicts it so a later lookup starts fresh.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tracing::debug;

use crate::error::{DecodeError, Result};
use crate::stream::{RawStream, Shared, StreamSink};

/// Lifecycle of the decoder as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderPhase {
    /// Reading input and dispatching frames.
    Running,
    /// Input exhausted; flushing what is already buffered.
    Draining,
    /// Finished successfully.
    Closed,
    /// Finished with a fatal error or cancellation.
    Failed,
}

impl DecoderPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Closed => "closed",
            Self::Failed => "failed",
        }
    }
}

/// How the producer finished a stream.
pub(crate) enum Termination {
    End,
    Error(String),
}

struct Entry {
    stream: RawStream,
    sink: Option<StreamSink>,
}

struct Inner {
    streams: HashMap<u32, Entry>,
    terminated: HashSet<u32>,
    cancelled: HashSet<u32>,
    phase: DecoderPhase,
    failure: Option<DecodeError>,
}

pub(crate) struct RegistryShared {
    inner: Mutex<Inner>,
    max_streams: usize,
    max_stream_buffered: Option<usize>,
    this: std::sync::Weak<RegistryShared>,
}

impl RegistryShared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Consumer-side cancel of one stream.
    pub(crate) fn cancel_stream(&self, id: u32, shared: &Arc<Shared>) {
        let mut inner = self.lock();
        let is_current = inner
            .streams
            .get(&id)
            .is_some_and(|entry| entry.stream.same_shared(shared));
        if is_current {
            inner.streams.remove(&id);
            if !inner.phase.is_terminal() {
                inner.cancelled.insert(id);
            }
            debug!(stream_id = id, "raw stream cancelled by consumer");
        }
    }
}

/// Handle on the set of raw streams of one decoder.
///
/// Cheap to clone; every clone sees the same registry.
#[derive(Clone)]
pub struct StreamRegistry {
    shared: Arc<RegistryShared>,
}

impl StreamRegistry {
    pub(crate) fn new(max_streams: usize, max_stream_buffered: Option<usize>) -> Self {
        let shared = Arc::new_cyclic(|this| RegistryShared {
            inner: Mutex::new(Inner {
                streams: HashMap::new(),
                terminated: HashSet::new(),
                cancelled: HashSet::new(),
                phase: DecoderPhase::Running,
                failure: None,
            }),
            max_streams,
            max_stream_buffered,
            this: this.clone(),
        });
        Self { shared }
    }

    /// Get the stream for `id`, creating it if needed.
    ///
    /// Safe to call at any time and any number of times: the same id yields
    /// the same stream object while one is registered. Ids whose END/ERROR was
    /// already processed, and whose object is gone, yield an already closed
    /// stream so the caller never waits on data that cannot arrive.
    pub fn get_or_create_stream(&self, id: u32) -> Result<RawStream> {
        if id == 0 {
            return Err(DecodeError::ReservedStreamId);
        }
        let mut inner = self.shared.lock();
        if let Some(entry) = inner.streams.get(&id) {
            return Ok(entry.stream.clone());
        }
        if inner.terminated.contains(&id) {
            return Ok(RawStream::finished(id, None));
        }
        match inner.phase {
            DecoderPhase::Failed => {
                return Ok(RawStream::finished(id, inner.failure.clone()));
            }
            DecoderPhase::Closed => return Ok(RawStream::finished(id, None)),
            DecoderPhase::Running | DecoderPhase::Draining => {}
        }
        // A consumer asking again after cancelling gets a fresh stream that
        // receives whatever the producer still sends.
        inner.cancelled.remove(&id);
        self.create_locked(&mut inner, id)
    }

    fn create_locked(&self, inner: &mut Inner, id: u32) -> Result<RawStream> {
        if inner.streams.len() >= self.shared.max_streams {
            return Err(DecodeError::TooManyStreams {
                max: self.shared.max_streams,
            });
        }
        let (stream, sink) = RawStream::new(id, self.shared.this.clone());
        inner.streams.insert(
            id,
            Entry {
                stream: stream.clone(),
                sink: Some(sink),
            },
        );
        debug!(stream_id = id, live = inner.streams.len(), "raw stream registered");
        Ok(stream)
    }

    /// Number of stream objects currently registered.
    pub fn live_streams(&self) -> usize {
        self.shared.lock().streams.len()
    }

    /// True once END or ERROR for `id` has been processed.
    pub fn is_terminated(&self, id: u32) -> bool {
        self.shared.lock().terminated.contains(&id)
    }

    /// Every id seen so far: registered streams plus terminated ids, sorted.
    pub fn known_stream_ids(&self) -> Vec<u32> {
        let inner = self.shared.lock();
        let ids: BTreeSet<u32> = inner
            .streams
            .keys()
            .chain(inner.terminated.iter())
            .copied()
            .collect();
        ids.into_iter().collect()
    }

    pub fn phase(&self) -> DecoderPhase {
        self.shared.lock().phase
    }

    /// The error the decoder failed with, if it failed.
    pub fn failure(&self) -> Option<DecodeError> {
        self.shared.lock().failure.clone()
    }

    pub(crate) fn set_phase(&self, phase: DecoderPhase) {
        let mut inner = self.shared.lock();
        if !inner.phase.is_terminal() {
            inner.phase = phase;
        }
    }

    /// Route a CHUNK payload to its stream, creating the stream if needed.
    pub(crate) fn dispatch_chunk(&self, id: u32, data: Bytes) -> Result<()> {
        let mut inner = self.shared.lock();
        if inner.phase.is_terminal() || inner.cancelled.contains(&id) {
            return Ok(());
        }
        if !inner.streams.contains_key(&id) {
            self.create_locked(&mut inner, id)?;
        }
        match inner.streams.get(&id).and_then(|entry| entry.sink.as_ref()) {
            Some(sink) => sink.push(data, self.shared.max_stream_buffered),
            // Producer kept writing after END/ERROR.
            None => Ok(()),
        }
    }

    /// Apply END or ERROR to a stream, creating it first so zero-chunk
    /// streams still close or fail.
    pub(crate) fn terminate(&self, id: u32, termination: Termination) -> Result<()> {
        let mut inner = self.shared.lock();
        if inner.phase.is_terminal() {
            return Ok(());
        }
        inner.terminated.insert(id);
        if inner.cancelled.contains(&id) {
            return Ok(());
        }
        if !inner.streams.contains_key(&id) {
            self.create_locked(&mut inner, id)?;
        }
        let sink = inner.streams.get_mut(&id).and_then(|entry| entry.sink.take());
        if let Some(sink) = sink {
            match termination {
                Termination::End => sink.close(),
                Termination::Error(message) => sink.fail(DecodeError::Remote {
                    stream_id: id,
                    message,
                }),
            }
        }
        Ok(())
    }

    /// Close every stream still open without an END. Transitions to `Closed`.
    pub(crate) fn close_all(&self) -> usize {
        let mut inner = self.shared.lock();
        let mut closed = 0;
        for entry in inner.streams.values_mut() {
            if let Some(sink) = entry.sink.take() {
                sink.close();
                closed += 1;
            }
        }
        inner.cancelled.clear();
        if !inner.phase.is_terminal() {
            inner.phase = DecoderPhase::Closed;
        }
        closed
    }

    /// Fail every stream still open with `error`, exactly once. Transitions to `Failed`.
    ///
    /// With `evict`, the registry is cleared as well (consumer cancellation).
    /// Returns false if the decoder had already finished.
    pub(crate) fn fail_all(&self, error: DecodeError, evict: bool) -> bool {
        let mut inner = self.shared.lock();
        if inner.phase.is_terminal() {
            return false;
        }
        for entry in inner.streams.values_mut() {
            if let Some(sink) = entry.sink.take() {
                sink.fail(error.clone());
            }
        }
        if evict {
            inner.streams.clear();
            inner.terminated.clear();
        }
        inner.cancelled.clear();
        inner.phase = DecoderPhase::Failed;
        inner.failure = Some(error);
        true
    }
}

impl std::fmt::Debug for StreamRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.shared.lock();
        f.debug_struct("StreamRegistry")
            .field("phase", &inner.phase)
            .field("live", &inner.streams.len())
            .field("terminated", &inner.terminated.len())
            .finish()
    }
}
