//! Pull-based single-reader byte streams.
//!
//! A [`ByteStream`] is a queue of [`Bytes`] chunks fed by a producer (a
//! [`StreamWriter`], a tee pump, or a pre-materialized value) and drained by
//! at most one attached [`StreamReader`]. Reads follow the
//! `readable().await` + non-async `begin_read`/`end_read` discipline, so a
//! caller that sees [`BeginRead::ShouldWait`] suspends on the readability
//! future instead of polling.
//!
//! State machine:
//!
//! ```text
//! Waiting ⇄ Readable → Closed
//!    ↘         ↘
//!      ───────→ Errored
//! ```
//!
//! Queued chunks that precede an error remain readable; the error surfaces
//! only once the queue is exhausted.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::{Buf, Bytes};
use futures_util::{Stream, StreamExt};
use tokio::sync::Notify;

use crate::data::{Blob, FormData};
use crate::error::{Result, StreamError};

/// Observable state of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// No chunk is queued and the producer has not finished.
    Waiting,
    /// At least one chunk is queued.
    Readable,
    /// All chunks were delivered and the producer finished cleanly.
    Closed,
    /// The producer failed; the queue is exhausted.
    Errored,
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Waiting => f.write_str("waiting"),
            Self::Readable => f.write_str("readable"),
            Self::Closed => f.write_str("closed"),
            Self::Errored => f.write_str("errored"),
        }
    }
}

/// Outcome of [`StreamReader::begin_read`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BeginRead {
    /// A view of the front chunk. Call [`StreamReader::end_read`] with the
    /// number of bytes actually consumed.
    Chunk(Bytes),
    /// Nothing queued yet; suspend on [`StreamReader::readable`].
    ShouldWait,
    /// The stream is exhausted.
    Done,
}

/// Outcome of the [`StreamReader::read`] convenience wrapper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadChunk {
    /// Consumed bytes (possibly empty for a zero-length read).
    Data(Bytes),
    /// Nothing queued yet; suspend on [`StreamReader::readable`].
    ShouldWait,
    /// The stream is exhausted.
    Done,
}

#[derive(Debug, Clone)]
enum Terminal {
    Done,
    Error(String),
}

#[derive(Default)]
struct Core {
    chunks: VecDeque<Bytes>,
    terminal: Option<Terminal>,
    reader_attached: bool,
    read_in_flight: bool,
    disturbed: bool,
    drained: bool,
    blob: Option<Blob>,
    form_data: Option<FormData>,
}

impl Core {
    fn state(&self) -> StreamState {
        if self.drained {
            return StreamState::Closed;
        }
        if !self.chunks.is_empty() {
            return StreamState::Readable;
        }
        match self.terminal {
            None => StreamState::Waiting,
            Some(Terminal::Done) => StreamState::Closed,
            Some(Terminal::Error(_)) => StreamState::Errored,
        }
    }
}

struct Shared {
    core: Mutex<Core>,
    readable: Notify,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// A single-reader byte source. See the module docs for the contract.
pub struct ByteStream {
    shared: Arc<Shared>,
}

impl fmt::Debug for ByteStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteStream")
            .field("state", &self.state())
            .finish()
    }
}

impl ByteStream {
    fn with_core(core: Core) -> Self {
        Self {
            shared: Arc::new(Shared {
                core: Mutex::new(core),
                readable: Notify::new(),
            }),
        }
    }

    /// Create a writer/stream pair. The writer side feeds chunks; dropping
    /// it without closing puts the stream into the error state so readers
    /// terminate deterministically.
    pub fn channel() -> (StreamWriter, ByteStream) {
        let stream = Self::with_core(Core::default());
        let writer = StreamWriter {
            shared: Arc::clone(&stream.shared),
            finished: false,
        };
        (writer, stream)
    }

    /// A stream over a fixed byte payload, already closed.
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let mut core = Core {
            terminal: Some(Terminal::Done),
            ..Core::default()
        };
        if !data.is_empty() {
            core.chunks.push_back(data);
        }
        Self::with_core(core)
    }

    /// An empty, already-closed stream.
    pub fn empty() -> Self {
        Self::from_bytes(Bytes::new())
    }

    /// A stream that is already in the error state.
    pub fn errored(message: impl Into<String>) -> Self {
        Self::with_core(Core {
            terminal: Some(Terminal::Error(message.into())),
            ..Core::default()
        })
    }

    /// A stream backed by a blob. Reads observe the blob's bytes; while no
    /// byte has been consumed, [`ByteStream::drain_as_blob`] returns the
    /// blob without reading.
    pub fn from_blob(blob: Blob) -> Self {
        let mut core = Core {
            terminal: Some(Terminal::Done),
            ..Core::default()
        };
        if blob.size() > 0 {
            core.chunks.push_back(blob.bytes().clone());
        }
        core.blob = Some(blob);
        Self::with_core(core)
    }

    /// A stream backed by form data. Reads observe the urlencoded wire
    /// form; while no byte has been consumed,
    /// [`ByteStream::drain_as_form_data`] returns the form without reading.
    pub fn from_form_data(form: FormData) -> Self {
        let encoded = form.encode();
        let mut core = Core {
            terminal: Some(Terminal::Done),
            ..Core::default()
        };
        if !encoded.is_empty() {
            core.chunks.push_back(encoded);
        }
        core.form_data = Some(form);
        Self::with_core(core)
    }

    /// Bridge a `futures` stream of byte chunks.
    ///
    /// A pump task forwards chunks until the source ends or yields an
    /// error. Requires a tokio runtime.
    pub fn wrap_stream<S, E>(source: S) -> Self
    where
        S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
        E: fmt::Display + Send,
    {
        let (writer, stream) = Self::channel();
        tokio::spawn(async move {
            let mut source = std::pin::pin!(source);
            while let Some(item) = source.next().await {
                match item {
                    Ok(chunk) => writer.write(chunk),
                    Err(e) => {
                        writer.error(e.to_string());
                        return;
                    }
                }
            }
            writer.close();
        });
        stream
    }

    /// Current observable state.
    pub fn state(&self) -> StreamState {
        self.shared.lock().state()
    }

    /// Whether a reader is currently attached.
    pub fn has_reader(&self) -> bool {
        self.shared.lock().reader_attached
    }

    /// Whether at least one byte has been consumed through a reader.
    pub fn is_disturbed(&self) -> bool {
        self.shared.lock().disturbed
    }

    /// Attach the single permitted reader.
    ///
    /// Fails with [`StreamError::ReaderAttached`] while another reader is
    /// live. Dropping the reader detaches it; queued bytes survive the
    /// detach and are delivered to the next reader.
    pub fn attach_reader(&self) -> Result<StreamReader> {
        let mut core = self.shared.lock();
        if core.reader_attached {
            return Err(StreamError::ReaderAttached);
        }
        core.reader_attached = true;
        Ok(StreamReader {
            shared: Arc::clone(&self.shared),
        })
    }

    /// Drain the backing blob, if any.
    ///
    /// Succeeds only if the stream is blob-backed and no byte has been
    /// consumed. On success the stream closes: subsequent reads observe
    /// `Done` with no data and further drains return `None`.
    pub fn drain_as_blob(&self) -> Option<Blob> {
        let mut core = self.shared.lock();
        if core.disturbed || core.drained {
            return None;
        }
        let blob = core.blob.take()?;
        core.drained = true;
        core.chunks.clear();
        core.form_data = None;
        drop(core);
        self.shared.readable.notify_waiters();
        Some(blob)
    }

    /// Drain the backing form data, if any. Same contract as
    /// [`ByteStream::drain_as_blob`].
    pub fn drain_as_form_data(&self) -> Option<FormData> {
        let mut core = self.shared.lock();
        if core.disturbed || core.drained {
            return None;
        }
        let form = core.form_data.take()?;
        core.drained = true;
        core.chunks.clear();
        core.blob = None;
        drop(core);
        self.shared.readable.notify_waiters();
        Some(form)
    }

    /// A copy of the backing blob without draining, if still drainable.
    pub(crate) fn cached_blob(&self) -> Option<Blob> {
        let core = self.shared.lock();
        if core.disturbed || core.drained {
            return None;
        }
        core.blob.clone()
    }

    /// A copy of the backing form data without draining, if still drainable.
    pub(crate) fn cached_form_data(&self) -> Option<FormData> {
        let core = self.shared.lock();
        if core.disturbed || core.drained {
            return None;
        }
        core.form_data.clone()
    }
}

/// The producer half of [`ByteStream::channel`].
pub struct StreamWriter {
    shared: Arc<Shared>,
    finished: bool,
}

impl StreamWriter {
    /// Queue a chunk. Empty chunks and writes after a terminal state are
    /// ignored. The readability notification fires after the queue
    /// mutation completes.
    pub fn write(&self, data: impl Into<Bytes>) {
        let data = data.into();
        if data.is_empty() {
            return;
        }
        {
            let mut core = self.shared.lock();
            if core.terminal.is_some() || core.drained {
                return;
            }
            core.chunks.push_back(data);
        }
        self.shared.readable.notify_waiters();
    }

    /// Finish the stream cleanly. Queued chunks stay readable.
    pub fn close(mut self) {
        self.terminate(Terminal::Done);
    }

    /// Put the stream into the error state. Queued chunks stay readable;
    /// the error surfaces once the queue is exhausted.
    pub fn error(mut self, message: impl Into<String>) {
        self.terminate(Terminal::Error(message.into()));
    }

    /// Write the whole payload and close, consuming the writer.
    ///
    /// This is the one-shot resolution used by placeholder streams: the
    /// writer is consumed, so a second resolution cannot compile.
    pub fn resolve(self, outcome: std::result::Result<Bytes, String>) {
        match outcome {
            Ok(data) => {
                self.write(data);
                self.close();
            }
            Err(message) => self.error(message),
        }
    }

    fn terminate(&mut self, terminal: Terminal) {
        if self.finished {
            return;
        }
        self.finished = true;
        {
            let mut core = self.shared.lock();
            if core.terminal.is_none() {
                core.terminal = Some(terminal);
            }
        }
        self.shared.readable.notify_waiters();
    }
}

impl Drop for StreamWriter {
    fn drop(&mut self) {
        // A writer that disappears without closing must not leave readers
        // hanging in Waiting.
        self.terminate(Terminal::Error("stream writer dropped".into()));
    }
}

/// The single attached reader of a [`ByteStream`].
pub struct StreamReader {
    shared: Arc<Shared>,
}

impl StreamReader {
    /// Suspend until the stream leaves the Waiting state, then return the
    /// state observed.
    pub async fn readable(&self) -> StreamState {
        loop {
            let notified = self.shared.readable.notified();
            let mut notified = std::pin::pin!(notified);
            // Register as a waiter before the state check: notify_waiters
            // only wakes already-registered waiters, so a notification
            // landing between the check and the first poll would otherwise
            // be lost.
            notified.as_mut().enable();
            let state = self.shared.lock().state();
            if state != StreamState::Waiting {
                return state;
            }
            notified.await;
        }
    }

    /// Expose the front chunk without consuming it.
    ///
    /// At most one read may be in flight; finish it with
    /// [`StreamReader::end_read`]. An errored stream with an exhausted
    /// queue returns [`StreamError::Errored`].
    pub fn begin_read(&mut self) -> Result<BeginRead> {
        let mut core = self.shared.lock();
        if core.read_in_flight {
            return Err(StreamError::ReadInFlight);
        }
        if core.drained {
            return Ok(BeginRead::Done);
        }
        if let Some(front) = core.chunks.front() {
            let view = front.clone();
            core.read_in_flight = true;
            return Ok(BeginRead::Chunk(view));
        }
        match &core.terminal {
            None => Ok(BeginRead::ShouldWait),
            Some(Terminal::Done) => Ok(BeginRead::Done),
            Some(Terminal::Error(message)) => Err(StreamError::Errored(message.clone())),
        }
    }

    /// Consume `consumed` bytes of the chunk exposed by the in-flight
    /// `begin_read`. Consuming at least one byte disturbs the stream; a
    /// zero-byte `end_read` leaves drain fast paths intact.
    pub fn end_read(&mut self, consumed: usize) -> Result<()> {
        let mut core = self.shared.lock();
        if !core.read_in_flight {
            return Err(StreamError::NoReadInFlight);
        }
        core.read_in_flight = false;
        let Some(front) = core.chunks.front_mut() else {
            return Err(StreamError::NoReadInFlight);
        };
        if consumed > front.len() {
            return Err(StreamError::OverConsumed {
                consumed,
                available: front.len(),
            });
        }
        front.advance(consumed);
        if front.is_empty() {
            core.chunks.pop_front();
        }
        if consumed > 0 {
            core.disturbed = true;
        }
        Ok(())
    }

    /// Convenience wrapper over the `begin_read`/`end_read` pair: consume
    /// up to `max` bytes of the front chunk.
    ///
    /// A `max` of zero observing a queued chunk returns empty
    /// [`ReadChunk::Data`] and does not disturb the stream.
    pub fn read(&mut self, max: usize) -> Result<ReadChunk> {
        match self.begin_read()? {
            BeginRead::Chunk(chunk) => {
                let take = max.min(chunk.len());
                self.end_read(take)?;
                Ok(ReadChunk::Data(chunk.slice(..take)))
            }
            BeginRead::ShouldWait => Ok(ReadChunk::ShouldWait),
            BeginRead::Done => Ok(ReadChunk::Done),
        }
    }

    /// Await and consume the next whole chunk. Returns `None` once the
    /// stream closes cleanly.
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        loop {
            match self.read(usize::MAX)? {
                ReadChunk::Data(chunk) => return Ok(Some(chunk)),
                ReadChunk::ShouldWait => {
                    self.readable().await;
                }
                ReadChunk::Done => return Ok(None),
            }
        }
    }
}

impl Drop for StreamReader {
    fn drop(&mut self) {
        let mut core = self.shared.lock();
        core.reader_attached = false;
        core.read_in_flight = false;
    }
}
