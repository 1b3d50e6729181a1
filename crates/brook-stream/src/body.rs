//! Body buffers: locked/disturbed bookkeeping over a byte stream.

use bytes::Bytes;

use crate::data::{Blob, FormData};
use crate::error::{Result, StreamError};
use crate::stream::{ByteStream, StreamReader};
use crate::tee;

/// How [`BodyBuffer::start_loading`] materializes the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadAs {
    /// Decode the payload as UTF-8 text (lossily).
    Text,
    /// Deliver the raw bytes.
    ArrayBuffer,
    /// Wrap the bytes in a [`Blob`] with the given content type.
    Blob { content_type: String },
}

/// Receiver for the outcome of [`BodyBuffer::start_loading`].
///
/// Exactly one of these callbacks fires per load: the one matching the
/// requested [`LoadAs`] on success, or `on_load_failed` once on error.
pub trait LoadSink: Send {
    fn on_loaded_as_string(&mut self, _text: String) {}
    fn on_loaded_as_array_buffer(&mut self, _data: Bytes) {}
    fn on_loaded_as_blob(&mut self, _blob: Blob) {}
    fn on_load_failed(&mut self, _error: StreamError) {}
}

/// The body of a request or response: one byte stream plus the locked and
/// disturbed flags that govern whether it may still be teed or drained.
///
/// `locked` means a reader has been obtained (or the buffer was forcibly
/// retired); `disturbed` means at least one byte was consumed or a drain
/// succeeded. Once disturbed, drains return `None`.
#[derive(Debug)]
pub struct BodyBuffer {
    stream: ByteStream,
    locked: bool,
    disturbed: bool,
}

impl BodyBuffer {
    /// A buffer over an arbitrary stream.
    pub fn new(stream: ByteStream) -> Self {
        Self {
            stream,
            locked: false,
            disturbed: false,
        }
    }

    /// A buffer whose payload is a pre-materialized blob; draining it as a
    /// blob is free until the first byte is consumed.
    pub fn from_blob(blob: Blob) -> Self {
        Self::new(ByteStream::from_blob(blob))
    }

    /// A buffer whose payload is pre-materialized form data.
    pub fn from_form_data(form: FormData) -> Self {
        Self::new(ByteStream::from_form_data(form))
    }

    /// A buffer over a fixed byte payload.
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        Self::new(ByteStream::from_bytes(data))
    }

    /// An empty, already-closed buffer.
    pub fn empty() -> Self {
        Self::new(ByteStream::empty())
    }

    /// Whether a reader has been obtained.
    pub fn is_locked(&self) -> bool {
        self.locked || self.stream.has_reader()
    }

    /// Whether any byte has been consumed or a drain has succeeded.
    pub fn is_disturbed(&self) -> bool {
        self.disturbed || self.stream.is_disturbed()
    }

    /// Split into two buffers that replay the same payload.
    ///
    /// Valid only while unlocked; neither result is locked or disturbed and
    /// the tee itself does not disturb. A cached blob or form payload is
    /// duplicated without touching any stream; otherwise the underlying
    /// stream is split with [`tee::tee`].
    pub fn tee(self) -> Result<(BodyBuffer, BodyBuffer)> {
        if self.is_locked() {
            return Err(StreamError::BufferLocked);
        }
        if let Some(blob) = self.stream.cached_blob() {
            return Ok((Self::from_blob(blob.clone()), Self::from_blob(blob)));
        }
        if let Some(form) = self.stream.cached_form_data() {
            return Ok((Self::from_form_data(form.clone()), Self::from_form_data(form)));
        }
        let (a, b) = tee::tee(self.stream)?;
        Ok((Self::new(a), Self::new(b)))
    }

    /// Drain the payload as a blob. Sets `disturbed` only on success.
    pub fn drain_as_blob(&mut self) -> Option<Blob> {
        let blob = self.stream.drain_as_blob()?;
        self.disturbed = true;
        Some(blob)
    }

    /// Drain the payload as form data. Sets `disturbed` only on success.
    pub fn drain_as_form_data(&mut self) -> Option<FormData> {
        let form = self.stream.drain_as_form_data()?;
        self.disturbed = true;
        Some(form)
    }

    /// Obtain the underlying reader, locking the buffer.
    pub fn attach_reader(&mut self) -> Result<StreamReader> {
        let reader = self.stream.attach_reader()?;
        self.locked = true;
        Ok(reader)
    }

    /// Pump the payload into `sink`, materializing it per `kind`.
    ///
    /// Locks the buffer immediately, before any byte arrives; the first
    /// non-empty chunk marks it disturbed. On stream error the sink's
    /// `on_load_failed` fires exactly once and the reader is released.
    pub async fn start_loading(&mut self, kind: LoadAs, sink: &mut dyn LoadSink) {
        self.locked = true;
        let mut reader = match self.stream.attach_reader() {
            Ok(reader) => reader,
            Err(e) => {
                sink.on_load_failed(e);
                return;
            }
        };
        let mut payload = Vec::new();
        loop {
            match reader.next_chunk().await {
                Ok(Some(chunk)) => {
                    self.disturbed = true;
                    payload.extend_from_slice(&chunk);
                }
                Ok(None) => break,
                Err(e) => {
                    sink.on_load_failed(e);
                    return;
                }
            }
        }
        match kind {
            LoadAs::Text => {
                sink.on_loaded_as_string(String::from_utf8_lossy(&payload).into_owned());
            }
            LoadAs::ArrayBuffer => sink.on_loaded_as_array_buffer(Bytes::from(payload)),
            LoadAs::Blob { content_type } => {
                sink.on_loaded_as_blob(Blob::new(payload, content_type));
            }
        }
    }

    /// Retire the buffer: replace the payload with an empty closed stream
    /// and force the locked and disturbed flags, without performing I/O.
    ///
    /// Used when a body is handed off to another owner.
    pub fn close_and_lock_and_disturb(&mut self) {
        self.stream = ByteStream::empty();
        self.locked = true;
        self.disturbed = true;
    }
}
