//! Error types for brook-stream.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StreamError {
    /// The stream reached its error terminal state.
    #[error("stream errored: {0}")]
    Errored(String),

    /// A reader is already attached to this stream.
    #[error("a reader is already attached")]
    ReaderAttached,

    /// `begin_read` was called while a previous read is still in flight.
    #[error("a read is already in flight")]
    ReadInFlight,

    /// `end_read` was called without a matching `begin_read`.
    #[error("no read in flight")]
    NoReadInFlight,

    /// `end_read` consumed more bytes than the chunk exposed.
    #[error("consumed {consumed} bytes but only {available} were exposed")]
    OverConsumed { consumed: usize, available: usize },

    /// The operation requires an unlocked body buffer.
    #[error("body buffer is locked")]
    BufferLocked,
}

pub type Result<T> = std::result::Result<T, StreamError>;
