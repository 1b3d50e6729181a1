//! Single-reader byte streams with tee, drain fast paths and body
//! bookkeeping.
//!
//! # Architecture
//!
//! - [`stream`] - The [`ByteStream`] substrate: one attached reader,
//!   `begin_read`/`end_read` discipline, `readable().await` suspension
//! - [`tee`] - Duplicate one stream into two byte-identical outputs
//! - [`body`] - [`BodyBuffer`]: locked/disturbed flags, drains, sink loading
//! - [`data`] - [`Blob`] and [`FormData`] drain targets
//!
//! # Key Invariants
//!
//! - **Single reader**: at most one reader is attached at a time; detaching
//!   keeps queued bytes for the next reader
//! - **Prefix before error**: chunks queued before a producer error remain
//!   readable; the error surfaces only after the queue drains
//! - **Zero-byte reads don't disturb**: only consuming at least one byte
//!   (or a successful drain) makes a body undrainable

pub use body::{BodyBuffer, LoadAs, LoadSink};
pub use data::{Blob, FormData};
pub use error::{Result, StreamError};
pub use stream::{BeginRead, ByteStream, ReadChunk, StreamReader, StreamState, StreamWriter};
pub use tee::tee;

pub mod body;
pub mod data;
pub mod error;
pub mod stream;
pub mod tee;
