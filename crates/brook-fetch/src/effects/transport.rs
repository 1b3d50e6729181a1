//! The network transport seam.
//!
//! The loader is purely a client of this interface: it dispatches a
//! request and receives headers, a body stream, a completion signal, and
//! failures through [`TransportClient`].
//!
//! Implementations MUST deliver client callbacks from a separate task (or
//! otherwise deferred), never synchronously from within
//! [`Transport::start`]; the loader relies on this to stay re-entrant-safe.

use std::sync::Arc;

use brook_stream::ByteStream;

use crate::data::{FetchRequest, RequestPriority, ResponseHead};

/// Coarse transport failure classification, used for message redaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The request was cancelled.
    Cancellation,
    /// The request timed out.
    Timeout,
    /// A recognized internal-domain error whose message is safe to expose.
    Internal,
    /// Anything else.
    Other,
}

/// A transport-level failure.
#[derive(Debug, Clone)]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn cancellation() -> Self {
        Self {
            kind: TransportErrorKind::Cancellation,
            message: String::new(),
        }
    }

    pub fn timeout() -> Self {
        Self {
            kind: TransportErrorKind::Timeout,
            message: String::new(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Internal,
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Other,
            message: message.into(),
        }
    }
}

/// Flags the loader's decision ladder attaches to a dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOptions {
    /// The fetch runs under the CORS protocol.
    pub cors_flag: bool,
    /// A preflight is required before the actual request.
    pub preflight_flag: bool,
}

/// Callbacks a transport delivers for one dispatched request.
pub trait TransportClient: Send + Sync {
    /// Headers arrived; `body` streams the payload.
    ///
    /// A service-worker response type of `OpaqueRedirect` or `Error` must
    /// be resolved by the transport before delivery: the former as a
    /// redirect response, the latter through [`TransportClient::on_failed`].
    /// A head carrying either type violates the seam contract and panics
    /// during classification.
    fn on_response_received(&self, head: ResponseHead, body: ByteStream);

    /// The transport finished delivering the body. Independent of any
    /// consumer-side processing still in flight.
    fn on_finished_loading(&self);

    /// The request failed at the transport level.
    fn on_failed(&self, error: TransportError);

    /// The CORS access check failed.
    fn on_failed_access_control_check(&self, message: String);

    /// A transport-level redirect check failed.
    fn on_failed_redirect_check(&self);
}

/// An asynchronous request transport.
///
/// `start` must not block and must not invoke `client` callbacks
/// synchronously. After `cancel`, no further callbacks may be delivered.
/// Service-worker `OpaqueRedirect`/`Error` response types are the
/// transport's to resolve; see
/// [`TransportClient::on_response_received`].
pub trait Transport: Send {
    fn start(
        &mut self,
        request: &FetchRequest,
        options: DispatchOptions,
        client: Arc<dyn TransportClient>,
    );

    fn cancel(&mut self);

    fn set_priority(&mut self, _priority: RequestPriority) {}
}
