//! Error types for brook-fetch.
//!
//! Every failure mode of a fetch collapses to exactly one of these
//! variants, delivered once through the loader's result channel.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// A network-level refusal: CSP block, unsupported scheme, mode
    /// violation, redirect-to-data violation, or a bad `Location` header.
    #[error("network error: {0}")]
    Network(String),

    /// The CORS access check failed.
    #[error("access control check failed: {0}")]
    AccessControl(String),

    /// A redirect violated the redirect policy (hop limit, redirect mode
    /// `error`, or a transport-level redirect check).
    #[error("redirect check failed")]
    RedirectCheck,

    /// The body digest did not match the integrity metadata, or the
    /// metadata did not parse.
    #[error("integrity verification failed")]
    Integrity,

    /// A transport failure. The message is empty unless the transport
    /// reported a recognized internal-domain error; cancellation and
    /// timeout details are redacted.
    #[error("transport error: {0}")]
    Transport(String),
}

pub type Result<T> = std::result::Result<T, FetchError>;
