//! I/O orchestration behind trait abstraction.

pub use loader::{FetchLoader, LoaderState};
pub use policy::{PermissivePolicy, Policy};
pub use transport::{
    DispatchOptions, Transport, TransportClient, TransportError, TransportErrorKind,
};
pub use verifier::{IntegrityVerifier, VerifierState};

pub mod loader;
pub mod policy;
pub mod transport;
pub mod verifier;
