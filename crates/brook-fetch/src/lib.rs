//! A fetch pipeline over [`brook_stream`] bodies.
//!
//! The crate is layered the same way throughout:
//!
//! - [`data`]: request/response value types and the header-filtered
//!   response view.
//! - [`core`]: pure classification logic with no I/O: CORS simplicity,
//!   response tainting, subresource-integrity metadata, `data:` URL
//!   decoding.
//! - [`effects`]: the [`FetchLoader`] state machine and the seams it
//!   drives: [`Transport`] for the network, [`Policy`] for embedder
//!   security decisions, and the integrity verifier that gates a body
//!   behind its digest check.
//!
//! A fetch is one loader: build a [`FetchRequest`], hand it to
//! [`FetchLoader::new`] with a transport and a policy, call `start`, and
//! await the result receiver for the single terminal [`FetchResponse`] or
//! [`FetchError`].

pub mod core;
pub mod data;
pub mod effects;
pub mod error;

pub use data::{FetchRequest, FetchResponse, RedirectMode, RequestMode, ResponseTainting};
pub use effects::{FetchLoader, LoaderState, Policy, Transport};
pub use error::{FetchError, Result};
