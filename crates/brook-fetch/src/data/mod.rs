//! Immutable request and response types.

pub use request::{CredentialsMode, FetchRequest, RedirectMode, RequestMode, RequestPriority};
pub use response::{
    FetchResponse, ResponseHead, ResponseTainting, ServiceWorkerResponseType, filtered_response,
};

pub mod request;
pub mod response;
