//! Response tainting classification.
//!
//! One pure decision procedure, evaluated per response and re-evaluated
//! after each redirect hop. Precedence, highest first: redirect status with
//! a `Location` header, a service-worker-declared response type, a `data:`
//! response URL, then the origin comparison.

use url::Url;

use crate::data::{
    FetchRequest, RequestMode, ResponseHead, ResponseTainting, ServiceWorkerResponseType,
};
use crate::error::{FetchError, Result};

/// The HTTP redirect status codes.
pub fn is_redirect_status(status: u16) -> bool {
    matches!(status, 301 | 302 | 303 | 307 | 308)
}

/// Extract and validate the redirect target of `head`.
///
/// Returns `Ok(None)` when `head` is not a redirect (non-redirect status,
/// or a redirect status with no `Location` header). More than one
/// `Location` header, or a value that does not parse as a URL against the
/// response URL, is a network error.
pub fn redirect_location(head: &ResponseHead) -> Result<Option<Url>> {
    if !is_redirect_status(head.status) {
        return Ok(None);
    }
    let locations = head.header_values("location");
    match locations.as_slice() {
        [] => Ok(None),
        [location] => head
            .url
            .join(location)
            .map(Some)
            .map_err(|_| FetchError::Network("Invalid Location header.".to_string())),
        _ => Err(FetchError::Network("Multiple Location header.".to_string())),
    }
}

/// Classify `head` for a request, given the policy's same-origin verdict.
///
/// # Panics
///
/// A service-worker response type of `opaque-redirect` or `error` must be
/// handled before classification (as a redirect or a direct failure);
/// reaching the classifier with one is a programming error, as is a
/// cross-origin response under `same-origin` mode.
pub fn classify(
    request: &FetchRequest,
    same_origin: bool,
    head: &ResponseHead,
) -> Result<ResponseTainting> {
    // Redirect handling overrides everything else.
    if redirect_location(head)?.is_some() {
        return Ok(ResponseTainting::OpaqueRedirect);
    }

    // A service worker's declared type overrides URL and origin checks.
    if let Some(response_type) = head.service_worker_response_type {
        return Ok(match response_type {
            ServiceWorkerResponseType::Basic | ServiceWorkerResponseType::Default => {
                ResponseTainting::Basic
            }
            ServiceWorkerResponseType::Cors => ResponseTainting::Cors,
            ServiceWorkerResponseType::Opaque => ResponseTainting::Opaque,
            ServiceWorkerResponseType::OpaqueRedirect | ServiceWorkerResponseType::Error => {
                unreachable!(
                    "service worker response type {response_type:?} must be handled before classification"
                )
            }
        });
    }

    if head.url.scheme() == "data" {
        if request.url == head.url {
            return Ok(ResponseTainting::Basic);
        }
        return match request.mode {
            RequestMode::NoCors => Ok(ResponseTainting::Opaque),
            _ => Err(FetchError::Network(
                "redirects to data: URL are allowed only in no-cors mode".to_string(),
            )),
        };
    }

    if !same_origin {
        return match request.mode {
            RequestMode::SameOrigin => {
                unreachable!("same-origin mode must be rejected before dispatch")
            }
            RequestMode::NoCors => Ok(ResponseTainting::Opaque),
            RequestMode::Cors | RequestMode::CorsWithForcedPreflight => Ok(ResponseTainting::Cors),
            RequestMode::Navigate => Err(FetchError::Network(
                "navigate mode is not allowed for cross-origin responses".to_string(),
            )),
        };
    }

    Ok(ResponseTainting::Basic)
}
