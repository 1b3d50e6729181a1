//! CORS simple-request classification.

use crate::data::FetchRequest;

/// Methods that never require a preflight.
pub fn is_simple_method(method: &str) -> bool {
    matches!(method, "GET" | "HEAD" | "POST")
}

const SIMPLE_CONTENT_TYPES: &[&str] = &[
    "application/x-www-form-urlencoded",
    "multipart/form-data",
    "text/plain",
];

/// Whether a request header is CORS-safelisted.
///
/// `Content-Type` is safelisted only for the three form/plain media types,
/// compared without parameters.
pub fn is_simple_header(name: &str, value: &str) -> bool {
    let name = name.to_ascii_lowercase();
    match name.as_str() {
        "accept" | "accept-language" | "content-language" => true,
        "content-type" => {
            let essence = value
                .split(';')
                .next()
                .unwrap_or("")
                .trim()
                .to_ascii_lowercase();
            SIMPLE_CONTENT_TYPES.contains(&essence.as_str())
        }
        _ => false,
    }
}

/// Whether a CORS fetch of `request` must be preflighted: a non-simple
/// method or any non-safelisted header forces the preflight.
pub fn needs_preflight(request: &FetchRequest) -> bool {
    if !is_simple_method(&request.method) {
        return true;
    }
    request
        .headers
        .iter()
        .any(|(name, value)| !is_simple_header(name, value))
}
