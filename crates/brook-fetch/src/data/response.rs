//! Response head, tainting classification values and the header-filtered
//! response view.

use brook_stream::BodyBuffer;
use url::Url;

/// The response type a service worker declared when it synthesized or
/// forwarded a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceWorkerResponseType {
    Basic,
    Default,
    Cors,
    Opaque,
    /// Handled as a redirect before classification ever runs.
    OpaqueRedirect,
    /// Handled as a direct failure before classification ever runs.
    Error,
}

/// The opacity classification of a fetched response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseTainting {
    /// Same-origin: the caller sees everything but forbidden headers.
    Basic,
    /// Cross-origin via CORS: only safelisted and exposed headers.
    Cors,
    /// Cross-origin without CORS: status and headers are hidden.
    Opaque,
    /// A redirect surfaced under redirect mode `manual`.
    OpaqueRedirect,
}

impl ResponseTainting {
    /// The string representation of this tainting.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseTainting::Basic => "basic",
            ResponseTainting::Cors => "cors",
            ResponseTainting::Opaque => "opaque",
            ResponseTainting::OpaqueRedirect => "opaqueredirect",
        }
    }
}

/// Headers and status of a transport response, before filtering.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    /// The URL the response was served from (after any transport-level
    /// processing).
    pub url: Url,

    /// HTTP status code.
    pub status: u16,

    /// Response headers in wire order. Names are matched
    /// case-insensitively.
    pub headers: Vec<(String, String)>,

    /// Set when a service worker produced the response.
    pub service_worker_response_type: Option<ServiceWorkerResponseType>,
}

impl ResponseHead {
    /// Create a head with no headers.
    pub fn new(url: Url, status: u16) -> Self {
        Self {
            url,
            status,
            headers: Vec::new(),
            service_worker_response_type: None,
        }
    }

    /// Add a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Mark the response as produced by a service worker.
    #[must_use]
    pub fn service_worker(mut self, response_type: ServiceWorkerResponseType) -> Self {
        self.service_worker_response_type = Some(response_type);
        self
    }

    /// First value of the named header, matched case-insensitively.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All values of the named header, in wire order.
    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }
}

/// The response value a fetch resolves with.
#[derive(Debug)]
pub struct FetchResponse {
    /// Response URL.
    pub url: Url,

    /// Status code after filtering; 0 for opaque views.
    pub status: u16,

    /// Headers after filtering.
    pub headers: Vec<(String, String)>,

    /// The tainting applied.
    pub tainting: ResponseTainting,

    /// The body. `None` only for opaque-redirect responses, which never
    /// materialize one.
    pub body: Option<BodyBuffer>,
}

/// Response headers any CORS response may expose.
const CORS_SAFELISTED_RESPONSE_HEADERS: &[&str] = &[
    "cache-control",
    "content-language",
    "content-length",
    "content-type",
    "expires",
    "last-modified",
    "pragma",
];

/// Headers never exposed to callers.
const FORBIDDEN_RESPONSE_HEADERS: &[&str] = &["set-cookie", "set-cookie2"];

/// Build the header-filtered view of `head` for `tainting`.
///
/// This is the single render step over the tainting variant: Basic drops
/// forbidden headers, Cors additionally keeps only safelisted headers plus
/// those named by `Access-Control-Expose-Headers`, and the opaque views
/// hide status and headers entirely.
pub fn filtered_response(
    head: ResponseHead,
    tainting: ResponseTainting,
    body: Option<BodyBuffer>,
) -> FetchResponse {
    match tainting {
        ResponseTainting::Basic => {
            let headers = head
                .headers
                .iter()
                .filter(|(n, _)| {
                    !FORBIDDEN_RESPONSE_HEADERS
                        .iter()
                        .any(|f| n.eq_ignore_ascii_case(f))
                })
                .cloned()
                .collect();
            FetchResponse {
                url: head.url,
                status: head.status,
                headers,
                tainting,
                body,
            }
        }
        ResponseTainting::Cors => {
            let exposed: Vec<String> = head
                .header_values("access-control-expose-headers")
                .iter()
                .flat_map(|v| v.split(','))
                .map(|name| name.trim().to_ascii_lowercase())
                .filter(|name| !name.is_empty())
                .collect();
            let headers = head
                .headers
                .iter()
                .filter(|(n, _)| {
                    let lower = n.to_ascii_lowercase();
                    CORS_SAFELISTED_RESPONSE_HEADERS.contains(&lower.as_str())
                        || exposed.contains(&lower)
                })
                .filter(|(n, _)| {
                    !FORBIDDEN_RESPONSE_HEADERS
                        .iter()
                        .any(|f| n.eq_ignore_ascii_case(f))
                })
                .cloned()
                .collect();
            FetchResponse {
                url: head.url,
                status: head.status,
                headers,
                tainting,
                body,
            }
        }
        ResponseTainting::Opaque => FetchResponse {
            url: head.url,
            status: 0,
            headers: Vec::new(),
            tainting,
            body,
        },
        ResponseTainting::OpaqueRedirect => FetchResponse {
            url: head.url,
            status: 0,
            headers: Vec::new(),
            tainting,
            body: None,
        },
    }
}
